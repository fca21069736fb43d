//! OpenURL 1.0 (`Z39.88-2004`) KEV context objects built from record
//! metadata, used to search Crossref for records without a DOI.

use std::sync::LazyLock;

use regex::Regex;

use crate::record::Record;

/// Semicolon-separated `Last, First` creator list.
pub const CREATORS_FIELD: &str = "creators";

const CTX_VERSION: &str = "Z39.88-2004";
const FMT_JOURNAL: &str = "info:ofi/fmt:kev:mtx:journal";
const FMT_BOOK: &str = "info:ofi/fmt:kev:mtx:book";
const FMT_DISSERTATION: &str = "info:ofi/fmt:kev:mtx:dissertation";

#[allow(clippy::expect_used)]
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("year regex is valid"));

/// Metadata format a record type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Journal { genre: &'static str },
    Book { genre: &'static str },
    Dissertation,
}

fn format_for(item_type: &str) -> Format {
    match item_type {
        "journalArticle" | "magazineArticle" | "newspaperArticle" | "preprint" => {
            Format::Journal { genre: "article" }
        }
        "book" => Format::Book { genre: "book" },
        "bookSection" | "encyclopediaArticle" | "dictionaryEntry" => {
            Format::Book { genre: "bookitem" }
        }
        "conferencePaper" => Format::Book {
            genre: "proceeding",
        },
        "report" => Format::Book { genre: "report" },
        "thesis" => Format::Dissertation,
        _ => Format::Book { genre: "document" },
    }
}

/// Field holding the container title for an item type.
fn container_field(item_type: &str) -> &'static str {
    match item_type {
        "bookSection" => "bookTitle",
        "conferencePaper" => "proceedingsTitle",
        "encyclopediaArticle" => "encyclopediaTitle",
        "dictionaryEntry" => "dictionaryTitle",
        "preprint" => "repository",
        _ => "publicationTitle",
    }
}

/// Builds the KEV context object for `record`.
///
/// Returns `None` when the record has no title, since Crossref cannot match
/// without one.
#[must_use]
pub fn context_object(record: &Record) -> Option<String> {
    let title = non_empty(record.get_field("title"))?;
    let item_type = record.item_type();
    let mut pairs: Vec<(&str, String)> = vec![("ctx_ver", CTX_VERSION.to_string())];

    match format_for(item_type) {
        Format::Journal { genre } => {
            pairs.push(("rft_val_fmt", FMT_JOURNAL.to_string()));
            pairs.push(("rft.genre", genre.to_string()));
            pairs.push(("rft.atitle", title.to_string()));
            if let Some(journal) = non_empty(record.get_field(container_field(item_type))) {
                pairs.push(("rft.jtitle", journal.to_string()));
            }
            if let Some(abbrev) = non_empty(record.get_field("journalAbbreviation")) {
                pairs.push(("rft.stitle", abbrev.to_string()));
            }
        }
        Format::Book { genre } => {
            pairs.push(("rft_val_fmt", FMT_BOOK.to_string()));
            pairs.push(("rft.genre", genre.to_string()));
            match genre {
                "bookitem" | "proceeding" => {
                    pairs.push(("rft.atitle", title.to_string()));
                    if let Some(container) =
                        non_empty(record.get_field(container_field(item_type)))
                    {
                        pairs.push(("rft.btitle", container.to_string()));
                    }
                }
                _ => pairs.push(("rft.btitle", title.to_string())),
            }
            if let Some(publisher) = non_empty(record.get_field("publisher")) {
                pairs.push(("rft.pub", publisher.to_string()));
            }
        }
        Format::Dissertation => {
            pairs.push(("rft_val_fmt", FMT_DISSERTATION.to_string()));
            pairs.push(("rft.title", title.to_string()));
            if let Some(university) = non_empty(record.get_field("university")) {
                pairs.push(("rft.inst", university.to_string()));
            }
        }
    }

    if let Some((last, first)) = first_creator(record) {
        pairs.push(("rft.aulast", last));
        if let Some(first) = first {
            pairs.push(("rft.aufirst", first));
        }
    }

    if let Some(year) = record
        .get_field("date")
        .and_then(|date| YEAR.captures(date))
        .and_then(|caps| caps.get(1))
    {
        pairs.push(("rft.date", year.as_str().to_string()));
    }

    for (key, field) in [("rft.volume", "volume"), ("rft.issue", "issue")] {
        if let Some(value) = non_empty(record.get_field(field)) {
            pairs.push((key, value.to_string()));
        }
    }

    if let Some(pages) = non_empty(record.get_field("pages")) {
        let (start, end) = split_pages(pages);
        pairs.push(("rft.spage", start.to_string()));
        if let Some(end) = end {
            pairs.push(("rft.epage", end.to_string()));
        }
    }

    for (key, field) in [("rft.issn", "ISSN"), ("rft.isbn", "ISBN")] {
        if let Some(first) = record
            .get_field(field)
            .and_then(|value| value.split([',', ' ']).map(str::trim).find(|v| !v.is_empty()))
        {
            pairs.push((key, first.to_string()));
        }
    }

    Some(
        pairs
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn first_creator(record: &Record) -> Option<(String, Option<String>)> {
    let first = record
        .get_field(CREATORS_FIELD)?
        .split(';')
        .map(str::trim)
        .find(|c| !c.is_empty())?;
    match first.split_once(',') {
        Some((last, given)) => {
            let given = given.trim();
            Some((
                last.trim().to_string(),
                (!given.is_empty()).then(|| given.to_string()),
            ))
        }
        None => Some((first.to_string(), None)),
    }
}

fn split_pages(pages: &str) -> (&str, Option<&str>) {
    match pages.split_once(['-', '\u{2013}']) {
        Some((start, end)) if !end.trim().is_empty() => (start.trim(), Some(end.trim())),
        Some((start, _)) => (start.trim(), None),
        None => (pages, None),
    }
}
