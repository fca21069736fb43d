//! DOI cleaning and classification for stored record identifiers.
//!
//! A stored `DOI` field can hold anything a user pasted: bare DOIs, resolver
//! URLs, `doi:` prefixes, trailing punctuation, or surrounding citation text.
//! [`classify`] extracts the first DOI-shaped token and sorts the value into
//! one of four classes so the batch pipeline can pick a lookup.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

/// DOI token: `10`, an optional `.registrant` of 4+ digits with optional
/// `.sub` parts, `/`, and a suffix that contains no whitespace and does not
/// end in `.` or `,`. Group 1 holds the token.
///
/// The registrant is optional so short-form aliases (`10/abcd`) are matched by
/// the same pattern as standard DOIs. The leading `10` must start the value or
/// follow a character that is not a letter, digit or `.`, so `2010/abc` and
/// the inner `10/` of `10.1000.10/x` never start a token.
#[allow(clippy::expect_used)]
static DOI_TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9A-Za-z.])(10(?:\.[0-9]{4,}(?:\.[0-9]+)*)?/[^\s]*[^\s.,])")
        .expect("DOI token regex is valid") // Static pattern, safe to panic
});

/// Short-form alias: the whole cleaned value is `10/<suffix>`.
#[allow(clippy::expect_used)]
static SHORT_FORM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10/[^\s]*[^\s.,]$").expect("short DOI regex is valid") // Static pattern, safe to panic
});

/// Lexical class of a stored identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierClass {
    /// Field is missing or blank.
    Absent,
    /// Field is non-empty but contains no DOI-shaped token.
    Malformed,
    /// A short-form alias such as `10/abcd`, cleaned.
    Short(String),
    /// A standard DOI such as `10.1000/xyz123`, cleaned.
    Long(String),
}

impl IdentifierClass {
    /// Returns the cleaned identifier for the short and long classes.
    #[must_use]
    pub fn cleaned(&self) -> Option<&str> {
        match self {
            Self::Short(doi) | Self::Long(doi) => Some(doi),
            Self::Absent | Self::Malformed => None,
        }
    }

    /// Returns true for the short-form class.
    #[must_use]
    pub fn is_short(&self) -> bool {
        matches!(self, Self::Short(_))
    }
}

impl fmt::Display for IdentifierClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Malformed => write!(f, "malformed"),
            Self::Short(doi) => write!(f, "short({doi})"),
            Self::Long(doi) => write!(f, "long({doi})"),
        }
    }
}

/// Classifies a raw stored identifier.
///
/// # Examples
///
/// ```
/// use doi_manager_core::identifier::{IdentifierClass, classify};
///
/// assert_eq!(classify("  "), IdentifierClass::Absent);
/// assert_eq!(classify("not a doi"), IdentifierClass::Malformed);
/// assert_eq!(classify("doi: 10/AbCd."), IdentifierClass::Short("10/AbCd".to_string()));
/// assert_eq!(
///     classify("https://doi.org/10.1000/XYZ123"),
///     IdentifierClass::Long("10.1000/XYZ123".to_string())
/// );
/// ```
#[must_use]
pub fn classify(raw: &str) -> IdentifierClass {
    if raw.trim().is_empty() {
        return IdentifierClass::Absent;
    }

    let Some(cleaned) = clean_doi(raw) else {
        trace!(raw = %raw, "no DOI token in stored identifier");
        return IdentifierClass::Malformed;
    };

    if is_short_form(&cleaned) {
        IdentifierClass::Short(cleaned)
    } else {
        IdentifierClass::Long(cleaned)
    }
}

/// Extracts the first DOI token from `raw`, or `None` when there is none.
///
/// Percent-encoded input (`10.1000%2Fabc`) is decoded first so copied
/// resolver URLs clean to the same value as bare DOIs.
#[must_use]
pub fn clean_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let decoded = urlencoding::decode(trimmed).map_or_else(|_| trimmed.to_string(), |d| d.into_owned());

    DOI_TOKEN_PATTERN
        .captures(&decoded)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Returns true when an already-cleaned identifier is a short-form alias.
#[must_use]
pub fn is_short_form(cleaned: &str) -> bool {
    SHORT_FORM_PATTERN.is_match(cleaned)
}
