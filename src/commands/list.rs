//! List command handler.

use anyhow::Result;
use doi_manager_core::{DOI_FIELD, RecordStore};

use super::Library;

pub async fn run_list_command(library: &Library) -> Result<()> {
    let ids = library.store.list_ids().await?;
    let records = library.store.load_many(&ids).await?;

    for record in &records {
        let title = record.get_field("title").unwrap_or("");
        let doi = record.get_field(DOI_FIELD).unwrap_or("-");
        let tags: Vec<&str> = record.tags().map(|(name, _)| name).collect();
        println!(
            "{}\t{}\t{}\t{}\t{}",
            record.id(),
            record.item_type(),
            doi,
            title,
            tags.join(", ")
        );
    }

    if records.is_empty() {
        println!("No records.");
    }
    Ok(())
}
