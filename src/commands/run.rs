//! Short / long / check command handler.

use anyhow::Result;
use doi_manager_core::{BatchStart, ErrorCategory, Operation, RecordId};
use tracing::info;

use super::Library;
use crate::cli::SelectionArgs;

pub async fn run_operation_command(
    library: &Library,
    operation: Operation,
    selection: &SelectionArgs,
) -> Result<()> {
    let ids: Vec<RecordId> = if selection.all {
        library.store.list_ids().await?
    } else {
        selection.ids.iter().copied().map(RecordId).collect()
    };

    if ids.is_empty() {
        info!("Library is empty; nothing to do");
        return Ok(());
    }

    let start = library.coordinator.start_batch_for_ids(&ids, operation).await?;
    print_outcome(&start);
    Ok(())
}

fn print_outcome(start: &BatchStart) {
    match start {
        BatchStart::Empty { skipped } => {
            println!("No supported records selected ({} skipped).", skipped.len());
        }
        BatchStart::Rejected(error) => println!("{error}"),
        BatchStart::Completed(summary) => {
            println!(
                "{}: {} records, {} updated, {} verified, {} invalid, {} without DOI, {} ambiguous, {} skipped",
                summary.operation,
                summary.total(),
                summary.updated(),
                summary.verified(),
                summary.flagged(ErrorCategory::Invalid),
                summary.flagged(ErrorCategory::NoDoi),
                summary.flagged(ErrorCategory::Multiple),
                summary.skipped(),
            );
        }
    }
}
