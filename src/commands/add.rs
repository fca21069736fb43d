//! Add command handler: insert a record, then let auto-retrieve run on it.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use doi_manager_core::resolver::CREATORS_FIELD;
use doi_manager_core::{
    AutoRetrieve, DOI_FIELD, ItemNotifier, ItemObserver, Record, RecordStore,
};
use tokio::sync::mpsc;

use super::Library;
use crate::cli::AddArgs;

/// Forwards to auto-retrieve and signals when the run is over, so the
/// process does not exit mid-batch.
struct AwaitedAutoRetrieve {
    inner: AutoRetrieve,
    done: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl ItemObserver for AwaitedAutoRetrieve {
    async fn records_added(&self, records: Vec<Record>) {
        self.inner.records_added(records).await;
        let _ = self.done.send(());
    }
}

pub async fn run_add_command(library: &Library, args: &AddArgs) -> Result<()> {
    let fields = record_fields(args);
    let id = library.store.insert_record(&args.item_type, &fields).await?;
    let record = library
        .store
        .load(id)
        .await
        .with_context(|| format!("cannot reload record {id}"))?;
    println!("Added record {id}");

    let notifier = ItemNotifier::default();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let handle = notifier.register_observer(Arc::new(AwaitedAutoRetrieve {
        inner: AutoRetrieve::new(library.coordinator.clone()),
        done: done_tx,
    }));

    if notifier.notify_added(vec![record]) > 0 {
        done_rx.recv().await;
    }
    notifier.unregister(handle).await;

    let stored = library.store.load(id).await?;
    println!("DOI: {}", stored.get_field(DOI_FIELD).unwrap_or("-"));
    Ok(())
}

fn record_fields(args: &AddArgs) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    if let Some(title) = &args.title {
        fields.push(("title".to_string(), title.clone()));
    }
    if let Some(doi) = &args.doi {
        fields.push((DOI_FIELD.to_string(), doi.clone()));
    }
    if !args.creators.is_empty() {
        fields.push((CREATORS_FIELD.to_string(), args.creators.join("; ")));
    }
    fields.extend(args.fields.iter().cloned());
    fields
}
