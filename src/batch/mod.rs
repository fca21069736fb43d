//! Batch coordinator: runs one operation over an ordered set of records.
//!
//! Records are processed strictly one at a time, in input order. Each record
//! produces a [`RecordOutcome`]; the coordinator steps its [`BatchState`]
//! exactly once per outcome and emits the end-of-batch summary when the last
//! record has stepped.
//!
//! Only one batch runs per coordinator. A request that arrives while the
//! active batch still has records left is dropped (logged at `debug`), not
//! queued.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use doi_manager_core::{
//!     BatchCoordinator, CollectingReporter, InMemoryPreferenceSource, MemoryStore, Operation,
//!     PreferenceCache, Preferences, ResolverClient,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prefs = Preferences::default();
//! let lookup = ResolverClient::new(&prefs.services)?;
//! let coordinator = BatchCoordinator::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(lookup),
//!     Arc::new(CollectingReporter::new()),
//!     Arc::new(PreferenceCache::new(Arc::new(InMemoryPreferenceSource::new(prefs)))),
//! );
//! let _ = coordinator.start_batch(Vec::new(), Operation::Short).await;
//! # Ok(())
//! # }
//! ```

mod state;

pub use state::{BatchPhase, BatchState, CategoryFlags};

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::{AutoRetrieveMode, PreferenceCache, Preferences};
use crate::error::BatchError;
use crate::identifier::{IdentifierClass, classify};
use crate::mutation::{self, ErrorCategory, RecordOutcome, SkipReason};
use crate::record::{Record, RecordId, is_supported_type};
use crate::report::{self, Reporter};
use crate::resolver::{CrossrefMatch, DoiLookup, Resolution, context_object};
use crate::store::{RecordStore, StoreError};

/// Attempts per commit when the store reports a transient failure.
const COMMIT_ATTEMPTS: u32 = 3;

/// Wait before the second commit attempt; doubles after that.
const COMMIT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// The three DOI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Replace the DOI with its `10/<suffix>` alias.
    Short,
    /// Replace the DOI with its full form.
    Long,
    /// Validate the DOI and strip surrounding text.
    Check,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
            Self::Check => "check",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "long" => Ok(Self::Long),
            "check" => Ok(Self::Check),
            other => Err(format!("unknown operation '{other}' (expected short, long or check)")),
        }
    }
}

/// What happened to a `start_batch` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStart {
    /// Nothing eligible to process. `skipped` lists records excluded for
    /// their item type.
    Empty { skipped: Vec<BatchError> },
    /// Another batch still has records left.
    Rejected(BatchError),
    /// The batch ran to completion.
    Completed(BatchSummary),
}

impl BatchStart {
    #[must_use]
    pub fn summary(&self) -> Option<&BatchSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Empty { .. } | Self::Rejected(_) => None,
        }
    }
}

/// Result of a finished batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub operation: Operation,
    /// Per-record outcomes in processing order.
    pub outcomes: Vec<(RecordId, RecordOutcome)>,
    /// Per-record problems plus unsupported-type exclusions.
    pub errors: Vec<BatchError>,
}

impl BatchSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Records updated or verified.
    #[must_use]
    pub fn success(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    #[must_use]
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Updated))
    }

    #[must_use]
    pub fn verified(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Verified))
    }

    #[must_use]
    pub fn flagged(&self, category: ErrorCategory) -> usize {
        self.count(|o| *o == RecordOutcome::Flagged(category))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Skipped(_)))
    }

    #[must_use]
    pub fn outcome_for(&self, id: RecordId) -> Option<&RecordOutcome> {
        self.outcomes
            .iter()
            .find(|(record, _)| *record == id)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

struct Inner {
    store: Arc<dyn RecordStore>,
    lookup: Arc<dyn DoiLookup>,
    reporter: Arc<dyn Reporter>,
    prefs: Arc<PreferenceCache>,
    state: Mutex<BatchState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the batch slot for one `start_batch` call. If the call is dropped
/// before its last record steps, the slot is freed and the progress surface
/// closed.
struct SlotGuard<'a> {
    inner: &'a Inner,
    finished: bool,
}

impl SlotGuard<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.inner.state();
        warn!(
            completed = state.completed(),
            total = state.total(),
            "Batch cancelled before its last record; releasing the batch slot"
        );
        *state = BatchState::default();
        drop(state);
        self.inner.reporter.close_progress();
    }
}

/// Owns the single batch slot and drives records through lookup, mutation
/// and commit.
///
/// Cloning is cheap; clones share the same batch slot and guard.
#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl BatchCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        lookup: Arc<dyn DoiLookup>,
        reporter: Arc<dyn Reporter>,
        prefs: Arc<PreferenceCache>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                lookup,
                reporter,
                prefs,
                state: Mutex::new(BatchState::default()),
            }),
        }
    }

    /// Copy of the current batch state.
    #[must_use]
    pub fn snapshot(&self) -> BatchState {
        self.state().clone()
    }

    // The lock is never held across an await.
    fn state(&self) -> MutexGuard<'_, BatchState> {
        self.inner.state()
    }

    /// Runs `operation` over `records`.
    ///
    /// Non-regular records and feed entries are dropped silently; records of
    /// unsupported types are reported once and dropped. The call is a no-op
    /// when nothing is left or another batch is still running.
    #[instrument(skip(self, records), fields(requested = records.len()))]
    pub async fn start_batch(&self, records: Vec<Record>, operation: Operation) -> BatchStart {
        let (eligible, unsupported): (Vec<Record>, Vec<Record>) = records
            .into_iter()
            .filter(|record| record.is_regular() && !record.is_feed())
            .partition(|record| is_supported_type(record.item_type()));

        let skipped: Vec<BatchError> = unsupported
            .iter()
            .map(|record| BatchError::UnsupportedRecordType {
                record: record.id(),
                item_type: record.item_type().to_string(),
            })
            .collect();
        if !unsupported.is_empty() {
            let refs: Vec<&Record> = unsupported.iter().collect();
            report::report_unsupported_types(self.inner.reporter.as_ref(), &refs);
        }

        if eligible.is_empty() {
            debug!("No eligible records; batch not started");
            return BatchStart::Empty { skipped };
        }

        {
            let mut state = self.state();
            if state.is_active() {
                let rejected = BatchError::ConcurrentBatchRejected {
                    completed: state.completed(),
                    total: state.total(),
                };
                debug!(%rejected, "Batch request ignored");
                return BatchStart::Rejected(rejected);
            }
            *state = BatchState::started(operation, eligible.iter().map(Record::id).collect());
        }
        let slot = SlotGuard {
            inner: &self.inner,
            finished: false,
        };

        let prefs = self.batch_preferences();
        info!(%operation, total = eligible.len(), "Batch started");
        report::report_batch_opened(self.inner.reporter.as_ref(), operation);

        let total = eligible.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut errors = skipped;

        for record in eligible {
            let index = self.state().advance();
            debug!(record = %record.id(), position = index + 1, total, "Processing record");

            let id = record.id();
            let (outcome, candidates) = self.process_record(record, operation, &prefs).await;
            if let Some(error) = BatchError::from_outcome(id, &outcome, candidates) {
                errors.push(error);
            }
            self.step(&outcome, operation, &prefs);
            outcomes.push((id, outcome));
        }
        slot.finish();

        let summary = BatchSummary {
            operation,
            outcomes,
            errors,
        };
        info!(
            %operation,
            total = summary.total(),
            success = summary.success(),
            skipped = summary.skipped(),
            "Batch finished"
        );
        BatchStart::Completed(summary)
    }

    /// Loads `ids` from the store and runs `operation` over them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any record cannot be loaded; no batch is
    /// started then.
    pub async fn start_batch_for_ids(
        &self,
        ids: &[RecordId],
        operation: Operation,
    ) -> Result<BatchStart, StoreError> {
        let records = self.inner.store.load_many(ids).await?;
        Ok(self.start_batch(records, operation).await)
    }

    /// Runs the configured auto-retrieve operation over newly added records.
    ///
    /// Returns `None` when auto-retrieve is turned off.
    #[instrument(skip(self, records), fields(added = records.len()))]
    pub async fn auto_retrieve(&self, records: Vec<Record>) -> Option<BatchStart> {
        self.inner.prefs.invalidate();
        let mode = match self.inner.prefs.get() {
            Ok(prefs) => prefs.autoretrieve,
            Err(e) => {
                warn!(error = %e, "Could not read preferences; using default auto-retrieve mode");
                AutoRetrieveMode::default()
            }
        };
        let Some(operation) = mode.operation() else {
            debug!("Auto-retrieve disabled");
            return None;
        };
        Some(self.start_batch(records, operation).await)
    }

    /// Fresh preference snapshot for a new batch.
    fn batch_preferences(&self) -> Arc<Preferences> {
        self.inner.prefs.invalidate();
        self.inner.prefs.get().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read preferences; using defaults for this batch");
            Arc::new(Preferences::default())
        })
    }

    /// Counts one record as done; drains the batch after the last one.
    fn step(&self, outcome: &RecordOutcome, operation: Operation, prefs: &Preferences) {
        let reporter = self.inner.reporter.as_ref();
        let mut state = self.state();
        state.record_outcome(outcome);
        if state.complete_one() {
            report::report_batch_summary(reporter, &mut state, prefs);
            *state = BatchState::default();
        } else {
            let position = state.current().map_or(1, |index| index + 2);
            report::report_progress(reporter, operation, position, state.total(), state.percent());
        }
    }

    /// Resolves, mutates and commits one record.
    ///
    /// Returns the outcome and, for ambiguous matches, the candidate count.
    async fn process_record(
        &self,
        mut record: Record,
        operation: Operation,
        prefs: &Preferences,
    ) -> (RecordOutcome, usize) {
        let resolution = self.resolve_record(&record, operation).await;
        let candidates = match &resolution {
            Some(Resolution::MultiResolved { candidates, .. }) => candidates.len(),
            _ => 0,
        };

        let mutation = match resolution {
            Some(resolution) => mutation::apply(&mut record, resolution, prefs),
            None => mutation::apply_no_metadata(&mut record, prefs),
        };

        let mut outcome = mutation.outcome;
        let committed = if record.is_dirty() {
            match self.commit_with_retry(&record).await {
                Ok(()) => {
                    record.mark_clean();
                    true
                }
                Err(e) => {
                    warn!(record = %record.id(), error = %e, "Commit failed; record not updated");
                    outcome = RecordOutcome::Skipped(SkipReason::CommitFailed);
                    false
                }
            }
        } else {
            true
        };

        // The discovery link only goes in next to a committed tag.
        if committed
            && let Some(attachment) = &mutation.attachment
            && let Err(e) = self.inner.store.link_attachment(record.id(), attachment).await
        {
            warn!(record = %record.id(), error = %e, "Could not attach discovery link");
        }
        (outcome, candidates)
    }

    /// Commits `record`, retrying busy or timed-out writes.
    async fn commit_with_retry(&self, record: &Record) -> Result<(), StoreError> {
        let mut delay = COMMIT_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            match self.inner.store.commit(record).await {
                Err(e) if e.is_transient() && attempt < COMMIT_ATTEMPTS => {
                    debug!(record = %record.id(), attempt, error = %e, "Transient commit failure; retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// `None` means no identifier and no metadata to search with.
    async fn resolve_record(&self, record: &Record, operation: Operation) -> Option<Resolution> {
        let stored = record.doi();
        match classify(stored) {
            IdentifierClass::Absent => {
                let context = context_object(record)?;
                Some(self.search_by_metadata(&context, operation).await)
            }
            class => Some(self.dispatch(operation, &class, stored).await),
        }
    }

    async fn search_by_metadata(&self, context: &str, operation: Operation) -> Resolution {
        match self.inner.lookup.crossref_lookup(context).await {
            // The found DOI goes through the same operation as a stored one;
            // there is no stored value to compare against.
            CrossrefMatch::Resolved(doi) => self.dispatch(operation, &classify(&doi), "").await,
            CrossrefMatch::Unresolved => Resolution::Unresolved,
            CrossrefMatch::MultiResolved {
                discovery_url,
                candidates,
            } => Resolution::MultiResolved {
                discovery_url,
                candidates,
            },
            CrossrefMatch::NetworkError => Resolution::NetworkError,
        }
    }

    async fn dispatch(&self, operation: Operation, class: &IdentifierClass, stored: &str) -> Resolution {
        let Some(doi) = class.cleaned() else {
            return Resolution::Invalid;
        };
        let lookup = self.inner.lookup.as_ref();
        match operation {
            Operation::Short => lookup.resolve_short(doi).await,
            Operation::Long => lookup.resolve_long(doi, class.is_short()).await,
            Operation::Check => lookup.resolve_check(doi, stored).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::config::InMemoryPreferenceSource;
    use crate::record::{DOI_FIELD, TagType};
    use crate::report::{CollectingReporter, NotificationLevel};
    use crate::store::MemoryStore;

    // ==================== Fakes ====================

    /// Lookup that answers every call with fixed resolutions.
    #[derive(Default)]
    struct FakeLookup {
        answer: Mutex<Option<Resolution>>,
        crossref: Mutex<Option<CrossrefMatch>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl FakeLookup {
        fn answering(resolution: Resolution) -> Self {
            Self {
                answer: Mutex::new(Some(resolution)),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn answer(&self, call: String) -> Resolution {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(call);
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            self.answer
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Resolution::NetworkError)
        }
    }

    #[async_trait]
    impl DoiLookup for FakeLookup {
        async fn resolve_short(&self, doi: &str) -> Resolution {
            self.answer(format!("short:{doi}")).await
        }

        async fn resolve_long(&self, doi: &str, was_short: bool) -> Resolution {
            self.answer(format!("long:{doi}:{was_short}")).await
        }

        async fn resolve_check(&self, doi: &str, stored: &str) -> Resolution {
            self.answer(format!("check:{doi}:{stored}")).await
        }

        async fn crossref_lookup(&self, _context: &str) -> CrossrefMatch {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push("crossref".to_string());
            self.crossref
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(CrossrefMatch::NetworkError)
        }
    }

    struct Harness {
        coordinator: BatchCoordinator,
        store: Arc<MemoryStore>,
        lookup: Arc<FakeLookup>,
        reporter: Arc<CollectingReporter>,
    }

    fn harness(lookup: FakeLookup, records: Vec<Record>) -> Harness {
        harness_with_prefs(lookup, records, Preferences::default())
    }

    fn harness_with_prefs(lookup: FakeLookup, records: Vec<Record>, prefs: Preferences) -> Harness {
        let store = Arc::new(MemoryStore::with_records(records));
        let lookup = Arc::new(lookup);
        let reporter = Arc::new(CollectingReporter::new());
        let prefs = Arc::new(PreferenceCache::new(Arc::new(InMemoryPreferenceSource::new(prefs))));
        let coordinator =
            BatchCoordinator::new(store.clone(), lookup.clone(), reporter.clone(), prefs);
        Harness {
            coordinator,
            store,
            lookup,
            reporter,
        }
    }

    fn article(id: i64, doi: &str) -> Record {
        Record::new(RecordId(id), "journalArticle").with_field(DOI_FIELD, doi)
    }

    // ==================== Operation ====================

    #[test]
    fn test_operation_parse_and_display() {
        assert_eq!("Short".parse::<Operation>().unwrap(), Operation::Short);
        assert_eq!(" check ".parse::<Operation>().unwrap(), Operation::Check);
        assert!("medium".parse::<Operation>().is_err());
        assert_eq!(Operation::Long.to_string(), "long");
    }

    // ==================== Filtering ====================

    #[tokio::test]
    async fn test_start_batch_filters_and_reports_unsupported_once() {
        let h = harness(
            FakeLookup::answering(Resolution::Resolved("10/abc".into())),
            vec![],
        );
        let records = vec![
            article(1, "10.1000/a"),
            Record::new(RecordId(2), "webpage"),
            Record::new(RecordId(3), "note"),
            article(4, "10.1000/b").non_regular(),
            article(5, "10.1000/c").feed_item(),
        ];

        let start = h.coordinator.start_batch(records, Operation::Short).await;
        let summary = start.summary().unwrap();
        assert_eq!(summary.total(), 1);
        assert_eq!(
            summary
                .errors
                .iter()
                .filter(|e| matches!(e, BatchError::UnsupportedRecordType { .. }))
                .count(),
            2
        );

        let notes = h.reporter.notifications();
        assert_eq!(notes[0].headline, "Unsupported Item Types");
        assert_eq!(notes[0].message, "2 item(s) skipped (unsupported types: webpage, note)");
        assert_eq!(h.lookup.calls(), 1);
    }

    #[tokio::test]
    async fn test_start_batch_with_nothing_eligible_is_empty() {
        let h = harness(FakeLookup::default(), vec![]);
        let start = h
            .coordinator
            .start_batch(vec![Record::new(RecordId(1), "webpage")], Operation::Check)
            .await;
        assert!(matches!(start, BatchStart::Empty { ref skipped } if skipped.len() == 1));
        assert_eq!(h.lookup.calls(), 0);
        assert_eq!(h.reporter.progress_updates().len(), 0);
    }

    // ==================== Dispatch ====================

    #[tokio::test]
    async fn test_dispatch_passes_cleaned_identifier_and_stored_value() {
        let h = harness(FakeLookup::answering(Resolution::Verified), vec![]);
        h.coordinator
            .start_batch(
                vec![
                    article(1, "doi:10.1000/ABC"),
                    article(2, "https://doi.org/10/xyz."),
                ],
                Operation::Check,
            )
            .await;
        let seen = h.lookup.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "check:10.1000/ABC:doi:10.1000/ABC".to_string(),
                "check:10/xyz:https://doi.org/10/xyz.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_long_marks_short_input() {
        let h = harness(FakeLookup::answering(Resolution::Invalid), vec![]);
        h.coordinator
            .start_batch(vec![article(1, "10/abc"), article(2, "10.1000/x")], Operation::Long)
            .await;
        let seen = h.lookup.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["long:10/abc:true", "long:10.1000/x:false"]);
    }

    #[tokio::test]
    async fn test_malformed_identifier_is_invalid_without_lookup() {
        let record = article(1, "not a doi");
        let h = harness(FakeLookup::default(), vec![record.clone()]);
        let start = h.coordinator.start_batch(vec![record], Operation::Short).await;

        assert_eq!(h.lookup.calls(), 0);
        let stored = h.store.get(RecordId(1)).unwrap();
        assert!(stored.has_tag("_Invalid DOI"));
        assert_eq!(
            start.summary().unwrap().errors,
            vec![BatchError::MalformedIdentifier { record: RecordId(1) }]
        );
    }

    #[tokio::test]
    async fn test_crossref_resolved_doi_is_chained_into_operation() {
        let lookup = FakeLookup::answering(Resolution::Resolved("10/found".into()));
        *lookup.crossref.lock().unwrap() = Some(CrossrefMatch::Resolved("10.1000/FOUND".into()));
        let record = Record::new(RecordId(1), "journalArticle").with_field("title", "Paper");
        let h = harness(lookup, vec![record.clone()]);

        h.coordinator.start_batch(vec![record], Operation::Check).await;

        let seen = h.lookup.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["crossref", "check:10.1000/FOUND:"]);
        assert_eq!(h.store.get(RecordId(1)).unwrap().doi(), "10/found");
    }

    #[tokio::test]
    async fn test_no_identifier_no_title_skips_lookup() {
        let record = Record::new(RecordId(1), "book").with_tag("_Invalid DOI", TagType::Automatic);
        let h = harness(FakeLookup::default(), vec![record.clone()]);
        let start = h.coordinator.start_batch(vec![record], Operation::Short).await;

        assert_eq!(h.lookup.calls(), 0);
        assert_eq!(
            start.summary().unwrap().outcome_for(RecordId(1)),
            Some(&RecordOutcome::Skipped(SkipReason::NoMetadata))
        );
        assert!(!h.store.get(RecordId(1)).unwrap().has_tag("_Invalid DOI"));
    }

    // ==================== Commit ====================

    #[tokio::test]
    async fn test_verified_without_tags_does_not_commit() {
        let record = article(1, "10.1000/abc");
        let h = harness(FakeLookup::answering(Resolution::Verified), vec![record.clone()]);
        h.coordinator.start_batch(vec![record], Operation::Check).await;
        assert_eq!(h.store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_counts_as_not_updated() {
        let record = article(1, "10.1000/abc");
        let h = harness(
            FakeLookup::answering(Resolution::Resolved("10/abc".into())),
            vec![record.clone()],
        );
        h.store.set_fail_commits(true);

        let start = h.coordinator.start_batch(vec![record], Operation::Short).await;
        let summary = start.summary().unwrap();
        assert_eq!(summary.success(), 0);
        assert_eq!(
            summary.outcome_for(RecordId(1)),
            Some(&RecordOutcome::Skipped(SkipReason::CommitFailed))
        );
        assert_eq!(h.coordinator.snapshot(), BatchState::default());
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_no_discovery_link() {
        let lookup = FakeLookup::default();
        *lookup.crossref.lock().unwrap() = Some(CrossrefMatch::MultiResolved {
            discovery_url: "https://example.org/openurl?q".into(),
            candidates: vec!["10.1000/a".into(), "10.1000/b".into()],
        });
        let record = Record::new(RecordId(1), "journalArticle").with_field("title", "Paper");
        let h = harness(lookup, vec![record.clone()]);

        h.store.set_fail_commits(true);
        let start = h.coordinator.start_batch(vec![record.clone()], Operation::Short).await;
        assert_eq!(
            start.summary().unwrap().outcome_for(RecordId(1)),
            Some(&RecordOutcome::Skipped(SkipReason::CommitFailed))
        );
        assert!(h.store.attachments_for(RecordId(1)).is_empty());
        assert!(!h.store.get(RecordId(1)).unwrap().has_tag("_Multiple DOIs found"));

        h.store.set_fail_commits(false);
        h.coordinator.start_batch(vec![record], Operation::Short).await;
        assert_eq!(h.store.attachments_for(RecordId(1)).len(), 1);
        assert!(h.store.get(RecordId(1)).unwrap().has_tag("_Multiple DOIs found"));
    }

    #[tokio::test]
    async fn test_transient_commit_failure_is_retried() {
        let record = article(1, "10.1000/abc");
        let h = harness(
            FakeLookup::answering(Resolution::Resolved("10/abc".into())),
            vec![record.clone()],
        );
        h.store.fail_next_commits(2);

        let start = h.coordinator.start_batch(vec![record], Operation::Short).await;
        assert_eq!(start.summary().unwrap().updated(), 1);
        assert_eq!(h.store.commit_count(), 1);
        assert_eq!(h.store.get(RecordId(1)).unwrap().doi(), "10/abc");
    }

    // ==================== Progress & summary ====================

    #[tokio::test]
    async fn test_disabled_tag_still_reports_category_once() {
        let records = vec![article(1, "10.1000/a"), article(2, "10.1000/b")];
        let prefs = Preferences {
            tag_invalid: String::new(),
            ..Preferences::default()
        };
        let h = harness_with_prefs(
            FakeLookup::answering(Resolution::Invalid),
            records.clone(),
            prefs,
        );

        let start = h.coordinator.start_batch(records, Operation::Check).await;
        assert_eq!(start.summary().unwrap().flagged(ErrorCategory::Invalid), 2);

        for id in [RecordId(1), RecordId(2)] {
            assert_eq!(h.store.get(id).unwrap().tags().count(), 0);
        }
        assert_eq!(h.store.commit_count(), 0);

        let notes = h.reporter.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].headline, "Invalid DOI");
        assert_eq!(notes[0].message, "Invalid DOIs were found.");
    }

    #[tokio::test]
    async fn test_progress_text_and_single_summary() {
        let records: Vec<Record> = (1..=3).map(|i| article(i, "10.1000/abc")).collect();
        let h = harness(
            FakeLookup::answering(Resolution::Resolved("10/abc".into())),
            records.clone(),
        );
        h.coordinator.start_batch(records, Operation::Short).await;

        let texts: Vec<(String, u8)> = h
            .reporter
            .progress_updates()
            .into_iter()
            .map(|p| (p.text, p.percent))
            .collect();
        assert_eq!(
            texts,
            vec![
                ("Checking DOIs.".to_string(), 0),
                ("Item 2 of 3".to_string(), 33),
                ("Item 3 of 3".to_string(), 67),
            ]
        );

        let notes = h.reporter.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Success);
        assert_eq!(notes[0].message, "shortDOIs updated for 3 items.");
        assert_eq!(h.coordinator.snapshot().phase(), BatchPhase::Idle);
    }

    // ==================== Guard ====================

    #[tokio::test]
    async fn test_second_batch_rejected_while_first_running() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let lookup = FakeLookup {
            answer: Mutex::new(Some(Resolution::Verified)),
            gate: Some((entered.clone(), release.clone())),
            ..FakeLookup::default()
        };
        let record = article(1, "10.1000/abc");
        let h = harness(lookup, vec![record.clone()]);

        let first = {
            let coordinator = h.coordinator.clone();
            let record = record.clone();
            tokio::spawn(async move { coordinator.start_batch(vec![record], Operation::Check).await })
        };
        entered.notified().await;

        let before = h.coordinator.snapshot();
        let second = h
            .coordinator
            .start_batch(vec![article(2, "10.1000/xyz")], Operation::Short)
            .await;
        assert_eq!(
            second,
            BatchStart::Rejected(BatchError::ConcurrentBatchRejected {
                completed: 0,
                total: 1
            })
        );
        assert_eq!(h.coordinator.snapshot(), before);
        assert_eq!(h.lookup.calls(), 1);

        release.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.summary().unwrap().success(), 1);

        // The slot is free again.
        release.notify_one();
        let third = h.coordinator.start_batch(vec![record], Operation::Check).await;
        assert!(third.summary().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_batch_releases_slot() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let lookup = FakeLookup {
            answer: Mutex::new(Some(Resolution::Verified)),
            gate: Some((entered.clone(), release.clone())),
            ..FakeLookup::default()
        };
        let records = vec![article(1, "10.1000/a"), article(2, "10.1000/b")];
        let h = harness(lookup, records.clone());

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            h.coordinator.start_batch(records, Operation::Check),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(h.coordinator.snapshot(), BatchState::default());
        assert_eq!(h.reporter.close_count(), 1);

        release.notify_one();
        let next = h
            .coordinator
            .start_batch(vec![article(3, "10.1000/c")], Operation::Check)
            .await;
        assert_eq!(next.summary().unwrap().verified(), 1);
    }

    #[tokio::test]
    async fn test_aborted_batch_task_releases_slot() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let lookup = FakeLookup {
            answer: Mutex::new(Some(Resolution::Verified)),
            gate: Some((entered.clone(), release.clone())),
            ..FakeLookup::default()
        };
        let record = article(1, "10.1000/a");
        let h = harness(lookup, vec![record.clone()]);

        let task = {
            let coordinator = h.coordinator.clone();
            let record = record.clone();
            tokio::spawn(async move { coordinator.start_batch(vec![record], Operation::Short).await })
        };
        entered.notified().await;
        assert!(h.coordinator.snapshot().is_active());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!h.coordinator.snapshot().is_active());
        assert_eq!(h.coordinator.snapshot().phase(), BatchPhase::Idle);
    }

    // ==================== Auto-retrieve ====================

    #[tokio::test]
    async fn test_auto_retrieve_uses_configured_mode() {
        let record = article(1, "10/abc");
        let h = harness(FakeLookup::answering(Resolution::Invalid), vec![record.clone()]);
        let start = h.coordinator.auto_retrieve(vec![record]).await.unwrap();
        assert_eq!(start.summary().unwrap().operation, Operation::Short);
        assert_eq!(h.lookup.seen.lock().unwrap().clone(), vec!["short:10/abc"]);
    }

    #[tokio::test]
    async fn test_auto_retrieve_none_does_nothing() {
        let store = Arc::new(MemoryStore::new());
        let lookup = Arc::new(FakeLookup::default());
        let reporter = Arc::new(CollectingReporter::new());
        let prefs = Preferences {
            autoretrieve: AutoRetrieveMode::None,
            ..Preferences::default()
        };
        let cache = Arc::new(PreferenceCache::new(Arc::new(InMemoryPreferenceSource::new(prefs))));
        let coordinator = BatchCoordinator::new(store, lookup.clone(), reporter.clone(), cache);

        assert!(coordinator.auto_retrieve(vec![article(1, "10/abc")]).await.is_none());
        assert_eq!(lookup.calls(), 0);
        assert!(reporter.events().is_empty());
    }
}
