use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::bootstrap::{BootstrapLoader, BootstrapReport};
use crate::classifier::{Category, Classifier, ClassifierBuilder, ClassifierError};
use crate::config::{FlushPolicy, PersistenceConfig};
use crate::ledger::TransactionSource;
use crate::persistence::{ModelSettings, SnapshotError, SnapshotStore};

#[derive(Debug, Default)]
struct FlushFailures {
    consecutive: u32,
    since: Option<Instant>,
}

/// The classifier wired to its snapshot file.
///
/// This is what the webhook layer talks to: it classifies new transactions,
/// learns from confirmed categories, and keeps the snapshot in step with the
/// in-memory model according to the [`FlushPolicy`].
pub struct Categorizer {
    classifier: Arc<Classifier>,
    settings: ModelSettings,
    snapshots: SnapshotStore,
    flush_policy: FlushPolicy,
    max_failure_window: Duration,
    needs_bootstrap: AtomicBool,
    dirty: AtomicBool,
    failures: Mutex<FlushFailures>,
}

impl Categorizer {
    /// Builds the classifier from the persisted snapshot.
    ///
    /// A missing snapshot is the normal first-run case. A corrupt one is
    /// logged and replaced by an empty model. Either way the categorizer is
    /// flagged for bootstrap. Other read failures are returned.
    ///
    /// A loaded snapshot keeps the tokenizer and smoothing settings it was
    /// trained with; differing settings on `builder` are logged and ignored.
    pub fn open(builder: ClassifierBuilder, config: PersistenceConfig) -> Result<Self, ClassifierError> {
        let snapshots = SnapshotStore::new(&config.snapshot_path);
        let (classifier, needs_bootstrap) = match snapshots.load() {
            Ok(stored) => {
                info!("Loaded model snapshot from {:?}", snapshots.path());
                let requested = ModelSettings::from(builder.config());
                let builder = if requested != stored.settings {
                    warn!(
                        "Snapshot at {:?} was trained with {:?}; ignoring requested {:?}",
                        snapshots.path(),
                        stored.settings,
                        requested
                    );
                    builder.with_config(stored.settings.into())
                } else {
                    builder
                };
                (builder.with_snapshot(stored.model).build()?, false)
            }
            Err(SnapshotError::NotFound(path)) => {
                info!("No model snapshot at {:?}, starting empty", path);
                (builder.build()?, true)
            }
            Err(SnapshotError::CorruptState(reason)) => {
                error!(
                    "Model snapshot at {:?} is unusable ({}), starting empty and re-bootstrapping",
                    snapshots.path(),
                    reason
                );
                (builder.build()?, true)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            settings: ModelSettings::from(&classifier.config()),
            classifier: Arc::new(classifier),
            snapshots,
            flush_policy: config.flush_policy,
            max_failure_window: config.max_failure_window,
            needs_bootstrap: AtomicBool::new(needs_bootstrap),
            dirty: AtomicBool::new(false),
            failures: Mutex::new(FlushFailures::default()),
        })
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn snapshot_store(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn needs_bootstrap(&self) -> bool {
        self.needs_bootstrap.load(Ordering::SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Runs the bootstrap if no usable snapshot was found at open, or when
    /// `force` is set, then flushes. Returns `None` when nothing ran.
    ///
    /// The bootstrap runs at most once per open unless fetching the history
    /// fails, in which case it can be retried.
    pub async fn bootstrap_if_needed<S: TransactionSource>(
        &self,
        source: &S,
        force: bool,
    ) -> Result<Option<BootstrapReport>, ClassifierError> {
        let pending = self.needs_bootstrap.swap(false, Ordering::SeqCst);
        if !pending && !force {
            return Ok(None);
        }

        let report = match BootstrapLoader::new(&self.classifier).run(source).await {
            Ok(report) => report,
            Err(e) => {
                self.needs_bootstrap.store(pending, Ordering::SeqCst);
                return Err(e);
            }
        };
        if let Err(e) = report.check() {
            warn!("{}", e);
        }
        self.flush()?;
        Ok(Some(report))
    }

    /// Classifies the description of a new transaction.
    pub fn on_new_transaction(&self, description: &str) -> Category {
        let category = self.classifier.classify(description);
        info!("Classified '{}' as '{}'", description, category);
        category
    }

    /// Learns from a confirmed category.
    ///
    /// With [`FlushPolicy::EveryUpdate`] the snapshot is written before
    /// returning, and a failed write is returned even though the update is
    /// already live in memory.
    pub fn on_category_confirmed(&self, description: &str, category: &str) -> Result<(), ClassifierError> {
        self.classifier.train(description, category)?;
        info!("Learned '{}' as '{}'", description, category.trim());
        match self.flush_policy {
            FlushPolicy::EveryUpdate => self.flush(),
            FlushPolicy::Interval(_) => {
                self.dirty.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Writes the current model to the snapshot file.
    ///
    /// The model is copied under the training lock and written after that
    /// lock is released. When writes keep failing for longer than the
    /// configured window the error becomes `PersistenceDiverged`.
    pub fn flush(&self) -> Result<(), ClassifierError> {
        // Held across copy and write so a newer copy is never overwritten by
        // an older one. Training is not blocked by it.
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        self.dirty.store(false, Ordering::SeqCst);
        let snapshot = self.classifier.snapshot();
        match self.snapshots.save(&snapshot, &self.settings) {
            Ok(()) => {
                if failures.consecutive > 0 {
                    info!("Snapshot write recovered after {} failure(s)", failures.consecutive);
                }
                *failures = FlushFailures::default();
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                failures.consecutive += 1;
                let since = *failures.since.get_or_insert_with(Instant::now);
                let elapsed = since.elapsed();
                if elapsed >= self.max_failure_window {
                    error!(
                        "Snapshot writes to {:?} have failed {} time(s) over {:?}; model is diverging from durable state: {}",
                        self.snapshots.path(),
                        failures.consecutive,
                        elapsed,
                        e
                    );
                    return Err(ClassifierError::PersistenceDiverged {
                        failures: failures.consecutive,
                        since_secs: elapsed.as_secs(),
                    });
                }
                warn!("Failed to write snapshot ({} in a row): {}", failures.consecutive, e);
                Err(e.into())
            }
        }
    }

    /// Flushes only if updates arrived since the last write.
    pub fn flush_if_dirty(&self) -> Result<bool, ClassifierError> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.flush().map(|()| true)
    }

    /// Starts the background writer for [`FlushPolicy::Interval`].
    ///
    /// Returns `None` for other policies. Must be called inside a Tokio
    /// runtime.
    pub fn spawn_flusher(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = match self.flush_policy {
            FlushPolicy::Interval(period) => period,
            FlushPolicy::EveryUpdate => return None,
        };
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let categorizer = Arc::clone(&this);
                flush_on_blocking_pool(move || categorizer.flush_if_dirty()).await;
            }
        }))
    }
}

/// Runs one flush on the blocking pool. Returns `false` if the flush task
/// panicked or was cancelled; ordinary flush errors are logged by `flush`.
async fn flush_on_blocking_pool<F>(flush: F) -> bool
where
    F: FnOnce() -> Result<bool, ClassifierError> + Send + 'static,
{
    match tokio::task::spawn_blocking(flush).await {
        Ok(_) => true,
        Err(e) => {
            error!("Background snapshot flush did not complete: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CategorizedTransaction;
    use std::fs;

    fn open_in(dir: &std::path::Path, policy: FlushPolicy) -> Categorizer {
        let config = PersistenceConfig::new(dir.join("model.json")).with_flush_policy(policy);
        Categorizer::open(Classifier::builder(), config).unwrap()
    }

    #[test]
    fn test_first_run_needs_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let categorizer = open_in(dir.path(), FlushPolicy::EveryUpdate);
        assert!(categorizer.needs_bootstrap());
        assert!(categorizer.on_new_transaction("anything").is_unknown());
    }

    #[test]
    fn test_every_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let categorizer = open_in(dir.path(), FlushPolicy::EveryUpdate);
        categorizer.on_category_confirmed("gas station", "Fuel").unwrap();
        assert!(!categorizer.is_dirty());

        let reopened = open_in(dir.path(), FlushPolicy::EveryUpdate);
        assert!(!reopened.needs_bootstrap());
        assert_eq!(reopened.on_new_transaction("gas").to_string(), "Fuel");
    }

    #[test]
    fn test_interval_policy_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let categorizer = open_in(dir.path(), FlushPolicy::Interval(Duration::from_secs(60)));
        categorizer.on_category_confirmed("gas station", "Fuel").unwrap();
        assert!(categorizer.is_dirty());
        assert!(!categorizer.snapshot_store().exists());

        assert!(categorizer.flush_if_dirty().unwrap());
        assert!(!categorizer.is_dirty());
        assert!(!categorizer.flush_if_dirty().unwrap());
        assert!(categorizer.snapshot_store().exists());
    }

    #[test]
    fn test_empty_input_reported() {
        let dir = tempfile::tempdir().unwrap();
        let categorizer = open_in(dir.path(), FlushPolicy::EveryUpdate);
        assert!(matches!(
            categorizer.on_category_confirmed("", "Fuel"),
            Err(ClassifierError::EmptyInput(_))
        ));
        assert!(!categorizer.snapshot_store().exists());
    }

    #[test]
    fn test_corrupt_snapshot_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.json"), b"{\"version\":1,").unwrap();
        let categorizer = open_in(dir.path(), FlushPolicy::EveryUpdate);
        assert!(categorizer.needs_bootstrap());
        assert_eq!(categorizer.classifier().info().num_classes, 0);
    }

    fn block_snapshot_path(categorizer: &Categorizer) {
        // A non-empty directory where the snapshot file should go makes the
        // final rename fail
        fs::create_dir_all(categorizer.snapshot_store().path().join("blocker")).unwrap();
    }

    #[test]
    fn test_flush_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let categorizer = open_in(dir.path(), FlushPolicy::EveryUpdate);
        block_snapshot_path(&categorizer);

        assert!(matches!(
            categorizer.on_category_confirmed("water bill", "Utilities"),
            Err(ClassifierError::Snapshot(_))
        ));
        // The update itself is kept in memory
        assert_eq!(categorizer.classifier().info().total_documents, 1);
        assert!(categorizer.is_dirty());
    }

    #[test]
    fn test_persistent_flush_failure_diverges() {
        let dir = tempfile::tempdir().unwrap();
        let config = PersistenceConfig {
            snapshot_path: dir.path().join("model.json"),
            flush_policy: FlushPolicy::EveryUpdate,
            max_failure_window: Duration::ZERO,
        };
        let categorizer = Categorizer::open(Classifier::builder(), config).unwrap();
        block_snapshot_path(&categorizer);

        assert!(matches!(
            categorizer.on_category_confirmed("water bill", "Utilities"),
            Err(ClassifierError::PersistenceDiverged { failures: 1, .. })
        ));
        assert!(matches!(
            categorizer.flush(),
            Err(ClassifierError::PersistenceDiverged { failures: 2, .. })
        ));

        fs::remove_dir_all(categorizer.snapshot_store().path()).unwrap();
        assert!(categorizer.flush().is_ok());
        assert!(!categorizer.is_dirty());
    }

    #[test]
    fn test_unreadable_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::create_dir_all(&path).unwrap();
        let result = Categorizer::open(Classifier::builder(), PersistenceConfig::new(path));
        assert!(matches!(
            result,
            Err(ClassifierError::Snapshot(SnapshotError::Io(_)))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let categorizer = open_in(dir.path(), FlushPolicy::EveryUpdate);
        let history = vec![
            CategorizedTransaction::new("grocery store", "Food"),
            CategorizedTransaction::new("", "Food"),
        ];

        let report = categorizer.bootstrap_if_needed(&history, false).await.unwrap();
        assert_eq!(report, Some(BootstrapReport { applied: 1, skipped: 1 }));
        assert!(categorizer.snapshot_store().exists());

        let again = categorizer.bootstrap_if_needed(&history, false).await.unwrap();
        assert_eq!(again, None);
        assert_eq!(categorizer.classifier().info().total_documents, 1);

        let forced = categorizer.bootstrap_if_needed(&history, true).await.unwrap();
        assert_eq!(forced, Some(BootstrapReport { applied: 1, skipped: 1 }));
        assert_eq!(categorizer.classifier().info().total_documents, 2);
    }

    #[test]
    fn test_snapshot_settings_win_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = PersistenceConfig::new(dir.path().join("model.json"));
        let builder = Classifier::builder().with_smoothing(0.5).unwrap().with_min_token_length(3);
        let categorizer = Categorizer::open(builder, config.clone()).unwrap();
        categorizer.on_category_confirmed("rent to landlord", "Housing").unwrap();

        let reopened = Categorizer::open(Classifier::builder(), config).unwrap();
        let kept = reopened.classifier().config();
        assert_eq!(kept.smoothing, 0.5);
        assert_eq!(kept.min_token_length, 3);
        assert!(reopened.classifier().tokenizer().tokenize("to").is_empty());
        assert_eq!(reopened.classifier().info().total_documents, 1);
    }

    #[tokio::test]
    async fn test_panicking_flush_is_contained() {
        assert!(flush_on_blocking_pool(|| Ok(true)).await);
        assert!(!flush_on_blocking_pool(|| panic!("snapshot writer crashed")).await);
    }

    #[tokio::test]
    async fn test_background_flusher() {
        let dir = tempfile::tempdir().unwrap();
        let categorizer = Arc::new(open_in(dir.path(), FlushPolicy::Interval(Duration::from_millis(20))));
        let immediate = Arc::new(open_in(dir.path(), FlushPolicy::EveryUpdate));
        assert!(immediate.spawn_flusher().is_none());

        let handle = categorizer.spawn_flusher().unwrap();
        categorizer.on_category_confirmed("water bill", "Utilities").unwrap();

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !categorizer.is_dirty() && categorizer.snapshot_store().exists() {
                break;
            }
        }
        handle.abort();
        assert!(categorizer.snapshot_store().exists());
        assert!(!categorizer.is_dirty());
    }
}
