use log::{debug, info, warn};

use crate::classifier::{Classifier, ClassifierBuilder, ClassifierError};
use crate::ledger::{CategorizedTransaction, TransactionSource};
use crate::persistence::{ModelSettings, SnapshotStore};

/// Counts from a bootstrap pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Records that produced a training update
    pub applied: usize,
    /// Records rejected as malformed
    pub skipped: usize,
}

impl BootstrapReport {
    pub fn total(&self) -> usize {
        self.applied + self.skipped
    }

    /// `Err(PartialBootstrapFailure)` if any record was skipped. Skips never
    /// undo the records that were applied.
    pub fn check(&self) -> Result<(), ClassifierError> {
        if self.skipped > 0 {
            return Err(ClassifierError::PartialBootstrapFailure {
                applied: self.applied,
                skipped: self.skipped,
            });
        }
        Ok(())
    }
}

/// Feeds the ledger's categorized history through [`Classifier::train`].
///
/// Running it twice counts every record twice. The classifier only compares
/// relative frequencies, so a rerun after an interrupted bootstrap skews the
/// counts slightly but does not break anything.
pub struct BootstrapLoader<'a> {
    classifier: &'a Classifier,
}

impl<'a> BootstrapLoader<'a> {
    pub fn new(classifier: &'a Classifier) -> Self {
        Self { classifier }
    }

    /// Trains on every record, skipping the ones with a missing description
    /// or category.
    pub fn ingest<I>(&self, records: I) -> BootstrapReport
    where
        I: IntoIterator<Item = CategorizedTransaction>,
    {
        let mut report = BootstrapReport::default();
        for (index, record) in records.into_iter().enumerate() {
            match self.classifier.train(&record.description, &record.category) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    debug!("Skipping bootstrap record {}: {}", index, e);
                    report.skipped += 1;
                }
            }
        }

        if report.skipped > 0 {
            warn!(
                "Bootstrap skipped {} malformed record(s), applied {}",
                report.skipped, report.applied
            );
        } else {
            info!("Bootstrap applied {} record(s)", report.applied);
        }
        report
    }

    /// Fetches the full history from `source` and ingests it.
    ///
    /// # Errors
    /// Only a failure to fetch is an error; malformed records are counted in
    /// the report instead.
    pub async fn run<S: TransactionSource>(&self, source: &S) -> Result<BootstrapReport, ClassifierError> {
        info!("Bootstrapping classifier from ledger history...");
        let records = source.fetch_all_categorized().await?;
        info!("Received {} categorized transaction(s)", records.len());
        Ok(self.ingest(records))
    }
}

/// Trains a fresh model on the full history and writes it over the snapshot
/// at `store`.
///
/// The history is fetched before anything on disk is touched and the new
/// snapshot replaces the old one by rename, so a failed fetch or write leaves
/// the existing snapshot as it was.
pub async fn rebuild_snapshot<S: TransactionSource>(
    builder: ClassifierBuilder,
    source: &S,
    store: &SnapshotStore,
) -> Result<BootstrapReport, ClassifierError> {
    let classifier = builder.build()?;
    let report = BootstrapLoader::new(&classifier).run(source).await?;
    store.save(&classifier.snapshot(), &ModelSettings::from(&classifier.config()))?;
    info!("Replaced snapshot at {:?} with a freshly trained model", store.path());
    Ok(report)
}
