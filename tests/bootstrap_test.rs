use categorist::{
    rebuild_snapshot, BootstrapLoader, BootstrapReport, CategorizedTransaction, Categorizer, Classifier,
    ClassifierError, LedgerError, PersistenceConfig, SnapshotStore, TransactionSource,
};

struct FailingSource;

impl TransactionSource for FailingSource {
    async fn fetch_all_categorized(&self) -> Result<Vec<CategorizedTransaction>, LedgerError> {
        Err(LedgerError::Status {
            status: 401,
            body: "Unauthenticated.".to_string(),
        })
    }
}

fn history_with_one_malformed() -> Vec<CategorizedTransaction> {
    let mut records: Vec<CategorizedTransaction> = (0..99)
        .map(|i| {
            let category = if i % 3 == 0 { "Groceries" } else { "Fuel" };
            CategorizedTransaction::new(format!("merchant {} purchase", i), category)
        })
        .collect();
    records.insert(42, CategorizedTransaction::new("Mystery charge", ""));
    records
}

#[tokio::test]
async fn test_partial_bootstrap_tolerance() -> Result<(), ClassifierError> {
    let classifier = Classifier::builder().build()?;
    let history = history_with_one_malformed();
    assert_eq!(history.len(), 100);

    let report = BootstrapLoader::new(&classifier).run(&history).await?;
    assert_eq!(report, BootstrapReport { applied: 99, skipped: 1 });
    assert_eq!(classifier.info().total_documents, 99);
    assert!(matches!(
        report.check(),
        Err(ClassifierError::PartialBootstrapFailure { applied: 99, skipped: 1 })
    ));
    Ok(())
}

#[tokio::test]
async fn test_rerun_adds_counts() -> Result<(), ClassifierError> {
    let classifier = Classifier::builder().build()?;
    let history = vec![
        CategorizedTransaction::new("grocery store", "Food"),
        CategorizedTransaction::new("bus ticket", "Transport"),
    ];
    let loader = BootstrapLoader::new(&classifier);
    loader.run(&history).await?;
    loader.run(&history).await?;

    let info = classifier.info();
    assert_eq!(info.total_documents, 4);
    assert_eq!(info.doc_counts, vec![("Food".to_string(), 2), ("Transport".to_string(), 2)]);
    assert_eq!(classifier.classify("grocery").to_string(), "Food");
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_is_an_error() -> Result<(), ClassifierError> {
    let classifier = Classifier::builder().build()?;
    let result = BootstrapLoader::new(&classifier).run(&FailingSource).await;
    assert!(matches!(
        result,
        Err(ClassifierError::Ledger(LedgerError::Status { status: 401, .. }))
    ));
    assert_eq!(classifier.info().total_documents, 0);
    Ok(())
}

fn trained_snapshot(dir: &std::path::Path) -> Result<SnapshotStore, ClassifierError> {
    let config = PersistenceConfig::new(dir.join("model.json"));
    let categorizer = Categorizer::open(Classifier::builder(), config)?;
    categorizer.on_category_confirmed("monthly rent", "Housing")?;
    Ok(categorizer.snapshot_store().clone())
}

#[tokio::test]
async fn test_rebuild_keeps_snapshot_when_fetch_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = trained_snapshot(dir.path())?;
    let before = std::fs::read(store.path())?;

    let result = rebuild_snapshot(Classifier::builder(), &FailingSource, &store).await;
    assert!(matches!(result, Err(ClassifierError::Ledger(_))));

    assert_eq!(std::fs::read(store.path())?, before);
    let reopened = Categorizer::open(Classifier::builder(), PersistenceConfig::new(store.path()))?;
    assert!(!reopened.needs_bootstrap());
    assert_eq!(reopened.on_new_transaction("rent").to_string(), "Housing");
    Ok(())
}

#[tokio::test]
async fn test_rebuild_replaces_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = trained_snapshot(dir.path())?;
    let history = vec![
        CategorizedTransaction::new("grocery store", "Food"),
        CategorizedTransaction::new("bus ticket", "Transport"),
    ];

    let report = rebuild_snapshot(Classifier::builder(), &history, &store).await?;
    assert_eq!(report, BootstrapReport { applied: 2, skipped: 0 });

    let stored = store.load()?;
    assert_eq!(stored.model.total_documents, 2);
    assert!(!stored.model.classes.contains_key("housing"));
    Ok(())
}
