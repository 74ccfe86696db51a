//! An incrementally trained text classifier that learns transaction
//! categories from a ledger's history and from every category a user confirms.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use categorist::{Category, Classifier};
//!
//! let classifier = Classifier::builder()
//!     .with_smoothing(1.0)?
//!     .build()?;
//!
//! classifier.train("REWE Markt Berlin", "Groceries")?;
//! classifier.train("Deutsche Bahn ticket", "Transport")?;
//!
//! let prediction = classifier.predict("rewe markt");
//! assert_eq!(prediction.category, Category::Known("Groceries".into()));
//! println!("margin over runner-up: {:?}", prediction.margin());
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The classifier is thread-safe and can be shared across threads using `Arc`.
//! Classification runs concurrently with training:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use categorist::Classifier;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let classifier = Arc::new(Classifier::builder().build()?);
//!
//! let mut handles = vec![];
//! for i in 0..3 {
//!     let classifier = Arc::clone(&classifier);
//!     handles.push(thread::spawn(move || {
//!         classifier.train("sample text", &format!("class_{}", i)).unwrap();
//!         classifier.classify("sample");
//!     }));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! assert_eq!(classifier.info().total_documents, 3);
//! # Ok(())
//! # }
//! ```
//!
//! # Persistence
//!
//! [`Categorizer`] ties a classifier to a snapshot file: it loads the model
//! at start, bootstraps from the ledger when there is nothing to load, and
//! writes the model back after training.

pub mod classifier;
pub mod bootstrap;
pub mod config;
pub mod ledger;
pub mod persistence;
pub mod server;
pub mod service;
pub mod webhook;

pub use classifier::{
    english_stop_words, Category, Classifier, ClassifierBuilder, ClassifierError, ClassifierInfo,
    ClassLabel, ModelSnapshot, ModelStore, Prediction, Tokenizer, UNKNOWN_CATEGORY,
};
pub use bootstrap::{rebuild_snapshot, BootstrapLoader, BootstrapReport};
pub use config::{ClassifierConfig, FlushPolicy, LedgerConfig, PersistenceConfig};
pub use ledger::{CategorizedTransaction, FireflyClient, LedgerError, TransactionSource};
pub use persistence::{ModelSettings, SnapshotError, SnapshotStore, StoredModel};
pub use server::AppState;
pub use service::Categorizer;
pub use webhook::WebhookPayload;

pub fn init_logger() {
    env_logger::init();
}
