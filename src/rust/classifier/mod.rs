mod error;
mod classifier;
pub mod builder;
mod store;
mod tokenizer;
mod utils;

pub use error::ClassifierError;
pub use classifier::{Category, Classifier, Prediction, UNKNOWN_CATEGORY};
pub use builder::ClassifierBuilder;
pub use store::{ClassCounts, ClassLabel, ClassSnapshot, ModelSnapshot, ModelStore};
pub use tokenizer::{english_stop_words, Tokenizer};

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInfo {
    /// Number of classes the classifier has learned
    pub num_classes: usize,
    /// Labels of the classes, sorted
    pub class_labels: Vec<String>,
    /// Training examples seen per class, sorted by label
    pub doc_counts: Vec<(String, u64)>,
    /// Training examples seen in total
    pub total_documents: u64,
    /// Distinct tokens ever seen
    pub vocabulary_size: usize,
    /// Laplace smoothing constant
    pub smoothing: f64,
}
