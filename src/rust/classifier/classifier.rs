use std::fmt;
use std::sync::{Mutex, PoisonError};

use log::debug;

use super::error::ClassifierError;
use super::store::{ClassLabel, ClassView, ModelSnapshot, ModelStore};
use super::tokenizer::Tokenizer;
use super::utils::{log_likelihood, log_prior};
use super::ClassifierInfo;
use crate::config::ClassifierConfig;

/// Label reported by [`Category::Unknown`].
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Outcome of a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// The model has no classes yet and holds no opinion
    Unknown,
    /// A trained class label
    Known(String),
}

impl Category {
    pub fn label(&self) -> Option<&str> {
        match self {
            Category::Unknown => None,
            Category::Known(label) => Some(label.as_str()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Category::Unknown)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Unknown => f.write_str(UNKNOWN_CATEGORY),
            Category::Known(label) => f.write_str(label),
        }
    }
}

/// A classification together with the score of every class.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub category: Category,
    /// `(label, log-posterior score)` ordered best first; equal scores are
    /// ordered by lower-cased label
    pub scores: Vec<(String, f64)>,
}

impl Prediction {
    /// Distance between the winning score and the runner-up.
    pub fn margin(&self) -> Option<f64> {
        match self.scores.as_slice() {
            [(_, best), (_, second), ..] => Some(best - second),
            _ => None,
        }
    }

    pub fn score(&self, label: &str) -> Option<f64> {
        self.scores.iter().find(|(l, _)| l == label).map(|(_, s)| *s)
    }
}

/// An incrementally trained multinomial naive Bayes text classifier.
///
/// # Thread Safety
///
/// `Classifier` is `Send + Sync` and meant to be shared behind an `Arc`.
/// Training calls are serialized by an internal lock; classification never
/// takes that lock and reads each class under the class's own read lock, so
/// queries run in parallel with each other and with training.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use categorist::{Category, Classifier};
///
/// let classifier = Classifier::builder().build()?;
/// assert_eq!(classifier.classify("anything"), Category::Unknown);
///
/// classifier.train("Grocery store downtown", "Food")?;
/// classifier.train("Shell fuel station", "Transport")?;
/// assert_eq!(classifier.classify("grocery store").to_string(), "Food");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Classifier {
    store: ModelStore,
    tokenizer: Tokenizer,
    smoothing: f64,
    training_lock: Mutex<()>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    pub(crate) fn from_parts(store: ModelStore, tokenizer: Tokenizer, smoothing: f64) -> Self {
        Self {
            store,
            tokenizer,
            smoothing,
            training_lock: Mutex::new(()),
        }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// The settings this classifier was built with.
    pub fn config(&self) -> ClassifierConfig {
        ClassifierConfig {
            smoothing: self.smoothing,
            min_token_length: self.tokenizer.min_length(),
            stop_words: self.tokenizer.stop_words().clone(),
        }
    }

    /// Read access to the underlying counts.
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> ClassifierInfo {
        let doc_counts = self.store.doc_counts();
        ClassifierInfo {
            num_classes: doc_counts.len(),
            class_labels: doc_counts.iter().map(|(label, _)| label.clone()).collect(),
            doc_counts,
            total_documents: self.store.total_documents(),
            vocabulary_size: self.store.vocabulary_size(),
            smoothing: self.smoothing,
        }
    }

    /// Learns a single labelled description.
    ///
    /// Every token occurrence is added to the class's counts and the class's
    /// document count grows by one, all in one step as seen by readers.
    ///
    /// # Errors
    /// `EmptyInput` when the class is blank or the description has no tokens
    /// left after tokenization. Nothing is recorded in that case.
    pub fn train(&self, description: &str, class: &str) -> Result<(), ClassifierError> {
        let label = ClassLabel::parse(class).ok_or_else(|| ClassifierError::empty("Class label"))?;
        let tokens = self.tokenizer.tokenize(description);
        if tokens.is_empty() {
            return Err(ClassifierError::empty("Description"));
        }

        let _guard = self.training_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.apply_document(&label, &tokens);
        debug!("Trained class '{}' on {} token(s)", label.display(), tokens.len());
        Ok(())
    }

    /// Returns the most probable class for `description`.
    ///
    /// See [`Classifier::predict`] for the scoring rules.
    pub fn classify(&self, description: &str) -> Category {
        self.predict(description).category
    }

    /// Scores every class for `description`.
    ///
    /// Each class `c` gets `ln(P(c)) + Σ ln(P(token | c))` with
    /// `P(c) = docs(c) / docs` and Laplace smoothing
    /// `P(token | c) = (count(c, token) + α) / (tokens(c) + α · |V|)`, where
    /// `|V|` is the global vocabulary size. Sums are taken in log space.
    ///
    /// The highest score wins. On an exact tie the class whose normalized
    /// (lower-cased) label sorts first wins, so `"apple"` beats `"Banana"`.
    /// An empty description is scored on priors alone. With no trained
    /// classes at all the result is [`Category::Unknown`].
    pub fn predict(&self, description: &str) -> Prediction {
        let tokens = self.tokenizer.tokenize(description);
        let views: Vec<ClassView> = self
            .store
            .views(&tokens)
            .into_iter()
            .filter(|view| view.doc_count > 0)
            .collect();
        if views.is_empty() {
            return Prediction {
                category: Category::Unknown,
                scores: Vec::new(),
            };
        }

        let vocabulary_size = self.store.vocabulary_size();
        let total_documents: u64 = views.iter().map(|view| view.doc_count).sum();
        let num_classes = views.len();

        let mut ranked: Vec<(String, String, f64)> = views
            .into_iter()
            .map(|view| {
                let mut score = log_prior(view.doc_count, total_documents, num_classes);
                for &count in &view.token_counts {
                    score += log_likelihood(count, view.total_tokens, self.smoothing, vocabulary_size);
                }
                (view.label.to_lowercase(), view.label, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        let scores: Vec<(String, f64)> = ranked.into_iter().map(|(_, label, score)| (label, score)).collect();

        Prediction {
            category: Category::Known(scores[0].0.clone()),
            scores,
        }
    }

    /// Smoothed `P(token | class)`, or `None` if the class is unknown.
    pub fn token_likelihood(&self, class: &str, token: &str) -> Option<f64> {
        let label = ClassLabel::parse(class)?;
        let token = token.to_lowercase();
        let view = self.store.view(&label, &token)?;
        let count = view.token_counts.first().copied().unwrap_or(0);
        Some(log_likelihood(count, view.total_tokens, self.smoothing, self.store.vocabulary_size()).exp())
    }

    /// Copies the model while holding the training lock, so the copy is
    /// exact. Writing the copy to disk happens outside the lock.
    pub fn snapshot(&self) -> ModelSnapshot {
        let _guard = self.training_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.to_snapshot()
    }
}
