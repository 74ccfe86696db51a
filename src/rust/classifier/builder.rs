use std::collections::HashSet;

use log::info;

use super::classifier::Classifier;
use super::error::ClassifierError;
use super::store::{ModelSnapshot, ModelStore};
use super::tokenizer::Tokenizer;
use crate::config::ClassifierConfig;
use crate::persistence::SnapshotError;

/// A builder for constructing a Classifier with a fluent interface.
#[derive(Default, Debug)]
pub struct ClassifierBuilder {
    config: ClassifierConfig,
    snapshot: Option<ModelSnapshot>,
}

impl ClassifierBuilder {
    /// Creates a new empty ClassifierBuilder instance with default configuration
    ///
    /// # Example
    /// ```
    /// use categorist::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            config: ClassifierConfig::default(),
            snapshot: None,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Replaces the whole configuration
    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the Laplace smoothing constant
    ///
    /// # Returns
    /// * `Err(ClassifierError::InvalidConfig)` if `alpha` is not a finite,
    ///   strictly positive number
    ///
    /// # Example
    /// ```
    /// use categorist::ClassifierBuilder;
    ///
    /// assert!(ClassifierBuilder::new().with_smoothing(0.5).is_ok());
    /// assert!(ClassifierBuilder::new().with_smoothing(0.0).is_err());
    /// ```
    pub fn with_smoothing(mut self, alpha: f64) -> Result<Self, ClassifierError> {
        Self::validate_smoothing(alpha)?;
        self.config.smoothing = alpha;
        Ok(self)
    }

    /// Sets the minimum token length in characters
    pub fn with_min_token_length(mut self, min_length: usize) -> Self {
        self.config.min_token_length = min_length;
        self
    }

    /// Sets the words dropped by the tokenizer
    pub fn with_stop_words(mut self, stop_words: HashSet<String>) -> Self {
        self.config.stop_words = stop_words;
        self
    }

    /// Starts the classifier from previously persisted counts instead of an
    /// empty model
    pub fn with_snapshot(mut self, snapshot: ModelSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    fn validate_smoothing(alpha: f64) -> Result<(), ClassifierError> {
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(ClassifierError::InvalidConfig(format!(
                "Smoothing constant must be a positive number, got {}",
                alpha
            )));
        }
        Ok(())
    }

    /// Builds and returns the final Classifier instance
    ///
    /// # Returns
    /// * `Result<Classifier, ClassifierError>` - The constructed Classifier if successful, or an error if:
    ///   - The smoothing constant is invalid
    ///   - The minimum token length is zero
    ///   - A snapshot was supplied that violates the model invariants
    ///
    /// # Example
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use categorist::{english_stop_words, ClassifierBuilder};
    ///
    /// let classifier = ClassifierBuilder::new()
    ///     .with_smoothing(1.0)?
    ///     .with_min_token_length(2)
    ///     .with_stop_words(english_stop_words())
    ///     .build()?;
    /// assert_eq!(classifier.info().num_classes, 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn build(self) -> Result<Classifier, ClassifierError> {
        Self::validate_smoothing(self.config.smoothing)?;
        if self.config.min_token_length == 0 {
            return Err(ClassifierError::InvalidConfig(
                "Minimum token length must be at least 1".to_string(),
            ));
        }

        let store = match self.snapshot {
            Some(snapshot) => {
                snapshot
                    .validate()
                    .map_err(SnapshotError::CorruptState)?;
                info!(
                    "Hydrating classifier with {} class(es), {} document(s), {} token(s) of vocabulary",
                    snapshot.classes.len(),
                    snapshot.total_documents,
                    snapshot.vocabulary.len()
                );
                ModelStore::from_snapshot(snapshot)
            }
            None => ModelStore::new(),
        };

        let tokenizer = Tokenizer::new(self.config.min_token_length, self.config.stop_words);
        Ok(Classifier::from_parts(store, tokenizer, self.config.smoothing))
    }
}
