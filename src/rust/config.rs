use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::ledger::LedgerError;

/// Tuning for tokenization and scoring.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Laplace smoothing constant; must be finite and positive
    pub smoothing: f64,
    /// Tokens shorter than this many characters are discarded
    pub min_token_length: usize,
    pub stop_words: HashSet<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            smoothing: 1.0,
            min_token_length: 1,
            stop_words: HashSet::new(),
        }
    }
}

/// When trained counts are written to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Write after every training update. Nothing is lost on a crash, at the
    /// cost of one full snapshot write per update.
    EveryUpdate,
    /// Mark the model dirty and let a background task write it on this
    /// interval. Up to one interval of updates can be lost on a crash.
    Interval(Duration),
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::EveryUpdate
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub snapshot_path: PathBuf,
    pub flush_policy: FlushPolicy,
    /// How long flushes may keep failing before it is reported as divergence
    pub max_failure_window: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: Self::default_snapshot_path(),
            flush_policy: FlushPolicy::default(),
            max_failure_window: Duration::from_secs(300),
        }
    }
}

impl PersistenceConfig {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            ..Self::default()
        }
    }

    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Returns the default snapshot path
    pub fn default_snapshot_path() -> PathBuf {
        Self::default_data_dir().join("model.json")
    }

    fn default_data_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("CATEGORIST_DATA") {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("categorist");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("categorist");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("categorist")
    }
}

/// Connection settings for the Firefly III ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL of the Firefly III instance, e.g. `https://firefly.example.org`
    pub base_url: String,
    /// Personal access token
    pub api_key: String,
    pub timeout: Duration,
}

impl LedgerConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Reads `FF_APP` and `FF_API_KEY` from the environment.
    pub fn from_env() -> Result<Self, LedgerError> {
        let base_url = non_empty_var("FF_APP").ok_or(LedgerError::MissingConfig("FF_APP"))?;
        let api_key = non_empty_var("FF_API_KEY").ok_or(LedgerError::MissingConfig("FF_API_KEY"))?;
        Ok(Self::new(base_url, api_key))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_defaults() {
        let config = ClassifierConfig::default();
        assert_eq!(config.smoothing, 1.0);
        assert_eq!(config.min_token_length, 1);
        assert!(config.stop_words.is_empty());
    }

    #[test]
    fn test_default_snapshot_path() {
        // Test with environment variable
        env::set_var("CATEGORIST_DATA", "/tmp/test-categorist");
        let path = PersistenceConfig::default_snapshot_path();
        assert_eq!(path, PathBuf::from("/tmp/test-categorist/model.json"));
        env::remove_var("CATEGORIST_DATA");

        // Test without environment variable
        let path = PersistenceConfig::default_snapshot_path();
        assert!(path.to_str().unwrap().contains("categorist"));
        assert!(path.ends_with("model.json"));
    }

    #[test]
    fn test_ledger_config_trims_trailing_slash() {
        let config = LedgerConfig::new("https://firefly.local/", "token");
        assert_eq!(config.base_url, "https://firefly.local");
        assert_eq!(config.timeout, LedgerConfig::DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_flush_policy_default() {
        assert_eq!(PersistenceConfig::new("/tmp/x.json").flush_policy, FlushPolicy::EveryUpdate);
    }
}
