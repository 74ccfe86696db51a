use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// A normalized class label.
///
/// Identity is the trimmed, lower-cased form of the label, so `"Food"` and
/// `" food "` name the same class. The display spelling is whatever the
/// caller passed in, trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassLabel {
    key: String,
    display: String,
}

impl ClassLabel {
    /// Returns `None` when the label is empty after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let display = raw.trim();
        if display.is_empty() {
            return None;
        }
        Some(Self {
            key: display.to_lowercase(),
            display: display.to_string(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn display(&self) -> &str {
        &self.display
    }
}

/// Sufficient statistics for a single class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassCounts {
    /// Spelling of the label the first time the class was seen
    pub label: String,
    /// Number of training examples labelled with this class
    pub doc_count: u64,
    /// Sum of all token occurrences, kept alongside `tokens` so the
    /// likelihood denominator never needs a scan
    pub total_tokens: u64,
    pub tokens: HashMap<String, u64>,
}

/// A consistent read of one class, restricted to the tokens a query needs.
#[derive(Debug, Clone)]
pub(crate) struct ClassView {
    pub label: String,
    pub doc_count: u64,
    pub total_tokens: u64,
    /// Counts aligned with the query tokens
    pub token_counts: Vec<u64>,
}

type SharedCounts = Arc<RwLock<ClassCounts>>;

fn add_document(counts: &mut ClassCounts, tokens: &[String]) {
    for token in tokens {
        *counts.tokens.entry(token.clone()).or_insert(0) += 1;
    }
    counts.total_tokens += tokens.len() as u64;
    counts.doc_count += 1;
}

// Counters are only ever mutated in whole steps under the lock, so the data
// behind a poisoned lock is still consistent.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Per-class token and document counts plus the global vocabulary.
///
/// Each class lives behind its own lock, so a reader always sees a class's
/// counts either before or after a whole training example, never halfway.
/// Different classes may be observed at slightly different moments. The
/// store only grows: nothing is ever decremented or removed.
#[derive(Debug, Default)]
pub struct ModelStore {
    classes: RwLock<HashMap<String, SharedCounts>>,
    vocabulary: RwLock<HashSet<String>>,
    total_documents: AtomicU64,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counters for `class`, creating an empty entry on first
    /// reference.
    pub fn get_or_create(&self, class: &ClassLabel) -> Arc<RwLock<ClassCounts>> {
        if let Some(existing) = read(&self.classes).get(class.key()) {
            return Arc::clone(existing);
        }
        let mut classes = write(&self.classes);
        let entry = classes.entry(class.key().to_string()).or_insert_with(|| {
            Arc::new(RwLock::new(ClassCounts {
                label: class.display().to_string(),
                ..ClassCounts::default()
            }))
        });
        Arc::clone(entry)
    }

    fn get(&self, class: &ClassLabel) -> Option<SharedCounts> {
        read(&self.classes).get(class.key()).cloned()
    }

    fn add_to_vocabulary<'a>(&self, tokens: impl IntoIterator<Item = &'a String>) {
        let mut vocabulary = write(&self.vocabulary);
        for token in tokens {
            if !vocabulary.contains(token) {
                vocabulary.insert(token.clone());
            }
        }
    }

    pub fn increment_count(&self, class: &ClassLabel, token: &str) {
        let counts = self.get_or_create(class);
        {
            let mut counts = write(&counts);
            *counts.tokens.entry(token.to_string()).or_insert(0) += 1;
            counts.total_tokens += 1;
        }
        self.add_to_vocabulary([&token.to_string()]);
    }

    pub fn increment_doc_count(&self, class: &ClassLabel) {
        let counts = self.get_or_create(class);
        write(&counts).doc_count += 1;
        self.total_documents.fetch_add(1, Ordering::SeqCst);
    }

    /// Applies one training example to `class` under a single lock
    /// acquisition: every token occurrence plus one document.
    ///
    /// A class seen for the first time is inserted already holding the
    /// example, so readers never observe a class without documents.
    pub fn apply_document(&self, class: &ClassLabel, tokens: &[String]) {
        match self.get(class) {
            Some(counts) => add_document(&mut write(&counts), tokens),
            None => {
                let mut classes = write(&self.classes);
                match classes.get(class.key()) {
                    Some(counts) => add_document(&mut write(counts), tokens),
                    None => {
                        let mut counts = ClassCounts {
                            label: class.display().to_string(),
                            ..ClassCounts::default()
                        };
                        add_document(&mut counts, tokens);
                        classes.insert(class.key().to_string(), Arc::new(RwLock::new(counts)));
                    }
                }
            }
        }
        self.add_to_vocabulary(tokens);
        self.total_documents.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self, class: &ClassLabel, token: &str) -> u64 {
        match self.get(class) {
            Some(counts) => {
                let counts = read(&counts);
                counts.tokens.get(token).copied().unwrap_or(0)
            }
            None => 0,
        }
    }

    pub fn doc_count(&self, class: &ClassLabel) -> u64 {
        match self.get(class) {
            Some(counts) => {
                let counts = read(&counts);
                counts.doc_count
            }
            None => 0,
        }
    }

    pub fn total_documents(&self) -> u64 {
        self.total_documents.load(Ordering::SeqCst)
    }

    pub fn vocabulary_size(&self) -> usize {
        read(&self.vocabulary).len()
    }

    pub fn num_classes(&self) -> usize {
        read(&self.classes).len()
    }

    /// Display labels of every known class.
    pub fn classes(&self) -> BTreeSet<String> {
        let handles: Vec<SharedCounts> = read(&self.classes).values().cloned().collect();
        handles.iter().map(|counts| read(counts).label.clone()).collect()
    }

    /// Returns `(label, doc_count)` for every class, sorted by label.
    pub fn doc_counts(&self) -> Vec<(String, u64)> {
        let handles: Vec<SharedCounts> = read(&self.classes).values().cloned().collect();
        let mut counts: Vec<(String, u64)> = handles
            .iter()
            .map(|counts| {
                let counts = read(counts);
                (counts.label.clone(), counts.doc_count)
            })
            .collect();
        counts.sort();
        counts
    }

    /// Reads every class once, each under its own read lock.
    pub(crate) fn views(&self, tokens: &[String]) -> Vec<ClassView> {
        let handles: Vec<SharedCounts> = read(&self.classes).values().cloned().collect();
        handles
            .iter()
            .map(|counts| {
                let counts = read(counts);
                ClassView {
                    label: counts.label.clone(),
                    doc_count: counts.doc_count,
                    total_tokens: counts.total_tokens,
                    token_counts: tokens
                        .iter()
                        .map(|token| counts.tokens.get(token).copied().unwrap_or(0))
                        .collect(),
                }
            })
            .collect()
    }

    pub(crate) fn view(&self, class: &ClassLabel, token: &str) -> Option<ClassView> {
        let counts = self.get(class)?;
        let counts = read(&counts);
        Some(ClassView {
            label: counts.label.clone(),
            doc_count: counts.doc_count,
            total_tokens: counts.total_tokens,
            token_counts: vec![counts.tokens.get(token).copied().unwrap_or(0)],
        })
    }

    /// Copies the whole store into an ordered, serializable form.
    ///
    /// Callers that need an exact point-in-time copy must stop writers first;
    /// the classifier does this by holding its training lock.
    pub fn to_snapshot(&self) -> ModelSnapshot {
        let handles: Vec<(String, SharedCounts)> = read(&self.classes)
            .iter()
            .map(|(key, counts)| (key.clone(), Arc::clone(counts)))
            .collect();
        let classes = handles
            .into_iter()
            .map(|(key, counts)| {
                let counts = read(&counts);
                let snapshot = ClassSnapshot {
                    label: counts.label.clone(),
                    doc_count: counts.doc_count,
                    total_tokens: counts.total_tokens,
                    tokens: counts.tokens.iter().map(|(t, c)| (t.clone(), *c)).collect(),
                };
                (key, snapshot)
            })
            .collect();
        ModelSnapshot {
            total_documents: self.total_documents(),
            vocabulary: read(&self.vocabulary).iter().cloned().collect(),
            classes,
        }
    }

    pub fn from_snapshot(snapshot: ModelSnapshot) -> Self {
        let classes = snapshot
            .classes
            .into_iter()
            .map(|(key, class)| {
                let counts = ClassCounts {
                    label: class.label,
                    doc_count: class.doc_count,
                    total_tokens: class.total_tokens,
                    tokens: class.tokens.into_iter().collect(),
                };
                (key, Arc::new(RwLock::new(counts)))
            })
            .collect();
        Self {
            classes: RwLock::new(classes),
            vocabulary: RwLock::new(snapshot.vocabulary.into_iter().collect()),
            total_documents: AtomicU64::new(snapshot.total_documents),
        }
    }
}

/// Serializable copy of a [`ModelStore`].
///
/// Ordered collections make serialization canonical, which the snapshot
/// checksum relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub total_documents: u64,
    pub vocabulary: BTreeSet<String>,
    pub classes: BTreeMap<String, ClassSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSnapshot {
    pub label: String,
    pub doc_count: u64,
    pub total_tokens: u64,
    pub tokens: BTreeMap<String, u64>,
}

impl ModelSnapshot {
    /// Checks the invariants a store built by training always satisfies.
    pub fn validate(&self) -> Result<(), String> {
        let mut documents = 0u64;
        for (key, class) in &self.classes {
            match ClassLabel::parse(&class.label) {
                Some(label) if label.key() == key.as_str() => {}
                _ => return Err(format!("class key '{}' does not match label '{}'", key, class.label)),
            }
            let total: u64 = class.tokens.values().sum();
            if total != class.total_tokens {
                return Err(format!(
                    "class '{}' token total is {} but counts sum to {}",
                    class.label, class.total_tokens, total
                ));
            }
            if let Some(token) = class.tokens.keys().find(|t| !self.vocabulary.contains(*t)) {
                return Err(format!("token '{}' of class '{}' missing from vocabulary", token, class.label));
            }
            documents += class.doc_count;
        }
        if documents != self.total_documents {
            return Err(format!(
                "total documents is {} but class counts sum to {}",
                self.total_documents, documents
            ));
        }
        Ok(())
    }
}
