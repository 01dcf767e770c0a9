//! The index manager: inverted, phrase, and embedding indexes.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::embedding::{dot, embed};
use crate::tokenizer::tokenize;

/// A key's entry in the forward index.
///
/// Owns the ordered token list needed to undo the key's contribution to the
/// inverted index, plus the insertion sequence used for stable ordering of
/// search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardPosting {
    /// Tokens of the indexed value, in order, repeats kept.
    pub tokens: Vec<String>,
    /// Monotone insertion sequence; lower means indexed earlier.
    pub seq: u64,
}

/// Serialized picture of the full index state.
///
/// Written to `indexes.json` through the same atomic-rename path as the
/// mapping snapshot, and loaded back verbatim at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedIndexes {
    /// term → key → term frequency.
    pub inverted: HashMap<String, HashMap<String, u32>>,
    /// key → forward posting.
    pub forward: HashMap<String, ForwardPosting>,
    /// Number of indexed documents.
    pub doc_count: usize,
    /// key → lowercased original value.
    pub phrases: HashMap<String, String>,
    /// key → unit-length embedding.
    pub embeddings: HashMap<String, Vec<f64>>,
    /// Next insertion sequence to hand out.
    #[serde(default)]
    pub next_seq: u64,
}

/// Manages all three indexes as one consistent unit.
///
/// Not internally synchronized: the owning store guards it with the master
/// mutex so that a mutation's map update and index update are one atomic
/// transition.
#[derive(Debug, Default)]
pub struct IndexManager {
    inverted: HashMap<String, HashMap<String, u32>>,
    forward: HashMap<String, ForwardPosting>,
    phrases: HashMap<String, String>,
    embeddings: HashMap<String, Vec<f64>>,
    doc_count: usize,
    next_seq: u64,
}

impl IndexManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        IndexManager::default()
    }

    /// Number of indexed documents.
    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    /// True when `key` is indexed.
    pub fn contains(&self, key: &str) -> bool {
        self.forward.contains_key(key)
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Index a key-value pair into all three indexes.
    ///
    /// An existing key is removed first, so overwriting never leaves stale
    /// postings behind.
    pub fn index(&mut self, key: &str, value: &str) {
        if self.forward.contains_key(key) {
            self.remove(key);
        }

        let tokens = tokenize(value);
        for token in &tokens {
            *self
                .inverted
                .entry(token.clone())
                .or_default()
                .entry(key.to_string())
                .or_insert(0) += 1;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.forward
            .insert(key.to_string(), ForwardPosting { tokens, seq });
        self.phrases.insert(key.to_string(), value.to_lowercase());
        self.embeddings.insert(key.to_string(), embed(value));
        self.doc_count += 1;
    }

    /// Remove a key from all three indexes.
    ///
    /// The forward posting drives the cleanup: each referenced term drops
    /// the key, terms with emptied postings disappear entirely.
    pub fn remove(&mut self, key: &str) {
        let Some(posting) = self.forward.remove(key) else {
            return;
        };

        for token in &posting.tokens {
            if let Some(docs) = self.inverted.get_mut(token) {
                docs.remove(key);
                if docs.is_empty() {
                    self.inverted.remove(token);
                }
            }
        }

        self.phrases.remove(key);
        self.embeddings.remove(key);
        self.doc_count = self.doc_count.saturating_sub(1);
    }

    // ------------------------------------------------------------------
    // Full-text search
    // ------------------------------------------------------------------

    fn tf(&self, term: &str, key: &str) -> f64 {
        let Some(posting) = self.forward.get(key) else {
            return 0.0;
        };
        if posting.tokens.is_empty() {
            return 0.0;
        }
        let count = self
            .inverted
            .get(term)
            .and_then(|docs| docs.get(key))
            .copied()
            .unwrap_or(0);
        count as f64 / posting.tokens.len() as f64
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.inverted.get(term).map(HashMap::len).unwrap_or(0);
        if df == 0 {
            return 0.0;
        }
        ((self.doc_count as f64 + 1.0) / (df as f64 + 1.0)).ln()
    }

    /// Full-text search ranked by TF-IDF.
    ///
    /// Candidates are keys matching any query term; each is scored by
    /// Σ tf·idf over the query tokens. Ties break toward earlier insertion.
    pub fn full_text_search(&self, query: &str, top_k: usize) -> Vec<(String, f64)> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut candidates: HashSet<&String> = HashSet::new();
        for token in &query_tokens {
            if let Some(docs) = self.inverted.get(token) {
                candidates.extend(docs.keys());
            }
        }

        let mut scored: Vec<(String, f64, u64)> = candidates
            .into_iter()
            .map(|key| {
                let score: f64 = query_tokens
                    .iter()
                    .map(|token| self.tf(token, key) * self.idf(token))
                    .sum();
                let seq = self.forward.get(key).map(|p| p.seq).unwrap_or(u64::MAX);
                (key.clone(), score, seq)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
        scored
            .into_iter()
            .take(top_k)
            .map(|(key, score, _)| (key, score))
            .collect()
    }

    // ------------------------------------------------------------------
    // Phrase search
    // ------------------------------------------------------------------

    /// Keys whose lowercased value contains the lowercased phrase as a
    /// substring, in insertion order.
    pub fn phrase_search(&self, phrase: &str) -> Vec<String> {
        let needle = phrase.to_lowercase();
        let mut matches: Vec<(u64, &String)> = self
            .phrases
            .iter()
            .filter(|(_, text)| text.contains(&needle))
            .map(|(key, _)| {
                let seq = self.forward.get(key).map(|p| p.seq).unwrap_or(u64::MAX);
                (seq, key)
            })
            .collect();
        matches.sort_by_key(|&(seq, _)| seq);
        matches.into_iter().map(|(_, key)| key.clone()).collect()
    }

    // ------------------------------------------------------------------
    // Semantic search
    // ------------------------------------------------------------------

    /// Rank every key by cosine similarity between its stored embedding and
    /// the query embedding. Scores are rounded to 4 decimal places.
    pub fn semantic_search(&self, query: &str, top_k: usize) -> Vec<(String, f64)> {
        let query_vector = embed(query);

        let mut scored: Vec<(String, f64, u64)> = self
            .embeddings
            .iter()
            .map(|(key, vector)| {
                let score = round4(dot(&query_vector, vector));
                let seq = self.forward.get(key).map(|p| p.seq).unwrap_or(u64::MAX);
                (key.clone(), score, seq)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
        scored
            .into_iter()
            .take(top_k)
            .map(|(key, score, _)| (key, score))
            .collect()
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Emit the full index state for persistence.
    pub fn snapshot(&self) -> SavedIndexes {
        SavedIndexes {
            inverted: self.inverted.clone(),
            forward: self.forward.clone(),
            doc_count: self.doc_count,
            phrases: self.phrases.clone(),
            embeddings: self.embeddings.clone(),
            next_seq: self.next_seq,
        }
    }

    /// Reconstruct a manager from persisted state.
    pub fn restore(saved: SavedIndexes) -> Self {
        // Older snapshots may predate next_seq; never hand out a seq that
        // an existing posting already holds.
        let max_seq = saved
            .forward
            .values()
            .map(|p| p.seq + 1)
            .max()
            .unwrap_or(0);
        IndexManager {
            inverted: saved.inverted,
            forward: saved.forward,
            phrases: saved.phrases,
            embeddings: saved.embeddings,
            doc_count: saved.doc_count,
            next_seq: saved.next_seq.max(max_seq),
        }
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
