//! Memory stores
//!
//! [`InMemoryStore`] keeps records for the lifetime of the process and ranks
//! them by keyword overlap. The SQLite-backed store lives in
//! [`crate::db::SqliteMemoryStore`].

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::memory::{MemoryRecord, MemoryStore, ScoredRecord};
use std::collections::BTreeSet;
use tokio::sync::RwLock;

/// Lowercase words of at least two characters, deduplicated, in order
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<(String, MemoryRecord)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, key: &str, record: MemoryRecord) -> Result<(), EngineError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = record,
            None => records.push((key.to_string(), record)),
        }
        Ok(())
    }

    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>, EngineError> {
        let terms = keywords(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.records.read().await;
        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .filter_map(|(key, record)| {
                let mut words: BTreeSet<String> = keywords(&record.content).into_iter().collect();
                words.extend(record.tags.iter().flat_map(|t| keywords(t)));
                let hits = terms.iter().filter(|t| words.contains(*t)).count();
                (hits > 0).then(|| ScoredRecord {
                    key: key.clone(),
                    record: record.clone(),
                    score: hits as f64 / terms.len() as f64,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.record.created_at.cmp(&a.record.created_at))
                .then(a.key.cmp(&b.key))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}
