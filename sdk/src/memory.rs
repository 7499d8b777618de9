//! Memory store contract
//!
//! Long-term preference and fact recall lives outside the planner. Stages
//! query it and fold the results into candidate priorities; the scheduling
//! core never reads it directly.

use crate::errors::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Preference,
    Fact,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Preference => "preference",
            RecordKind::Fact => "fact",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub kind: RecordKind,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn preference(content: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Preference,
            content: content.into(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A retrieved record; higher score ranks first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub key: String,
    pub record: MemoryRecord,
    pub score: f64,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert or replace the record stored under `key`
    async fn store(&self, key: &str, record: MemoryRecord) -> Result<(), EngineError>;

    /// Records relevant to `query`, best match first
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>, EngineError>;
}
