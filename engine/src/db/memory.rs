//! SQLite memory store
//!
//! Records live in `memory_records`; `memory_fts` mirrors their text for
//! full-text search ranked by bm25.

use crate::memory::keywords;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sdk::errors::EngineError;
use sdk::memory::{MemoryRecord, MemoryStore, RecordKind, ScoredRecord};
use sqlx::{Row, SqlitePool};

pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn db_err(context: &str) -> impl Fn(sqlx::Error) -> EngineError + '_ {
    move |e| EngineError::Memory(format!("{}: {}", context, e))
}

/// FTS5 query matching any keyword; each term is quoted
fn match_expression(query: &str) -> Option<String> {
    let terms = keywords(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn store(&self, key: &str, record: MemoryRecord) -> Result<(), EngineError> {
        let tags = serde_json::to_string(&record.tags)?;
        let tag_text = record.tags.join(" ");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        sqlx::query(
            "INSERT OR REPLACE INTO memory_records (key, kind, content, tags, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(record.kind.as_str())
        .bind(&record.content)
        .bind(&tags)
        .bind(record.created_at.timestamp())
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to store memory record"))?;

        sqlx::query("DELETE FROM memory_fts WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to clear memory index"))?;

        sqlx::query("INSERT INTO memory_fts (key, content, tags) VALUES (?, ?, ?)")
            .bind(key)
            .bind(&record.content)
            .bind(&tag_text)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to index memory record"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit memory record"))?;
        Ok(())
    }

    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>, EngineError> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT r.key, r.kind, r.content, r.tags, r.created_at, bm25(memory_fts) AS score
            FROM memory_fts
            JOIN memory_records r ON r.key = memory_fts.key
            WHERE memory_fts MATCH ?
            ORDER BY score, r.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(expression)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to execute FTS query on memory_fts"))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let kind = match row.get::<String, _>("kind").as_str() {
                "fact" => RecordKind::Fact,
                _ => RecordKind::Preference,
            };
            let tags: Vec<String> = serde_json::from_str(&row.get::<String, _>("tags"))?;
            let created_at = Utc
                .timestamp_opt(row.get("created_at"), 0)
                .single()
                .unwrap_or_else(Utc::now);
            let bm25: f64 = row.get("score");

            records.push(ScoredRecord {
                key: row.get("key"),
                record: MemoryRecord {
                    kind,
                    content: row.get("content"),
                    tags,
                    created_at,
                },
                // bm25 is lower-is-better
                score: -bm25,
            });
        }
        Ok(records)
    }
}
