//! Catalog-backed research and logistics stages
//!
//! A catalog is a JSON document keyed by destination:
//!
//! ```json
//! { "lisbon": { "research": [...], "logistics": [...], "revisions": [...] } }
//! ```
//!
//! Keys are matched case-insensitively.

use crate::memory::keywords;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::memory::{MemoryStore, RecordKind};
use sdk::stage::{LogisticsReport, LogisticsRequest, ResearchRequest, Stage, WindowRevision};
use sdk::types::{Candidate, Category};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Priority added per matching memory record
pub const MEMORY_BOOST: f64 = 0.1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestinationCatalog {
    #[serde(default)]
    pub research: Vec<Candidate>,
    #[serde(default)]
    pub logistics: Vec<Candidate>,
    #[serde(default)]
    pub revisions: Vec<WindowRevision>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    destinations: HashMap<String, DestinationCatalog>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, DestinationCatalog> =
            serde_json::from_str(json).context("Failed to parse catalog")?;
        Ok(Self {
            destinations: raw
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn destination(&self, name: &str) -> Option<&DestinationCatalog> {
        self.destinations.get(&normalize(name))
    }

    /// Destination names in sorted order
    pub fn destinations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.destinations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn require(&self, stage: &str, name: &str) -> Result<&DestinationCatalog, EngineError> {
        self.destination(name).ok_or_else(|| EngineError::StageFailure {
            stage: stage.to_string(),
            reason: format!("no catalog entries for '{}'", name),
        })
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Research stage over a catalog, with optional memory-based priority boosts
pub struct CatalogResearchStage {
    catalog: Arc<Catalog>,
    memory: Option<Arc<dyn MemoryStore>>,
    retrieve_limit: usize,
}

impl CatalogResearchStage {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            memory: None,
            retrieve_limit: 5,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>, retrieve_limit: usize) -> Self {
        self.memory = Some(memory);
        self.retrieve_limit = retrieve_limit;
        self
    }

    /// Raise `candidate`'s priority for each preference record mentioning it
    async fn boost(&self, memory: &dyn MemoryStore, candidate: &mut Candidate) {
        let mut terms: BTreeSet<String> = keywords(&candidate.name).into_iter().collect();
        terms.insert(candidate.category.as_str().to_string());
        let query = terms.iter().cloned().collect::<Vec<_>>().join(" ");

        let records = match memory.retrieve(&query, self.retrieve_limit).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Memory lookup for '{}' failed: {}", candidate.id, e);
                return;
            }
        };

        let matches = records
            .iter()
            .filter(|r| r.record.kind == RecordKind::Preference)
            .filter(|r| {
                keywords(&r.record.content)
                    .into_iter()
                    .chain(r.record.tags.iter().flat_map(|t| keywords(t)))
                    .any(|w| terms.contains(&w) || mentions_category(&w, candidate.category))
            })
            .count();

        if matches > 0 {
            let boosted = (candidate.priority + MEMORY_BOOST * matches as f64).min(1.0);
            debug!(
                "Boosting '{}' from {:.2} to {:.2} ({} memory matches)",
                candidate.id, candidate.priority, boosted, matches
            );
            candidate.priority = boosted;
        }
    }
}

fn mentions_category(word: &str, category: Category) -> bool {
    word.parse::<Category>().map(|c| c == category).unwrap_or(false)
}

#[async_trait]
impl Stage for CatalogResearchStage {
    type Input = ResearchRequest;
    type Output = Vec<Candidate>;

    fn name(&self) -> &str {
        "research"
    }

    async fn run(&self, input: &ResearchRequest) -> Result<Vec<Candidate>, EngineError> {
        let entry = self.catalog.require(self.name(), &input.destination)?;
        let mut candidates: Vec<Candidate> = entry
            .research
            .iter()
            .filter(|c| matches!(c.category, Category::Attraction | Category::Meal))
            .cloned()
            .collect();

        if let Some(memory) = &self.memory {
            for candidate in &mut candidates {
                self.boost(memory.as_ref(), candidate).await;
            }
        }

        Ok(candidates)
    }
}

/// Logistics stage over a catalog
pub struct CatalogLogisticsStage {
    catalog: Arc<Catalog>,
}

impl CatalogLogisticsStage {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Stage for CatalogLogisticsStage {
    type Input = LogisticsRequest;
    type Output = LogisticsReport;

    fn name(&self) -> &str {
        "logistics"
    }

    async fn run(&self, input: &LogisticsRequest) -> Result<LogisticsReport, EngineError> {
        let entry = self.catalog.require(self.name(), &input.destination)?;
        let candidates = entry
            .logistics
            .iter()
            .filter(|c| matches!(c.category, Category::Event | Category::TransitAnchor))
            .filter(|c| match &c.fixed_time {
                Some(slot) => {
                    let date = slot.start.date();
                    date >= input.start_date && date <= input.end_date
                }
                None => true,
            })
            .cloned()
            .collect();

        Ok(LogisticsReport {
            candidates,
            revisions: entry.revisions.clone(),
        })
    }
}
