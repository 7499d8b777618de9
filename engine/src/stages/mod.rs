//! Built-in stage implementations
//!
//! Deterministic, offline stages so the binary can plan a trip without an
//! external reasoning service. Anything implementing [`sdk::stage::Stage`]
//! can replace them.

pub mod catalog;
pub mod preferences;

pub use catalog::{Catalog, CatalogLogisticsStage, CatalogResearchStage, DestinationCatalog};
pub use preferences::RulePreferenceStage;
