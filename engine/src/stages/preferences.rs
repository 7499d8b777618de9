//! Rule-based preference extraction
//!
//! Reads the whole collecting transcript with a fixed set of patterns and
//! layers what it finds over the prior constraints. Later utterances win.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use sdk::errors::EngineError;
use sdk::memory::{MemoryRecord, MemoryStore};
use sdk::stage::{ClarificationRequest, PreferenceOutcome, PreferenceRequest, Stage};
use sdk::types::{CandidateId, Category, Pace, UserConstraints};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_DAY_START: (u32, u32) = (9, 0);
pub const DEFAULT_DAY_END: (u32, u32) = (21, 0);

/// Fields found in a transcript; `None` means not mentioned
#[derive(Debug, Default, PartialEq)]
pub struct Extracted {
    pub destination: Option<String>,
    pub dates: Option<(NaiveDate, NaiveDate)>,
    pub hours: Option<(NaiveTime, NaiveTime)>,
    pub pace: Option<Pace>,
    pub excluded_categories: BTreeSet<Category>,
    pub excluded_candidates: BTreeSet<CandidateId>,
    pub required: Vec<CandidateId>,
    pub interests: Vec<String>,
}

pub struct RulePreferenceStage {
    destination: Regex,
    date_range: Regex,
    single_date: Regex,
    hours: Regex,
    pace: Regex,
    avoid: Regex,
    must_see: Regex,
    interest: Regex,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl RulePreferenceStage {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            destination: Regex::new(
                r"\b(?:[Ii]n|[Tt]o|[Vv]isit(?:ing)?)\s+(\p{Lu}[\p{L}'-]*(?:\s+\p{Lu}[\p{L}'-]*)*)",
            )?,
            date_range: Regex::new(
                r"(?i)(\d{4}-\d{2}-\d{2})\s*(?:to|until|through|-)\s*(\d{4}-\d{2}-\d{2})",
            )?,
            single_date: Regex::new(r"(?i)\bon\s+(\d{4}-\d{2}-\d{2})\b")?,
            hours: Regex::new(r"\b(\d{1,2}:\d{2})\s*(?:-|to)\s*(\d{1,2}:\d{2})\b")?,
            pace: Regex::new(
                r"(?i)\b(relaxed|slow|leisurely|balanced|moderate|packed|busy|intense)\b",
            )?,
            avoid: Regex::new(r"(?i)\b(?:avoid|skip)\s+([\p{L}][\w-]*)")?,
            must_see: Regex::new(r"(?i)\bmust[- ]see\s+([\w-]+)")?,
            interest: Regex::new(r"(?i)\b(?:love|like|enjoy)s?\s+([\p{L}][\w-]*)")?,
            memory: None,
        })
    }

    /// Record extracted interests in `memory`
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Pull every recognised field out of `text`
    pub fn extract(&self, text: &str) -> Extracted {
        let mut out = Extracted {
            destination: self
                .destination
                .captures_iter(text)
                .last()
                .map(|c| c[1].trim().to_string()),
            ..Default::default()
        };

        out.dates = self
            .date_range
            .captures_iter(text)
            .filter_map(|c| Some((parse_date(&c[1])?, parse_date(&c[2])?)))
            .last()
            .or_else(|| {
                self.single_date
                    .captures_iter(text)
                    .filter_map(|c| parse_date(&c[1]))
                    .last()
                    .map(|d| (d, d))
            });

        out.hours = self
            .hours
            .captures_iter(text)
            .filter_map(|c| Some((parse_time(&c[1])?, parse_time(&c[2])?)))
            .last();

        out.pace = self
            .pace
            .captures_iter(text)
            .last()
            .map(|c| match c[1].to_ascii_lowercase().as_str() {
                "relaxed" | "slow" | "leisurely" => Pace::Relaxed,
                "packed" | "busy" | "intense" => Pace::Packed,
                _ => Pace::Balanced,
            });

        for caps in self.avoid.captures_iter(text) {
            match caps[1].parse::<Category>() {
                Ok(category) => {
                    out.excluded_categories.insert(category);
                }
                Err(_) => {
                    out.excluded_candidates
                        .insert(CandidateId::new(caps[1].to_lowercase()));
                }
            }
        }

        for caps in self.must_see.captures_iter(text) {
            let id = CandidateId::new(caps[1].to_lowercase());
            if !out.required.contains(&id) {
                out.required.push(id);
            }
        }

        for caps in self.interest.captures_iter(text) {
            let word = caps[1].to_lowercase();
            if !out.interests.contains(&word) {
                out.interests.push(word);
            }
        }

        out
    }

    /// Layer `extracted` over `prior`, or report what is still missing
    fn layer(
        extracted: Extracted,
        prior: Option<&UserConstraints>,
    ) -> Result<UserConstraints, ClarificationRequest> {
        let destination = extracted
            .destination
            .or_else(|| prior.map(|p| p.destination.clone()));
        let dates = extracted
            .dates
            .or_else(|| prior.map(|p| (p.start_date, p.end_date)));

        let mut missing = Vec::new();
        if destination.is_none() {
            missing.push("destination".to_string());
        }
        if dates.is_none() {
            missing.push("dates".to_string());
        }
        let (Some(destination), Some((start_date, end_date))) = (destination, dates) else {
            let question = match missing.as_slice() {
                [only] if only == "destination" => "Where would you like to go?",
                [only] if only == "dates" => {
                    "Which dates will you be travelling (YYYY-MM-DD to YYYY-MM-DD)?"
                }
                _ => "Where would you like to go, and on which dates (YYYY-MM-DD to YYYY-MM-DD)?",
            };
            return Err(ClarificationRequest {
                question: question.to_string(),
                missing,
            });
        };

        let (default_start, default_end) = match prior {
            Some(p) => (p.day_start, p.day_end),
            None => (
                hm(DEFAULT_DAY_START).unwrap_or(NaiveTime::MIN),
                hm(DEFAULT_DAY_END).unwrap_or(NaiveTime::MIN),
            ),
        };
        let (day_start, day_end) = extracted.hours.unwrap_or((default_start, default_end));

        let mut excluded_categories = prior
            .map(|p| p.excluded_categories.clone())
            .unwrap_or_default();
        excluded_categories.extend(extracted.excluded_categories);

        let mut excluded_candidates = prior
            .map(|p| p.excluded_candidates.clone())
            .unwrap_or_default();
        excluded_candidates.extend(extracted.excluded_candidates);

        let mut required = prior.map(|p| p.required.clone()).unwrap_or_default();
        for id in extracted.required {
            if !required.contains(&id) {
                required.push(id);
            }
        }

        Ok(UserConstraints {
            destination,
            start_date,
            end_date,
            day_start,
            day_end,
            excluded_categories,
            excluded_candidates,
            required,
            pace: extracted
                .pace
                .or_else(|| prior.map(|p| p.pace))
                .unwrap_or_default(),
        })
    }

    async fn remember(&self, interests: &[String]) {
        let Some(memory) = &self.memory else {
            return;
        };
        for interest in interests {
            let tags: Vec<&str> = interest
                .parse::<Category>()
                .map(|c| vec![c.as_str()])
                .unwrap_or_default();
            let record = MemoryRecord::preference(interest.clone()).with_tags(tags);
            if let Err(e) = memory.store(&format!("interest:{}", interest), record).await {
                warn!("Failed to remember interest '{}': {}", interest, e);
            }
        }
    }
}

#[async_trait]
impl Stage for RulePreferenceStage {
    type Input = PreferenceRequest;
    type Output = PreferenceOutcome;

    fn name(&self) -> &str {
        "preferences"
    }

    async fn run(&self, input: &PreferenceRequest) -> Result<PreferenceOutcome, EngineError> {
        let mut transcript = input.history.join("\n");
        transcript.push('\n');
        transcript.push_str(&input.utterance);

        let extracted = self.extract(&transcript);
        let interests = extracted.interests.clone();
        debug!("Extracted preferences: {:?}", extracted);

        match Self::layer(extracted, input.prior.as_ref()) {
            Ok(constraints) => {
                self.remember(&interests).await;
                Ok(PreferenceOutcome::Constraints(constraints))
            }
            Err(clarification) => Ok(PreferenceOutcome::Clarification(clarification)),
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

fn hm((h, m): (u32, u32)) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(h, m, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn request(utterance: &str) -> PreferenceRequest {
        PreferenceRequest {
            utterance: utterance.to_string(),
            history: vec![],
            prior: None,
        }
    }

    #[test]
    fn test_extract_full_request() {
        let stage = RulePreferenceStage::new().unwrap();
        let out = stage.extract(
            "Three relaxed days in Lisbon from 2025-06-01 to 2025-06-03, 10:00-19:00. \
             Avoid events, must see belem-tower, I love tiles.",
        );

        assert_eq!(out.destination.as_deref(), Some("Lisbon"));
        assert_eq!(out.dates, Some((date("2025-06-01"), date("2025-06-03"))));
        assert_eq!(
            out.hours,
            Some((parse_time("10:00").unwrap(), parse_time("19:00").unwrap()))
        );
        assert_eq!(out.pace, Some(Pace::Relaxed));
        assert!(out.excluded_categories.contains(&Category::Event));
        assert_eq!(out.required, vec![CandidateId::new("belem-tower")]);
        assert_eq!(out.interests, vec!["tiles".to_string()]);
    }

    #[test]
    fn test_avoid_unknown_word_excludes_candidate() {
        let stage = RulePreferenceStage::new().unwrap();
        let out = stage.extract("please skip Oceanarium");
        assert!(out.excluded_categories.is_empty());
        assert!(out
            .excluded_candidates
            .contains(&CandidateId::new("oceanarium")));
    }

    #[tokio::test]
    async fn test_missing_dates_asks_for_clarification() {
        let stage = RulePreferenceStage::new().unwrap();
        let outcome = stage.run(&request("A trip to Porto please")).await.unwrap();
        match outcome {
            PreferenceOutcome::Clarification(c) => assert_eq!(c.missing, vec!["dates"]),
            other => panic!("expected clarification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_completes_constraints() {
        let stage = RulePreferenceStage::new().unwrap();
        let mut req = request("2025-06-01 to 2025-06-02");
        req.history = vec!["A trip to Porto please".to_string()];

        match stage.run(&req).await.unwrap() {
            PreferenceOutcome::Constraints(c) => {
                assert_eq!(c.destination, "Porto");
                assert_eq!(c.day_count(), 2);
                assert_eq!(c.day_start, parse_time("09:00").unwrap());
                assert_eq!(c.day_end, parse_time("21:00").unwrap());
                assert_eq!(c.pace, Pace::Balanced);
            }
            other => panic!("expected constraints, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prior_constraints_are_layered() {
        let stage = RulePreferenceStage::new().unwrap();
        let prior = UserConstraints {
            destination: "Porto".to_string(),
            start_date: date("2025-06-01"),
            end_date: date("2025-06-02"),
            day_start: parse_time("08:00").unwrap(),
            day_end: parse_time("18:00").unwrap(),
            excluded_categories: BTreeSet::new(),
            excluded_candidates: BTreeSet::new(),
            required: vec![CandidateId::new("livraria")],
            pace: Pace::Packed,
        };
        let mut req = request("make it relaxed and must see ribeira");
        req.prior = Some(prior);

        match stage.run(&req).await.unwrap() {
            PreferenceOutcome::Constraints(c) => {
                assert_eq!(c.destination, "Porto");
                assert_eq!(c.pace, Pace::Relaxed);
                assert_eq!(c.day_start, parse_time("08:00").unwrap());
                assert_eq!(
                    c.required,
                    vec![CandidateId::new("livraria"), CandidateId::new("ribeira")]
                );
            }
            other => panic!("expected constraints, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backwards_dates_are_left_to_validation() {
        let stage = RulePreferenceStage::new().unwrap();
        match stage
            .run(&request("Visit Rome 2025-06-05 to 2025-06-01"))
            .await
            .unwrap()
        {
            PreferenceOutcome::Constraints(c) => {
                assert_eq!(c.destination, "Rome");
                assert!(matches!(c.validate(), Err(EngineError::Validation(_))));
            }
            other => panic!("expected constraints, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interests_are_stored() {
        let memory = Arc::new(InMemoryStore::new());
        let stage = RulePreferenceStage::new()
            .unwrap()
            .with_memory(memory.clone());

        stage
            .run(&request(
                "Trip to Lisbon on 2025-06-01, I enjoy food and like fado",
            ))
            .await
            .unwrap();

        assert_eq!(memory.len().await, 2);
        let hits = memory.retrieve("meal", 5).await.unwrap();
        assert_eq!(hits[0].key, "interest:food");
    }
}
