//! Candidate Pool
//!
//! Append-only collection of candidates for one session. Duplicates, meaning
//! the same name at a near-identical location, are merged instead of inserted.
//! The orchestrator is the only writer, during the gathering join.

use sdk::errors::EngineError;
use sdk::stage::WindowRevision;
use sdk::types::{Candidate, CandidateId, OperatingWindow};
use std::collections::HashMap;
use tracing::debug;

/// Default distance under which two same-named candidates are one place
pub const DEFAULT_DUPLICATE_RADIUS_METERS: f64 = 50.0;

/// Result of [`CandidatePool::add`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    /// Merged into the record that is now stored under `into`
    Merged { into: CandidateId },
}

#[derive(Debug, Clone)]
pub struct CandidatePool {
    candidates: Vec<Candidate>,
    index: HashMap<CandidateId, usize>,
    aliases: HashMap<CandidateId, CandidateId>,
    duplicate_radius_meters: f64,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::with_duplicate_radius(DEFAULT_DUPLICATE_RADIUS_METERS)
    }

    pub fn with_duplicate_radius(meters: f64) -> Self {
        Self {
            candidates: Vec::new(),
            index: HashMap::new(),
            aliases: HashMap::new(),
            duplicate_radius_meters: meters,
        }
    }

    /// Merge-or-insert a candidate.
    ///
    /// On merge the higher-priority record wins (ties keep the existing one),
    /// operating windows are unioned and the original insertion position is kept.
    pub fn add(&mut self, candidate: Candidate) -> Result<AddOutcome, EngineError> {
        candidate.validate()?;

        if let Some(pos) = self.find_duplicate(&candidate) {
            if matches!(self.index.get(&candidate.id), Some(&other) if other != pos) {
                return Err(EngineError::Validation(format!(
                    "candidate id '{}' is already used by a different place",
                    candidate.id
                )));
            }
            return Ok(self.merge_at(pos, candidate));
        }

        if self.index.contains_key(&candidate.id) || self.aliases.contains_key(&candidate.id) {
            return Err(EngineError::Validation(format!(
                "candidate id '{}' is already used by a different place",
                candidate.id
            )));
        }

        self.index
            .insert(candidate.id.clone(), self.candidates.len());
        self.candidates.push(candidate);
        Ok(AddOutcome::Inserted)
    }

    /// Read-only view in insertion order
    pub fn all(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Lazy, restartable filtered view
    pub fn filter<P>(&self, predicate: P) -> Filtered<'_, P>
    where
        P: Fn(&Candidate) -> bool,
    {
        Filtered {
            candidates: &self.candidates,
            predicate,
        }
    }

    pub fn get(&self, id: &CandidateId) -> Option<&Candidate> {
        let id = self.canonical_id(id);
        self.index.get(id).map(|&pos| &self.candidates[pos])
    }

    /// Id under which `id` is stored now, following merges
    pub fn canonical_id<'a>(&'a self, id: &'a CandidateId) -> &'a CandidateId {
        let mut current = id;
        while let Some(next) = self.aliases.get(current) {
            current = next;
        }
        current
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Replace the operating windows of an existing candidate
    pub fn apply_revision(&mut self, revision: &WindowRevision) -> Result<(), EngineError> {
        for window in &revision.windows {
            window.validate()?;
        }
        let id = self.canonical_id(&revision.candidate_id).clone();
        let pos = *self.index.get(&id).ok_or_else(|| {
            EngineError::Validation(format!(
                "window revision names unknown candidate '{}'",
                revision.candidate_id
            ))
        })?;
        self.candidates[pos].windows = revision.windows.clone();
        Ok(())
    }

    fn find_duplicate(&self, candidate: &Candidate) -> Option<usize> {
        let name = normalize_name(&candidate.name);
        self.candidates.iter().position(|existing| {
            normalize_name(&existing.name) == name
                && existing.location.distance_meters(&candidate.location)
                    <= self.duplicate_radius_meters
        })
    }

    fn merge_at(&mut self, pos: usize, incoming: Candidate) -> AddOutcome {
        let existing = &self.candidates[pos];
        let windows = union_windows(&existing.windows, &incoming.windows);

        let (mut survivor, loser_id) = if incoming.priority > existing.priority {
            (incoming, existing.id.clone())
        } else {
            (existing.clone(), incoming.id)
        };
        survivor.windows = windows;

        if loser_id != survivor.id {
            debug!("Merging duplicate '{}' into '{}'", loser_id, survivor.id);
            self.index.remove(&loser_id);
            self.aliases.insert(loser_id, survivor.id.clone());
        }
        self.aliases.remove(&survivor.id);
        self.index.insert(survivor.id.clone(), pos);

        let into = survivor.id.clone();
        self.candidates[pos] = survivor;
        AddOutcome::Merged { into }
    }
}

impl Default for CandidatePool {
    fn default() -> Self {
        Self::new()
    }
}

/// Filtered pool view; each call to [`Filtered::iter`] starts over
pub struct Filtered<'a, P> {
    candidates: &'a [Candidate],
    predicate: P,
}

impl<'a, P> Filtered<'a, P>
where
    P: Fn(&Candidate) -> bool,
{
    pub fn iter(&self) -> impl Iterator<Item = &'a Candidate> + '_ {
        self.candidates.iter().filter(move |c| (self.predicate)(c))
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// An always-open side makes the union always-open
fn union_windows(a: &[OperatingWindow], b: &[OperatingWindow]) -> Vec<OperatingWindow> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut merged = a.to_vec();
    for window in b {
        if !merged.contains(window) {
            merged.push(*window);
        }
    }
    merged
}
