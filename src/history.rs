// src/history.rs
use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::calc::calculate_1rm;
use crate::config::PrMetric;
use crate::models::{HistorySession, PrRecord};
use crate::normalize::normalize_exercise_name;
use crate::storage::{read_json, write_json, KeyValueStore, StorageError, StorageKey};

/// Outcome of offering a candidate to the PR table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrUpdate {
    /// First record for this exercise.
    New,
    /// Candidate strictly beat the stored record.
    Improved { previous: PrRecord },
    Unchanged,
}

impl PrUpdate {
    pub const fn is_record(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

fn e1rm(record: &PrRecord) -> f64 {
    calculate_1rm(record.weight, record.reps).unwrap_or(0.0)
}

/// Total order used to decide PR replacement.
///
/// `Estimated1rm`: estimated one-rep max, then raw weight.
/// `Weight`: raw weight, then reps.
/// Dates never break ties, so an equal performance keeps the earlier record.
pub fn compare_prs(a: &PrRecord, b: &PrRecord, metric: PrMetric) -> Ordering {
    match metric {
        PrMetric::Estimated1rm => e1rm(a)
            .total_cmp(&e1rm(b))
            .then(a.weight.total_cmp(&b.weight)),
        PrMetric::Weight => a.weight.total_cmp(&b.weight).then(a.reps.cmp(&b.reps)),
    }
}

/// Stored history split into the records that parse and the raw values
/// that do not. Raw values are written back untouched.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoredHistory {
    pub records: Vec<HistorySession>,
    pub unreadable: Vec<Value>,
}

/// Stored PR table, split the same way per exercise key.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoredPrs {
    pub records: BTreeMap<String, PrRecord>,
    pub unreadable: BTreeMap<String, Value>,
}

/// Reads history records one by one. Nested fields fall back to defaults;
/// only records without a usable id or date are set aside.
/// # Errors
/// Only backend failures are returned.
pub(crate) fn read_history_records<S>(store: &S) -> Result<StoredHistory, StorageError>
where
    S: KeyValueStore + ?Sized,
{
    let raw: Vec<Value> = match read_json(store, StorageKey::History) {
        Ok(values) => values.unwrap_or_default(),
        Err(StorageError::Malformed { source, .. }) => {
            warn!(error = %source, "history is not a list, starting empty");
            return Ok(StoredHistory::default());
        }
        Err(e) => return Err(e),
    };
    let mut stored = StoredHistory::default();
    for value in raw {
        match serde_json::from_value::<HistorySession>(value.clone()) {
            Ok(session) => stored.records.push(session),
            Err(e) => {
                warn!(error = %e, "keeping unreadable history record aside");
                stored.unreadable.push(value);
            }
        }
    }
    if !stored.unreadable.is_empty() {
        debug!(
            kept = stored.records.len(),
            unreadable = stored.unreadable.len(),
            "history loaded with unreadable records"
        );
    }
    Ok(stored)
}

/// Writes `records` followed by the raw values that could not be read.
/// # Errors
/// Returns `StorageError` on serialization or backend failure.
pub(crate) fn write_history_records<S>(
    store: &mut S,
    records: &[HistorySession],
    unreadable: &[Value],
) -> Result<(), StorageError>
where
    S: KeyValueStore + ?Sized,
{
    let mut values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()
        .map_err(|source| StorageError::Serialize {
            key: StorageKey::History,
            source,
        })?;
    values.extend(unreadable.iter().cloned());
    write_json(store, StorageKey::History, &values)
}

/// Reads the PR table entry by entry. A record without a date keeps its
/// weight and reps; entries without those are set aside.
/// # Errors
/// Only backend failures are returned.
pub(crate) fn read_pr_records<S>(store: &S) -> Result<StoredPrs, StorageError>
where
    S: KeyValueStore + ?Sized,
{
    let raw: BTreeMap<String, Value> = match read_json(store, StorageKey::Prs) {
        Ok(values) => values.unwrap_or_default(),
        Err(StorageError::Malformed { source, .. }) => {
            warn!(error = %source, "PR table is not a map, starting empty");
            return Ok(StoredPrs::default());
        }
        Err(e) => return Err(e),
    };
    let mut stored = StoredPrs::default();
    for (name, value) in raw {
        match serde_json::from_value::<PrRecord>(value.clone()) {
            Ok(pr) if pr.weight.is_finite() && pr.weight >= 0.0 => {
                stored
                    .records
                    .insert(name, PrRecord::new(pr.weight, pr.reps, pr.date));
            }
            Ok(_) => {
                warn!(exercise = %name, "keeping PR with invalid weight aside");
                stored.unreadable.insert(name, value);
            }
            Err(e) => {
                warn!(exercise = %name, error = %e, "keeping unreadable PR aside");
                stored.unreadable.insert(name, value);
            }
        }
    }
    Ok(stored)
}

/// Writes `records` merged over the raw entries that could not be read.
/// # Errors
/// Returns `StorageError` on serialization or backend failure.
pub(crate) fn write_pr_records<S>(
    store: &mut S,
    records: &BTreeMap<String, PrRecord>,
    unreadable: &BTreeMap<String, Value>,
) -> Result<(), StorageError>
where
    S: KeyValueStore + ?Sized,
{
    let mut values = unreadable.clone();
    for (name, pr) in records {
        let value = serde_json::to_value(pr).map_err(|source| StorageError::Serialize {
            key: StorageKey::Prs,
            source,
        })?;
        values.insert(name.clone(), value);
    }
    write_json(store, StorageKey::Prs, &values)
}

/// Capped, newest-first history plus the PR table derived from it.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: Vec<HistorySession>,
    prs: BTreeMap<String, PrRecord>,
    unreadable_history: Vec<Value>,
    unreadable_prs: BTreeMap<String, Value>,
    max_entries: usize,
    metric: PrMetric,
}

impl HistoryStore {
    pub fn new(max_entries: usize, metric: PrMetric) -> Self {
        Self {
            entries: Vec::new(),
            prs: BTreeMap::new(),
            unreadable_history: Vec::new(),
            unreadable_prs: BTreeMap::new(),
            max_entries: max_entries.max(1),
            metric,
        }
    }

    /// Loads history and PRs. Unreadable fields fall back to defaults and
    /// unreadable records are kept aside so `save` writes them back.
    /// # Errors
    /// Returns `StorageError` if the backend itself fails.
    pub fn load<S>(store: &S, max_entries: usize, metric: PrMetric) -> Result<Self, StorageError>
    where
        S: KeyValueStore + ?Sized,
    {
        let mut history = Self::new(max_entries, metric);
        let stored = read_history_records(store)?;
        history.entries = stored.records;
        history.entries.truncate(history.max_entries);
        history.unreadable_history = stored.unreadable;
        let prs = read_pr_records(store)?;
        history.prs = prs.records;
        history.unreadable_prs = prs.unreadable;
        Ok(history)
    }

    /// # Errors
    /// Returns `StorageError` if either key cannot be written.
    pub fn save<S>(&self, store: &mut S) -> Result<(), StorageError>
    where
        S: KeyValueStore + ?Sized,
    {
        write_history_records(store, &self.entries, &self.unreadable_history)?;
        write_pr_records(store, &self.prs, &self.unreadable_prs)
    }

    /// Stored history records and PR entries that could not be read.
    pub fn unreadable_count(&self) -> usize {
        self.unreadable_history.len() + self.unreadable_prs.len()
    }

    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub const fn metric(&self) -> PrMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `session` as the newest record and evicts the oldest ones
    /// beyond the cap. Returns the number of evicted records.
    pub fn add_to_history(&mut self, session: HistorySession) -> usize {
        self.entries.insert(0, session);
        let evicted = self.entries.len().saturating_sub(self.max_entries);
        self.entries.truncate(self.max_entries);
        if evicted > 0 {
            debug!(evicted, "history cap reached");
        }
        evicted
    }

    /// Removes the record with `id`. Absent ids are a no-op.
    pub fn delete_from_history(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.id != id);
        before != self.entries.len()
    }

    /// Snapshot, newest first.
    pub fn get_history(&self) -> Vec<HistorySession> {
        self.entries.clone()
    }

    pub fn recent(&self, limit: usize) -> Vec<HistorySession> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn find(&self, id: &str) -> Option<&HistorySession> {
        self.entries.iter().find(|s| s.id == id)
    }

    pub fn get_prs(&self) -> BTreeMap<String, PrRecord> {
        self.prs.clone()
    }

    pub fn pr_for(&self, exercise_name: &str) -> Option<PrRecord> {
        self.prs.get(&normalize_exercise_name(exercise_name)).copied()
    }

    /// Offers `candidate` as the record for `exercise_name`. The stored record
    /// is replaced only on strict improvement. Zero-rep candidates are ignored.
    pub fn update_pr(&mut self, exercise_name: &str, candidate: PrRecord) -> PrUpdate {
        if candidate.reps == 0 || !candidate.weight.is_finite() || candidate.weight < 0.0 {
            return PrUpdate::Unchanged;
        }
        let key = normalize_exercise_name(exercise_name);
        let candidate = PrRecord::new(candidate.weight, candidate.reps, candidate.date);
        match self.prs.get(&key) {
            None => {
                self.prs.insert(key, candidate);
                PrUpdate::New
            }
            Some(existing) if compare_prs(&candidate, existing, self.metric).is_gt() => {
                let previous = *existing;
                self.prs.insert(key, candidate);
                PrUpdate::Improved { previous }
            }
            Some(_) => PrUpdate::Unchanged,
        }
    }

    /// Offers the best completed set of every completed entry of `session`.
    /// Returns the exercises whose record changed.
    pub fn record_prs(&mut self, session: &HistorySession) -> Vec<(String, PrUpdate)> {
        let metric = self.metric;
        let mut changed = Vec::new();
        for entry in session.exercises.iter().filter(|e| e.completed) {
            let best = entry
                .completed_sets()
                .filter(|s| s.reps > 0)
                .map(|s| PrRecord::new(s.weight, s.reps, session.date))
                .max_by(|a, b| compare_prs(a, b, metric));
            if let Some(candidate) = best {
                let update = self.update_pr(&entry.name, candidate);
                if update.is_record() {
                    changed.push((entry.name.clone(), update));
                }
            }
        }
        changed
    }

    /// Rebuilds the PR table by replaying history oldest first.
    pub fn recompute_prs(&mut self) {
        self.prs.clear();
        let replay: Vec<HistorySession> = self.entries.iter().rev().cloned().collect();
        for session in &replay {
            self.record_prs(session);
        }
    }
}
