// src/normalize.rs
use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::config::PrMetric;
use crate::history::compare_prs;
use crate::models::{HistorySession, PrRecord};
use crate::storage::{read_json, write_json, KeyValueStore, StorageError, StorageKey};

/// Current layout version of the persisted data.
pub const SCHEMA_VERSION: u32 = 2;

// Variant -> canonical label. Keys are already in basic normalized form
// (lowercase, no accents, single spaces). Every canonical label either maps
// to itself or is absent from the keys.
const SYNONYMS: &[(&str, &str)] = &[
    ("bench", "bench press"),
    ("barbell bench press", "bench press"),
    ("flat bench press", "bench press"),
    ("flat bench", "bench press"),
    ("press banca", "bench press"),
    ("press de banca", "bench press"),
    ("press de banca plano", "bench press"),
    ("incline bench", "incline bench press"),
    ("press inclinado", "incline bench press"),
    ("press de banca inclinado", "incline bench press"),
    ("back squat", "squat"),
    ("barbell squat", "squat"),
    ("sentadilla", "squat"),
    ("sentadillas", "squat"),
    ("front squats", "front squat"),
    ("sentadilla frontal", "front squat"),
    ("conventional deadlift", "deadlift"),
    ("barbell deadlift", "deadlift"),
    ("peso muerto", "deadlift"),
    ("rdl", "romanian deadlift"),
    ("peso muerto rumano", "romanian deadlift"),
    ("ohp", "overhead press"),
    ("military press", "overhead press"),
    ("shoulder press", "overhead press"),
    ("press militar", "overhead press"),
    ("pullup", "pull up"),
    ("pull-up", "pull up"),
    ("pull ups", "pull up"),
    ("pull-ups", "pull up"),
    ("pullups", "pull up"),
    ("dominada", "pull up"),
    ("dominadas", "pull up"),
    ("chinup", "chin up"),
    ("chin-up", "chin up"),
    ("chin ups", "chin up"),
    ("chin-ups", "chin up"),
    ("bent over row", "barbell row"),
    ("bent-over row", "barbell row"),
    ("remo con barra", "barbell row"),
    ("dip", "dips"),
    ("fondos", "dips"),
    ("fondos en paralelas", "dips"),
    ("lat pull down", "lat pulldown"),
    ("jalon al pecho", "lat pulldown"),
    ("bicep curl", "biceps curl"),
    ("bicep curls", "biceps curl"),
    ("biceps curls", "biceps curl"),
    ("curl de biceps", "biceps curl"),
    ("tricep extension", "triceps extension"),
    ("extension de triceps", "triceps extension"),
    ("prensa", "leg press"),
    ("prensa de piernas", "leg press"),
    ("hip thrusts", "hip thrust"),
    ("empuje de cadera", "hip thrust"),
    ("zancadas", "lunge"),
    ("lunges", "lunge"),
    ("plancha", "plank"),
    ("correr", "running"),
    ("run", "running"),
    ("bici", "cycling"),
    ("bike", "cycling"),
    ("ciclismo", "cycling"),
];

fn basic_normalize(raw: &str) -> String {
    let stripped: String = raw
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalizes a free-text exercise name into the key used for history and PRs.
///
/// Lowercases, strips diacritics, collapses whitespace and maps known
/// synonyms to their canonical label. Unknown names only go through the
/// first three steps. `normalize_exercise_name(normalize_exercise_name(x))`
/// always equals `normalize_exercise_name(x)`.
pub fn normalize_exercise_name(raw: &str) -> String {
    let basic = basic_normalize(raw);
    SYNONYMS
        .iter()
        .find(|(variant, _)| *variant == basic)
        .map_or(basic, |(_, canonical)| (*canonical).to_string())
}

/// Re-keys legacy PR tables whose names predate normalization.
/// When several legacy keys collapse onto one name, the better record wins.
pub fn migrate_prs_to_normalized_names(
    prs: BTreeMap<String, PrRecord>,
    metric: PrMetric,
) -> BTreeMap<String, PrRecord> {
    let mut migrated: BTreeMap<String, PrRecord> = BTreeMap::new();
    for (name, record) in prs {
        let key = normalize_exercise_name(&name);
        if key != name {
            debug!(from = %name, to = %key, "re-keying personal record");
        }
        match migrated.get(&key) {
            Some(existing) if !compare_prs(&record, existing, metric).is_gt() => {}
            _ => {
                migrated.insert(key, record);
            }
        }
    }
    migrated
}

/// Rewrites exercise names of legacy history records to their normalized form,
/// keeping the old text as the display name when none was stored.
pub fn migrate_history_exercise_names(mut history: Vec<HistorySession>) -> Vec<HistorySession> {
    for session in &mut history {
        for entry in &mut session.exercises {
            if entry.display_name.trim().is_empty() {
                entry.display_name = entry.name.trim().to_string();
            }
            entry.name = normalize_exercise_name(&entry.name);
        }
    }
    history
}

/// Runs every migration step newer than the stored schema version, then
/// records the current version. Safe to run on every start.
/// # Errors
/// Returns `StorageError` if migrated data cannot be written back.
pub fn run_migrations<S>(store: &mut S, metric: PrMetric) -> Result<u32, StorageError>
where
    S: KeyValueStore + ?Sized,
{
    let from = match read_json::<u32, _>(&*store, StorageKey::SchemaVersion) {
        Ok(version) => version.unwrap_or(0),
        Err(StorageError::Malformed { .. }) => {
            warn!("schema version unreadable, re-running all migrations");
            0
        }
        Err(e) => return Err(e),
    };
    if from >= SCHEMA_VERSION {
        return Ok(from);
    }

    // v1: exercise names inside history records.
    if from < 1 {
        let stored = crate::history::read_history_records(&*store)?;
        if !stored.records.is_empty() {
            crate::history::write_history_records(
                store,
                &migrate_history_exercise_names(stored.records),
                &stored.unreadable,
            )?;
        }
    }

    // v2: PR table keys.
    if from < 2 {
        let stored = crate::history::read_pr_records(&*store)?;
        if !stored.records.is_empty() {
            crate::history::write_pr_records(
                store,
                &migrate_prs_to_normalized_names(stored.records, metric),
                &stored.unreadable,
            )?;
        }
    }

    write_json(store, StorageKey::SchemaVersion, &SCHEMA_VERSION)?;
    info!(from, to = SCHEMA_VERSION, "stored data migrated");
    Ok(SCHEMA_VERSION)
}
