// src/lib.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

// --- Declare modules ---
pub mod calc;
pub mod catalog;
mod config;
pub mod history;
pub mod models;
pub mod normalize;
pub mod profile;
pub mod schedule;
pub mod session;
pub mod stats;
pub mod storage;

// --- Expose public types ---
pub use catalog::{Catalog, CatalogError};
pub use config::{
    get_config_path as get_config_path_util, load as load_config_util, parse_color,
    save as save_config_util, Config, ConfigError, PrMetric, StandardColor, Theme, Units,
};
pub use history::{HistoryStore, PrUpdate};
pub use models::{
    CardioState, CustomExercise, CustomWorkout, Draft, ExerciseEntry, HistorySession, Intensity,
    Measurement, PrRecord, Profile, Session, SessionGroup, SetEntry,
};
pub use profile::{ProfileError, ProfileStore};
pub use schedule::{Clock, Debouncer, ManualClock, SystemClock};
pub use session::{CardioUpdate, SessionError, SessionManager, SetUpdate};
pub use stats::ExerciseStats;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, StorageError, StorageKey};

/// Exercises added without a known muscle group land here.
const DEFAULT_MUSCLE_GROUP: &str = "other";

/// Result of committing the active session.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSession {
    pub record: HistorySession,
    pub new_prs: Vec<(String, PrUpdate)>,
    pub evicted: usize,
}

pub struct AppService<S: KeyValueStore = SqliteStore> {
    pub config: Config,
    pub store: S,
    pub session: SessionManager,
    pub history: HistoryStore,
    pub profile: ProfileStore,
    pub catalog: Catalog,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    clock: Box<dyn Clock>,
}

impl AppService<SqliteStore> {
    /// Initializes the application service from the config file and the
    /// on-disk store.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = storage::get_db_path().context("Failed to determine database path")?;
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        let mut service = Self::with_store(config, store, Box::new(SystemClock))?;
        service.db_path = db_path;
        service.config_path = config_path;
        Ok(service)
    }
}

impl<S: KeyValueStore> AppService<S> {
    /// Builds the service over an already opened store: runs the data
    /// migrations and loads history, PRs, profile and catalog.
    /// # Errors
    /// Returns `anyhow::Error` if the config is invalid or the store fails.
    pub fn with_store(config: Config, mut store: S, clock: Box<dyn Clock>) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        normalize::run_migrations(&mut store, config.pr_metric)
            .context("Failed to migrate stored data")?;
        let history = HistoryStore::load(&store, config.history_max_entries, config.pr_metric)
            .context("Failed to load history")?;
        let profile = ProfileStore::load(&store).context("Failed to load profile")?;
        let catalog = Catalog::load(&store).context("Failed to load custom workouts")?;
        let session = SessionManager::from_config(&config);

        Ok(Self {
            config,
            store,
            session,
            history,
            profile,
            catalog,
            db_path: ":memory:".into(),
            config_path: PathBuf::new(),
            clock,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if validation or saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        config::save(&self.config_path, &self.config)
    }

    // --- Draft recovery ---

    /// The persisted draft, if one is young enough to offer for restoration.
    pub fn check_for_existing_draft(&mut self) -> Option<Draft> {
        let now = self.now();
        self.session.check_for_existing_draft(&mut self.store, now)
    }

    pub fn restore_from_draft(&mut self) -> bool {
        let now = self.now();
        self.session.restore_from_draft(&mut self.store, now)
    }

    // --- Active session ---

    /// Starts a session for a built-in group, custom workout or `cardio`.
    /// # Errors
    /// Returns `CatalogError::UnknownGroup` (wrapped) for unknown groups.
    pub fn start_session(&mut self, group: &str) -> Result<&Session> {
        let (group, template) = self.catalog.template_for(group)?;
        let now = self.now();
        Ok(self.session.set_session_group(group, template, now))
    }

    /// Adds an exercise with `sets` empty sets. The muscle group defaults to
    /// the catalog's entry for the exercise.
    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn add_exercise(&mut self, name: &str, group: Option<&str>, sets: usize) -> Result<usize> {
        let group = group
            .map(str::to_string)
            .or_else(|| self.catalog.muscle_group_for(name))
            .unwrap_or_else(|| DEFAULT_MUSCLE_GROUP.to_string());
        let now = self.now();
        let index = self.session.add_exercise(name, &group, now)?;
        for _ in 0..sets {
            self.session.add_set(index, now)?;
        }
        Ok(index)
    }

    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn remove_exercise(&mut self, index: usize) -> Result<ExerciseEntry> {
        let now = self.now();
        Ok(self.session.remove_exercise(index, now)?)
    }

    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn add_set(&mut self, index: usize) -> Result<usize> {
        let now = self.now();
        Ok(self.session.add_set(index, now)?)
    }

    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn remove_set(&mut self, index: usize, set_index: usize) -> Result<SetEntry> {
        let now = self.now();
        Ok(self.session.remove_set(index, set_index, now)?)
    }

    /// # Errors
    /// `SessionError` variants (wrapped); invalid values leave the set unchanged.
    pub fn update_exercise(&mut self, index: usize, set_index: usize, update: SetUpdate) -> Result<()> {
        let now = self.now();
        Ok(self.session.update_exercise(index, set_index, update, now)?)
    }

    /// Applies all `updates` to one set, or none of them if any is invalid.
    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn update_set(&mut self, index: usize, set_index: usize, updates: &[SetUpdate]) -> Result<()> {
        let now = self.now();
        Ok(self.session.update_set(index, set_index, updates, now)?)
    }

    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn update_cardio(&mut self, update: CardioUpdate) -> Result<()> {
        let now = self.now();
        Ok(self.session.update_cardio(update, now)?)
    }

    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn toggle_exercise_completed(&mut self, index: usize) -> Result<bool> {
        let now = self.now();
        Ok(self.session.toggle_exercise_completed(index, now)?)
    }

    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn update_exercise_superset(&mut self, index: usize, group: Option<u32>) -> Result<()> {
        let now = self.now();
        Ok(self.session.update_exercise_superset(index, group, now)?)
    }

    /// # Errors
    /// `SessionError` variants (wrapped).
    pub fn link_superset(&mut self, indices: &[usize]) -> Result<u32> {
        let now = self.now();
        Ok(self.session.link_superset(indices, now)?)
    }

    /// Forces a draft write.
    /// # Errors
    /// Returns the `StorageError`; the session itself is kept either way.
    pub fn save_current_session(&mut self) -> Result<(), StorageError> {
        let now = self.now();
        self.session.save_current_session(&mut self.store, now)
    }

    /// Runs the debounced autosave when due. `None` when nothing was due.
    pub fn poll_autosave(&mut self) -> Option<Result<(), StorageError>> {
        let now = self.now();
        self.session.poll_autosave(&mut self.store, now)
    }

    /// Writes pending changes before the process exits. Failures are logged
    /// and left in the session notice; returns whether the draft is current.
    pub fn flush(&mut self) -> bool {
        if !self.session.has_unsaved_changes() {
            return true;
        }
        self.save_current_session().is_ok()
    }

    /// Abandons the active session without committing it.
    pub fn end_session(&mut self) -> Option<Session> {
        self.session.end_session(&mut self.store)
    }

    /// Commits the active session to history, updates PRs and deletes the draft.
    /// Nothing changes, on disk or in memory, if the history write fails.
    /// # Errors
    /// `SessionError::NoActiveSession`/`NothingToCommit` or a storage failure (wrapped).
    pub fn finish_session(&mut self) -> Result<FinishedSession> {
        let now = self.now();
        let record = self
            .session
            .build_history_record(now, self.profile.bodyweight())?;

        let mut history = self.history.clone();
        let evicted = history.add_to_history(record.clone());
        let new_prs = history.record_prs(&record);
        if let Err(e) = history.save(&mut self.store) {
            if let Err(rollback) = self.history.save(&mut self.store) {
                warn!(error = %rollback, "failed to restore history after a failed commit");
            }
            return Err(e).context("Failed to save workout history");
        }
        self.history = history;
        self.session.finish_session(&mut self.store);
        Ok(FinishedSession {
            record,
            new_prs,
            evicted,
        })
    }

    // --- History and PRs ---

    pub fn recent_history(&self, limit: usize) -> Vec<HistorySession> {
        self.history.recent(limit)
    }

    /// Removes a history record. Absent ids are not an error.
    /// # Errors
    /// Returns `anyhow::Error` if the change cannot be saved.
    pub fn delete_from_history(&mut self, id: &str) -> Result<bool> {
        if !self.history.delete_from_history(id) {
            return Ok(false);
        }
        self.history
            .save(&mut self.store)
            .context("Failed to save history")?;
        Ok(true)
    }

    /// Rebuilds PRs from the retained history.
    /// # Errors
    /// Returns `anyhow::Error` if the PR table cannot be saved.
    pub fn recompute_prs(&mut self) -> Result<()> {
        self.history.recompute_prs();
        self.history
            .save(&mut self.store)
            .context("Failed to save personal records")
    }

    pub fn get_prs(&self) -> BTreeMap<String, PrRecord> {
        self.history.get_prs()
    }

    /// # Errors
    /// Returns `anyhow::Error` if the exercise has no completed sets in history.
    pub fn exercise_stats(&self, exercise: &str) -> Result<ExerciseStats> {
        let today = self.now().date_naive();
        match stats::exercise_stats(
            &self.history.get_history(),
            exercise,
            today,
            self.config.streak_interval_days,
        ) {
            Some(stats) => Ok(stats),
            None => bail!("No workout data found for exercise '{exercise}'"),
        }
    }

    pub fn weekly_volume(&self) -> BTreeMap<(i32, u32), f64> {
        stats::weekly_volume(&self.history.get_history())
    }

    /// Suggested working weight for the next session of `exercise`, from the
    /// most recent session that logged it.
    pub fn progression_for(&self, exercise: &str, target_reps: u32) -> Option<calc::Progression> {
        let key = normalize::normalize_exercise_name(exercise);
        let history = self.history.get_history();
        let last = history
            .iter()
            .flat_map(|s| s.exercises.iter())
            .find(|e| e.name == key)?;
        calc::calculate_progressive(&last.sets, target_reps, self.config.weight_increment)
    }

    // --- Profile ---

    /// # Errors
    /// `ProfileError` variants (wrapped).
    pub fn set_bodyweight(&mut self, kg: f64) -> Result<()> {
        self.profile.set_bodyweight(kg)?;
        self.profile.save(&mut self.store)?;
        Ok(())
    }

    /// Updates the name and/or height. An empty name clears it.
    /// # Errors
    /// `ProfileError` variants (wrapped); nothing changes on an invalid height.
    pub fn update_profile(&mut self, name: Option<String>, height_cm: Option<f64>) -> Result<()> {
        if let Some(cm) = height_cm {
            self.profile.set_height(cm)?;
        }
        if name.is_some() {
            self.profile.set_name(name);
        }
        self.profile
            .save(&mut self.store)
            .context("Failed to save profile")?;
        Ok(())
    }

    /// # Errors
    /// `ProfileError` variants (wrapped).
    pub fn add_measurement(&mut self, measurement: Measurement) -> Result<()> {
        self.profile.add_measurement(measurement)?;
        self.profile
            .save(&mut self.store)
            .context("Failed to save measurement")?;
        Ok(())
    }

    // --- Catalog ---

    /// # Errors
    /// `CatalogError` variants (wrapped).
    pub fn add_custom_workout(&mut self, name: &str, group: &str, exercises: &[String]) -> Result<()> {
        self.catalog.add_custom_workout(name, group, exercises)?;
        self.catalog.save(&mut self.store)?;
        Ok(())
    }

    /// # Errors
    /// `CatalogError::Storage` (wrapped).
    pub fn remove_custom_workout(&mut self, name: &str) -> Result<bool> {
        let removed = self.catalog.remove_custom_workout(name);
        if removed {
            self.catalog.save(&mut self.store)?;
        }
        Ok(removed)
    }

    /// # Errors
    /// `CatalogError` variants (wrapped).
    pub fn add_custom_exercise(&mut self, name: &str, group: &str) -> Result<()> {
        self.catalog.add_custom_exercise(name, group)?;
        self.catalog.save(&mut self.store)?;
        Ok(())
    }
}
