// src/session.rs
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::calc::{calculate_calories, calculate_volume, met_for_intensity, STRENGTH_MET};
use crate::config::Config;
use crate::models::{
    CardioState, Draft, ExerciseEntry, HistorySession, Intensity, Session, SessionGroup, SetEntry,
};
use crate::normalize::normalize_exercise_name;
use crate::schedule::Debouncer;
use crate::storage::{read_json, write_json, KeyValueStore, StorageError, StorageKey};

const DRAFT_VERSION: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("No workout session is active.")]
    NoActiveSession,
    #[error("Exercise #{0} does not exist in this session.")]
    ExerciseIndexOutOfRange(usize),
    #[error("Set #{set} does not exist for exercise #{exercise}.")]
    SetIndexOutOfRange { exercise: usize, set: usize },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Exercise name cannot be empty.")]
    EmptyExerciseName,
    #[error("The active session is not a cardio session.")]
    NotCardio,
    #[error("Nothing to save yet: complete at least one set or log cardio data.")]
    NothingToCommit,
}

/// A change to one set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetUpdate {
    Reps(i64),
    Weight(f64),
    Completed(bool),
}

/// A change to the cardio part of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum CardioUpdate {
    Activity(String),
    DurationMinutes(i64),
    DistanceKm(f64),
    AvgHeartRate(i64),
    Intensity(Intensity),
}

fn validate_count(what: &str, value: i64) -> Result<u32, SessionError> {
    u32::try_from(value)
        .map_err(|_| SessionError::InvalidInput(format!("{what} must be between 0 and {}, got {value}", u32::MAX)))
}

fn validate_amount(what: &str, value: f64) -> Result<f64, SessionError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SessionError::InvalidInput(format!(
            "{what} must be a non-negative number, got {value}"
        )))
    }
}

/// Owns the in-progress session and its draft lifecycle.
#[derive(Debug)]
pub struct SessionManager {
    session: Option<Session>,
    dirty: bool,
    autosave: Debouncer,
    draft_max_age: Duration,
    notice: Option<String>,
}

impl SessionManager {
    pub fn new(autosave: Debouncer, draft_max_age: Duration) -> Self {
        Self {
            session: None,
            dirty: false,
            autosave,
            draft_max_age,
            notice: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let autosave =
            Debouncer::new(config.autosave_delay()).with_max_wait(config.autosave_max_wait());
        Self::new(autosave, config.draft_max_age())
    }

    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub const fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Dirty state not yet written to the draft.
    pub const fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// An active session holds entered data that is not in history yet.
    pub fn has_unsaved_data(&self) -> bool {
        self.session.as_ref().is_some_and(Session::has_data)
    }

    pub const fn autosave_pending(&self) -> bool {
        self.autosave.is_pending()
    }

    /// User-facing message about the last failed draft write, cleared on read.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.dirty = true;
        self.autosave.schedule(now);
    }

    fn active_mut(&mut self) -> Result<&mut Session, SessionError> {
        self.session.as_mut().ok_or(SessionError::NoActiveSession)
    }

    fn exercise_mut(&mut self, index: usize) -> Result<&mut ExerciseEntry, SessionError> {
        self.active_mut()?
            .exercises
            .get_mut(index)
            .ok_or(SessionError::ExerciseIndexOutOfRange(index))
    }

    // --- Lifecycle ---

    /// Starts a new session, dropping whatever was in memory.
    /// `template` pre-fills the exercise list of a training group.
    pub fn set_session_group(
        &mut self,
        group: SessionGroup,
        template: Vec<ExerciseEntry>,
        now: DateTime<Utc>,
    ) -> &Session {
        if let Some(previous) = &self.session {
            debug!(id = %previous.id, "replacing in-memory session");
        }
        let mut session = Session::new(group, now);
        if session.cardio.is_none() {
            session.exercises = template;
        }
        info!(id = %session.id, group = %session.group, "session started");
        self.autosave.cancel();
        self.touch(now);
        self.session.insert(session)
    }

    /// Abandons the session: nothing is committed and the draft is deleted.
    pub fn end_session<S>(&mut self, store: &mut S) -> Option<Session>
    where
        S: KeyValueStore + ?Sized,
    {
        let session = self.clear(store);
        if let Some(s) = &session {
            info!(id = %s.id, "session discarded");
        }
        session
    }

    /// Closes a session whose history record has been committed.
    pub fn finish_session<S>(&mut self, store: &mut S) -> Option<Session>
    where
        S: KeyValueStore + ?Sized,
    {
        let mut session = self.clear(store)?;
        session.completed = true;
        info!(id = %session.id, "session finished");
        Some(session)
    }

    fn clear<S>(&mut self, store: &mut S) -> Option<Session>
    where
        S: KeyValueStore + ?Sized,
    {
        self.autosave.cancel();
        self.dirty = false;
        if let Err(e) = store.remove(StorageKey::Draft) {
            warn!(error = %e, "failed to delete draft");
            self.notice = Some(format!("Could not delete the saved draft: {e}"));
        }
        self.session.take()
    }

    // --- Exercises and sets ---

    /// # Errors
    /// `NoActiveSession`, `EmptyExerciseName`.
    pub fn add_exercise(
        &mut self,
        display_name: &str,
        group: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, SessionError> {
        if display_name.trim().is_empty() {
            return Err(SessionError::EmptyExerciseName);
        }
        let session = self.active_mut()?;
        session.exercises.push(ExerciseEntry::new(display_name, group));
        let index = session.exercises.len() - 1;
        self.touch(now);
        Ok(index)
    }

    /// # Errors
    /// `NoActiveSession`, `ExerciseIndexOutOfRange`.
    pub fn remove_exercise(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<ExerciseEntry, SessionError> {
        let session = self.active_mut()?;
        if index >= session.exercises.len() {
            return Err(SessionError::ExerciseIndexOutOfRange(index));
        }
        let removed = session.exercises.remove(index);
        if let Some(group) = removed.superset {
            self.dissolve_if_single(group);
        }
        self.touch(now);
        Ok(removed)
    }

    /// Appends a set copying the previous set's reps and weight.
    /// # Errors
    /// `NoActiveSession`, `ExerciseIndexOutOfRange`.
    pub fn add_set(&mut self, index: usize, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let entry = self.exercise_mut(index)?;
        let next = entry
            .sets
            .last()
            .map_or_else(SetEntry::default, |last| SetEntry::new(last.reps, last.weight));
        entry.sets.push(next);
        let set_index = entry.sets.len() - 1;
        self.touch(now);
        Ok(set_index)
    }

    /// # Errors
    /// `NoActiveSession`, `ExerciseIndexOutOfRange`, `SetIndexOutOfRange`.
    pub fn remove_set(
        &mut self,
        index: usize,
        set_index: usize,
        now: DateTime<Utc>,
    ) -> Result<SetEntry, SessionError> {
        let entry = self.exercise_mut(index)?;
        if set_index >= entry.sets.len() {
            return Err(SessionError::SetIndexOutOfRange {
                exercise: index,
                set: set_index,
            });
        }
        let removed = entry.sets.remove(set_index);
        self.touch(now);
        Ok(removed)
    }

    /// Changes one field of one set and schedules an autosave.
    /// Invalid values are rejected and the previous value is kept.
    /// # Errors
    /// `NoActiveSession`, `ExerciseIndexOutOfRange`, `SetIndexOutOfRange`, `InvalidInput`.
    pub fn update_exercise(
        &mut self,
        index: usize,
        set_index: usize,
        update: SetUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.update_set(index, set_index, &[update], now)
    }

    /// Applies several changes to one set at once. Nothing changes unless
    /// every update is valid.
    /// # Errors
    /// Same as `update_exercise`.
    pub fn update_set(
        &mut self,
        index: usize,
        set_index: usize,
        updates: &[SetUpdate],
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let entry = self.exercise_mut(index)?;
        let set = entry
            .sets
            .get_mut(set_index)
            .ok_or(SessionError::SetIndexOutOfRange {
                exercise: index,
                set: set_index,
            })?;
        let mut edited = *set;
        for update in updates {
            match *update {
                SetUpdate::Reps(reps) => edited.reps = validate_count("reps", reps)?,
                SetUpdate::Weight(weight) => edited.weight = validate_amount("weight", weight)?,
                SetUpdate::Completed(done) => edited.completed = done,
            }
        }
        *set = edited;
        self.touch(now);
        Ok(())
    }

    /// # Errors
    /// `NoActiveSession`, `NotCardio`, `InvalidInput`.
    pub fn update_cardio(
        &mut self,
        update: CardioUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let cardio: &mut CardioState = self
            .active_mut()?
            .cardio
            .as_mut()
            .ok_or(SessionError::NotCardio)?;
        match update {
            CardioUpdate::Activity(activity) => cardio.activity = activity.trim().to_string(),
            CardioUpdate::DurationMinutes(m) => {
                cardio.duration_minutes = Some(validate_count("duration", m)?);
            }
            CardioUpdate::DistanceKm(d) => cardio.distance_km = Some(validate_amount("distance", d)?),
            CardioUpdate::AvgHeartRate(hr) => {
                cardio.avg_heart_rate = Some(validate_count("heart rate", hr)?);
            }
            CardioUpdate::Intensity(intensity) => cardio.intensity = intensity,
        }
        self.touch(now);
        Ok(())
    }

    /// Flips the entry's completion flag. Only completed entries count for PRs.
    /// # Errors
    /// `NoActiveSession`, `ExerciseIndexOutOfRange`.
    pub fn toggle_exercise_completed(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        let entry = self.exercise_mut(index)?;
        entry.completed = !entry.completed;
        let completed = entry.completed;
        self.touch(now);
        Ok(completed)
    }

    // --- Supersets ---

    /// Moves an entry into `group`, or out of any superset with `None`.
    /// A superset left with a single member is dissolved.
    /// # Errors
    /// `NoActiveSession`, `ExerciseIndexOutOfRange`.
    pub fn update_exercise_superset(
        &mut self,
        index: usize,
        group: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if let Some(target) = group {
            let joins_existing = self
                .get_exercises_in_superset(target)
                .iter()
                .any(|&member| member != index);
            if !joins_existing {
                return Err(SessionError::InvalidInput(format!(
                    "superset {target} has no other exercises; link exercises to create one"
                )));
            }
        }
        let entry = self.exercise_mut(index)?;
        let previous = std::mem::replace(&mut entry.superset, group);
        if let Some(old) = previous.filter(|old| Some(*old) != group) {
            self.dissolve_if_single(old);
        }
        self.touch(now);
        Ok(())
    }

    /// Puts all `indices` into a fresh superset and returns its id.
    /// # Errors
    /// `InvalidInput` for fewer than two entries, plus the index errors.
    pub fn link_superset(&mut self, indices: &[usize], now: DateTime<Utc>) -> Result<u32, SessionError> {
        let mut unique = indices.to_vec();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() < 2 {
            return Err(SessionError::InvalidInput(
                "a superset needs at least two exercises".to_string(),
            ));
        }
        let len = self.active_mut()?.exercises.len();
        if let Some(&bad) = unique.iter().find(|&&i| i >= len) {
            return Err(SessionError::ExerciseIndexOutOfRange(bad));
        }
        let group = self.get_next_superset_group();
        let session = self.active_mut()?;
        let previous: Vec<u32> = unique
            .iter()
            .filter_map(|&index| session.exercises[index].superset.replace(group))
            .collect();
        for old in previous {
            self.dissolve_if_single(old);
        }
        self.touch(now);
        Ok(group)
    }

    /// Smallest id above every id in use.
    pub fn get_next_superset_group(&self) -> u32 {
        self.session
            .as_ref()
            .and_then(|s| s.exercises.iter().filter_map(|e| e.superset).max())
            .map_or(1, |max| max + 1)
    }

    pub fn get_exercises_in_superset(&self, group: u32) -> Vec<usize> {
        self.session.as_ref().map_or_else(Vec::new, |s| {
            s.exercises
                .iter()
                .enumerate()
                .filter(|(_, e)| e.superset == Some(group))
                .map(|(i, _)| i)
                .collect()
        })
    }

    fn dissolve_if_single(&mut self, group: u32) {
        let members = self.get_exercises_in_superset(group);
        if let ([only], Some(session)) = (members.as_slice(), self.session.as_mut()) {
            session.exercises[*only].superset = None;
            debug!(group, "superset dissolved");
        }
    }

    // --- Draft persistence ---

    /// Writes the draft now, cancelling any pending autosave.
    /// On failure the session stays dirty and a notice is recorded.
    /// # Errors
    /// Returns the `StorageError` of the failed write.
    pub fn save_current_session<S>(
        &mut self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>
    where
        S: KeyValueStore + ?Sized,
    {
        self.autosave.cancel();
        self.write_draft(store, now)
    }

    /// Runs the debounced autosave if its deadline has passed.
    /// Returns `None` when nothing was due.
    pub fn poll_autosave<S>(
        &mut self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Option<Result<(), StorageError>>
    where
        S: KeyValueStore + ?Sized,
    {
        self.autosave
            .poll(now)
            .then(|| self.write_draft(store, now))
    }

    fn write_draft<S>(&mut self, store: &mut S, now: DateTime<Utc>) -> Result<(), StorageError>
    where
        S: KeyValueStore + ?Sized,
    {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let draft = Draft {
            version: DRAFT_VERSION,
            saved_at: now,
            session: session.clone(),
        };
        match write_json(store, StorageKey::Draft, &draft) {
            Ok(()) => {
                debug!(id = %draft.session.id, "draft saved");
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "draft autosave failed, keeping changes in memory");
                self.notice = Some(format!(
                    "Your workout could not be saved ({e}). It is kept open and will be saved on the next change."
                ));
                Err(e)
            }
        }
    }

    /// Returns the persisted draft if it is younger than the maximum age.
    /// Stale or unreadable drafts are deleted.
    pub fn check_for_existing_draft<S>(&self, store: &mut S, now: DateTime<Utc>) -> Option<Draft>
    where
        S: KeyValueStore + ?Sized,
    {
        let draft = match read_json::<Draft, _>(&*store, StorageKey::Draft) {
            Ok(Some(draft)) => draft,
            Ok(None) => return None,
            Err(StorageError::Malformed { source, .. }) => {
                warn!(error = %source, "discarding unreadable draft");
                Self::discard_draft(store);
                return None;
            }
            Err(e) => {
                warn!(error = %e, "could not read draft");
                return None;
            }
        };
        if now - draft.saved_at > self.draft_max_age {
            debug!(saved_at = %draft.saved_at, "discarding stale draft");
            Self::discard_draft(store);
            return None;
        }
        Some(draft)
    }

    fn discard_draft<S>(store: &mut S)
    where
        S: KeyValueStore + ?Sized,
    {
        if let Err(e) = store.remove(StorageKey::Draft) {
            warn!(error = %e, "failed to delete draft");
        }
    }

    /// Loads a fresh draft into memory. Returns whether one was restored.
    pub fn restore_from_draft<S>(&mut self, store: &mut S, now: DateTime<Utc>) -> bool
    where
        S: KeyValueStore + ?Sized,
    {
        let Some(draft) = self.check_for_existing_draft(store, now) else {
            return false;
        };
        info!(id = %draft.session.id, saved_at = %draft.saved_at, "session restored from draft");
        self.autosave.cancel();
        self.dirty = false;
        self.session = Some(draft.session);
        true
    }

    // --- Finalization ---

    /// Derives the history record for the active session without closing it.
    /// Names are normalized, only entries with completed sets are kept and
    /// incomplete sets are dropped.
    /// # Errors
    /// `NoActiveSession`, or `NothingToCommit` when no set was completed and
    /// no cardio data was logged.
    pub fn build_history_record(
        &self,
        now: DateTime<Utc>,
        bodyweight_kg: Option<f64>,
    ) -> Result<HistorySession, SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NoActiveSession)?;

        let exercises: Vec<ExerciseEntry> = session
            .exercises
            .iter()
            .filter(|e| e.completed_sets().next().is_some())
            .map(|e| {
                let mut entry = e.clone();
                entry.name = normalize_exercise_name(&e.display_name);
                if entry.name.is_empty() {
                    entry.name = normalize_exercise_name(&e.name);
                }
                entry.sets.retain(|s| s.completed);
                entry
            })
            .collect();
        if exercises.is_empty() && !session.cardio.as_ref().is_some_and(CardioState::has_data) {
            return Err(SessionError::NothingToCommit);
        }

        let elapsed = u32::try_from((now - session.started_at).num_minutes().max(0)).unwrap_or(u32::MAX);
        let (met, minutes) = match &session.cardio {
            Some(cardio) => (
                met_for_intensity(cardio.intensity),
                cardio.duration_minutes.unwrap_or(elapsed),
            ),
            None => (STRENGTH_MET, elapsed),
        };
        let calories = bodyweight_kg
            .filter(|_| minutes > 0)
            .map(|kg| calculate_calories(met, kg, minutes));

        Ok(HistorySession {
            id: session.id.clone(),
            date: now.date_naive(),
            started_at: Some(session.started_at),
            finished_at: Some(now),
            group: session.group.clone(),
            volume: calculate_volume(&exercises),
            exercises,
            cardio: session.cardio.clone(),
            calories,
            duration_minutes: Some(minutes),
        })
    }
}
