// src/catalog.rs
use thiserror::Error;
use tracing::warn;

use crate::models::{CustomExercise, CustomWorkout, ExerciseEntry, SessionGroup, SetEntry};
use crate::normalize::normalize_exercise_name;
use crate::storage::{read_json, write_json, KeyValueStore, StorageError, StorageKey};

pub const CARDIO_GROUP: &str = "cardio";
const TEMPLATE_SETS: usize = 3;

struct BuiltinGroup {
    name: &'static str,
    /// (exercise, muscle group)
    exercises: &'static [(&'static str, &'static str)],
}

const BUILTIN_GROUPS: &[BuiltinGroup] = &[
    BuiltinGroup {
        name: "push",
        exercises: &[
            ("Bench Press", "chest"),
            ("Incline Bench Press", "chest"),
            ("Overhead Press", "shoulders"),
            ("Lateral Raise", "shoulders"),
            ("Triceps Extension", "triceps"),
            ("Dips", "triceps"),
        ],
    },
    BuiltinGroup {
        name: "pull",
        exercises: &[
            ("Deadlift", "back"),
            ("Pull Up", "back"),
            ("Barbell Row", "back"),
            ("Lat Pulldown", "back"),
            ("Face Pull", "shoulders"),
            ("Biceps Curl", "biceps"),
        ],
    },
    BuiltinGroup {
        name: "legs",
        exercises: &[
            ("Squat", "legs"),
            ("Romanian Deadlift", "hamstrings"),
            ("Leg Press", "legs"),
            ("Lunge", "legs"),
            ("Hip Thrust", "glutes"),
            ("Calf Raise", "calves"),
        ],
    },
    BuiltinGroup {
        name: "upper",
        exercises: &[
            ("Bench Press", "chest"),
            ("Barbell Row", "back"),
            ("Overhead Press", "shoulders"),
            ("Pull Up", "back"),
            ("Biceps Curl", "biceps"),
            ("Triceps Extension", "triceps"),
        ],
    },
    BuiltinGroup {
        name: "lower",
        exercises: &[
            ("Squat", "legs"),
            ("Deadlift", "back"),
            ("Leg Press", "legs"),
            ("Calf Raise", "calves"),
            ("Plank", "core"),
        ],
    },
    BuiltinGroup {
        name: "full body",
        exercises: &[
            ("Squat", "legs"),
            ("Bench Press", "chest"),
            ("Barbell Row", "back"),
            ("Overhead Press", "shoulders"),
            ("Plank", "core"),
        ],
    },
];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown workout group: {0}")]
    UnknownGroup(String),
    #[error("Name '{0}' is already used by another workout or exercise.")]
    NameTaken(String),
    #[error("Name cannot be empty.")]
    EmptyName,
    #[error("A custom workout needs at least one exercise.")]
    NoExercises,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn template_entry(display: &str, group: &str) -> ExerciseEntry {
    ExerciseEntry::new(display, group).with_sets(vec![SetEntry::default(); TEMPLATE_SETS])
}

fn group_key(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Built-in workout groups plus user-defined workouts and exercises.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    custom_workouts: Vec<CustomWorkout>,
    custom_exercises: Vec<CustomExercise>,
}

impl Catalog {
    /// # Errors
    /// Returns `CatalogError::Storage` if the backend fails. Unreadable lists
    /// are replaced by empty ones.
    pub fn load<S>(store: &S) -> Result<Self, CatalogError>
    where
        S: KeyValueStore + ?Sized,
    {
        Ok(Self {
            custom_workouts: read_list(store, StorageKey::CustomWorkouts)?,
            custom_exercises: read_list(store, StorageKey::CustomExercises)?,
        })
    }

    /// # Errors
    /// Returns `CatalogError::Storage` if a write fails.
    pub fn save<S>(&self, store: &mut S) -> Result<(), CatalogError>
    where
        S: KeyValueStore + ?Sized,
    {
        write_json(store, StorageKey::CustomWorkouts, &self.custom_workouts)?;
        write_json(store, StorageKey::CustomExercises, &self.custom_exercises)?;
        Ok(())
    }

    /// Group names that can start a session, built-ins first.
    pub fn groups(&self) -> Vec<String> {
        BUILTIN_GROUPS
            .iter()
            .map(|g| g.name.to_string())
            .chain(self.custom_workouts.iter().map(|w| w.name.clone()))
            .chain(std::iter::once(CARDIO_GROUP.to_string()))
            .collect()
    }

    pub fn custom_workouts(&self) -> &[CustomWorkout] {
        &self.custom_workouts
    }

    pub fn custom_exercises(&self) -> &[CustomExercise] {
        &self.custom_exercises
    }

    /// Muscle group of a known exercise, looked up by normalized name.
    pub fn muscle_group_for(&self, exercise: &str) -> Option<String> {
        let key = normalize_exercise_name(exercise);
        self.custom_exercises
            .iter()
            .find(|e| normalize_exercise_name(&e.name) == key)
            .map(|e| e.group.clone())
            .or_else(|| {
                BUILTIN_GROUPS
                    .iter()
                    .flat_map(|g| g.exercises.iter())
                    .find(|(name, _)| normalize_exercise_name(name) == key)
                    .map(|(_, muscle)| (*muscle).to_string())
            })
    }

    /// Resolves a group name into the session group and its starting exercises.
    /// # Errors
    /// `CatalogError::UnknownGroup` if no built-in or custom workout matches.
    pub fn template_for(&self, group: &str) -> Result<(SessionGroup, Vec<ExerciseEntry>), CatalogError> {
        let key = group_key(group);
        if key == CARDIO_GROUP {
            return Ok((SessionGroup::Cardio, Vec::new()));
        }
        if let Some(builtin) = BUILTIN_GROUPS.iter().find(|g| g.name == key) {
            let entries = builtin
                .exercises
                .iter()
                .map(|(name, muscle)| template_entry(name, muscle))
                .collect();
            return Ok((SessionGroup::Training(builtin.name.to_string()), entries));
        }
        if let Some(workout) = self.custom_workouts.iter().find(|w| group_key(&w.name) == key) {
            let entries = workout
                .exercises
                .iter()
                .map(|name| {
                    let muscle = self
                        .muscle_group_for(name)
                        .unwrap_or_else(|| workout.group.clone());
                    template_entry(name, &muscle)
                })
                .collect();
            return Ok((SessionGroup::Training(workout.name.clone()), entries));
        }
        Err(CatalogError::UnknownGroup(group.trim().to_string()))
    }

    fn group_name_taken(&self, key: &str) -> bool {
        key == CARDIO_GROUP
            || BUILTIN_GROUPS.iter().any(|g| g.name == key)
            || self.custom_workouts.iter().any(|w| group_key(&w.name) == key)
    }

    /// # Errors
    /// `EmptyName`, `NoExercises`, `NameTaken`.
    pub fn add_custom_workout(
        &mut self,
        name: &str,
        group: &str,
        exercises: &[String],
    ) -> Result<(), CatalogError> {
        let key = group_key(name);
        if key.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        let exercises: Vec<String> = exercises
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if exercises.is_empty() {
            return Err(CatalogError::NoExercises);
        }
        if self.group_name_taken(&key) {
            return Err(CatalogError::NameTaken(name.trim().to_string()));
        }
        self.custom_workouts.push(CustomWorkout {
            name: name.trim().to_string(),
            group: group.trim().to_lowercase(),
            exercises,
        });
        Ok(())
    }

    /// Returns whether a workout was removed.
    pub fn remove_custom_workout(&mut self, name: &str) -> bool {
        let key = group_key(name);
        let before = self.custom_workouts.len();
        self.custom_workouts.retain(|w| group_key(&w.name) != key);
        before != self.custom_workouts.len()
    }

    /// # Errors
    /// `EmptyName`, or `NameTaken` if the normalized name is already known.
    pub fn add_custom_exercise(&mut self, name: &str, group: &str) -> Result<(), CatalogError> {
        if normalize_exercise_name(name).is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.muscle_group_for(name).is_some() {
            return Err(CatalogError::NameTaken(name.trim().to_string()));
        }
        self.custom_exercises.push(CustomExercise {
            name: name.trim().to_string(),
            group: group.trim().to_lowercase(),
        });
        Ok(())
    }
}

fn read_list<T, S>(store: &S, key: StorageKey) -> Result<Vec<T>, CatalogError>
where
    T: serde::de::DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match read_json(store, key) {
        Ok(list) => Ok(list.unwrap_or_default()),
        Err(StorageError::Malformed { source, .. }) => {
            warn!(%key, error = %source, "custom list unreadable, using an empty one");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}
