// src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

// --- Tolerant parsing of stored records ---

/// Reads a field, falling back to its default when the stored value has the wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Reads a list item by item, dropping only the items that do not parse.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// One set of an exercise entry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetEntry {
    #[serde(deserialize_with = "lenient")]
    pub reps: u32,
    #[serde(deserialize_with = "lenient")]
    pub weight: f64,
    #[serde(deserialize_with = "lenient")]
    pub completed: bool,
}

impl SetEntry {
    pub const fn new(reps: u32, weight: f64) -> Self {
        Self {
            reps,
            weight,
            completed: false,
        }
    }

    pub const fn completed(reps: u32, weight: f64) -> Self {
        Self {
            reps,
            weight,
            completed: true,
        }
    }

    pub fn volume(&self) -> f64 {
        f64::from(self.reps) * self.weight
    }

    fn has_data(&self) -> bool {
        self.completed || self.reps > 0 || self.weight > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExerciseEntry {
    /// Normalized name, the key for history and PRs.
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    /// Name as the user typed it.
    #[serde(deserialize_with = "lenient")]
    pub display_name: String,
    /// Muscle group tag.
    #[serde(deserialize_with = "lenient")]
    pub group: String,
    #[serde(deserialize_with = "lenient_vec")]
    pub sets: Vec<SetEntry>,
    #[serde(deserialize_with = "lenient")]
    pub completed: bool,
    #[serde(deserialize_with = "lenient")]
    pub superset: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    pub notes: Option<String>,
}

impl ExerciseEntry {
    pub fn new(display_name: &str, group: &str) -> Self {
        Self {
            name: crate::normalize::normalize_exercise_name(display_name),
            display_name: display_name.trim().to_string(),
            group: group.trim().to_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_sets(mut self, sets: Vec<SetEntry>) -> Self {
        self.sets = sets;
        self
    }

    pub fn completed_sets(&self) -> impl Iterator<Item = &SetEntry> {
        self.sets.iter().filter(|s| s.completed)
    }

    pub fn has_data(&self) -> bool {
        self.completed || self.sets.iter().any(SetEntry::has_data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    #[default]
    Moderate,
    High,
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardioState {
    #[serde(deserialize_with = "lenient")]
    pub activity: String,
    #[serde(deserialize_with = "lenient")]
    pub duration_minutes: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    pub distance_km: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub avg_heart_rate: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    pub intensity: Intensity,
}

impl CardioState {
    pub fn has_data(&self) -> bool {
        self.duration_minutes.is_some() || self.distance_km.is_some() || self.avg_heart_rate.is_some()
    }
}

/// A training group name or cardio mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum SessionGroup {
    Training(String),
    Cardio,
}

impl Default for SessionGroup {
    fn default() -> Self {
        Self::Training(String::new())
    }
}

impl fmt::Display for SessionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Training(name) => write!(f, "{name}"),
            Self::Cardio => write!(f, "cardio"),
        }
    }
}

/// The workout currently being logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub group: SessionGroup,
    #[serde(default)]
    pub exercises: Vec<ExerciseEntry>,
    #[serde(default)]
    pub cardio: Option<CardioState>,
    #[serde(default)]
    pub completed: bool,
}

impl Session {
    pub fn new(group: SessionGroup, started_at: DateTime<Utc>) -> Self {
        let cardio = matches!(group, SessionGroup::Cardio).then(CardioState::default);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at,
            group,
            exercises: Vec::new(),
            cardio,
            completed: false,
        }
    }

    pub fn has_data(&self) -> bool {
        self.exercises.iter().any(ExerciseEntry::has_data)
            || self.cardio.as_ref().is_some_and(CardioState::has_data)
    }
}

/// Autosaved snapshot of an unfinished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default)]
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub session: Session,
}

/// A finished session. Never mutated after it is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySession {
    pub id: String,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "lenient")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub group: SessionGroup,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub exercises: Vec<ExerciseEntry>,
    #[serde(default, deserialize_with = "lenient")]
    pub volume: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub cardio: Option<CardioState>,
    #[serde(default, deserialize_with = "lenient")]
    pub calories: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub duration_minutes: Option<u32>,
}

/// Best observed performance of one exercise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrRecord {
    pub weight: f64,
    pub reps: u32,
    /// Older tables stored no date; those records load with the epoch date.
    #[serde(default, deserialize_with = "lenient")]
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "lenient")]
    pub estimated_1rm: f64,
}

impl PrRecord {
    pub fn new(weight: f64, reps: u32, date: NaiveDate) -> Self {
        Self {
            weight,
            reps,
            date,
            estimated_1rm: crate::calc::calculate_1rm(weight, reps).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    pub date: NaiveDate,
    pub weight_kg: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub chest_cm: Option<f64>,
    pub waist_cm: Option<f64>,
    pub hips_cm: Option<f64>,
    pub arm_cm: Option<f64>,
    pub thigh_cm: Option<f64>,
}

impl Measurement {
    pub fn values(&self) -> [(&'static str, Option<f64>); 7] {
        [
            ("weight_kg", self.weight_kg),
            ("body_fat_pct", self.body_fat_pct),
            ("chest_cm", self.chest_cm),
            ("waist_cm", self.waist_cm),
            ("hips_cm", self.hips_cm),
            ("arm_cm", self.arm_cm),
            ("thigh_cm", self.thigh_cm),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: Option<String>,
    pub bodyweight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub measurements: Vec<Measurement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomWorkout {
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub exercises: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomExercise {
    pub name: String,
    #[serde(default)]
    pub group: String,
}
