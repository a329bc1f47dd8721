// src/profile.rs
use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::models::{Measurement, Profile};
use crate::storage::{read_json, write_json, KeyValueStore, StorageError, StorageKey};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Invalid value for {field}: {value} (must be a positive number)")]
    InvalidValue { field: &'static str, value: f64 },
    #[error("A measurement needs at least one value.")]
    EmptyMeasurement,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn check_positive(field: &'static str, value: Option<f64>) -> Result<(), ProfileError> {
    match value {
        Some(v) if !(v.is_finite() && v > 0.0) => Err(ProfileError::InvalidValue { field, value: v }),
        _ => Ok(()),
    }
}

/// Current profile snapshot plus the append-only measurement log.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profile: Profile,
}

impl ProfileStore {
    /// Loads the profile; an unreadable one falls back to an empty profile.
    /// # Errors
    /// Returns `ProfileError::Storage` if the backend fails.
    pub fn load<S>(store: &S) -> Result<Self, ProfileError>
    where
        S: KeyValueStore + ?Sized,
    {
        let profile = match read_json(store, StorageKey::Profile) {
            Ok(profile) => profile.unwrap_or_default(),
            Err(StorageError::Malformed { source, .. }) => {
                warn!(error = %source, "profile unreadable, using defaults");
                Profile::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { profile })
    }

    /// # Errors
    /// Returns `ProfileError::Storage` if the write fails.
    pub fn save<S>(&self, store: &mut S) -> Result<(), ProfileError>
    where
        S: KeyValueStore + ?Sized,
    {
        write_json(store, StorageKey::Profile, &self.profile).map_err(Into::into)
    }

    pub fn profile(&self) -> Profile {
        self.profile.clone()
    }

    pub const fn bodyweight(&self) -> Option<f64> {
        self.profile.bodyweight_kg
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.profile.name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    }

    /// # Errors
    /// `ProfileError::InvalidValue` unless `kg` is positive.
    pub fn set_bodyweight(&mut self, kg: f64) -> Result<(), ProfileError> {
        check_positive("bodyweight", Some(kg))?;
        self.profile.bodyweight_kg = Some(kg);
        Ok(())
    }

    /// # Errors
    /// `ProfileError::InvalidValue` unless `cm` is positive.
    pub fn set_height(&mut self, cm: f64) -> Result<(), ProfileError> {
        check_positive("height", Some(cm))?;
        self.profile.height_cm = Some(cm);
        Ok(())
    }

    /// Appends a measurement, keeping the log ordered by date.
    /// A measured body weight also becomes the current body weight when it
    /// is the newest entry.
    /// # Errors
    /// `ProfileError::InvalidValue` for non-positive values,
    /// `ProfileError::EmptyMeasurement` when nothing was measured.
    pub fn add_measurement(&mut self, measurement: Measurement) -> Result<(), ProfileError> {
        let values = measurement.values();
        if values.iter().all(|(_, v)| v.is_none()) {
            return Err(ProfileError::EmptyMeasurement);
        }
        for (field, value) in values {
            check_positive(field, value)?;
        }
        let position = self
            .profile
            .measurements
            .partition_point(|m| m.date <= measurement.date);
        self.profile.measurements.insert(position, measurement);
        if position + 1 == self.profile.measurements.len() {
            if let Some(kg) = measurement.weight_kg {
                self.profile.bodyweight_kg = Some(kg);
            }
        }
        Ok(())
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.profile.measurements.clone()
    }

    pub fn latest_measurement(&self) -> Option<Measurement> {
        self.profile.measurements.last().copied()
    }

    /// Measurements taken within `[from, to]`.
    pub fn measurements_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<Measurement> {
        self.profile
            .measurements
            .iter()
            .filter(|m| m.date >= from && m.date <= to)
            .copied()
            .collect()
    }
}
