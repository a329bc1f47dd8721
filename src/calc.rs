// src/calc.rs
//! Pure derivations from logged sets and calendar dates.
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::models::{ExerciseEntry, Intensity, SetEntry};

/// MET used for a resistance training session.
pub const STRENGTH_MET: f64 = 5.0;

/// Σ reps × weight over completed sets only.
pub fn calculate_volume(entries: &[ExerciseEntry]) -> f64 {
    entries
        .iter()
        .flat_map(ExerciseEntry::completed_sets)
        .map(SetEntry::volume)
        .sum()
}

/// Completed-set volume keyed by muscle group tag.
pub fn calculate_volume_by_group(entries: &[ExerciseEntry]) -> BTreeMap<String, f64> {
    let mut by_group = BTreeMap::new();
    for entry in entries {
        let volume: f64 = entry.completed_sets().map(SetEntry::volume).sum();
        if volume > 0.0 {
            *by_group.entry(entry.group.clone()).or_insert(0.0) += volume;
        }
    }
    by_group
}

/// Epley estimate of the one-rep max. A single rep is the lift itself.
/// Returns `None` for zero reps or a negative/non-finite weight.
pub fn calculate_1rm(weight: f64, reps: u32) -> Option<f64> {
    if reps == 0 || !weight.is_finite() || weight < 0.0 {
        return None;
    }
    if reps == 1 {
        return Some(weight);
    }
    Some(weight * (1.0 + f64::from(reps) / 30.0))
}

pub const fn met_for_intensity(intensity: Intensity) -> f64 {
    match intensity {
        Intensity::Low => 4.0,
        Intensity::Moderate => 7.0,
        Intensity::High => 10.0,
    }
}

/// Energy estimate in kcal: `met × 3.5 × kg / 200` per minute.
pub fn calculate_calories(met: f64, bodyweight_kg: f64, minutes: u32) -> f64 {
    if met <= 0.0 || bodyweight_kg <= 0.0 {
        return 0.0;
    }
    met * 3.5 * bodyweight_kg / 200.0 * f64::from(minutes)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progression {
    /// Every set hit the target: add the increment.
    Increase { weight: f64 },
    /// Some sets done but not all at target: repeat the weight.
    Hold { weight: f64 },
    /// Nothing completed: back off 10%.
    Deload { weight: f64 },
}

impl Progression {
    pub const fn weight(&self) -> f64 {
        match *self {
            Self::Increase { weight } | Self::Hold { weight } | Self::Deload { weight } => weight,
        }
    }
}

/// Suggests the working weight for the next session from the last one.
/// Returns `None` when there were no sets.
pub fn calculate_progressive(
    last_sets: &[SetEntry],
    target_reps: u32,
    increment: f64,
) -> Option<Progression> {
    let working = last_sets.iter().map(|s| s.weight).fold(None, |acc: Option<f64>, w| {
        Some(acc.map_or(w, |a| a.max(w)))
    })?;
    let completed: Vec<&SetEntry> = last_sets.iter().filter(|s| s.completed).collect();

    let suggestion = if completed.is_empty() {
        Progression::Deload {
            weight: round_to_increment(working * 0.9, increment),
        }
    } else if completed.len() == last_sets.len() && completed.iter().all(|s| s.reps >= target_reps)
    {
        Progression::Increase {
            weight: working + increment,
        }
    } else {
        Progression::Hold { weight: working }
    };
    Some(suggestion)
}

fn round_to_increment(weight: f64, increment: f64) -> f64 {
    if increment <= 0.0 {
        return weight;
    }
    (weight / increment).round() * increment
}

/// Relative change in percent; `None` when there is no previous value.
pub fn progress_percent(previous: f64, current: f64) -> Option<f64> {
    (previous > 0.0).then(|| (current - previous) / previous * 100.0)
}

/// ISO-8601 week number (1..=53).
pub fn get_week_number(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// Whole calendar days from `date` to `today`; negative for future dates.
pub fn days_since(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days()
}

/// `dd/mm`
pub fn format_short_date(date: NaiveDate) -> String {
    date.format("%d/%m").to_string()
}

/// `dd/mm/yyyy`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
