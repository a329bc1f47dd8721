// src/stats.rs
use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::calc::calculate_1rm;
use crate::models::HistorySession;
use crate::normalize::normalize_exercise_name;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersonalBests {
    pub max_weight: Option<f64>,
    pub max_reps: Option<u32>,
    pub best_estimated_1rm: Option<f64>,
    pub best_volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseStats {
    pub canonical_name: String,
    pub total_sessions: usize,
    pub total_sets: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub avg_sessions_per_week: Option<f64>,
    pub longest_gap_days: Option<u64>,
    pub personal_bests: PersonalBests,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub streak_interval_days: u32,
}

fn max_f64(acc: Option<f64>, value: f64) -> Option<f64> {
    Some(acc.map_or(value, |a| a.max(value)))
}

/// Aggregates every completed set of `exercise` found in `history`.
/// Returns `None` when the exercise was never logged.
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn exercise_stats(
    history: &[HistorySession],
    exercise: &str,
    today: NaiveDate,
    streak_interval_days: u32,
) -> Option<ExerciseStats> {
    let canonical_name = normalize_exercise_name(exercise);
    let mut dates = Vec::new();
    let mut bests = PersonalBests::default();
    let mut total_sets = 0;

    for session in history {
        let mut logged = false;
        for entry in session.exercises.iter().filter(|e| e.name == canonical_name) {
            let mut entry_volume = 0.0;
            for set in entry.completed_sets() {
                logged = true;
                total_sets += 1;
                entry_volume += set.volume();
                bests.max_weight = max_f64(bests.max_weight, set.weight);
                bests.max_reps = Some(bests.max_reps.map_or(set.reps, |r| r.max(set.reps)));
                if let Some(e1rm) = calculate_1rm(set.weight, set.reps) {
                    bests.best_estimated_1rm = max_f64(bests.best_estimated_1rm, e1rm);
                }
            }
            if entry_volume > 0.0 {
                bests.best_volume = max_f64(bests.best_volume, entry_volume);
            }
        }
        if logged {
            dates.push(session.date);
        }
    }

    if dates.is_empty() {
        return None;
    }
    dates.sort_unstable();
    let first_date = dates[0];
    let last_date = dates[dates.len() - 1];

    let avg_sessions_per_week = if dates.len() <= 1 {
        None
    } else {
        let duration_days = (last_date - first_date).num_days();
        (duration_days > 0).then(|| {
            let duration_weeks = (duration_days as f64 / 7.0).max(1.0 / 7.0);
            dates.len() as f64 / duration_weeks
        })
    };

    let longest_gap_days = dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() - 1)
        .filter(|&g| g >= 0)
        .max()
        .map(|g| g as u64);

    let interval = Duration::days(i64::from(streak_interval_days.max(1)));
    let (current_streak, longest_streak) = calculate_streaks(&dates, interval, today);

    Some(ExerciseStats {
        canonical_name,
        total_sessions: dates.len(),
        total_sets,
        first_date,
        last_date,
        avg_sessions_per_week,
        longest_gap_days,
        personal_bests: bests,
        current_streak,
        longest_streak,
        streak_interval_days,
    })
}

/// Current and longest streak over sorted dates. Several sessions on one
/// day count once; the current streak is zero once `today` is past the interval.
pub fn calculate_streaks(dates: &[NaiveDate], interval: Duration, today: NaiveDate) -> (u32, u32) {
    let Some(&first) = dates.first() else {
        return (0, 0);
    };
    let mut current = 1u32;
    let mut longest = 1u32;
    let mut last_date = first;

    for &date in &dates[1..] {
        if date == last_date {
            continue;
        }
        if date - last_date <= interval {
            current += 1;
        } else {
            current = 1;
        }
        last_date = date;
        longest = longest.max(current);
    }
    if today - last_date > interval {
        current = 0;
    }
    (current, longest)
}

/// Completed volume per ISO (year, week).
pub fn weekly_volume(history: &[HistorySession]) -> BTreeMap<(i32, u32), f64> {
    let mut weeks = BTreeMap::new();
    for session in history {
        let week = session.date.iso_week();
        *weeks.entry((week.year(), week.week())).or_insert(0.0) += session.volume;
    }
    weeks
}
