// src/cli.rs
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about = "Log workouts from the terminal: sessions, history and personal records", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntensityCli {
    Low,
    Moderate,
    High,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a session for a workout group (e.g. "push", "legs", a custom workout, or "cardio")
    Start {
        group: String,
        /// Replace an unfinished session that already has data
        #[arg(long)]
        force: bool,
    },
    /// Add an exercise to the active session
    AddExercise {
        name: String,
        /// Muscle group tag (defaults to the catalog entry, or "other")
        #[arg(short, long)]
        group: Option<String>,
        /// Number of empty sets to add
        #[arg(short, long, default_value_t = 3)]
        sets: usize,
    },
    /// Remove an exercise (1-based number as shown by `status`)
    RemoveExercise { exercise: usize },
    /// Add a set to an exercise, copying the previous one
    AddSet { exercise: usize },
    /// Remove a set from an exercise
    RemoveSet { exercise: usize, set: usize },
    /// Update a set of an exercise
    Set {
        exercise: usize,
        set: usize,
        #[arg(short, long, allow_negative_numbers = true)]
        reps: Option<i64>,
        #[arg(short, long, allow_negative_numbers = true)]
        weight: Option<f64>,
        /// Mark the set as done
        #[arg(short, long)]
        done: bool,
        /// Mark the set as not done
        #[arg(long, conflicts_with = "done")]
        undone: bool,
    },
    /// Toggle an exercise as completed (only completed exercises count for PRs)
    Complete { exercise: usize },
    /// Link exercises into a superset, or remove them from theirs with --clear
    Superset {
        #[arg(required = true, num_args = 1..)]
        exercises: Vec<usize>,
        #[arg(long)]
        clear: bool,
    },
    /// Update the cardio session
    Cardio {
        #[arg(short, long)]
        activity: Option<String>,
        #[arg(short, long, allow_negative_numbers = true)]
        minutes: Option<i64>,
        /// Distance in km
        #[arg(short, long, allow_negative_numbers = true)]
        distance: Option<f64>,
        #[arg(long)]
        heart_rate: Option<i64>,
        #[arg(short, long, value_enum)]
        intensity: Option<IntensityCli>,
    },
    /// Show the active session
    Status,
    /// Save the active session draft now
    Save,
    /// Finish the active session and add it to history
    Finish,
    /// Discard the active session without saving it to history
    Discard {
        /// Discard even if the session has logged data
        #[arg(long)]
        force: bool,
    },
    /// List finished sessions, newest first
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete a history record by id (or unique id prefix)
    DeleteHistory { id: String },
    /// Show personal records
    Prs {
        /// Rebuild records from the retained history first
        #[arg(long)]
        recompute: bool,
    },
    /// Show statistics for one exercise
    Stats { exercise: String },
    /// Show completed volume per ISO week
    Volume,
    /// Suggest the next working weight for an exercise
    Progress {
        exercise: String,
        #[arg(short, long, default_value_t = 8)]
        target_reps: u32,
    },
    /// Log body measurements
    Measure {
        /// Date of the measurement (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        weight: Option<f64>,
        #[arg(long)]
        body_fat: Option<f64>,
        #[arg(long)]
        chest: Option<f64>,
        #[arg(long)]
        waist: Option<f64>,
        #[arg(long)]
        hips: Option<f64>,
        #[arg(long)]
        arm: Option<f64>,
        #[arg(long)]
        thigh: Option<f64>,
    },
    /// Show the profile and recent measurements
    Profile,
    /// Set the current bodyweight (kg), used for calorie estimates
    SetBodyweight { weight: f64 },
    /// Set the profile name and/or height (cm)
    SetProfile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        height: Option<f64>,
    },
    /// List workout groups that can start a session
    Groups,
    /// Define a custom workout
    CustomWorkout {
        name: String,
        #[arg(short, long, default_value = "other")]
        group: String,
        #[arg(required = true, num_args = 1..)]
        exercises: Vec<String>,
    },
    /// Delete a custom workout
    RemoveCustomWorkout { name: String },
    /// Define a custom exercise with its muscle group
    CustomExercise {
        name: String,
        #[arg(short, long)]
        group: String,
    },
    /// Show the path to the config file
    ConfigPath,
    /// Show the path to the database file
    DbPath,
    /// Generate shell completion scripts
    GenerateCompletion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
