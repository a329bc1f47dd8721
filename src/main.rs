//src/main.rs
mod cli;

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdout};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use liftlog_lib::{
    calc::{self, Progression},
    AppService, CardioUpdate, ExerciseStats, FinishedSession, HistorySession, Intensity,
    Measurement, PrRecord, PrUpdate, Session, SessionGroup, SetUpdate, Units,
};

fn main() -> Result<()> {
    let cli_args = cli::parse_args();

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();
        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;

    // Every invocation continues the unfinished workout, if its draft is still fresh.
    if service.restore_from_draft() {
        debug!("continuing session from draft");
    }

    let result = run(&mut service, cli_args.command);

    if !service.flush() {
        eprintln!("Warning: the current workout could not be saved.");
    }
    if let Some(notice) = service.session.take_notice() {
        eprintln!("Warning: {notice}");
    }
    result
}

/// 1-based number from the command line to a 0-based index.
fn to_index(what: &str, number: usize) -> Result<usize> {
    match number.checked_sub(1) {
        Some(index) => Ok(index),
        None => bail!("{what} numbers start at 1."),
    }
}

const fn weight_unit(units: Units) -> &'static str {
    match units {
        Units::Metric => "kg",
        Units::Imperial => "lbs",
    }
}

fn header_color(service: &AppService) -> Color {
    liftlog_lib::parse_color(&service.config.theme.header_color)
        .map(Color::from)
        .unwrap_or(Color::Green)
}

#[allow(clippy::too_many_lines)]
fn run(service: &mut AppService, command: cli::Commands) -> Result<()> {
    let units = service.config.units;
    match command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }

        // --- Session lifecycle ---
        cli::Commands::Start { group, force } => {
            if service.session.has_unsaved_data() && !force {
                bail!("A workout with logged data is still open. Finish it, discard it, or pass --force to replace it.");
            }
            let color = header_color(service);
            let session = service.start_session(&group)?;
            println!("Started '{}' session.", session.group);
            print_session(session, color, units);
        }
        cli::Commands::Status => match service.session.session() {
            Some(session) => print_session(session, header_color(service), units),
            None => println!("No active session. Start one with `liftlog start <group>`."),
        },
        cli::Commands::Save => {
            if !service.session.is_active() {
                bail!("No workout session is active.");
            }
            service
                .save_current_session()
                .context("Failed to save the current workout")?;
            println!("Workout saved.");
        }
        cli::Commands::Finish => {
            let finished = service.finish_session()?;
            print_finished(&finished, units);
        }
        cli::Commands::Discard { force } => {
            if service.session.has_unsaved_data() && !force {
                bail!("The open workout has logged data. Pass --force to discard it.");
            }
            match service.end_session() {
                Some(session) => println!("Discarded '{}' session.", session.group),
                None => println!("No active session."),
            }
        }

        // --- Exercises and sets ---
        cli::Commands::AddExercise { name, group, sets } => {
            let index = service.add_exercise(&name, group.as_deref(), sets)?;
            println!("Added exercise #{}: {}", index + 1, name.trim());
        }
        cli::Commands::RemoveExercise { exercise } => {
            let removed = service.remove_exercise(to_index("Exercise", exercise)?)?;
            println!("Removed exercise '{}'.", removed.display_name);
        }
        cli::Commands::AddSet { exercise } => {
            let set = service.add_set(to_index("Exercise", exercise)?)?;
            println!("Added set #{} to exercise #{exercise}.", set + 1);
        }
        cli::Commands::RemoveSet { exercise, set } => {
            service.remove_set(to_index("Exercise", exercise)?, to_index("Set", set)?)?;
            println!("Removed set #{set} from exercise #{exercise}.");
        }
        cli::Commands::Set {
            exercise,
            set,
            reps,
            weight,
            done,
            undone,
        } => {
            let index = to_index("Exercise", exercise)?;
            let set_index = to_index("Set", set)?;
            let mut updates = Vec::new();
            if let Some(reps) = reps {
                updates.push(SetUpdate::Reps(reps));
            }
            if let Some(weight) = weight {
                updates.push(SetUpdate::Weight(weight));
            }
            if done || undone {
                updates.push(SetUpdate::Completed(done));
            }
            if updates.is_empty() {
                bail!("Nothing to change. Use --reps, --weight, --done or --undone.");
            }
            service.update_set(index, set_index, &updates)?;
            println!("Updated set #{set} of exercise #{exercise}.");
        }
        cli::Commands::Complete { exercise } => {
            let completed = service.toggle_exercise_completed(to_index("Exercise", exercise)?)?;
            let state = if completed { "completed" } else { "not completed" };
            println!("Exercise #{exercise} marked as {state}.");
        }
        cli::Commands::Superset { exercises, clear } => {
            let indices = exercises
                .iter()
                .map(|&n| to_index("Exercise", n))
                .collect::<Result<Vec<_>>>()?;
            if clear {
                for index in indices {
                    service.update_exercise_superset(index, None)?;
                }
                println!("Removed exercises from their superset.");
            } else {
                let group = service.link_superset(&indices)?;
                println!("Linked exercises into superset {group}.");
            }
        }
        cli::Commands::Cardio {
            activity,
            minutes,
            distance,
            heart_rate,
            intensity,
        } => {
            let mut updates = Vec::new();
            if let Some(activity) = activity {
                updates.push(CardioUpdate::Activity(activity));
            }
            if let Some(minutes) = minutes {
                updates.push(CardioUpdate::DurationMinutes(minutes));
            }
            if let Some(distance) = distance {
                updates.push(CardioUpdate::DistanceKm(distance));
            }
            if let Some(hr) = heart_rate {
                updates.push(CardioUpdate::AvgHeartRate(hr));
            }
            if let Some(intensity) = intensity {
                updates.push(CardioUpdate::Intensity(cli_intensity(intensity)));
            }
            if updates.is_empty() {
                bail!("Nothing to change. See `liftlog cardio --help`.");
            }
            for update in updates {
                service.update_cardio(update)?;
            }
            println!("Cardio session updated.");
        }

        // --- History and records ---
        cli::Commands::History { limit } => {
            let history = service.recent_history(limit);
            if history.is_empty() {
                println!("No finished workouts yet.");
            } else {
                print_history_table(&history, header_color(service), units);
            }
        }
        cli::Commands::DeleteHistory { id } => {
            let id = resolve_history_id(service, &id)?;
            if service.delete_from_history(&id)? {
                println!("Deleted workout {id}.");
            } else {
                println!("No workout with id {id}.");
            }
        }
        cli::Commands::Prs { recompute } => {
            if recompute {
                service.recompute_prs()?;
                println!("Personal records rebuilt from history.");
            }
            let prs = service.get_prs();
            if prs.is_empty() {
                println!("No personal records yet.");
            } else {
                print_pr_table(&prs, header_color(service), units);
            }
        }
        cli::Commands::Stats { exercise } => {
            let stats = service.exercise_stats(&exercise)?;
            print_exercise_stats(&stats, units);
        }
        cli::Commands::Volume => {
            let weeks = service.weekly_volume();
            if weeks.is_empty() {
                println!("No finished workouts yet.");
            } else {
                print_volume_table(&weeks, header_color(service), units);
            }
        }
        cli::Commands::Progress {
            exercise,
            target_reps,
        } => match service.progression_for(&exercise, target_reps) {
            Some(progression) => {
                let unit = weight_unit(units);
                let advice = match progression {
                    Progression::Increase { .. } => "all sets hit the target, go up",
                    Progression::Hold { .. } => "repeat the weight",
                    Progression::Deload { .. } => "no completed sets last time, back off",
                };
                println!(
                    "Next {}: {:.2} {unit} ({advice}).",
                    exercise.trim(),
                    progression.weight()
                );
            }
            None => bail!("No logged sets found for exercise '{exercise}'"),
        },

        // --- Profile ---
        cli::Commands::Measure {
            date,
            weight,
            body_fat,
            chest,
            waist,
            hips,
            arm,
            thigh,
        } => {
            let measurement = Measurement {
                date: date.unwrap_or_else(|| service.now().date_naive()),
                weight_kg: weight,
                body_fat_pct: body_fat,
                chest_cm: chest,
                waist_cm: waist,
                hips_cm: hips,
                arm_cm: arm,
                thigh_cm: thigh,
            };
            service.add_measurement(measurement)?;
            println!("Measurement for {} saved.", calc::format_date(measurement.date));
        }
        cli::Commands::SetBodyweight { weight } => {
            service.set_bodyweight(weight)?;
            println!("Bodyweight set to {weight} kg.");
        }
        cli::Commands::SetProfile { name, height } => {
            if name.is_none() && height.is_none() {
                bail!("Nothing to change. Use --name or --height.");
            }
            service.update_profile(name, height)?;
            println!("Profile updated.");
        }
        cli::Commands::Profile => print_profile(service),

        // --- Catalog ---
        cli::Commands::Groups => {
            for group in service.catalog.groups() {
                println!("{group}");
            }
        }
        cli::Commands::CustomWorkout {
            name,
            group,
            exercises,
        } => {
            service.add_custom_workout(&name, &group, &exercises)?;
            println!(
                "Custom workout '{}' saved with {} exercise(s).",
                name.trim(),
                exercises.len()
            );
        }
        cli::Commands::RemoveCustomWorkout { name } => {
            if service.remove_custom_workout(&name)? {
                println!("Deleted custom workout '{}'.", name.trim());
            } else {
                println!("No custom workout named '{}'.", name.trim());
            }
        }
        cli::Commands::CustomExercise { name, group } => {
            service.add_custom_exercise(&name, &group)?;
            println!("Custom exercise '{}' saved.", name.trim());
        }

        cli::Commands::ConfigPath => println!("{}", service.get_config_path().display()),
        cli::Commands::DbPath => println!("{}", service.get_db_path().display()),
    }
    Ok(())
}

// --- CLI Specific Helper Functions ---

const fn cli_intensity(intensity: cli::IntensityCli) -> Intensity {
    match intensity {
        cli::IntensityCli::Low => Intensity::Low,
        cli::IntensityCli::Moderate => Intensity::Moderate,
        cli::IntensityCli::High => Intensity::High,
    }
}

/// Accepts a full id or an unambiguous prefix of one.
fn resolve_history_id(service: &AppService, input: &str) -> Result<String> {
    let input = input.trim();
    let matches: Vec<String> = service
        .history
        .get_history()
        .into_iter()
        .map(|s| s.id)
        .filter(|id| id.starts_with(input))
        .collect();
    match matches.as_slice() {
        [] => Ok(input.to_string()),
        [only] => Ok(only.clone()),
        _ if matches.iter().any(|id| id == input) => Ok(input.to_string()),
        _ => bail!("Id prefix '{input}' matches {} workouts, use more characters.", matches.len()),
    }
}

fn format_sets(session_sets: &[liftlog_lib::SetEntry]) -> String {
    if session_sets.is_empty() {
        return "-".to_string();
    }
    session_sets
        .iter()
        .map(|s| {
            let mark = if s.completed { "✓" } else { "" };
            format!("{}x{}{mark}", s.reps, s.weight)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_finished(finished: &FinishedSession, units: Units) {
    let record = &finished.record;
    println!(
        "Workout saved to history ({}, {} exercise(s), volume {:.2} {}).",
        calc::format_date(record.date),
        record.exercises.len(),
        record.volume,
        weight_unit(units)
    );
    if let Some(calories) = record.calories {
        println!("Estimated energy: {calories:.0} kcal");
    }
    for (exercise, update) in finished.new_prs.iter().filter(|(_, u)| u.is_record()) {
        match update {
            PrUpdate::New => println!("*** First record for {exercise}! ***"),
            PrUpdate::Improved { previous } => println!(
                "*** New PR for {exercise}! (previous: {}x{} on {}) ***",
                previous.reps,
                previous.weight,
                calc::format_short_date(previous.date)
            ),
            PrUpdate::Unchanged => {}
        }
    }
    if finished.evicted > 0 {
        println!(
            "Note: {} oldest workout(s) dropped from history to stay within the limit.",
            finished.evicted
        );
    }
}

// --- Table Printing Functions ---

fn print_session(session: &Session, header_color: Color, units: Units) {
    println!(
        "Session '{}' started {} UTC",
        session.group,
        session.started_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(cardio) = &session.cardio {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        let activity = if cardio.activity.is_empty() {
            "-".to_string()
        } else {
            cardio.activity.clone()
        };
        table.add_row(vec![Cell::new("Activity").add_attribute(Attribute::Bold), Cell::new(activity)]);
        table.add_row(vec![
            Cell::new("Duration").add_attribute(Attribute::Bold),
            Cell::new(cardio.duration_minutes.map_or("-".to_string(), |m| format!("{m} min"))),
        ]);
        table.add_row(vec![
            Cell::new("Distance").add_attribute(Attribute::Bold),
            Cell::new(cardio.distance_km.map_or("-".to_string(), |d| format!("{d:.2} km"))),
        ]);
        table.add_row(vec![
            Cell::new("Avg Heart Rate").add_attribute(Attribute::Bold),
            Cell::new(cardio.avg_heart_rate.map_or("-".to_string(), |hr| hr.to_string())),
        ]);
        table.add_row(vec![
            Cell::new("Intensity").add_attribute(Attribute::Bold),
            Cell::new(cardio.intensity.to_string()),
        ]);
        println!("{table}");
        return;
    }
    if session.exercises.is_empty() {
        println!("No exercises yet. Add one with `liftlog add-exercise <name>`.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(header_color),
            Cell::new("Exercise").fg(header_color),
            Cell::new("Group").fg(header_color),
            Cell::new(format!("Sets (reps x {})", weight_unit(units))).fg(header_color),
            Cell::new("Done").fg(header_color),
            Cell::new("Superset").fg(header_color),
        ]);
    for (i, entry) in session.exercises.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&entry.display_name),
            Cell::new(&entry.group),
            Cell::new(format_sets(&entry.sets)),
            Cell::new(if entry.completed { "yes" } else { "no" }),
            Cell::new(entry.superset.map_or("-".to_string(), |g| g.to_string())),
        ]);
    }
    println!("{table}");
}

fn print_history_table(history: &[HistorySession], header_color: Color, units: Units) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Date").fg(header_color),
            Cell::new("Group").fg(header_color),
            Cell::new("Exercises").fg(header_color),
            Cell::new(format!("Volume ({})", weight_unit(units))).fg(header_color),
            Cell::new("Duration (min)").fg(header_color),
            Cell::new("kcal").fg(header_color),
        ]);

    for session in history {
        let exercises = match &session.group {
            SessionGroup::Cardio => session
                .cardio
                .as_ref()
                .map_or("cardio".to_string(), |c| c.activity.clone()),
            SessionGroup::Training(_) => session
                .exercises
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        };
        table.add_row(vec![
            Cell::new(session.id.chars().take(8).collect::<String>()),
            Cell::new(calc::format_date(session.date)),
            Cell::new(session.group.to_string()),
            Cell::new(exercises),
            Cell::new(format!("{:.2}", session.volume)),
            Cell::new(session.duration_minutes.map_or("-".to_string(), |m| m.to_string())),
            Cell::new(session.calories.map_or("-".to_string(), |c| format!("{c:.0}"))),
        ]);
    }
    println!("{table}");
}

fn print_pr_table(
    prs: &std::collections::BTreeMap<String, PrRecord>,
    header_color: Color,
    units: Units,
) {
    let unit = weight_unit(units);
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Exercise").fg(header_color),
            Cell::new(format!("Weight ({unit})")).fg(header_color),
            Cell::new("Reps").fg(header_color),
            Cell::new(format!("Est. 1RM ({unit})")).fg(header_color),
            Cell::new("Date").fg(header_color),
        ]);
    for (exercise, pr) in prs {
        table.add_row(vec![
            Cell::new(exercise),
            Cell::new(format!("{:.2}", pr.weight)),
            Cell::new(pr.reps),
            Cell::new(format!("{:.2}", pr.estimated_1rm)),
            Cell::new(calc::format_date(pr.date)),
        ]);
    }
    println!("{table}");
}

fn print_volume_table(
    weeks: &std::collections::BTreeMap<(i32, u32), f64>,
    header_color: Color,
    units: Units,
) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Week").fg(header_color),
            Cell::new(format!("Volume ({})", weight_unit(units))).fg(header_color),
            Cell::new("Change").fg(header_color),
        ]);
    let mut previous: Option<f64> = None;
    for (&(year, week), &volume) in weeks {
        let change = previous
            .and_then(|p| calc::progress_percent(p, volume))
            .map_or("-".to_string(), |pct| format!("{pct:+.1}%"));
        table.add_row(vec![
            Cell::new(format!("{year}-W{week:02}")),
            Cell::new(format!("{volume:.2}")),
            Cell::new(change),
        ]);
        previous = Some(volume);
    }
    println!("{table}");
}

fn print_exercise_stats(stats: &ExerciseStats, units: Units) {
    println!("\n--- Statistics for '{}' ---", stats.canonical_name);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![Cell::new("Total Sessions").add_attribute(Attribute::Bold), Cell::new(stats.total_sessions)]);
    table.add_row(vec![Cell::new("Total Sets").add_attribute(Attribute::Bold), Cell::new(stats.total_sets)]);
    table.add_row(vec![
        Cell::new("First Session").add_attribute(Attribute::Bold),
        Cell::new(calc::format_date(stats.first_date)),
    ]);
    table.add_row(vec![
        Cell::new("Last Session").add_attribute(Attribute::Bold),
        Cell::new(calc::format_date(stats.last_date)),
    ]);
    table.add_row(vec![
        Cell::new("Avg Sessions / Week").add_attribute(Attribute::Bold),
        Cell::new(stats.avg_sessions_per_week.map_or("N/A".to_string(), |avg| format!("{avg:.2}"))),
    ]);
    table.add_row(vec![
        Cell::new("Longest Gap").add_attribute(Attribute::Bold),
        Cell::new(stats.longest_gap_days.map_or("N/A".to_string(), |gap| format!("{gap} days"))),
    ]);

    let streak_interval_str = match stats.streak_interval_days {
        1 => "(Daily)".to_string(),
        n => format!("({n}-day Interval)"),
    };
    table.add_row(vec![
        Cell::new(format!("Current Streak {streak_interval_str}")).add_attribute(Attribute::Bold),
        Cell::new(stats.current_streak),
    ]);
    table.add_row(vec![
        Cell::new(format!("Longest Streak {streak_interval_str}")).add_attribute(Attribute::Bold),
        Cell::new(stats.longest_streak),
    ]);
    println!("{table}");

    println!("\n--- Personal Bests ---");
    let unit = weight_unit(units);
    let bests = &stats.personal_bests;
    let mut pb_table = Table::new();
    pb_table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let rows = [
        ("Max Weight", bests.max_weight.map(|w| format!("{w:.2} {unit}"))),
        ("Max Reps", bests.max_reps.map(|r| r.to_string())),
        ("Best Est. 1RM", bests.best_estimated_1rm.map(|w| format!("{w:.2} {unit}"))),
        ("Best Session Volume", bests.best_volume.map(|v| format!("{v:.2} {unit}"))),
    ];
    let mut has_pbs = false;
    for (label, value) in rows {
        if let Some(value) = value {
            pb_table.add_row(vec![Cell::new(label).add_attribute(Attribute::Bold), Cell::new(value)]);
            has_pbs = true;
        }
    }
    if has_pbs {
        println!("{pb_table}");
    } else {
        println!("No personal bests recorded for this exercise yet.");
    }
    println!();
}

fn print_profile(service: &AppService) {
    let profile = service.profile.profile();
    println!("Name: {}", profile.name.as_deref().unwrap_or("-"));
    println!(
        "Bodyweight: {}",
        profile
            .bodyweight_kg
            .map_or("not set".to_string(), |w| format!("{w:.1} kg"))
    );
    println!(
        "Height: {}",
        profile
            .height_cm
            .map_or("not set".to_string(), |h| format!("{h:.0} cm"))
    );
    if profile.measurements.is_empty() {
        println!("No measurements logged.");
        return;
    }

    let header_color = header_color(service);
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Date").fg(header_color),
            Cell::new("Weight (kg)").fg(header_color),
            Cell::new("Body Fat (%)").fg(header_color),
            Cell::new("Chest").fg(header_color),
            Cell::new("Waist").fg(header_color),
            Cell::new("Hips").fg(header_color),
            Cell::new("Arm").fg(header_color),
            Cell::new("Thigh").fg(header_color),
        ]);
    let today = service.now().date_naive();
    for m in profile.measurements.iter().rev().take(10) {
        let mut row = vec![Cell::new(format!(
            "{} ({}d ago)",
            calc::format_date(m.date),
            calc::days_since(m.date, today)
        ))];
        row.extend(
            m.values()
                .iter()
                .map(|(_, v)| Cell::new(v.map_or("-".to_string(), |v| format!("{v:.1}")))),
        );
        table.add_row(row);
    }
    println!("{table}");
}
