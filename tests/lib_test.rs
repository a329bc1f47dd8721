use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use liftlog_lib::{
    calc, load_config_util, normalize, parse_color, save_config_util, stats, AppService,
    CardioUpdate, CatalogError, Config, ConfigError, Draft, ExerciseEntry, HistorySession,
    HistoryStore, Intensity, KeyValueStore, ManualClock, Measurement, MemoryStore, PrMetric,
    PrRecord, PrUpdate, ProfileError, SessionError, SessionGroup, SetEntry, SetUpdate,
    SqliteStore, StorageError, StorageKey, Units,
};

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// Helper function to create a test service over an in-memory store
fn service_at<S: KeyValueStore>(
    config: Config,
    store: S,
    clock: &ManualClock,
) -> Result<AppService<S>> {
    AppService::with_store(config, store, Box::new(clock.clone()))
}

fn create_test_service() -> Result<(AppService<MemoryStore>, ManualClock)> {
    let clock = ManualClock::new(start_time());
    let service = service_at(Config::default(), MemoryStore::new(), &clock)?;
    Ok((service, clock))
}

/// Adds `exercise` with one completed set and marks the entry completed.
fn log_completed_set<S: KeyValueStore>(
    service: &mut AppService<S>,
    exercise: &str,
    reps: i64,
    weight: f64,
) -> Result<usize> {
    let index = service.add_exercise(exercise, None, 1)?;
    service.update_exercise(index, 0, SetUpdate::Reps(reps))?;
    service.update_exercise(index, 0, SetUpdate::Weight(weight))?;
    service.update_exercise(index, 0, SetUpdate::Completed(true))?;
    service.toggle_exercise_completed(index)?;
    Ok(index)
}

fn stored_draft(store: &MemoryStore) -> Result<Option<Draft>> {
    Ok(match store.get(StorageKey::Draft)? {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    })
}

fn history_record(id: &str, day: NaiveDate, exercise: &str, sets: Vec<SetEntry>) -> HistorySession {
    let entry = ExerciseEntry {
        completed: true,
        ..ExerciseEntry::new(exercise, "legs").with_sets(sets)
    };
    let volume = calc::calculate_volume(std::slice::from_ref(&entry));
    HistorySession {
        id: id.to_string(),
        date: day,
        started_at: None,
        finished_at: None,
        group: SessionGroup::Training("legs".to_string()),
        exercises: vec![entry],
        volume,
        cardio: None,
        calories: None,
        duration_minutes: None,
    }
}

// --- Draft lifecycle ---

#[test]
fn test_autosave_coalesces_rapid_edits_into_one_write() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_session("push")?;
    let baseline = service.store.write_count();

    for reps in 1..=5 {
        clock.advance(Duration::milliseconds(300));
        service.update_exercise(0, 0, SetUpdate::Reps(reps))?;
        assert!(service.poll_autosave().is_none());
    }
    assert!(service.session.autosave_pending());

    // Last edit at +1.5s, so the write is due at +3.5s.
    clock.advance(Duration::milliseconds(1999));
    assert!(service.poll_autosave().is_none());
    clock.advance(Duration::milliseconds(1));
    assert!(matches!(service.poll_autosave(), Some(Ok(()))));
    assert!(service.poll_autosave().is_none());

    assert_eq!(service.store.write_count(), baseline + 1);
    assert!(!service.session.has_unsaved_changes());
    let draft = stored_draft(&service.store)?.expect("draft should be written");
    assert_eq!(draft.session.exercises[0].sets[0].reps, 5);
    assert_eq!(draft.saved_at, service.now());
    Ok(())
}

#[test]
fn test_autosave_max_wait_bounds_continuous_editing() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_session("push")?;

    let mut first_write = None;
    for second in 1..=12 {
        clock.advance(Duration::seconds(1));
        service.update_exercise(0, 0, SetUpdate::Reps(second))?;
        if service.poll_autosave().is_some() && first_write.is_none() {
            first_write = Some(second);
        }
    }
    assert_eq!(first_write, Some(10));
    Ok(())
}

#[test]
fn test_manual_save_cancels_pending_autosave() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_session("legs")?;
    service.save_current_session()?;
    let after_save = service.store.write_count();

    clock.advance(Duration::seconds(5));
    assert!(service.poll_autosave().is_none());
    assert_eq!(service.store.write_count(), after_save);
    assert!(service.flush());
    assert_eq!(service.store.write_count(), after_save);
    Ok(())
}

#[test]
fn test_fresh_draft_is_restored_after_restart() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_session("push")?;
    log_completed_set(&mut service, "Sentadilla", 5, 120.0)?;
    service.save_current_session()?;
    let session_id = service.session.session().unwrap().id.clone();

    clock.advance(Duration::hours(11));
    let store = service.store;
    let mut restarted = service_at(Config::default(), store, &clock)?;

    let draft = restarted.check_for_existing_draft().expect("draft should be offered");
    assert_eq!(draft.session.id, session_id);
    assert!(restarted.restore_from_draft());

    let session = restarted.session.session().unwrap();
    assert_eq!(session.id, session_id);
    assert_eq!(session.exercises.len(), 7);
    assert_eq!(session.exercises[6].name, "squat");
    assert_eq!(session.exercises[6].display_name, "Sentadilla");
    assert!(!restarted.session.has_unsaved_changes());
    Ok(())
}

#[test]
fn test_stale_draft_is_discarded() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_session("push")?;
    service.save_current_session()?;

    clock.advance(Duration::hours(13));
    let store = service.store;
    let mut restarted = service_at(Config::default(), store, &clock)?;

    assert!(restarted.check_for_existing_draft().is_none());
    assert!(restarted.store.get(StorageKey::Draft)?.is_none());
    assert!(!restarted.restore_from_draft());
    assert!(!restarted.session.is_active());
    Ok(())
}

#[test]
fn test_malformed_draft_is_discarded() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let mut store = MemoryStore::new();
    store.set(StorageKey::Draft, "{not json")?;
    let mut service = service_at(Config::default(), store, &clock)?;

    assert!(service.check_for_existing_draft().is_none());
    assert!(service.store.get(StorageKey::Draft)?.is_none());
    Ok(())
}

#[test]
fn test_failed_save_keeps_session_and_reports() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("legs")?;
    service.store.set_unavailable(true);

    assert!(matches!(
        service.save_current_session(),
        Err(StorageError::Unavailable)
    ));
    assert!(service.session.is_active());
    assert!(service.session.has_unsaved_changes());
    assert!(service.session.take_notice().is_some());
    assert!(service.session.take_notice().is_none());

    service.store.set_unavailable(false);
    assert!(service.flush());
    assert!(service.store.get(StorageKey::Draft)?.is_some());
    Ok(())
}

#[test]
fn test_autosave_over_quota_is_not_fatal() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let mut service = service_at(Config::default(), MemoryStore::with_quota(64), &clock)?;
    service.start_session("push")?;

    clock.advance(Duration::seconds(2));
    assert!(matches!(
        service.poll_autosave(),
        Some(Err(StorageError::QuotaExceeded {
            key: StorageKey::Draft,
            ..
        }))
    ));
    assert!(service.session.is_active());
    assert!(service.session.has_unsaved_changes());
    assert!(service.session.take_notice().is_some());
    Ok(())
}

#[test]
fn test_discarding_session_deletes_draft() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("pull")?;
    service.save_current_session()?;
    assert!(service.store.get(StorageKey::Draft)?.is_some());

    let discarded = service.end_session().expect("session was active");
    assert_eq!(discarded.group, SessionGroup::Training("pull".to_string()));
    assert!(!service.session.is_active());
    assert!(service.store.get(StorageKey::Draft)?.is_none());
    assert!(service.history.is_empty());
    assert!(service.end_session().is_none());
    Ok(())
}

// --- Finalization, history and PRs ---

#[test]
fn test_finish_session_commits_history_and_prs() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_session("push")?;
    log_completed_set(&mut service, "  Press de   Banca ", 5, 100.0)?;
    service.save_current_session()?;
    clock.advance(Duration::minutes(45));

    let finished = service.finish_session()?;
    let record = &finished.record;
    assert_eq!(record.date, date(2024, 3, 4));
    assert_eq!(record.exercises.len(), 1);
    assert_eq!(record.exercises[0].name, "bench press");
    assert_eq!(record.exercises[0].group, "chest");
    assert!((record.volume - 500.0).abs() < f64::EPSILON);
    assert_eq!(record.duration_minutes, Some(45));
    assert_eq!(record.calories, None);
    assert_eq!(finished.new_prs, vec![("bench press".to_string(), PrUpdate::New)]);
    assert_eq!(finished.evicted, 0);

    assert!(!service.session.is_active());
    assert!(service.store.get(StorageKey::Draft)?.is_none());
    assert_eq!(service.recent_history(10).len(), 1);

    let pr = service.get_prs()["bench press"];
    assert!((pr.weight - 100.0).abs() < f64::EPSILON);
    assert_eq!(pr.reps, 5);
    assert!((pr.estimated_1rm - 100.0 * (1.0 + 5.0 / 30.0)).abs() < 1e-9);

    let reloaded = HistoryStore::load(&service.store, 200, PrMetric::Estimated1rm)?;
    assert_eq!(reloaded.len(), 1);
    let reloaded_pr = reloaded.pr_for("Bench").unwrap();
    assert_eq!(reloaded_pr.reps, 5);
    assert_eq!(reloaded_pr.date, pr.date);
    Ok(())
}

#[test]
fn test_finish_without_completed_sets_is_rejected() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("push")?;
    service.update_exercise(0, 0, SetUpdate::Reps(8))?;

    let err = service.finish_session().unwrap_err();
    assert_eq!(
        err.downcast_ref::<SessionError>(),
        Some(&SessionError::NothingToCommit)
    );
    assert!(service.session.is_active());
    assert!(service.history.is_empty());
    Ok(())
}

#[test]
fn test_finish_without_session_fails() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    let err = service.finish_session().unwrap_err();
    assert_eq!(
        err.downcast_ref::<SessionError>(),
        Some(&SessionError::NoActiveSession)
    );
    Ok(())
}

#[test]
fn test_failed_history_write_changes_nothing() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("legs")?;
    log_completed_set(&mut service, "Squat", 5, 140.0)?;

    service.store.set_unavailable(true);
    assert!(service.finish_session().is_err());
    assert!(service.session.is_active());
    assert!(service.history.is_empty());
    assert!(service.get_prs().is_empty());

    service.store.set_unavailable(false);
    service.finish_session()?;
    assert_eq!(service.history.len(), 1);
    assert!(!service.session.is_active());
    Ok(())
}

#[test]
fn test_only_completed_exercises_set_records() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("legs")?;
    let index = service.add_exercise("Squat", None, 1)?;
    service.update_exercise(index, 0, SetUpdate::Reps(5))?;
    service.update_exercise(index, 0, SetUpdate::Weight(150.0))?;
    service.update_exercise(index, 0, SetUpdate::Completed(true))?;

    let finished = service.finish_session()?;
    assert!(finished.new_prs.is_empty());
    assert!(service.get_prs().is_empty());
    // The completed set still lands in history.
    assert!((finished.record.volume - 750.0).abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn test_incomplete_sets_are_dropped_from_history() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("legs")?;
    let index = log_completed_set(&mut service, "Squat", 5, 100.0)?;
    let extra = service.add_set(index)?;
    assert_eq!(extra, 1);

    let finished = service.finish_session()?;
    let squat = finished
        .record
        .exercises
        .iter()
        .find(|e| e.name == "squat")
        .unwrap();
    assert_eq!(squat.sets.len(), 1);
    // Template exercises without completed sets are not recorded.
    assert_eq!(finished.record.exercises.len(), 1);
    Ok(())
}

#[test]
fn test_history_is_capped_newest_first() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let config = Config {
        history_max_entries: 50,
        ..Config::default()
    };
    let mut service = service_at(config, MemoryStore::new(), &clock)?;

    let mut ids = Vec::new();
    for i in 0..55_i32 {
        service.start_session("legs")?;
        log_completed_set(&mut service, "Squat", 5, 100.0 + f64::from(i))?;
        clock.advance(Duration::hours(1));
        let finished = service.finish_session()?;
        assert_eq!(finished.evicted, usize::from(i >= 50));
        ids.push(finished.record.id);
    }

    assert_eq!(service.history.len(), 50);
    assert_eq!(service.recent_history(1)[0].id, ids[54]);
    for evicted in &ids[..5] {
        assert!(service.history.find(evicted).is_none());
    }
    assert!(service.history.find(&ids[5]).is_some());

    let reloaded = HistoryStore::load(&service.store, 50, PrMetric::Estimated1rm)?;
    assert_eq!(reloaded.len(), 50);
    Ok(())
}

#[test]
fn test_delete_from_history_is_idempotent() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("legs")?;
    log_completed_set(&mut service, "Squat", 5, 100.0)?;
    let id = service.finish_session()?.record.id;

    assert!(service.delete_from_history(&id)?);
    assert!(!service.delete_from_history(&id)?);
    assert!(!service.delete_from_history("missing")?);
    assert!(service.history.is_empty());
    assert_eq!(service.store.get(StorageKey::History)?.as_deref(), Some("[]"));

    // PRs stay until they are rebuilt.
    assert_eq!(service.get_prs().len(), 1);
    service.recompute_prs()?;
    assert!(service.get_prs().is_empty());
    Ok(())
}

#[test]
fn test_pr_updates_only_on_strict_improvement() {
    let mut history = HistoryStore::new(10, PrMetric::Estimated1rm);

    assert_eq!(
        history.update_pr("Bench", PrRecord::new(100.0, 5, date(2024, 3, 1))),
        PrUpdate::New
    );
    // An equal performance keeps the earlier record.
    assert_eq!(
        history.update_pr("bench press", PrRecord::new(100.0, 5, date(2024, 3, 8))),
        PrUpdate::Unchanged
    );
    assert_eq!(history.pr_for("Bench Press").unwrap().date, date(2024, 3, 1));

    assert_eq!(
        history.update_pr("Bench Press", PrRecord::new(90.0, 5, date(2024, 3, 9))),
        PrUpdate::Unchanged
    );
    assert_eq!(
        history.update_pr("Bench", PrRecord::new(100.0, 0, date(2024, 3, 9))),
        PrUpdate::Unchanged
    );

    match history.update_pr("Press de banca", PrRecord::new(102.5, 5, date(2024, 3, 10))) {
        PrUpdate::Improved { previous } => {
            assert!((previous.weight - 100.0).abs() < f64::EPSILON);
        }
        other => panic!("expected an improvement, got {other:?}"),
    }
    assert_eq!(history.get_prs().len(), 1);
}

#[test]
fn test_weight_metric_breaks_ties_by_reps() {
    let mut history = HistoryStore::new(10, PrMetric::Weight);
    history.update_pr("Squat", PrRecord::new(100.0, 5, date(2024, 3, 1)));

    assert!(history
        .update_pr("Squat", PrRecord::new(100.0, 6, date(2024, 3, 2)))
        .is_record());
    // Higher estimated max but lower weight does not count under this metric.
    assert!(!history
        .update_pr("Squat", PrRecord::new(90.0, 20, date(2024, 3, 3)))
        .is_record());
    assert_eq!(history.pr_for("squat").unwrap().reps, 6);
}

// --- Session editing ---

#[test]
fn test_invalid_set_values_are_rejected() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("push")?;
    service.update_exercise(0, 0, SetUpdate::Reps(8))?;

    let err = service.update_exercise(0, 0, SetUpdate::Reps(-1)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::InvalidInput(_))
    ));
    assert!(service
        .update_exercise(0, 0, SetUpdate::Weight(f64::NAN))
        .is_err());
    assert!(service.update_exercise(0, 9, SetUpdate::Reps(1)).is_err());
    assert!(service.update_exercise(42, 0, SetUpdate::Reps(1)).is_err());

    let set = service.session.session().unwrap().exercises[0].sets[0];
    assert_eq!(set.reps, 8);
    assert!(set.weight.abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn test_set_update_is_all_or_nothing() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("push")?;
    service.update_set(0, 0, &[SetUpdate::Reps(8), SetUpdate::Weight(60.0)])?;

    let err = service
        .update_set(0, 0, &[SetUpdate::Reps(5), SetUpdate::Weight(-1.0)])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::InvalidInput(_))
    ));
    let set = service.session.session().unwrap().exercises[0].sets[0];
    assert_eq!(set, SetEntry::new(8, 60.0));
    Ok(())
}

#[test]
fn test_editing_without_session_fails() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    let err = service.add_exercise("Squat", None, 1).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SessionError>(),
        Some(&SessionError::NoActiveSession)
    );
    assert!(service.add_set(0).is_err());
    Ok(())
}

#[test]
fn test_add_set_copies_previous_values() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("legs")?;
    let index = log_completed_set(&mut service, "Squat", 5, 100.0)?;
    let set_index = service.add_set(index)?;

    let copied = service.session.session().unwrap().exercises[index].sets[set_index];
    assert_eq!(copied, SetEntry::new(5, 100.0));
    service.remove_set(index, set_index)?;
    assert_eq!(service.session.session().unwrap().exercises[index].sets.len(), 1);
    Ok(())
}

#[test]
fn test_empty_exercise_name_is_rejected() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("legs")?;
    let err = service.add_exercise("   ", None, 1).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SessionError>(),
        Some(&SessionError::EmptyExerciseName)
    );
    Ok(())
}

#[test]
fn test_superset_dissolves_when_one_member_remains() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("push")?;

    let group = service.link_superset(&[0, 1])?;
    assert_eq!(group, 1);
    assert_eq!(service.session.get_exercises_in_superset(1), vec![0, 1]);
    assert_eq!(service.session.get_next_superset_group(), 2);

    let other = service.link_superset(&[2, 3, 3])?;
    assert_eq!(other, 2);

    service.remove_exercise(0)?;
    let session = service.session.session().unwrap();
    assert_eq!(session.exercises[0].superset, None);
    assert!(service.session.get_exercises_in_superset(1).is_empty());

    // Indices shifted by one after the removal.
    service.update_exercise_superset(1, None)?;
    assert_eq!(service.session.session().unwrap().exercises[2].superset, None);

    let err = service.link_superset(&[4]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::InvalidInput(_))
    ));
    Ok(())
}

#[test]
fn test_superset_requires_an_existing_group() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("push")?;
    let group = service.link_superset(&[0, 1])?;

    let err = service.update_exercise_superset(2, Some(99)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::InvalidInput(_))
    ));
    assert_eq!(service.session.session().unwrap().exercises[2].superset, None);

    service.update_exercise_superset(2, Some(group))?;
    assert_eq!(service.session.get_exercises_in_superset(group), vec![0, 1, 2]);
    Ok(())
}

#[test]
fn test_cardio_session_calories() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.set_bodyweight(70.0)?;
    service.start_session("Cardio")?;
    assert!(service.session.session().unwrap().cardio.is_some());

    service.update_cardio(CardioUpdate::Activity(" Running ".to_string()))?;
    service.update_cardio(CardioUpdate::DurationMinutes(30))?;
    service.update_cardio(CardioUpdate::DistanceKm(5.2))?;
    service.update_cardio(CardioUpdate::Intensity(Intensity::High))?;
    assert!(service.update_cardio(CardioUpdate::AvgHeartRate(-5)).is_err());
    clock.advance(Duration::minutes(40));

    let finished = service.finish_session()?;
    let record = finished.record;
    assert_eq!(record.group, SessionGroup::Cardio);
    assert_eq!(record.duration_minutes, Some(30));
    assert_eq!(record.calories, Some(367.5));
    assert_eq!(record.cardio.unwrap().activity, "Running");
    assert!(record.volume.abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn test_strength_session_calories_use_elapsed_time() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.set_bodyweight(80.0)?;
    service.start_session("legs")?;
    log_completed_set(&mut service, "Squat", 5, 100.0)?;
    clock.advance(Duration::minutes(60));

    let finished = service.finish_session()?;
    assert_eq!(finished.record.calories, Some(420.0));
    Ok(())
}

#[test]
fn test_cardio_update_on_training_session_fails() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("push")?;
    let err = service
        .update_cardio(CardioUpdate::DurationMinutes(10))
        .unwrap_err();
    assert_eq!(err.downcast_ref::<SessionError>(), Some(&SessionError::NotCardio));
    Ok(())
}

// --- Catalog ---

#[test]
fn test_builtin_group_template() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    let session = service.start_session("  Push ")?;
    assert_eq!(session.group, SessionGroup::Training("push".to_string()));
    assert_eq!(session.exercises.len(), 6);
    assert!(session.exercises.iter().all(|e| e.sets.len() == 3));
    assert_eq!(session.exercises[0].name, "bench press");
    assert_eq!(session.exercises[0].group, "chest");

    let err = service.start_session("yoga").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::UnknownGroup(name)) if name == "yoga"
    ));
    Ok(())
}

#[test]
fn test_custom_workouts_and_exercises() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.add_custom_workout(
        "Arms Day",
        "arms",
        &["Curl de bíceps".to_string(), "Fondos".to_string()],
    )?;
    assert!(service.catalog.groups().contains(&"Arms Day".to_string()));

    let err = service
        .add_custom_workout("push", "chest", &["Bench".to_string()])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::NameTaken(_))
    ));
    assert!(service.add_custom_workout("Empty", "x", &[]).is_err());

    let session = service.start_session("arms day")?;
    assert_eq!(session.group, SessionGroup::Training("Arms Day".to_string()));
    let names: Vec<&str> = session.exercises.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["biceps curl", "dips"]);
    assert_eq!(session.exercises[0].group, "biceps");

    service.add_custom_exercise("Sled Push", "Legs")?;
    let index = service.add_exercise("sled  push", None, 1)?;
    assert_eq!(service.session.session().unwrap().exercises[index].group, "legs");
    assert!(service.add_custom_exercise("Bench", "chest").is_err());

    let unknown = service.add_exercise("Zercher Carry", None, 0)?;
    assert_eq!(service.session.session().unwrap().exercises[unknown].group, "other");

    let reloaded = liftlog_lib::Catalog::load(&service.store)?;
    assert_eq!(reloaded.custom_workouts().len(), 1);
    assert_eq!(reloaded.custom_exercises().len(), 1);

    assert!(service.remove_custom_workout("ARMS DAY")?);
    assert!(!service.remove_custom_workout("Arms Day")?);
    Ok(())
}

// --- Profile ---

#[test]
fn test_measurements_are_ordered_and_update_bodyweight() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.add_measurement(Measurement {
        date: date(2024, 3, 10),
        weight_kg: Some(80.0),
        waist_cm: Some(84.0),
        ..Measurement::default()
    })?;
    assert_eq!(service.profile.bodyweight(), Some(80.0));

    // An older entry does not override the current bodyweight.
    service.add_measurement(Measurement {
        date: date(2024, 3, 1),
        weight_kg: Some(82.0),
        ..Measurement::default()
    })?;
    assert_eq!(service.profile.bodyweight(), Some(80.0));

    let dates: Vec<NaiveDate> = service.profile.measurements().iter().map(|m| m.date).collect();
    assert_eq!(dates, vec![date(2024, 3, 1), date(2024, 3, 10)]);
    assert_eq!(
        service.profile.latest_measurement().unwrap().waist_cm,
        Some(84.0)
    );
    assert_eq!(
        service
            .profile
            .measurements_between(date(2024, 3, 5), date(2024, 3, 31))
            .len(),
        1
    );

    let err = service
        .add_measurement(Measurement {
            date: date(2024, 3, 11),
            ..Measurement::default()
        })
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProfileError>(),
        Some(ProfileError::EmptyMeasurement)
    ));
    assert!(service
        .add_measurement(Measurement {
            date: date(2024, 3, 11),
            chest_cm: Some(-3.0),
            ..Measurement::default()
        })
        .is_err());
    assert!(service.set_bodyweight(0.0).is_err());

    let reloaded = liftlog_lib::ProfileStore::load(&service.store)?;
    assert_eq!(reloaded.measurements().len(), 2);
    Ok(())
}

#[test]
fn test_profile_name_and_height() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.update_profile(Some("  Sam ".to_string()), Some(180.0))?;
    let profile = service.profile.profile();
    assert_eq!(profile.name.as_deref(), Some("Sam"));
    assert_eq!(profile.height_cm, Some(180.0));

    assert!(service
        .update_profile(Some("Alex".to_string()), Some(-5.0))
        .is_err());
    assert_eq!(service.profile.profile().name.as_deref(), Some("Sam"));

    service.update_profile(Some(String::new()), None)?;
    let reloaded = liftlog_lib::ProfileStore::load(&service.store)?;
    assert_eq!(reloaded.profile().name, None);
    assert_eq!(reloaded.profile().height_cm, Some(180.0));
    Ok(())
}

// --- Statistics ---

#[test]
fn test_exercise_stats_and_streaks() {
    let history = vec![
        history_record("d", date(2024, 3, 10), "Squat", vec![SetEntry::completed(5, 105.0)]),
        history_record("c", date(2024, 3, 3), "squat", vec![SetEntry::completed(5, 100.0)]),
        history_record(
            "b",
            date(2024, 3, 2),
            "Sentadilla",
            vec![SetEntry::completed(3, 120.0), SetEntry::new(8, 80.0)],
        ),
        history_record("a", date(2024, 3, 1), "Squat", vec![SetEntry::completed(5, 100.0)]),
        history_record("x", date(2024, 3, 5), "Deadlift", vec![SetEntry::completed(5, 180.0)]),
    ];

    let stats = stats::exercise_stats(&history, "SQUAT", date(2024, 3, 10), 1).unwrap();
    assert_eq!(stats.canonical_name, "squat");
    assert_eq!(stats.total_sessions, 4);
    assert_eq!(stats.total_sets, 4);
    assert_eq!(stats.first_date, date(2024, 3, 1));
    assert_eq!(stats.last_date, date(2024, 3, 10));
    assert_eq!(stats.longest_gap_days, Some(6));
    assert_eq!(stats.current_streak, 1);
    assert_eq!(stats.longest_streak, 3);
    assert_eq!(stats.personal_bests.max_weight, Some(120.0));
    assert_eq!(stats.personal_bests.max_reps, Some(5));
    assert!((stats.personal_bests.best_estimated_1rm.unwrap() - 132.0).abs() < 1e-9);
    assert!((stats.avg_sessions_per_week.unwrap() - 4.0 / (9.0 / 7.0)).abs() < 1e-9);

    assert!(stats::exercise_stats(&history, "Bench", date(2024, 3, 10), 1).is_none());

    let weeks = stats::weekly_volume(&history);
    assert_eq!(weeks.len(), 2);
    assert!((weeks[&(2024, 9)] - 1360.0).abs() < f64::EPSILON);
    assert!((weeks[&(2024, 10)] - (525.0 + 900.0)).abs() < f64::EPSILON);
}

#[test]
fn test_streak_interval_and_expiry() {
    let dates = [date(2024, 3, 1), date(2024, 3, 3), date(2024, 3, 3), date(2024, 3, 5)];
    assert_eq!(
        stats::calculate_streaks(&dates, Duration::days(2), date(2024, 3, 6)),
        (3, 3)
    );
    assert_eq!(
        stats::calculate_streaks(&dates, Duration::days(2), date(2024, 3, 8)),
        (0, 3)
    );
    assert_eq!(
        stats::calculate_streaks(&dates, Duration::days(1), date(2024, 3, 5)),
        (1, 1)
    );
    assert_eq!(stats::calculate_streaks(&[], Duration::days(1), date(2024, 3, 5)), (0, 0));
}

#[test]
fn test_service_stats_for_unknown_exercise_fails() -> Result<()> {
    let (service, _clock) = create_test_service()?;
    assert!(service.exercise_stats("Squat").is_err());
    assert!(service.progression_for("Squat", 5).is_none());
    Ok(())
}

#[test]
fn test_progression_follows_last_session() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_session("legs")?;
    log_completed_set(&mut service, "Squat", 8, 100.0)?;
    service.finish_session()?;

    match service.progression_for("sentadilla", 8) {
        Some(calc::Progression::Increase { weight }) => {
            assert!((weight - 102.5).abs() < f64::EPSILON);
        }
        other => panic!("expected an increase, got {other:?}"),
    }
    Ok(())
}

// --- Calculation utilities ---

#[test]
fn test_one_rep_max() {
    assert_eq!(calc::calculate_1rm(100.0, 1), Some(100.0));
    assert!((calc::calculate_1rm(100.0, 10).unwrap() - 133.333_333).abs() < 1e-3);
    assert_eq!(calc::calculate_1rm(100.0, 0), None);
    assert_eq!(calc::calculate_1rm(-5.0, 3), None);
}

#[test]
fn test_volume_counts_completed_sets_only() {
    let entries = vec![
        ExerciseEntry::new("Squat", "legs").with_sets(vec![
            SetEntry::completed(5, 100.0),
            SetEntry::new(5, 100.0),
        ]),
        ExerciseEntry::new("Bench", "chest").with_sets(vec![SetEntry::completed(10, 60.0)]),
    ];
    assert!((calc::calculate_volume(&entries) - 1100.0).abs() < f64::EPSILON);
    assert!(calc::calculate_volume(&[]).abs() < f64::EPSILON);

    let by_group = calc::calculate_volume_by_group(&entries);
    assert_eq!(by_group.get("legs"), Some(&500.0));
    assert_eq!(by_group.get("chest"), Some(&600.0));
}

#[test]
fn test_calories_and_dates() {
    assert!((calc::calculate_calories(7.0, 70.0, 30) - 257.25).abs() < 1e-9);
    assert!(calc::calculate_calories(7.0, 0.0, 30).abs() < f64::EPSILON);
    assert!((calc::met_for_intensity(Intensity::Low) - 4.0).abs() < f64::EPSILON);

    assert_eq!(calc::format_date(date(2024, 3, 5)), "05/03/2024");
    assert_eq!(calc::format_short_date(date(2024, 3, 5)), "05/03");
    assert_eq!(calc::get_week_number(date(2024, 1, 1)), 1);
    assert_eq!(calc::get_week_number(date(2024, 12, 30)), 1);
    assert_eq!(calc::days_since(date(2024, 3, 1), date(2024, 3, 10)), 9);
    assert!((calc::progress_percent(100.0, 110.0).unwrap() - 10.0).abs() < 1e-9);
    assert_eq!(calc::progress_percent(0.0, 110.0), None);
}

#[test]
fn test_progressive_overload_suggestions() {
    let all_done = [SetEntry::completed(8, 100.0), SetEntry::completed(8, 100.0)];
    assert_eq!(
        calc::calculate_progressive(&all_done, 8, 2.5),
        Some(calc::Progression::Increase { weight: 102.5 })
    );

    let partial = [SetEntry::completed(8, 100.0), SetEntry::completed(6, 100.0)];
    assert_eq!(
        calc::calculate_progressive(&partial, 8, 2.5),
        Some(calc::Progression::Hold { weight: 100.0 })
    );

    let none_done = [SetEntry::new(8, 100.0)];
    assert_eq!(
        calc::calculate_progressive(&none_done, 8, 2.5),
        Some(calc::Progression::Deload { weight: 90.0 })
    );
    assert_eq!(calc::calculate_progressive(&[], 8, 2.5), None);
}

// --- Normalization and migrations ---

#[test]
fn test_exercise_name_normalization() {
    assert_eq!(normalize::normalize_exercise_name("  Press de   Banca "), "bench press");
    assert_eq!(normalize::normalize_exercise_name("SENTADILLA"), "squat");
    assert_eq!(normalize::normalize_exercise_name("Peso Muerto"), "deadlift");
    assert_eq!(normalize::normalize_exercise_name("Dominadas"), "pull up");
    assert_eq!(normalize::normalize_exercise_name("Jalón al pecho"), "lat pulldown");
    assert_eq!(normalize::normalize_exercise_name("Café  Curl"), "cafe curl");
    assert_eq!(normalize::normalize_exercise_name(""), "");

    let once = normalize::normalize_exercise_name("Extensión de Tríceps");
    assert_eq!(once, "triceps extension");
    assert_eq!(normalize::normalize_exercise_name(&once), once);
}

#[test]
fn test_legacy_data_is_migrated_once() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let mut store = MemoryStore::new();
    store.set(
        StorageKey::Prs,
        r#"{
            "Press de Banca": {"weight": 100.0, "reps": 5, "date": "2024-01-01"},
            "bench press": {"weight": 90.0, "reps": 5, "date": "2024-01-02"},
            "Sentadilla": {"weight": 140.0, "reps": 3, "date": "2024-01-03"}
        }"#,
    )?;
    store.set(
        StorageKey::History,
        r#"[{"id": "h1", "date": "2024-01-01", "exercises": [
            {"name": "Peso Muerto", "sets": [{"reps": 5, "weight": 150.0, "completed": true}], "completed": true}
        ]}]"#,
    )?;

    let mut service = service_at(Config::default(), store, &clock)?;
    let prs = service.get_prs();
    assert_eq!(prs.keys().collect::<Vec<_>>(), vec!["bench press", "squat"]);
    assert!((prs["bench press"].weight - 100.0).abs() < f64::EPSILON);

    let history = service.recent_history(10);
    assert_eq!(history[0].exercises[0].name, "deadlift");
    assert_eq!(history[0].exercises[0].display_name, "Peso Muerto");
    assert_eq!(service.store.get(StorageKey::SchemaVersion)?.as_deref(), Some("2"));

    let writes = service.store.write_count();
    let version = normalize::run_migrations(&mut service.store, PrMetric::Estimated1rm)?;
    assert_eq!(version, normalize::SCHEMA_VERSION);
    assert_eq!(service.store.write_count(), writes);
    Ok(())
}

#[test]
fn test_malformed_records_fall_back_to_defaults() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let mut store = MemoryStore::new();
    store.set(
        StorageKey::History,
        r#"[{"id": "ok", "date": "2024-01-01"}, {"garbage": true}, 5]"#,
    )?;
    store.set(StorageKey::Prs, "nope")?;
    store.set(StorageKey::Profile, "[1, 2]")?;
    store.set(StorageKey::CustomWorkouts, "{")?;

    let service = service_at(Config::default(), store, &clock)?;
    assert_eq!(service.history.len(), 1);
    assert_eq!(service.history.unreadable_count(), 2);
    assert!(service.get_prs().is_empty());
    assert_eq!(service.profile.bodyweight(), None);
    assert!(service.catalog.custom_workouts().is_empty());
    Ok(())
}

#[test]
fn test_unreadable_pr_entry_does_not_cost_the_others() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let mut store = MemoryStore::new();
    store.set(
        StorageKey::Prs,
        r#"{
            "Squat": {"weight": 140.0, "reps": 3, "date": "2024-01-03"},
            "Deadlift": {"weight": 180.0, "reps": 2, "date": "2024-01-04"},
            "Bench": {"weight": 100.0, "reps": 5},
            "Row": {"weight": "heavy"}
        }"#,
    )?;

    let mut service = service_at(Config::default(), store, &clock)?;
    let squat = service.history.pr_for("Squat").unwrap();
    assert_eq!((squat.reps, squat.date), (3, date(2024, 1, 3)));
    assert!(service.history.pr_for("Deadlift").is_some());
    let bench = service.history.pr_for("Bench").unwrap();
    assert_eq!(bench.reps, 5);
    assert!((bench.weight - 100.0).abs() < f64::EPSILON);
    assert_eq!(service.history.unreadable_count(), 1);

    service.start_session("legs")?;
    log_completed_set(&mut service, "Squat", 3, 150.0)?;
    service.finish_session()?;

    let stored: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&service.store.get(StorageKey::Prs)?.unwrap())?;
    assert!(stored.contains_key("squat"));
    assert!(stored.contains_key("deadlift"));
    assert_eq!(stored["Row"], serde_json::json!({"weight": "heavy"}));
    Ok(())
}

#[test]
fn test_bad_set_does_not_drop_its_workout() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let mut store = MemoryStore::new();
    store.set(
        StorageKey::History,
        r#"[
            {"id": "h1", "date": "2024-01-01", "exercises": [
                {"name": "Squat", "completed": true, "sets": [
                    {"reps": 5, "weight": 100.0, "completed": true},
                    {"reps": 5, "weight": null, "completed": true},
                    null
                ]}
            ]},
            {"date": "2024-01-02"}
        ]"#,
    )?;

    let mut service = service_at(Config::default(), store, &clock)?;
    assert_eq!(service.history.len(), 1);
    let h1 = service.history.find("h1").unwrap().clone();
    assert_eq!(h1.exercises[0].name, "squat");
    assert_eq!(h1.exercises[0].sets.len(), 2);
    assert!(h1.exercises[0].sets[1].weight.abs() < f64::EPSILON);

    service.start_session("legs")?;
    log_completed_set(&mut service, "Squat", 3, 150.0)?;
    service.finish_session()?;

    let stored: Vec<serde_json::Value> =
        serde_json::from_str(&service.store.get(StorageKey::History)?.unwrap())?;
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[1]["id"], "h1");
    assert_eq!(stored[2], serde_json::json!({"date": "2024-01-02"}));
    Ok(())
}

// --- Storage backends ---

#[test]
fn test_sqlite_store_persists_values() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("liftlog.sqlite");
    {
        let mut store = SqliteStore::open(&path)?;
        assert_eq!(store.get(StorageKey::Profile)?, None);
        store.set(StorageKey::Profile, "{}")?;
        store.set(StorageKey::Profile, r#"{"bodyweight_kg": 75.0}"#)?;
        store.set(StorageKey::Draft, "{}")?;
        store.remove(StorageKey::Draft)?;
        store.remove(StorageKey::Draft)?;
    }
    let store = SqliteStore::open(&path)?;
    assert_eq!(
        store.get(StorageKey::Profile)?.as_deref(),
        Some(r#"{"bodyweight_kg": 75.0}"#)
    );
    assert_eq!(store.get(StorageKey::Draft)?, None);
    Ok(())
}

#[test]
fn test_service_over_sqlite_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("liftlog.sqlite");
    let clock = ManualClock::new(start_time());
    {
        let mut service = service_at(Config::default(), SqliteStore::open(&path)?, &clock)?;
        service.start_session("legs")?;
        log_completed_set(&mut service, "Squat", 3, 150.0)?;
        service.finish_session()?;
        service.start_session("push")?;
        service.update_exercise(0, 0, SetUpdate::Reps(10))?;
        assert!(service.flush());
    }
    clock.advance(Duration::hours(1));
    let mut service = service_at(Config::default(), SqliteStore::open(&path)?, &clock)?;
    assert_eq!(service.history.len(), 1);
    assert!(service.get_prs().contains_key("squat"));
    assert!(service.restore_from_draft());
    assert_eq!(
        service.session.session().unwrap().exercises[0].sets[0].reps,
        10
    );
    Ok(())
}

#[test]
fn test_memory_store_quota() -> Result<()> {
    let mut store = MemoryStore::with_quota(10);
    store.set(StorageKey::Profile, "12345")?;
    store.set(StorageKey::Profile, "1234567890")?;
    assert!(matches!(
        store.set(StorageKey::Prs, "x"),
        Err(StorageError::QuotaExceeded { needed: 1, available: 0, .. })
    ));
    assert_eq!(store.used_bytes(), 10);
    assert_eq!(store.write_count(), 2);
    Ok(())
}

// --- Configuration ---

#[test]
fn test_config_load_creates_default_and_round_trips() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("config.toml");

    let config = load_config_util(&path)?;
    assert_eq!(config, Config::default());
    assert!(path.exists());

    let changed = Config {
        units: Units::Imperial,
        pr_metric: PrMetric::Weight,
        history_max_entries: 75,
        ..Config::default()
    };
    save_config_util(&path, &changed)?;
    assert_eq!(load_config_util(&path)?, changed);

    std::fs::write(&path, "units = \"imperial\"\npr_metric = \"estimated-1rm\"\n")?;
    let partial = load_config_util(&path)?;
    assert_eq!(partial.units, Units::Imperial);
    assert_eq!(partial.autosave_delay_ms, 2_000);
    assert_eq!(partial.draft_max_age(), Duration::hours(12));
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "history_max_entries = 0\n")?;
    assert!(matches!(
        load_config_util(&path),
        Err(ConfigError::InvalidValue {
            field: "history_max_entries",
            ..
        })
    ));

    std::fs::write(&path, "autosave_delay_ms = [")?;
    assert!(matches!(load_config_util(&path), Err(ConfigError::TomlParse(_))));

    let clock = ManualClock::new(start_time());
    let bad = Config {
        autosave_max_wait_ms: 100,
        ..Config::default()
    };
    assert!(service_at(bad, MemoryStore::new(), &clock).is_err());
    Ok(())
}

#[test]
fn test_parse_color() {
    assert!(parse_color("cyan").is_ok());
    assert!(parse_color(" DarkGrey ").is_ok());
    assert!(matches!(parse_color("mauve"), Err(ConfigError::InvalidColor(_))));
}
