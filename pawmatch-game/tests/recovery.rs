use chrono::{Duration, Utc};
use pawmatch_game::constants::{POWER_UP_BACKUP_KEY, SESSION_HISTORY_KEY, SESSION_STATE_KEY};
use pawmatch_game::persistence::{safe_state, validate, validate_all};
use pawmatch_game::{
    DifficultyPhase, GameError, LoadOutcome, MemoryStore, PersistenceConfig, PowerUpInventory,
    RecoveryStep, RetryConfig, SessionPersistenceManager, SessionState, ValidationFailure,
};

fn manager(store: &MemoryStore) -> SessionPersistenceManager<MemoryStore> {
    SessionPersistenceManager::new(
        store.clone(),
        PersistenceConfig {
            store_retry: RetryConfig::immediate(2),
            ..PersistenceConfig::default()
        },
    )
}

fn mid_game(score: u32) -> SessionState {
    SessionState {
        score,
        correct_answers: 6,
        total_questions: 8,
        phase: DifficultyPhase::Intermediate,
        is_active: true,
        started_at: Some(Utc::now()),
        consecutive_correct: 2,
        time_remaining: 7,
        ..SessionState::default()
    }
}

#[test]
fn every_saved_key_is_written() {
    let store = MemoryStore::new();
    let mut manager = manager(&store);
    manager.save_now(&mid_game(90), Utc::now()).unwrap();
    for key in [SESSION_STATE_KEY, POWER_UP_BACKUP_KEY, SESSION_HISTORY_KEY] {
        assert!(store.contains(key), "{key} missing");
    }
}

#[tokio::test]
async fn flipped_byte_is_detected_and_repaired() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let mut writer = manager(&store);
    writer.save_now(&mid_game(90), now).unwrap();
    writer.save_now(&mid_game(120), now).unwrap();

    let raw = String::from_utf8(store.raw(SESSION_STATE_KEY).unwrap()).unwrap();
    store.put_raw(
        SESSION_STATE_KEY,
        raw.replace("\"score\":120", "\"score\":999"),
    );

    let mut reader = manager(&store);
    let LoadOutcome::Recovered(recovered) = reader.load(now).await.unwrap() else {
        panic!("tampered state must not load as-is");
    };
    assert_eq!(recovered.report.step, RecoveryStep::History);
    assert_eq!(recovered.state.score, 120);
    assert!(validate(&recovered.state, now).is_ok());
}

#[test]
fn safe_state_is_always_valid() {
    let now = Utc::now();
    let mut wrecked = mid_game(1_000_000);
    wrecked.correct_answers = 500;
    wrecked.total_questions = 3;
    wrecked.phase = DifficultyPhase::Expert;
    wrecked.power_ups = PowerUpInventory {
        hint: 40,
        ..PowerUpInventory::empty()
    };
    wrecked.time_remaining = 120;
    wrecked.lives = 0;
    wrecked.started_at = Some(now - Duration::hours(5));
    wrecked.current_hint = Some("stale".to_string());
    assert!(validate_all(&wrecked, now).len() >= 5);

    let safe = safe_state(&wrecked);
    assert_eq!(validate(&safe, now), Ok(()));
    assert!(safe.correct_answers <= safe.total_questions);
    assert!(safe.phase.consistent_with(safe.total_questions));
    assert!((1..=3).contains(&safe.lives));
    assert_eq!(safe.current_hint, None);
    assert_eq!(safe_state(&safe), safe);
}

#[test]
fn inflated_inventory_restores_from_backup() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let mut manager = manager(&store);
    let honest = mid_game(40);
    manager.save_now(&honest, now).unwrap();

    let mut inflated = honest.clone();
    inflated.power_ups.skip = 25;
    assert_eq!(
        validate(&inflated, now),
        Err(ValidationFailure::PowerUpOverflow { total: 28 })
    );
    let recovered = manager.verify(&inflated, now).unwrap().unwrap();
    assert_eq!(recovered.report.step, RecoveryStep::PowerUpBackup);
    assert_eq!(recovered.state.power_ups, honest.power_ups);
    assert_eq!(recovered.state.score, 40);
}

#[tokio::test]
async fn unreadable_store_surfaces_a_persistence_failure() {
    let store = MemoryStore::new();
    store.fail_next_loads(10);
    let mut manager = manager(&store);
    let err = manager.load(Utc::now()).await.unwrap_err();
    assert!(matches!(err, GameError::PersistenceFailure(_)));
}

#[tokio::test]
async fn garbage_without_history_is_unrecoverable() {
    let store = MemoryStore::new();
    store.put_raw(SESSION_STATE_KEY, b"\x00\x01not json".to_vec());
    store.put_raw(POWER_UP_BACKUP_KEY, b"also broken".to_vec());
    let mut manager = manager(&store);
    let err = manager.load(Utc::now()).await.unwrap_err();
    assert!(err.requires_fresh_session());
    assert!(!store.contains(SESSION_STATE_KEY));
    assert!(!store.contains(POWER_UP_BACKUP_KEY));
}
