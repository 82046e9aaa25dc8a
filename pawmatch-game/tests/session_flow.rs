use chrono::Utc;
use pawmatch_game::{
    BundledCatalog, ChallengeSource, DifficultyPhase, GameEngine, GameSession, PowerUpKind,
    RuntimeConfig, SessionOutcome, SessionStatus,
};

fn engine() -> GameEngine<BundledCatalog> {
    GameEngine::new(BundledCatalog, RuntimeConfig::default()).unwrap()
}

fn started(seed: u64) -> GameSession {
    let mut session = engine().create_session(seed).unwrap();
    session.start(Utc::now()).unwrap();
    session
}

fn answer_correctly(session: &mut GameSession) {
    let slot = session.current_challenge().unwrap().correct_slot;
    session.select_image(slot).unwrap();
}

fn answer_wrong(session: &mut GameSession) {
    let slot = 1 - session.current_challenge().unwrap().correct_slot;
    session.select_image(slot).unwrap();
}

#[test]
fn perfect_run_clears_every_phase_and_wins() {
    for seed in 0..8 {
        let mut session = started(seed);
        let mut phases = vec![session.phase()];
        while session.status() == SessionStatus::Active {
            assert_eq!(session.challenge_source(), Some(ChallengeSource::Fresh));
            answer_correctly(&mut session);
            if phases.last() != Some(&session.phase()) {
                phases.push(session.phase());
            }
        }
        assert_eq!(session.outcome(), Some(SessionOutcome::Won));
        assert_eq!(
            phases,
            vec![
                DifficultyPhase::Beginner,
                DifficultyPhase::Intermediate,
                DifficultyPhase::Expert
            ]
        );
        let state = session.snapshot();
        assert_eq!(state.correct_answers, state.total_questions);
        assert_eq!(state.total_questions, 31);
        assert_eq!(state.lives, 3);
        assert!(!state.is_active);
    }
}

#[test]
fn three_misses_lose_the_session() {
    let mut session = started(3);
    answer_correctly(&mut session);
    for expected_lives in [2, 1] {
        answer_wrong(&mut session);
        assert_eq!(session.lives(), expected_lives);
        assert_eq!(session.status(), SessionStatus::Active);
    }
    answer_wrong(&mut session);
    assert_eq!(session.status(), SessionStatus::Ended);
    assert_eq!(session.outcome(), Some(SessionOutcome::Lost));
    assert!(session.current_challenge().is_none());
    assert_eq!(session.select_image(0), None);
}

#[test]
fn timeouts_count_as_misses() {
    let mut session = started(5);
    let before = session.snapshot().total_questions;
    let mut ticks = 0;
    while session.lives() == 3 {
        let tick = session.tick().unwrap();
        ticks += 1;
        if tick.timed_out {
            assert_eq!(tick.remaining, 0);
        }
    }
    assert_eq!(ticks, 10);
    assert_eq!(session.snapshot().total_questions, before + 1);
    assert_eq!(session.consecutive_correct(), 0);
    assert_eq!(session.clock().remaining(), 10);
}

#[test]
fn skipped_breed_is_not_asked_again() {
    let mut session = started(9);
    let inventory = *session.power_ups();
    assert!(inventory.skip > 0);
    let skipped = session
        .current_challenge()
        .unwrap()
        .correct_breed_name
        .clone();
    assert!(session.use_power_up(PowerUpKind::Skip));
    assert_eq!(session.power_ups().skip, inventory.skip - 1);
    assert!(session.used_breeds().contains(&skipped));
    for _ in 0..4 {
        assert_ne!(
            session.current_challenge().unwrap().correct_breed_name,
            skipped
        );
        answer_correctly(&mut session);
    }
}

#[test]
fn hint_names_the_current_breed_group() {
    let mut session = started(12);
    assert!(session.current_hint().is_none());
    assert!(session.use_power_up(PowerUpKind::Hint));
    assert!(session.current_hint().is_some_and(|hint| !hint.is_empty()));
    answer_correctly(&mut session);
    assert!(session.current_hint().is_none());
}

#[test]
fn paused_sessions_ignore_answers_and_ticks() {
    let mut session = started(21);
    assert!(session.pause());
    assert_eq!(session.select_image(0), None);
    assert_eq!(session.tick(), None);
    assert!(session.resume());
    assert!(session.tick().is_some());
}
