//! State machine properties of a single creative session

use creative_hub_core::models::{StageId, StageOutput};
use creative_hub_core::workflow::simulated::build_output;
use creative_hub_core::workflow::{
    StageDataStore, StageStatus, TransitionKind, UpstreamData, WorkflowSession,
};
use creative_hub_core::ErrorKind;
use uuid::Uuid;

const SEED: &str = "一个少年在森林中发现了一只会说话的狐狸";

fn started() -> WorkflowSession {
    let mut session = WorkflowSession::new(Uuid::new_v4());
    session.start(SEED).unwrap();
    session
}

fn output(stage: StageId) -> StageOutput {
    build_output(stage, &UpstreamData::new(SEED))
}

/// Record outputs for every stage up to and including `last`, moving along
fn walk_to(session: &mut WorkflowSession, last: StageId) {
    for stage in StageId::ALL {
        session.record_stage_output(stage, output(stage)).unwrap();
        if stage == last {
            break;
        }
        assert!(session.advance());
    }
}

#[test]
fn test_advance_reaches_last_stage_then_stops() {
    let mut session = started();
    for _ in 0..StageId::COUNT - 1 {
        assert!(session.advance());
    }
    assert_eq!(session.current_stage(), StageId::Edit);

    assert!(!session.advance());
    assert_eq!(session.current_stage(), StageId::Edit);
}

#[test]
fn test_retreat_at_first_stage_is_noop() {
    let mut session = started();
    assert!(!session.retreat());
    assert_eq!(session.current_stage(), StageId::Story);

    session.advance();
    assert!(session.retreat());
    assert_eq!(session.current_stage(), StageId::Story);
}

#[test]
fn test_jump_only_backwards_or_in_place() {
    let mut session = started();
    walk_to(&mut session, StageId::Character);

    assert!(!session.jump_to(StageId::Edit));
    assert_eq!(session.current_stage(), StageId::Character);

    assert!(session.jump_to(StageId::Character));
    assert!(session.jump_to(StageId::Script));
    assert_eq!(session.current_stage(), StageId::Script);

    // outputs survive navigation
    assert!(session.output(StageId::Config).is_some());
}

#[test]
fn test_last_stage_needs_complete() {
    let mut session = started();
    walk_to(&mut session, StageId::Edit);

    assert!(!session.advance());
    let err = session.confirm_and_advance().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!session.is_completed());

    session.complete().unwrap();
    assert!(session.is_completed());
}

#[test]
fn test_complete_away_from_last_stage_is_refused() {
    let mut session = started();
    walk_to(&mut session, StageId::Storyboard);

    let err = session.complete().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    session.advance();
    let err = session.complete().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_reset_clears_everything() {
    let mut session = started();
    walk_to(&mut session, StageId::Config);

    session.reset();
    assert_eq!(session.current_stage(), StageId::Story);
    assert!(session.outputs().is_empty());
    assert_eq!(session.seed(), None);
    assert_eq!(session.workflow_id(), None);
    assert_eq!(session.status(StageId::Story), StageStatus::Pending);
}

#[test]
fn test_recording_same_output_twice_is_idempotent() {
    let mut session = started();
    session
        .record_stage_output(StageId::Story, output(StageId::Story))
        .unwrap();
    let once = session.outputs().clone();

    session
        .record_stage_output(StageId::Story, output(StageId::Story))
        .unwrap();
    assert_eq!(session.outputs(), &once);
    assert_eq!(session.outputs().len(), 1);
}

#[test]
fn test_output_must_match_its_stage() {
    let mut session = started();
    let err = session
        .record_stage_output(StageId::Script, output(StageId::Story))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(session.outputs().is_empty());
}

#[test]
fn test_modify_drops_later_outputs() {
    let mut session = started();
    walk_to(&mut session, StageId::Storyboard);
    session.jump_to(StageId::Script);

    session.modify("更温馨一些").unwrap();
    assert!(session.output(StageId::Story).is_some());
    assert!(session.output(StageId::Script).is_some());
    for stage in [
        StageId::Config,
        StageId::Character,
        StageId::Storyboard,
        StageId::Edit,
    ] {
        assert!(session.output(stage).is_none(), "{} kept", stage);
    }
    assert_eq!(session.snapshot().modification.as_deref(), Some("更温馨一些"));
}

#[test]
fn test_modify_requires_note_and_seed() {
    let mut fresh = WorkflowSession::new(Uuid::new_v4());
    assert!(fresh.modify("更温馨一些").is_err());

    let mut session = started();
    assert_eq!(
        session.modify("  ").unwrap_err().kind(),
        ErrorKind::Validation
    );
}

#[test]
fn test_navigation_supersedes_in_flight_call() {
    let mut session = started();
    session
        .record_stage_output(StageId::Story, output(StageId::Story))
        .unwrap();
    session.advance();

    let (ticket, token, upstream) = session.begin_invocation().unwrap();
    assert_eq!(ticket.stage, StageId::Script);
    assert!(upstream.output(StageId::Story).is_some());

    session.retreat();
    assert!(token.is_cancelled());

    let late = build_output(StageId::Script, &upstream);
    let err = session
        .finish_invocation(ticket, &token, Ok(creative_hub_core::providers::Sourced::Live(late)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Stale);
    assert!(session.output(StageId::Script).is_none());
    assert!(!session.is_loading());
}

#[test]
fn test_history_records_transitions() {
    let mut session = started();
    session.advance();
    session.advance();
    session.jump_to(StageId::Story);
    session.reset();

    let kinds: Vec<TransitionKind> = session.history().iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TransitionKind::Start,
            TransitionKind::Advance,
            TransitionKind::Advance,
            TransitionKind::Jump,
            TransitionKind::Reset,
        ]
    );
    let jump = &session.history()[3];
    assert_eq!((jump.from, jump.to), (StageId::Config, StageId::Story));
}

#[test]
fn test_store_map_round_trip() {
    let mut store = StageDataStore::new();
    for stage in [StageId::Story, StageId::Script, StageId::Config] {
        store.set(stage, output(stage)).unwrap();
    }

    let restored = StageDataStore::from_map(store.to_map());
    assert_eq!(restored, store);

    let json = serde_json::to_string(&store.to_map()).unwrap();
    let parsed: std::collections::BTreeMap<StageId, StageOutput> =
        serde_json::from_str(&json).unwrap();
    assert_eq!(StageDataStore::from_map(parsed), store);
}
