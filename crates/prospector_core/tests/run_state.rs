use prospector_core::{AlreadyInProgress, RunState};

#[test]
fn only_one_run_may_be_in_progress() {
    let mut state = RunState::new();
    assert!(state.begin().is_ok());
    assert_eq!(state.begin(), Err(AlreadyInProgress));

    state.finish();
    assert!(state.begin().is_ok());
}

#[test]
fn begin_clears_a_previous_stop_request() {
    let mut state = RunState::new();
    state.begin().unwrap();
    state.request_stop();
    assert!(state.stop_requested());

    state.finish();
    state.begin().unwrap();
    assert!(!state.stop_requested());
}

#[test]
fn session_ids_are_unique_and_tracked() {
    let mut state = RunState::new();
    state.begin().unwrap();

    let a = state.register_session();
    let b = state.register_session();
    assert_ne!(a, b);
    assert_eq!(state.active_session_count(), 2);

    let open: Vec<_> = state.active_sessions().collect();
    assert!(open.contains(&a) && open.contains(&b));
}

#[test]
fn deregister_is_idempotent() {
    let mut state = RunState::new();
    state.begin().unwrap();
    let id = state.register_session();

    assert!(state.deregister_session(id));
    assert!(!state.deregister_session(id));
    assert_eq!(state.active_session_count(), 0);
}

#[test]
fn finish_drops_any_leftover_sessions() {
    let mut state = RunState::new();
    state.begin().unwrap();
    state.register_session();
    state.register_session();

    state.finish();
    assert!(!state.in_progress());
    assert_eq!(state.active_session_count(), 0);
}
