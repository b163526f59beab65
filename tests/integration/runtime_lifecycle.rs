//! Session, identity and timed event behavior through the async runtime.

use chrono::Duration;
use eventlog::config::LoggerConfig;
use eventlog::error::LoggerError;
use eventlog::telemetry::{Clock, EventLevel, LogLevel, SessionState};
use serde_json::json;

use crate::integration::test_utils::{spawn_logger, ScriptedUploader};

fn session_config() -> LoggerConfig {
    let mut config = LoggerConfig::default();
    config.start_session_event_name = Some("session_start".into());
    config.end_session_event_name = Some("session_end".into());
    config
}

#[tokio::test]
async fn test_identity_change_rotates_session() {
    let h = spawn_logger(session_config(), ScriptedUploader::new());

    h.handle
        .start_timed_event("tutorial", None, Default::default(), None, EventLevel::Normal);
    let before = h.handle.snapshot().await.unwrap();
    assert_eq!(before.session_state, SessionState::Active);
    assert_eq!(before.open_timed_events, 1);

    h.handle.set_user_id(Some("user-42".into()));
    let after = h.handle.snapshot().await.unwrap();
    assert_eq!(after.user_id.as_deref(), Some("user-42"));
    assert_eq!(after.session_state, SessionState::Active);
    assert_ne!(after.session_id, before.session_id);
    assert_eq!(after.open_timed_events, 0);

    let events = h.sink.events();
    let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["session_start", "tutorial", "session_end", "session_start"]
    );
    assert!(events[1].was_timed);
}

#[tokio::test]
async fn test_identity_change_without_session_stays_idle() {
    let h = spawn_logger(session_config(), ScriptedUploader::new());
    h.handle.set_user_id(Some("user-1".into()));
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.session_state, SessionState::NoSession);
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn test_ensure_session_exists_does_not_activate() {
    let h = spawn_logger(session_config(), ScriptedUploader::new());
    h.handle.ensure_session_exists();
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.session_state, SessionState::Created);
    assert!(snapshot.session_id.is_some());
    assert!(h.sink.events().is_empty());

    h.handle.ensure_session_is_active();
    h.handle.ensure_session_is_active();
    h.handle.flush().await.unwrap();
    assert_eq!(h.sink.names(), vec!["session_start"]);
}

#[tokio::test]
async fn test_timed_event_with_explicit_times_and_merge() {
    let h = spawn_logger(LoggerConfig::default(), ScriptedUploader::new());
    let t0 = h.clock.now();
    let start_params = json!({"a": 1, "b": 1}).as_object().cloned().unwrap();
    let end_params = json!({"b": 2}).as_object().cloned().unwrap();

    h.handle.start_timed_event(
        "download",
        Some(t0),
        start_params,
        Some("job".into()),
        EventLevel::Normal,
    );
    h.handle.end_timed_event(
        "download",
        Some(t0 + Duration::milliseconds(1500)),
        Some(end_params),
        true,
        Some("job".into()),
    );
    h.handle.flush().await.unwrap();

    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].duration, Some(1.5));
    assert_eq!(events[0].parameters["a"], json!(1));
    assert_eq!(events[0].parameters["b"], json!(2));
    assert_eq!(events[0].parameters["duration"], json!(1.5));
}

#[tokio::test]
async fn test_timed_event_below_threshold_is_not_dispatched() {
    let mut config = LoggerConfig::default();
    config.log_level = LogLevel::Error;
    let h = spawn_logger(config, ScriptedUploader::new());

    h.handle
        .start_timed_event("quiet", None, Default::default(), None, EventLevel::Normal);
    h.handle.end_timed_event("quiet", None, None, true, None);
    h.handle
        .start_timed_event("loud", None, Default::default(), None, EventLevel::Alarm);
    h.handle.end_timed_event("loud", None, None, true, None);
    h.handle.flush().await.unwrap();

    assert_eq!(h.sink.names(), vec!["loud"]);
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.open_timed_events, 0);
}

#[tokio::test]
async fn test_foreground_starts_new_session_after_background() {
    let h = spawn_logger(session_config(), ScriptedUploader::new());
    h.handle.log("a");
    let first = h.handle.snapshot().await.unwrap().session_id;

    h.handle.did_enter_background();
    let snapshot = h.handle.snapshot().await.unwrap();
    assert!(snapshot.backgrounded);
    assert_eq!(snapshot.session_state, SessionState::NoSession);

    h.handle.did_become_active();
    let snapshot = h.handle.snapshot().await.unwrap();
    assert!(!snapshot.backgrounded);
    assert_eq!(snapshot.session_state, SessionState::Active);
    assert_ne!(snapshot.session_id, first);
    assert_eq!(
        h.sink.names(),
        vec!["session_start", "a", "session_end", "session_start"]
    );
}

#[tokio::test]
async fn test_launch_hook_and_shutdown() {
    let h = spawn_logger(LoggerConfig::default(), ScriptedUploader::new());
    h.handle.app_did_finish_launching();
    h.handle.flush().await.unwrap();
    assert_eq!(h.sink.launches(), 1);

    h.handle.shutdown();
    h.task.await.unwrap();
    assert!(matches!(
        h.handle.flush().await,
        Err(LoggerError::RuntimeClosed)
    ));
    // Fire-and-forget calls after shutdown are silently dropped
    h.handle.log("late");
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn test_dropping_all_handles_stops_runtime() {
    let h = spawn_logger(LoggerConfig::default(), ScriptedUploader::new());
    let clone = h.handle.clone();
    drop(clone);
    drop(h.handle);
    h.task.await.unwrap();
}
