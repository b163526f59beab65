//! Property-based tests for the severity filter

use eventlog::telemetry::{should_observe, EventLevel, LogLevel};
use proptest::prelude::*;

fn event_level() -> impl Strategy<Value = EventLevel> {
    prop_oneof![
        Just(EventLevel::Debug),
        Just(EventLevel::Normal),
        Just(EventLevel::Error),
        Just(EventLevel::Alarm),
    ]
}

fn log_level() -> impl Strategy<Value = LogLevel> {
    prop_oneof![
        Just(LogLevel::Debug),
        Just(LogLevel::Normal),
        Just(LogLevel::Error),
        Just(LogLevel::Alarm),
        Just(LogLevel::None),
    ]
}

proptest! {
    /// An event is observable iff its level is at least the threshold.
    #[test]
    fn test_filter_matches_ordering(level in event_level(), threshold in log_level()) {
        let expected = threshold != LogLevel::None && (level as u8) >= (threshold as u8);
        prop_assert_eq!(should_observe(level, threshold), expected);
    }

    /// Raising the threshold never makes more events observable.
    #[test]
    fn test_filter_is_monotonic(level in event_level(), a in log_level(), b in log_level()) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if should_observe(level, high) {
            prop_assert!(should_observe(level, low));
        }
    }
}
