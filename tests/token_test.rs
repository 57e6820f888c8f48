/*!
 * Dependent Token Tests
 * Round-trip of the canonical text form and cross-monitor activity starts
 */

use activity_engine::monitor::tags;
use activity_engine::{
    Client, ClientError, DependentToken, GroupView, LogData, Monitor, TokenParseError,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Recorder {
    lines: Mutex<Vec<LogData>>,
    opens: Mutex<Vec<LogData>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(Vec::new()),
            opens: Mutex::new(Vec::new()),
        })
    }
}

impl Client for Recorder {
    fn on_unfiltered_log(&self, data: &LogData) -> Result<(), ClientError> {
        self.lines.lock().push(data.clone());
        Ok(())
    }

    fn on_open_group(&self, group: &GroupView<'_>) -> Result<(), ClientError> {
        self.opens.lock().push(group.data.clone());
        Ok(())
    }
}

#[test]
fn token_round_trips_for_all_message_topic_combinations() {
    let monitor = Monitor::new();
    let cases: Vec<(Option<&str>, Option<&str>)> = vec![
        (None, None),
        (Some("sync user data"), None),
        (None, Some("billing")),
        (Some("sync user data"), Some("billing")),
        // Whitespace normalizes to "no value".
        (Some("   "), Some("")),
        (Some("  trimmed  "), Some("  topic  ")),
    ];
    for (message, topic) in cases {
        let token = monitor.create_token(message, topic).unwrap();
        let parsed = DependentToken::parse(&token.to_string()).unwrap();
        assert_eq!(parsed, token);

        let expected_message = message.map(str::trim).filter(|m| !m.is_empty());
        let expected_topic = topic.map(str::trim).filter(|t| !t.is_empty());
        assert_eq!(parsed.message(), expected_message);
        assert_eq!(parsed.topic(), expected_topic);
        assert_eq!(parsed.originator_id(), monitor.id());
    }
}

#[test]
fn creation_log_line_parses_back_into_the_token() {
    let monitor = Monitor::new();
    let recorder = Recorder::new();
    monitor
        .register_client(Arc::clone(&recorder) as Arc<dyn Client>)
        .unwrap();

    let token = monitor
        .create_token(Some("rebuild index"), Some("maintenance"))
        .unwrap();

    let lines = recorder.lines.lock();
    let creation = lines
        .iter()
        .find(|line| line.tags.overlaps(&tags::token_creation()))
        .expect("creation line missing");
    let parsed = DependentToken::parse(&creation.text).unwrap();
    assert_eq!(parsed, token);
    assert_eq!(parsed.message(), Some("rebuild index"));
    assert_eq!(parsed.topic(), Some("maintenance"));

    let (message, topic) = DependentToken::try_parse_message_and_topic(&creation.text).unwrap();
    assert_eq!(message.as_deref(), Some("rebuild index"));
    assert_eq!(topic.as_deref(), Some("maintenance"));
}

#[test]
fn token_with_monitor_topic_marks_the_clause() {
    let monitor = Monitor::new();
    monitor.set_topic("replication").unwrap();
    let token = monitor
        .create_token_with_monitor_topic(Some("pull snapshot"))
        .unwrap();

    assert!(token.topic_is_originators());
    assert_eq!(token.topic(), Some("replication"));
    assert!(token.to_string().contains("With monitor's topic 'replication'."));
    assert_eq!(DependentToken::parse(&token.to_string()).unwrap(), token);
}

#[test]
fn monitor_topic_token_without_topic_degrades_cleanly() {
    let monitor = Monitor::new();
    let token = monitor.create_token_with_monitor_topic(None).unwrap();
    assert!(!token.topic_is_originators());
    assert!(token.topic().is_none());
    assert!(token.to_string().ends_with("(Without topic.)"));
}

#[test]
fn delayed_token_logs_only_at_launch() {
    let monitor = Monitor::new();
    let recorder = Recorder::new();
    monitor
        .register_client(Arc::clone(&recorder) as Arc<dyn Client>)
        .unwrap();

    let token = monitor
        .create_token_delayed(Some("deferred work"), None)
        .unwrap();
    assert!(recorder.lines.lock().is_empty());

    assert!(monitor.launch_token(&token).unwrap());
    let lines = recorder.lines.lock();
    assert_eq!(lines.len(), 1);
    assert_eq!(DependentToken::parse(&lines[0].text).unwrap(), token);
}

#[test]
fn start_dependent_activity_adopts_and_restores_topic() {
    let origin = Monitor::new();
    let token = origin
        .create_token(Some("export report"), Some("reporting"))
        .unwrap();

    let target = Monitor::new();
    let recorder = Recorder::new();
    target
        .register_client(Arc::clone(&recorder) as Arc<dyn Client>)
        .unwrap();
    target.set_topic("daily batch").unwrap();

    let point = target.start_dependent_activity(&token).unwrap();
    assert_eq!(target.topic().unwrap(), "reporting");

    // The start group title parses back into the originating token.
    let opens = recorder.opens.lock();
    let start = opens
        .iter()
        .find(|open| open.tags.overlaps(&tags::activity_start()))
        .expect("start group missing");
    assert_eq!(
        DependentToken::try_parse_start_message(&start.text).unwrap(),
        token
    );
    drop(opens);

    assert!(target.close_group(point).unwrap());
    assert_eq!(target.topic().unwrap(), "daily batch");
    let lines = recorder.lines.lock();
    assert!(lines
        .iter()
        .any(|line| line.text.contains("Restored topic 'daily batch'.")));
}

#[test]
fn start_without_topic_leaves_target_topic_alone() {
    let origin = Monitor::new();
    let token = origin.create_token(Some("fire and forget"), None).unwrap();

    let target = Monitor::new();
    target.set_topic("steady").unwrap();
    let point = target.start_dependent_activity(&token).unwrap();
    assert_eq!(target.topic().unwrap(), "steady");
    target.close_group(point).unwrap();
    assert_eq!(target.topic().unwrap(), "steady");
}

#[test]
fn parse_failures_are_typed() {
    assert!(matches!(
        DependentToken::parse(""),
        Err(TokenParseError::MissingSeparator)
    ));
    assert!(matches!(
        DependentToken::try_parse_start_message("Starting something else entirely"),
        Err(TokenParseError::NotStartMessage)
    ));
}

#[test]
fn serde_round_trip_preserves_every_field() {
    let monitor = Monitor::new();
    monitor.set_topic("jobs").unwrap();
    let token = monitor
        .create_token_with_monitor_topic(Some("drain queue"))
        .unwrap();

    let json = serde_json::to_string(&token).unwrap();
    let back: DependentToken = serde_json::from_str(&json).unwrap();
    assert_eq!(back, token);
}
