/*!
 * Filter Cascade Tests
 * Configured × client × tag-table resolution on a live monitor
 */

use activity_engine::filter::{
    clear_tag_filters, install_tag_filters, set_default_filter, TagClamper, TagFilterRule,
};
use activity_engine::{
    BoundClient, Client, ClientError, LevelFilter, LogData, LogFilter, LogLevel, Monitor,
    MonitorHandle, TagSet,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Recorder {
    lines: Mutex<Vec<LogData>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(Vec::new()),
        })
    }

    fn texts(&self) -> Vec<String> {
        self.lines.lock().iter().map(|d| d.text.clone()).collect()
    }
}

impl Client for Recorder {
    fn on_unfiltered_log(&self, data: &LogData) -> Result<(), ClientError> {
        self.lines.lock().push(data.clone());
        Ok(())
    }
}

/// Bound client with a mutable verbosity requirement
struct FilteredClient {
    filter: Mutex<LogFilter>,
    dead: AtomicBool,
    handle: Mutex<Option<MonitorHandle>>,
    lines: Mutex<Vec<String>>,
}

impl FilteredClient {
    fn new(filter: LogFilter) -> Arc<Self> {
        Arc::new(Self {
            filter: Mutex::new(filter),
            dead: AtomicBool::new(false),
            handle: Mutex::new(None),
            lines: Mutex::new(Vec::new()),
        })
    }

    /// Change the requirement the way a renderer would: fast path first
    fn set_minimal_filter(&self, filter: LogFilter) {
        let old = {
            let mut slot = self.filter.lock();
            let old = *slot;
            *slot = filter;
            old
        };
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.on_minimal_filter_changed(old, filter);
        }
    }
}

impl Client for FilteredClient {
    fn on_unfiltered_log(&self, data: &LogData) -> Result<(), ClientError> {
        self.lines.lock().push(data.text.clone());
        Ok(())
    }

    fn bound(&self) -> Option<&dyn BoundClient> {
        Some(self)
    }
}

impl BoundClient for FilteredClient {
    fn minimal_filter(&self) -> LogFilter {
        *self.filter.lock()
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Relaxed)
    }

    fn set_owner(&self, owner: Option<MonitorHandle>, _force: bool) -> Result<(), ClientError> {
        *self.handle.lock() = owner;
        Ok(())
    }
}

#[test]
fn configured_filter_gates_lines() {
    let monitor = Monitor::new();
    let recorder = Recorder::new();
    monitor
        .register_client(Arc::clone(&recorder) as Arc<dyn Client>)
        .unwrap();
    monitor.set_configured_filter(LogFilter::TERSE).unwrap();

    assert!(!monitor.info("dropped").unwrap());
    assert!(monitor.warn("kept").unwrap());
    assert_eq!(recorder.texts(), vec!["kept"]);
}

#[test]
fn bound_client_requirement_wins_when_more_verbose() {
    let monitor = Monitor::new();
    let client = FilteredClient::new(LogFilter::DEBUG);
    monitor
        .register_client(Arc::clone(&client) as Arc<dyn Client>)
        .unwrap();
    monitor.set_configured_filter(LogFilter::RELEASE).unwrap();

    // combine(Release, Debug) = Debug: the client still sees everything.
    assert_eq!(monitor.actual_filter().unwrap(), LogFilter::DEBUG);
    assert!(monitor.debug("verbose line").unwrap());
    assert!(client.lines.lock().iter().any(|l| l == "verbose line"));
}

#[test]
fn signaled_filter_change_is_picked_up_lazily() {
    let monitor = Monitor::new();
    let client = FilteredClient::new(LogFilter::UNDEFINED);
    monitor
        .register_client(Arc::clone(&client) as Arc<dyn Client>)
        .unwrap();
    monitor.set_configured_filter(LogFilter::RELEASE).unwrap();
    assert!(!monitor.info("before change").unwrap());

    // Mutate the requirement without the fast path, then signal from a
    // foreign thread: the next emission rescans.
    *client.filter.lock() = LogFilter::DEBUG;
    let handle = monitor.handle();
    std::thread::spawn(move || handle.signal_change())
        .join()
        .unwrap();

    assert!(monitor.info("after change").unwrap());
    assert_eq!(monitor.actual_filter().unwrap(), LogFilter::DEBUG);
}

#[test]
fn direct_filter_property_change_uses_fast_path() {
    let monitor = Monitor::new();
    let client = FilteredClient::new(LogFilter::RELEASE);
    monitor
        .register_client(Arc::clone(&client) as Arc<dyn Client>)
        .unwrap();
    // Prime the aggregate.
    assert_eq!(monitor.actual_filter().unwrap(), LogFilter::RELEASE);

    client.set_minimal_filter(LogFilter::VERBOSE);
    assert_eq!(monitor.actual_filter().unwrap(), LogFilter::VERBOSE);
}

#[test]
fn dead_bound_client_is_dropped_from_cascade() {
    let monitor = Monitor::new();
    let client = FilteredClient::new(LogFilter::DEBUG);
    monitor
        .register_client(Arc::clone(&client) as Arc<dyn Client>)
        .unwrap();
    assert_eq!(monitor.actual_filter().unwrap(), LogFilter::DEBUG);

    client.dead.store(true, Ordering::Relaxed);
    monitor.handle().signal_change();
    // The rescan removes the dead client and forgets its requirement.
    assert_eq!(monitor.actual_filter().unwrap(), LogFilter::UNDEFINED);
    assert_eq!(monitor.client_count().unwrap(), 0);
}

#[test]
fn off_suppresses_everything_except_trusted_relays() {
    let monitor = Monitor::new();
    let recorder = Recorder::new();
    monitor
        .register_client(Arc::clone(&recorder) as Arc<dyn Client>)
        .unwrap();
    monitor.set_configured_filter(LogFilter::OFF).unwrap();

    assert!(!monitor.fatal("still dropped").unwrap());

    // A pre-filtered payload from a trusted relay bypasses the cascade.
    let relayed = LogData::new(LogLevel::Info, "relayed").filtered();
    assert!(monitor.log(relayed).unwrap());
    assert_eq!(recorder.texts(), vec!["relayed"]);
}

#[test]
#[serial(tag_filter_table)]
fn hard_tag_rule_overrides_monitor_cascade() {
    clear_tag_filters();
    set_default_filter(LogFilter::TRACE);
    install_tag_filters(vec![
        TagFilterRule::new(TagSet::parse("t1"), TagClamper::hard(LogFilter::DEBUG)),
        TagFilterRule::new(
            TagSet::parse("t2"),
            TagClamper::soft(LogFilter::new(LevelFilter::Trace, LevelFilter::Trace)),
        ),
    ]);

    let monitor = Monitor::new();
    let recorder = Recorder::new();
    monitor
        .register_client(Arc::clone(&recorder) as Arc<dyn Client>)
        .unwrap();
    monitor.set_configured_filter(LogFilter::RELEASE).unwrap();

    // First matching rule (t1, hard Debug) wins over both the cascade and
    // the later t2 rule.
    let line = LogData::new(LogLevel::Debug, "tagged").with_tags(TagSet::parse("t1|t2"));
    assert!(monitor.log(line).unwrap());

    // Untagged lines still obey the Release cascade.
    assert!(!monitor.info("untagged").unwrap());

    clear_tag_filters();
    set_default_filter(LogFilter::TRACE);
    assert_eq!(recorder.texts(), vec!["tagged"]);
}

#[test]
#[serial(tag_filter_table)]
fn auto_tags_participate_in_tag_rules() {
    clear_tag_filters();
    set_default_filter(LogFilter::TRACE);
    install_tag_filters(vec![TagFilterRule::new(
        TagSet::parse("noisy"),
        TagClamper::hard(LogFilter::new(LevelFilter::Error, LevelFilter::Error)),
    )]);

    let monitor = Monitor::new();
    let recorder = Recorder::new();
    monitor
        .register_client(Arc::clone(&recorder) as Arc<dyn Client>)
        .unwrap();
    monitor.set_auto_tags(TagSet::parse("noisy")).unwrap();

    assert!(!monitor.info("clamped by auto tag").unwrap());
    assert!(monitor.error("still loud").unwrap());

    clear_tag_filters();
    set_default_filter(LogFilter::TRACE);
    assert_eq!(recorder.texts(), vec!["still loud"]);
}

fn any_level_filter() -> impl Strategy<Value = LevelFilter> {
    prop::sample::select(vec![
        LevelFilter::Undefined,
        LevelFilter::Debug,
        LevelFilter::Trace,
        LevelFilter::Info,
        LevelFilter::Warn,
        LevelFilter::Error,
        LevelFilter::Fatal,
        LevelFilter::Off,
    ])
}

proptest! {
    /// Combine never yields a stricter threshold than either defined input,
    /// and Undefined never wins.
    #[test]
    fn prop_combine_monotonic(a in any_level_filter(), b in any_level_filter()) {
        let combined = LevelFilter::combine(a, b);
        if !a.is_undefined() {
            prop_assert!(combined.as_u8() <= a.as_u8());
        }
        if !b.is_undefined() {
            prop_assert!(combined.as_u8() <= b.as_u8());
        }
        prop_assert_eq!(LevelFilter::combine(LevelFilter::Undefined, a), a);
        prop_assert_eq!(LevelFilter::combine(a, LevelFilter::Undefined), a);
        // Commutative and idempotent.
        prop_assert_eq!(LevelFilter::combine(b, a), combined);
        prop_assert_eq!(LevelFilter::combine(a, a), a);
    }

    /// Pair combine applies the same algebra per dimension.
    #[test]
    fn prop_pair_combine(
        al in any_level_filter(), ag in any_level_filter(),
        bl in any_level_filter(), bg in any_level_filter(),
    ) {
        let a = LogFilter::new(al, ag);
        let b = LogFilter::new(bl, bg);
        let combined = LogFilter::combine(a, b);
        prop_assert_eq!(combined.line, LevelFilter::combine(al, bl));
        prop_assert_eq!(combined.group, LevelFilter::combine(ag, bg));
    }
}
