/*!
 * Static Log Channel
 * Process-wide channel for the engine's own diagnostics
 *
 * Pool growth, client quarantine, and replay anomalies are reported here
 * rather than through any single monitor: the channel works from any thread,
 * with no monitor ownership involved. Every event is mirrored onto `tracing`
 * and fanned out to registered handlers.
 */

use crate::core::sync::SnapshotCell;
use crate::core::types::SourceLocation;
use crate::filter::LogLevel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// One engine diagnostic
#[derive(Debug, Clone)]
pub struct StaticLogEvent {
    pub level: LogLevel,
    pub text: String,
    pub origin: SourceLocation,
}

/// Handler invoked for every static log event
pub type StaticLogHandler = Arc<dyn Fn(&StaticLogEvent) + Send + Sync>;

/// Token returned by [`register`], consumed by [`unregister`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static SnapshotCell<Vec<(u64, StaticLogHandler)>> {
    static REGISTRY: OnceLock<SnapshotCell<Vec<(u64, StaticLogHandler)>>> = OnceLock::new();
    REGISTRY.get_or_init(|| SnapshotCell::new(Vec::new()))
}

/// Register a handler for engine diagnostics
pub fn register(handler: StaticLogHandler) -> HandlerId {
    let id = NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed);
    registry().update(|handlers| {
        let mut next = handlers.clone();
        next.push((id, Arc::clone(&handler)));
        next
    });
    HandlerId(id)
}

/// Remove a previously registered handler
pub fn unregister(id: HandlerId) {
    registry().update(|handlers| {
        handlers
            .iter()
            .filter(|(handler_id, _)| *handler_id != id.0)
            .cloned()
            .collect()
    });
}

/// Emit a diagnostic from the caller's position
#[track_caller]
pub fn log(level: LogLevel, text: impl Into<String>) {
    emit(StaticLogEvent {
        level,
        text: text.into(),
        origin: SourceLocation::caller(),
    });
}

/// Emit a prepared diagnostic
pub fn emit(event: StaticLogEvent) {
    match event.level {
        LogLevel::Debug => tracing::debug!(target: "activity_engine", origin = %event.origin, "{}", event.text),
        LogLevel::Trace => tracing::trace!(target: "activity_engine", origin = %event.origin, "{}", event.text),
        LogLevel::Info => tracing::info!(target: "activity_engine", origin = %event.origin, "{}", event.text),
        LogLevel::Warn => tracing::warn!(target: "activity_engine", origin = %event.origin, "{}", event.text),
        LogLevel::Error | LogLevel::Fatal => {
            tracing::error!(target: "activity_engine", origin = %event.origin, "{}", event.text)
        }
    }
    for (_, handler) in registry().get().iter() {
        handler(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_handler_receives_events_until_unregistered() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = register(Arc::new(move |event| {
            sink.lock().push(event.text.clone());
        }));

        log(LogLevel::Warn, "pool saturated");
        assert!(seen.lock().iter().any(|text| text == "pool saturated"));

        unregister(id);
        let before = seen.lock().len();
        log(LogLevel::Warn, "after removal");
        assert_eq!(seen.lock().len(), before);
    }

    #[test]
    fn test_event_carries_origin() {
        let seen: Arc<Mutex<Option<SourceLocation>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let id = register(Arc::new(move |event| {
            *sink.lock() = Some(event.origin);
        }));

        log(LogLevel::Info, "origin check");
        let origin = seen.lock().take();
        unregister(id);

        assert!(origin.is_some_and(|o| o.file.ends_with("static_log.rs")));
    }
}
