/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::data_structures::InlineString;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monitor access and configuration errors
///
/// Everything in this enum signals a bug in the emitting caller's own logic
/// and propagates; observer failures are contained separately (`ClientError`).
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum MonitorError {
    #[error("reentrant monitor access from thread token {thread}")]
    #[diagnostic(
        code(monitor::reentrancy),
        help("A callback logged back into its own monitor synchronously. Route diagnostics through the internal sink instead.")
    )]
    Reentrancy { thread: u64 },

    #[error("monitor owned by another thread (token {owner})")]
    #[diagnostic(
        code(monitor::concurrent_access),
        help("Monitors refuse silent serialization. Coordinate callers externally or use one monitor per thread.")
    )]
    ConcurrentAccess {
        owner: u64,
        /// Owner call stack, captured when the diagnostic tag is active
        owner_stack: Option<String>,
    },

    #[error("invariant violation: {0}")]
    #[diagnostic(
        code(monitor::invariant_violation),
        help("A caller-supplied configuration broke its own contract. This is a programming error, not a runtime condition.")
    )]
    InvariantViolation(InlineString),
}

/// Failure surfaced by an observer callback
///
/// Never propagated to the emitting caller: the failing client is quarantined
/// and the failure is logged through the internal monitor.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ClientError {
    #[error("client callback failed: {0}")]
    #[diagnostic(code(client::callback_failed))]
    Callback(InlineString),

    #[error("client reports dead")]
    #[diagnostic(code(client::dead))]
    Dead,

    #[error("client rejected owner change: {0}")]
    #[diagnostic(code(client::owner_change))]
    OwnerChange(InlineString),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Monitor(#[from] MonitorError),
}

impl ClientError {
    /// Shorthand for ad-hoc callback failures
    #[inline]
    pub fn callback(message: impl Into<InlineString>) -> Self {
        Self::Callback(message.into())
    }
}

/// Malformed canonical stamp text
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[error("invalid stamp text: {0}")]
#[diagnostic(code(token::invalid_stamp))]
pub struct StampParseError(pub InlineString);

/// Malformed dependent-token text
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TokenParseError {
    #[error("missing ' at ' separator")]
    #[diagnostic(code(token::missing_separator))]
    MissingSeparator,

    #[error("invalid originator id: {0}")]
    #[diagnostic(code(token::invalid_originator))]
    InvalidOriginator(InlineString),

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidStamp(#[from] StampParseError),

    #[error("missing or malformed topic clause")]
    #[diagnostic(code(token::malformed_topic_clause))]
    MalformedTopicClause,

    #[error("not a dependent activity start message")]
    #[diagnostic(code(token::not_start_message))]
    NotStartMessage,
}
