/*!
 * Dependent Tokens
 * Serializable causality links between monitors with a frozen text form
 *
 * The canonical text is a persisted artifact consumed by log viewers:
 * punctuation and clause wording are frozen, and `parse` reproduces a token
 * bit-exactly from `to_string`.
 */

use crate::core::errors::TokenParseError;
use crate::core::types::{LogStamp, MonitorId, MonitorResult, SourceLocation};
use crate::data::LogData;
use crate::filter::LogLevel;
use crate::group::GroupPoint;
use crate::monitor::{tags, Monitor};
use serde::{Deserialize, Serialize};
use std::fmt;

const START_PREFIX: &str = "Starting dependent activity issued by ";
const WITHOUT_TOPIC: &str = " (Without topic.)";
const WITH_MONITOR_TOPIC: &str = " (With monitor's topic '";
const WITH_TOPIC: &str = " (With topic '";
const CLAUSE_TAIL: &str = "'.)";

/// Descriptor of a causal link back to an originating monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentToken {
    originator_id: MonitorId,
    creation_stamp: LogStamp,
    message: Option<String>,
    topic: Option<String>,
    topic_is_originators: bool,
}

impl DependentToken {
    #[inline]
    pub fn originator_id(&self) -> MonitorId {
        self.originator_id
    }

    #[inline]
    pub fn creation_stamp(&self) -> LogStamp {
        self.creation_stamp
    }

    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[inline]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Whether the topic was taken from the originator's own topic
    #[inline]
    pub fn topic_is_originators(&self) -> bool {
        self.topic_is_originators
    }

    /// Parse the canonical text form back into a token
    pub fn parse(text: &str) -> Result<Self, TokenParseError> {
        let at = text.find(" at ").ok_or(TokenParseError::MissingSeparator)?;
        let originator_id = MonitorId::parse_str(&text[..at])
            .map_err(|_| TokenParseError::InvalidOriginator(text[..at].into()))?;
        let rest = &text[at + 4..];

        let (head, topic, topic_is_originators) = split_topic_clause(rest)?;
        let (stamp_text, message) = match head.find(" - ") {
            Some(dash) => (&head[..dash], Some(head[dash + 3..].to_owned())),
            None => (head, None),
        };
        let creation_stamp = LogStamp::parse(stamp_text)?;

        Ok(Self {
            originator_id,
            creation_stamp,
            message,
            topic,
            topic_is_originators,
        })
    }

    /// Extract just the message and topic from a creation log line
    ///
    /// Log viewers that only need the human-facing parts can skip the
    /// originator/stamp fields.
    pub fn try_parse_message_and_topic(
        text: &str,
    ) -> Result<(Option<String>, Option<String>), TokenParseError> {
        let token = Self::parse(text)?;
        Ok((token.message, token.topic))
    }

    /// Title of the group opened by `start_dependent_activity`
    pub fn start_message(&self) -> String {
        format!("{START_PREFIX}{self}.")
    }

    /// Recover the token from a start-group title
    pub fn try_parse_start_message(text: &str) -> Result<Self, TokenParseError> {
        let body = text
            .strip_prefix(START_PREFIX)
            .and_then(|tail| tail.strip_suffix('.'))
            .ok_or(TokenParseError::NotStartMessage)?;
        Self::parse(body)
    }
}

impl fmt::Display for DependentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.originator_id, self.creation_stamp)?;
        if let Some(message) = &self.message {
            write!(f, " - {message}")?;
        }
        match &self.topic {
            None => f.write_str(WITHOUT_TOPIC),
            Some(topic) if self.topic_is_originators => {
                write!(f, "{WITH_MONITOR_TOPIC}{topic}{CLAUSE_TAIL}")
            }
            Some(topic) => write!(f, "{WITH_TOPIC}{topic}{CLAUSE_TAIL}"),
        }
    }
}

fn split_topic_clause(rest: &str) -> Result<(&str, Option<String>, bool), TokenParseError> {
    if let Some(head) = rest.strip_suffix(WITHOUT_TOPIC) {
        return Ok((head, None, false));
    }
    if !rest.ends_with(CLAUSE_TAIL) {
        return Err(TokenParseError::MalformedTopicClause);
    }
    let (clause_start, marker, is_monitors) =
        match (rest.rfind(WITH_MONITOR_TOPIC), rest.rfind(WITH_TOPIC)) {
            (Some(m), Some(p)) if m > p => (m, WITH_MONITOR_TOPIC, true),
            (_, Some(p)) => (p, WITH_TOPIC, false),
            (Some(m), None) => (m, WITH_MONITOR_TOPIC, true),
            (None, None) => return Err(TokenParseError::MalformedTopicClause),
        };
    let topic = &rest[clause_start + marker.len()..rest.len() - CLAUSE_TAIL.len()];
    Ok((&rest[..clause_start], Some(topic.to_owned()), is_monitors))
}

fn normalize(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// Where a token's topic comes from
enum TokenTopic {
    None,
    Explicit(String),
    Monitors,
}

impl Monitor {
    fn build_token(
        &self,
        message: Option<&str>,
        topic: TokenTopic,
        log_creation: bool,
    ) -> MonitorResult<DependentToken> {
        self.owned(|state| {
            // The creation stamp comes from the monitor's own generator, so
            // same-tick creations differ by the uniquifier, never by a retry.
            let stamp = LogStamp::next_unique(state.last_stamp);
            state.last_stamp = stamp;
            let (topic, topic_is_originators) = match topic {
                TokenTopic::None => (None, false),
                TokenTopic::Explicit(t) => (Some(t), false),
                TokenTopic::Monitors => {
                    let topic = normalize(Some(&state.topic));
                    let has_topic = topic.is_some();
                    (topic, has_topic)
                }
            };
            let token = DependentToken {
                originator_id: self.id(),
                creation_stamp: stamp,
                message: normalize(message),
                topic,
                topic_is_originators,
            };
            if log_creation {
                self.emit_line(
                    state,
                    LogData::new(LogLevel::Info, token.to_string())
                        .with_tags(tags::token_creation()),
                );
            }
            Ok(token)
        })
    }

    /// Create a token carrying an explicit topic, logging its creation
    pub fn create_token(
        &self,
        message: Option<&str>,
        topic: Option<&str>,
    ) -> MonitorResult<DependentToken> {
        let topic = match normalize(topic) {
            Some(t) => TokenTopic::Explicit(t),
            None => TokenTopic::None,
        };
        self.build_token(message, topic, true)
    }

    /// Create a token carrying this monitor's current topic
    pub fn create_token_with_monitor_topic(
        &self,
        message: Option<&str>,
    ) -> MonitorResult<DependentToken> {
        self.build_token(message, TokenTopic::Monitors, true)
    }

    /// Create a token without logging; `launch_token` emits it later
    pub fn create_token_delayed(
        &self,
        message: Option<&str>,
        topic: Option<&str>,
    ) -> MonitorResult<DependentToken> {
        let topic = match normalize(topic) {
            Some(t) => TokenTopic::Explicit(t),
            None => TokenTopic::None,
        };
        self.build_token(message, topic, false)
    }

    /// Emit the creation line of a delayed token
    pub fn launch_token(&self, token: &DependentToken) -> MonitorResult<bool> {
        self.owned(|state| {
            Ok(self.emit_line(
                state,
                LogData::new(LogLevel::Info, token.to_string()).with_tags(tags::token_creation()),
            ))
        })
    }

    /// Open the dependent activity described by `token` on this monitor
    ///
    /// If the token carries a topic, this monitor temporarily adopts it; the
    /// previous topic is restored (and the restoration logged) when the
    /// returned group closes. The group title parses back into the token.
    #[track_caller]
    pub fn start_dependent_activity(&self, token: &DependentToken) -> MonitorResult<GroupPoint> {
        let origin = SourceLocation::caller();
        let data = LogData::new(LogLevel::Info, token.start_message())
            .with_tags(tags::activity_start());
        let adopted = token.topic().map(str::to_owned);
        self.owned(move |state| {
            let saved_topic = match adopted {
                Some(topic) if topic != state.topic => {
                    let previous = state.topic.clone();
                    self.set_topic_in(state, topic, origin, false);
                    Some(previous)
                }
                _ => None,
            };
            let point = self.open_group_in(state, data, None);
            if let Some(frame) = state.arena.top_mut() {
                frame.saved_topic = saved_topic;
            }
            Ok(point)
        })
    }
}
