/*!
 * Activity Engine Library
 * Hierarchical activity logging: monitors, groups, observers, cascading filters
 */

pub mod core;
pub mod data;
pub mod filter;
pub mod group;
pub mod monitor;
pub mod output;
pub mod tag;

// Re-exports
pub use crate::core::data_structures::InlineString;
pub use crate::core::errors::{ClientError, MonitorError, TokenParseError};
pub use crate::core::types::{LogStamp, MonitorId, MonitorResult, SourceLocation};
pub use data::{ErrorInfo, LogData, LogDataPool, PoolConfig, PooledLogData, NO_LOG_TEXT};
pub use filter::{LevelFilter, LogFilter, LogLevel, TagClamper, TagFilterRule};
pub use group::{Conclusion, ConclusionFn, GroupPoint};
pub use monitor::{DependentToken, InternalSink, Monitor};
pub use output::{BoundClient, ChangeSignal, Client, GroupView, MonitorHandle};
pub use tag::TagSet;
