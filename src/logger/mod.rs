//! Activity logging.
//!
//! One JSONL line per engine event. Logging is strictly best-effort: a full
//! disk or unwritable path degrades the writer, never the operation that
//! tried to log.

pub mod jsonl;

pub use jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, LogLevel};
