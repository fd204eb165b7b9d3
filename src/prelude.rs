//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use regsweep::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{RegError, Result};

// Store
pub use crate::store::memory::MemoryStore;
pub use crate::store::value::{RegValue, ValueData, ValueType};
pub use crate::store::{AccessMode, KeyAddress, RootKey, StoreBackend};

// Protection gate
pub use crate::protect::{is_critical_keyword, is_protected_address, is_protected_value_name};

// Scanner framework
pub use crate::scanner::{Issue, IssueCategory, Scanner, Severity};

// Backup journal
pub use crate::backup::{BackupHandle, BackupManager, RestoreReport};

// Cleaning
pub use crate::cleaner::protocol::{CleanMethod, DeletionOutcome, SkipReason};
pub use crate::cleaner::stats::CleaningStats;
pub use crate::cleaner::Engine;

// Escalation
pub use crate::escalate::{Escalator, PrivilegeCache};
