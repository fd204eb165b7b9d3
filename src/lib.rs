//! regsweep: registry hygiene engine.
//!
//! Scans the Windows registry for stale or orphaned entries and removes them
//! under a layered safety model:
//!
//! 1. **Scanners**: pluggable detectors for well-known rot (dead startup
//!    entries, orphaned uninstallers, broken COM servers, MRU clutter, ...)
//! 2. **Protection gate**: a fixed deny-list of system-critical subtrees that
//!    no cleaning mode may touch
//! 3. **Backup journal**: pre-mutation snapshots that can be replayed back
//! 4. **Escalating deletion**: normal delete, then ownership/ACL-escalated
//!    force delete, then deferred delete-on-reboot
//!
//! The engine is store-agnostic: all reads and mutations go through the
//! [`store::StoreBackend`] trait. On Windows the native registry backend is
//! available; everywhere else (including tests) the in-memory backend is.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use regsweep::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use regsweep::store::memory::MemoryStore;
//! use regsweep::cleaner::Engine;
//! ```

pub mod prelude;

pub mod backup;
pub mod cleaner;
pub mod core;
pub mod escalate;
pub mod logger;
pub mod protect;
pub mod scanner;
pub mod store;
