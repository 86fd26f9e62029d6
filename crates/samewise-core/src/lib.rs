//! Samewise — duplicate file and directory detection by sampled content
//! fingerprints.
//!
//! Large files are fingerprinted from three sampled windows instead of their
//! full contents; candidate duplicates are then re-verified through rounds
//! of growing sample sizes until exact equality is proven. Fingerprints are
//! cached in a persistent store keyed by `(segment_length, path)`, so re-runs
//! only touch entries that changed.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod hasher;
pub mod ignore;
pub mod progress;
pub mod scheduler;
pub mod storage;

pub use cache::HashCache;
pub use config::AppConfig;
pub use engine::{DupeEngine, DupeGroup, DupeMember, DupeReport, VERIFICATION_STEPS};
pub use error::Error;
pub use fingerprint::Fingerprint;
pub use progress::{HashCounters, ProgressReporter, SilentReporter};
pub use scheduler::HashScheduler;
pub use storage::{EntryMeta, HashRecord, HashStore, SqliteStore};
