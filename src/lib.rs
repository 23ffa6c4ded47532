//! Network-aware directory inventory with throttled traversal
//!
//! This library walks a directory tree, classifies the root as local or
//! network storage, paces the walk accordingly and extracts per-file metadata
//! with bounded waits, stopping early after a run of consecutive failures.

pub mod author;
pub mod cache;
pub mod classify;
pub mod config;
pub mod db;
pub mod duplicates;
pub mod error;
pub mod extract;
pub mod models;
pub mod pool;
pub mod progress;
pub mod recovery;
pub mod scanner;
pub mod sink;
pub mod throttle;

pub use cache::{CacheStats, ScanCache};
pub use classify::{LocationClass, MountEntry, MountTable, PathClassifier, SystemMountTable};
pub use config::{ScanOptions, ScanOptionsBuilder};
pub use db::ScanDatabase;
pub use duplicates::{duplicate_stats, find_duplicates, DuplicateGroup, DuplicateStats};
pub use error::{ErrorDescriptor, ErrorKind, Operation, ScanError};
pub use extract::{FileStat, MetadataExtractor, MetadataSource, ReadSeek, StdMetadataSource};
pub use models::{FileRecord, FileType, ScanProgress, ScanResult, ScanState};
pub use progress::{DoneMessage, ErrorProgressMessage, ProgressMessage, ProgressReporter, StartMessage};
pub use recovery::{Decision, ErrorRecoveryController, Outcome};
pub use scanner::{scan, CancellationToken, ScanSession};
pub use sink::{notify_all, LogNotifier, Notifier, ResultSink, ScanSummary};
pub use throttle::ThrottlePolicy;
