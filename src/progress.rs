//! Progress reporting module for scan operations
//!
//! This module provides the JSON-lines messages written to stderr so that an
//! external caller can follow a scan while it runs.

use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::classify::LocationClass;
use crate::error::{ErrorDescriptor, Result};
use crate::models::{ScanProgress, ScanResult};
use crate::sink::{Notifier, ScanSummary};
use crate::throttle::ThrottlePolicy;

/// Start message sent when scan begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Scan root
    pub root: String,
    /// Classification of the root
    pub location: LocationClass,
    /// Entries per throttle batch
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    pub delay_ms: u64,
}

impl StartMessage {
    pub fn new(seq: u64, ts: u64, root: String, location: LocationClass, throttle: &ThrottlePolicy) -> Self {
        Self {
            msg_type: "start",
            seq,
            ts,
            root,
            location,
            batch_size: throttle.batch_size,
            delay_ms: throttle.inter_op_delay.as_millis() as u64,
        }
    }
}

/// Progress message sent at batch boundaries
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Entries processed
    #[serde(rename = "n")]
    pub processed: u64,
    /// Errors recorded
    #[serde(rename = "e")]
    pub errors: u64,
    /// Directories entered
    #[serde(rename = "d")]
    pub dirs: u64,
    /// Directory most recently entered
    pub dir: String,
    /// Elapsed time in milliseconds
    pub ms: u64,
}

impl ProgressMessage {
    pub fn new(seq: u64, ts: u64, progress: &ScanProgress) -> Self {
        Self {
            msg_type: "p",
            seq,
            ts,
            processed: progress.processed,
            errors: progress.errors,
            dirs: progress.dirs,
            dir: progress.current_dir.to_string_lossy().to_string(),
            ms: progress.elapsed_ms,
        }
    }
}

/// Error message for one recorded failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    /// Message type identifier ("err" for error)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Error kind
    pub error_type: String,
    /// Operation that failed
    pub op: String,
    /// Error message description
    pub message: String,
    /// Path that caused the error (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorProgressMessage {
    pub fn new(seq: u64, ts: u64, error: &ErrorDescriptor) -> Self {
        let path = error.path.to_string_lossy();
        Self {
            msg_type: "err",
            seq,
            ts,
            error_type: error.kind.as_str().to_string(),
            op: error.operation.as_str().to_string(),
            message: error.message.clone(),
            path: (!path.is_empty()).then(|| path.to_string()),
        }
    }
}

/// Done message sent when scan reaches a terminal state
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Terminal state
    pub state: String,
    /// Number of records produced
    #[serde(rename = "rc")]
    pub records: usize,
    /// Number of errors encountered
    #[serde(rename = "ec")]
    pub errors: usize,
    /// Entries processed
    #[serde(rename = "n")]
    pub processed: u64,
    /// Directories entered
    #[serde(rename = "td")]
    pub dirs: u64,
    /// Total scan duration in milliseconds
    pub ms: u64,
}

impl DoneMessage {
    pub fn new(seq: u64, ts: u64, result: &ScanResult) -> Self {
        Self {
            msg_type: "done",
            seq,
            ts,
            state: result.state.as_str().to_string(),
            records: result.record_count(),
            errors: result.error_count(),
            processed: result.processed,
            dirs: result.dirs_visited,
            ms: result.duration_ms,
        }
    }
}

/// Notification message carrying the terminal summary
#[derive(Debug, Clone, Serialize)]
pub struct NotifyMessage<'a> {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    #[serde(flatten)]
    pub summary: &'a ScanSummary,
}

/// Progress reporter for outputting scan progress to stderr
///
/// Handles timing, sequence numbers, and formatting of the message types.
/// Progress messages are rate limited; all others are written immediately.
pub struct ProgressReporter {
    /// Whether progress reporting is enabled
    enabled: bool,
    /// Reporting interval in milliseconds
    interval_ms: u64,
    /// Last report time
    last_report: std::cell::Cell<Option<Instant>>,
    /// Sequence number for messages
    seq: AtomicU64,
    /// Start time of the reporter
    start_time: Instant,
}

impl ProgressReporter {
    /// Create a new ProgressReporter
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self {
            enabled,
            interval_ms,
            last_report: std::cell::Cell::new(None),
            seq: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Check if a progress message may be sent now
    pub fn should_report(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_report.get() {
            None => true,
            Some(last) => last.elapsed().as_millis() as u64 >= self.interval_ms,
        }
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get the current timestamp in milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Output a serializable message to stderr as JSON
    pub fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            eprintln!("{}", json);
            std::io::stderr().flush().ok();
        }
    }

    /// Report scan start
    pub fn report_start(&self, root: &std::path::Path, location: LocationClass, throttle: &ThrottlePolicy) {
        if !self.enabled {
            return;
        }
        let msg = StartMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            root.to_string_lossy().to_string(),
            location,
            throttle,
        );
        self.output_to_stderr(&msg);
    }

    /// Report scan progress.
    ///
    /// Returns true if a message was actually sent (respects interval timing).
    pub fn report_progress(&self, progress: &ScanProgress) -> bool {
        if !self.should_report() {
            return false;
        }
        let msg = ProgressMessage::new(self.next_seq(), self.current_timestamp(), progress);
        self.output_to_stderr(&msg);
        self.last_report.set(Some(Instant::now()));
        true
    }

    /// Report a recorded failure
    pub fn report_error(&self, error: &ErrorDescriptor) {
        if !self.enabled {
            return;
        }
        let msg = ErrorProgressMessage::new(self.next_seq(), self.current_timestamp(), error);
        self.output_to_stderr(&msg);
    }

    /// Report scan completion
    pub fn report_done(&self, result: &ScanResult) {
        if !self.enabled {
            return;
        }
        let msg = DoneMessage::new(self.next_seq(), self.current_timestamp(), result);
        self.output_to_stderr(&msg);
    }

    /// Check if the reporter is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Notifier for ProgressReporter {
    fn name(&self) -> &str {
        "stderr"
    }

    fn notify(&self, summary: &ScanSummary) -> Result<()> {
        if self.enabled {
            let msg = NotifyMessage {
                msg_type: "notify",
                seq: self.next_seq(),
                ts: self.current_timestamp(),
                summary,
            };
            self.output_to_stderr(&msg);
        }
        Ok(())
    }
}
