//! Collaborators that consume a finished scan
//!
//! A [`ResultSink`] persists the result and names where it went. A
//! [`Notifier`] is told how the scan ended; delivery problems are logged and
//! never change the result.

use serde::Serialize;

use crate::error::Result;
use crate::models::{ScanResult, ScanState};

/// Stores a finished scan and returns an identifier for the output
pub trait ResultSink {
    fn write(&mut self, result: &ScanResult) -> Result<String>;
}

/// Terminal summary handed to notifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScanSummary {
    Success { records: usize, output: String },
    Failure { message: String },
}

impl ScanSummary {
    /// Summarise a scan and the outcome of writing it.
    ///
    /// Cancelled scans are not reported.
    pub fn from_outcome(result: &ScanResult, output: Option<Result<String>>) -> Option<Self> {
        match result.state {
            ScanState::Cancelled | ScanState::Running => None,
            ScanState::Aborted => {
                let last = result
                    .errors
                    .last()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                Some(ScanSummary::Failure {
                    message: format!(
                        "scan of {:?} aborted after {} entries; last error: {}",
                        result.root, result.processed, last
                    ),
                })
            }
            ScanState::Completed if result.records.is_empty() => Some(ScanSummary::Failure {
                message: format!("no files found in {:?}", result.root),
            }),
            ScanState::Completed => match output {
                Some(Ok(output)) => Some(ScanSummary::Success {
                    records: result.records.len(),
                    output,
                }),
                Some(Err(e)) => Some(ScanSummary::Failure {
                    message: format!("failed to write results: {}", e),
                }),
                None => Some(ScanSummary::Success {
                    records: result.records.len(),
                    output: String::new(),
                }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanSummary::Success { .. })
    }
}

/// Delivers a terminal summary somewhere
pub trait Notifier {
    fn name(&self) -> &str;
    fn notify(&self, summary: &ScanSummary) -> Result<()>;
}

/// Writes summaries to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, summary: &ScanSummary) -> Result<()> {
        match summary {
            ScanSummary::Success { records, output } => {
                log::info!("Scan complete: {} records written to {}", records, output)
            }
            ScanSummary::Failure { message } => log::error!("Scan failed: {}", message),
        }
        Ok(())
    }
}

/// Send a summary to every notifier, logging and swallowing failures.
/// Returns how many notifiers delivered.
pub fn notify_all(notifiers: &[&dyn Notifier], summary: &ScanSummary) -> usize {
    notifiers
        .iter()
        .filter(|n| match n.notify(summary) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Notifier {} failed: {}", n.name(), e);
                false
            }
        })
        .count()
}
