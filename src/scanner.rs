//! Scanner module - orchestrates a throttled, recoverable directory walk
//!
//! A [`ScanSession`] classifies its root once, derives a throttle policy and
//! walks the tree in lexicographic order. Files are grouped into throttle
//! batches; within a batch, extractions run on the worker pool and are
//! collected strictly in traversal order. Progress, cancellation and the
//! network delay all happen at batch boundaries.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::classify::{is_remote_reference, LocationClass, PathClassifier};
use crate::config::ScanOptions;
use crate::error::{ErrorDescriptor, Result, ScanError};
use crate::extract::{extension_of, MetadataExtractor, MetadataSource, PendingExtraction, StdMetadataSource};
use crate::models::{FileRecord, ScanProgress, ScanResult, ScanState};
use crate::recovery::{Decision, ErrorRecoveryController, Outcome};
use crate::throttle::ThrottlePolicy;

/// Cooperative cancellation flag shared between a caller and a running scan
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the scan stops at its next check
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

const READY: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETED: u8 = 2;
const CANCELLED: u8 = 3;
const ABORTED: u8 = 4;
/// Rejected before traversal began; the session cannot be rerun
const SPENT: u8 = 5;

fn encode_state(state: ScanState) -> u8 {
    match state {
        ScanState::Running => RUNNING,
        ScanState::Completed => COMPLETED,
        ScanState::Cancelled => CANCELLED,
        ScanState::Aborted => ABORTED,
    }
}

/// State stored once a run returns
fn settled_state(result: &Result<ScanResult>) -> u8 {
    match result {
        Ok(result) => encode_state(result.state),
        Err(_) => SPENT,
    }
}

/// One scan of one root. A session runs at most once.
pub struct ScanSession {
    options: ScanOptions,
    classifier: PathClassifier,
    source: Arc<dyn MetadataSource>,
    location: OnceLock<LocationClass>,
    state: AtomicU8,
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ScanSession {
    /// Create a session using the system mount table and the real filesystem
    pub fn new(options: ScanOptions) -> Result<Self> {
        Self::with_collaborators(options, PathClassifier::system(), Arc::new(StdMetadataSource))
    }

    /// Create a session with an explicit classifier and metadata source.
    ///
    /// A relative root is made absolute against the current directory here,
    /// so every record and error path of the session is absolute.
    pub fn with_collaborators(
        mut options: ScanOptions,
        classifier: PathClassifier,
        source: Arc<dyn MetadataSource>,
    ) -> Result<Self> {
        if options.root.is_relative() && !is_remote_reference(&options.root) {
            options.root = std::path::absolute(&options.root).map_err(|e| {
                ScanError::InvalidOptions(format!("cannot resolve root {:?}: {}", options.root, e))
            })?;
        }
        options.validate()?;
        Ok(Self {
            options,
            classifier,
            source,
            location: OnceLock::new(),
            state: AtomicU8::new(READY),
        })
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Classification of the root, looked up once per session
    pub fn location(&self) -> LocationClass {
        *self.location.get_or_init(|| self.classifier.classify(&self.options.root))
    }

    /// Throttle policy the walk will use
    pub fn throttle(&self) -> ThrottlePolicy {
        ThrottlePolicy::for_class(self.location())
    }

    /// Current state, or `None` when the session never started a walk
    pub fn state(&self) -> Option<ScanState> {
        match self.state.load(Ordering::Acquire) {
            RUNNING => Some(ScanState::Running),
            COMPLETED => Some(ScanState::Completed),
            CANCELLED => Some(ScanState::Cancelled),
            ABORTED => Some(ScanState::Aborted),
            _ => None,
        }
    }

    /// Walk the tree, reporting progress at batch boundaries.
    ///
    /// Per-entry failures are collected in the result. Only a second run on
    /// the same session, or a failure to start the worker pool, is an `Err`.
    /// A pool failure rejects the run without reaching a terminal state;
    /// the session stays unusable and [`state`](Self::state) reports `None`.
    pub fn run<F>(&self, mut on_progress: F, cancel: &CancellationToken) -> Result<ScanResult>
    where
        F: FnMut(&ScanProgress),
    {
        match self
            .state
            .compare_exchange(READY, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(RUNNING) => return Err(ScanError::AlreadyRunning),
            Err(_) => return Err(ScanError::SessionSpent),
        }

        let result = self.walk(&mut on_progress, cancel);
        self.state.store(settled_state(&result), Ordering::Release);
        result
    }

    fn walk(&self, on_progress: &mut dyn FnMut(&ScanProgress), cancel: &CancellationToken) -> Result<ScanResult> {
        let start = Instant::now();
        let root = &self.options.root;
        let location = self.location();
        let throttle = ThrottlePolicy::for_class(location);
        let workers = self.options.effective_workers(location);
        log::info!(
            "Scanning {:?} ({}): batch size {}, delay {:?}, {} workers",
            root,
            location,
            throttle.batch_size,
            throttle.inter_op_delay,
            workers
        );

        let extractor = MetadataExtractor::new(Arc::clone(&self.source), workers)?;
        let mut walk = Walk::new(&self.options, &extractor, location, start);

        let state = walk.traverse(on_progress, cancel);
        if walk.processed != walk.reported {
            walk.emit_progress(on_progress);
        }

        match state {
            ScanState::Aborted => log::warn!(
                "Scan of {:?} aborted after {} consecutive errors ({} processed)",
                root,
                walk.controller.consecutive_errors(),
                walk.processed
            ),
            ScanState::Cancelled => log::info!("Scan of {:?} cancelled after {} entries", root, walk.processed),
            _ => log::info!(
                "Scan of {:?} completed: {} records, {} errors",
                root,
                walk.records.len(),
                walk.controller.error_count()
            ),
        }

        Ok(ScanResult {
            root: root.clone(),
            root_name: self.options.effective_root_name(),
            location,
            throttle,
            state,
            records: walk.records,
            errors: walk.controller.into_errors(),
            processed: walk.processed,
            dirs_visited: walk.dirs,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Scan a root with default collaborators and no progress reporting
pub fn scan(options: ScanOptions) -> Result<ScanResult> {
    ScanSession::new(options)?.run(|_| {}, &CancellationToken::new())
}

/// An entry queued for the current batch
enum Candidate {
    File(PathBuf),
    Failed(ErrorDescriptor),
}

enum InFlight {
    Pending(PendingExtraction),
    Failed(ErrorDescriptor),
}

/// Mutable state of one walk
struct Walk<'a> {
    options: &'a ScanOptions,
    extractor: &'a MetadataExtractor,
    location: LocationClass,
    throttle: ThrottlePolicy,
    start: Instant,
    controller: ErrorRecoveryController,
    records: Vec<FileRecord>,
    processed: u64,
    reported: u64,
    dirs: u64,
    current_dir: PathBuf,
}

impl<'a> Walk<'a> {
    fn new(options: &'a ScanOptions, extractor: &'a MetadataExtractor, location: LocationClass, start: Instant) -> Self {
        Self {
            options,
            extractor,
            location,
            throttle: ThrottlePolicy::for_class(location),
            start,
            controller: ErrorRecoveryController::new(),
            records: Vec::new(),
            processed: 0,
            reported: 0,
            dirs: 0,
            current_dir: options.root.clone(),
        }
    }

    fn traverse(&mut self, on_progress: &mut dyn FnMut(&ScanProgress), cancel: &CancellationToken) -> ScanState {
        if cancel.is_cancelled() {
            return ScanState::Cancelled;
        }

        let batch_size = self.throttle.batch_size.max(1);
        let mut batch: Vec<Candidate> = Vec::with_capacity(batch_size);
        let walker = WalkDir::new(&self.options.root)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        let depth = entry.depth();
                        if let Some(state) = self.enter_dir(entry.into_path(), depth, cancel) {
                            return state;
                        }
                        continue;
                    }
                    if !file_type.is_file() {
                        continue;
                    }
                    if !self.options.should_include_extension(&extension_of(entry.path())) {
                        continue;
                    }
                    batch.push(Candidate::File(entry.into_path()));
                }
                Err(err) => {
                    let descriptor = ErrorDescriptor::from_walk(&err);
                    log::debug!("Directory read failed: {}", descriptor);
                    batch.push(Candidate::Failed(descriptor));
                }
            }

            if batch.len() >= batch_size {
                if self.process_batch(std::mem::take(&mut batch)) == Decision::Abort {
                    return ScanState::Aborted;
                }
                if let Some(state) = self.end_batch(on_progress, cancel) {
                    return state;
                }
            }
        }

        if self.process_batch(batch) == Decision::Abort {
            return ScanState::Aborted;
        }
        ScanState::Completed
    }

    /// Count a directory about to be read, unless cancellation arrived first.
    ///
    /// walkdir reads a directory on the step after yielding it, so stopping
    /// here keeps a cancelled walk out of any further directory.
    fn enter_dir(&mut self, path: PathBuf, depth: usize, cancel: &CancellationToken) -> Option<ScanState> {
        if depth > 0 && cancel.is_cancelled() {
            return Some(ScanState::Cancelled);
        }
        self.dirs += 1;
        self.current_dir = path;
        None
    }

    /// Run a batch through the pool, keeping at most one extraction per worker in flight
    fn process_batch(&mut self, batch: Vec<Candidate>) -> Decision {
        let window = self.extractor.workers().max(1);
        let timeout = self.options.timeout();
        let mut queue = batch.into_iter();
        let mut in_flight: VecDeque<InFlight> = VecDeque::with_capacity(window);

        loop {
            while in_flight.len() < window {
                match queue.next() {
                    Some(Candidate::File(path)) => {
                        in_flight.push_back(InFlight::Pending(self.extractor.submit(path, self.options)))
                    }
                    Some(Candidate::Failed(err)) => in_flight.push_back(InFlight::Failed(err)),
                    None => break,
                }
            }

            let Some(head) = in_flight.pop_front() else {
                return Decision::Continue;
            };
            let outcome = match head {
                InFlight::Pending(pending) => self.extractor.wait(pending, self.options, timeout),
                InFlight::Failed(err) => Err(err),
            };

            self.processed += 1;
            let decision = match outcome {
                Ok(record) => {
                    self.records.push(record);
                    self.controller.record(Outcome::Success)
                }
                Err(err) => self.controller.record(Outcome::Failure(err)),
            };
            if decision == Decision::Abort {
                return Decision::Abort;
            }
        }
    }

    /// Report progress, honour cancellation and pause on network roots
    fn end_batch(
        &mut self,
        on_progress: &mut dyn FnMut(&ScanProgress),
        cancel: &CancellationToken,
    ) -> Option<ScanState> {
        self.emit_progress(on_progress);
        if cancel.is_cancelled() {
            return Some(ScanState::Cancelled);
        }
        if self.location.is_network() {
            pause(self.throttle.inter_op_delay);
        }
        None
    }

    fn emit_progress(&mut self, on_progress: &mut dyn FnMut(&ScanProgress)) {
        self.reported = self.processed;
        on_progress(&ScanProgress {
            processed: self.processed,
            errors: self.controller.error_count(),
            dirs: self.dirs,
            current_dir: self.current_dir.clone(),
            elapsed_ms: self.start.elapsed().as_millis() as u64,
        });
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let shared = token.clone();
        assert!(!token.is_cancelled());
        shared.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_empty_tree_completes() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(ScanOptions::new(dir.path())).unwrap();
        assert_eq!(result.state, ScanState::Completed);
        assert_eq!(result.processed, 0);
        assert_eq!(result.dirs_visited, 1);
        assert!(result.records.is_empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let session = ScanSession::new(ScanOptions::new(dir.path())).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = session.run(|_| {}, &token).unwrap();
        assert_eq!(result.state, ScanState::Cancelled);
        assert!(result.records.is_empty());
        assert_eq!(session.state(), Some(ScanState::Cancelled));
    }

    #[test]
    fn test_session_cannot_be_reused() {
        let dir = tempfile::tempdir().unwrap();
        let session = ScanSession::new(ScanOptions::new(dir.path())).unwrap();
        assert_eq!(session.state(), None);
        session.run(|_| {}, &CancellationToken::new()).unwrap();
        assert_eq!(session.state(), Some(ScanState::Completed));
        assert!(matches!(
            session.run(|_| {}, &CancellationToken::new()),
            Err(ScanError::SessionSpent)
        ));
    }

    #[test]
    fn test_cancel_between_batches_keeps_out_of_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.txt"), b"x").unwrap();

        let options = ScanOptions::new(dir.path());
        let extractor = MetadataExtractor::new(Arc::new(StdMetadataSource), 1).unwrap();
        let mut walk = Walk::new(&options, &extractor, LocationClass::Local, Instant::now());
        let cancel = CancellationToken::new();

        assert_eq!(walk.enter_dir(dir.path().to_path_buf(), 0, &cancel), None);
        let batch = vec![
            Candidate::File(dir.path().join("a.txt")),
            Candidate::File(dir.path().join("b.txt")),
        ];
        assert_eq!(walk.process_batch(batch), Decision::Continue);

        cancel.cancel();
        assert_eq!(
            walk.enter_dir(dir.path().join("sub"), 1, &cancel),
            Some(ScanState::Cancelled)
        );
        assert_eq!(walk.dirs, 1);
        assert_eq!(walk.current_dir, dir.path());
        let names: Vec<&str> = walk.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_cancelled_root_is_still_entered() {
        let dir = tempfile::tempdir().unwrap();
        let options = ScanOptions::new(dir.path());
        let extractor = MetadataExtractor::new(Arc::new(StdMetadataSource), 1).unwrap();
        let mut walk = Walk::new(&options, &extractor, LocationClass::NetworkMounted, Instant::now());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(walk.enter_dir(dir.path().to_path_buf(), 0, &cancel), None);
        assert_eq!(walk.dirs, 1);
        assert_eq!(walk.throttle.batch_size, 50);
    }

    #[test]
    fn test_rejected_run_is_not_terminal() {
        let rejected: Result<ScanResult> = Err(ScanError::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "thread limit reached",
        )));
        assert_eq!(settled_state(&rejected), SPENT);

        let dir = tempfile::tempdir().unwrap();
        let session = ScanSession::new(ScanOptions::new(dir.path())).unwrap();
        session.state.store(SPENT, Ordering::Release);
        assert_eq!(session.state(), None);
        assert!(matches!(
            session.run(|_| {}, &CancellationToken::new()),
            Err(ScanError::SessionSpent)
        ));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            ScanSession::new(ScanOptions::new(missing)),
            Err(ScanError::InvalidOptions(_))
        ));
    }
}
