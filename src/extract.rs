//! Per-file metadata extraction under a timeout budget
//!
//! Each file is handed to a pool worker which stats it and, for office
//! documents, reads the author. The submitting thread waits for every step
//! with its own deadline, so a hung filesystem call turns into a `Timeout`
//! error instead of a stalled scan.

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::fs::Metadata;
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::author::{is_office_document, read_author};
use crate::config::ScanOptions;
use crate::error::{ErrorDescriptor, ErrorKind, Operation};
use crate::models::{FileRecord, FileType};
use crate::pool::WorkerPool;

/// Readable, seekable handle returned by a [`MetadataSource`]
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Size and timestamps of a file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    /// Birth time, when the platform records one
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
    /// Inode status change time (unix only)
    pub changed: Option<SystemTime>,
}

impl FileStat {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            created: metadata.created().ok(),
            modified: metadata.modified().ok(),
            accessed: metadata.accessed().ok(),
            changed: status_change_time(metadata),
        }
    }

    /// True creation time, or the earliest timestamp available as a proxy
    pub fn creation_time(&self) -> Option<SystemTime> {
        self.created.or_else(|| {
            [self.modified, self.accessed, self.changed]
                .into_iter()
                .flatten()
                .min()
        })
    }
}

#[cfg(unix)]
fn status_change_time(metadata: &Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    let secs = u64::try_from(metadata.ctime()).ok()?;
    let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
    Some(SystemTime::UNIX_EPOCH + Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn status_change_time(_metadata: &Metadata) -> Option<SystemTime> {
    None
}

/// Filesystem access used by the extractor
pub trait MetadataSource: Send + Sync + 'static {
    fn stat(&self, path: &Path) -> io::Result<FileStat>;
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;
}

/// Reads the real filesystem through `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct StdMetadataSource;

impl MetadataSource for StdMetadataSource {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        std::fs::metadata(path).map(|m| FileStat::from_metadata(&m))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        let file = std::fs::File::open(path)?;
        Ok(Box::new(io::BufReader::new(file)))
    }
}

/// An extraction handed to a worker but not yet collected
#[derive(Debug)]
pub struct PendingExtraction {
    path: PathBuf,
    submitted: Instant,
    stat_rx: Receiver<(io::Result<FileStat>, Instant)>,
    author_rx: Option<Receiver<Result<Option<String>, ErrorDescriptor>>>,
}

/// Produces [`FileRecord`]s on a bounded worker pool
pub struct MetadataExtractor {
    source: Arc<dyn MetadataSource>,
    pool: WorkerPool,
}

impl std::fmt::Debug for MetadataExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataExtractor")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl MetadataExtractor {
    pub fn new(source: Arc<dyn MetadataSource>, workers: usize) -> io::Result<Self> {
        Ok(Self {
            source,
            pool: WorkerPool::new("metadata", workers)?,
        })
    }

    /// Number of extractions that may run at once
    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Extract one file synchronously
    pub fn extract(
        &self,
        path: &Path,
        options: &ScanOptions,
        timeout: Duration,
    ) -> Result<FileRecord, ErrorDescriptor> {
        let pending = self.submit(path.to_path_buf(), options);
        self.wait(pending, options, timeout)
    }

    /// Start extracting a file on the pool.
    ///
    /// The stat deadline runs from submission, so callers must not have more
    /// extractions outstanding than [`workers`](Self::workers).
    pub fn submit(&self, path: PathBuf, options: &ScanOptions) -> PendingExtraction {
        let wants_author = options.include_author && is_office_document(&extension_of(&path));
        let (stat_tx, stat_rx) = bounded(1);
        let (author_tx, author_rx) = if wants_author {
            let (tx, rx) = bounded(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let submitted = Instant::now();
        let source = Arc::clone(&self.source);
        let job_path = path.clone();
        self.pool.execute(move || {
            let stat = source.stat(&job_path);
            let stat_ok = stat.is_ok();
            let _ = stat_tx.send((stat, Instant::now()));
            if let (true, Some(tx)) = (stat_ok, author_tx) {
                let _ = tx.send(lookup_author(source.as_ref(), &job_path));
            }
        });

        PendingExtraction {
            path,
            submitted,
            stat_rx,
            author_rx,
        }
    }

    /// Collect a pending extraction, giving each step `timeout` to finish
    pub fn wait(
        &self,
        pending: PendingExtraction,
        options: &ScanOptions,
        timeout: Duration,
    ) -> Result<FileRecord, ErrorDescriptor> {
        let PendingExtraction {
            path,
            submitted,
            stat_rx,
            author_rx,
        } = pending;

        let (stat, stat_done) = match stat_rx.recv_deadline(submitted + timeout) {
            Ok((Ok(stat), at)) => (stat, at),
            Ok((Err(e), _)) => return Err(ErrorDescriptor::from_io(&path, Operation::Stat, &e)),
            Err(e) => return Err(self.abandon(&path, Operation::Stat, e, timeout)),
        };

        let author = match author_rx {
            Some(rx) => match rx.recv_deadline(stat_done + timeout) {
                Ok(author) => author?,
                Err(e) => return Err(self.abandon(&path, Operation::AuthorRead, e, timeout)),
            },
            None => None,
        };

        Ok(build_record(path, &stat, author, options))
    }

    /// Write off the worker still holding `path` and report why
    fn abandon(
        &self,
        path: &Path,
        operation: Operation,
        err: RecvTimeoutError,
        timeout: Duration,
    ) -> ErrorDescriptor {
        self.pool.replace_worker();
        match err {
            RecvTimeoutError::Timeout => {
                log::warn!("{} of {:?} timed out after {:?}", operation, path, timeout);
                ErrorDescriptor::timeout(path, operation, timeout)
            }
            RecvTimeoutError::Disconnected => ErrorDescriptor::new(
                path,
                operation,
                ErrorKind::IoFailure,
                "metadata worker exited unexpectedly",
            ),
        }
    }
}

fn lookup_author(source: &dyn MetadataSource, path: &Path) -> Result<Option<String>, ErrorDescriptor> {
    let reader = source
        .open(path)
        .map_err(|e| ErrorDescriptor::from_io(path, Operation::AuthorRead, &e))?;
    read_author(reader).map_err(|e| {
        ErrorDescriptor::new(
            path,
            Operation::AuthorRead,
            ErrorKind::UnsupportedMetadata,
            format!("cannot open document container: {}", e),
        )
    })
}

fn build_record(
    path: PathBuf,
    stat: &FileStat,
    author: Option<String>,
    options: &ScanOptions,
) -> FileRecord {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension_of(&path);
    let folder = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let folders = folder_columns(&options.root, &folder, options.folder_columns, options.title_case);

    let (created, modified) = if options.include_dates {
        (
            stat.creation_time().map(DateTime::<Utc>::from),
            stat.modified.map(DateTime::<Utc>::from),
        )
    } else {
        (None, None)
    };

    FileRecord {
        file_type: FileType::from_extension(&extension),
        path,
        name,
        extension,
        size: stat.size,
        folder,
        folders,
        created,
        modified,
        author,
    }
}

/// Lowercase extension without the dot, empty when there is none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Folder components of `folder` below `root`, padded or truncated to `columns`
pub fn folder_columns(
    root: &Path,
    folder: &Path,
    columns: usize,
    title_case: bool,
) -> Vec<Option<String>> {
    let relative = folder.strip_prefix(root).unwrap_or(folder);
    let mut names = relative.components().filter_map(|c| match c {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            Some(if title_case {
                to_title_case(&name)
            } else {
                name.into_owned()
            })
        }
        _ => None,
    });
    (0..columns).map(|_| names.next()).collect()
}

/// Upper-case letters that follow a non-letter, lower-case the rest
pub fn to_title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_is_letter = false;
    for ch in name.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}
