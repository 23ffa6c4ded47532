//! Core data models for the inventory scanner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::classify::LocationClass;
use crate::error::ErrorDescriptor;
use crate::throttle::ThrottlePolicy;

/// File type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Document,
    Spreadsheet,
    Presentation,
    Pdf,
    Image,
    Design,
    Video,
    Audio,
    Archive,
    Code,
    Web,
    Database,
    Executable,
    Font,
    #[serde(rename = "3d_cad")]
    Cad3D,
    Email,
    Other,
}

impl FileType {
    /// Infer file type from extension (with or without leading dot)
    pub fn from_extension(ext: &str) -> Self {
        let ext_lower = ext.trim_start_matches('.').to_lowercase();
        match ext_lower.as_str() {
            "doc" | "docx" | "docm" | "dot" | "dotx" | "odt" | "rtf" | "pages" | "wpd" => {
                FileType::Document
            }
            "xls" | "xlsx" | "xlsm" | "xlsb" | "xltx" | "ods" | "csv" | "numbers" => {
                FileType::Spreadsheet
            }
            "ppt" | "pptx" | "pptm" | "potx" | "odp" | "key" => FileType::Presentation,
            "pdf" => FileType::Pdf,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tif" | "tiff" | "webp" | "heic" | "svg"
            | "ico" | "raw" | "cr2" | "nef" | "arw" | "dng" => FileType::Image,
            "psd" | "ai" | "indd" | "eps" | "sketch" | "fig" | "xd" | "afdesign" | "afphoto" => {
                FileType::Design
            }
            "mp4" | "mov" | "avi" | "mkv" | "wmv" | "flv" | "webm" | "m4v" | "mpg" | "mpeg" => {
                FileType::Video
            }
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "wma" | "m4a" | "aiff" => FileType::Audio,
            "zip" | "rar" | "7z" | "tar" | "gz" | "tgz" | "bz2" | "xz" => FileType::Archive,
            "rs" | "py" | "js" | "ts" | "jsx" | "tsx" | "java" | "c" | "h" | "cpp" | "hpp"
            | "cs" | "go" | "rb" | "swift" | "kt" | "sh" | "ps1" | "bat" => FileType::Code,
            "html" | "htm" | "css" | "scss" | "less" | "php" | "xml" | "json" => FileType::Web,
            "db" | "sqlite" | "sqlite3" | "mdb" | "accdb" | "sql" | "dbf" => FileType::Database,
            "exe" | "msi" | "dll" | "app" | "dmg" | "bin" | "com" | "deb" | "rpm" | "apk" => {
                FileType::Executable
            }
            "ttf" | "otf" | "woff" | "woff2" | "eot" => FileType::Font,
            "dwg" | "dxf" | "step" | "stp" | "stl" | "obj" | "fbx" | "blend" | "3ds" | "skp"
            | "iges" | "igs" => FileType::Cad3D,
            "eml" | "msg" | "pst" | "ost" | "mbox" => FileType::Email,
            _ => FileType::Other,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Document => "document",
            FileType::Spreadsheet => "spreadsheet",
            FileType::Presentation => "presentation",
            FileType::Pdf => "pdf",
            FileType::Image => "image",
            FileType::Design => "design",
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Archive => "archive",
            FileType::Code => "code",
            FileType::Web => "web",
            FileType::Database => "database",
            FileType::Executable => "executable",
            FileType::Font => "font",
            FileType::Cad3D => "3d_cad",
            FileType::Email => "email",
            FileType::Other => "other",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata for one discovered file. Built once by the extractor, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Full path to the file
    pub path: PathBuf,
    /// File name without path
    pub name: String,
    /// File extension (lowercase, without dot)
    pub extension: String,
    /// Classified file type
    pub file_type: FileType,
    /// File size in bytes
    pub size: u64,
    /// Directory containing the file
    pub folder: PathBuf,
    /// Folder components below the root, padded with `None` to the configured width
    pub folders: Vec<Option<String>>,
    /// Creation time, or the earliest timestamp proxy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last modification time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Document author (office documents only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Lifecycle state of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Running,
    Completed,
    Cancelled,
    Aborted,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Running => "running",
            ScanState::Completed => "completed",
            ScanState::Cancelled => "cancelled",
            ScanState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a scan operation. Partial results are kept for cancelled and aborted scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root directory that was scanned
    pub root: PathBuf,
    /// Label for the root folder
    pub root_name: String,
    /// How the root was classified
    pub location: LocationClass,
    /// Throttle policy derived from the classification
    pub throttle: ThrottlePolicy,
    /// Terminal state of the session
    pub state: ScanState,
    /// Records in traversal order
    pub records: Vec<FileRecord>,
    /// Errors in the order they were encountered
    pub errors: Vec<ErrorDescriptor>,
    /// Entries processed (records + errors)
    pub processed: u64,
    /// Directories entered
    pub dirs_visited: u64,
    /// Total scan duration in milliseconds
    pub duration_ms: u64,
}

impl ScanResult {
    /// Get the number of errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Get the number of records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Check if the walk covered the whole tree
    pub fn is_complete(&self) -> bool {
        self.state == ScanState::Completed
    }
}

/// Progress information emitted at batch boundaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Entries processed so far
    pub processed: u64,
    /// Errors recorded so far
    pub errors: u64,
    /// Directories entered so far
    pub dirs: u64,
    /// Directory most recently entered
    pub current_dir: PathBuf,
    /// Elapsed time in milliseconds
    pub elapsed_ms: u64,
}
