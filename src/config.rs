//! Configuration for the inventory scanner

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::LocationClass;
use crate::error::{Result, ScanError};

/// Default per-step metadata timeout (30 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default number of folder columns
pub const DEFAULT_FOLDER_COLUMNS: usize = 3;

/// Upper bound on folder columns
pub const MAX_FOLDER_COLUMNS: usize = 64;

/// Worker cap for locally attached roots when auto-detecting
pub const MAX_LOCAL_WORKERS: usize = 8;

/// Worker cap for network roots
pub const MAX_NETWORK_WORKERS: usize = 2;

/// Options for a single scan. Immutable once a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Root directory to scan
    pub root: PathBuf,

    /// File extensions to include (lowercase, without dot)
    /// If empty, all files are included
    pub extensions: HashSet<String>,

    /// Whether to record creation and modification dates
    pub include_dates: bool,

    /// Whether to read the author of office documents
    pub include_author: bool,

    /// Number of folder columns kept per record
    pub folder_columns: usize,

    /// Whether folder names are converted to title case
    pub title_case: bool,

    /// Label for the root folder; defaults to the root's final component
    pub root_name: Option<String>,

    /// Budget for each metadata step, in milliseconds
    pub timeout_ms: u64,

    /// Number of extraction workers
    /// 0 means auto-detect
    pub workers: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            extensions: HashSet::new(),
            include_dates: true,
            include_author: true,
            folder_columns: DEFAULT_FOLDER_COLUMNS,
            title_case: true,
            root_name: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            workers: 0,
        }
    }
}

impl ScanOptions {
    /// Create options for the given root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Create an options builder
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::new()
    }

    /// Load options from a JSON file; missing fields take their defaults
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check if an extension should be included
    pub fn should_include_extension(&self, ext: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        self.extensions.contains(&ext.to_lowercase())
    }

    /// Per-step metadata timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the label used for the root folder
    pub fn effective_root_name(&self) -> String {
        if let Some(name) = self.root_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        self.root
            .components()
            .next_back()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Get the effective number of extraction workers for a root class
    pub fn effective_workers(&self, class: LocationClass) -> usize {
        let requested = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get().min(MAX_LOCAL_WORKERS))
                .unwrap_or(4)
        } else {
            self.workers
        };
        if class.is_network() {
            requested.min(MAX_NETWORK_WORKERS)
        } else {
            requested
        }
    }

    /// Reject options a scan cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(ScanError::InvalidOptions("root path is empty".into()));
        }
        if !self.root.is_dir() {
            return Err(ScanError::InvalidOptions(format!(
                "root {:?} is not an accessible directory",
                self.root
            )));
        }
        if self.folder_columns > MAX_FOLDER_COLUMNS {
            return Err(ScanError::InvalidOptions(format!(
                "folder columns must be at most {}, got {}",
                MAX_FOLDER_COLUMNS, self.folder_columns
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ScanError::InvalidOptions("timeout must be non-zero".into()));
        }
        if let Some(bad) = self
            .extensions
            .iter()
            .find(|e| e.is_empty() || e.contains(['/', '\\', '.']))
        {
            return Err(ScanError::InvalidOptions(format!(
                "invalid extension filter entry {:?}",
                bad
            )));
        }
        Ok(())
    }
}

/// Parse a comma-separated extension list such as `".psd, tif,PDF"`
pub fn parse_extensions(list: &str) -> HashSet<String> {
    list.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Builder for ScanOptions
#[derive(Debug, Default)]
pub struct ScanOptionsBuilder {
    options: ScanOptions,
}

impl ScanOptionsBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root directory
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.root = root.into();
        self
    }

    /// Set the extensions whitelist
    pub fn extensions(mut self, extensions: HashSet<String>) -> Self {
        self.options.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Set the extensions whitelist from a comma-separated list
    pub fn extension_list(mut self, list: &str) -> Self {
        self.options.extensions = parse_extensions(list);
        self
    }

    /// Enable or disable date columns
    pub fn include_dates(mut self, enabled: bool) -> Self {
        self.options.include_dates = enabled;
        self
    }

    /// Enable or disable author extraction
    pub fn include_author(mut self, enabled: bool) -> Self {
        self.options.include_author = enabled;
        self
    }

    /// Set the number of folder columns
    pub fn folder_columns(mut self, columns: usize) -> Self {
        self.options.folder_columns = columns;
        self
    }

    /// Enable or disable title-casing of folder names
    pub fn title_case(mut self, enabled: bool) -> Self {
        self.options.title_case = enabled;
        self
    }

    /// Set the root folder label
    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.options.root_name = Some(name.into());
        self
    }

    /// Set the per-step metadata timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the number of extraction workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.options.workers = workers;
        self
    }

    /// Build the options
    pub fn build(self) -> ScanOptions {
        self.options
    }
}
