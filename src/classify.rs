//! Root location classification
//!
//! Decides whether a scan root lives on a local volume or behind a network
//! filesystem. Mount and drive-mapping tables are read through the
//! [`MountTable`] trait so tests can supply their own.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Filesystem types treated as network-backed
pub const NETWORK_FS_TYPES: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smb",
    "smbfs",
    "smb2",
    "smb3",
    "afpfs",
    "webdav",
    "davfs",
    "ncpfs",
    "9p",
    "ceph",
    "glusterfs",
    "lustre",
    "fuse.sshfs",
    "sshfs",
    "remote",
];

/// URL schemes that name a server/share directly
const REMOTE_SCHEMES: &[&str] = &["smb://", "afp://", "nfs://", "cifs://", "webdav://"];

/// Where a scan root lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationClass {
    /// Locally attached volume
    Local,
    /// Server/share reference such as `\\server\share` or `smb://server/share`
    NetworkUnc,
    /// Path on a mounted network filesystem or mapped drive
    NetworkMounted,
}

impl LocationClass {
    pub fn is_network(&self) -> bool {
        !matches!(self, LocationClass::Local)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationClass::Local => "local",
            LocationClass::NetworkUnc => "network_unc",
            LocationClass::NetworkMounted => "network_mounted",
        }
    }
}

impl std::fmt::Display for LocationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a mount or drive-mapping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Device, export or share backing the mount
    pub source: String,
    /// Where the volume is attached
    pub mount_point: PathBuf,
    /// Filesystem type as reported by the platform
    pub fs_type: String,
}

impl MountEntry {
    pub fn new(source: impl Into<String>, mount_point: impl Into<PathBuf>, fs_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mount_point: mount_point.into(),
            fs_type: fs_type.into(),
        }
    }

    /// Check whether this mount is backed by a network filesystem
    pub fn is_network(&self) -> bool {
        let fs_type = self.fs_type.to_lowercase();
        NETWORK_FS_TYPES.contains(&fs_type.as_str())
            || self.source.starts_with("//")
            || self.source.starts_with(r"\\")
    }
}

/// Platform mount lookup capability
pub trait MountTable: Send + Sync {
    fn entries(&self) -> io::Result<Vec<MountEntry>>;
}

/// Mount table read from the running system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMountTable;

impl MountTable for SystemMountTable {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn entries(&self) -> io::Result<Vec<MountEntry>> {
        let content = std::fs::read_to_string("/proc/self/mounts")?;
        Ok(parse_proc_mounts(&content))
    }

    #[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
    fn entries(&self) -> io::Result<Vec<MountEntry>> {
        let output = run_lookup(std::process::Command::new("mount"))?;
        Ok(parse_mount_output(&output))
    }

    #[cfg(windows)]
    fn entries(&self) -> io::Result<Vec<MountEntry>> {
        let mut cmd = std::process::Command::new("net");
        cmd.arg("use");
        let output = run_lookup(cmd)?;
        Ok(parse_net_use(&output))
    }

    #[cfg(not(any(unix, windows)))]
    fn entries(&self) -> io::Result<Vec<MountEntry>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no mount table lookup on this platform",
        ))
    }
}

/// Upper bound for an external lookup command
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const LOOKUP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Run a lookup command, killing it if it does not finish in time
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn run_lookup(mut cmd: std::process::Command) -> io::Result<String> {
    use std::io::Read;
    use std::process::Stdio;

    let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::null()).spawn()?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "lookup produced no stdout"))?;

    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let mut buf = String::new();
        let res = stdout.read_to_string(&mut buf).map(|_| buf);
        let _ = tx.send(res);
    });

    match rx.recv_timeout(LOOKUP_TIMEOUT) {
        Ok(res) => {
            let _ = child.wait();
            res
        }
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(io::Error::new(io::ErrorKind::TimedOut, "mount lookup timed out"))
        }
    }
}

/// Parse `/proc/self/mounts` (`source mount_point fs_type options dump pass`)
pub fn parse_proc_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry::new(
                unescape_octal(source),
                unescape_octal(mount_point),
                fs_type,
            ))
        })
        .collect()
}

/// Undo the `\040`-style escaping the kernel applies to mount fields
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse BSD/macOS `mount` output (`source on /mount/point (fs_type, flags...)`)
pub fn parse_mount_output(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let (source, rest) = line.split_once(" on ")?;
            let open = rest.rfind(" (")?;
            let mount_point = &rest[..open];
            let flags = rest[open + 2..].trim_end_matches(')');
            let fs_type = flags.split(',').next()?.trim();
            Some(MountEntry::new(source, mount_point, fs_type))
        })
        .collect()
}

/// Parse Windows `net use` output into mapped drive entries
pub fn parse_net_use(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let drive_idx = tokens.iter().position(|t| is_drive_letter(t))?;
            let remote = tokens.get(drive_idx + 1).filter(|t| t.starts_with(r"\\"))?;
            Some(MountEntry::new(
                *remote,
                format!("{}\\", tokens[drive_idx]),
                "remote",
            ))
        })
        .collect()
}

fn is_drive_letter(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Classifies scan roots as local or network-backed
#[derive(Clone)]
pub struct PathClassifier {
    mounts: Arc<dyn MountTable>,
}

impl std::fmt::Debug for PathClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathClassifier").finish_non_exhaustive()
    }
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::system()
    }
}

impl PathClassifier {
    /// Create a classifier backed by the given mount lookup
    pub fn new(mounts: impl MountTable + 'static) -> Self {
        Self {
            mounts: Arc::new(mounts),
        }
    }

    /// Create a classifier backed by the running system's mount table
    pub fn system() -> Self {
        Self::new(SystemMountTable)
    }

    /// Classify a root path. Lookup failures count as network-mounted.
    ///
    /// Both the path as given and the path with symlinks resolved are
    /// matched against the mount table; either landing on a network mount
    /// makes the root network-mounted.
    pub fn classify(&self, path: &Path) -> LocationClass {
        let raw = path.to_string_lossy();
        let lookup_path = match remote_reference(&raw) {
            RemoteRef::Share => return LocationClass::NetworkUnc,
            RemoteRef::Local => return LocationClass::Local,
            RemoteRef::Verbatim(stripped) => PathBuf::from(stripped),
            RemoteRef::None => path.to_path_buf(),
        };

        let candidates = match resolve_candidates(&lookup_path) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("Cannot resolve {:?} ({}); treating as network", path, e);
                return LocationClass::NetworkMounted;
            }
        };

        let entries = match self.mounts.entries() {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Mount lookup failed ({}); treating {:?} as network", e, path);
                return LocationClass::NetworkMounted;
            }
        };

        for candidate in &candidates {
            if matches!(remote_reference(&candidate.to_string_lossy()), RemoteRef::Share) {
                log::debug!("{:?} resolves to share {:?}", path, candidate);
                return LocationClass::NetworkMounted;
            }
            let best = entries
                .iter()
                .filter(|entry| candidate.starts_with(&entry.mount_point))
                .max_by_key(|entry| entry.mount_point.components().count());

            if let Some(entry) = best.filter(|entry| entry.is_network()) {
                log::debug!(
                    "{:?} resolves to {:?} on {} mount {:?} from {}",
                    path,
                    candidate,
                    entry.fs_type,
                    entry.mount_point,
                    entry.source
                );
                return LocationClass::NetworkMounted;
            }
        }
        LocationClass::Local
    }
}

/// The absolute form of `path`, plus its symlink-free form when that differs.
///
/// A path that does not exist yet has nothing to resolve and is matched
/// lexically; any other resolution failure is returned.
fn resolve_candidates(path: &Path) -> io::Result<Vec<PathBuf>> {
    let absolute = std::path::absolute(path)?;
    let resolved = match std::fs::canonicalize(&absolute) {
        Ok(resolved) => strip_verbatim(resolved),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![absolute]),
        Err(e) => return Err(e),
    };
    if resolved == absolute {
        Ok(vec![absolute])
    } else {
        Ok(vec![absolute, resolved])
    }
}

/// `canonicalize` returns `\\?\C:\...` on Windows; mount tables do not
fn strip_verbatim(path: PathBuf) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix(r"\\?\")) {
        Some(stripped) if !stripped.to_lowercase().starts_with(r"unc\") => PathBuf::from(stripped),
        _ => path,
    }
}

enum RemoteRef<'a> {
    /// A server/share reference
    Share,
    /// A device namespace path, always local
    Local,
    /// A verbatim local path with its prefix stripped
    Verbatim(&'a str),
    /// An ordinary path to be looked up in the mount table
    None,
}

/// Check whether `path` names a server/share or device rather than a local path
pub fn is_remote_reference(path: &Path) -> bool {
    !matches!(
        remote_reference(&path.to_string_lossy()),
        RemoteRef::None | RemoteRef::Verbatim(_)
    )
}

fn remote_reference(raw: &str) -> RemoteRef<'_> {
    let lower = raw.to_lowercase();
    if REMOTE_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return RemoteRef::Share;
    }
    if lower.starts_with(r"\\?\unc\") {
        return RemoteRef::Share;
    }
    if let Some(stripped) = raw.strip_prefix(r"\\?\") {
        return RemoteRef::Verbatim(stripped);
    }
    if raw.starts_with(r"\\.\") {
        return RemoteRef::Local;
    }
    if raw.starts_with(r"\\") || (raw.starts_with("//") && !raw.starts_with("///")) {
        return RemoteRef::Share;
    }
    RemoteRef::None
}
