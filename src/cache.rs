//! Scan cache for repeat inventories of the same root
//!
//! Completed scans are kept in a [`ScanDatabase`], one per root. A cached
//! scan is served only while it is younger than the age limit and the root
//! directory has not been modified since it was stored. The least recently
//! stored roots are evicted once the entry limit is exceeded.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::db::ScanDatabase;
use crate::error::Result;
use crate::models::ScanResult;

/// Default number of roots kept
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Default age limit in days
pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Roots with a cached scan
    pub cached_roots: usize,
    /// File records across all cached scans
    pub cached_files: u64,
    /// Root stored most recently
    pub most_recent: Option<PathBuf>,
}

pub struct ScanCache {
    db: ScanDatabase,
    max_entries: usize,
    max_age: Duration,
}

impl std::fmt::Debug for ScanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCache")
            .field("max_entries", &self.max_entries)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl ScanCache {
    /// Open or create a cache file with default limits
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(ScanDatabase::open(path)?))
    }

    /// In-memory cache (for testing)
    pub fn open_memory() -> Result<Self> {
        Ok(Self::new(ScanDatabase::open_memory()?))
    }

    fn new(db: ScanDatabase) -> Self {
        Self {
            db,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_age: Duration::days(DEFAULT_MAX_AGE_DAYS),
        }
    }

    /// Set the entry and age limits
    pub fn with_limits(mut self, max_entries: usize, max_age_days: i64) -> Self {
        self.max_entries = max_entries.max(1);
        self.max_age = Duration::days(max_age_days.clamp(0, 36_500));
        self
    }

    /// Cached scan of `root`, if still fresh
    pub fn get(&mut self, root: &Path) -> Result<Option<ScanResult>> {
        self.get_at(root, Utc::now())
    }

    /// Cached scan of `root` as seen at `now`. Stale entries are dropped.
    pub fn get_at(&mut self, root: &Path, now: DateTime<Utc>) -> Result<Option<ScanResult>> {
        let key = root_key(root);
        let Some(row) = self.db.latest_completed(&key)? else {
            return Ok(None);
        };

        let saved_at = match DateTime::parse_from_rfc3339(&row.saved_at) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                log::warn!("Cached scan of {:?} has a bad timestamp ({}); dropping it", root, e);
                self.db.delete_root(&key, None)?;
                return Ok(None);
            }
        };

        if now - saved_at > self.max_age {
            log::debug!("Cached scan of {:?} from {} expired", root, row.saved_at);
            self.db.delete_root(&key, None)?;
            return Ok(None);
        }

        if let Some(modified) = dir_modified(root) {
            if modified > saved_at {
                log::debug!("{:?} changed since it was cached at {}", root, row.saved_at);
                self.db.delete_root(&key, None)?;
                return Ok(None);
            }
        }

        Ok(self.db.load_result(row.id)?)
    }

    /// Store a completed scan, replacing any earlier one of the same root.
    ///
    /// Returns the stored scan id, or `None` for partial scans, which are
    /// never cached.
    pub fn put(&mut self, result: &ScanResult) -> Result<Option<i64>> {
        if !result.is_complete() {
            return Ok(None);
        }
        let key = root_key(&result.root);
        let scan_id = self.db.save_result(result)?;
        self.db.delete_root(&key, Some(scan_id))?;

        let roots = self.db.roots_by_recency()?;
        for (root, _) in roots.iter().skip(self.max_entries) {
            log::debug!("Evicting cached scan of {}", root);
            self.db.delete_root(root, None)?;
        }
        Ok(Some(scan_id))
    }

    /// Drop every entry older than the age limit at `now`
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut purged = 0;
        for (root, scan_id) in self.db.roots_by_recency()? {
            let expired = match self.db.get_scan(scan_id)? {
                Some(row) => DateTime::parse_from_rfc3339(&row.saved_at)
                    .map(|t| now - t.with_timezone(&Utc) > self.max_age)
                    .unwrap_or(true),
                None => false,
            };
            if expired {
                self.db.delete_root(&root, None)?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let roots = self.db.roots_by_recency()?;
        Ok(CacheStats {
            cached_roots: roots.len(),
            cached_files: self.db.total_file_count()?,
            most_recent: roots.first().map(|(root, _)| PathBuf::from(root)),
        })
    }

    /// Remove all cached scans
    pub fn clear(&mut self) -> Result<usize> {
        Ok(self.db.clear()?)
    }
}

fn root_key(root: &Path) -> String {
    root.to_string_lossy().into_owned()
}

fn dir_modified(root: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(root)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LocationClass;
    use crate::models::ScanState;
    use crate::throttle::ThrottlePolicy;

    fn completed(root: &Path) -> ScanResult {
        ScanResult {
            root: root.to_path_buf(),
            root_name: "root".into(),
            location: LocationClass::Local,
            throttle: ThrottlePolicy::for_class(LocationClass::Local),
            state: ScanState::Completed,
            records: Vec::new(),
            errors: Vec::new(),
            processed: 0,
            dirs_visited: 1,
            duration_ms: 5,
        }
    }

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ScanCache::open_memory().unwrap();
        assert!(cache.get(dir.path()).unwrap().is_none());

        assert!(cache.put(&completed(dir.path())).unwrap().is_some());
        let cached = cache.get(dir.path()).unwrap().unwrap();
        assert_eq!(cached.root, dir.path());
        assert_eq!(cached.state, ScanState::Completed);
    }

    #[test]
    fn test_partial_scans_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ScanCache::open_memory().unwrap();
        for state in [ScanState::Cancelled, ScanState::Aborted] {
            let mut result = completed(dir.path());
            result.state = state;
            assert_eq!(cache.put(&result).unwrap(), None);
        }
        assert!(cache.get(dir.path()).unwrap().is_none());
        assert_eq!(cache.stats().unwrap().cached_roots, 0);
    }

    #[test]
    fn test_entries_expire() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ScanCache::open_memory().unwrap().with_limits(10, 7);
        cache.put(&completed(dir.path())).unwrap();

        let soon = Utc::now() + Duration::days(6);
        assert!(cache.get_at(dir.path(), soon).unwrap().is_some());
        let later = Utc::now() + Duration::days(8);
        assert!(cache.get_at(dir.path(), later).unwrap().is_none());
        assert_eq!(cache.stats().unwrap().cached_roots, 0);
    }

    #[test]
    fn test_modified_root_invalidates_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ScanCache::open_memory().unwrap();
        cache.put(&completed(dir.path())).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(50));
        std::fs::write(dir.path().join("new.txt"), b"x").unwrap();
        assert!(cache.get(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_least_recent_root_is_evicted() {
        let mut cache = ScanCache::open_memory().unwrap().with_limits(2, 7);
        for root in ["/srv/a", "/srv/b", "/srv/a", "/srv/c"] {
            cache.put(&completed(Path::new(root))).unwrap();
        }

        let stats = cache.stats().unwrap();
        assert_eq!(stats.cached_roots, 2);
        assert_eq!(stats.most_recent, Some(PathBuf::from("/srv/c")));
        let now = Utc::now();
        assert!(cache.get_at(Path::new("/srv/a"), now).unwrap().is_some());
        assert!(cache.get_at(Path::new("/srv/b"), now).unwrap().is_none());
    }

    #[test]
    fn test_purge_and_clear() {
        let mut cache = ScanCache::open_memory().unwrap();
        cache.put(&completed(Path::new("/srv/a"))).unwrap();
        cache.put(&completed(Path::new("/srv/b"))).unwrap();

        assert_eq!(cache.purge_expired(Utc::now()).unwrap(), 0);
        assert_eq!(cache.purge_expired(Utc::now() + Duration::days(30)).unwrap(), 2);

        cache.put(&completed(Path::new("/srv/c"))).unwrap();
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
    }
}
