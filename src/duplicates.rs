//! Content-based duplicate detection over scan records
//!
//! Candidates are narrowed in three passes: equal size, equal quick hash
//! (head and tail samples plus size), then equal full MD5. Hashing runs in
//! parallel with rayon.

use md5::{Digest, Md5};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::models::FileRecord;

/// Bytes sampled from each end of a file for the quick hash
const QUICK_SAMPLE: u64 = 1024;

/// Read buffer for full hashes
const CHUNK_SIZE: usize = 8 * 1024;

/// Files with identical content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Full MD5 of the content
    pub hash: String,
    /// Size of each copy in bytes
    pub size: u64,
    /// Paths in traversal order
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// Bytes that would be freed by keeping a single copy
    pub fn wasted_bytes(&self) -> u64 {
        self.size * (self.paths.len() as u64).saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateStats {
    pub groups: usize,
    /// Copies beyond the first in each group
    pub duplicate_files: usize,
    pub wasted_bytes: u64,
    pub largest_group: usize,
}

/// Find groups of records with identical content.
///
/// Files that cannot be read are left out. Groups are ordered by copy count,
/// largest first.
pub fn find_duplicates(records: &[FileRecord]) -> Vec<DuplicateGroup> {
    let mut by_size: HashMap<u64, Vec<&FileRecord>> = HashMap::new();
    for record in records {
        by_size.entry(record.size).or_default().push(record);
    }
    let candidates: Vec<&FileRecord> = records
        .iter()
        .filter(|r| by_size.get(&r.size).is_some_and(|group| group.len() > 1))
        .collect();
    log::debug!("{} of {} records share a size", candidates.len(), records.len());

    let quick = hash_all(&candidates, |r| quick_hash(&r.path, r.size));
    let mut by_quick: HashMap<(u64, String), usize> = HashMap::new();
    for (record, hash) in &quick {
        *by_quick.entry((record.size, hash.clone())).or_default() += 1;
    }
    let survivors: Vec<&FileRecord> = quick
        .iter()
        .filter(|(r, h)| by_quick.get(&(r.size, h.clone())).is_some_and(|n| *n > 1))
        .map(|(r, _)| *r)
        .collect();

    let full = hash_all(&survivors, |r| full_hash(&r.path));
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut index: HashMap<(u64, String), usize> = HashMap::new();
    for (record, hash) in full {
        let key = (record.size, hash);
        match index.get(&key) {
            Some(&i) => groups[i].paths.push(record.path.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(DuplicateGroup {
                    hash: key.1,
                    size: record.size,
                    paths: vec![record.path.clone()],
                });
            }
        }
    }

    groups.retain(|g| g.count() > 1);
    groups.sort_by(|a, b| b.count().cmp(&a.count()).then_with(|| a.paths[0].cmp(&b.paths[0])));
    groups
}

/// Summarise duplicate groups
pub fn duplicate_stats(groups: &[DuplicateGroup]) -> DuplicateStats {
    DuplicateStats {
        groups: groups.len(),
        duplicate_files: groups.iter().map(|g| g.count().saturating_sub(1)).sum(),
        wasted_bytes: groups.iter().map(DuplicateGroup::wasted_bytes).sum(),
        largest_group: groups.iter().map(DuplicateGroup::count).max().unwrap_or(0),
    }
}

/// Hash records in parallel, keeping input order and dropping unreadable files
fn hash_all<'a, F>(records: &[&'a FileRecord], hash: F) -> Vec<(&'a FileRecord, String)>
where
    F: Fn(&FileRecord) -> io::Result<String> + Sync,
{
    records
        .par_iter()
        .filter_map(|record| match hash(*record) {
            Ok(h) => Some((*record, h)),
            Err(e) => {
                log::debug!("Skipping {:?} for duplicate check: {}", record.path, e);
                None
            }
        })
        .collect()
}

/// MD5 of the first and last sample plus the size
fn quick_hash(path: &Path, size: u64) -> io::Result<String> {
    if size == 0 {
        return Ok("empty".to_string());
    }
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; QUICK_SAMPLE as usize];

    let head = read_up_to(&mut file, &mut buffer)?;
    hasher.update(&buffer[..head]);

    if size > QUICK_SAMPLE * 2 {
        file.seek(SeekFrom::End(-(QUICK_SAMPLE as i64)))?;
        let tail = read_up_to(&mut file, &mut buffer)?;
        hasher.update(&buffer[..tail]);
    }
    hasher.update(size.to_string().as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// MD5 of the whole file
fn full_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fill as much of `buffer` as the file allows
fn read_up_to(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileType;
    use std::fs;

    fn record(path: &Path) -> FileRecord {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        FileRecord {
            path: path.to_path_buf(),
            name: path.file_name().unwrap().to_string_lossy().to_string(),
            extension: String::new(),
            file_type: FileType::Other,
            size,
            folder: path.parent().unwrap().to_path_buf(),
            folders: vec![],
            created: None,
            modified: None,
            author: None,
        }
    }

    #[test]
    fn test_finds_identical_files() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![7u8; 5000];
        for name in ["a.bin", "b.bin", "c.bin"] {
            fs::write(dir.path().join(name), &content).unwrap();
        }
        // same size and same head/tail, different middle
        let mut near = content.clone();
        near[2500] = 1;
        fs::write(dir.path().join("d.bin"), &near).unwrap();
        fs::write(dir.path().join("e.bin"), b"unique").unwrap();
        fs::write(dir.path().join("f.txt"), b"pair!").unwrap();
        fs::write(dir.path().join("g.txt"), b"pair!").unwrap();

        let records: Vec<FileRecord> = ["a.bin", "b.bin", "c.bin", "d.bin", "e.bin", "f.txt", "g.txt"]
            .iter()
            .map(|n| record(&dir.path().join(n)))
            .collect();
        let groups = find_duplicates(&records);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].count(), 3);
        assert_eq!(groups[0].paths[0], dir.path().join("a.bin"));
        assert_eq!(groups[0].size, 5000);
        assert_eq!(groups[1].paths, vec![dir.path().join("f.txt"), dir.path().join("g.txt")]);

        let stats = duplicate_stats(&groups);
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.duplicate_files, 3);
        assert_eq!(stats.wasted_bytes, 2 * 5000 + 5);
        assert_eq!(stats.largest_group, 3);
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"same").unwrap();
        let mut ghost = record(&dir.path().join("a"));
        ghost.path = dir.path().join("gone");
        let records = vec![record(&dir.path().join("a")), ghost];
        assert!(find_duplicates(&records).is_empty());
    }

    #[test]
    fn test_empty_files_group_together() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), b"").unwrap();
        fs::write(dir.path().join("y"), b"").unwrap();
        let records = vec![record(&dir.path().join("x")), record(&dir.path().join("y"))];
        let groups = find_duplicates(&records);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].wasted_bytes(), 0);
    }

    #[test]
    fn test_stats_of_nothing() {
        assert_eq!(duplicate_stats(&[]), DuplicateStats::default());
    }
}
