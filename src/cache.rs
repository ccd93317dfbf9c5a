//! Disk cache: one directory, one file per entry; TTL-first, LRU second,
//! size-bounded eviction. A corrupt or unreadable entry degrades silently to
//! a miss, never a hard error.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHeader {
    pub created_at_ms: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheValue {
    pub code: String,
    pub source_map: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    header: CacheHeader,
    value: CacheValue,
}

pub struct DiskCache {
    dir: PathBuf,
    max_age_ms: u64,
    max_bytes: u64,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, max_age_ms: u64, max_bytes: u64) -> Self {
        Self { dir: dir.into(), max_age_ms, max_bytes }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Re-checks TTL against wall-clock on every access; a stale entry is
    /// deleted and treated as a miss.
    pub fn get(&self, key: &str, now_ms: u64) -> Option<CacheValue> {
        let path = self.path_for(key);
        let entry = Self::read_entry(&path)?;

        if now_ms.saturating_sub(entry.header.created_at_ms) > self.max_age_ms {
            let _ = fs::remove_file(&path);
            return None;
        }

        Some(entry.value)
    }

    fn read_entry(path: &Path) -> Option<StoredEntry> {
        let raw = fs::read(path).ok()?;
        if raw.len() < 4 {
            return None;
        }
        let header_len = u32::from_le_bytes(raw[0..4].try_into().ok()?) as usize;
        let header_bytes = raw.get(4..4 + header_len)?;
        let header: CacheHeader = serde_json::from_slice(header_bytes).ok()?;
        let payload = raw.get(4 + header_len..)?;
        let value: CacheValue = serde_json::from_slice(payload).ok()?;
        Some(StoredEntry { header, value })
    }

    /// Writes via a tempfile-then-rename discipline so concurrent writers of
    /// the same content-addressed key never produce a partial read.
    pub fn put(&self, key: &str, value: &CacheValue, now_ms: u64) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let header_json = serde_json::to_vec(&CacheHeader { created_at_ms: now_ms, size_bytes: 0 })
            .expect("CacheHeader serializes");
        let payload_json = serde_json::to_vec(value).expect("CacheValue serializes");

        let mut buf = Vec::with_capacity(4 + header_json.len() + payload_json.len());
        buf.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
        buf.extend_from_slice(&header_json);
        buf.extend_from_slice(&payload_json);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&buf)?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;

        self.evict(now_ms)
    }

    /// Scans directory size; while total size exceeds `max_bytes`, deletes
    /// the entry with the smallest `createdAtMs`. Also drops anything past
    /// `max_age_ms` first (TTL-first, LRU second, size-bounded).
    pub fn evict(&self, now_ms: u64) -> std::io::Result<()> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else { return Ok(()) };

        let mut entries: Vec<(PathBuf, u64, u64)> = Vec::new(); // (path, created_at_ms, size)
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let size = meta.len();
            let Some(stored) = Self::read_entry(&path) else {
                // Corrupt entry: advisory cache, drop it silently.
                let _ = fs::remove_file(&path);
                continue;
            };
            if now_ms.saturating_sub(stored.header.created_at_ms) > self.max_age_ms {
                let _ = fs::remove_file(&path);
                continue;
            }
            entries.push((path, stored.header.created_at_ms, size));
        }

        let mut total: u64 = entries.iter().map(|(_, _, size)| *size).sum();
        entries.sort_by_key(|(_, created_at_ms, _)| *created_at_ms);

        let mut idx = 0;
        while total > self.max_bytes && idx < entries.len() {
            let (path, _, size) = &entries[idx];
            if fs::remove_file(path).is_ok() {
                total = total.saturating_sub(*size);
            }
            idx += 1;
        }

        Ok(())
    }
}

/// Current wall-clock time in milliseconds, the only place in the crate that
/// reads the clock (kept at the boundary so the rest of the pipeline stays a
/// pure function of its inputs, per the determinism requirements this tool
/// itself enforces on user code).
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
