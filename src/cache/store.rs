// src/cache/store.rs

//! Persistent store of stage results.
//!
//! Each task directory owns one record file:
//!
//! `<task dir>/.pipetree/cache.json`
//!
//! mapping fingerprints to entries. Lookups walk the task's directory
//! first, then its ancestor chain, which is what makes completed template
//! work visible to derived tasks. All writes go through a temp file and an
//! atomic rename, so a record file is either fully written or absent.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::fingerprint::Fingerprint;
use crate::errors::Result;

pub const CACHE_DIRNAME: &str = ".pipetree";
const CACHE_FILENAME: &str = "cache.json";
const DIGEST_FILENAME: &str = "digest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: CacheStatus,
    pub artifact: Option<PathBuf>,
    pub timestamp: u64,
}

impl CacheEntry {
    pub fn new(status: CacheStatus, artifact: Option<PathBuf>) -> Self {
        Self {
            status,
            artifact,
            timestamp: unix_now(),
        }
    }

    /// Only `done` entries satisfy a lookup; `failed` entries are retried.
    pub fn is_reusable(&self) -> bool {
        self.status == CacheStatus::Done
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Default)]
struct Shard {
    entries: BTreeMap<String, CacheEntry>,
}

/// Stage cache spanning every task directory touched by one batch
/// invocation. Opened at batch start and dropped at the end; record files
/// are loaded lazily per directory and flushed on every write.
pub struct StageCache {
    persist: bool,
    shards: Mutex<HashMap<PathBuf, Shard>>,
    inflight: Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>>,
    /// Completed entries of this session, independent of task directory.
    /// Guarantees at most one fresh computation per fingerprint per run,
    /// even across tasks that do not share an ancestor chain.
    session: Mutex<HashMap<String, CacheEntry>>,
}

impl StageCache {
    /// Open a cache session. With `persist` unset (oneshot runs), records
    /// are kept in memory for the duration of the session but never written
    /// to disk.
    pub fn open(persist: bool) -> Self {
        Self {
            persist,
            shards: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            session: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persist
    }

    /// Find the first entry for `fp` along `chain` (the task's own
    /// directory followed by its ancestors).
    pub fn lookup(&self, chain: &[PathBuf], fp: &Fingerprint) -> Option<CacheEntry> {
        let mut shards = self.shards.lock().unwrap();
        for dir in chain {
            let shard = load_shard(&mut shards, dir);
            if let Some(entry) = shard.entries.get(fp.as_hex()) {
                return Some(entry.clone());
            }
        }
        None
    }

    /// Record an entry in the given task directory and flush it.
    pub fn record(&self, dir: &Path, fp: &Fingerprint, entry: CacheEntry) -> Result<()> {
        if entry.is_reusable() {
            // First writer wins; a redundant computation never overwrites.
            self.session
                .lock()
                .unwrap()
                .entry(fp.as_hex().to_string())
                .or_insert_with(|| entry.clone());
        }

        let mut shards = self.shards.lock().unwrap();
        let shard = load_shard(&mut shards, dir);
        shard.entries.insert(fp.as_hex().to_string(), entry);
        if self.persist {
            flush_shard(dir, shard)?;
        }
        Ok(())
    }

    /// A `done` entry recorded earlier in this session, regardless of which
    /// task recorded it.
    pub fn session_hit(&self, fp: &Fingerprint) -> Option<CacheEntry> {
        self.session.lock().unwrap().get(fp.as_hex()).cloned()
    }

    /// Drop an entry from the given task directory.
    pub fn invalidate(&self, dir: &Path, fp: &Fingerprint) -> Result<()> {
        let mut shards = self.shards.lock().unwrap();
        let shard = load_shard(&mut shards, dir);
        if shard.entries.remove(fp.as_hex()).is_some() {
            debug!(fingerprint = %fp, dir = %dir.display(), "invalidated cache entry");
            if self.persist {
                flush_shard(dir, shard)?;
            }
        }
        Ok(())
    }

    /// Serialise work on one fingerprint: the first caller computes, later
    /// callers wait here and then re-check the cache.
    pub async fn lock(&self, fp: &Fingerprint) -> tokio::sync::OwnedMutexGuard<()> {
        let cell = {
            let mut table = self.inflight.lock().unwrap();
            table
                .entry(fp.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        cell.lock_owned().await
    }

    /// Record the completion digest of a task.
    pub fn write_digest(&self, dir: &Path, digest: &str) -> Result<()> {
        if !self.persist {
            debug!(dir = %dir.display(), "oneshot session; completion digest not persisted");
            return Ok(());
        }
        let payload = serde_json::json!({ "spec": digest, "timestamp": unix_now() });
        write_json_atomic(&dir.join(CACHE_DIRNAME).join(DIGEST_FILENAME), &payload)?;
        info!(dir = %dir.display(), "task marked complete");
        Ok(())
    }
}

/// The digest a task last completed with, if any.
pub fn read_digest(dir: &Path) -> Option<String> {
    let path = dir.join(CACHE_DIRNAME).join(DIGEST_FILENAME);
    let contents = fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
    value.get("spec")?.as_str().map(str::to_string)
}

fn load_shard<'a>(shards: &'a mut HashMap<PathBuf, Shard>, dir: &Path) -> &'a mut Shard {
    if !shards.contains_key(dir) {
        let shard = read_shard(dir);
        shards.insert(dir.to_path_buf(), shard);
    }
    shards.get_mut(dir).unwrap()
}

fn read_shard(dir: &Path) -> Shard {
    let path = dir.join(CACHE_DIRNAME).join(CACHE_FILENAME);
    if !path.is_file() {
        return Shard::default();
    }

    match fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|s| serde_json::from_str::<BTreeMap<String, CacheEntry>>(&s).map_err(Into::into))
    {
        Ok(entries) => {
            debug!(path = %path.display(), count = entries.len(), "loaded cache records");
            Shard { entries }
        }
        Err(err) => {
            // A corrupt record file only costs recomputation.
            warn!(path = %path.display(), %err, "unreadable cache records; treating as empty");
            Shard::default()
        }
    }
}

fn flush_shard(dir: &Path, shard: &Shard) -> Result<()> {
    let path = dir.join(CACHE_DIRNAME).join(CACHE_FILENAME);
    write_json_atomic(&path, &shard.entries)?;
    Ok(())
}

/// Write `value` as JSON via a temp file and an atomic rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, payload).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}
