//! Durable Race Leaderboards
//!
//! Best race times per track and lap-count category, persisted as a single
//! JSON file. Writes go through a temp file and rename so a crash mid-write
//! never corrupts the live file, and the previous version is kept as a
//! `.bak` fallback for load.
//!
//! Persistence failures are logged and swallowed: a race result that cannot
//! be written must never take the simulation down.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Entries kept per (track, category) bucket.
pub const MAX_ENTRIES: usize = 20;

/// One finished race result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Racer display name.
    pub name: String,
    /// Total race time in milliseconds. Buckets sort ascending on this.
    pub time_ms: u64,
    /// Car preset index used.
    pub car_id: usize,
    /// Car preset display name, denormalized for display.
    pub car_name: String,
}

type Buckets = BTreeMap<String, BTreeMap<String, Vec<LeaderboardEntry>>>;

/// File-backed leaderboard store, safe to share across room tasks.
#[derive(Debug)]
pub struct LeaderboardStore {
    path: PathBuf,
    backup_path: PathBuf,
    data: Mutex<Buckets>,
}

/// Map a race length onto its leaderboard category.
pub fn category(laps_to_win: u32) -> &'static str {
    if laps_to_win <= 1 {
        "1_laps"
    } else if laps_to_win >= 5 {
        "5_laps"
    } else {
        "3_laps"
    }
}

impl LeaderboardStore {
    /// Open the store at `path`, loading existing data if present.
    ///
    /// Load order is live file, then backup, then an empty board. A store
    /// that cannot be read is never an error; it just starts fresh.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_path = path.with_extension("json.bak");

        let data = match load_file(&path) {
            Some(data) => data,
            None => match load_file(&backup_path) {
                Some(data) => {
                    warn!(path = %path.display(), "leaderboard restored from backup");
                    data
                }
                None => {
                    info!(path = %path.display(), "starting with empty leaderboard");
                    Buckets::new()
                }
            },
        };

        Self {
            path,
            backup_path,
            data: Mutex::new(data),
        }
    }

    /// Record a finished race and persist the updated board.
    ///
    /// The lock is held across the file write: concurrent finishes must
    /// not interleave on the temp file or rename a stale snapshot over a
    /// newer one.
    pub fn record_finish(&self, track_id: &str, laps_to_win: u32, entry: LeaderboardEntry) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = data
            .entry(track_id.to_string())
            .or_default()
            .entry(category(laps_to_win).to_string())
            .or_default();

        bucket.push(entry);
        bucket.sort_by_key(|e| e.time_ms);
        bucket.truncate(MAX_ENTRIES);

        if let Err(err) = persist(&self.path, &self.backup_path, &data) {
            warn!(error = %err, path = %self.path.display(), "leaderboard persist failed");
        }
    }

    /// Best times for a (track, category) bucket, ascending.
    pub fn top_scores(&self, track_id: &str, category: &str) -> Vec<LeaderboardEntry> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.get(track_id)
            .and_then(|tracks| tracks.get(category))
            .cloned()
            .unwrap_or_default()
    }
}

fn load_file(path: &Path) -> Option<Buckets> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "leaderboard read failed");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(data) => Some(data),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "leaderboard parse failed");
            None
        }
    }
}

/// Write atomically: temp file in the same directory, fsync, keep the old
/// live file as backup, then rename over it.
fn persist(path: &Path, backup_path: &Path, data: &Buckets) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(&serde_json::to_vec_pretty(data).map_err(std::io::Error::other)?)?;
        tmp.sync_all()?;
    }

    if path.exists() {
        fs::copy(path, backup_path)?;
    }
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_store() -> (LeaderboardStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("slipstream-lb-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("leaderboard.json");
        (LeaderboardStore::open(&path), path)
    }

    fn entry(name: &str, time_ms: u64) -> LeaderboardEntry {
        LeaderboardEntry {
            name: name.to_string(),
            time_ms,
            car_id: 0,
            car_name: "Apex GT".to_string(),
        }
    }

    #[test]
    fn test_category_buckets() {
        assert_eq!(category(1), "1_laps");
        assert_eq!(category(2), "3_laps");
        assert_eq!(category(3), "3_laps");
        assert_eq!(category(4), "3_laps");
        assert_eq!(category(5), "5_laps");
    }

    #[test]
    fn test_scores_sorted_and_truncated() {
        let (store, _path) = temp_store();
        for i in 0..(MAX_ENTRIES as u64 + 5) {
            store.record_finish("ring", 3, entry("racer", 100_000 - i * 1000));
        }

        let scores = store.top_scores("ring", "3_laps");
        assert_eq!(scores.len(), MAX_ENTRIES);
        assert!(scores.windows(2).all(|w| w[0].time_ms <= w[1].time_ms));
        assert_eq!(scores[0].time_ms, 100_000 - (MAX_ENTRIES as u64 + 4) * 1000);
    }

    #[test]
    fn test_unknown_bucket_is_empty() {
        let (store, _path) = temp_store();
        assert!(store.top_scores("nowhere", "3_laps").is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let (store, path) = temp_store();
        store.record_finish("ring", 1, entry("Ada", 42_000));
        drop(store);

        let reopened = LeaderboardStore::open(&path);
        let scores = reopened.top_scores("ring", "1_laps");
        assert_eq!(scores, vec![entry("Ada", 42_000)]);
    }

    #[test]
    fn test_corrupt_live_file_falls_back_to_backup() {
        let (store, path) = temp_store();
        store.record_finish("ring", 3, entry("Ada", 50_000));
        // Second write moves the first version into the backup.
        store.record_finish("ring", 3, entry("Brin", 60_000));
        drop(store);

        fs::write(&path, b"{not json").unwrap();
        let reopened = LeaderboardStore::open(&path);
        let scores = reopened.top_scores("ring", "3_laps");
        assert_eq!(scores, vec![entry("Ada", 50_000)]);
    }

    #[test]
    fn test_concurrent_finishes_keep_all_entries() {
        let (store, path) = temp_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..5u64 {
                        store.record_finish(
                            "ring",
                            3,
                            entry(&format!("racer-{i}-{j}"), 100_000 + i * 10 + j),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // 40 finishes, capped at the bucket size, visible in memory...
        assert_eq!(store.top_scores("ring", "3_laps").len(), MAX_ENTRIES);

        // ...and on disk: the live file must hold the final snapshot, not
        // a stale one that lost the rename race.
        let reopened = LeaderboardStore::open(&path);
        let persisted = reopened.top_scores("ring", "3_laps");
        assert_eq!(persisted, store.top_scores("ring", "3_laps"));
    }

    #[test]
    fn test_missing_files_start_empty() {
        let dir = std::env::temp_dir().join(format!("slipstream-lb-{}", uuid::Uuid::new_v4()));
        let store = LeaderboardStore::open(dir.join("leaderboard.json"));
        assert!(store.top_scores("ring", "3_laps").is_empty());
    }
}
