//! Track Catalog
//!
//! The set of tracks rooms can race on: compiled-in defaults plus
//! player-submitted custom maps. Custom maps survive restarts through the
//! same atomic JSON persistence the leaderboard uses.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use tracing::{info, warn};

use crate::game::track::{Track, TrackError, DEFAULT_SPAWN_ROTATION_DEG};

/// Reserved id for the room-submitted custom map slot.
pub const CUSTOM_TRACK_ID: &str = "custom";

/// Catalog listing sent to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    /// Track id, usable in a `set_track` request.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Spawn facing in degrees.
    pub spawn_rotation_deg: f32,
}

/// Shared catalog of all known tracks.
#[derive(Debug)]
pub struct TrackCatalog {
    path: PathBuf,
    tracks: RwLock<BTreeMap<String, Track>>,
}

/// The compiled-in default tracks.
pub fn builtin_tracks() -> Vec<Track> {
    let ridgeway = Track::new(
        "ridgeway",
        "Ridgeway Ring",
        &[
            "111111111111111111111111",
            "1.......F..............1",
            "1.......F..P...........1",
            "1.......F..............1",
            "1...1111111111111111...1",
            "1...1111111111111111...1",
            "1...1111111111111111...1",
            "1...1111111111111111...1",
            "1...1111111111111111...1",
            "1...1111111111111111...1",
            "1..........C...........1",
            "1..........C...........1",
            "1..........C...........1",
            "111111111111111111111111",
        ],
        180.0,
    );

    let harbor = Track::new(
        "harbor",
        "Harbor Sprint",
        &[
            "11111111111111111111111111111111",
            "1.........F....................1",
            "1.........F...P................1",
            "1.........F....................1",
            "1...111111111111111111111111...1",
            "1...111111111111111111111111...1",
            "1...111111111111111111111111...1",
            "1...111111111111111111111111...1",
            "1...111111111111111111111111...1",
            "1...111111111111111111111111...1",
            "1...111111111111111111111111...1",
            "1...111111111111111111111111...1",
            "1..............C...............1",
            "1..............C...............1",
            "1..............C...............1",
            "11111111111111111111111111111111",
        ],
        90.0,
    );

    // The compiled-in maps always satisfy their own validator.
    vec![
        ridgeway.expect("builtin track ridgeway is valid"),
        harbor.expect("builtin track harbor is valid"),
    ]
}

fn is_builtin(id: &str) -> bool {
    matches!(id, "ridgeway" | "harbor")
}

impl TrackCatalog {
    /// Open the catalog, seeding the built-ins and merging any persisted
    /// custom tracks from `path`. Invalid persisted entries are skipped.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tracks: BTreeMap<String, Track> = builtin_tracks()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        for (id, track) in load_customs(&path) {
            tracks.insert(id, track);
        }

        Self {
            path,
            tracks: RwLock::new(tracks),
        }
    }

    /// Register (or replace) a track and persist the custom set.
    ///
    /// The write lock is held across the file write so concurrent
    /// registrations cannot interleave on the temp file.
    pub fn register(&self, track: Track) {
        let mut tracks = self.tracks.write().unwrap_or_else(|e| e.into_inner());
        tracks.insert(track.id.clone(), track);
        let customs: BTreeMap<_, _> = tracks
            .iter()
            .filter(|(id, _)| !is_builtin(id))
            .map(|(id, t)| (id.clone(), t.clone()))
            .collect();

        if let Err(err) = persist(&self.path, &customs) {
            warn!(error = %err, path = %self.path.display(), "track persist failed");
        }
    }

    /// Look up a track by id.
    pub fn get(&self, id: &str) -> Option<Track> {
        let tracks = self.tracks.read().unwrap_or_else(|e| e.into_inner());
        tracks.get(id).cloned()
    }

    /// The track new rooms start on.
    pub fn default_track(&self) -> Track {
        self.get("ridgeway")
            .unwrap_or_else(|| builtin_tracks().remove(0))
    }

    /// All tracks, sorted by display name for the client picker.
    pub fn list(&self) -> Vec<TrackSummary> {
        let tracks = self.tracks.read().unwrap_or_else(|e| e.into_inner());
        let mut summaries: Vec<TrackSummary> = tracks
            .values()
            .map(|t| TrackSummary {
                id: t.id.clone(),
                name: t.name.clone(),
                spawn_rotation_deg: t.spawn_rotation_deg,
            })
            .collect();
        summaries.sort_by_key(|s| s.name.to_lowercase());
        summaries
    }
}

/// Load persisted custom tracks, re-validating each through the track
/// constructor so a hand-edited file cannot smuggle in an invalid map.
fn load_customs(path: &Path) -> BTreeMap<String, Track> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "track catalog read failed");
            return BTreeMap::new();
        }
    };

    let raw: BTreeMap<String, Track> = match serde_json::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "track catalog parse failed");
            return BTreeMap::new();
        }
    };

    let mut tracks = BTreeMap::new();
    for (id, track) in raw {
        let rotation = track.spawn_rotation_deg;
        match revalidate(&track, rotation) {
            Ok(track) => {
                tracks.insert(id, track);
            }
            Err(err) => {
                warn!(track = %id, error = %err, "skipping invalid persisted track");
            }
        }
    }
    if !tracks.is_empty() {
        info!(count = tracks.len(), "loaded persisted custom tracks");
    }
    tracks
}

fn revalidate(track: &Track, rotation: f32) -> Result<Track, TrackError> {
    Track::new(track.id.clone(), track.name.clone(), &track.rows, rotation)
}

fn persist(path: &Path, customs: &BTreeMap<String, Track>) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(&serde_json::to_vec_pretty(customs).map_err(std::io::Error::other)?)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}
