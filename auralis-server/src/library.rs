//! Minimal library collaborator: scans a
//! directory of WAV files once at startup and serves `get_track` lookups
//! from an in-memory table. Anything beyond this (a real metadata database,
//! fingerprinting, tagging) is out of scope.

use async_trait::async_trait;
use auralis_chunk::TrackLibrary;
use auralis_core::{TrackId, TrackInfo};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

pub struct DirectoryLibrary {
    tracks: HashMap<TrackId, TrackInfo>,
}

impl DirectoryLibrary {
    pub fn scan(dir: &Path) -> std::io::Result<Self> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
          .filter_map(|e| e.ok())
          .filter(|e| e.path().extension().map(|ext| ext == "wav").unwrap_or(false))
          .collect();
        entries.sort_by_key(|e| e.file_name());

        let mut tracks = HashMap::new();
        for (i, entry) in entries.into_iter().enumerate() {
            let path = entry.path();
            let id = TrackId((i + 1) as u64);
            match auralis_audio::open(&path) {
                Ok(header) => {
                    let duration_s = header.frame_count as f64 / header.sample_rate.max(1) as f64;
                    tracks.insert(
                        id,
                        TrackInfo {
                            id,
                            file_path: path.to_string_lossy().into_owned(),
                            duration_s,
                        },
                    );
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable track"),
            }
        }
        Ok(Self { tracks })
    }
}

#[async_trait]
impl TrackLibrary for DirectoryLibrary {
    async fn get_track(&self, id: TrackId) -> Option<TrackInfo> {
        self.tracks.get(&id).cloned()
    }
}
