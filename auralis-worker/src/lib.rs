//! Background cache worker (C7).
//!
//! A single long-running task that wakes on a fixed interval, computes which
//! cache keys the currently-playing track is missing, and materializes a
//! strictly bounded number of them per wake through [`auralis_chunk::process_chunk`].
//! It never blocks or cancels a streaming session: every wake, it does a
//! small bounded amount of work and yields back to the scheduler.

use async_trait::async_trait;
use auralis_cache::Cache;
use auralis_chunk::{ChunkRequest, TrackLibrary};
use auralis_core::{AuralisConfig, CacheKey, FileSignature, Preset, TierHint, TrackId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// `predict_next_presets` (Priority 2): an external collaborator,
/// opaque to the worker itself.
#[async_trait]
pub trait PresetPredictor: Send + Sync {
    async fn predict_next_presets(&self, current: Preset) -> Vec<(Preset, f64)>;
}

/// A predictor with no opinion; Priority 2 degenerates to a no-op.
pub struct NoPredictions;

#[async_trait]
impl PresetPredictor for NoPredictions {
    async fn predict_next_presets(&self, _current: Preset) -> Vec<(Preset, f64)> {
        Vec::new()
    }
}

/// What's currently playing, as reported by the streaming controller. The
/// worker treats this as read-only state it polls; it never mutates it.
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub track_id: TrackId,
    pub signature: FileSignature,
    pub file_path: String,
    pub duration_s: f64,
    pub preset: Preset,
    pub intensity: f64,
    pub current_chunk: u32,
    pub total_chunks: u32,
}

/// Throughput knob the memory monitor (C9) adjusts: 1.0 normal, 0.5 under
/// critical pressure, 0.0 (paused) under emergency pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Throughput {
    Normal,
    Reduced,
    Paused,
}

impl Throughput {
    fn wake_multiplier(self) -> u32 {
        match self {
            Throughput::Normal => 1,
            Throughput::Reduced => 2,
            Throughput::Paused => 0,
        }
    }
}

struct PriorityWork {
    key: CacheKey,
    priority: usize,
}

pub struct Worker<L: TrackLibrary> {
    cache: Arc<Cache>,
    library: Arc<L>,
    predictor: Arc<dyn PresetPredictor>,
    config: AuralisConfig,
    playback: Mutex<Option<PlaybackSnapshot>>,
    paused: AtomicBool,
    throughput: Mutex<Throughput>,
    wake_count: AtomicU32,
}

impl<L: TrackLibrary> Worker<L> {
    pub fn new(
        cache: Arc<Cache>,
        library: Arc<L>,
        predictor: Arc<dyn PresetPredictor>,
        config: AuralisConfig,
    ) -> Self {
        Self {
            cache,
            library,
            predictor,
            config,
            playback: Mutex::new(None),
            paused: AtomicBool::new(false),
            throughput: Mutex::new(Throughput::Normal),
            wake_count: AtomicU32::new(0),
        }
    }

    pub fn set_playback(&self, snapshot: Option<PlaybackSnapshot>) {
        *self.playback.lock() = snapshot;
    }

    /// Updates just the current chunk of the in-flight playback, so the
    /// worker's priority 0/1 window (current±next) tracks the stream as it
    /// advances instead of staying pinned at the chunk `set_playback` was
    /// last called with. A no-op if `track_id` no longer matches (the
    /// session has since moved on).
    pub fn advance_chunk(&self, track_id: TrackId, chunk_idx: u32) {
        let mut guard = self.playback.lock();
        if let Some(snapshot) = guard.as_mut() {
            if snapshot.track_id == track_id {
                snapshot.current_chunk = chunk_idx;
            }
        }
    }

    /// Pausable from outside: completes the current item, then
    /// idles on subsequent wakes until resumed.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_throughput(&self, t: Throughput) {
        *self.throughput.lock() = t;
        if t == Throughput::Paused {
            self.pause();
        } else if self.is_paused() && t != Throughput::Paused {
            self.resume();
        }
    }

    /// Runs forever, waking every `worker_check_interval_s` (scaled by the
    /// current throughput setting). Intended to be spawned as its own task.
    pub async fn run(self: Arc<Self>) {
        loop {
            let throughput = *self.throughput.lock();
            let multiplier = throughput.wake_multiplier().max(1);
            tokio::time::sleep(self.config.worker_check_interval() * multiplier).await;
            self.wake_count.fetch_add(1, Ordering::Relaxed);

            if self.is_paused() {
                continue;
            }
            if let Err(e) = self.tick().await {
                warn!(error = %e, "worker tick failed");
            }
        }
    }

    /// One wake: compute missing work, process a bounded slice of it. Public
    /// so tests (and a future manual "prime the cache" admin hook) can drive
    /// a single pass without waiting on the timer.
    pub async fn tick(&self) -> auralis_core::Result<()> {
        let snapshot = { self.playback.lock().clone() };
        let Some(snapshot) = snapshot else {
            return Ok(());
        };

        let mut work = self.compute_missing(&snapshot);
        work.extend(self.compute_predicted(&snapshot).await);

        // Priority 3/4 fill only runs when priority 0/1/2 found nothing to
        // do this wake — the queue must be otherwise idle.
        if work.is_empty() {
            work.extend(self.compute_fill(&snapshot));
        }

        let mut did_p01 = false;
        let mut did_p34 = 0usize;

        for item in work {
            if item.priority <= 1 {
                if did_p01 {
                    continue;
                }
                did_p01 = true;
            } else if item.priority >= 3 {
                if did_p34 >= 2 {
                    continue;
                }
                did_p34 += 1;
            }
            // Priority 2 has no explicit per-wake cap beyond "up to two
            // predicted presets", which `compute_missing` already bounds.

            self.process_one(&snapshot, item).await;

            if did_p01 && did_p34 >= 2 {
                break;
            }
        }
        Ok(())
    }

    async fn process_one(&self, snapshot: &PlaybackSnapshot, item: PriorityWork) {
        let Some(track) = self.library.get_track(snapshot.track_id).await else {
            return;
        };
        let timeout = self.config.priority_timeout(item.priority);
        let cache_dir = self.cache.cache_dir().to_path_buf();

        let req = ChunkRequest {
            track: &track,
            signature: item.key.signature,
            preset: item.key.preset,
            intensity: item.key.intensity.as_f64(),
            chunk_idx: item.key.chunk_idx,
            cache_dir: &cache_dir,
            wav_subtype: auralis_audio::WavSubtype::Pcm16,
        };

        let result = tokio::time::timeout(timeout, auralis_chunk::process_chunk(req)).await;
        match result {
            Ok(Ok(processed)) => {
                let size_bytes = (processed.pcm_core.len() * std::mem::size_of::<f32>()) as u64;
                let entry = auralis_cache::CacheEntry {
                    key: item.key,
                    payload_path: processed.cache_payload_path,
                    sample_rate: processed.sample_rate,
                    channels: processed.channels,
                    sample_count: (processed.pcm_core.len() / processed.channels.max(1) as usize) as u64,
                    size_bytes,
                    created_at: 0,
                    last_access_at: 0,
                    access_count: 0,
                    tier: if item.priority <= 2 { auralis_core::Tier::Hot } else { auralis_core::Tier::Warm },
                    probability: 1.0,
                };
                let hint = if item.priority <= 2 {
                    TierHint::Explicit(auralis_core::Tier::Hot)
                } else {
                    TierHint::Explicit(auralis_core::Tier::Warm)
                };
                if let Err(e) = self.cache.try_put(entry, hint) {
                    warn!(error = %e, key = %item.key, "worker could not cache materialized chunk");
                }
            }
            Ok(Err(e)) => {
                debug!(key = %item.key, error = %e, "worker chunk failed, skipping");
            }
            Err(_) => {
                // Timeout: "drops the work item silently".
            }
        }
    }

    fn compute_missing(&self, s: &PlaybackSnapshot) -> Vec<PriorityWork> {
        let mut out = Vec::new();
        let mut want = |priority: usize, preset: Preset, chunk_idx: u32| {
            if chunk_idx >= s.total_chunks {
                return;
            }
            let key = CacheKey::new(s.track_id, s.signature, preset, s.intensity, chunk_idx);
            if !self.cache.contains(&key).0 {
                out.push(PriorityWork { key, priority });
            }
        };

        // Priority 0/1: original + processed for current and current+1.
        want(0, Preset::None, s.current_chunk);
        want(0, s.preset, s.current_chunk);
        want(1, Preset::None, s.current_chunk + 1);
        want(1, s.preset, s.current_chunk + 1);

        out
    }

    /// Priority 2 needs the async predictor, so it's computed separately and
    /// folded into the same bounded dispatch in `tick`.
    async fn compute_predicted(&self, s: &PlaybackSnapshot) -> Vec<PriorityWork> {
        let predictions = self.predictor.predict_next_presets(s.preset).await;
        let mut out = Vec::new();
        for (preset, _score) in predictions.into_iter().take(2) {
            for chunk_idx in [s.current_chunk, s.current_chunk + 1] {
                if chunk_idx >= s.total_chunks {
                    continue;
                }
                let key = CacheKey::new(s.track_id, s.signature, preset, s.intensity, chunk_idx);
                if !self.cache.contains(&key).0 {
                    out.push(PriorityWork { key, priority: 2 });
                }
            }
        }
        out
    }

    fn compute_fill(&self, s: &PlaybackSnapshot) -> Vec<PriorityWork> {
        let mut out = Vec::new();
        // Priority 3: Tier 2 fill for the current preset, current+2..current+9.
        for chunk_idx in (s.current_chunk + 2)..=(s.current_chunk + 9) {
            if chunk_idx >= s.total_chunks {
                break;
            }
            let key = CacheKey::new(s.track_id, s.signature, s.preset, s.intensity, chunk_idx);
            if !self.cache.contains(&key).0 {
                out.push(PriorityWork { key, priority: 3 });
            }
        }
        // Priority 4: Tier 2 fill of originals for all remaining chunks.
        for chunk_idx in 0..s.total_chunks {
            let key = CacheKey::new(s.track_id, s.signature, Preset::None, s.intensity, chunk_idx);
            if !self.cache.contains(&key).0 {
                out.push(PriorityWork { key, priority: 4 });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auralis_core::TrackInfo;
    use std::path::Path;
    use tempfile::tempdir;

    struct FixtureLibrary {
        track: TrackInfo,
    }

    #[async_trait]
    impl TrackLibrary for FixtureLibrary {
        async fn get_track(&self, id: TrackId) -> Option<TrackInfo> {
            if id == self.track.id {
                Some(self.track.clone())
            } else {
                None
            }
        }
    }

    fn write_fixture(path: &Path, seconds: f64, sample_rate: u32) {
        let n = (seconds * sample_rate as f64) as usize;
        let samples: Vec<f32> = (0..n * 2).map(|i| ((i as f32) * 0.001).sin() * 0.3).collect();
        auralis_audio::write_wav(path, &samples, sample_rate, 2, auralis_audio::WavSubtype::Pcm16).unwrap();
    }

    #[tokio::test]
    async fn one_tick_materializes_priority_0_and_1() {
        let dir = tempdir().unwrap();
        let track_path = dir.path().join("t.wav");
        write_fixture(&track_path, 40.0, 44100);
        let cache_dir = dir.path().join("cache");

        let track = TrackInfo {
            id: TrackId(1),
            file_path: track_path.to_string_lossy().into_owned(),
            duration_s: 40.0,
        };
        let signature = FileSignature::compute(&track.file_path, 1, std::time::SystemTime::UNIX_EPOCH);

        let cache = Arc::new(Cache::bootstrap(&cache_dir, 10_000_000, 10_000_000).unwrap());
        let library = Arc::new(FixtureLibrary { track });
        let config = AuralisConfig::default();
        let worker = Arc::new(Worker::new(cache.clone(), library, Arc::new(NoPredictions), config));

        worker.set_playback(Some(PlaybackSnapshot {
            track_id: TrackId(1),
            signature,
            file_path: String::new(),
            duration_s: 40.0,
            preset: Preset::Adaptive,
            intensity: 1.0,
            current_chunk: 0,
            total_chunks: 4,
        }));

        worker.tick().await.unwrap();

        let original_key = CacheKey::new(TrackId(1), signature, Preset::None, 1.0, 0);
        assert!(cache.contains(&original_key).0);
    }

    #[tokio::test]
    async fn pausing_stops_materialization() {
        let dir = tempdir().unwrap();
        let track_path = dir.path().join("t.wav");
        write_fixture(&track_path, 40.0, 44100);
        let cache_dir = dir.path().join("cache");

        let track = TrackInfo {
            id: TrackId(1),
            file_path: track_path.to_string_lossy().into_owned(),
            duration_s: 40.0,
        };
        let signature = FileSignature::compute(&track.file_path, 1, std::time::SystemTime::UNIX_EPOCH);

        let cache = Arc::new(Cache::bootstrap(&cache_dir, 10_000_000, 10_000_000).unwrap());
        let library = Arc::new(FixtureLibrary { track });
        let config = AuralisConfig::default();
        let worker = Arc::new(Worker::new(cache.clone(), library, Arc::new(NoPredictions), config));
        worker.pause();

        worker.set_playback(Some(PlaybackSnapshot {
            track_id: TrackId(1),
            signature,
            file_path: String::new(),
            duration_s: 40.0,
            preset: Preset::Adaptive,
            intensity: 1.0,
            current_chunk: 0,
            total_chunks: 4,
        }));

        assert!(worker.is_paused());
        assert_eq!(cache.stats().tier1_size_bytes, 0);
    }
}
