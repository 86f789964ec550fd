//! Streaming controller (C8): the per-session state machine that
//! drives a single client from `play` to `stream_end`.

use crate::crossfade::{xfade_sample_count, XfadeRing};
use crate::message::OutboundMessage;
use async_trait::async_trait;
use auralis_audio::LevelSmoother;
use auralis_cache::Cache;
use auralis_chunk::{ChunkRequest, TrackLibrary};
use auralis_core::{AuralisConfig, CacheKey, Error, FileSignature, Preset, Result, TierHint, TrackId};
use base64::Engine;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Ending,
    Cancelled,
    Error,
}

/// Abstraction over the duplex channel a session talks to. `auralis-server`
/// implements this over an axum WebSocket; nothing in this crate knows that.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one outbound message. Returns `false` if the peer is known to
    /// be gone (send failed) — the controller treats that as disconnection,
    /// not as an error to propagate.
    async fn send(&self, msg: OutboundMessage) -> bool;

    /// Best-effort liveness probe, checked before potentially-expensive work.
    fn is_connected(&self) -> bool;
}

/// Told about each chunk as the session advances through it, so the
/// background worker's notion of "current chunk" (priority 0/1) tracks
/// playback instead of staying pinned at the position `play`/`seek` started
/// from.
pub trait PlaybackObserver: Send + Sync {
    fn on_chunk_advance(&self, chunk_idx: u32);
}

pub struct StreamController {
    cache: Arc<Cache>,
    config: AuralisConfig,
    semaphore: Arc<Semaphore>,
    state: SessionState,
    xfade: XfadeRing,
    smoother: LevelSmoother,
    observer: Option<Arc<dyn PlaybackObserver>>,
}

impl StreamController {
    pub fn new(cache: Arc<Cache>, config: AuralisConfig, semaphore: Arc<Semaphore>) -> Self {
        let smoother = LevelSmoother::new(config_max_level_change(&config));
        Self {
            cache,
            config,
            semaphore,
            state: SessionState::Idle,
            xfade: XfadeRing::new(),
            smoother,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PlaybackObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs one full session: `start_stream` through `stream_end`/cancel/error.
    /// Every exit path clears the crossfade ring and releases the permit.
    pub async fn run_session(
        &mut self,
        library: &(dyn TrackLibrary),
        transport: &(dyn Transport),
        track_id: TrackId,
        preset: Preset,
        intensity: f64,
        start_chunk: u32,
    ) {
        self.state = SessionState::Starting;
        self.xfade.clear();
        self.smoother.reset();

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                // Short acquisition timeout (step 1): try a bounded
                // wait once before giving up, rather than failing instantly.
                match tokio::time::timeout(
                    std::time::Duration::from_millis(250),
                    self.semaphore.clone().acquire_owned(),
                )
               .await
                {
                    Ok(Ok(p)) => p,
                    _ => {
                        transport
                           .send(OutboundMessage::StreamError {
                                error: "server busy".into(),
                                recovery_position: None,
                                code: "busy".into(),
                            })
                           .await;
                        self.state = SessionState::Idle;
                        return;
                    }
                }
            }
        };

        let Some(track) = library.get_track(track_id).await else {
            transport
               .send(OutboundMessage::StreamError {
                    error: "track not found".into(),
                    recovery_position: None,
                    code: "not_found".into(),
                })
               .await;
            self.state = SessionState::Idle;
            drop(permit);
            return;
        };

        let header = match auralis_audio::open(std::path::Path::new(&track.file_path)) {
            Ok(h) => h,
            Err(e) => {
                transport
                   .send(OutboundMessage::StreamError {
                        error: e.to_string(),
                        recovery_position: None,
                        code: e.code.to_string(),
                    })
                   .await;
                self.state = SessionState::Idle;
                drop(permit);
                return;
            }
        };

        let geometry = auralis_geometry::ChunkGeometry::new(track.duration_s, header.sample_rate);
        let total_chunks = geometry.total_chunks() as u32;
        let signature = match FileSignature::for_path(&track.file_path) {
            Ok(sig) => sig,
            Err(e) => {
                transport
                   .send(OutboundMessage::StreamError {
                        error: e.to_string(),
                        recovery_position: None,
                        code: e.code.to_string(),
                    })
                   .await;
                self.state = SessionState::Idle;
                drop(permit);
                return;
            }
        };

        transport
           .send(OutboundMessage::StreamStart {
                track_id: track_id.0,
                preset: preset.to_string(),
                intensity,
                sample_rate: header.sample_rate,
                channels: header.channels,
                total_chunks,
                total_duration: track.duration_s,
                stream_type: "pcm_f32le",
            })
           .await;

        self.state = SessionState::Streaming;
        let xfade_len = xfade_sample_count(self.config.xfade_ms, header.sample_rate, header.channels);
        let mut total_samples: u64 = 0;

        for k in start_chunk.min(total_chunks)..total_chunks {
            // Liveness check 1 (outer).
            if !transport.is_connected() {
                self.state = SessionState::Cancelled;
                break;
            }

            if let Some(obs) = &self.observer {
                obs.on_chunk_advance(k);
            }

            let key = CacheKey::new(track_id, signature, preset, intensity, k);
            let pcm = match self.cache.get(&key) {
                Some((path, _tier)) => match read_cached_pcm(&path) {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        warn!(chunk = k, error = %e, "cache payload unreadable, reprocessing");
                        match self.process_and_cache(&track, signature, preset, intensity, k).await {
                            Ok(pcm) => pcm,
                            Err(e) => {
                                self.emit_chunk_error(transport, &e, k).await;
                                self.state = SessionState::Error;
                                break;
                            }
                        }
                    }
                },
                None => match self.process_and_cache(&track, signature, preset, intensity, k).await {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        self.emit_chunk_error(transport, &e, k).await;
                        self.state = SessionState::Error;
                        break;
                    }
                },
            };

            // Liveness check 2 (inner, TOCTOU fix): re-check before sending,
            // and before doing DSP work on any subsequent chunk.
            if !transport.is_connected() {
                self.state = SessionState::Cancelled;
                break;
            }

            let (mut smoothed, gain_db, adjusted) = self.smoother.smooth(&pcm, k as usize);
            if adjusted {
                debug!(chunk = k, gain_db, "level smoother adjusted chunk");
            }
            self.xfade.apply_and_store(&mut smoothed, xfade_len);

            total_samples += (smoothed.len() / header.channels.max(1) as usize) as u64;

            if !self
               .emit_chunk_frames(transport, &smoothed, k, total_chunks)
               .await
            {
                self.state = SessionState::Cancelled;
                break;
            }
        }

        if self.state == SessionState::Streaming {
            self.state = SessionState::Ending;
            transport
               .send(OutboundMessage::StreamEnd {
                    track_id: track_id.0,
                    total_samples,
                    duration: total_samples as f64 / header.sample_rate.max(1) as f64,
                })
               .await;
        }

        // Cleanup contract: every exit path clears the ring and drops the
        // permit (happens here via `drop(permit)` at function end).
        self.xfade.clear();
        self.state = SessionState::Idle;
        drop(permit);
    }

    async fn process_and_cache(
        &self,
        track: &auralis_core::TrackInfo,
        signature: FileSignature,
        preset: Preset,
        intensity: f64,
        chunk_idx: u32,
    ) -> Result<Vec<f32>> {
        let req = ChunkRequest {
            track,
            signature,
            preset,
            intensity,
            chunk_idx,
            cache_dir: self.cache.cache_dir(),
            wav_subtype: auralis_audio::WavSubtype::Pcm16,
        };
        let processed = auralis_chunk::process_chunk(req).await?;
        let size_bytes = (processed.pcm_core.len() * std::mem::size_of::<f32>()) as u64;
        let key = CacheKey::new(track.id, signature, preset, intensity, chunk_idx);
        let entry = auralis_cache::CacheEntry {
            key,
            payload_path: processed.cache_payload_path,
            sample_rate: processed.sample_rate,
            channels: processed.channels,
            sample_count: (processed.pcm_core.len() / processed.channels.max(1) as usize) as u64,
            size_bytes,
            created_at: 0,
            last_access_at: 0,
            access_count: 0,
            tier: auralis_core::Tier::Hot,
            probability: 1.0,
        };
        if let Err(e) = self.cache.try_put(entry, TierHint::Auto) {
            warn!(error = %e, "immediate chunk could not be cached, continuing un-cached");
        }
        Ok(processed.pcm_core)
    }

    async fn emit_chunk_error(&self, transport: &(dyn Transport), e: &Error, k: u32) {
        if !e.is_chunk_recoverable() {
            return;
        }
        let recovery_position = k as f64 * self.config.chunk_interval_s;
        transport
           .send(OutboundMessage::StreamError {
                error: e.to_string(),
                recovery_position: Some(recovery_position),
                code: e.code.to_string(),
            })
           .await;
    }

    /// Frames PCM into `stream_frame_samples`-sized sub-messages and pushes
    /// them through the transport one at a time (the bounded send queue
    /// itself lives in the transport implementation). Returns `false` the
    /// moment a send fails, signalling disconnection.
    async fn emit_chunk_frames(
        &self,
        transport: &(dyn Transport),
        pcm: &[f32],
        chunk_index: u32,
        total_chunks: u32,
    ) -> bool {
        let frame_samples = self.config.stream_frame_samples.max(1);
        let mut frame_index = 0u32;
        for frame in pcm.chunks(frame_samples) {
            let bytes: Vec<u8> = frame.iter().flat_map(|s| s.to_le_bytes()).collect();
            let samples_b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
            let ok = transport
               .send(OutboundMessage::AudioChunk {
                    chunk_index,
                    frame_index,
                    total_chunks,
                    samples_b64,
                    sample_count: frame.len(),
                })
               .await;
            if !ok {
                return false;
            }
            frame_index += 1;
        }
        true
    }
}

fn config_max_level_change(config: &AuralisConfig) -> f64 {
    config.max_level_change_db
}

fn read_cached_pcm(path: &std::path::Path) -> Result<Vec<f32>> {
    let header = auralis_audio::open(path)?;
    let (pcm, _) = auralis_audio::read_range(path, 0, header.frame_count, false)?;
    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auralis_core::TrackInfo;
    use parking_lot::Mutex;
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

    struct RecordingTransport {
        sent: Mutex<Vec<OutboundMessage>>,
        connected: std::sync::atomic::AtomicBool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                connected: std::sync::atomic::AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, msg: OutboundMessage) -> bool {
            self.sent.lock().push(msg);
            true
        }
        fn is_connected(&self) -> bool {
            self.connected.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    fn write_fixture(path: &std::path::Path, seconds: f64, sample_rate: u32) {
        let n = (seconds * sample_rate as f64) as usize;
        let samples: Vec<f32> = (0..n * 2).map(|i| ((i as f32) * 0.001).sin() * 0.3).collect();
        auralis_audio::write_wav(path, &samples, sample_rate, 2, auralis_audio::WavSubtype::Pcm16).unwrap();
    }

    #[tokio::test]
    async fn full_session_emits_start_chunks_and_end() {
        let dir = tempdir().unwrap();
        let track_path = dir.path().join("t.wav");
        write_fixture(&track_path, 40.0, 44100);
        let cache_dir = dir.path().join("cache");

        let track = TrackInfo {
            id: TrackId(1),
            file_path: track_path.to_string_lossy().into_owned(),
            duration_s: 40.0,
        };
        let cache = Arc::new(Cache::bootstrap(&cache_dir, 50_000_000, 50_000_000).unwrap());
        let library = FixtureLibrary { track };
        let config = AuralisConfig::default();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_streams));
        let mut controller = StreamController::new(cache, config, semaphore);
        let transport = RecordingTransport::new();

        controller
           .run_session(&library, &transport, TrackId(1), Preset::Adaptive, 1.0, 0)
           .await;

        let sent = transport.sent.lock();
        assert!(matches!(sent.first(), Some(OutboundMessage::StreamStart {.. })));
        assert!(matches!(sent.last(), Some(OutboundMessage::StreamEnd {.. })));
        assert!(sent
           .iter()
           .any(|m| matches!(m, OutboundMessage::AudioChunk {.. })));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn disconnect_mid_stream_ends_without_stream_end() {
        let dir = tempdir().unwrap();
        let track_path = dir.path().join("t.wav");
        write_fixture(&track_path, 40.0, 44100);
        let cache_dir = dir.path().join("cache");

        let track = TrackInfo {
            id: TrackId(1),
            file_path: track_path.to_string_lossy().into_owned(),
            duration_s: 40.0,
        };
        let cache = Arc::new(Cache::bootstrap(&cache_dir, 50_000_000, 50_000_000).unwrap());
        let library = FixtureLibrary { track };
        let config = AuralisConfig::default();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_streams));
        let mut controller = StreamController::new(cache, config, semaphore);
        let transport = RecordingTransport::new();
        transport.connected.store(false, std::sync::atomic::Ordering::SeqCst);

        controller
           .run_session(&library, &transport, TrackId(1), Preset::Adaptive, 1.0, 0)
           .await;

        let sent = transport.sent.lock();
        assert!(!sent
           .iter()
           .any(|m| matches!(m, OutboundMessage::StreamEnd {.. })));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn unknown_track_emits_not_found_and_releases_permit() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let track = TrackInfo {
            id: TrackId(1),
            file_path: "unused".into(),
            duration_s: 10.0,
        };
        let cache = Arc::new(Cache::bootstrap(&cache_dir, 50_000_000, 50_000_000).unwrap());
        let library = FixtureLibrary { track };
        let config = AuralisConfig::default();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_streams));
        let mut controller = StreamController::new(cache, config, semaphore.clone());
        let transport = RecordingTransport::new();

        controller
           .run_session(&library, &transport, TrackId(99), Preset::Adaptive, 1.0, 0)
           .await;

        let sent = transport.sent.lock();
        assert!(matches!(
            sent.last(),
            Some(OutboundMessage::StreamError { code,.. }) if code == "not_found"
        ));
        assert_eq!(semaphore.available_permits(), config.max_concurrent_streams);
    }
}
