//! Chunk processor (C5): composes geometry (C1), I/O (C2) and DSP (C3) into
//! a single `process_chunk` entry point. Level smoothing (C4) is applied
//! downstream by the streaming controller, not here — see `process_chunk`'s
//! docs.

use async_trait::async_trait;
use auralis_core::{CacheKey, Error, FileSignature, Preset, Result, TrackId, TrackInfo};
use auralis_geometry::ChunkGeometry;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Library abstraction exposing `get_track`. The core never opens the
/// filesystem by user-provided paths; every path is resolved through here.
#[async_trait]
pub trait TrackLibrary: Send + Sync {
    async fn get_track(&self, id: TrackId) -> Option<TrackInfo>;
}

/// Output of [`process_chunk`]: the emitted core PCM plus the path its WAV
/// payload was written to (the cache's responsibility to register).
pub struct ProcessedChunk {
    pub pcm_core: Vec<f32>,
    pub cache_payload_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Per-call knobs that don't belong in the cache key.
pub struct ChunkRequest<'a> {
    pub track: &'a TrackInfo,
    pub signature: FileSignature,
    pub preset: Preset,
    pub intensity: f64,
    pub chunk_idx: u32,
    pub cache_dir: &'a Path,
    pub wav_subtype: auralis_audio::WavSubtype,
}

/// `process_chunk(track, preset, intensity, k)`.
///
/// A pure function of `(track_signature, preset, intensity, k)` — the cache
/// payload this writes is sessionless.
/// Level smoothing (C4) is *not* applied here: it depends on a session's
/// playback history, so applying it before the cache write would taint the
/// payload for every other session and for the worker's pre-materialized
/// chunks. The streaming controller (C8) applies it itself, after
/// retrieving a chunk's core PCM from either this function or a cache hit.
pub async fn process_chunk(req: ChunkRequest<'_>) -> Result<ProcessedChunk> {
    let header = auralis_audio::open(Path::new(&req.track.file_path))?;
    let geometry = ChunkGeometry::new(req.track.duration_s, header.sample_rate);

    let (load_start, load_end, _core_start, _core_end) =
        geometry.boundaries_samples(req.chunk_idx as usize, true);
    let (trim_start, trim_end) = geometry.context_trim_samples(req.chunk_idx as usize);
    let load_frames = (load_end - load_start) as u64;

    let (buffer, read_header) = auralis_audio::read_range(
        Path::new(&req.track.file_path),
        load_start as u64,
        load_frames,
        false,
    )?;
    let channels = read_header.channels;
    let total_frames = buffer.len() / channels.max(1) as usize;

    let core_range = trim_start..total_frames.saturating_sub(trim_end);

    let processed = if req.preset.is_none() {
        buffer
    } else {
        let preset = req.preset;
        let intensity = req.intensity;
        let sample_rate = header.sample_rate;
        let range = core_range.clone();
        tokio::task::spawn_blocking(move || {
            auralis_audio::process(&buffer, channels, sample_rate, preset, intensity, range)
        })
       .await
       .map_err(|e| Error::dsp(format!("DSP task panicked: {e}")))??
    };

    // 4. Slice to the core region (drop leading/trailing context).
    let channels_usize = channels.max(1) as usize;
    let core_pcm: Vec<f32> =
        processed[core_range.start * channels_usize..core_range.end * channels_usize].to_vec();

    // 5. Encode to WAV at the cache-key-derived path.
    let key = CacheKey::new(
        req.track.id,
        req.signature,
        req.preset,
        req.intensity,
        req.chunk_idx,
    );
    let cache_payload_path = req.cache_dir.join(key.file_name());
    if let Err(e) = auralis_audio::write_wav(
        &cache_payload_path,
        &core_pcm,
        header.sample_rate,
        channels,
        req.wav_subtype,
    ) {
        let _ = std::fs::remove_file(&cache_payload_path);
        warn!(chunk = req.chunk_idx, error = %e, "encode failed, removing partial payload");
        return Err(e);
    }

    Ok(ProcessedChunk {
        pcm_core: core_pcm,
        cache_payload_path,
        sample_rate: header.sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_fixture(path: &Path, seconds: f64, sample_rate: u32) {
        let n = (seconds * sample_rate as f64) as usize;
        let samples: Vec<f32> = (0..n * 2)
           .map(|i| ((i as f32) * 0.001).sin() * 0.3)
           .collect();
        auralis_audio::write_wav(path, &samples, sample_rate, 2, auralis_audio::WavSubtype::Pcm16)
           .unwrap();
    }

    #[tokio::test]
    async fn process_chunk_is_deterministic_without_smoothing() {
        let dir = tempdir().unwrap();
        let track_path = dir.path().join("track.wav");
        write_fixture(&track_path, 18.0, 44100);

        let track = TrackInfo {
            id: TrackId(1),
            file_path: track_path.to_string_lossy().into_owned(),
            duration_s: 18.0,
        };
        let signature = FileSignature::compute(&track.file_path, 1000, std::time::SystemTime::UNIX_EPOCH);
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();

        let req_a = ChunkRequest {
            track: &track,
            signature,
            preset: Preset::Adaptive,
            intensity: 1.0,
            chunk_idx: 0,
            cache_dir: &cache_dir,
            wav_subtype: auralis_audio::WavSubtype::Pcm16,
        };
        let a = process_chunk(req_a).await.unwrap();

        let req_b = ChunkRequest {
            track: &track,
            signature,
            preset: Preset::Adaptive,
            intensity: 1.0,
            chunk_idx: 0,
            cache_dir: &cache_dir,
            wav_subtype: auralis_audio::WavSubtype::Pcm16,
        };
        let b = process_chunk(req_b).await.unwrap();

        assert_eq!(a.pcm_core, b.pcm_core);
    }

    #[tokio::test]
    async fn process_chunk_skips_dsp_for_none_preset() {
        let dir = tempdir().unwrap();
        let track_path = dir.path().join("track.wav");
        write_fixture(&track_path, 18.0, 44100);

        let track = TrackInfo {
            id: TrackId(1),
            file_path: track_path.to_string_lossy().into_owned(),
            duration_s: 18.0,
        };
        let signature = FileSignature::compute(&track.file_path, 1000, std::time::SystemTime::UNIX_EPOCH);
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();

        let req = ChunkRequest {
            track: &track,
            signature,
            preset: Preset::None,
            intensity: 1.0,
            chunk_idx: 0,
            cache_dir: &cache_dir,
            wav_subtype: auralis_audio::WavSubtype::Pcm16,
        };
        let result = process_chunk(req).await.unwrap();
        assert!(result.cache_payload_path.exists());
    }
}
