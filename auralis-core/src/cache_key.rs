//! Cache key and tier types.

use crate::preset::Preset;
use crate::track::{FileSignature, TrackId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Intensity quantized to 2 decimal places, so near-identical user
/// settings collide deterministically. Stored as an integer in
/// hundredths so the key can derive `Eq`/`Hash` without float pitfalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuantizedIntensity(u16);

impl QuantizedIntensity {
    pub fn quantize(intensity: f64) -> Self {
        let clamped = intensity.clamp(0.0, 1.0);
        Self((clamped * 100.0).round() as u16)
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for QuantizedIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

/// `(track_id, signature, preset_or_none, intensity_quantized, chunk_idx)`.
/// `preset = None` is a distinct entry from any named preset even for
/// identical underlying audio — it denotes the unprocessed
/// original chunk, not "no particular preset requested".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub track_id: TrackId,
    pub signature: FileSignature,
    pub preset: Preset,
    pub intensity: QuantizedIntensity,
    pub chunk_idx: u32,
}

impl CacheKey {
    pub fn new(
        track_id: TrackId,
        signature: FileSignature,
        preset: Preset,
        intensity: f64,
        chunk_idx: u32,
    ) -> Self {
        Self {
            track_id,
            signature,
            preset,
            intensity: QuantizedIntensity::quantize(intensity),
            chunk_idx,
        }
    }

    pub fn is_original(&self) -> bool {
        self.preset.is_none()
    }

    /// File name, following the cache payload layout:
    /// `track_{id}_{signature}_{preset_or_none}_{intensity}_chunk_{k}.wav`.
    pub fn file_name(&self) -> String {
        format!(
            "track_{}_{}_{}_{}_chunk_{}.wav",
            self.track_id, self.signature, self.preset, self.intensity, self.chunk_idx
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Which hierarchy level a cache entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Hot: per-track current±next, LRU within the tier, cleared whole on
    /// track change.
    Hot,
    /// Warm: full current+previous track, cross-track LRU, current track
    /// pinned against eviction.
    Warm,
}

/// Routing hint for `Cache::put`: `Auto` computes `Hot` vs `Warm`
/// from the key and the cache's notion of "current" playback state;
/// `Explicit` pins the tier regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierHint {
    Auto,
    Explicit(Tier),
}
