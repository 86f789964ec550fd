//! Equal-power boundary crossfade: the first `XFADE_MS` of a new
//! chunk is blended with the stored tail of the previous one using a
//! `sin`/`cos` curve, so the two chunks' core regions (which are
//! non-overlapping by design) join without an audible seam.

use std::f32::consts::FRAC_PI_2;

/// Samples to keep as "tail" / blend at the head of the next chunk, given a
/// crossfade duration and sample rate. Interleaved-sample count, not frames.
pub fn xfade_sample_count(xfade_ms: u64, sample_rate: u32, channels: u16) -> usize {
    let frames = (xfade_ms as f64 / 1000.0 * sample_rate as f64).round() as usize;
    frames * channels.max(1) as usize
}

/// Blends `tail` (the end of the previous chunk) into the start of `head`
/// (the new chunk) in place. Both slices must be the same length — callers
/// clamp to `tail.len().min(head.len())` before calling.
pub fn equal_power_blend(tail: &[f32], head: &mut [f32]) {
    let n = tail.len().min(head.len());
    if n == 0 {
        return;
    }
    for i in 0..n {
        let t = i as f32 / n as f32;
        let fade_out = (t * FRAC_PI_2).cos();
        let fade_in = (t * FRAC_PI_2).sin();
        head[i] = tail[i] * fade_out + head[i] * fade_in;
    }
}

/// Per-session crossfade state: just the last `xfade_len` interleaved
/// samples of the most recently emitted chunk. Cleared on session end or
/// error.
#[derive(Debug, Default)]
pub struct XfadeRing {
    tail: Option<Vec<f32>>,
}

impl XfadeRing {
    pub fn new() -> Self {
        Self { tail: None }
    }

    /// Applies the stored tail (if any) to the start of `chunk`, then stores
    /// `chunk`'s own tail for next time.
    pub fn apply_and_store(&mut self, chunk: &mut [f32], xfade_len: usize) {
        if let Some(tail) = &self.tail {
            equal_power_blend(tail, chunk);
        }
        let start = chunk.len().saturating_sub(xfade_len);
        self.tail = Some(chunk[start..].to_vec());
    }

    pub fn clear(&mut self) {
        self.tail = None;
    }
}
