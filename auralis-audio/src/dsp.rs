//! DSP stage orchestration (C3): content analysis, preset interpolation,
//! content modifiers, then the signal path of EQ, dynamics and limiting.
//!
//! `Preset::None` is handled by the caller (chunk processor, C5) skipping
//! this module entirely; [`process`] always assumes a real preset.

use crate::{content_modifiers, dynamics, eq, limiter::Limiter};
use auralis_core::preset as preset_mod;
use auralis_core::{Error, Preset, Result};
use std::ops::Range;

const EPSILON: f64 = 1e-10;
const LIMITER_LOOKAHEAD_MS: f64 = 1.5;

fn deinterleave(buffer: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let channels = channels as usize;
    let mut out = vec![Vec::with_capacity(buffer.len() / channels); channels];
    for frame in buffer.chunks_exact(channels) {
        for (c, &s) in frame.iter().enumerate() {
            out[c].push(s);
        }
    }
    out
}

fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    if channels.is_empty() {
        return Vec::new();
    }
    let n_frames = channels[0].len();
    let n_channels = channels.len();
    let mut out = Vec::with_capacity(n_frames * n_channels);
    for i in 0..n_frames {
        for ch in channels {
            out.push(ch[i]);
        }
    }
    out
}

fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Runs the full C3 signal path on an interleaved, in-context PCM buffer.
///
/// `core_frame_range` identifies, in frames, the region of `buffer` that is
/// the chunk's *core* (context trimmed away) — used only by the final gain
/// stage to measure RMS against the core region. The whole
/// buffer (including context) is returned, gain-adjusted identically
/// end-to-end so the context stays coherent for any caller that still needs
/// it (e.g. a future overlap computation).
pub fn process(
    buffer: &[f32],
    channels: u16,
    sample_rate: u32,
    preset: Preset,
    intensity: f64,
    core_frame_range: Range<usize>,
) -> Result<Vec<f32>> {
    if preset.is_none() {
        return Err(Error::dsp("process() called with Preset::None"));
    }
    if buffer.iter().any(|s| !s.is_finite()) {
        return Err(Error::dsp("non-finite sample in input buffer"));
    }
    let intensity = intensity.clamp(0.0, 1.0);

    let position = crate::analysis::analyze(buffer, channels, sample_rate);
    let (mut params, _weights) = preset_mod::interpolate(&position, preset);
    let (_, preset_params) = preset.anchor();
    params = content_modifiers::apply_content_modifiers(
        params,
        &position,
        preset_params.output_target_rms,
    );

    // Intensity scales every stage uniformly: at intensity 0 the chunk
    // passes through unmodified bar the final RMS target, which still
    // applies (it isn't an "effect", it's loudness matching).
    params.eq_intensity *= intensity;
    params.dynamics_intensity *= intensity;

    let mut deinterleaved = deinterleave(buffer, channels);

    // 1. Input gain.
    if params.input_gain != 0.0 {
        let gain_linear = (10f64.powf(params.input_gain / 20.0) * intensity
            + (1.0 - intensity))
           .max(0.0) as f32;
        for channel in deinterleaved.iter_mut() {
            for s in channel.iter_mut() {
                *s *= gain_linear;
            }
        }
    }

    // 2. Parallel shelf/band EQ.
    for channel in deinterleaved.iter_mut() {
        *channel = eq::apply_parallel_eq(channel, &params, sample_rate);
    }

    // 3. Compressor xor expander.
    for channel in deinterleaved.iter_mut() {
        *channel = if params.expansion_amount > 0.0 {
            dynamics::expand(
                channel,
                params.limiter_threshold - 10.0,
                1.0 + params.expansion_amount * 3.0,
                params.expansion_amount * intensity,
            )
        } else {
            dynamics::compress(
                channel,
                params.compression_ratio,
                params.compression_threshold,
                params.compression_amount * intensity,
            )
        };
    }

    // 4. True-peak limiter.
    let limiter = Limiter::new(params.limiter_threshold, sample_rate, LIMITER_LOOKAHEAD_MS);
    for channel in deinterleaved.iter_mut() {
        *channel = limiter.apply(channel, params.limiter_amount * intensity);
    }

    // 5. Final gain to the target RMS, measured over the core region only.
    let core_rms = core_region_rms(&deinterleaved, &core_frame_range);
    if core_rms > EPSILON {
        let core_rms_db = 20.0 * (core_rms + EPSILON).log10();
        let gain_db = params.output_target_rms - core_rms_db;
        let gain_linear = 10f64.powf(gain_db / 20.0) as f32;
        for channel in deinterleaved.iter_mut() {
            for s in channel.iter_mut() {
                *s *= gain_linear;
            }
        }
    }

    let out = interleave(&deinterleaved);
    if out.iter().any(|s| !s.is_finite()) {
        return Err(Error::dsp("non-finite sample produced by DSP stage"));
    }
    Ok(out)
}

fn core_region_rms(channels: &[Vec<f32>], core_frame_range: &Range<usize>) -> f64 {
    let mut sum_sq = 0.0f64;
    let mut count = 0usize;
    for channel in channels {
        let end = core_frame_range.end.min(channel.len());
        let start = core_frame_range.start.min(end);
        for &s in &channel[start..end] {
            sum_sq += (s as f64) * (s as f64);
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as f64).sqrt()
}

/// Convenience: derive the core frame range within a context-inclusive
/// buffer of `total_frames` from chunk geometry, for callers that already
/// have a [`auralis_geometry::ChunkGeometry`] at hand.
pub fn core_frame_range_from_geometry(
    geometry: &auralis_geometry::ChunkGeometry,
    k: usize,
    total_frames: usize,
) -> Range<usize> {
    let (trim_start, trim_end) = geometry.context_trim_samples(k);
    let end = total_frames.saturating_sub(trim_end);
    trim_start.min(end)..end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_buffer(n_frames: usize, channels: u16) -> Vec<f32> {
        (0..n_frames * channels as usize)
           .map(|i| ((i as f32) * 0.01).sin() * 0.3)
           .collect()
    }

    #[test]
    fn process_is_deterministic() {
        let buf = test_buffer(44100, 2);
        let range = 0..44100;
        let a = process(&buf, 2, 44100, Preset::Adaptive, 1.0, range.clone()).unwrap();
        let b = process(&buf, 2, 44100, Preset::Adaptive, 1.0, range).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn process_preserves_buffer_length() {
        let buf = test_buffer(44100, 2);
        let out = process(&buf, 2, 44100, Preset::Punchy, 0.5, 0..44100).unwrap();
        assert_eq!(out.len(), buf.len());
    }

    #[test]
    fn process_rejects_none_preset() {
        let buf = test_buffer(100, 1);
        assert!(process(&buf, 1, 44100, Preset::None, 1.0, 0..100).is_err());
    }

    #[test]
    fn process_rejects_non_finite_input() {
        let mut buf = test_buffer(100, 1);
        buf[10] = f32::NAN;
        assert!(process(&buf, 1, 44100, Preset::Gentle, 1.0, 0..100).is_err());
    }

    #[test]
    fn deinterleave_interleave_roundtrip() {
        let buf: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let channels = deinterleave(&buf, 2);
        assert_eq!(channels, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert_eq!(interleave(&channels), buf);
    }
}
