//! Parallel shelf/band EQ: extract a band with a 2nd-order
//! Butterworth filter, scale it by `10^(dB/20) - 1`, and add it back to the
//! dry signal. Additive rather than subtractive, so multiple overlapping
//! bands never fight each other the way a cascaded EQ would.

use crate::biquad::BiquadCoeffs;
use auralis_core::ProcessingParameters;

/// Band split points in Hz. Fixed rather than derived from the preset
/// anchors: every preset shapes the same five bands, just by different
/// amounts.
pub struct BandFrequencies {
    pub bass_shelf_hz: f64,
    pub low_mid_band_hz: (f64, f64),
    pub mid_band_hz: (f64, f64),
    pub high_mid_band_hz: (f64, f64),
    pub treble_shelf_hz: f64,
}

pub const BAND_FREQUENCIES: BandFrequencies = BandFrequencies {
    bass_shelf_hz: 120.0,
    low_mid_band_hz: (250.0, 500.0),
    mid_band_hz: (500.0, 2000.0),
    high_mid_band_hz: (2000.0, 6000.0),
    treble_shelf_hz: 6000.0,
};

const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

fn normalized_freq(freq_hz: f64, sample_rate: u32) -> f64 {
    let nyquist = sample_rate as f64 / 2.0;
    (freq_hz / nyquist).clamp(0.01, 0.99)
}

/// Extracts a band with a biquad filter, scales it, and adds it back.
/// `boost_db` may be negative (a parallel cut).
fn parallel_band_boost(channel: &[f32], coeffs: &BiquadCoeffs, boost_db: f64) -> Vec<f32> {
    let band = coeffs.apply(channel);
    let boost_diff = (10f64.powf(boost_db / 20.0) - 1.0) as f32;
    channel
       .iter()
       .zip(band.iter())
       .map(|(&dry, &wet)| dry + wet * boost_diff)
       .collect()
}

/// Applies all five parallel bands to one de-interleaved channel, scaled by
/// `eq_intensity ∈ [0,1]` (a pass at intensity 0 is the identity).
pub fn apply_parallel_eq(
    channel: &[f32],
    params: &ProcessingParameters,
    sample_rate: u32,
) -> Vec<f32> {
    if params.eq_intensity <= 0.0 {
        return channel.to_vec();
    }
    let scale = params.eq_intensity;

    let bass = BiquadCoeffs::low_pass(
        normalized_freq(BAND_FREQUENCIES.bass_shelf_hz, sample_rate),
        BUTTERWORTH_Q,
    );
    let low_mid = BiquadCoeffs::band_pass(
        normalized_freq(BAND_FREQUENCIES.low_mid_band_hz.0, sample_rate),
        normalized_freq(BAND_FREQUENCIES.low_mid_band_hz.1, sample_rate),
    );
    let mid = BiquadCoeffs::band_pass(
        normalized_freq(BAND_FREQUENCIES.mid_band_hz.0, sample_rate),
        normalized_freq(BAND_FREQUENCIES.mid_band_hz.1, sample_rate),
    );
    let high_mid = BiquadCoeffs::band_pass(
        normalized_freq(BAND_FREQUENCIES.high_mid_band_hz.0, sample_rate),
        normalized_freq(BAND_FREQUENCIES.high_mid_band_hz.1, sample_rate),
    );
    let treble = BiquadCoeffs::high_pass(
        normalized_freq(BAND_FREQUENCIES.treble_shelf_hz, sample_rate),
        BUTTERWORTH_Q,
    );

    let mut out = parallel_band_boost(channel, &bass, params.bass_adjustment * scale);
    out = add_boost(&out, channel, &low_mid, params.low_mid_adjustment * scale);
    out = add_boost(&out, channel, &mid, params.mid_adjustment * scale);
    out = add_boost(&out, channel, &high_mid, params.high_mid_adjustment * scale);
    out = add_boost(&out, channel, &treble, params.treble_adjustment * scale);
    out
}

/// Each band extracts from the *original* dry signal (parallel, not
/// cascaded), but accumulates onto the running `out` buffer.
fn add_boost(out: &[f32], dry: &[f32], coeffs: &BiquadCoeffs, boost_db: f64) -> Vec<f32> {
    let band = coeffs.apply(dry);
    let boost_diff = (10f64.powf(boost_db / 20.0) - 1.0) as f32;
    out.iter()
       .zip(band.iter())
       .map(|(&acc, &wet)| acc + wet * boost_diff)
       .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_params(eq_intensity: f64) -> ProcessingParameters {
        let mut p = ProcessingParameters::zero();
        p.eq_intensity = eq_intensity;
        p
    }

    #[test]
    fn zero_boost_is_near_identity() {
        let input: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let out = apply_parallel_eq(&input, &flat_params(1.0), 44100);
        for (a, b) in input.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn zero_intensity_is_exact_identity() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 * 0.001).collect();
        let mut params = flat_params(0.0);
        params.bass_adjustment = 6.0;
        let out = apply_parallel_eq(&input, &params, 44100);
        assert_eq!(input, out);
    }

    #[test]
    fn output_length_matches_input() {
        let input = vec![0.1f32; 4096];
        let mut params = flat_params(1.0);
        params.treble_adjustment = 3.0;
        let out = apply_parallel_eq(&input, &params, 48000);
        assert_eq!(out.len(), input.len());
    }
}
