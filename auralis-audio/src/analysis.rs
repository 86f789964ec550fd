//! Content analysis: five scalar features describing a chunk's spectral
//! position, used to pick content modifiers downstream.

use auralis_core::SpectrumPosition;
use realfft::RealFftPlanner;

const EPSILON: f64 = 1e-10;

/// RMS-based energy categories and the values they map to. Thresholds chosen
/// to land typical mastered material in "medium".
const ENERGY_LOW_RMS_DB: f64 = -20.0;
const ENERGY_HIGH_RMS_DB: f64 = -12.0;

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

fn peak(samples: &[f32]) -> f64 {
    samples.iter().fold(0.0f64, |acc, &s| acc.max(s.abs() as f64))
}

/// Spectral centroid in Hz over a mono-summed buffer, via a real FFT of up
/// to 65536 samples (enough to resolve low-frequency content at typical
/// sample rates while keeping the transform cheap per chunk).
fn spectral_centroid_hz(mono: &[f32], sample_rate: u32) -> f64 {
    const MAX_FFT_LEN: usize = 65536;
    if mono.is_empty() {
        return 2000.0;
    }
    let n = mono.len().min(MAX_FFT_LEN);
    let mut buf: Vec<f64> = mono[..n].iter().map(|&s| s as f64).collect();

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut buf, &mut spectrum).is_err() {
        return 2000.0;
    }

    let bin_hz = sample_rate as f64 / n as f64;
    let mut weighted_sum = 0.0;
    let mut magnitude_sum = 0.0;
    for (i, bin) in spectrum.iter().enumerate() {
        let magnitude = (bin.re * bin.re + bin.im * bin.im).sqrt();
        weighted_sum += magnitude * (i as f64 * bin_hz);
        magnitude_sum += magnitude;
    }

    if magnitude_sum < EPSILON {
        2000.0
    } else {
        weighted_sum / magnitude_sum
    }
}

fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let channels = channels as usize;
    interleaved
       .chunks_exact(channels)
       .map(|frame| frame.iter().sum::<f32>() / channels as f32)
       .collect()
}

/// Extracts the five-feature spectrum position from an interleaved PCM
/// buffer. Operates on the full in-context buffer, since the content
/// analysis step always sees context.
pub fn analyze(interleaved: &[f32], channels: u16, sample_rate: u32) -> SpectrumPosition {
    let mono = downmix_to_mono(interleaved, channels);

    let rms_linear = rms(&mono);
    let rms_db = 20.0 * (rms_linear + EPSILON).log10();
    let input_level = clamp01((rms_db + 30.0) / 20.0);

    let peak_linear = peak(&mono).max(EPSILON);
    let crest_db = 20.0 * (peak_linear / rms_linear.max(EPSILON)).log10();
    let dynamic_range = clamp01((crest_db - 6.0) / 12.0);

    let centroid_hz = spectral_centroid_hz(&mono, sample_rate);
    let spectral_balance = clamp01((centroid_hz - 1000.0) / 3000.0);

    let energy = if rms_db < ENERGY_LOW_RMS_DB {
        0.3
    } else if rms_db > ENERGY_HIGH_RMS_DB {
        0.8
    } else {
        0.5
    };

    let density = clamp01(0.5 + (1.0 - dynamic_range) * 0.3 + (spectral_balance - 0.5) * 0.2);

    SpectrumPosition {
        input_level,
        dynamic_range,
        spectral_balance,
        energy,
        density,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_yields_low_input_level() {
        let samples = vec![0.0f32; 44100];
        let pos = analyze(&samples, 1, 44100);
        assert_eq!(pos.input_level, 0.0);
    }

    #[test]
    fn full_scale_square_wave_has_near_zero_crest_factor() {
        let samples: Vec<f32> = (0..44100)
           .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
           .collect();
        let pos = analyze(&samples, 1, 44100);
        // Square wave peak == rms, crest factor ~0 dB -> dynamic_range near 0.
        assert!(pos.dynamic_range < 0.1);
    }

    #[test]
    fn features_stay_in_unit_range() {
        let samples: Vec<f32> = (0..44100 * 2)
           .map(|i| (i as f32 * 0.05).sin() * 0.8)
           .collect();
        let pos = analyze(&samples, 2, 44100);
        assert!((0.0..=1.0).contains(&pos.input_level));
        assert!((0.0..=1.0).contains(&pos.dynamic_range));
        assert!((0.0..=1.0).contains(&pos.spectral_balance));
        assert!((0.0..=1.0).contains(&pos.density));
    }

    #[test]
    fn downmix_averages_channels() {
        let stereo = vec![1.0f32, -1.0f32, 0.5, -0.5];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono, vec![0.0, 0.0]);
    }
}
