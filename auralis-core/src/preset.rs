//! Presets, spectrum positions and processing parameters.
//!
//! `Preset::None` is handled entirely by the chunk processor (C5 skips C3
//! when it sees it) and carries no anchor/parameter vector here.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Adaptive,
    Gentle,
    Warm,
    Bright,
    Punchy,
    None,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::Adaptive,
        Preset::Gentle,
        Preset::Warm,
        Preset::Bright,
        Preset::Punchy,
        Preset::None,
    ];

    /// Presets that participate in spectrum interpolation. `None`
    /// bypasses C3 entirely and never appears here.
    pub const INTERPOLATED: [Preset; 5] = [
        Preset::Adaptive,
        Preset::Gentle,
        Preset::Warm,
        Preset::Bright,
        Preset::Punchy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Adaptive => "adaptive",
            Preset::Gentle => "gentle",
            Preset::Warm => "warm",
            Preset::Bright => "bright",
            Preset::Punchy => "punchy",
            Preset::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Preset> {
        Some(match s {
            "adaptive" => Preset::Adaptive,
            "gentle" => Preset::Gentle,
            "warm" => Preset::Warm,
            "bright" => Preset::Bright,
            "punchy" => Preset::Punchy,
            "none" => Preset::None,
            _ => return None,
        })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Preset::None)
    }

    /// Reference anchor + parameter vector. Panics on `Preset::None`,
    /// which never has one — callers must check `is_none()` first.
    pub fn anchor(&self) -> (SpectrumPosition, ProcessingParameters) {
        anchor_table(*self).expect("Preset::None has no anchor")
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The five scalar features describing a chunk's position, each normalized
/// to `[0, 1]` (`energy` is categorical at the source but lands in the
/// same range).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPosition {
    pub input_level: f64,
    pub dynamic_range: f64,
    pub spectral_balance: f64,
    pub energy: f64,
    pub density: f64,
}

impl SpectrumPosition {
    pub fn euclidean_distance(&self, other: &SpectrumPosition) -> f64 {
        let d = [
            self.input_level - other.input_level,
            self.dynamic_range - other.dynamic_range,
            self.spectral_balance - other.spectral_balance,
            self.energy - other.energy,
            self.density - other.density,
        ];
        d.iter().map(|x| x * x).sum::<f64>().sqrt()
    }
}

/// The complete DSP parameter vector a preset (or an interpolation/content
/// modifier pass) produces: EQ, dynamics, limiter and gain settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessingParameters {
    pub bass_adjustment: f64,
    pub low_mid_adjustment: f64,
    pub mid_adjustment: f64,
    pub high_mid_adjustment: f64,
    pub treble_adjustment: f64,
    pub compression_ratio: f64,
    pub compression_threshold: f64,
    pub compression_amount: f64,
    pub expansion_amount: f64,
    pub limiter_threshold: f64,
    pub limiter_amount: f64,
    pub input_gain: f64,
    pub output_target_rms: f64,
    pub eq_intensity: f64,
    pub dynamics_intensity: f64,
}

impl ProcessingParameters {
    /// Weighted sum used both by preset interpolation and by content
    /// modifiers, which mutate a single vector in place.
    pub fn scale(&self, w: f64) -> ProcessingParameters {
        ProcessingParameters {
            bass_adjustment: self.bass_adjustment * w,
            low_mid_adjustment: self.low_mid_adjustment * w,
            mid_adjustment: self.mid_adjustment * w,
            high_mid_adjustment: self.high_mid_adjustment * w,
            treble_adjustment: self.treble_adjustment * w,
            compression_ratio: self.compression_ratio * w,
            compression_threshold: self.compression_threshold * w,
            compression_amount: self.compression_amount * w,
            expansion_amount: self.expansion_amount * w,
            limiter_threshold: self.limiter_threshold * w,
            limiter_amount: self.limiter_amount * w,
            input_gain: self.input_gain * w,
            output_target_rms: self.output_target_rms * w,
            eq_intensity: self.eq_intensity * w,
            dynamics_intensity: self.dynamics_intensity * w,
        }
    }

    pub fn add(&self, other: &ProcessingParameters) -> ProcessingParameters {
        ProcessingParameters {
            bass_adjustment: self.bass_adjustment + other.bass_adjustment,
            low_mid_adjustment: self.low_mid_adjustment + other.low_mid_adjustment,
            mid_adjustment: self.mid_adjustment + other.mid_adjustment,
            high_mid_adjustment: self.high_mid_adjustment + other.high_mid_adjustment,
            treble_adjustment: self.treble_adjustment + other.treble_adjustment,
            compression_ratio: self.compression_ratio + other.compression_ratio,
            compression_threshold: self.compression_threshold + other.compression_threshold,
            compression_amount: self.compression_amount + other.compression_amount,
            expansion_amount: self.expansion_amount + other.expansion_amount,
            limiter_threshold: self.limiter_threshold + other.limiter_threshold,
            limiter_amount: self.limiter_amount + other.limiter_amount,
            input_gain: self.input_gain + other.input_gain,
            output_target_rms: self.output_target_rms + other.output_target_rms,
            eq_intensity: self.eq_intensity + other.eq_intensity,
            dynamics_intensity: self.dynamics_intensity + other.dynamics_intensity,
        }
    }

    pub fn zero() -> ProcessingParameters {
        ProcessingParameters {
            bass_adjustment: 0.0,
            low_mid_adjustment: 0.0,
            mid_adjustment: 0.0,
            high_mid_adjustment: 0.0,
            treble_adjustment: 0.0,
            compression_ratio: 0.0,
            compression_threshold: 0.0,
            compression_amount: 0.0,
            expansion_amount: 0.0,
            limiter_threshold: 0.0,
            limiter_amount: 0.0,
            input_gain: 0.0,
            output_target_rms: 0.0,
            eq_intensity: 0.0,
            dynamics_intensity: 0.0,
        }
    }
}

/// Reference anchors. `gentle`, `punchy` and `adaptive` are carried over
/// unchanged; `warm` and `bright` fill out the five-preset list this core
/// exposes, anchored at a darker/brighter spectral balance respectively
/// (see the per-variant comments below).
fn anchor_table(preset: Preset) -> Option<(SpectrumPosition, ProcessingParameters)> {
    Some(match preset {
        Preset::Gentle => (
            SpectrumPosition {
                input_level: 0.6,
                dynamic_range: 0.8,
                spectral_balance: 0.6,
                energy: 0.4,
                density: 0.5,
            },
            ProcessingParameters {
                bass_adjustment: 0.3,
                low_mid_adjustment: 0.0,
                mid_adjustment: 0.0,
                high_mid_adjustment: 0.2,
                treble_adjustment: 0.5,
                compression_ratio: 1.8,
                compression_threshold: -20.0,
                compression_amount: 0.5,
                expansion_amount: 0.0,
                limiter_threshold: -2.0,
                limiter_amount: 0.5,
                input_gain: 0.0,
                output_target_rms: -15.0,
                eq_intensity: 0.6,
                dynamics_intensity: 0.5,
            },
        ),
        Preset::Punchy => (
            SpectrumPosition {
                input_level: 0.5,
                dynamic_range: 0.5,
                spectral_balance: 0.6,
                energy: 0.8,
                density: 0.7,
            },
            ProcessingParameters {
                bass_adjustment: 1.8,
                low_mid_adjustment: 0.5,
                mid_adjustment: 0.0,
                high_mid_adjustment: 1.5,
                treble_adjustment: 0.8,
                compression_ratio: 2.5,
                compression_threshold: -18.0,
                compression_amount: 0.65,
                expansion_amount: 0.0,
                limiter_threshold: -2.0,
                limiter_amount: 0.65,
                input_gain: 0.0,
                output_target_rms: -14.0,
                eq_intensity: 0.75,
                dynamics_intensity: 0.65,
            },
        ),
        Preset::Adaptive => (
            SpectrumPosition {
                input_level: 0.5,
                dynamic_range: 0.8,
                spectral_balance: 0.5,
                energy: 0.5,
                density: 0.5,
            },
            ProcessingParameters {
                bass_adjustment: 0.0,
                low_mid_adjustment: 0.0,
                mid_adjustment: 0.0,
                high_mid_adjustment: 0.0,
                treble_adjustment: 0.0,
                compression_ratio: 1.5,
                compression_threshold: -26.0,
                compression_amount: 0.25,
                expansion_amount: 0.0,
                limiter_threshold: -4.0,
                limiter_amount: 0.25,
                input_gain: 0.0,
                output_target_rms: -16.0,
                eq_intensity: 0.4,
                dynamics_intensity: 0.25,
            },
        ),
        // Warmer tonal balance: bass/low-mid lifted, treble held back,
        // gentler dynamics than punchy. Anchored at a lower spectral
        // balance (darker material) and moderate energy.
        Preset::Warm => (
            SpectrumPosition {
                input_level: 0.55,
                dynamic_range: 0.7,
                spectral_balance: 0.35,
                energy: 0.5,
                density: 0.55,
            },
            ProcessingParameters {
                bass_adjustment: 1.2,
                low_mid_adjustment: 0.6,
                mid_adjustment: 0.1,
                high_mid_adjustment: -0.3,
                treble_adjustment: -0.6,
                compression_ratio: 1.7,
                compression_threshold: -22.0,
                compression_amount: 0.4,
                expansion_amount: 0.0,
                limiter_threshold: -3.0,
                limiter_amount: 0.4,
                input_gain: 0.0,
                output_target_rms: -15.5,
                eq_intensity: 0.55,
                dynamics_intensity: 0.4,
            },
        ),
        // Brighter counterpart: treble/high-mid lifted, anchored at high
        // spectral balance, dynamics handled closer to punchy's.
        Preset::Bright => (
            SpectrumPosition {
                input_level: 0.5,
                dynamic_range: 0.6,
                spectral_balance: 0.8,
                energy: 0.6,
                density: 0.55,
            },
            ProcessingParameters {
                bass_adjustment: -0.3,
                low_mid_adjustment: -0.2,
                mid_adjustment: 0.2,
                high_mid_adjustment: 1.2,
                treble_adjustment: 1.6,
                compression_ratio: 2.0,
                compression_threshold: -19.0,
                compression_amount: 0.55,
                expansion_amount: 0.0,
                limiter_threshold: -2.5,
                limiter_amount: 0.55,
                input_gain: 0.0,
                output_target_rms: -14.5,
                eq_intensity: 0.7,
                dynamics_intensity: 0.55,
            },
        ),
        Preset::None => return None,
    })
}

/// Preset interpolation: inverse-distance weighting with the
/// user-selected preset's weight doubled, normalized to sum to 1.
pub fn interpolate(
    position: &SpectrumPosition,
    selected: Preset,
) -> (ProcessingParameters, Vec<(Preset, f64)>) {
    assert!(!selected.is_none(), "None bypasses interpolation entirely");

    let mut weights = Vec::with_capacity(Preset::INTERPOLATED.len());
    for p in Preset::INTERPOLATED {
        let (anchor_pos, _) = p.anchor();
        let d = position.euclidean_distance(&anchor_pos);
        let mut w = 1.0 / (d + 0.1);
        if p == selected {
            w *= 2.0;
        }
        weights.push((p, w));
    }
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    for (_, w) in weights.iter_mut() {
        *w /= total;
    }

    let mut out = ProcessingParameters::zero();
    for (p, w) in &weights {
        let (_, params) = p.anchor();
        out = out.add(&params.scale(*w));
    }
    (out, weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let pos = SpectrumPosition {
            input_level: 0.5,
            dynamic_range: 0.5,
            spectral_balance: 0.5,
            energy: 0.5,
            density: 0.5,
        };
        let (_, weights) = interpolate(&pos, Preset::Adaptive);
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn selected_preset_weight_is_favored() {
        let pos = SpectrumPosition {
            input_level: 0.5,
            dynamic_range: 0.5,
            spectral_balance: 0.5,
            energy: 0.5,
            density: 0.5,
        };
        let (_, weights_adaptive) = interpolate(&pos, Preset::Adaptive);
        let (_, weights_punchy) = interpolate(&pos, Preset::Punchy);

        let w_adaptive_when_selected = weights_adaptive
           .iter()
           .find(|(p, _)| *p == Preset::Adaptive)
           .unwrap()
           .1;
        let w_adaptive_when_not = weights_punchy
           .iter()
           .find(|(p, _)| *p == Preset::Adaptive)
           .unwrap()
           .1;
        assert!(w_adaptive_when_selected > w_adaptive_when_not);
    }

    #[test]
    fn interpolation_is_deterministic() {
        let pos = SpectrumPosition {
            input_level: 0.42,
            dynamic_range: 0.33,
            spectral_balance: 0.71,
            energy: 0.5,
            density: 0.6,
        };
        let (a, _) = interpolate(&pos, Preset::Warm);
        let (b, _) = interpolate(&pos, Preset::Warm);
        assert_eq!(a, b);
    }

    #[test]
    fn preset_round_trips_through_str() {
        for p in Preset::ALL {
            assert_eq!(Preset::parse(p.as_str()), Some(p));
        }
    }
}
