//! Content modifier rules. Applied in table order to the
//! already-interpolated parameter vector; later rules see the earlier
//! rules' edits.

use auralis_core::{ProcessingParameters, SpectrumPosition};

/// `preset_target` is the user-selected preset's own `output_target_rms`
/// (the "preset_target" referenced throughout the table).
pub fn apply_content_modifiers(
    mut params: ProcessingParameters,
    position: &SpectrumPosition,
    preset_target: f64,
) -> ProcessingParameters {
    let l = position.input_level;
    let dr = position.dynamic_range;
    let sb = position.spectral_balance;
    let e = position.energy;

    // Row 1/2: extreme dynamics.
    if dr > 0.9 {
        if l < 0.45 {
            params.compression_amount = 0.0;
            params.output_target_rms = 0.7 * -18.0 + 0.3 * preset_target;
        } else {
            params.compression_amount = 0.85;
            params.output_target_rms = 0.3 * -17.0 + 0.7 * preset_target;
        }
    }

    // Row 3/4: dynamic material scaled by energy.
    if dr > 0.75 {
        if e < 0.6 {
            params.compression_amount *= 0.5;
            params.dynamics_intensity *= 0.6;
        } else {
            params.compression_amount *= 0.8;
            params.dynamics_intensity *= 0.9;
        }
    }

    // Row 5: quiet material needs input gain.
    if l < 0.3 {
        params.input_gain = (20.0 * (0.3 - l)).clamp(0.0, 12.0);
    }

    // Row 6/7: spectral balance.
    if sb > 0.8 {
        params.treble_adjustment *= 0.5;
        params.high_mid_adjustment *= 0.7;
    }
    if sb < 0.3 {
        params.treble_adjustment += 1.0;
        params.high_mid_adjustment += 0.8;
    }

    // Row 8: high energy material handles more aggressive processing.
    if e > 0.7 {
        params.dynamics_intensity *= 1.2;
        params.eq_intensity *= 1.1;
    }

    // Row 9: loud + compressed -> expand instead of compress.
    if l > 0.8 && dr < 0.45 {
        params.expansion_amount = 0.7;
        params.compression_amount = 0.0;
        params.output_target_rms = 0.8 * -17.0 + 0.2 * preset_target;
    }

    // Row 10: very loud + moderate dynamics -> light compression.
    if l > 0.85 && (0.45..0.6).contains(&dr) {
        params.compression_amount = 0.42;
        params.output_target_rms = 0.3 * -15.0 + 0.7 * preset_target;
    }

    // Row 11: moderately loud + high dynamics -> light expansion.
    if l > 0.7 && l <= 0.85 && (0.6..0.8).contains(&dr) {
        params.expansion_amount = 0.4;
        params.output_target_rms = 0.6 * -14.0 + 0.4 * preset_target;
    }

    params
}
