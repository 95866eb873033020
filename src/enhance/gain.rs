//! Post-enhancement gain with hard clipping to `[-1.0, 1.0]`.

/// Convert decibels to a linear amplitude factor.
pub fn db_to_linear(gain_db: f32) -> f32 {
    10f32.powf(gain_db / 20.0)
}

/// Apply `gain_db` in place and clip.
///
/// A gain of exactly 0 dB skips the multiplication, but clipping always runs
/// so the output never leaves `[-1.0, 1.0]`.
pub fn apply_gain(samples: &mut [f32], gain_db: f32) {
    let factor = if gain_db != 0.0 { Some(db_to_linear(gain_db)) } else { None };

    for sample in samples.iter_mut() {
        if let Some(factor) = factor {
            *sample *= factor;
        }
        *sample = sample.clamp(-1.0, 1.0);
    }
}
