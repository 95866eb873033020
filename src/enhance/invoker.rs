//! Runs the model on a single window.
//!
//! The window is copied, peak-normalized so |x| ≤ 1.0, and handed to the
//! model. Any model error, or an output whose length differs from the
//! window, becomes `EnhanceError::Enhancement`. There is no per-window retry.

use crate::audio::buffer::normalize_peak;
use crate::enhance::model::EnhancementModel;
use crate::error::EnhanceError;

pub fn invoke(
    model: &mut dyn EnhancementModel,
    window: &[f32],
    attenuation_limit_db: Option<f32>,
) -> Result<Vec<f32>, EnhanceError> {
    let mut input = window.to_vec();
    normalize_peak(&mut input);

    let output = model
        .enhance(&input, attenuation_limit_db)
        .map_err(|e| EnhanceError::Enhancement(e.to_string()))?;

    if output.len() != input.len() {
        return Err(EnhanceError::Enhancement(format!(
            "model '{}' returned {} samples for a window of {}",
            model.name(),
            output.len(),
            input.len()
        )));
    }

    Ok(output)
}
