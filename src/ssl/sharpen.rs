//! Temperature sharpening
//!
//! `sharpen(p, T)_i = p_i^(1/T) / sum_j p_j^(1/T)`, row by row.
//!
//! Computed as `softmax(log(p) / T)`, which is the same quantity but stays
//! finite for small temperatures where `p^(1/T)` underflows to zero.

use burn::tensor::{activation::softmax, backend::Backend, Tensor};

use crate::model::PROBABILITY_FLOOR;
use crate::utils::error::{Result, SslError};

/// Check that a sharpening temperature is usable
pub fn validate_temperature(temperature: f64) -> Result<()> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(SslError::config(
            "temperature",
            format!("must be a finite value > 0, got {}", temperature),
        ));
    }
    Ok(())
}

/// Sharpen each row of `probs` with temperature `temperature`.
///
/// # Arguments
/// * `probs` - `[batch, classes]` non-negative rows
/// * `temperature` - `T > 0`; 1 leaves normalized rows unchanged, smaller values
///   push rows towards one-hot
///
/// # Returns
/// * Rows on the probability simplex, or a configuration error for `T <= 0`
pub fn sharpen<B: Backend>(probs: Tensor<B, 2>, temperature: f64) -> Result<Tensor<B, 2>> {
    validate_temperature(temperature)?;
    Ok(sharpen_unchecked(probs, temperature))
}

fn sharpen_unchecked<B: Backend>(probs: Tensor<B, 2>, temperature: f64) -> Tensor<B, 2> {
    let scaled = probs.clamp_min(PROBABILITY_FLOOR).log().div_scalar(temperature);
    softmax(scaled, 1)
}

/// Sharpener with a temperature validated once at construction
#[derive(Debug, Clone, Copy)]
pub struct Sharpener {
    temperature: f64,
}

impl Sharpener {
    pub fn new(temperature: f64) -> Result<Self> {
        validate_temperature(temperature)?;
        Ok(Self { temperature })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn apply<B: Backend>(&self, probs: Tensor<B, 2>) -> Tensor<B, 2> {
        sharpen_unchecked(probs, self.temperature)
    }
}
