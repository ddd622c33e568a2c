//! Host-side augmentations for single-channel square images
//!
//! Works on flattened row-major `Vec<f32>` images before they are batched.
//!
//! # Augmentation Strategy
//!
//! - **Labeled batch and MixMatch views**: `weak()` (flip, small shift, light noise)
//! - **ReMixMatch strong views**: `strong()` adds contrast, larger noise and cutout
//! - **Validation**: no augmentation

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Configuration of one augmentation pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Augmentation {
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Maximum translation in pixels, applied on both axes (zero padded)
    pub max_shift: usize,
    /// Brightness offset range (±brightness_delta)
    pub brightness_delta: f32,
    /// Contrast factor range around the image mean (1.0 ± contrast_delta)
    pub contrast_delta: f32,
    /// Gaussian noise standard deviation (0.0 = disabled)
    pub noise_std: f32,
    /// Side of the zeroed square patch (0 = disabled)
    pub cutout_size: usize,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self::weak()
    }
}

impl Augmentation {
    /// Flip and shift with a little noise
    pub fn weak() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            max_shift: 1,
            brightness_delta: 0.05,
            contrast_delta: 0.0,
            noise_std: 0.05,
            cutout_size: 0,
        }
    }

    /// Weak pipeline plus photometric distortion and cutout
    pub fn strong() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            max_shift: 1,
            brightness_delta: 0.2,
            contrast_delta: 0.3,
            noise_std: 0.15,
            cutout_size: 3,
        }
    }

    /// Identity
    pub fn none() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            max_shift: 0,
            brightness_delta: 0.0,
            contrast_delta: 0.0,
            noise_std: 0.0,
            cutout_size: 0,
        }
    }

    /// Augment one `size x size` image
    pub fn apply<R: Rng + ?Sized>(&self, image: &[f32], size: usize, rng: &mut R) -> Vec<f32> {
        let mut out = image.to_vec();

        if self.horizontal_flip_prob > 0.0 && rng.gen::<f32>() < self.horizontal_flip_prob {
            for row in out.chunks_mut(size) {
                row.reverse();
            }
        }

        if self.max_shift > 0 {
            let max = self.max_shift as i64;
            let dy = rng.gen_range(-max..=max);
            let dx = rng.gen_range(-max..=max);
            out = shift(&out, size, dy, dx);
        }

        if self.contrast_delta > 0.0 {
            let factor = 1.0 + rng.gen_range(-self.contrast_delta..=self.contrast_delta);
            let mean = out.iter().sum::<f32>() / out.len().max(1) as f32;
            out.iter_mut().for_each(|p| *p = mean + (*p - mean) * factor);
        }

        if self.brightness_delta > 0.0 {
            let offset = rng.gen_range(-self.brightness_delta..=self.brightness_delta);
            out.iter_mut().for_each(|p| *p += offset);
        }

        if self.noise_std > 0.0 {
            if let Ok(noise) = Normal::new(0.0f32, self.noise_std) {
                out.iter_mut().for_each(|p| *p += noise.sample(rng));
            }
        }

        if self.cutout_size > 0 && self.cutout_size <= size {
            let top = rng.gen_range(0..=size - self.cutout_size);
            let left = rng.gen_range(0..=size - self.cutout_size);
            for y in top..top + self.cutout_size {
                for x in left..left + self.cutout_size {
                    out[y * size + x] = 0.0;
                }
            }
        }

        out
    }
}

/// Translate by `(dy, dx)` pixels, filling with zeros
fn shift(image: &[f32], size: usize, dy: i64, dx: i64) -> Vec<f32> {
    let mut out = vec![0.0f32; image.len()];
    let n = size as i64;
    for y in 0..n {
        for x in 0..n {
            let (sy, sx) = (y - dy, x - dx);
            if (0..n).contains(&sy) && (0..n).contains(&sx) {
                out[(y * n + x) as usize] = image[(sy * n + sx) as usize];
            }
        }
    }
    out
}
