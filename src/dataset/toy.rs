//! Synthetic shapes dataset
//!
//! Single-channel square images with one pattern per class:
//! 0. ring, 1. centre spot, 2. cross, 3. diagonals
//!
//! Every pattern is invariant under quarter turns, so a marker pixel is set
//! near the top-left corner to give the rotation task something to find.
//! Gaussian pixel noise keeps the classes from being trivially separable.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::loader::CyclePolicy;
use crate::dataset::LabeledBatch;
use crate::ssl::one_hot;
use crate::utils::error::{Result, SslError};

/// Number of distinct patterns
pub const MAX_CLASSES: usize = 4;

/// Smallest image side on which the patterns stay distinct
pub const MIN_IMAGE_SIZE: usize = 6;

/// Synthetic data and loader settings for the demo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToyDataConfig {
    /// Side of the square images
    pub image_size: usize,
    pub num_classes: usize,
    /// Training examples generated per class (labeled + unlabeled)
    pub train_per_class: usize,
    /// Validation examples generated per class
    pub val_per_class: usize,
    /// Standard deviation of the pixel noise
    pub noise_std: f32,
    /// Fraction of each class kept labeled
    pub labeled_ratio: f64,
    pub batch_size_s: usize,
    pub batch_size_u: usize,
    /// Which of the two loaders sets the epoch length
    pub cycle: CyclePolicy,
    pub seed: u64,
}

impl Default for ToyDataConfig {
    fn default() -> Self {
        Self {
            image_size: 8,
            num_classes: 3,
            train_per_class: 64,
            val_per_class: 16,
            noise_std: 0.15,
            labeled_ratio: 0.1,
            batch_size_s: 8,
            batch_size_u: 8,
            cycle: CyclePolicy::Max,
            seed: 7,
        }
    }
}

impl ToyDataConfig {
    /// Flattened size of one image
    pub fn input_features(&self) -> usize {
        self.image_size * self.image_size
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_size < MIN_IMAGE_SIZE {
            return Err(SslError::config(
                "data.image_size",
                format!("must be at least {}, got {}", MIN_IMAGE_SIZE, self.image_size),
            ));
        }
        if !(2..=MAX_CLASSES).contains(&self.num_classes) {
            return Err(SslError::config(
                "data.num_classes",
                format!("must be between 2 and {}, got {}", MAX_CLASSES, self.num_classes),
            ));
        }
        if self.train_per_class == 0 || self.val_per_class == 0 {
            return Err(SslError::config("data.train_per_class", "both per-class counts must be at least 1"));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(SslError::config(
                "data.noise_std",
                format!("must be a finite value >= 0, got {}", self.noise_std),
            ));
        }
        if !(self.labeled_ratio > 0.0 && self.labeled_ratio <= 1.0) {
            return Err(SslError::config(
                "data.labeled_ratio",
                format!("must be in (0, 1], got {}", self.labeled_ratio),
            ));
        }
        if self.batch_size_s == 0 || self.batch_size_u == 0 {
            return Err(SslError::config("data.batch_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// One image, flattened row-major, with its class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToyItem {
    pub image: Vec<f32>,
    pub label: usize,
}

/// In-memory synthetic dataset
#[derive(Debug, Clone)]
pub struct ToyShapes {
    items: Vec<ToyItem>,
    image_size: usize,
    num_classes: usize,
}

impl ToyShapes {
    /// Generate `per_class` noisy examples of each of the first `num_classes` patterns
    pub fn generate(
        image_size: usize,
        num_classes: usize,
        per_class: usize,
        noise_std: f32,
        seed: u64,
    ) -> Result<Self> {
        if image_size < MIN_IMAGE_SIZE {
            return Err(SslError::config("image_size", format!("must be at least {}", MIN_IMAGE_SIZE)));
        }
        if num_classes == 0 || num_classes > MAX_CLASSES {
            return Err(SslError::config(
                "num_classes",
                format!("must be between 1 and {}", MAX_CLASSES),
            ));
        }
        let noise = Normal::new(0.0f32, noise_std)
            .map_err(|e| SslError::config("noise_std", e.to_string()))?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let templates: Vec<Vec<f32>> = (0..num_classes)
            .map(|class| template(class, image_size))
            .collect();

        // Interleave classes so any prefix stays roughly balanced
        let mut items = Vec::with_capacity(per_class * num_classes);
        for _ in 0..per_class {
            for (label, template) in templates.iter().enumerate() {
                let image = template.iter().map(|&p| p + noise.sample(&mut rng)).collect();
                items.push(ToyItem { image, label });
            }
        }

        debug!(
            "Generated {} toy images ({} classes, {}x{})",
            items.len(),
            num_classes,
            image_size,
            image_size
        );

        Ok(Self {
            items,
            image_size,
            num_classes,
        })
    }

    /// Training and validation sets described by `config`, from disjoint seeds
    pub fn train_val(config: &ToyDataConfig) -> Result<(Self, Self)> {
        config.validate()?;
        let train = Self::generate(
            config.image_size,
            config.num_classes,
            config.train_per_class,
            config.noise_std,
            config.seed,
        )?;
        let val = Self::generate(
            config.image_size,
            config.num_classes,
            config.val_per_class,
            config.noise_std,
            config.seed.wrapping_add(1),
        )?;
        Ok((train, val))
    }

    pub fn items(&self) -> &[ToyItem] {
        &self.items
    }

    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Clone the items at `indices`
    pub fn subset(&self, indices: &[usize]) -> Vec<ToyItem> {
        indices
            .iter()
            .filter_map(|&index| self.items.get(index).cloned())
            .collect()
    }

    /// Whole dataset as labeled batches, in order (e.g. for validation)
    pub fn labeled_batches<B: Backend>(
        &self,
        batch_size: usize,
        device: &B::Device,
    ) -> Result<Vec<LabeledBatch<B, 4>>> {
        let batcher = ToyBatcher::<B>::new(device.clone(), self.image_size, self.num_classes);
        self.items
            .chunks(batch_size.max(1))
            .map(|chunk| batcher.batch(chunk.to_vec()))
            .collect()
    }
}

impl Dataset<ToyItem> for ToyShapes {
    fn get(&self, index: usize) -> Option<ToyItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Noise-free image of class `class`
fn template(class: usize, size: usize) -> Vec<f32> {
    let lo = (size - 1) / 2;
    let hi = size / 2;
    let centre = |v: usize| v >= lo && v <= hi;

    let mut image = vec![0.0f32; size * size];
    for y in 0..size {
        for x in 0..size {
            let on = match class {
                0 => {
                    let inside = (1..size - 1).contains(&y) && (1..size - 1).contains(&x);
                    inside && (y == 1 || y == size - 2 || x == 1 || x == size - 2)
                }
                1 => centre(y) && centre(x),
                2 => centre(y) || centre(x),
                _ => y == x || y + x == size - 1,
            };
            if on {
                image[y * size + x] = 1.0;
            }
        }
    }

    // Orientation marker
    image[1] = 1.0;
    image
}

/// Turns `ToyItem`s into `[N, 1, S, S]` images with one-hot targets
#[derive(Clone, Debug)]
pub struct ToyBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
    num_classes: usize,
}

impl<B: Backend> ToyBatcher<B> {
    pub fn new(device: B::Device, image_size: usize, num_classes: usize) -> Self {
        Self {
            device,
            image_size,
            num_classes,
        }
    }

    /// Stack flattened images into a `[N, 1, S, S]` tensor
    pub fn images(&self, images: Vec<Vec<f32>>) -> Tensor<B, 4> {
        let batch_size = images.len();
        let data: Vec<f32> = images.into_iter().flatten().collect();
        Tensor::from_floats(
            TensorData::new(data, [batch_size, 1, self.image_size, self.image_size]),
            &self.device,
        )
    }

    /// One-hot rows; fails on a label outside `0..num_classes`
    pub fn targets(&self, labels: &[usize]) -> Result<Tensor<B, 2>> {
        one_hot(labels, self.num_classes, &self.device)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl<B: Backend> Batcher<ToyItem, Result<LabeledBatch<B, 4>>> for ToyBatcher<B> {
    fn batch(&self, items: Vec<ToyItem>) -> Result<LabeledBatch<B, 4>> {
        let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
        let images = items.into_iter().map(|item| item.image).collect();

        Ok(LabeledBatch {
            inputs: self.images(images),
            targets: self.targets(&labels)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_templates_are_distinct_and_quarter_turn_invariant() {
        let size = 8;
        let templates: Vec<Vec<f32>> = (0..MAX_CLASSES).map(|c| template(c, size)).collect();

        for a in 0..MAX_CLASSES {
            for b in (a + 1)..MAX_CLASSES {
                assert_ne!(templates[a], templates[b], "classes {} and {} coincide", a, b);
            }
        }

        // Without the marker, rotating by 90 degrees leaves each pattern unchanged
        for template in &templates {
            let mut plain = template.clone();
            plain[1] = 0.0;
            let rotated: Vec<f32> = (0..size * size)
                .map(|i| {
                    let (y, x) = (i / size, i % size);
                    plain[(size - 1 - x) * size + y]
                })
                .collect();
            assert_eq!(plain, rotated);
        }
    }

    #[test]
    fn test_generate_is_balanced_and_deterministic() {
        let a = ToyShapes::generate(8, 3, 5, 0.1, 42).unwrap();
        let b = ToyShapes::generate(8, 3, 5, 0.1, 42).unwrap();

        assert_eq!(a.len(), 15);
        assert_eq!(a.items(), b.items());
        for class in 0..3 {
            assert_eq!(a.labels().iter().filter(|&&l| l == class).count(), 5);
        }
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let data = ToyShapes::generate(8, 4, 3, 0.0, 1).unwrap();
        let batches = data.labeled_batches::<TestBackend>(5, &device).unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].inputs.dims(), [5, 1, 8, 8]);
        assert_eq!(batches[0].targets.dims(), [5, 4]);
        assert_eq!(batches[2].inputs.dims(), [2, 1, 8, 8]);
    }

    #[test]
    fn test_batcher_rejects_labels_beyond_its_classes() {
        let device = Default::default();
        let data = ToyShapes::generate(8, 4, 1, 0.0, 1).unwrap();
        let batcher = ToyBatcher::<TestBackend>::new(device, 8, 3);

        let result = batcher.batch(data.items().to_vec());
        assert!(matches!(result, Err(SslError::ShapeMismatch { got: 3, expected: 3, .. })));
    }

    #[test]
    fn test_config_validation() {
        assert!(ToyDataConfig::default().validate().is_ok());

        let config = ToyDataConfig {
            num_classes: 5,
            ..Default::default()
        };
        assert!(format!("{}", config.validate().unwrap_err()).contains("num_classes"));

        let config = ToyDataConfig {
            labeled_ratio: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
