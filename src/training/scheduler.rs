//! Learning Rate Scheduler Module
//!
//! Epoch-level learning rate schedules. The trainer never calls these
//! directly; they run as a post-epoch hook (`LrSchedulerHook`) so their
//! position in the hook list decides what they observe.

use serde::{Deserialize, Serialize};

/// Learning rate schedule indexed by epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LRScheduler {
    /// Constant learning rate (no scheduling)
    Constant { lr: f64 },

    /// Step decay: multiply by `decay_factor` at each listed epoch
    StepDecay {
        initial_lr: f64,
        decay_factor: f64,
        step_epochs: Vec<usize>,
    },

    /// Exponential decay: lr = initial_lr * decay_rate^epoch
    Exponential { initial_lr: f64, decay_rate: f64 },

    /// Cosine annealing from `initial_lr` down to `min_lr`
    CosineAnnealing {
        initial_lr: f64,
        min_lr: f64,
        total_epochs: usize,
    },

    /// `initial_lr * cos(7 * pi * epoch / (16 * total_epochs))`, never reaching zero
    SoftCosine { initial_lr: f64, total_epochs: usize },

    /// Linear warmup followed by cosine annealing
    WarmupCosine {
        initial_lr: f64,
        min_lr: f64,
        warmup_epochs: usize,
        total_epochs: usize,
    },
}

impl LRScheduler {
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    pub fn step_decay(initial_lr: f64, decay_factor: f64, step_epochs: Vec<usize>) -> Self {
        Self::StepDecay {
            initial_lr,
            decay_factor,
            step_epochs,
        }
    }

    pub fn cosine_annealing(initial_lr: f64, min_lr: f64, total_epochs: usize) -> Self {
        Self::CosineAnnealing {
            initial_lr,
            min_lr,
            total_epochs,
        }
    }

    pub fn soft_cosine(initial_lr: f64, total_epochs: usize) -> Self {
        Self::SoftCosine {
            initial_lr,
            total_epochs,
        }
    }

    pub fn warmup_cosine(initial_lr: f64, min_lr: f64, warmup_epochs: usize, total_epochs: usize) -> Self {
        Self::WarmupCosine {
            initial_lr,
            min_lr,
            warmup_epochs,
            total_epochs,
        }
    }

    /// Get the learning rate for a given epoch (0-indexed)
    pub fn get_lr(&self, epoch: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,

            Self::StepDecay {
                initial_lr,
                decay_factor,
                step_epochs,
            } => {
                let steps_passed = step_epochs.iter().filter(|&&e| epoch >= e).count();
                initial_lr * decay_factor.powi(steps_passed as i32)
            }

            Self::Exponential {
                initial_lr,
                decay_rate,
            } => initial_lr * decay_rate.powi(epoch as i32),

            Self::CosineAnnealing {
                initial_lr,
                min_lr,
                total_epochs,
            } => {
                let progress = (epoch as f64 / (*total_epochs).max(1) as f64).min(1.0);
                min_lr + (initial_lr - min_lr) * cosine_factor(progress)
            }

            Self::SoftCosine {
                initial_lr,
                total_epochs,
            } => {
                let progress = (epoch as f64 / (*total_epochs).max(1) as f64).min(1.0);
                initial_lr * (7.0 * std::f64::consts::PI * progress / 16.0).cos()
            }

            Self::WarmupCosine {
                initial_lr,
                min_lr,
                warmup_epochs,
                total_epochs,
            } => {
                if epoch < *warmup_epochs {
                    initial_lr * (epoch as f64 + 1.0) / *warmup_epochs as f64
                } else {
                    let remaining = total_epochs.saturating_sub(*warmup_epochs).max(1);
                    let progress = ((epoch - warmup_epochs) as f64 / remaining as f64).min(1.0);
                    min_lr + (initial_lr - min_lr) * cosine_factor(progress)
                }
            }
        }
    }

    /// Get a description of the scheduler
    pub fn description(&self) -> String {
        match self {
            Self::Constant { lr } => format!("Constant LR: {:.6}", lr),
            Self::StepDecay {
                initial_lr,
                decay_factor,
                step_epochs,
            } => format!(
                "Step Decay: initial={:.6}, factor={}, steps={:?}",
                initial_lr, decay_factor, step_epochs
            ),
            Self::Exponential {
                initial_lr,
                decay_rate,
            } => format!("Exponential: initial={:.6}, decay={:.4}", initial_lr, decay_rate),
            Self::CosineAnnealing {
                initial_lr,
                min_lr,
                total_epochs,
            } => format!(
                "Cosine Annealing: initial={:.6}, min={:.6}, epochs={}",
                initial_lr, min_lr, total_epochs
            ),
            Self::SoftCosine {
                initial_lr,
                total_epochs,
            } => format!("Soft Cosine: initial={:.6}, epochs={}", initial_lr, total_epochs),
            Self::WarmupCosine {
                initial_lr,
                warmup_epochs,
                total_epochs,
                ..
            } => format!(
                "Warmup + Cosine: initial={:.6}, warmup={}, total={}",
                initial_lr, warmup_epochs, total_epochs
            ),
        }
    }
}

fn cosine_factor(progress: f64) -> f64 {
    (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_scheduler() {
        let scheduler = LRScheduler::constant(0.001);
        assert_eq!(scheduler.get_lr(0), 0.001);
        assert_eq!(scheduler.get_lr(100), 0.001);
    }

    #[test]
    fn test_step_decay_scheduler() {
        let scheduler = LRScheduler::step_decay(0.1, 0.1, vec![10, 20]);

        assert_eq!(scheduler.get_lr(9), 0.1);
        assert!((scheduler.get_lr(10) - 0.01).abs() < 1e-12);
        assert!((scheduler.get_lr(25) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_annealing_endpoints() {
        let scheduler = LRScheduler::cosine_annealing(0.1, 0.001, 100);

        assert!((scheduler.get_lr(0) - 0.1).abs() < 1e-12);
        assert!((scheduler.get_lr(50) - 0.0505).abs() < 1e-9);
        assert!((scheduler.get_lr(100) - 0.001).abs() < 1e-12);
        assert!((scheduler.get_lr(150) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_soft_cosine_stays_positive() {
        let scheduler = LRScheduler::soft_cosine(0.03, 10);

        assert!((scheduler.get_lr(0) - 0.03).abs() < 1e-12);
        let last = scheduler.get_lr(10);
        assert!(last > 0.0 && last < 0.03 * 0.25);
    }

    #[test]
    fn test_warmup_cosine_scheduler() {
        let scheduler = LRScheduler::warmup_cosine(0.1, 0.001, 10, 100);

        assert!(scheduler.get_lr(0) < scheduler.get_lr(5));
        assert!((scheduler.get_lr(9) - 0.1).abs() < 1e-12);
        assert!(scheduler.get_lr(99) >= 0.001);
    }

    #[test]
    fn test_serde_roundtrip_uses_kind_tag() {
        let json = serde_json::to_string(&LRScheduler::constant(0.5)).unwrap();
        assert!(json.contains("\"kind\":\"constant\""));
    }
}
