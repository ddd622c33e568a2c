//! Linear warmup of a loss weight
//!
//! `value = target * min(counter, n_steps) / n_steps`, reaching `target`
//! exactly after `n_steps` calls to `step` and frozen there afterwards.
//! A zero-length warmup is held at `target` from the start.

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SslError};

/// Phase of a warmup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupState {
    Ramping,
    Held,
}

/// What one warmup step corresponds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WarmupUnit {
    /// One step per training iteration
    #[default]
    Iteration,
    /// One step per epoch
    Epoch,
}

/// Warmup scheduler for a single scalar
#[derive(Debug, Clone)]
pub struct Warmup {
    target: f64,
    n_steps: usize,
    counter: usize,
}

impl Warmup {
    /// Create a warmup ramping from 0 to `target` over `n_steps` steps
    pub fn new(target: f64, n_steps: usize) -> Result<Self> {
        if !target.is_finite() || target < 0.0 {
            return Err(SslError::config(
                "warmup target",
                format!("must be a finite value >= 0, got {}", target),
            ));
        }

        Ok(Self {
            target,
            n_steps,
            counter: 0,
        })
    }

    /// A warmup that is held at `target` from the start
    pub fn constant(target: f64) -> Result<Self> {
        Self::new(target, 0)
    }

    /// Current value; does not change the state
    pub fn value(&self) -> f64 {
        match self.state() {
            WarmupState::Held => self.target,
            WarmupState::Ramping => self.target * self.counter as f64 / self.n_steps as f64,
        }
    }

    /// Advance by one step; no-op once held
    pub fn step(&mut self) {
        if self.counter < self.n_steps {
            self.counter += 1;
        }
    }

    pub fn state(&self) -> WarmupState {
        if self.counter >= self.n_steps {
            WarmupState::Held
        } else {
            WarmupState::Ramping
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}
