//! Gradient accumulation policy
//!
//! Gradients of consecutive steps are summed and applied in one optimizer
//! update every `interval` steps. With `flush_on_last`, whatever is pending
//! at the last batch of an epoch is applied too, so no gradient crosses an
//! epoch boundary.

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SslError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulationPolicy {
    /// Number of steps summed into one update (1 = update every step)
    pub interval: usize,
    /// Apply pending gradients on the last batch of an epoch
    pub flush_on_last: bool,
}

impl Default for AccumulationPolicy {
    fn default() -> Self {
        Self::every_step()
    }
}

impl AccumulationPolicy {
    /// Plain training: one update per step
    pub fn every_step() -> Self {
        Self {
            interval: 1,
            flush_on_last: true,
        }
    }

    /// Accumulate over `interval` steps, flushing at the end of each epoch
    pub fn every(interval: usize) -> Result<Self> {
        let policy = Self {
            interval,
            flush_on_last: true,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(SslError::config("accumulation.interval", "must be at least 1"));
        }
        Ok(())
    }

    /// Whether `pending` accumulated steps should be applied now
    pub fn should_flush(&self, pending: usize, is_last_batch: bool) -> bool {
        pending >= self.interval || (self.flush_on_last && is_last_batch && pending > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_step_always_flushes() {
        let policy = AccumulationPolicy::every_step();
        assert!(policy.should_flush(1, false));
        assert!(policy.should_flush(1, true));
    }

    #[test]
    fn test_interval_with_last_batch_flush() {
        let policy = AccumulationPolicy::every(3).unwrap();

        // 7 batches: updates after batch 3, 6 and the last one
        let mut pending = 0;
        let mut updates = Vec::new();
        for batch in 0..7 {
            pending += 1;
            if policy.should_flush(pending, batch == 6) {
                updates.push(batch);
                pending = 0;
            }
        }
        assert_eq!(updates, vec![2, 5, 6]);
    }

    #[test]
    fn test_without_last_batch_flush() {
        let policy = AccumulationPolicy {
            interval: 4,
            flush_on_last: false,
        };
        assert!(!policy.should_flush(2, true));
        assert!(policy.should_flush(4, false));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(AccumulationPolicy::every(0).is_err());
    }
}
