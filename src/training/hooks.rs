//! Post-epoch hooks
//!
//! Hooks run in list order once per epoch, after training and validation
//! metrics have been recorded. Each one looks at `(epoch, metrics)` and
//! answers with a `HookAction`; the trainer applies the actions itself, so a
//! hook never reaches into another component.
//!
//! Any `FnMut(usize, &EpochMetrics) -> HookAction` closure is a hook.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::training::recorder::EpochMetrics;
use crate::training::scheduler::LRScheduler;

/// What the trainer should do after a hook ran
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HookAction {
    Continue,
    /// Use this learning rate from the next step on
    SetLearningRate(f64),
    /// Stop after this epoch
    Stop,
}

/// Callback run at the end of every epoch
pub trait PostEpochHook {
    fn on_epoch_end(&mut self, epoch: usize, metrics: &EpochMetrics) -> HookAction;

    fn name(&self) -> &str {
        "hook"
    }
}

impl<F> PostEpochHook for F
where
    F: FnMut(usize, &EpochMetrics) -> HookAction,
{
    fn on_epoch_end(&mut self, epoch: usize, metrics: &EpochMetrics) -> HookAction {
        self(epoch, metrics)
    }
}

/// Whether a larger or smaller metric is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricMode {
    Min,
    #[default]
    Max,
}

impl MetricMode {
    pub fn is_better(&self, candidate: f64, best: f64) -> bool {
        match self {
            MetricMode::Min => candidate < best,
            MetricMode::Max => candidate > best,
        }
    }
}

/// Tracks the best value seen for one metric
#[derive(Debug, Clone)]
pub struct BestMetric {
    name: String,
    mode: MetricMode,
    best: Option<f64>,
}

impl BestMetric {
    pub fn new(name: impl Into<String>, mode: MetricMode) -> Self {
        Self {
            name: name.into(),
            mode,
            best: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Update with this epoch's metrics; `Some(value)` when it is a new best.
    ///
    /// Epochs that do not report the metric, or report a non-finite value,
    /// never count as improvements.
    pub fn update(&mut self, metrics: &EpochMetrics) -> Option<f64> {
        let value = metrics.get(&self.name).filter(|v| v.is_finite())?;
        let improved = match self.best {
            None => true,
            Some(best) => self.mode.is_better(value, best),
        };

        if improved {
            self.best = Some(value);
            Some(value)
        } else {
            None
        }
    }
}

/// Sets the learning rate of the next epoch from a schedule
#[derive(Debug, Clone)]
pub struct LrSchedulerHook {
    scheduler: LRScheduler,
}

impl LrSchedulerHook {
    pub fn new(scheduler: LRScheduler) -> Self {
        info!("Learning rate schedule: {}", scheduler.description());
        Self { scheduler }
    }
}

impl PostEpochHook for LrSchedulerHook {
    fn on_epoch_end(&mut self, epoch: usize, _metrics: &EpochMetrics) -> HookAction {
        HookAction::SetLearningRate(self.scheduler.get_lr(epoch + 1))
    }

    fn name(&self) -> &str {
        "lr_scheduler"
    }
}

/// Stops training when a metric has not improved for `patience` epochs
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    tracker: BestMetric,
    patience: usize,
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    pub fn new(metric: impl Into<String>, mode: MetricMode, patience: usize) -> Self {
        Self {
            tracker: BestMetric::new(metric, mode),
            patience,
            epochs_without_improvement: 0,
        }
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }
}

impl PostEpochHook for EarlyStopping {
    fn on_epoch_end(&mut self, _epoch: usize, metrics: &EpochMetrics) -> HookAction {
        if self.tracker.update(metrics).is_some() {
            self.epochs_without_improvement = 0;
            return HookAction::Continue;
        }

        self.epochs_without_improvement += 1;
        if self.epochs_without_improvement >= self.patience {
            warn!(
                "Early stopping: {} has not improved for {} epochs",
                self.tracker.name(),
                self.epochs_without_improvement
            );
            HookAction::Stop
        } else {
            HookAction::Continue
        }
    }

    fn name(&self) -> &str {
        "early_stopping"
    }
}
