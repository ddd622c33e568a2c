//! Scalar recording
//!
//! The training loop pushes named scalars (`train/loss`, `val/acc`, ...) into
//! a `Recorder`. Recording is best-effort: the loop logs a failing recorder
//! and keeps training.
//!
//! `EpochMetrics` holds the per-epoch means handed to post-epoch hooks and to
//! the checkpoint policy. `min_max` summarizes a whole run.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SslError};

/// Append-only sink of named scalars
pub trait Recorder {
    /// Record `value` for `name` at global step `step`
    fn add_scalar(&mut self, name: &str, step: usize, value: f64) -> Result<()>;

    /// Flush buffered values, called at the end of every epoch
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every value in memory, grouped by name
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    scalars: BTreeMap<String, Vec<(usize, f64)>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(step, value)` pairs recorded under `name`
    pub fn get(&self, name: &str) -> Option<&[(usize, f64)]> {
        self.scalars.get(name).map(|v| v.as_slice())
    }

    /// Last value recorded under `name`
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).and_then(|v| v.last()).map(|(_, value)| *value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scalars.keys().map(|k| k.as_str())
    }
}

impl Recorder for MemoryRecorder {
    fn add_scalar(&mut self, name: &str, step: usize, value: f64) -> Result<()> {
        self.scalars
            .entry(name.to_string())
            .or_default()
            .push((step, value));
        Ok(())
    }
}

#[derive(Serialize)]
struct ScalarLine<'a> {
    name: &'a str,
    step: usize,
    value: f64,
}

/// Writes one JSON object per scalar to a file
pub struct JsonLinesRecorder {
    writer: BufWriter<File>,
}

impl JsonLinesRecorder {
    /// Create (or append to) the file at `path`
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl Recorder for JsonLinesRecorder {
    fn add_scalar(&mut self, name: &str, step: usize, value: f64) -> Result<()> {
        let line = serde_json::to_string(&ScalarLine { name, step, value })?;
        writeln!(self.writer, "{}", line).map_err(|e| SslError::Recorder(e.to_string()))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| SslError::Recorder(e.to_string()))
    }
}

/// Shared handle, so the caller can read a recorder back after training
impl<R: Recorder> Recorder for Rc<RefCell<R>> {
    fn add_scalar(&mut self, name: &str, step: usize, value: f64) -> Result<()> {
        self.borrow_mut().add_scalar(name, step, value)
    }

    fn flush(&mut self) -> Result<()> {
        self.borrow_mut().flush()
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn add_scalar(&mut self, _name: &str, _step: usize, _value: f64) -> Result<()> {
        Ok(())
    }
}

/// Named scalars summarizing one epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    values: BTreeMap<String, f64>,
}

impl EpochMetrics {
    pub fn new(epoch: usize) -> Self {
        Self {
            epoch,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn extend(&mut self, other: EpochMetrics) {
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Lowest and highest value a metric took over a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

/// Per-metric extremes over every epoch of `history`
pub fn min_max(history: &[EpochMetrics]) -> BTreeMap<String, MinMax> {
    let mut summary: BTreeMap<String, MinMax> = BTreeMap::new();
    for (name, value) in history.iter().flat_map(EpochMetrics::iter) {
        summary
            .entry(name.to_string())
            .and_modify(|range| {
                range.min = range.min.min(value);
                range.max = range.max.max(value);
            })
            .or_insert(MinMax { min: value, max: value });
    }
    summary
}

/// Running means of step scalars over an epoch
#[derive(Debug, Clone, Default)]
pub struct ScalarMeans {
    sums: BTreeMap<String, (f64, usize)>,
}

impl ScalarMeans {
    pub fn add(&mut self, name: &str, value: f64) {
        let entry = self.sums.entry(name.to_string()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    pub fn mean(&self, name: &str) -> Option<f64> {
        self.sums
            .get(name)
            .filter(|(_, count)| *count > 0)
            .map(|(sum, count)| sum / *count as f64)
    }

    /// Means of every scalar seen, as the metrics of `epoch`
    pub fn into_metrics(self, epoch: usize) -> EpochMetrics {
        let mut metrics = EpochMetrics::new(epoch);
        for (name, (sum, count)) in self.sums {
            if count > 0 {
                metrics.insert(name, sum / count as f64);
            }
        }
        metrics
    }
}
