//! Logging Module
//!
//! Structured logging through `tracing`, plus a small epoch logger used by the
//! training loop to report timing, losses and ETA.

use std::str::FromStr;
use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::utils::error::{Result, SslError};
use crate::utils::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose config for debugging: per-step losses become visible
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Quiet config (errors only)
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = SslError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(SslError::config(
                "log_level",
                format!("unknown level '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize logging with the given configuration
///
/// # Arguments
/// * `config` - Logging configuration
///
/// # Returns
/// * `Result<()>` - Err if a global subscriber was already installed
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| SslError::config("logging", format!("failed to initialize: {}", e)))
}

/// Epoch-level progress logger for the training loop
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    /// Create a new training logger
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize, num_batches: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!(
            "Epoch {}/{} started ({} batches)",
            epoch + 1,
            self.total_epochs,
            num_batches
        );
    }

    /// Log end of an epoch with its headline numbers
    pub fn end_epoch(&self, train_loss: f64, validation: Option<(&str, f64)>, learning_rate: f64) {
        let epoch_time = self.epoch_start.elapsed().as_secs_f64();
        let eta_secs = self.eta_secs();

        match validation {
            Some((name, value)) => tracing::info!(
                "Epoch {}/{} completed in {} | Loss: {:.4} | {}: {:.4} | LR: {:.6} | ETA: {}",
                self.epoch + 1,
                self.total_epochs,
                format_duration(epoch_time),
                train_loss,
                name,
                value,
                learning_rate,
                format_duration(eta_secs)
            ),
            None => tracing::info!(
                "Epoch {}/{} completed in {} | Loss: {:.4} | LR: {:.6} | ETA: {}",
                self.epoch + 1,
                self.total_epochs,
                format_duration(epoch_time),
                train_loss,
                learning_rate,
                format_duration(eta_secs)
            ),
        }
    }

    /// Log a new best value of the monitored metric
    pub fn log_new_best(&self, metric: &str, value: f64) {
        tracing::info!("New best model: {} = {:.4}", metric, value);
    }

    /// Log training completion
    pub fn log_complete(&self, epochs_run: usize) {
        tracing::info!(
            "Training complete: {} epochs in {}",
            epochs_run,
            format_duration(self.training_start.elapsed().as_secs_f64())
        );
    }

    fn eta_secs(&self) -> f64 {
        let done = self.epoch + 1;
        let remaining = self.total_epochs.saturating_sub(done);
        let avg = self.training_start.elapsed().as_secs_f64() / done as f64;
        remaining as f64 * avg
    }
}
