//! Metrics collection and export for tavolo.
//!
//! This crate provides a unified metrics interface using the `metrics` crate
//! facade. When the `prometheus` feature is enabled, metrics are exported in
//! Prometheus format via [`MetricsHandle::render`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use tavolo_metrics::{counter, dispatch, gauge};
//!
//! counter!(dispatch::JOBS_COMPLETED_TOTAL).increment(1);
//! gauge!(dispatch::JOBS_ACTIVE).set(3.0);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
