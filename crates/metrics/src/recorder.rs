//! Metrics recorder initialization and configuration.

use {anyhow::Result, tracing::info};

/// Handle to the metrics system, providing access to exported metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format, suitable for a `/metrics`
    /// endpoint.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle.render()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Global labels to add to all metrics (e.g. region, node name)
    pub global_labels: Vec<(String, String)>,
}

/// Initialize the metrics system.
///
/// Call once at application startup. When the `prometheus` feature is
/// enabled this installs the Prometheus recorder globally; otherwise metrics
/// are discarded by the facade's no-op recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

        let mut builder = PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        )?;

        for (key, value) in config.global_labels {
            builder = builder.add_global_label(key, value);
        }

        let handle = builder.install_recorder()?;
        info!("Prometheus metrics exporter initialized");
        Ok(MetricsHandle {
            prometheus_handle: handle,
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("Metrics feature not enabled at compile time");
        Ok(MetricsHandle {})
    }
}
