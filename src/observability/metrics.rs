//! Prometheus metrics for the provisioner.
//!
//! | metric                                 | labels | meaning                          |
//! |----------------------------------------|--------|----------------------------------|
//! | `provisioner_requests_total`           | status | provisioning requests handled    |
//! | `provisioner_resources_created_total`  | kind   | load-balancer resources created  |
//! | `provisioner_warnings_total`           | kind   | units skipped while planning     |
//! | `provisioner_failures_total`           | kind   | steps the load balancer rejected |

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::MetricsConfig;
use crate::core::error::{ProvisionerError, ProvisionerResult};
use crate::provisioning::ProvisioningReport;

/// Renders the Prometheus text exposition
#[derive(Clone)]
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the global Prometheus recorder; `None` when metrics are disabled
pub fn init_metrics(config: &MetricsConfig) -> ProvisionerResult<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        ProvisionerError::config(format!("Failed to install metrics recorder: {}", e))
    })?;

    Ok(Some(MetricsHandle { handle }))
}

/// Count one handled request by outcome (`complete`, `partial`, `rejected`)
pub fn record_request(status: &'static str) {
    counter!("provisioner_requests_total", "status" => status).increment(1);
}

/// Count the warnings and failures carried by a report
pub fn record_report(report: &ProvisioningReport) {
    for warning in &report.warnings {
        counter!("provisioner_warnings_total", "kind" => warning.kind()).increment(1);
    }
    for failure in &report.failures {
        counter!("provisioner_failures_total", "kind" => failure.kind.as_str()).increment(1);
    }
    record_request(if report.complete { "complete" } else { "partial" });
}
