// Structured logging
pub mod logging;

// Prometheus metrics
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{init_metrics, MetricsHandle};
