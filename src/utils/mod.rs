pub mod image_ops;
pub mod logging;
pub mod metrics;

// Re-export commonly used items
pub use logging::init_tracing;
pub use metrics::{Metrics, MetricsSnapshot};
