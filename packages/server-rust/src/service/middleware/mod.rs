//! Tower middleware over the dispatch service.

pub mod metrics;

pub use self::metrics::{MetricsLayer, MetricsService};
