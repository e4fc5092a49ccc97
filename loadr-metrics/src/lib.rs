mod error;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod snapshot;
pub mod tags;
mod trend;

pub use error::{Error, Result};
pub use key::KeyId;
pub use metrics::{MetricHandle, MetricKind};
pub use registry::{MetricId, Registry};
pub use snapshot::{
    Aggregate, MetricSnapshot, RateValue, SeriesSnapshot, SeriesValue, Snapshot, TrendSummary,
    TrendValue,
};
pub use tags::TagSet;
pub use trend::WindowSummary;
