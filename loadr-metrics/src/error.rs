use crate::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid metric name `{0}` (expected [A-Za-z0-9_], starting with a letter or `_`)")]
    InvalidName(String),

    #[error("metric `{name}` is already registered as {registered}, cannot record it as {requested}")]
    KindMismatch {
        name: String,
        registered: MetricKind,
        requested: MetricKind,
    },

    #[error("metric value for `{0}` must be a finite number")]
    NonFiniteValue(String),

    #[error("metrics registry is frozen")]
    Frozen,
}
