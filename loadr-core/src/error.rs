pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("stage {index} has a zero duration")]
    ZeroStageDuration { index: usize },

    #[error("ramping profile never reaches a positive VU target")]
    NoVusScheduled,

    #[error("invalid think time: {0}")]
    InvalidThinkTime(String),

    #[error("`{0}` must be a positive duration")]
    InvalidTiming(&'static str),

    #[error("invalid threshold for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("metrics error: {0}")]
    Metrics(#[from] loadr_metrics::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// True for errors caused by user-supplied configuration, detected before any VU starts.
    #[must_use]
    pub fn is_config(&self) -> bool {
        !matches!(self, Self::Metrics(_) | Self::Join(_))
    }
}
