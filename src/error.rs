use thiserror::Error;

/// Errors of a provided [`StreamConfig`] or [`MonitorConfig`].
///
/// [`StreamConfig`]: crate::config::StreamConfig
/// [`MonitorConfig`]: crate::config::MonitorConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "speaking threshold must be a finite non-positive dB value, got {0}"
    )]
    Threshold(f64),

    #[error("detection interval must be positive")]
    Interval,

    #[error("smoothing must be within 0..=1, got {0}")]
    Smoothing(f64),

    #[error("quiet gain must be within 0..=1, got {0}")]
    QuietGain(f64),

    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),
}
