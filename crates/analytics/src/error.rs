use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Not enough periods for a report: got {periods}, need at least {required}")]
    NotEnoughData { periods: usize, required: usize },

    #[error("Cannot compute performance metrics: {0}")]
    Calculation(String),
}
