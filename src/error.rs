use thiserror::Error;

/// Failures surfaced to callers. Degenerate inputs (unknown teams, missing
/// ratings, empty fixture lists) are recovered locally and never reach here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Wrong team count for a fixed bracket, or an unrecognized tournament
    /// kind string.
    #[error("invalid tournament configuration: {0}")]
    Configuration(String),

    /// An outcome was recorded for a match id with no stored prediction.
    #[error("no stored prediction for match {0}")]
    PredictionNotFound(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
