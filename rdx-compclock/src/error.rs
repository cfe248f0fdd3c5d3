//! Error types for the competition engine.
//!
//! These are validation outcomes reported back to whoever issued a command.
//! Port failures (status file, audio) never appear here: they are logged and
//! swallowed at the port boundary.

use thiserror::Error;

/// All errors a command can report to its caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompetitionError {
    /// A roster change was attempted while the round is running.
    #[error("Round started: first 'Reset Entire Round'")]
    RoundInProgress,

    /// The uploaded athlete list is missing required fields.
    #[error("Invalid athlete data format: {0}")]
    InvalidRoster(String),

    /// The category key does not name one of the fixed slots.
    #[error("Invalid category: {0}")]
    InvalidCategory(u8),

    /// A placement request named an athlete that is not on any roster.
    #[error("Could not place athlete, ID not found in list: {0}")]
    UnknownAthlete(String),

    /// A jump named a stage too far from the start of the round.
    #[error("Stage out of range: {0}")]
    StageOutOfRange(i64),

    /// The configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine's event loop is no longer running.
    #[error("Competition engine has stopped")]
    EngineStopped,
}

/// Result type alias for competition operations
pub type Result<T> = std::result::Result<T, CompetitionError>;

impl From<config::ConfigError> for CompetitionError {
    fn from(err: config::ConfigError) -> Self {
        CompetitionError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_in_progress_message() {
        let err = CompetitionError::RoundInProgress;
        assert_eq!(err.to_string(), "Round started: first 'Reset Entire Round'");
    }

    #[test]
    fn test_invalid_category_message() {
        let err = CompetitionError::InvalidCategory(7);
        assert_eq!(err.to_string(), "Invalid category: 7");
    }

    #[test]
    fn test_unknown_athlete_message() {
        let err = CompetitionError::UnknownAthlete("A-17".to_string());
        assert_eq!(
            err.to_string(),
            "Could not place athlete, ID not found in list: A-17"
        );
    }

    #[test]
    fn test_stage_out_of_range_message() {
        let err = CompetitionError::StageOutOfRange(i64::MIN);
        assert_eq!(err.to_string(), format!("Stage out of range: {}", i64::MIN));
    }
}
