// Error types shared by the evaluation engine and the configuration dialogue
use thiserror::Error;

/// Main error type for report configuration and evaluation
#[derive(Error, Debug)]
pub enum ReportError {
    /// Channel referenced by a condition is absent from the channel store
    #[error("Channel '{channel}' not found")]
    ChannelNotFound { channel: String },

    /// No sample available for the requested instant or window
    #[error("Insufficient data on channel '{channel}' at t={at_time}s")]
    InsufficientData { channel: String, at_time: f64 },

    #[error("Unsupported operator: '{operator}'")]
    UnsupportedOperator { operator: String },

    #[error("Unsupported statistic: '{statistic}'")]
    UnsupportedStatistic { statistic: String },

    /// Action not legal in the session's current state
    #[error("Action '{action}' is not valid in state '{state}' of session {session_id}")]
    InvalidTransition {
        session_id: String,
        state: String,
        action: String,
        valid_actions: Vec<String>,
    },

    #[error("Configuration of session {session_id} is incomplete, missing: {}", missing.join(", "))]
    IncompleteConfig {
        session_id: String,
        missing: Vec<String>,
    },

    /// Session changed between snapshot and apply
    #[error("Session {session_id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        session_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("File {file_id} not found")]
    FileNotFound { file_id: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Malformed input data (e.g. non-monotonic timestamps)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Report generation was cancelled")]
    Cancelled,

    #[error("Natural-language parser failed: {0}")]
    Parser(String),

    /// A background evaluation task panicked or was aborted
    #[error("Evaluation task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for report operations
pub type Result<T> = std::result::Result<T, ReportError>;

impl ReportError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ReportError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for API consumers
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::ChannelNotFound { .. } => "CHANNEL_NOT_FOUND",
            ReportError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            ReportError::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            ReportError::UnsupportedStatistic { .. } => "UNSUPPORTED_STATISTIC",
            ReportError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ReportError::IncompleteConfig { .. } => "INCOMPLETE_CONFIG",
            ReportError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            ReportError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            ReportError::FileNotFound { .. } => "FILE_NOT_FOUND",
            ReportError::InvalidValue { .. } => "INVALID_VALUE",
            ReportError::InvalidData(_) => "INVALID_DATA",
            ReportError::Cancelled => "CANCELLED",
            ReportError::Parser(_) => "PARSER_ERROR",
            ReportError::Task(_) => "TASK_FAILED",
            ReportError::Io(_) => "IO_ERROR",
            ReportError::Json(_) => "JSON_ERROR",
        }
    }

    /// Get a user-friendly message suitable for a chat reply
    pub fn user_message(&self) -> String {
        match self {
            ReportError::ChannelNotFound { channel } => {
                format!("The channel '{}' does not exist in the uploaded file", channel)
            }
            ReportError::InsufficientData { channel, at_time } => {
                format!("Not enough data on '{}' around {:.3}s", channel, at_time)
            }
            ReportError::UnsupportedOperator { operator } => {
                format!("'{}' is not a supported comparison", operator)
            }
            ReportError::UnsupportedStatistic { statistic } => {
                format!("'{}' is not a supported statistic", statistic)
            }
            ReportError::InvalidTransition {
                action,
                valid_actions,
                ..
            } => format!(
                "'{}' is not possible right now. You can: {}",
                action,
                valid_actions.join(", ")
            ),
            ReportError::IncompleteConfig { missing, .. } => {
                format!("Some settings are still missing: {}", missing.join(", "))
            }
            ReportError::ConcurrentModification { .. } => {
                "The configuration changed while your request was processed, please retry".to_string()
            }
            ReportError::SessionNotFound { .. } => {
                "This configuration session has ended or expired".to_string()
            }
            ReportError::FileNotFound { file_id } => format!("File '{}' is not available", file_id),
            ReportError::InvalidValue { field, reason } => format!("{}: {}", field, reason),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ReportError::ChannelNotFound {
            channel: "Ng".to_string(),
        };
        assert_eq!(err.code(), "CHANNEL_NOT_FOUND");
        assert_eq!(err.user_message(), "The channel 'Ng' does not exist in the uploaded file");

        let err = ReportError::IncompleteConfig {
            session_id: "s1".to_string(),
            missing: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Configuration of session s1 is incomplete, missing: a, b");
    }

    #[test]
    fn test_invalid_transition_lists_valid_actions() {
        let err = ReportError::InvalidTransition {
            session_id: "s1".to_string(),
            state: "trigger_combo".to_string(),
            action: "set_threshold".to_string(),
            valid_actions: vec!["set_combination".to_string(), "cancel".to_string()],
        };
        assert!(err.user_message().contains("set_combination, cancel"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ReportError = io_err.into();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
