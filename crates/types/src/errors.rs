use thiserror::Error;

// ============================================================================
// Main Error Enum
// ============================================================================

/// Errors raised while parsing or validating record keys
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Address was empty or contained non-hex characters
    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    /// Chain id was not a hex string
    #[error("Invalid chain id '{value}'")]
    InvalidChainId { value: String },

    /// Persisted position id could not be parsed
    #[error("Invalid position id '{value}': {reason}")]
    InvalidPositionId { value: String, reason: String },

    /// Unknown position type tag
    #[error("Unknown position kind '{value}'")]
    UnknownPositionKind { value: String },
}

impl RecordError {
    pub fn invalid_address(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_position_id(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPositionId {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
