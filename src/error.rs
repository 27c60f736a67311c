use crate::gateway::GatewayError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskboardError>;

#[derive(Debug, Error)]
pub enum TaskboardError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Presentation settings not found")]
    SettingNotFound,

    #[error("Allowed email not found: {0}")]
    EmailNotFound(String),

    #[error("Email already allowed: {0}")]
    EmailAlreadyAllowed(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Invalid color '{0}', expected #rrggbb")]
    InvalidColor(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Administrator capability required")]
    NotAuthorized,

    #[error("No active session")]
    NotSignedIn,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Malformed row in {table}: {message}")]
    MalformedRow { table: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl TaskboardError {
    /// True for conditions the board treats as silent no-ops.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ColumnNotFound(_)
                | Self::CardNotFound(_)
                | Self::SettingNotFound
                | Self::EmailNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(TaskboardError::CardNotFound("x".into()).is_not_found());
        assert!(TaskboardError::SettingNotFound.is_not_found());
        assert!(!TaskboardError::EmptyTitle.is_not_found());
    }

    #[test]
    fn test_gateway_error_conversion() {
        let err: TaskboardError = GatewayError::new("23505", "duplicate key").into();
        assert_eq!(err.to_string(), "Gateway error: duplicate key (23505)");
    }
}
