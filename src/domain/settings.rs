use crate::domain::board::{validate_color, DEFAULT_COLUMN_COLOR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Global presentation colors, stored as a singleton row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeSettings {
    pub header_bg: String,
    pub header_text: String,
    pub footer_bg: String,
    pub footer_text: String,
    pub board_bg: String,
    pub default_column_bg: String,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            header_bg: "#ffffff".to_string(),
            header_text: "#000000".to_string(),
            footer_bg: "#ffffff".to_string(),
            footer_text: "#000000".to_string(),
            board_bg: "#f0f2f5".to_string(),
            default_column_bg: DEFAULT_COLUMN_COLOR.to_string(),
        }
    }
}

impl ThemeSettings {
    /// Validates every color field, returning the normalized settings
    pub fn validated(&self) -> Result<Self, crate::error::TaskboardError> {
        Ok(Self {
            header_bg: validate_color(&self.header_bg)?,
            header_text: validate_color(&self.header_text)?,
            footer_bg: validate_color(&self.footer_bg)?,
            footer_text: validate_color(&self.footer_text)?,
            board_bg: validate_color(&self.board_bg)?,
            default_column_bg: validate_color(&self.default_column_bg)?,
        })
    }
}

/// An account permitted to use the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedEmail {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Lowercases and sanity-checks an email address
pub fn normalize_email(email: &str) -> Result<String, crate::error::TaskboardError> {
    let trimmed = email.trim().to_lowercase();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if !valid || trimmed.chars().any(char::is_whitespace) {
        return Err(crate::error::TaskboardError::InvalidEmail(email.to_string()));
    }
    Ok(trimmed)
}
