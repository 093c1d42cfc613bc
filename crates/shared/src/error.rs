use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller-correctable; shown to the user, never logged as a fault.
    UserInput,
    Connectivity,
    ProtocolAnomaly,
}

/// Reply handed back to the command layer when a voice operation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub category: ErrorCategory,
    pub message: String,
}

impl UserFacingError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}
