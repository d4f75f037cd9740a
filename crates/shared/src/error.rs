use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnostic detail kept next to a `LoadingError` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub message: String,
}

impl LoadFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Error)]
pub enum UserInfoError {
    #[error("identity client has no active session")]
    NoActiveSession,
    #[error("userinfo request failed: {0}")]
    Request(String),
    #[error("userinfo endpoint answered with status {status}")]
    Status { status: u16 },
    #[error("failed to decode userinfo response: {0}")]
    Decode(String),
}

impl UserInfoError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403 })
    }
}
