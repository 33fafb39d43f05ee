//! Error types for the onedrive crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when talking to OneDrive or handling local state.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Token lifetime out of range: expires_in = {0}")]
    InvalidExpiry(i64),

    #[error("Authentication failed ({status}): {body}")]
    AuthFailed { status: u16, body: String },

    #[error("No stored credential at {0}; run `onedrive auth` first")]
    CredentialNotFound(PathBuf),

    #[error("Stored credential has no refresh token; run `onedrive auth` again")]
    MissingRefreshToken,

    #[error("Authorization callback failed: {0}")]
    AuthCallback(String),

    #[error("No authorization callback received within {0} seconds")]
    AuthTimeout(u64),

    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    #[error("No config file at {0}; run `onedrive config` first")]
    ConfigNotFound(PathBuf),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Invalid local path: {0}")]
    InvalidLocalPath(String),
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
