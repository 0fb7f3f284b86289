//! Errors from the dashboard REST API

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in. Please login first.")]
    NotAuthenticated,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Session expired. Please login again.")]
    Unauthorized,

    #[error("{detail}")]
    Rejected { status: u16, detail: String },

    #[error("Refusing to delete protected node: {0}")]
    ProtectedNode(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// Authorization failures force re-authentication; nothing else does.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
