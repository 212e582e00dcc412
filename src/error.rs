use serde::Serialize;
use thiserror::Error;

/// The error kinds a reconciliation pass can produce.
///
/// `Conflict` is deliberately absent: per the conflicted-copy strategy a
/// conflict is never treated as a failure, only as a branch in the delta.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("credential error: {0}")]
    Credential(String),

    #[error("remote store error: {0}")]
    Remote(String),

    #[error("remote auth error: {0}")]
    Auth(String),

    #[error("local storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("data integrity error: {0}")]
    Integrity(String),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl AppError {
    /// True for errors §7 classifies as transient (network, 5xx, timeout):
    /// the caller should record `lastError` on the affected file and retry
    /// next pass rather than aborting the whole sync.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Remote(_))
    }
}

impl From<keyring::Error> for AppError {
    fn from(err: keyring::Error) -> Self {
        AppError::Credential(err.to_string())
    }
}

impl From<aws_sdk_s3::Error> for AppError {
    fn from(err: aws_sdk_s3::Error) -> Self {
        AppError::Remote(err.to_string())
    }
}

impl<E> From<aws_sdk_s3::error::SdkError<E>> for AppError
where
    E: std::fmt::Debug,
{
    fn from(err: aws_sdk_s3::error::SdkError<E>) -> Self {
        AppError::Remote(format!("{:?}", err))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Integrity(err.to_string())
    }
}

impl From<notify::Error> for AppError {
    fn from(err: notify::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
