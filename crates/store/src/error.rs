use pagescribe_core::JournalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("corrupt entry record: {0}")]
    Corrupt(String),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for JournalError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => JournalError::NotFound(id),
            StoreError::Validation(msg) => JournalError::Validation(msg),
            StoreError::Io(err) => JournalError::Io(err),
            other => JournalError::Persistence(other.to_string()),
        }
    }
}
