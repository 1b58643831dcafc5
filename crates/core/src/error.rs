use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("extraction error: {0}")]
    Extraction(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("page {page} is out of range (batch has {len} pages)")]
    PageOutOfRange { page: usize, len: usize },
    #[error("page {0} failed extraction and has no text to edit")]
    PageNotEditable(usize),
    #[error("unknown compression tier: {0}")]
    UnknownTier(String),
    #[error("ocr support not enabled")]
    OcrSupportDisabled,
}

pub type Result<T> = std::result::Result<T, JournalError>;
