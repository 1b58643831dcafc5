use std::fmt;
use std::fs;
use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;

use crate::error::{JournalError, Result};

const DEFAULT_MIME: &str = "image/jpeg";

/// One captured page as handed to the batch, before it has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    DataUrl(String),
    File(PathBuf),
}

impl PageSource {
    pub fn from_arg(value: &str) -> Self {
        if value.starts_with("data:") {
            PageSource::DataUrl(value.to_string())
        } else {
            PageSource::File(PathBuf::from(value))
        }
    }

    /// Stable identifier recorded on the page's extraction result: the file
    /// path, or a blake3 digest of the data URL.
    pub fn image_ref(&self) -> String {
        match self {
            PageSource::DataUrl(url) => format!("blake3:{}", blake3::hash(url.as_bytes()).to_hex()),
            PageSource::File(path) => path.display().to_string(),
        }
    }

    /// Resolves the source into a `data:` URL. Files are read and base64
    /// encoded with the mime type of the format sniffed from their bytes.
    pub fn load(&self) -> Result<String> {
        match self {
            PageSource::DataUrl(url) => {
                split_data_url(url)
                    .ok_or_else(|| JournalError::Capture("malformed data url".to_string()))?;
                Ok(url.clone())
            }
            PageSource::File(path) => {
                let bytes = fs::read(path).map_err(|e| {
                    JournalError::Capture(format!("failed to read {}: {e}", path.display()))
                })?;
                if bytes.is_empty() {
                    return Err(JournalError::Capture(format!(
                        "{} is empty",
                        path.display()
                    )));
                }
                let format = image::guess_format(&bytes).map_err(|_| {
                    JournalError::Capture(format!(
                        "{} is not a recognised image",
                        path.display()
                    ))
                })?;
                Ok(encode_data_url(format.to_mime_type(), &bytes))
            }
        }
    }
}

impl fmt::Display for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSource::DataUrl(url) => {
                let head: String = url.chars().take(32).collect();
                write!(f, "{head}...")
            }
            PageSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Splits `data:<mime>;base64,<payload>` into its mime type and payload.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let mime = if mime.is_empty() { DEFAULT_MIME } else { mime };
    Some((mime, payload))
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        general_purpose::STANDARD.encode(bytes)
    )
}

pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let (_, payload) = split_data_url(url)
        .ok_or_else(|| JournalError::Capture("malformed data url".to_string()))?;
    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| JournalError::Capture(format!("invalid base64 payload: {e}")))
}

/// Approximate decoded size in KB of a data URL, derived from the base64
/// payload length.
pub fn payload_size_kb(url: &str) -> f64 {
    let len = split_data_url(url)
        .map(|(_, payload)| payload.len())
        .unwrap_or(url.len());
    len as f64 * 3.0 / 4.0 / 1024.0
}
