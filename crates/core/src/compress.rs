use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{
    ColorType, DynamicImage, GenericImageView, ImageDecoder, ImageEncoder, ImageReader,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{JournalError, Result};
use crate::source::{decode_data_url, encode_data_url, payload_size_kb};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionTier {
    None,
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionTier {
    pub const ALL: [CompressionTier; 4] = [
        CompressionTier::None,
        CompressionTier::Low,
        CompressionTier::Medium,
        CompressionTier::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionTier::None => "none",
            CompressionTier::Low => "low",
            CompressionTier::Medium => "medium",
            CompressionTier::High => "high",
        }
    }
}

impl FromStr for CompressionTier {
    type Err = JournalError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" => Ok(CompressionTier::None),
            "low" => Ok(CompressionTier::Low),
            "medium" => Ok(CompressionTier::Medium),
            "high" => Ok(CompressionTier::High),
            other => Err(JournalError::UnknownTier(other.to_string())),
        }
    }
}

impl fmt::Display for CompressionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionProfile {
    pub max_width: u32,
    pub quality: f32,
}

impl CompressionProfile {
    pub fn new(max_width: u32, quality: f32) -> Result<Self> {
        if max_width == 0 {
            return Err(JournalError::Compression(
                "max_width must be greater than zero".to_string(),
            ));
        }
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(JournalError::Compression(format!(
                "quality must be in (0, 1], got {quality}"
            )));
        }
        Ok(Self { max_width, quality })
    }

    fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// Maps each tier to its resize/re-encode profile. `None` has no profile.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    low: CompressionProfile,
    medium: CompressionProfile,
    high: CompressionProfile,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            low: CompressionProfile {
                max_width: 2000,
                quality: 0.9,
            },
            medium: CompressionProfile {
                max_width: 1400,
                quality: 0.7,
            },
            high: CompressionProfile {
                max_width: 1024,
                quality: 0.5,
            },
        }
    }
}

impl TierTable {
    pub fn profile(&self, tier: CompressionTier) -> Option<CompressionProfile> {
        match tier {
            CompressionTier::None => None,
            CompressionTier::Low => Some(self.low),
            CompressionTier::Medium => Some(self.medium),
            CompressionTier::High => Some(self.high),
        }
    }

    pub fn set_profile(&mut self, tier: CompressionTier, profile: CompressionProfile) -> Result<()> {
        let profile = CompressionProfile::new(profile.max_width, profile.quality)?;
        match tier {
            CompressionTier::None => {
                return Err(JournalError::Compression(
                    "the none tier is a passthrough and cannot be configured".to_string(),
                ))
            }
            CompressionTier::Low => self.low = profile,
            CompressionTier::Medium => self.medium = profile,
            CompressionTier::High => self.high = profile,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedImage {
    pub data_url: String,
    pub original_size_kb: f64,
    pub compressed_size_kb: f64,
    pub ratio: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl CompressedImage {
    fn passthrough(data_url: &str) -> Self {
        let size = payload_size_kb(data_url);
        Self {
            data_url: data_url.to_string(),
            original_size_kb: size,
            compressed_size_kb: size,
            ratio: 1.0,
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Compressor {
    table: TierTable,
}

impl Compressor {
    pub fn new(table: TierTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    /// Resizes and re-encodes `data_url` for `tier`. Never fails: an image
    /// that cannot be decoded or encoded is returned unchanged with ratio 1.
    pub fn compress(&self, data_url: &str, tier: CompressionTier) -> CompressedImage {
        let Some(profile) = self.table.profile(tier) else {
            return CompressedImage::passthrough(data_url);
        };
        match reencode(data_url, profile) {
            Ok((encoded, width, height)) => {
                let original_size_kb = payload_size_kb(data_url);
                let compressed_size_kb = payload_size_kb(&encoded);
                let ratio = if original_size_kb > 0.0 {
                    compressed_size_kb / original_size_kb
                } else {
                    1.0
                };
                debug!(
                    tier = %tier,
                    width,
                    height,
                    original_kb = original_size_kb,
                    compressed_kb = compressed_size_kb,
                    "compressed page image"
                );
                CompressedImage {
                    data_url: encoded,
                    original_size_kb,
                    compressed_size_kb,
                    ratio,
                    width: Some(width),
                    height: Some(height),
                }
            }
            Err(err) => {
                warn!(tier = %tier, "compression failed, using original image: {err}");
                CompressedImage::passthrough(data_url)
            }
        }
    }
}

/// Compresses with the default tier table.
pub fn compress(data_url: &str, tier: CompressionTier) -> CompressedImage {
    Compressor::default().compress(data_url, tier)
}

fn reencode(data_url: &str, profile: CompressionProfile) -> Result<(String, u32, u32)> {
    let bytes = decode_data_url(data_url)?;
    let image = decode_upright(&bytes)?;
    let resized = fit_width(image, profile.max_width);
    let (width, height) = resized.dimensions();
    let rgb = resized.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, profile.jpeg_quality())
        .write_image(rgb.as_raw(), width, height, ColorType::Rgb8.into())
        .map_err(|e| JournalError::Compression(format!("failed to encode jpeg: {e}")))?;
    Ok((encode_data_url("image/jpeg", &buf), width, height))
}

/// Decodes and applies the EXIF orientation, since re-encoding drops the tag.
fn decode_upright(bytes: &[u8]) -> Result<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

fn fit_width(image: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width {
        return image;
    }
    let scale = max_width as f64 / width as f64;
    let target_height = ((height as f64) * scale).round().max(1.0) as u32;
    image.resize_exact(max_width, target_height, FilterType::Triangle)
}
