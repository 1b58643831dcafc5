use crate::error::{JournalError, Result};
use crate::extract::{ExtractionOutcome, TextExtractor};
use crate::source::decode_data_url;

#[cfg(feature = "ocr")]
use {
    image::{codecs::png::PngEncoder, ColorType, ImageEncoder},
    leptess::LepTess,
    std::io::Write,
    tempfile::NamedTempFile,
};

/// Offline extractor backed by a local Tesseract install. Only available
/// with the `ocr` feature; without it every page fails with a structured
/// error.
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    languages: Vec<String>,
}

impl TesseractExtractor {
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }

    fn extract(&self, image_data_url: &str) -> Result<String> {
        let bytes = decode_data_url(image_data_url)?;
        let image = image::load_from_memory(&bytes)?;
        image_to_text(&image, &self.languages)
    }
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new(vec!["eng".to_string()])
    }
}

impl TextExtractor for TesseractExtractor {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn submit(&self, image_data_url: &str) -> ExtractionOutcome {
        match self.extract(image_data_url) {
            Ok(text) => ExtractionOutcome::success(text.trim_end()),
            Err(err) => ExtractionOutcome::failure(err.to_string()),
        }
    }
}

#[cfg(feature = "ocr")]
fn image_to_text(image: &image::DynamicImage, languages: &[String]) -> Result<String> {
    let lang = if languages.is_empty() {
        "eng".to_string()
    } else {
        languages.join("+")
    };
    let mut tess = LepTess::new(None, &lang)
        .map_err(|e| JournalError::Extraction(format!("failed to initialise tesseract: {e}")))?;
    let mut temp = NamedTempFile::new()?;
    {
        let rgba = image.to_rgba8();
        PngEncoder::new(temp.as_file_mut())
            .write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ColorType::Rgba8.into(),
            )
            .map_err(|e| JournalError::Extraction(format!("failed to encode image for ocr: {e}")))?;
        temp.flush()?;
    }
    let temp_path = temp.into_temp_path();
    let path_str = temp_path
        .to_str()
        .ok_or_else(|| JournalError::Extraction("temp image path not valid UTF-8".to_string()))?
        .to_string();
    if !tess.set_image(&path_str) {
        let _ = temp_path.close();
        return Err(JournalError::Extraction(
            "failed to load image into tesseract".to_string(),
        ));
    }
    let text = tess
        .get_utf8_text()
        .map_err(|e| JournalError::Extraction(format!("tesseract failed: {e}")))?;
    let _ = temp_path.close();
    Ok(text)
}

#[cfg(not(feature = "ocr"))]
fn image_to_text(_image: &image::DynamicImage, _languages: &[String]) -> Result<String> {
    Err(JournalError::OcrSupportDisabled)
}
