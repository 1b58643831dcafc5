use anyhow::{anyhow, Result};
use pagescribe_core::{ExtractionOutcome, TesseractExtractor, TextExtractor};
use pagescribe_llm::{VisionClient, VisionProvider};

/// Backend chosen at runtime from config or flags.
pub enum Extractor {
    Vision(VisionClient),
    Tesseract(TesseractExtractor),
}

impl Extractor {
    pub fn build(provider: &str, model: Option<String>, ocr_langs: Vec<String>) -> Result<Self> {
        if provider.trim().eq_ignore_ascii_case("tesseract") {
            return Ok(Extractor::Tesseract(TesseractExtractor::new(ocr_langs)));
        }
        let provider = VisionProvider::from_str(provider)
            .ok_or_else(|| anyhow!("unknown provider {provider}"))?;
        let model = model.unwrap_or_else(|| provider.default_model().to_string());
        Ok(Extractor::Vision(VisionClient::new(provider, model)?))
    }
}

impl TextExtractor for Extractor {
    fn name(&self) -> &str {
        match self {
            Extractor::Vision(client) => client.name(),
            Extractor::Tesseract(tess) => tess.name(),
        }
    }

    async fn submit(&self, image_data_url: &str) -> ExtractionOutcome {
        match self {
            Extractor::Vision(client) => client.submit(image_data_url).await,
            Extractor::Tesseract(tess) => tess.submit(image_data_url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tesseract_needs_no_credentials() {
        let extractor = Extractor::build("Tesseract", None, vec!["eng".into()]).unwrap();
        assert_eq!(extractor.name(), "tesseract");
    }

    #[test]
    fn unknown_providers_are_rejected() {
        let err = Extractor::build("carrier-pigeon", None, vec![]).err().unwrap();
        assert!(err.to_string().contains("unknown provider"));
    }
}
