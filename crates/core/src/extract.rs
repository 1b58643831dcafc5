use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::annotate::ErrorRange;

/// Structured reply of a text-extraction backend for one image. Backends
/// report failures here instead of returning `Err`, so a batch can carry on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success {
        text: String,
        #[serde(default)]
        error_ranges: Vec<ErrorRange>,
    },
    Failure {
        error: String,
    },
}

impl ExtractionOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        ExtractionOutcome::Success {
            text: text.into(),
            error_ranges: Vec::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ExtractionOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success { .. })
    }
}

/// Vision-to-text backend. Implementations receive one `data:` URL at a
/// time and are never called concurrently by the batch orchestrator.
pub trait TextExtractor {
    fn name(&self) -> &str;

    fn submit(&self, image_data_url: &str) -> impl Future<Output = ExtractionOutcome>;
}
