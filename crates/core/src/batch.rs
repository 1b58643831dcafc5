use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::annotate::{annotate, ErrorRange};
use crate::compress::{CompressedImage, CompressionTier, Compressor};
use crate::extract::{ExtractionOutcome, TextExtractor};
use crate::source::PageSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub image_ref: String,
    pub extracted_text: String,
    pub success: bool,
    #[serde(default)]
    pub error_ranges: Vec<ErrorRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    fn succeeded(image_ref: String, text: String) -> Self {
        let error_ranges = annotate(&text);
        Self {
            image_ref,
            extracted_text: text,
            success: true,
            error_ranges,
            error: None,
        }
    }

    fn failed(image_ref: String, error: String) -> Self {
        Self {
            image_ref,
            extracted_text: String::new(),
            success: false,
            error_ranges: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BatchResult {
    pub results: Vec<ExtractionResult>,
    pub combined_text: String,
    /// Compressed payload per page, `None` where the source could not be read.
    #[serde(skip)]
    pub pages: Vec<Option<CompressedImage>>,
}

impl BatchResult {
    pub fn outcome(&self) -> BatchOutcome {
        let failed_pages: Vec<usize> = self
            .results
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.success)
            .map(|(idx, _)| idx + 1)
            .collect();
        if failed_pages.len() == self.results.len() {
            BatchOutcome::AllFailed
        } else if failed_pages.is_empty() {
            BatchOutcome::AllSucceeded
        } else {
            BatchOutcome::PartialSuccess { failed_pages }
        }
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Unstarted,
    LoadingSourceImages,
    Extracting,
    AllFailed,
    PartialSuccess,
    AllSucceeded,
}

impl BatchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchPhase::AllFailed | BatchPhase::PartialSuccess | BatchPhase::AllSucceeded
        )
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BatchPhase::Unstarted => "unstarted",
            BatchPhase::LoadingSourceImages => "loading_source_images",
            BatchPhase::Extracting => "extracting",
            BatchPhase::AllFailed => "all_failed",
            BatchPhase::PartialSuccess => "partial_success",
            BatchPhase::AllSucceeded => "all_succeeded",
        };
        f.write_str(label)
    }
}

/// Terminal state of one batch attempt. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    AllFailed,
    PartialSuccess { failed_pages: Vec<usize> },
    AllSucceeded,
}

impl BatchOutcome {
    pub fn phase(&self) -> BatchPhase {
        match self {
            BatchOutcome::AllFailed => BatchPhase::AllFailed,
            BatchOutcome::PartialSuccess { .. } => BatchPhase::PartialSuccess,
            BatchOutcome::AllSucceeded => BatchPhase::AllSucceeded,
        }
    }

    /// Nothing usable was extracted; the caller should offer manual entry.
    pub fn offers_manual_entry(&self) -> bool {
        matches!(self, BatchOutcome::AllFailed)
    }
}

/// Joins successful pages as `[Page k]` blocks, `k` being the page's original
/// 1-based position. Failed pages are skipped without renumbering.
pub fn combine_pages(results: &[ExtractionResult]) -> String {
    let mut combined = String::new();
    for (idx, result) in results.iter().enumerate() {
        if !result.success {
            continue;
        }
        combined.push_str(&format!("[Page {}]\n{}\n\n", idx + 1, result.extracted_text));
    }
    combined.truncate(combined.trim_end().len());
    combined
}

type PhaseObserver<'a> = Box<dyn FnMut(BatchPhase) + 'a>;

/// Drives a `TextExtractor` over an ordered list of pages, one call at a
/// time. Per-page failures are recorded and never abort the batch.
pub struct BatchOrchestrator<'a, E> {
    extractor: &'a E,
    compressor: Compressor,
    tier: CompressionTier,
    phase: BatchPhase,
    observer: Option<PhaseObserver<'a>>,
}

impl<'a, E: TextExtractor> BatchOrchestrator<'a, E> {
    pub fn new(extractor: &'a E) -> Self {
        Self {
            extractor,
            compressor: Compressor::default(),
            tier: CompressionTier::None,
            phase: BatchPhase::Unstarted,
            observer: None,
        }
    }

    pub fn with_compression(mut self, compressor: Compressor, tier: CompressionTier) -> Self {
        self.compressor = compressor;
        self.tier = tier;
        self
    }

    pub fn on_phase(mut self, observer: impl FnMut(BatchPhase) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub async fn process_images(&mut self, sources: &[PageSource]) -> BatchResult {
        self.transition(BatchPhase::LoadingSourceImages);
        let mut loaded = Vec::with_capacity(sources.len());
        for (idx, source) in sources.iter().enumerate() {
            match source.load() {
                Ok(data_url) => {
                    let image = self.compressor.compress(&data_url, self.tier);
                    debug!(page = idx + 1, ratio = image.ratio, "loaded page image");
                    loaded.push(Ok(image));
                }
                Err(err) => {
                    warn!(page = idx + 1, source = %source, "failed to load page image: {err}");
                    loaded.push(Err(err.to_string()));
                }
            }
        }

        self.transition(BatchPhase::Extracting);
        let mut batch = BatchResult::default();
        for (idx, (source, image)) in sources.iter().zip(loaded).enumerate() {
            let page = idx + 1;
            let image_ref = source.image_ref();
            let image = match image {
                Ok(image) => image,
                Err(err) => {
                    batch.results.push(ExtractionResult::failed(image_ref, err));
                    batch.pages.push(None);
                    continue;
                }
            };
            let result = match self.extractor.submit(&image.data_url).await {
                ExtractionOutcome::Success { text, error_ranges } => {
                    let result = ExtractionResult::succeeded(image_ref, text);
                    if !error_ranges.is_empty() && error_ranges != result.error_ranges {
                        debug!(
                            page,
                            reported = error_ranges.len(),
                            annotated = result.error_ranges.len(),
                            "extractor ranges differ from bracket annotation"
                        );
                    }
                    result
                }
                ExtractionOutcome::Failure { error } => {
                    warn!(page, extractor = self.extractor.name(), "extraction failed: {error}");
                    ExtractionResult::failed(image_ref, error)
                }
            };
            batch.results.push(result);
            batch.pages.push(Some(image));
        }
        batch.combined_text = combine_pages(&batch.results);

        let outcome = batch.outcome();
        info!(
            pages = batch.results.len(),
            succeeded = batch.success_count(),
            state = %outcome.phase(),
            "batch extraction finished"
        );
        self.transition(outcome.phase());
        batch
    }

    fn transition(&mut self, next: BatchPhase) {
        debug!(from = %self.phase, to = %next, "batch phase");
        self.phase = next;
        if let Some(observer) = self.observer.as_mut() {
            observer(next);
        }
    }
}
