mod annotate;
mod batch;
mod compress;
mod error;
mod extract;
mod model;
mod ocr;
mod reconcile;
mod source;

pub use annotate::{annotate, ErrorRange};
pub use batch::{
    combine_pages, BatchOrchestrator, BatchOutcome, BatchPhase, BatchResult, ExtractionResult,
};
pub use compress::{
    compress, CompressedImage, CompressionProfile, CompressionTier, Compressor, TierTable,
};
pub use error::{JournalError, Result};
pub use extract::{ExtractionOutcome, TextExtractor};
pub use model::{
    qualifier_value, set_qualifier, truncate_millis, EntryPage, EntryPatch, JournalEntry,
    NewEntry, Qualifier,
};
pub use ocr::TesseractExtractor;
pub use reconcile::{DualViewReconciler, EditorView, ViewProjection};
pub use source::{decode_data_url, encode_data_url, payload_size_kb, split_data_url, PageSource};
