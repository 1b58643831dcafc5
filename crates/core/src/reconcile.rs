use crate::batch::{combine_pages, BatchResult, ExtractionResult};
use crate::error::{JournalError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorView {
    #[default]
    PerPage,
    Combined,
}

/// What an editor surface renders for the active view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewProjection<'a> {
    PerPage(&'a [ExtractionResult]),
    Combined(&'a str),
}

type EditObserver = Box<dyn FnMut(&str, &[ExtractionResult])>;

/// Holds the per-page and combined representations of one batch.
///
/// Sync is one-way: a page edit rebuilds the combined text from all
/// successful pages, while a combined edit only replaces the combined text
/// and leaves the page texts as they were. Switching views never recomputes.
pub struct DualViewReconciler {
    batch: BatchResult,
    view: EditorView,
    observers: Vec<EditObserver>,
}

impl DualViewReconciler {
    pub fn new(batch: BatchResult) -> Self {
        Self {
            batch,
            view: EditorView::default(),
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&str, &[ExtractionResult]) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn view(&self) -> EditorView {
        self.view
    }

    pub fn results(&self) -> &[ExtractionResult] {
        &self.batch.results
    }

    pub fn combined_text(&self) -> &str {
        &self.batch.combined_text
    }

    /// Replaces the text of page `index` (0-based) and rebuilds the combined
    /// text. Failed pages have no text to edit.
    pub fn edit_page(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        let len = self.batch.results.len();
        let result = self
            .batch
            .results
            .get_mut(index)
            .ok_or(JournalError::PageOutOfRange { page: index, len })?;
        if !result.success {
            return Err(JournalError::PageNotEditable(index));
        }
        result.extracted_text = text.into();
        self.batch.combined_text = combine_pages(&self.batch.results);
        self.emit();
        Ok(())
    }

    pub fn edit_combined(&mut self, text: impl Into<String>) {
        self.batch.combined_text = text.into();
        self.emit();
    }

    pub fn switch_view(&mut self, view: EditorView) -> ViewProjection<'_> {
        self.view = view;
        self.projection()
    }

    pub fn projection(&self) -> ViewProjection<'_> {
        match self.view {
            EditorView::PerPage => ViewProjection::PerPage(&self.batch.results),
            EditorView::Combined => ViewProjection::Combined(&self.batch.combined_text),
        }
    }

    pub fn into_batch(self) -> BatchResult {
        self.batch
    }

    fn emit(&mut self) {
        for observer in self.observers.iter_mut() {
            observer(&self.batch.combined_text, &self.batch.results);
        }
    }
}
