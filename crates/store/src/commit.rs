use chrono::{DateTime, Utc};
use pagescribe_core::{BatchResult, CompressedImage, EntryPatch, JournalEntry, NewEntry};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::store::EntryStore;
use crate::upload::ImageUploader;

/// Everything an editing session produced, held in memory until
/// `commit_entry` writes it. Dropping a draft leaves the store untouched.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub title: String,
    pub text: String,
    pub qualifiers: Vec<String>,
    pub entry_date: Option<DateTime<Utc>>,
    pub images: Vec<CompressedImage>,
}

impl EntryDraft {
    /// Takes the combined text and the readable page images of a batch.
    pub fn from_batch(batch: &BatchResult, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: batch.combined_text.clone(),
            images: batch.pages.iter().flatten().cloned().collect(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(StoreError::Validation("entry text is empty".to_string()));
        }
        Ok(())
    }
}

/// Validates the draft, uploads its images, then creates a new entry or,
/// with `existing_id`, updates that entry in a single store write. Uploaded
/// images are appended to the entry's existing image references.
pub fn commit_entry<S, U>(
    store: &S,
    uploader: &U,
    user_id: &str,
    existing_id: Option<&str>,
    draft: EntryDraft,
) -> Result<JournalEntry>
where
    S: EntryStore,
    U: ImageUploader,
{
    if user_id.trim().is_empty() {
        return Err(StoreError::Validation("user id is required".to_string()));
    }
    draft.validate()?;

    let existing = existing_id
        .map(|id| store.get_by_id(user_id, id))
        .transpose()?;

    let mut references = Vec::with_capacity(draft.images.len());
    for image in &draft.images {
        references.push(uploader.upload(user_id, image)?);
    }

    let entry = match existing {
        Some(current) => {
            let mut images = current.images.clone();
            for reference in references {
                if !images.contains(&reference) {
                    images.push(reference);
                }
            }
            let patch = EntryPatch {
                title: (!draft.title.is_empty()).then_some(draft.title),
                text: Some(draft.text),
                images: Some(images),
                qualifiers: (!draft.qualifiers.is_empty()).then_some(draft.qualifiers),
                entry_date: draft.entry_date,
            };
            store.update(user_id, &current.id, &patch)?
        }
        None => store.create(
            user_id,
            NewEntry {
                title: draft.title,
                text: draft.text,
                images: references,
                qualifiers: draft.qualifiers,
                entry_date: draft.entry_date,
            },
        )?,
    };
    info!(entry_id = %entry.id, images = entry.images.len(), "committed entry");
    Ok(entry)
}
