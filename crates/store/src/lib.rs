pub mod commit;
pub mod error;
pub mod store;
pub mod upload;

pub use commit::{commit_entry, EntryDraft};
pub use error::{Result, StoreError};
pub use store::{EntryStore, SqliteEntryStore, DEFAULT_PAGE_SIZE};
pub use upload::{ImageUploader, LocalUploader};
