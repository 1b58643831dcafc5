use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pagescribe_core::{truncate_millis, EntryPage, EntryPatch, JournalEntry, NewEntry};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StoreError};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Durable journal entry repository. Every operation is scoped to a user;
/// entries owned by someone else read as `NotFound`.
pub trait EntryStore {
    fn create(&self, user_id: &str, entry: NewEntry) -> Result<JournalEntry>;
    fn get_by_id(&self, user_id: &str, id: &str) -> Result<JournalEntry>;
    fn update(&self, user_id: &str, id: &str, patch: &EntryPatch) -> Result<JournalEntry>;
    fn delete(&self, user_id: &str, id: &str) -> Result<()>;
    /// `page` is 1-based; entries are ordered by entry date, newest first.
    fn list(&self, user_id: &str, page: usize, page_size: usize) -> Result<EntryPage>;
    fn count(&self, user_id: &str) -> Result<u64>;
}

#[derive(Clone)]
pub struct SqliteEntryStore {
    path: PathBuf,
}

impl SqliteEntryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        store.init()?;
        info!(path = %store.path.display(), "entry store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        // Commits are not acknowledged until they reach disk.
        conn.pragma_update(None, "synchronous", "FULL")?;
        Ok(conn)
    }

    fn init(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                text TEXT NOT NULL,
                images TEXT NOT NULL DEFAULT '[]',
                qualifiers TEXT NOT NULL DEFAULT '[]',
                entry_date INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_user_date ON entries(user_id, entry_date DESC);
            "#,
        )?;
        Ok(())
    }
}

const SELECT_COLUMNS: &str =
    "id, user_id, title, text, images, qualifiers, entry_date, created_at, updated_at";

impl EntryStore for SqliteEntryStore {
    fn create(&self, user_id: &str, entry: NewEntry) -> Result<JournalEntry> {
        require_user(user_id)?;
        let now = truncate_millis(Utc::now());
        let record = JournalEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: entry.title,
            text: entry.text,
            images: entry.images,
            qualifiers: entry.qualifiers,
            entry_date: truncate_millis(entry.entry_date.unwrap_or(now)),
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO entries (id, user_id, title, text, images, qualifiers, entry_date, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.user_id,
                record.title,
                record.text,
                serde_json::to_value(&record.images)?,
                serde_json::to_value(&record.qualifiers)?,
                record.entry_date.timestamp_millis(),
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;
        debug!(entry_id = %record.id, "created entry");
        Ok(record)
    }

    fn get_by_id(&self, user_id: &str, id: &str) -> Result<JournalEntry> {
        let conn = self.connection()?;
        fetch(&conn, user_id, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update(&self, user_id: &str, id: &str, patch: &EntryPatch) -> Result<JournalEntry> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let mut entry =
            fetch(&tx, user_id, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(&mut entry);
        entry.updated_at = truncate_millis(Utc::now()).max(entry.updated_at);
        tx.execute(
            "UPDATE entries SET title = ?1, text = ?2, images = ?3, qualifiers = ?4, entry_date = ?5, updated_at = ?6 WHERE id = ?7 AND user_id = ?8",
            params![
                entry.title,
                entry.text,
                serde_json::to_value(&entry.images)?,
                serde_json::to_value(&entry.qualifiers)?,
                entry.entry_date.timestamp_millis(),
                entry.updated_at.timestamp_millis(),
                entry.id,
                entry.user_id,
            ],
        )?;
        tx.commit()?;
        debug!(entry_id = %entry.id, "updated entry");
        Ok(entry)
    }

    fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        let conn = self.connection()?;
        let removed = conn.execute(
            "DELETE FROM entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        debug!(entry_id = %id, "deleted entry");
        Ok(())
    }

    fn list(&self, user_id: &str, page: usize, page_size: usize) -> Result<EntryPage> {
        if page == 0 || page_size == 0 {
            return Err(StoreError::Validation(
                "page and page_size must be at least 1".to_string(),
            ));
        }
        let conn = self.connection()?;
        let total_count = count_for(&conn, user_id)?;
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
        let offset = (page - 1)
            .checked_mul(page_size)
            .and_then(|offset| i64::try_from(offset).ok());
        let Some(offset) = offset else {
            return Ok(EntryPage {
                entries: Vec::new(),
                total_count,
            });
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM entries WHERE user_id = ?1 ORDER BY entry_date DESC, created_at DESC, id LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![user_id, limit, offset],
            EntryRow::from_row,
        )?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(EntryPage {
            entries,
            total_count,
        })
    }

    fn count(&self, user_id: &str) -> Result<u64> {
        let conn = self.connection()?;
        count_for(&conn, user_id)
    }
}

fn require_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(StoreError::Validation("user id is required".to_string()));
    }
    Ok(())
}

fn fetch(conn: &Connection, user_id: &str, id: &str) -> Result<Option<JournalEntry>> {
    let row = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM entries WHERE id = ?1 AND user_id = ?2"),
            params![id, user_id],
            EntryRow::from_row,
        )
        .optional()?;
    row.map(EntryRow::into_entry).transpose()
}

fn count_for(conn: &Connection, user_id: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

struct EntryRow {
    id: String,
    user_id: String,
    title: String,
    text: String,
    images: Value,
    qualifiers: Value,
    entry_date: i64,
    created_at: i64,
    updated_at: i64,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            text: row.get(3)?,
            images: row.get(4)?,
            qualifiers: row.get(5)?,
            entry_date: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_entry(self) -> Result<JournalEntry> {
        Ok(JournalEntry {
            images: serde_json::from_value(self.images)?,
            qualifiers: serde_json::from_value(self.qualifiers)?,
            entry_date: millis(&self.id, self.entry_date)?,
            created_at: millis(&self.id, self.created_at)?,
            updated_at: millis(&self.id, self.updated_at)?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            text: self.text,
        })
    }
}

fn millis(id: &str, value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| StoreError::Corrupt(format!("entry {id} has invalid timestamp {value}")))
}
