use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub qualifiers: Vec<String>,
    pub entry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields of an entry that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewEntry {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub qualifiers: Vec<String>,
    pub entry_date: Option<DateTime<Utc>>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub text: Option<String>,
    pub images: Option<Vec<String>>,
    pub qualifiers: Option<Vec<String>>,
    pub entry_date: Option<DateTime<Utc>>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.text.is_none()
            && self.images.is_none()
            && self.qualifiers.is_none()
            && self.entry_date.is_none()
    }

    pub fn apply_to(&self, entry: &mut JournalEntry) {
        if let Some(title) = &self.title {
            entry.title = title.clone();
        }
        if let Some(text) = &self.text {
            entry.text = text.clone();
        }
        if let Some(images) = &self.images {
            entry.images = images.clone();
        }
        if let Some(qualifiers) = &self.qualifiers {
            entry.qualifiers = qualifiers.clone();
        }
        if let Some(entry_date) = self.entry_date {
            entry.entry_date = truncate_millis(entry_date);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub entries: Vec<JournalEntry>,
    pub total_count: u64,
}

/// Timestamps are persisted with millisecond precision; values handed back
/// to callers are truncated the same way so they compare equal after a
/// reload.
pub fn truncate_millis(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(value)
}

/// A `Key: Value` tag such as `Tone: Reflective`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qualifier {
    pub key: String,
    pub value: String,
}

impl Qualifier {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (key, value) = raw.split_once(':')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key, value.trim()))
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}

/// Replaces any qualifier with the same key (case-insensitive) and appends
/// the new one. The store accepts duplicates; this keeps one per key.
pub fn set_qualifier(qualifiers: &mut Vec<String>, key: &str, value: &str) {
    qualifiers.retain(|raw| {
        Qualifier::parse(raw)
            .map(|q| !q.key.eq_ignore_ascii_case(key.trim()))
            .unwrap_or(true)
    });
    qualifiers.push(Qualifier::new(key.trim(), value.trim()).to_string());
}

pub fn qualifier_value<'a>(qualifiers: &'a [String], key: &str) -> Option<&'a str> {
    qualifiers.iter().find_map(|raw| {
        let (k, v) = raw.split_once(':')?;
        k.trim().eq_ignore_ascii_case(key.trim()).then(|| v.trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry() -> JournalEntry {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        JournalEntry {
            id: "e1".into(),
            user_id: "u1".into(),
            title: "Morning".into(),
            text: "pages".into(),
            images: vec![],
            qualifiers: vec![],
            entry_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut e = entry();
        let patch = EntryPatch {
            text: Some("edited".into()),
            qualifiers: Some(vec!["Tone: Calm".into()]),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply_to(&mut e);
        assert_eq!(e.title, "Morning");
        assert_eq!(e.text, "edited");
        assert_eq!(e.qualifiers, vec!["Tone: Calm".to_string()]);
        assert!(EntryPatch::default().is_empty());
    }

    #[test]
    fn qualifiers_parse_key_and_value() {
        let q = Qualifier::parse("Tone:  Reflective ").unwrap();
        assert_eq!(q, Qualifier::new("Tone", "Reflective"));
        assert_eq!(q.to_string(), "Tone: Reflective");
        assert!(Qualifier::parse("no separator").is_none());
        assert!(Qualifier::parse(": orphan").is_none());
    }

    #[test]
    fn set_qualifier_keeps_one_per_key() {
        let mut qualifiers = vec![
            "Tone: Calm".to_string(),
            "Place: Home".to_string(),
            "tone: Anxious".to_string(),
        ];
        set_qualifier(&mut qualifiers, "Tone", "Reflective");
        assert_eq!(
            qualifiers,
            vec!["Place: Home".to_string(), "Tone: Reflective".to_string()]
        );
        assert_eq!(qualifier_value(&qualifiers, "tone"), Some("Reflective"));
        assert_eq!(qualifier_value(&qualifiers, "Weather"), None);
    }

    #[test]
    fn entries_serialize_with_storage_field_names() {
        let value = serde_json::to_value(entry()).unwrap();
        assert!(value.get("userId").is_some());
        assert!(value.get("entryDate").is_some());
        assert!(value.get("updatedAt").is_some());
    }

    #[test]
    fn truncation_drops_sub_millisecond_precision() {
        let t = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(truncate_millis(t).timestamp_subsec_nanos(), 123_000_000);
    }
}
