use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Text,
    Markdown,
    Code,
    Image,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Code => "code",
            Self::Image => "image",
        }
    }
}

/// A typed content block within a note. Section ids are UUIDs and stay
/// stable for the section's lifetime; `content` is always present, even for
/// image sections (placeholder text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// The top-level persisted unit. `location` is derived from the index when a
/// note is loaded and is never written into the note file itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub location: Option<String>,
}

/// Index entry for one note file. Older index documents used `path` instead
/// of `location`; the alias keeps them readable, writes always use
/// `location`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(alias = "path")]
    pub location: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NoteSummary {
    pub fn of(note: &Note, location: &str) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            created_at: note.created_at,
            updated_at: note.updated_at,
            location: location.to_string(),
            tags: note.tags.clone(),
        }
    }
}

pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteIndex {
    pub version: u32,
    pub notes: Vec<NoteSummary>,
}

/// Optional initial fields for `create_note`. Anything left unset falls back
/// to the store defaults (fresh UUID, "New Note", empty sections and tags).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    pub id: Option<String>,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub sections: Option<Vec<Section>>,
}
