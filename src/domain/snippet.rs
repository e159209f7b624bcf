use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::Language;

/// A stored snippet, shaped like a row of the `snippets` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub owner_id: Uuid,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    pub code: String,
    pub language: Language,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub copy_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Snippet {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// `needle` must already be lowercase
    pub fn contains_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.code.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }

    /// Applies the fields present in `patch` and stamps `updated_at`
    pub fn apply_patch(&mut self, patch: &SnippetPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(code) = &patch.code {
            self.code = code.clone();
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(is_favorite) = patch.is_favorite {
            self.is_favorite = is_favorite;
        }
        self.updated_at = now.max(self.created_at);
    }
}

/// Raw snippet input as typed into the editor form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnippetForm {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A validated, normalized snippet ready to be inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetDraft {
    pub title: String,
    pub description: String,
    pub code: String,
    pub language: Language,
    pub tags: Vec<String>,
}

impl SnippetDraft {
    /// Materializes the draft as a row owned by `owner_id`
    pub fn into_snippet(self, id: Uuid, owner_id: Uuid, now: DateTime<Utc>) -> Snippet {
        Snippet {
            id,
            owner_id,
            title: self.title,
            description: self.description,
            code: self.code,
            language: self.language,
            tags: self.tags,
            is_favorite: false,
            copy_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; only `Some` fields are sent to the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnippetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl SnippetPatch {
    pub fn favorite(is_favorite: bool) -> Self {
        Self {
            is_favorite: Some(is_favorite),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.code.is_none()
            && self.language.is_none()
            && self.tags.is_none()
            && self.is_favorite.is_none()
    }
}
