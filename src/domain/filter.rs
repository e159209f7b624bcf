use std::collections::BTreeSet;

use super::Language;

/// Search query plus optional narrowing filters; active parts combine with AND
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Case-insensitive substring, empty matches everything
    pub query: String,
    pub language: Option<Language>,
    /// Snippet must carry at least one of these; `None` or empty means no tag filter
    pub tags: Option<BTreeSet<String>>,
    pub favorites_only: bool,
}

impl SearchFilter {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn favorites_only(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    /// The tag set, if it actually narrows the result
    pub fn active_tags(&self) -> Option<&BTreeSet<String>> {
        self.tags.as_ref().filter(|tags| !tags.is_empty())
    }

    pub fn is_active(&self) -> bool {
        !self.query.is_empty()
            || self.language.is_some()
            || self.active_tags().is_some()
            || self.favorites_only
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
