use std::collections::{BTreeSet, HashSet};

use crate::domain::{Language, SearchFilter, Snippet};

/// Overview numbers for a snippet collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub total: usize,
    /// Distinct languages in use
    pub languages: usize,
    /// Distinct tags in use
    pub tags: usize,
    pub top_language: Option<Language>,
}

/// Search and aggregation over an in-memory snippet collection.
///
/// All functions are pure: they never mutate the input and return results in
/// input order.
pub struct SearchEngine;

impl SearchEngine {
    /// Snippets matching the query and every active filter
    pub fn search<'a>(snippets: &'a [Snippet], filter: &SearchFilter) -> Vec<&'a Snippet> {
        let needle = filter.query.to_lowercase();
        let tags = filter.active_tags();

        snippets
            .iter()
            .filter(|snippet| needle.is_empty() || snippet.contains_text(&needle))
            .filter(|snippet| filter.language.is_none_or(|language| snippet.language == language))
            .filter(|snippet| tags.is_none_or(|tags| tags.iter().any(|tag| snippet.has_tag(tag))))
            .filter(|snippet| !filter.favorites_only || snippet.is_favorite)
            .collect()
    }

    /// Every tag used in the collection, sorted and de-duplicated
    pub fn all_tags(snippets: &[Snippet]) -> Vec<String> {
        snippets
            .iter()
            .flat_map(|snippet| snippet.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn stats(snippets: &[Snippet]) -> LibraryStats {
        // (language, count) in order of first appearance
        let mut counts: Vec<(Language, usize)> = Vec::new();
        for snippet in snippets {
            match counts.iter_mut().find(|(language, _)| *language == snippet.language) {
                Some((_, count)) => *count += 1,
                None => counts.push((snippet.language, 1)),
            }
        }

        let mut top: Option<(Language, usize)> = None;
        for &(language, count) in &counts {
            if top.is_none_or(|(_, best)| count > best) {
                top = Some((language, count));
            }
        }

        let tags: HashSet<&str> = snippets
            .iter()
            .flat_map(|snippet| snippet.tags.iter().map(String::as_str))
            .collect();

        LibraryStats {
            total: snippets.len(),
            languages: counts.len(),
            tags: tags.len(),
            top_language: top.map(|(language, _)| language),
        }
    }
}
