//! Tag set management
//!
//! Tags are free-form labels with set semantics: at most [`MAX_TAGS`] per
//! event, each at most [`MAX_TAG_LEN`] characters, kept in insertion order.

use tracing::debug;
use uuid::Uuid;

use crate::error::{EventError, EventResult};
use crate::storage::Storage;

/// Maximum number of tags on one event
pub const MAX_TAGS: usize = 5;

/// Maximum length of one tag, in characters
pub const MAX_TAG_LEN: usize = 20;

/// Normalizes and stores event tag sets
#[derive(Clone)]
pub struct TagIndex {
    storage: Storage,
}

impl TagIndex {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Trim, drop blanks, truncate, dedup (case-sensitive) and keep the first five
    pub fn normalize<I, S>(tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::with_capacity(MAX_TAGS);

        for tag in tags {
            let trimmed = tag.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }

            let tag: String = trimmed.chars().take(MAX_TAG_LEN).collect();
            let tag = tag.trim_end().to_string();
            if normalized.contains(&tag) {
                continue;
            }

            normalized.push(tag);
            if normalized.len() == MAX_TAGS {
                break;
            }
        }

        normalized
    }

    /// Replace the whole tag set of an event
    pub async fn replace(&self, event_id: Uuid, tags: Vec<String>) -> EventResult<Vec<String>> {
        let tags = Self::normalize(tags);

        let replaced = self
            .storage
            .bounded(self.storage.backend().replace_tags(event_id, tags.clone()))
            .await?;
        if !replaced {
            return Err(EventError::event_not_found(event_id));
        }

        debug!(%event_id, count = tags.len(), "Replaced event tags");
        Ok(tags)
    }

    /// Tags of an event in insertion order
    pub async fn for_event(&self, event_id: Uuid) -> EventResult<Vec<String>> {
        self.storage
            .bounded(self.storage.backend().tags_for(event_id))
            .await?
            .ok_or_else(|| EventError::event_not_found(event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_drops_blanks() {
        assert_eq!(
            TagIndex::normalize(["  Tech ", "", "   ", "Music"]),
            vec!["Tech".to_string(), "Music".to_string()]
        );
    }

    #[test]
    fn test_normalize_dedups_case_sensitively() {
        assert_eq!(
            TagIndex::normalize(["Tech", "tech", "Tech", " Tech"]),
            vec!["Tech".to_string(), "tech".to_string()]
        );
    }

    #[test]
    fn test_normalize_truncates_long_tags() {
        let tags = TagIndex::normalize(["Photography and film club", "abcdefghijklmnopqrs tuv"]);
        assert_eq!(tags[0], "Photography and film");
        assert_eq!(tags[1], "abcdefghijklmnopqrs");
        assert!(tags.iter().all(|t| t.chars().count() <= MAX_TAG_LEN));
    }

    #[test]
    fn test_normalize_keeps_first_five_distinct() {
        let tags = TagIndex::normalize(["a", "b", "a", "c", "d", "e", "f", "g"]);
        assert_eq!(tags, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_normalize_counts_characters_not_bytes() {
        let tags = TagIndex::normalize(["İstanbulBoğazTuruGecesi"]);
        assert_eq!(tags[0].chars().count(), MAX_TAG_LEN);
    }
}
