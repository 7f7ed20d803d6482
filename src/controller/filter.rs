//! Repetition filter for partial transcripts.

use std::collections::{HashMap, HashSet};

/// Drops partials that repeat the previous partial of the same channel or
/// match an ignore-list token. Finals always pass and reset the channel.
#[derive(Debug, Default)]
pub struct TranscriptFilter {
    ignored: HashSet<String>,
    last_partial: HashMap<String, String>,
}

impl TranscriptFilter {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ignored: ignored
                .into_iter()
                .map(|s| normalize(s.as_ref()))
                .collect(),
            last_partial: HashMap::new(),
        }
    }

    /// Returns true when the transcript should be published.
    pub fn admit(&mut self, channel_id: &str, text: &str, is_final: bool) -> bool {
        if is_final {
            self.last_partial.remove(channel_id);
            return true;
        }

        let normalized = normalize(text);
        if self.ignored.contains(&normalized) {
            return false;
        }
        if self
            .last_partial
            .get(channel_id)
            .is_some_and(|last| *last == normalized)
        {
            return false;
        }
        self.last_partial.insert(channel_id.to_string(), normalized);
        true
    }

    pub fn forget(&mut self, channel_id: &str) {
        self.last_partial.remove(channel_id);
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> TranscriptFilter {
        TranscriptFilter::new(["", "the"])
    }

    #[test]
    fn test_repeated_partial_dropped() {
        let mut filter = filter();
        assert!(filter.admit("ch", "hello", false));
        assert!(!filter.admit("ch", "hello", false));
        assert!(filter.admit("ch", "hello world", false));
    }

    #[test]
    fn test_ignore_list_applies_to_partials_only() {
        let mut filter = filter();
        assert!(!filter.admit("ch", "", false));
        assert!(!filter.admit("ch", " The ", false));
        assert!(filter.admit("ch", "the", true));
    }

    #[test]
    fn test_final_bypasses_repetition_and_resets() {
        let mut filter = TranscriptFilter::new([""]);
        assert!(filter.admit("ch", "the", false));
        assert!(filter.admit("ch", "the", true));
        assert!(filter.admit("ch", "the", true));
        assert!(filter.admit("ch", "the", false));
        assert!(!filter.admit("ch", "the", false));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut filter = filter();
        assert!(filter.admit("a", "hi", false));
        assert!(filter.admit("b", "hi", false));
        filter.forget("a");
        assert!(filter.admit("a", "hi", false));
    }
}
