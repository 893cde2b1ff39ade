//! Banned-phrase content filter.
//!
//! Phrases are lowercased once at construction; lookups lowercase the message
//! and do a plain substring scan, so `"spam"` blocks `"SPAMMY offer"`.

/// Immutable list of banned phrases, shared read-only by every session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseFilter {
    phrases: Vec<String>,
}

impl PhraseFilter {
    /// Build a filter. Blank phrases are dropped since they would match every message.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Does `text` contain any banned phrase (case-insensitive)?
    pub fn contains_banned(&self, text: &str) -> bool {
        if text.is_empty() || self.phrases.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }

    /// The phrases in load order (lowercased).
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}
