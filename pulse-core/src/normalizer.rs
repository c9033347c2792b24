//! Maps free-text symptom descriptions onto canonical symptom keys.
//!
//! A [`Vocabulary`] lists tags with their trigger words, priority-ordered
//! composite rules, single-tag fallbacks and a generic key. Matching is
//! case-insensitive substring search, except for whole-word triggers; the
//! first composite rule whose requirements all hold wins.

use serde::Serialize;

/// A tag is present when any trigger occurs in the lowercased input, or
/// any of `words` appears as a whole word.
#[derive(Debug, Clone, Copy)]
pub struct TagTrigger {
    pub tag: &'static str,
    pub triggers: &'static [&'static str],
    pub words: &'static [&'static str],
}

impl TagTrigger {
    fn matches(&self, lowered: &str) -> bool {
        self.triggers.iter().any(|t| lowered.contains(t))
            || lowered
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| self.words.contains(&word))
    }
}

/// Composite key produced when every requirement group has at least one
/// present tag.
#[derive(Debug, Clone, Copy)]
pub struct CompositeRule {
    pub key: &'static str,
    pub requires: &'static [&'static [&'static str]],
}

#[derive(Debug, Clone, Copy)]
pub struct DominantTag {
    pub tag: &'static str,
    pub key: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    pub tags: &'static [TagTrigger],
    pub composites: &'static [CompositeRule],
    pub dominant: &'static [DominantTag],
    pub modifiers: &'static [TagTrigger],
    pub generic_key: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Composite,
    Dominant,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedSymptoms {
    pub key: &'static str,
    /// Present tags in vocabulary declaration order.
    pub tags: Vec<&'static str>,
    pub source: KeySource,
}

impl NormalizedSymptoms {
    /// The composite key, when one of the combination rules fired.
    pub fn combination(&self) -> Option<&'static str> {
        match self.source {
            KeySource::Composite => Some(self.key),
            _ => None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| *t == tag)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SymptomNormalizer {
    vocabulary: &'static Vocabulary,
}

impl SymptomNormalizer {
    pub fn new(vocabulary: &'static Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &'static Vocabulary {
        self.vocabulary
    }

    pub fn normalize(&self, text: &str) -> NormalizedSymptoms {
        let lowered = text.to_lowercase();
        let tags = matching_tags(self.vocabulary.tags, &lowered);

        let composite = self.vocabulary.composites.iter().find(|rule| {
            rule.requires
                .iter()
                .all(|group| group.iter().any(|tag| tags.contains(tag)))
        });
        if let Some(rule) = composite {
            return NormalizedSymptoms {
                key: rule.key,
                tags,
                source: KeySource::Composite,
            };
        }

        let dominant = self
            .vocabulary
            .dominant
            .iter()
            .find(|d| tags.contains(&d.tag));
        match dominant {
            Some(d) => NormalizedSymptoms {
                key: d.key,
                tags,
                source: KeySource::Dominant,
            },
            None => NormalizedSymptoms {
                key: self.vocabulary.generic_key,
                tags,
                source: KeySource::Generic,
            },
        }
    }

    /// Severity modifiers ("sudden", "severe", ...) present in the text.
    pub fn modifiers(&self, text: &str) -> Vec<&'static str> {
        matching_tags(self.vocabulary.modifiers, &text.to_lowercase())
    }
}

fn matching_tags(triggers: &'static [TagTrigger], lowered: &str) -> Vec<&'static str> {
    triggers
        .iter()
        .filter(|t| t.matches(lowered))
        .map(|t| t.tag)
        .collect()
}
