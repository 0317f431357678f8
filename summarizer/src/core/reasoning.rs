//! Separating an oracle's reasoning segment from its answer.

use serde::{Deserialize, Serialize};

/// Tag pair that delimits a reasoning segment in oracle output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningTags {
    pub open: String,
    pub close: String,
}

impl Default for ReasoningTags {
    fn default() -> Self {
        Self {
            open: "<think>".to_string(),
            close: "</think>".to_string(),
        }
    }
}

/// Return the answer segment of `raw`, trimmed.
///
/// - closing tag present: everything after the last closing tag
/// - only an opening tag: everything before it (the reasoning never finished)
/// - no tags: the whole response
pub fn answer_segment<'a>(raw: &'a str, tags: &ReasoningTags) -> &'a str {
    if let Some(pos) = raw.rfind(&tags.close) {
        return raw[pos + tags.close.len()..].trim();
    }
    if let Some(pos) = raw.find(&tags.open) {
        return raw[..pos].trim();
    }
    raw.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_text_after_closing_tag() {
        let tags = ReasoningTags::default();
        let raw = "<think>The patient is 34.</think>\nAge: 34";
        assert_eq!(answer_segment(raw, &tags), "Age: 34");
    }

    #[test]
    fn uses_last_closing_tag() {
        let tags = ReasoningTags::default();
        let raw = "<think>a</think>draft<think>b</think> final";
        assert_eq!(answer_segment(raw, &tags), "final");
    }

    #[test]
    fn untagged_response_is_returned_whole() {
        assert_eq!(
            answer_segment("  Age: 34 \n", &ReasoningTags::default()),
            "Age: 34"
        );
    }

    #[test]
    fn unfinished_reasoning_is_dropped() {
        let tags = ReasoningTags::default();
        assert_eq!(answer_segment("<think>still going", &tags), "");
    }

    #[test]
    fn custom_tags_are_honoured() {
        let tags = ReasoningTags {
            open: "<unused94>".to_string(),
            close: "<unused95>".to_string(),
        };
        assert_eq!(answer_segment("<unused94>hmm<unused95>Sex: F", &tags), "Sex: F");
    }
}
