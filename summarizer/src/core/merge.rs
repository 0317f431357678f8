//! Schema-preserving merge of an oracle rewrite into a template fragment.
//!
//! The original fragment is the schema authority. The oracle's proposal may
//! only change values of fields the fragment already has: headers and blank
//! lines are copied verbatim, unknown labels are dropped, and labels the
//! proposal is silent on keep their original value.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::template::{Fragment, Line};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(```|~~~)").expect("fence regex is valid"));
/// `__word__` emphasis; underscores inside a value (`ct__v2`) are left alone.
static UNDERSCORE_EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\w])__([^_\s](?:[^_]*[^_\s])?)__($|[^\w])")
        .expect("emphasis regex is valid")
});

/// Result of merging one proposal into one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub fragment: Fragment,
    /// Labels whose value changed, in fragment order.
    pub updated: Vec<String>,
    /// Labels the proposal introduced that the fragment does not have.
    pub dropped: Vec<String>,
}

/// Strip markdown noise the oracle tends to wrap its answer in.
///
/// Removes code-fence lines and bold markers, and trims every line.
pub fn normalize_proposed(proposed: &str) -> String {
    proposed
        .lines()
        .filter(|line| !FENCE_RE.is_match(line))
        .map(|line| {
            let line = line.replace("**", "");
            UNDERSCORE_EMPHASIS_RE
                .replace_all(&line, "$1$2$3")
                .trim()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Field candidates from a proposal: every value per label, in proposal order.
///
/// Returns the map plus the labels in order of first appearance.
fn candidate_fields(normalized: &str) -> (HashMap<String, Vec<String>>, Vec<String>) {
    let mut fields: HashMap<String, Vec<String>> = HashMap::new();
    let mut order = Vec::new();
    for line in normalized.lines() {
        if let Line::Field { label, value } = Line::parse(line) {
            if !fields.contains_key(&label) {
                order.push(label.clone());
            }
            fields.entry(label).or_default().push(value);
        }
    }
    (fields, order)
}

/// Merge `proposed` into `original` without touching the fragment's schema.
///
/// The k-th field carrying a label takes the k-th proposed value for that
/// label; extra proposed duplicates are ignored. An empty proposed value counts
/// as silence: the original value is kept, so a filled field can never be
/// blanked by the oracle.
pub fn merge_fragment(original: &Fragment, proposed: &str) -> MergeOutcome {
    let normalized = normalize_proposed(proposed);
    let (candidates, candidate_order) = candidate_fields(&normalized);

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut updated = Vec::new();
    let lines = original
        .lines
        .iter()
        .map(|line| match line {
            Line::Field { label, value } => {
                let occurrence = seen.entry(label.as_str()).or_insert(0);
                let candidate = candidates
                    .get(label)
                    .and_then(|values| values.get(*occurrence));
                *occurrence += 1;
                match candidate {
                    Some(candidate) if !candidate.is_empty() => {
                        if candidate != value {
                            updated.push(label.clone());
                        }
                        Line::Field {
                            label: label.clone(),
                            value: candidate.clone(),
                        }
                    }
                    _ => line.clone(),
                }
            }
            Line::Blank | Line::Header(_) => line.clone(),
        })
        .collect();

    let known = original.labels();
    let dropped = candidate_order
        .into_iter()
        .filter(|label| !known.contains(&label.as_str()))
        .collect();

    MergeOutcome {
        fragment: Fragment { lines },
        updated,
        dropped,
    }
}
