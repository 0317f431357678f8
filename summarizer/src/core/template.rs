//! Template model and blank-line chunking.
//!
//! A template is plain text. Blank-line separated blocks become [`Fragment`]s,
//! the unit the oracle fills independently. Inside a fragment every line is a
//! [`Line`]: blank, a header (no colon), or a `label: value` field.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Separator used when joining fragments back into template text.
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Two or more newlines, allowing whitespace-only lines in between.
    Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)*").expect("blank run regex is valid")
});

/// One line of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Blank,
    /// Numbering, section titles and anything else without a usable label.
    Header(String),
    Field { label: String, value: String },
}

impl Line {
    /// Classify a single line of text.
    ///
    /// The first colon separates label from value. A line whose label would be
    /// empty (e.g. `": foo"`) is a header: there is nothing to key it by.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Line::Blank;
        }
        match trimmed.split_once(':') {
            Some((label, value)) if !label.trim().is_empty() => Line::Field {
                label: label.trim().to_string(),
                value: value.trim().to_string(),
            },
            _ => Line::Header(trimmed.to_string()),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Line::Field { label, .. } => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Blank => Ok(()),
            Line::Header(text) => f.write_str(text),
            Line::Field { label, value } if value.is_empty() => write!(f, "{label}:"),
            Line::Field { label, value } => write!(f, "{label}: {value}"),
        }
    }
}

/// A contiguous schema-bearing block of a template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fragment {
    pub lines: Vec<Line>,
}

impl Fragment {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(Line::parse).collect(),
        }
    }

    /// Field labels in order of appearance.
    pub fn labels(&self) -> Vec<&str> {
        self.lines.iter().filter_map(Line::label).collect()
    }

    /// Value of the first field with `label`.
    pub fn value(&self, label: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Field { label: l, value } if l == label => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split raw template text into fragments at blank-line boundaries.
///
/// Empty pieces are discarded, so an empty template yields no fragments.
pub fn chunk_template(raw: &str) -> Vec<Fragment> {
    let normalized = raw.replace("\r\n", "\n");
    BLANK_RUN_RE
        .split(&normalized)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(Fragment::parse)
        .collect()
}

/// Join fragments back into template text.
pub fn join_fragments(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(Fragment::render)
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR)
}
