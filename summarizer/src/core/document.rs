//! Source document classification and artifact naming.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// Marker embedded in transcript artifact file names.
pub const TRANSCRIPT_MARKER: &str = "-auto-report-";
/// Suffix of the final summary file name.
pub const SUMMARY_SUFFIX: &str = "_summary.txt";

/// How a source file is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Image,
    /// Recognised but not handled yet (e.g. DICOM); skipped without error.
    Unsupported,
}

impl DocumentKind {
    /// Classify by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("txt" | "md" | "json" | "csv") => DocumentKind::Text,
            Some("jpg" | "jpeg" | "png" | "tiff" | "tif") => DocumentKind::Image,
            _ => DocumentKind::Unsupported,
        }
    }
}

/// A read-only input file from the patient folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

impl SourceDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = DocumentKind::from_path(&path);
        Self { path, kind }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// MIME type for an image document, used in `data:` URLs.
pub fn image_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("tif" | "tiff") => "image/tiff",
        _ => "image/jpeg",
    }
}

/// Date prefix for artifacts derived from `file_name`.
///
/// The first eight characters when they are all digits (files named like
/// `20240105-mri.png`), otherwise `today` as `YYYYMMDD`.
pub fn date_prefix(file_name: &str, today: NaiveDate) -> String {
    let head: String = file_name.chars().take(8).collect();
    if head.len() == 8 && head.chars().all(|c| c.is_ascii_digit()) {
        head
    } else {
        today.format("%Y%m%d").to_string()
    }
}

/// `<date>-auto-report-<stem>.txt` for an image document.
pub fn transcript_file_name(source: &Path, today: NaiveDate) -> String {
    let file_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "{}{TRANSCRIPT_MARKER}{stem}.txt",
        date_prefix(&file_name, today)
    )
}

/// `<date>_summary.txt`.
pub fn summary_file_name(today: NaiveDate) -> String {
    format!("{}{SUMMARY_SUFFIX}", today.format("%Y%m%d"))
}

static GENERATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{8}(_summary\.txt|-auto-report-.+\.txt)$").expect("artifact regex is valid")
});

/// True for files this system wrote itself: exactly the shapes produced by
/// [`summary_file_name`] and [`transcript_file_name`].
pub fn is_generated_artifact(file_name: &str) -> bool {
    GENERATED_RE.is_match(file_name)
}
