//! Patient folder enumeration and per-document text extraction.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::core::budget::SessionBudget;
use crate::core::document::{
    DocumentKind, SourceDocument, image_mime_type, is_generated_artifact, transcript_file_name,
};
use crate::core::reasoning::ReasoningTags;
use crate::io::oracle::{Oracle, ask};
use crate::io::prompt::transcription_prompt;

/// Regular files in `folder`, sorted by file name.
///
/// Hidden files and artifacts written by earlier runs are skipped.
pub fn list_documents(folder: &Path) -> Result<Vec<SourceDocument>> {
    let entries =
        fs::read_dir(folder).with_context(|| format!("read folder {}", folder.display()))?;
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", folder.display()))?;
        let file_type = entry.file_type().context("read file type")?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || is_generated_artifact(&name) {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths.into_iter().map(SourceDocument::new).collect())
}

/// Turns a source document into text the merge step can use.
pub struct DocumentProcessor<'a, O: Oracle + ?Sized> {
    oracle: &'a O,
    tags: &'a ReasoningTags,
    budget: &'a SessionBudget,
    today: NaiveDate,
}

impl<'a, O: Oracle + ?Sized> DocumentProcessor<'a, O> {
    pub fn new(
        oracle: &'a O,
        tags: &'a ReasoningTags,
        budget: &'a SessionBudget,
        today: NaiveDate,
    ) -> Self {
        Self {
            oracle,
            tags,
            budget,
            today,
        }
    }

    /// Text for `document`, or `None` when its kind is not handled.
    ///
    /// Images are transcribed once by the oracle; the transcript is written
    /// next to the image as `<date>-auto-report-<stem>.txt`.
    #[instrument(skip_all, fields(document = %document.file_name()))]
    pub fn prepare(&self, document: &SourceDocument) -> Result<Option<String>> {
        match document.kind {
            DocumentKind::Text => {
                let bytes = fs::read(&document.path)
                    .with_context(|| format!("read document {}", document.path.display()))?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            DocumentKind::Image => self.transcribe(document).map(Some),
            DocumentKind::Unsupported => {
                info!("skipping unsupported document");
                Ok(None)
            }
        }
    }

    fn transcribe(&self, document: &SourceDocument) -> Result<String> {
        let bytes = fs::read(&document.path)
            .with_context(|| format!("read image {}", document.path.display()))?;
        let payload = STANDARD.encode(&bytes);
        let pack = transcription_prompt(&document.file_name())?;
        let messages = pack.messages_with_image(image_mime_type(&document.path), &payload);
        let transcript = ask(self.oracle, &messages, self.tags, self.budget)?;

        let artifact = document
            .path
            .with_file_name(transcript_file_name(&document.path, self.today));
        crate::io::write_atomic(&artifact, &transcript)?;
        info!(artifact = %artifact.display(), "wrote transcript");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_sorted_regular_files_without_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        for name in [
            "b.txt",
            "a.png",
            ".DS_Store",
            "20260101-auto-report-a.txt",
            "20260101_summary.txt",
            "c.dcm",
        ] {
            fs::write(dir.join(name), "x").expect("seed");
        }
        fs::create_dir(dir.join("nested")).expect("dir");

        let names: Vec<_> = list_documents(dir)
            .expect("list")
            .iter()
            .map(SourceDocument::file_name)
            .collect();
        assert_eq!(names, ["a.png", "b.txt", "c.dcm"]);
    }

    #[test]
    fn missing_folder_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(list_documents(&temp.path().join("absent")).is_err());
    }
}
