//! Orchestration for `summarizer complete`: fold every patient document into
//! the template, one fragment at a time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::core::budget::SessionBudget;
use crate::core::document::{SourceDocument, summary_file_name};
use crate::core::merge::merge_fragment;
use crate::core::reasoning::ReasoningTags;
use crate::core::template::{Fragment, chunk_template, join_fragments};
use crate::error::ConfigurationError;
use crate::io::config::SummarizerConfig;
use crate::io::documents::{DocumentProcessor, list_documents};
use crate::io::oracle::{Oracle, ask};
use crate::io::prompt::merge_prompt;

/// Settings for one template completion.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub tags: ReasoningTags,
    pub session_timeout: Duration,
    /// Date used for artifact names when a file name carries none.
    pub today: NaiveDate,
}

impl CompletionOptions {
    pub fn from_config(cfg: &SummarizerConfig) -> Self {
        Self {
            tags: cfg.oracle.reasoning_tags(),
            session_timeout: cfg.agent.session_timeout(),
            today: Local::now().date_naive(),
        }
    }
}

/// Fail with [`ConfigurationError`] unless both inputs exist.
pub fn check_inputs(patient_folder: &Path, template_path: &Path) -> Result<()> {
    if !template_path.is_file() {
        return Err(ConfigurationError::TemplateMissing(template_path.to_path_buf()).into());
    }
    if !patient_folder.is_dir() {
        return Err(ConfigurationError::PatientFolderMissing(patient_folder.to_path_buf()).into());
    }
    Ok(())
}

/// Complete `template_path` from the documents in `patient_folder`.
///
/// Documents are processed in file-name order and each one is offered to
/// every fragment, so later documents override earlier ones. The completed
/// text is written to `<date>_summary.txt` in the patient folder and returned.
#[instrument(skip_all, fields(folder = %patient_folder.display()))]
pub fn complete_template<O: Oracle + ?Sized>(
    oracle: &O,
    patient_folder: &Path,
    template_path: &Path,
    options: &CompletionOptions,
) -> Result<String> {
    check_inputs(patient_folder, template_path)?;
    let raw = fs::read_to_string(template_path)
        .with_context(|| format!("read template {}", template_path.display()))?;
    let mut fragments = chunk_template(&raw);
    let budget = SessionBudget::new(options.session_timeout);

    let documents = source_documents(patient_folder, template_path)?;
    info!(
        fragments = fragments.len(),
        documents = documents.len(),
        "starting template completion"
    );

    let processor = DocumentProcessor::new(oracle, &options.tags, &budget, options.today);
    for document in &documents {
        let Some(text) = processor.prepare(document)? else {
            continue;
        };
        if text.trim().is_empty() {
            info!(document = %document.file_name(), "skipping empty document");
            continue;
        }
        merge_document(oracle, &mut fragments, document, &text, options, &budget)?;
    }

    let summary = join_fragments(&fragments);
    let summary_path = patient_folder.join(summary_file_name(options.today));
    crate::io::write_atomic(&summary_path, &summary)?;
    info!(summary = %summary_path.display(), "template completed");
    Ok(summary)
}

fn merge_document<O: Oracle + ?Sized>(
    oracle: &O,
    fragments: &mut [Fragment],
    document: &SourceDocument,
    text: &str,
    options: &CompletionOptions,
    budget: &SessionBudget,
) -> Result<()> {
    let file_name = document.file_name();
    for (index, fragment) in fragments.iter_mut().enumerate() {
        let pack = merge_prompt(&fragment.render(), &file_name, text)?;
        let proposed = ask(oracle, &pack.messages(), &options.tags, budget)
            .with_context(|| format!("merge {file_name} into fragment {index}"))?;
        let outcome = merge_fragment(fragment, &proposed);
        if !outcome.dropped.is_empty() {
            warn!(
                document = %file_name,
                fragment = index,
                dropped = ?outcome.dropped,
                "dropped labels not in template"
            );
        }
        debug!(
            document = %file_name,
            fragment = index,
            updated = ?outcome.updated,
            "merged fragment"
        );
        *fragment = outcome.fragment;
    }
    Ok(())
}

/// Patient documents, minus the template itself when it lives in the folder.
pub fn source_documents(patient_folder: &Path, template_path: &Path) -> Result<Vec<SourceDocument>> {
    let template = canonical(template_path);
    Ok(list_documents(patient_folder)?
        .into_iter()
        .filter(|document| canonical(&document.path) != template)
        .collect())
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
