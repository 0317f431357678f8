//! End-to-end template completion against a scripted oracle.
//!
//! Each test builds a patient folder in a tempdir, queues the oracle replies
//! in the exact call order (document by document, fragment by fragment) and
//! checks the returned summary plus the artifacts left in the folder.

use std::fs;
use std::time::Duration;

use chrono::NaiveDate;
use summarizer::complete::{CompletionOptions, complete_template};
use summarizer::core::reasoning::ReasoningTags;
use summarizer::error::ConfigurationError;
use summarizer::io::oracle::{ContentPart, MessageContent};
use summarizer::test_support::{PatientFixture, ScriptedOracle};

fn options() -> CompletionOptions {
    CompletionOptions {
        tags: ReasoningTags::default(),
        session_timeout: Duration::from_secs(60),
        today: NaiveDate::from_ymd_opt(2026, 3, 9).expect("date"),
    }
}

#[test]
fn hallucinated_labels_are_dropped_end_to_end() {
    let fixture = PatientFixture::new("Age: Not specified\n").expect("fixture");
    fixture
        .add_document("visit.txt", "The patient is 34 years old.")
        .expect("doc");
    let oracle = ScriptedOracle::new(["Age: 34\nNewField: xyz"]);

    let summary = complete_template(
        &oracle,
        &fixture.folder(),
        &fixture.template_path(),
        &options(),
    )
    .expect("complete");

    assert_eq!(summary, "Age: 34");
    assert_eq!(
        fs::read_to_string(fixture.folder().join("20260309_summary.txt")).expect("summary"),
        "Age: 34"
    );
}

/// `a.txt` fills the diagnosis; `b.txt` is silent on it and must not erase it.
#[test]
fn later_documents_never_erase_earlier_values() {
    let template = "1) Clinical\nDiagnosis: Not specified\nMedication: Not specified\n\n2) Notes\nNotes: none\n";
    let fixture = PatientFixture::new(template).expect("fixture");
    fixture
        .add_document("a.txt", "EEG consistent with epilepsy.")
        .expect("a");
    fixture
        .add_document("b.txt", "Started valproate. Seizure free.")
        .expect("b");
    let oracle = ScriptedOracle::new([
        // a.txt
        "1) Clinical\nDiagnosis: Epilepsy\nMedication: Not specified",
        "2) Notes\nNotes: none",
        // b.txt
        "```\n1) Clinical\n**Medication:** Valproate\n```",
        "<think>nothing new on notes</think>Notes: seizure free",
    ]);

    let summary = complete_template(
        &oracle,
        &fixture.folder(),
        &fixture.template_path(),
        &options(),
    )
    .expect("complete");

    assert_eq!(
        summary,
        "1) Clinical\nDiagnosis: Epilepsy\nMedication: Valproate\n\n2) Notes\nNotes: seizure free"
    );
    let requests = oracle.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[0][1].text().contains("### FILE (a.txt)"));
    assert!(requests[2][1].text().contains("### FILE (b.txt)"));
    // The second document sees the values merged from the first.
    assert!(requests[2][1].text().contains("Diagnosis: Epilepsy"));
}

#[test]
fn image_is_transcribed_once_and_kept_as_artifact() {
    let fixture = PatientFixture::new("Findings: Not specified").expect("fixture");
    fixture
        .add_document("20240105-mri.png", [0x89, b'P', b'N', b'G'])
        .expect("image");
    let oracle = ScriptedOracle::new([
        "<think>reading the scan</think>MRI brain: no acute findings.",
        "Findings: MRI brain without acute findings",
    ]);

    let summary = complete_template(
        &oracle,
        &fixture.folder(),
        &fixture.template_path(),
        &options(),
    )
    .expect("complete");

    assert_eq!(summary, "Findings: MRI brain without acute findings");
    let transcript = fixture
        .folder()
        .join("20240105-auto-report-20240105-mri.txt");
    assert_eq!(
        fs::read_to_string(transcript).expect("transcript"),
        "MRI brain: no acute findings."
    );

    let requests = oracle.requests();
    let MessageContent::Parts(parts) = &requests[0][1].content else {
        panic!("transcription request should carry an image part");
    };
    assert!(parts.iter().any(|part| matches!(
        part,
        ContentPart::ImageUrl { image_url } if image_url.url.starts_with("data:image/png;base64,")
    )));
    assert!(requests[1][1].text().contains("MRI brain: no acute findings."));
}

#[test]
fn unsupported_documents_are_skipped_without_oracle_calls() {
    let fixture = PatientFixture::new("Age: Not specified").expect("fixture");
    fixture.add_document("ct.dcm", [0u8; 16]).expect("dicom");
    let oracle = ScriptedOracle::new(Vec::<String>::new());

    let summary = complete_template(
        &oracle,
        &fixture.folder(),
        &fixture.template_path(),
        &options(),
    )
    .expect("complete");

    assert_eq!(summary, "Age: Not specified");
    assert_eq!(oracle.call_count(), 0);
}

#[test]
fn rerun_ignores_previous_summary_and_transcripts() {
    let fixture = PatientFixture::new("Age: Not specified").expect("fixture");
    fixture.add_document("visit.txt", "34 years old").expect("doc");
    fixture
        .add_document("20260101_summary.txt", "Age: 99")
        .expect("old summary");
    fixture
        .add_document("20260101-auto-report-scan.txt", "Age: 98")
        .expect("old transcript");
    let oracle = ScriptedOracle::new(["Age: 34"]);

    complete_template(
        &oracle,
        &fixture.folder(),
        &fixture.template_path(),
        &options(),
    )
    .expect("complete");

    assert_eq!(oracle.call_count(), 1);
    assert_eq!(oracle.remaining(), 0);
}

#[test]
fn patient_files_resembling_artifacts_are_still_merged() {
    let fixture = PatientFixture::new("Diagnosis: Not specified").expect("fixture");
    fixture
        .add_document("discharge_summary.txt", "Diagnosis: Epilepsy")
        .expect("discharge summary");
    fixture
        .add_document("lab-auto-report-2.txt", "Normal sodium.")
        .expect("lab report");
    let oracle = ScriptedOracle::new(["Diagnosis: Epilepsy", "Diagnosis: Epilepsy"]);

    let summary = complete_template(
        &oracle,
        &fixture.folder(),
        &fixture.template_path(),
        &options(),
    )
    .expect("complete");

    assert_eq!(summary, "Diagnosis: Epilepsy");
    assert_eq!(oracle.call_count(), 2);
    assert!(oracle.requests()[0][1].text().contains("### FILE (discharge_summary.txt)"));
}

#[test]
fn missing_inputs_fail_before_any_oracle_call() {
    let fixture = PatientFixture::new("Age:").expect("fixture");
    let oracle = ScriptedOracle::new(["Age: 34"]);

    let err = complete_template(
        &oracle,
        &fixture.folder(),
        &fixture.root().join("missing-template.txt"),
        &options(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::TemplateMissing(_))
    ));

    let err = complete_template(
        &oracle,
        &fixture.root().join("no-such-patient"),
        &fixture.template_path(),
        &options(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::PatientFolderMissing(_))
    ));
    assert_eq!(oracle.call_count(), 0);
}

#[test]
fn exhausted_oracle_is_a_generation_failure() {
    let fixture = PatientFixture::new("Age: Not specified").expect("fixture");
    fixture.add_document("visit.txt", "34 years old").expect("doc");
    let oracle = ScriptedOracle::new(Vec::<String>::new());

    let err = complete_template(
        &oracle,
        &fixture.folder(),
        &fixture.template_path(),
        &options(),
    )
    .unwrap_err();
    assert!(
        err.downcast_ref::<summarizer::error::GenerationServiceError>()
            .is_some()
    );
    assert!(!fixture.folder().join("20260309_summary.txt").exists());
}
