//! Execution loop scenarios with a scripted oracle and scripted tools.
//!
//! Oracle replies alternate planner / dispatcher per iteration, so each test
//! lists them in pairs.

use std::fs;
use std::time::Duration;

use serde_json::json;
use summarizer::agent::{AgentOptions, LoopOutcome, LoopStop, run_agent};
use summarizer::core::blackboard::{
    FILES_KEY, HISTORY_KEY, LAST_TOOL_CALL_KEY, PATIENT_FOLDER_KEY, RESULT_KEY, TEMPLATE_KEY,
};
use summarizer::core::reasoning::ReasoningTags;
use summarizer::error::ConfigurationError;
use summarizer::io::blackboard_store::load_blackboard;
use summarizer::io::session::{IterationMeta, IterationOutcome};
use summarizer::io::tools::ToolOutput;
use summarizer::io::tools::local::LocalToolbox;
use summarizer::test_support::{PatientFixture, ScriptedOracle, ScriptedTools};

const TEMPLATE: &str = "Age: Not specified\nDiagnosis: Not specified\n";

fn options(fixture: &PatientFixture, max_iterations: u32) -> AgentOptions {
    AgentOptions {
        max_iterations,
        artifacts_dir: fixture.artifacts_dir(),
        prompt_budget_bytes: 60_000,
        tags: ReasoningTags::default(),
        session_timeout: Duration::from_secs(60),
    }
}

fn run(
    fixture: &PatientFixture,
    oracle: &ScriptedOracle,
    tools: &ScriptedTools,
    max_iterations: u32,
) -> (LoopOutcome, Vec<IterationMeta>) {
    let mut seen = Vec::new();
    let outcome = run_agent(
        oracle,
        tools,
        &fixture.folder(),
        &fixture.template_path(),
        &options(fixture, max_iterations),
        |meta| seen.push(meta.clone()),
    )
    .expect("agent run");
    (outcome, seen)
}

fn outcomes(seen: &[IterationMeta]) -> Vec<IterationOutcome> {
    seen.iter().map(|meta| meta.outcome).collect()
}

/// Plan, dispatch twice (second call truncated and repaired), then finish on
/// the sentinel.
#[test]
fn runs_steps_until_completion_sentinel() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    fixture.add_document("a.txt", "Age 34, epilepsy").expect("doc");
    let oracle = ScriptedOracle::new([
        "PENDING - List files in the patient folder\nPENDING - Read a.txt",
        r#"<tool_call>{"name": "list_files", "arguments": {"folder_path": "patient"}}</tool_call>"#,
        "<think>listing is done</think>\nPENDING - Read a.txt\nPENDING - Write the summary",
        r#"I will read it. <tool_call>{"name": "read_file", "arguments": {"filepath": "a.txt""#,
        "PENDING - Write the summary",
        "TASK_COMPLETE",
    ]);
    let tools = ScriptedTools::new(vec![ToolOutput::ok("a.txt"), ToolOutput::ok("Age 34, epilepsy")]);

    let (outcome, seen) = run(&fixture, &oracle, &tools, 10);

    assert_eq!(outcome.stop, LoopStop::Completed);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.steps_done, 2);
    assert_eq!(
        outcomes(&seen),
        [
            IterationOutcome::Dispatched,
            IterationOutcome::Dispatched,
            IterationOutcome::Completed
        ]
    );

    let calls = tools.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].name, "read_file");
    assert_eq!(calls[1].arguments.get("filepath"), Some(&json!("a.txt")));

    let board = load_blackboard(&fixture.artifacts_dir().join("blackboard.json")).expect("board");
    assert_eq!(
        board.get(HISTORY_KEY),
        Some(&json!([
            "DONE - List files in the patient folder",
            "DONE - Read a.txt"
        ]))
    );
    assert_eq!(board.get_str(RESULT_KEY), Some("Age 34, epilepsy"));
    assert_eq!(board.get_str(TEMPLATE_KEY), Some(TEMPLATE));
    assert!(board.get_str(PATIENT_FOLDER_KEY).is_some());
    assert_eq!(
        board.get(FILES_KEY).and_then(|files| files.as_array()).map(Vec::len),
        Some(1)
    );

    let artifacts = fixture.artifacts_dir();
    assert_eq!(
        fs::read_to_string(artifacts.join("plan.txt")).expect("plan"),
        "PENDING - Write the summary\n"
    );
    assert!(
        fs::read_to_string(artifacts.join("iterations/3/step_response.txt"))
            .expect("response")
            .contains("TASK_COMPLETE")
    );
    let meta = fs::read_to_string(artifacts.join("iterations/1/meta.json")).expect("meta");
    assert!(meta.contains("\"tool\": \"list_files\""));
}

#[test]
fn planner_prompt_carries_blackboard_and_previous_plan() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let oracle = ScriptedOracle::new([
        "PENDING - Read a.txt",
        r#"<tool_call>{"name": "read_file", "arguments": {"filepath": "a.txt"}}</tool_call>"#,
        "",
    ]);
    let tools = ScriptedTools::new(vec![ToolOutput::ok("Age 34")]);

    run(&fixture, &oracle, &tools, 10);

    let requests = oracle.requests();
    let second_plan = requests[2][1].text();
    assert!(second_plan.contains("DONE - Read a.txt"));
    assert!(second_plan.contains("\"last_tool_result\": \"Age 34\""));
    assert!(requests[1][0].text().contains("TASK_COMPLETE"));
    assert!(requests[1][1].text().contains("<step>\nRead a.txt\n</step>"));
    assert!(
        requests[1][1]
            .text()
            .contains("<template>\nAge: Not specified\nDiagnosis: Not specified\n</template>")
    );
}

#[test]
fn empty_plan_finishes_without_dispatch() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let oracle = ScriptedOracle::new(["Nothing left to do, the summary is saved."]);
    let tools = ScriptedTools::new(Vec::new());

    let (outcome, seen) = run(&fixture, &oracle, &tools, 10);

    assert_eq!(outcome.stop, LoopStop::PlanExhausted);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(oracle.call_count(), 1);
    assert!(tools.calls().is_empty());
    assert_eq!(outcomes(&seen), [IterationOutcome::PlanExhausted]);
    assert_eq!(
        fs::read_to_string(fixture.artifacts_dir().join("plan.txt")).expect("plan"),
        ""
    );
}

#[test]
fn template_inside_the_folder_is_not_listed_as_a_file() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    fixture.add_document("a.txt", "Age 34").expect("doc");
    fixture.add_document("template.txt", TEMPLATE).expect("template copy");
    let oracle = ScriptedOracle::new(["Nothing left to do."]);
    let tools = ScriptedTools::new(Vec::new());

    run_agent(
        &oracle,
        &tools,
        &fixture.folder(),
        &fixture.folder().join("template.txt"),
        &options(&fixture, 5),
        |_| {},
    )
    .expect("agent run");

    let board = load_blackboard(&fixture.artifacts_dir().join("blackboard.json")).expect("board");
    let files = board
        .get(FILES_KEY)
        .and_then(|files| files.as_array())
        .expect("files list");
    assert_eq!(files.len(), 1);
    assert!(files[0].as_str().is_some_and(|path| path.ends_with("a.txt")));
}

#[test]
fn malformed_calls_replan_until_iteration_bound() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let oracle = ScriptedOracle::new([
        "PENDING - Read a.txt",
        "I think we should read the file next.",
        "PENDING - Read a.txt",
        "<tool_call>{\"arguments\": {\"filepath\": \"a.txt\"}}</tool_call>",
    ]);
    let tools = ScriptedTools::new(Vec::new());

    let (outcome, seen) = run(&fixture, &oracle, &tools, 2);

    assert_eq!(
        outcome.stop,
        LoopStop::MaxIterationsExceeded { max_iterations: 2 }
    );
    assert_eq!(
        outcomes(&seen),
        [
            IterationOutcome::MalformedToolCall,
            IterationOutcome::MalformedToolCall
        ]
    );
    assert!(tools.calls().is_empty());
    assert_eq!(oracle.remaining(), 0);
}

#[test]
fn malformed_call_is_followed_by_a_normal_step() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let oracle = ScriptedOracle::new([
        "PENDING - Read a.txt",
        "<tool_call>not json at all</tool_call>",
        "PENDING - Read a.txt",
        r#"<tool_call>{"name": "read_file", "arguments": "{\"filepath\": \"a.txt\"}"}</tool_call>"#,
        "",
    ]);
    let tools = ScriptedTools::new(vec![ToolOutput::ok("Age 34")]);

    let (outcome, seen) = run(&fixture, &oracle, &tools, 5);

    assert_eq!(outcome.stop, LoopStop::PlanExhausted);
    assert_eq!(outcome.steps_done, 1);
    assert_eq!(
        outcomes(&seen),
        [
            IterationOutcome::MalformedToolCall,
            IterationOutcome::Dispatched,
            IterationOutcome::PlanExhausted
        ]
    );
}

#[test]
fn unknown_tool_leaves_blackboard_untouched() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let oracle = ScriptedOracle::new([
        "PENDING - Remove old reports",
        r#"<tool_call>{"name": "shred_file", "arguments": {"filepath": "old.txt"}}</tool_call>"#,
        "",
    ]);
    let tools = ScriptedTools::new(Vec::new());

    let (outcome, seen) = run(&fixture, &oracle, &tools, 5);

    assert_eq!(outcome.stop, LoopStop::PlanExhausted);
    assert_eq!(seen[0].outcome, IterationOutcome::UnknownTool);
    assert_eq!(seen[0].tool.as_deref(), Some("shred_file"));
    let board = load_blackboard(&fixture.artifacts_dir().join("blackboard.json")).expect("board");
    assert!(board.get(LAST_TOOL_CALL_KEY).is_none());
    assert!(board.get(RESULT_KEY).is_none());
    assert!(board.get(HISTORY_KEY).is_none());
}

#[test]
fn tool_error_keeps_the_step_pending() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let oracle = ScriptedOracle::new([
        "PENDING - Read missing.txt",
        r#"<tool_call>{"name": "read_file", "arguments": {"filepath": "missing.txt"}}</tool_call>"#,
        "",
    ]);
    let tools = ScriptedTools::new(vec![ToolOutput::error("Error: cannot read missing.txt")]);

    let (outcome, seen) = run(&fixture, &oracle, &tools, 5);

    assert_eq!(outcome.steps_done, 0);
    assert_eq!(seen[0].outcome, IterationOutcome::ToolError);
    let board = load_blackboard(&fixture.artifacts_dir().join("blackboard.json")).expect("board");
    assert_eq!(
        board.get_str(RESULT_KEY),
        Some("Error: cannot read missing.txt")
    );
    assert!(board.get(HISTORY_KEY).is_none());
}

#[test]
fn local_toolbox_writes_the_summary() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let oracle = ScriptedOracle::new([
        "PENDING - Write the completed summary",
        r#"<tool_call>
```json
{"name": "write_file", "arguments": {"filepath": "patient/summary.txt", "content": "Age: 34\nDiagnosis: Epilepsy\n"}}
```
</tool_call>"#,
        "",
    ]);
    let toolbox = LocalToolbox::new(fixture.root()).expect("toolbox");

    let outcome = run_agent(
        &oracle,
        &toolbox,
        &fixture.folder(),
        &fixture.template_path(),
        &options(&fixture, 5),
        |_| {},
    )
    .expect("agent run");

    assert_eq!(outcome.stop, LoopStop::PlanExhausted);
    assert_eq!(
        fs::read_to_string(fixture.folder().join("summary.txt")).expect("summary"),
        "Age: 34\nDiagnosis: Epilepsy\n"
    );
}

#[test]
fn missing_template_fails_before_any_oracle_call() {
    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let oracle = ScriptedOracle::new(["PENDING - anything"]);
    let tools = ScriptedTools::new(Vec::new());

    let err = run_agent(
        &oracle,
        &tools,
        &fixture.folder(),
        &fixture.root().join("nope.txt"),
        &options(&fixture, 5),
        |_| {},
    )
    .unwrap_err();

    assert!(err.downcast_ref::<ConfigurationError>().is_some());
    assert_eq!(oracle.call_count(), 0);
}

#[cfg(unix)]
#[test]
fn closed_transport_is_fatal_and_carries_the_log() {
    use summarizer::core::budget::SessionBudget;
    use summarizer::error::TransportClosedError;
    use summarizer::io::tools::stdio::StdioToolClient;

    let fixture = PatientFixture::new(TEMPLATE).expect("fixture");
    let log_path = fixture.artifacts_dir().join("tool_server.log");
    let script = r#"read line; echo '{"status":"tools","tools":[]}'; echo 'tool server crashed: disk full' >&2; exit 1"#;
    let client = StdioToolClient::spawn(
        &["sh".to_string(), "-c".to_string(), script.to_string()],
        &log_path,
        SessionBudget::new(Duration::from_secs(30)),
    )
    .expect("spawn");
    let oracle = ScriptedOracle::new([
        "PENDING - Read a.txt",
        r#"<tool_call>{"name": "read_file", "arguments": {"filepath": "a.txt"}}</tool_call>"#,
    ]);

    let err = run_agent(
        &oracle,
        &client,
        &fixture.folder(),
        &fixture.template_path(),
        &options(&fixture, 5),
        |_| {},
    )
    .unwrap_err();

    let closed = err
        .downcast_ref::<TransportClosedError>()
        .expect("transport closed");
    assert!(closed.diagnostic_log.contains("tool server crashed: disk full"));
    // Artifacts written before the failure survive.
    assert_eq!(
        fs::read_to_string(fixture.artifacts_dir().join("plan.txt")).expect("plan"),
        "PENDING - Read a.txt\n"
    );
    assert!(fixture.artifacts_dir().join("blackboard.json").is_file());
}
