//! Plan-and-dispatch execution loop for `summarizer agent`.
//!
//! ```text
//! BOOTSTRAP -> { UPDATE_PLAN -> SELECT_STEP -> DISPATCH_STEP }* -> FINISHED
//! ```
//!
//! Every UPDATE_PLAN entry counts against `max_iterations`. Malformed tool
//! calls and unknown tools are recovered by going back to UPDATE_PLAN; any
//! other error (transport closed, generation failure, session timeout) ends
//! the run with every artifact written so far left in place.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::complete::{check_inputs, source_documents};
use crate::core::blackboard::{
    FILES_KEY, HISTORY_KEY, LAST_TOOL_CALL_KEY, PATIENT_FOLDER_KEY, PLAN_KEY, RESULT_KEY,
    TEMPLATE_KEY, TEMPLATE_PATH_KEY,
};
use crate::core::budget::SessionBudget;
use crate::core::plan::{DONE_MARKER, Plan};
use crate::core::reasoning::ReasoningTags;
use crate::core::tool_call::{is_completion, parse_tool_call};
use crate::error::UnknownToolError;
use crate::io::blackboard_store::BlackboardStore;
use crate::io::config::SummarizerConfig;
use crate::io::oracle::{Oracle, ask};
use crate::io::prompt::{DispatchInputs, PlannerInputs, PromptBuilder};
use crate::io::session::{
    IterationMeta, IterationOutcome, IterationWriteRequest, SessionPaths, write_iteration,
    write_plan,
};
use crate::io::tools::{ToolService, render_catalog};

/// Settings for one agent run.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub max_iterations: u32,
    pub artifacts_dir: PathBuf,
    pub prompt_budget_bytes: usize,
    pub tags: ReasoningTags,
    pub session_timeout: Duration,
}

impl AgentOptions {
    pub fn from_config(cfg: &SummarizerConfig) -> Self {
        Self {
            max_iterations: cfg.agent.max_iterations,
            artifacts_dir: cfg.agent.artifacts_dir.clone(),
            prompt_budget_bytes: cfg.agent.prompt_budget_bytes,
            tags: cfg.oracle.reasoning_tags(),
            session_timeout: cfg.agent.session_timeout(),
        }
    }
}

/// Reason why `run_agent` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The dispatcher emitted the completion sentinel.
    Completed,
    /// The planner returned no pending step.
    PlanExhausted,
    /// UPDATE_PLAN was entered `max_iterations` times without finishing.
    MaxIterationsExceeded { max_iterations: u32 },
}

/// Summary of an agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Number of UPDATE_PLAN entries.
    pub iterations: u32,
    /// Steps whose tool call succeeded and were marked done.
    pub steps_done: u32,
    pub stop: LoopStop,
}

/// Run the execution loop until completion, an empty plan or the iteration
/// bound. `on_iteration` sees each iteration's metadata after it is logged.
#[instrument(skip_all, fields(folder = %patient_folder.display(), max_iterations = options.max_iterations))]
pub fn run_agent<O, T, F>(
    oracle: &O,
    tools: &T,
    patient_folder: &Path,
    template_path: &Path,
    options: &AgentOptions,
    mut on_iteration: F,
) -> Result<LoopOutcome>
where
    O: Oracle + ?Sized,
    T: ToolService + ?Sized,
    F: FnMut(&IterationMeta),
{
    let budget = SessionBudget::new(options.session_timeout);
    let paths = SessionPaths::new(&options.artifacts_dir);
    let mut store = bootstrap(patient_folder, template_path, &paths)?;

    budget.remaining()?;
    let catalog = render_catalog(&tools.list_tools().context("list tools")?);
    let prompts = PromptBuilder::new(options.prompt_budget_bytes);
    let mut plan = Plan::default();
    let mut steps_done = 0u32;

    for iter in 1..=options.max_iterations {
        let started = Instant::now();

        // UPDATE_PLAN
        let board_json = store.board().to_pretty_json();
        let plan_text = plan.render();
        let pack = prompts.build_planner(&PlannerInputs {
            blackboard_json: &board_json,
            plan_text: &plan_text,
            tool_catalog: &catalog,
        })?;
        let reply = ask(oracle, &pack.messages(), &options.tags, &budget)
            .with_context(|| format!("update plan (iteration {iter})"))?;
        plan = Plan::parse(&reply);
        record_plan(&mut store, &paths, &plan)?;

        // SELECT_STEP
        let Some(step) = plan.next_pending().map(|item| item.description.clone()) else {
            info!(iter, "plan has no pending step");
            let meta = IterationMeta {
                iter,
                pending_steps: 0,
                selected_step: None,
                tool: None,
                outcome: IterationOutcome::PlanExhausted,
                duration_ms: elapsed_ms(started),
            };
            log_iteration(&paths, &meta, &plan, None)?;
            on_iteration(&meta);
            return Ok(LoopOutcome {
                iterations: iter,
                steps_done,
                stop: LoopStop::PlanExhausted,
            });
        };
        let pending_steps = plan.pending_count();

        // DISPATCH_STEP
        let board = store.board();
        let board_json = board.to_pretty_json_without(&[TEMPLATE_KEY, TEMPLATE_PATH_KEY]);
        let pack = prompts.build_dispatcher(&DispatchInputs {
            step: &step,
            template_path: board.get_str(TEMPLATE_PATH_KEY).unwrap_or_default(),
            template: board.get_str(TEMPLATE_KEY).unwrap_or_default(),
            blackboard_json: &board_json,
            tool_catalog: &catalog,
        })?;
        let response = ask(oracle, &pack.messages(), &options.tags, &budget)
            .with_context(|| format!("dispatch step (iteration {iter})"))?;

        let mut meta = IterationMeta {
            iter,
            pending_steps,
            selected_step: Some(step.clone()),
            tool: None,
            outcome: IterationOutcome::Completed,
            duration_ms: None,
        };

        if is_completion(&response) {
            info!(iter, "dispatcher signalled completion");
            meta.duration_ms = elapsed_ms(started);
            log_iteration(&paths, &meta, &plan, Some(&response))?;
            on_iteration(&meta);
            return Ok(LoopOutcome {
                iterations: iter,
                steps_done,
                stop: LoopStop::Completed,
            });
        }

        meta.outcome = match parse_tool_call(&response) {
            Err(err) => {
                warn!(iter, %err, "malformed tool call, replanning");
                IterationOutcome::MalformedToolCall
            }
            Ok(request) => {
                meta.tool = Some(request.name.clone());
                budget.remaining()?;
                match tools.call(&request) {
                    Err(err) => match err.downcast_ref::<UnknownToolError>() {
                        Some(unknown) => {
                            warn!(iter, tool = %unknown.name, "unknown tool, replanning");
                            IterationOutcome::UnknownTool
                        }
                        None => return Err(err.context(format!("dispatch step {step:?}"))),
                    },
                    Ok(output) => {
                        store.set(
                            LAST_TOOL_CALL_KEY,
                            serde_json::to_value(&request).context("encode tool call")?,
                        )?;
                        store.set(RESULT_KEY, output.content.as_str())?;
                        if output.is_error {
                            warn!(iter, tool = %request.name, "tool reported an error");
                            IterationOutcome::ToolError
                        } else {
                            plan.mark_done(&step);
                            store.push(HISTORY_KEY, format!("{DONE_MARKER} - {step}"))?;
                            record_plan(&mut store, &paths, &plan)?;
                            steps_done += 1;
                            IterationOutcome::Dispatched
                        }
                    }
                }
            }
        };

        meta.duration_ms = elapsed_ms(started);
        log_iteration(&paths, &meta, &plan, Some(&response))?;
        on_iteration(&meta);
    }

    warn!(
        max_iterations = options.max_iterations,
        "iteration bound reached"
    );
    Ok(LoopOutcome {
        iterations: options.max_iterations,
        steps_done,
        stop: LoopStop::MaxIterationsExceeded {
            max_iterations: options.max_iterations,
        },
    })
}

/// Validate inputs, seed the blackboard and write the initial artifacts.
fn bootstrap(
    patient_folder: &Path,
    template_path: &Path,
    paths: &SessionPaths,
) -> Result<BlackboardStore> {
    check_inputs(patient_folder, template_path)?;
    let template = std::fs::read_to_string(template_path)
        .with_context(|| format!("read template {}", template_path.display()))?;
    let files: Vec<Value> = source_documents(patient_folder, template_path)?
        .iter()
        .map(|document| Value::String(document.path.display().to_string()))
        .collect();

    let mut store = BlackboardStore::create(&paths.blackboard_path)?;
    store.set(
        PATIENT_FOLDER_KEY,
        patient_folder.display().to_string(),
    )?;
    store.set(TEMPLATE_PATH_KEY, template_path.display().to_string())?;
    store.set(TEMPLATE_KEY, template)?;
    store.set(FILES_KEY, files)?;
    write_plan(&paths.plan_path, &Plan::default())?;
    info!(artifacts = %paths.dir.display(), "agent session bootstrapped");
    Ok(store)
}

fn record_plan(store: &mut BlackboardStore, paths: &SessionPaths, plan: &Plan) -> Result<()> {
    store.set(PLAN_KEY, plan.render())?;
    write_plan(&paths.plan_path, plan)
}

fn log_iteration(
    paths: &SessionPaths,
    meta: &IterationMeta,
    plan: &Plan,
    step_response: Option<&str>,
) -> Result<()> {
    write_iteration(&IterationWriteRequest {
        paths: &paths.iteration(meta.iter),
        meta,
        plan,
        step_response,
    })
}

fn elapsed_ms(started: Instant) -> Option<u64> {
    u64::try_from(started.elapsed().as_millis()).ok()
}
