//! Prompt packs for every oracle call.
//!
//! Templates are embedded with `include_str!` and rendered with minijinja.
//! Agent templates (planner, dispatcher) carry section markers of the form
//! `<!-- section:KEY required|droppable -->`. The `contract` section becomes
//! the system message; the remaining sections form the user message and are
//! held to a byte budget.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::plan::PENDING_MARKER;
use crate::core::tool_call::COMPLETION_SENTINEL;
use crate::io::oracle::ChatMessage;

const MERGE_SYSTEM_TEMPLATE: &str = include_str!("prompts/merge_system.md");
const MERGE_USER_TEMPLATE: &str = include_str!("prompts/merge_user.md");
const TRANSCRIBE_SYSTEM_TEMPLATE: &str = include_str!("prompts/transcribe_system.md");
const TRANSCRIBE_USER_TEMPLATE: &str = include_str!("prompts/transcribe_user.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const DISPATCHER_TEMPLATE: &str = include_str!("prompts/dispatcher.md");

/// Section that becomes the system message.
const CONTRACT_SECTION: &str = "contract";
/// Droppable sections, least important first.
const DROP_ORDER: [&str; 2] = ["tools", "plan"];
const TRUNCATION_MARK: &str = "\n[truncated]";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section regex is valid")
});

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("merge_system", MERGE_SYSTEM_TEMPLATE),
            ("merge_user", MERGE_USER_TEMPLATE),
            ("transcribe_system", TRANSCRIBE_SYSTEM_TEMPLATE),
            ("transcribe_user", TRANSCRIBE_USER_TEMPLATE),
            ("planner", PLANNER_TEMPLATE),
            ("dispatcher", DISPATCHER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load prompt template {name}"))?;
        }
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render prompt template {name}"))
    }
}

/// A system + user message pair ready for the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    pub system: String,
    pub user: String,
}

impl PromptPack {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }

    /// Like [`PromptPack::messages`], with an inline image on the user turn.
    pub fn messages_with_image(&self, mime: &str, base64_payload: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user_with_image(self.user.clone(), mime, base64_payload),
        ]
    }
}

/// Prompt for merging one document into one template fragment.
pub fn merge_prompt(fragment: &str, file_name: &str, document: &str) -> Result<PromptPack> {
    let engine = PromptEngine::new()?;
    Ok(PromptPack {
        system: engine.render("merge_system", context! {})?,
        user: engine.render(
            "merge_user",
            context! {
                fragment => fragment.trim(),
                file_name => file_name,
                document => document.trim(),
            },
        )?,
    })
}

/// Prompt for transcribing one image document.
pub fn transcription_prompt(file_name: &str) -> Result<PromptPack> {
    let engine = PromptEngine::new()?;
    Ok(PromptPack {
        system: engine.render("transcribe_system", context! {})?,
        user: engine.render("transcribe_user", context! { file_name => file_name })?,
    })
}

/// Inputs for the plan update call.
#[derive(Debug, Clone, Copy)]
pub struct PlannerInputs<'a> {
    pub blackboard_json: &'a str,
    pub plan_text: &'a str,
    pub tool_catalog: &'a str,
}

/// Inputs for the step dispatch call.
#[derive(Debug, Clone, Copy)]
pub struct DispatchInputs<'a> {
    pub step: &'a str,
    /// Kept in its own section ahead of the blackboard so budget truncation
    /// never cuts it.
    pub template_path: &'a str,
    pub template: &'a str,
    pub blackboard_json: &'a str,
    pub tool_catalog: &'a str,
}

/// Builds agent prompt packs within a byte budget, dropping less critical
/// sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_planner(&self, input: &PlannerInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::new()?.render(
            "planner",
            context! {
                pending_marker => PENDING_MARKER,
                tool_catalog => input.tool_catalog.trim(),
                plan => input.plan_text.trim(),
                blackboard => input.blackboard_json.trim(),
            },
        )?;
        Ok(self.pack(&rendered))
    }

    pub fn build_dispatcher(&self, input: &DispatchInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::new()?.render(
            "dispatcher",
            context! {
                sentinel => COMPLETION_SENTINEL,
                step => input.step.trim(),
                template_path => input.template_path,
                template => input.template.trim(),
                tool_catalog => input.tool_catalog.trim(),
                blackboard => input.blackboard_json.trim(),
            },
        )?;
        Ok(self.pack(&rendered))
    }

    fn pack(&self, rendered: &str) -> PromptPack {
        let mut sections = parse_sections(rendered);
        let system = match sections.iter().position(|s| s.key == CONTRACT_SECTION) {
            Some(idx) => sections.remove(idx).content,
            None => String::new(),
        };
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        PromptPack {
            system,
            user: render_sections(&sections),
        }
    }
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Section text after the marker, trimmed.
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let required = kind.as_str() == "required";
        let content = rendered[whole.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in [`DROP_ORDER`] until within budget, then
/// truncate the last section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(rest));
    let before_len = last.content.len();
    if allowed > TRUNCATION_MARK.len() {
        truncate_on_char_boundary(&mut last.content, allowed - TRUNCATION_MARK.len());
        last.content.push_str(TRUNCATION_MARK);
    } else {
        truncate_on_char_boundary(&mut last.content, allowed);
    }
    debug!(
        section = %last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn truncate_on_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
