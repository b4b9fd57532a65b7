use std::fmt::Write as _;
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use crate::errors::PilotError;
use crate::llm::LLMProvider;
use crate::models::Vulnerability;
use super::context::{DecisionContext, PlanningDirective};

/// A tool invocation chosen by the decision provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NextStep {
    Plan { note: String },
    Tool(ToolCall),
    Complete {
        #[serde(default)]
        summary: String,
    },
}

/// One answer from the decision provider. `findings` classify the output of
/// the previous tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub thought: Option<String>,
    #[serde(default)]
    pub findings: Vec<Vulnerability>,
    #[serde(rename = "action")]
    pub next: NextStep,
}

impl Decision {
    pub fn plan(note: impl Into<String>) -> Self {
        Self { thought: None, findings: Vec::new(), next: NextStep::Plan { note: note.into() } }
    }

    pub fn tool(tool: impl Into<String>, args: Value) -> Self {
        Self {
            thought: None,
            findings: Vec::new(),
            next: NextStep::Tool(ToolCall { tool: tool.into(), args, rationale: None }),
        }
    }

    pub fn complete(summary: impl Into<String>) -> Self {
        Self { thought: None, findings: Vec::new(), next: NextStep::Complete { summary: summary.into() } }
    }

    pub fn with_findings(mut self, findings: Vec<Vulnerability>) -> Self {
        self.findings = findings;
        self
    }
}

/// The reasoning collaborator. Implementations enforce their own timeouts.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Choose the next step for the given context.
    async fn generate(&self, ctx: &DecisionContext) -> Result<Decision, PilotError>;

    /// One-shot free-text answer, used after a run has ended.
    async fn consult(&self, prompt: &str) -> Result<String, PilotError>;
}

/// `DecisionProvider` on top of an LLM.
pub struct LlmDecisionProvider {
    llm: Arc<dyn LLMProvider>,
}

impl LlmDecisionProvider {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }
}

const CONSULT_SYSTEM: &str = "You are a penetration-testing assistant answering an operator's \
question about a finished scan. Be concise and reference the findings provided.";

#[async_trait]
impl DecisionProvider for LlmDecisionProvider {
    async fn generate(&self, ctx: &DecisionContext) -> Result<Decision, PilotError> {
        let prompt = render_prompt(ctx);
        let value = self
            .llm
            .complete_structured(&prompt, &decision_schema(), Some(&ctx.system_prompt))
            .await?;
        debug!(provider = self.llm.provider_name(), iteration = ctx.iteration, "Decision received");
        parse_decision(value)
    }

    async fn consult(&self, prompt: &str) -> Result<String, PilotError> {
        Ok(self.llm.complete(prompt, Some(CONSULT_SYSTEM)).await?.content)
    }
}

/// Parse the structured model output. A malformed decision is a provider
/// failure and counts toward the retry budget.
pub fn parse_decision(value: Value) -> Result<Decision, PilotError> {
    serde_json::from_value(value).map_err(|e| PilotError::Provider(format!("Malformed decision: {}", e)))
}

fn decision_schema() -> Value {
    json!({
        "type": "object",
        "required": ["action"],
        "properties": {
            "thought": { "type": "string" },
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "severity"],
                    "properties": {
                        "name": { "type": "string" },
                        "description": { "type": "string" },
                        "severity": { "enum": ["critical", "high", "medium", "low", "info"] },
                        "cvssScore": { "type": "number" },
                        "cwe": { "type": "string" },
                        "remediation": { "type": "string" },
                        "requestEvidence": { "type": "string" },
                        "responseEvidence": { "type": "string" }
                    }
                }
            },
            "action": {
                "oneOf": [
                    {
                        "type": "object",
                        "required": ["type", "note"],
                        "properties": { "type": { "const": "plan" }, "note": { "type": "string" } }
                    },
                    {
                        "type": "object",
                        "required": ["type", "tool"],
                        "properties": {
                            "type": { "const": "tool" },
                            "tool": { "type": "string" },
                            "args": { "type": "object" },
                            "rationale": { "type": "string" }
                        }
                    },
                    {
                        "type": "object",
                        "required": ["type"],
                        "properties": { "type": { "const": "complete" }, "summary": { "type": "string" } }
                    }
                ]
            }
        }
    })
}

fn render_prompt(ctx: &DecisionContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Target: {}", ctx.target);
    if let Some(role) = &ctx.role {
        let _ = writeln!(out, "Role: {}", role);
    }
    let _ = writeln!(out, "Phase: {}", ctx.phase);
    let _ = writeln!(out, "Step: {} of {}", ctx.iteration + 1, ctx.max_iterations);

    match ctx.planning {
        PlanningDirective::Plan { rounds_left: Some(n) } => {
            let _ = writeln!(out, "\nYou are planning. Return a `plan` action ({} planning round(s) left) or start with a tool.", n);
        }
        PlanningDirective::Plan { rounds_left: None } => {
            let _ = writeln!(out, "\nYou are planning. Return `plan` actions until the plan is ready, then start with a tool.");
        }
        PlanningDirective::PlanFirst => {
            let _ = writeln!(out, "\nWrite a short `plan` for this continuation before acting.");
        }
        PlanningDirective::Act => {}
    }

    if let Some(instruction) = &ctx.instruction {
        let _ = writeln!(out, "\nOPERATOR INSTRUCTION (highest priority):\n{}", instruction);
    }

    out.push_str("\nAvailable tools:\n");
    for tool in &ctx.tools {
        let _ = writeln!(out, "- {}: {}", tool.name, tool.description);
    }
    if !ctx.idor_users.is_empty() {
        let _ = writeln!(out, "\nTest accounts for cross-account checks: {}", ctx.idor_users.join(", "));
    }
    if !ctx.endpoints.is_empty() {
        out.push_str("\nKnown endpoints:\n");
        for endpoint in &ctx.endpoints {
            let _ = writeln!(out, "- {}", endpoint);
        }
    }
    if !ctx.findings.is_empty() {
        out.push_str("\nAlready reported (do not repeat):\n");
        for finding in &ctx.findings {
            let _ = writeln!(out, "- {}", finding.headline());
        }
    }
    if !ctx.history.is_empty() {
        out.push_str("\nConversation so far:\n");
        for turn in &ctx.history {
            let _ = writeln!(out, "[{:?}] {}", turn.role, turn.content);
        }
    }
    out.push_str("\nReport any vulnerability proven by the last tool output in `findings`, then choose the next action.");
    out
}
