use serde::Serialize;
use serde_json::Value;
use crate::models::{RunConfig, Vulnerability};
use crate::utils::truncation::truncate_output;
use super::phase::Phase;
use super::tools::{ToolCatalog, ToolSpec};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous web application penetration tester \
working through an intercepting proxy. Work methodically: map the attack surface, then test \
the most promising inputs for injection, access-control and business-logic flaws. Only report \
a finding when a tool response proves it, and include the request and response evidence. \
Stay within the target's scope. Signal completion when the remaining surface is covered.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    Agent,
    Tool,
    Human,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

/// How the provider should treat planning on this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum PlanningDirective {
    /// Still in the planning phase. `rounds_left` is `None` when the
    /// provider decides how long to plan.
    Plan { rounds_left: Option<u32> },
    /// A short plan note is welcome before the first action.
    PlanFirst,
    Act,
}

/// Everything the decision provider sees for one step.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionContext {
    pub system_prompt: String,
    pub target: String,
    pub role: Option<String>,
    pub phase: Phase,
    pub iteration: u32,
    pub max_iterations: u32,
    pub planning: PlanningDirective,
    pub instruction: Option<String>,
    pub history: Vec<Turn>,
    pub tools: Vec<ToolSpec>,
    pub findings: Vec<Vulnerability>,
    pub endpoints: Vec<String>,
    pub idor_users: Vec<String>,
}

/// Per-step inputs that live in the agent rather than the conversation.
pub struct StepInfo<'a> {
    pub phase: Phase,
    pub iteration: u32,
    pub max_iterations: u32,
    pub planning: PlanningDirective,
    pub instruction: Option<String>,
    pub findings: Vec<Vulnerability>,
    pub catalog: &'a ToolCatalog,
}

/// Running conversation of one run. A continuation starts a fresh one.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    system_prompt: String,
    target: String,
    role: Option<String>,
    idor_users: Vec<String>,
    history: Vec<Turn>,
    endpoints: Vec<String>,
    tool_output_limit: usize,
    history_window: usize,
}

impl ConversationContext {
    pub fn new(config: &RunConfig, role: Option<(&str, &str)>, tool_output_limit: usize, history_window: usize) -> Self {
        let mut system_prompt = config
            .custom_system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        if let Some((_, focus)) = role {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(focus);
        }
        Self {
            system_prompt,
            target: config.target.clone(),
            role: role.map(|(name, _)| name.to_string()),
            idor_users: config.idor_users.iter().map(|u| u.label.clone()).collect(),
            history: Vec::new(),
            endpoints: Vec::new(),
            tool_output_limit,
            history_window: history_window.max(1),
        }
    }

    pub fn push_system(&mut self, text: impl Into<String>) {
        self.push(TurnRole::System, text.into());
    }

    pub fn push_agent(&mut self, text: impl Into<String>) {
        self.push(TurnRole::Agent, text.into());
    }

    pub fn push_human(&mut self, text: impl Into<String>) {
        self.push(TurnRole::Human, text.into());
    }

    /// Record a tool call and its (truncated) output. A `url` argument is
    /// remembered as a discovered endpoint.
    pub fn push_tool_result(&mut self, tool: &str, args: &Value, output: &str) {
        if let Some(url) = args.get("url").and_then(Value::as_str) {
            self.add_endpoint(url);
        }
        let output = truncate_output(output, self.tool_output_limit);
        self.push(TurnRole::Tool, format!("{} {}\n{}", tool, args, output));
    }

    pub fn push_tool_error(&mut self, tool: &str, args: &Value, error: &str) {
        self.push(TurnRole::Tool, format!("{} {}\nERROR: {}", tool, args, error));
    }

    pub fn add_endpoint(&mut self, endpoint: &str) {
        let endpoint = endpoint.trim();
        if !endpoint.is_empty() && !self.endpoints.iter().any(|e| e == endpoint) {
            self.endpoints.push(endpoint.to_string());
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    fn push(&mut self, role: TurnRole, content: String) {
        self.history.push(Turn { role, content });
    }

    /// Assemble the provider input for one step. Only the last
    /// `history_window` turns are sent.
    pub fn build(&self, step: StepInfo<'_>) -> DecisionContext {
        let skip = self.history.len().saturating_sub(self.history_window);
        DecisionContext {
            system_prompt: self.system_prompt.clone(),
            target: self.target.clone(),
            role: self.role.clone(),
            phase: step.phase,
            iteration: step.iteration,
            max_iterations: step.max_iterations,
            planning: step.planning,
            instruction: step.instruction,
            history: self.history[skip..].to_vec(),
            tools: step.catalog.specs().to_vec(),
            findings: step.findings,
            endpoints: self.endpoints.clone(),
            idor_users: self.idor_users.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(catalog: &ToolCatalog) -> StepInfo<'_> {
        StepInfo {
            phase: Phase::Recon,
            iteration: 3,
            max_iterations: 10,
            planning: PlanningDirective::Act,
            instruction: None,
            findings: Vec::new(),
            catalog,
        }
    }

    #[test]
    fn test_custom_prompt_and_role_focus() {
        let mut config = RunConfig::new("https://shop.example");
        config.custom_system_prompt = Some("Only test the checkout flow.".into());
        let ctx = ConversationContext::new(&config, Some(("fuzzer", "Focus on input fuzzing.")), 100, 10);
        let catalog = ToolCatalog::for_config(&config);
        let built = ctx.build(step(&catalog));
        assert!(built.system_prompt.starts_with("Only test the checkout flow."));
        assert!(built.system_prompt.ends_with("Focus on input fuzzing."));
        assert_eq!(built.role.as_deref(), Some("fuzzer"));
    }

    #[test]
    fn test_history_window_keeps_latest_turns() {
        let config = RunConfig::new("https://shop.example");
        let mut ctx = ConversationContext::new(&config, None, 100, 3);
        for i in 0..6 {
            ctx.push_agent(format!("note {}", i));
        }
        let catalog = ToolCatalog::for_config(&config);
        let built = ctx.build(step(&catalog));
        let contents: Vec<&str> = built.history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["note 3", "note 4", "note 5"]);
        assert_eq!(ctx.history().len(), 6);
    }

    #[test]
    fn test_tool_output_truncated_and_endpoint_recorded() {
        let config = RunConfig::new("https://shop.example");
        let mut ctx = ConversationContext::new(&config, None, 20, 10);
        let args = json!({"url": "https://shop.example/api/cart"});
        ctx.push_tool_result("send_http_request", &args, &"x".repeat(500));
        ctx.push_tool_result("send_http_request", &args, "ok");
        assert_eq!(ctx.endpoints(), ["https://shop.example/api/cart".to_string()]);
        assert!(ctx.history()[0].content.contains("[truncated 480 chars]"));
        assert_eq!(ctx.history()[0].role, TurnRole::Tool);
    }
}
