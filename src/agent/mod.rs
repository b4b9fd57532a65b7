//! Single-agent scan loop.

pub mod context;
pub mod decision;
pub mod orchestrator;
pub mod phase;
pub mod state;
pub mod tools;

pub use context::{DecisionContext, PlanningDirective, Turn, TurnRole};
pub use decision::{Decision, DecisionProvider, LlmDecisionProvider, NextStep, ToolCall};
pub use orchestrator::{AgentBuilder, AgentRole, ContinueRequest, OrchestratorAgent, PreparedContinuation};
pub use phase::Phase;
pub use state::{AgentSnapshot, CompletionReason, RunOutcome};
pub use tools::{ToolCatalog, ToolSpec};
