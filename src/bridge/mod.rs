//! Seam to the external proxy/scanner toolset.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use crate::errors::PilotError;

pub use http::HttpToolBridge;

/// Executes concrete actions for the agent. Implementations enforce their
/// own timeouts; a failing call is recoverable, an unavailable bridge at
/// start is not.
#[async_trait]
pub trait ToolBridge: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn call_tool(&self, name: &str, args: &Value) -> Result<String, PilotError>;

    async fn disconnect(&self);
}
