use async_trait::async_trait;
use serde_json::Value;
use crate::errors::PilotError;
use super::types::LLMResponse;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Free-form text completion
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LLMResponse, PilotError>;

    /// JSON completion shaped by `schema`
    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &Value,
        system: Option<&str>,
    ) -> Result<Value, PilotError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}
