use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use crate::errors::PilotError;
use super::json::{extract_json, schema_instructions};
use super::provider::LLMProvider;
use super::types::{http_client, status_error, transport_error, LLMResponse, DEFAULT_MAX_TOKENS, DEFAULT_TIMEOUT};

/// Chat-completions client. Also covers OpenAI-compatible servers
/// (vLLM, Ollama, LM Studio) through `with_base_url`.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, model: Option<&str>) -> Self {
        Self::with_base_url(api_key, model, "https://api.openai.com/v1")
    }

    pub fn with_base_url(api_key: &str, model: Option<&str>, base_url: &str) -> Self {
        Self {
            client: http_client(DEFAULT_TIMEOUT),
            api_key: api_key.to_string(),
            model: model.unwrap_or("gpt-4o").to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    async fn chat(&self, messages: Vec<Value>, json_mode: bool) -> Result<LLMResponse, PilotError> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let mut request = self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let resp = request.send().await.map_err(|e| transport_error("openai", e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error("openai", status, &text));
        }

        let data: Value = resp.json().await
            .map_err(|e| PilotError::LLMApi(format!("Failed to parse OpenAI response: {}", e)))?;
        if let Some(error) = data.get("error") {
            return Err(PilotError::LLMApi(error["message"].as_str().unwrap_or("Unknown").to_string()));
        }

        let content = data["choices"][0]["message"]["content"].as_str()
            .ok_or_else(|| PilotError::LLMApi("No content in OpenAI response".into()))?
            .to_string();
        let input_tokens = data["usage"]["prompt_tokens"].as_u64();
        let output_tokens = data["usage"]["completion_tokens"].as_u64();
        debug!(model = %self.model, input_tokens, output_tokens, "OpenAI completion");

        Ok(LLMResponse {
            content,
            input_tokens,
            output_tokens,
            model: self.model.clone(),
        })
    }
}

fn messages(prompt: &str, system: Option<&str>) -> Vec<Value> {
    let mut messages = Vec::new();
    if let Some(sys) = system {
        messages.push(json!({"role": "system", "content": sys}));
    }
    messages.push(json!({"role": "user", "content": prompt}));
    messages
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<LLMResponse, PilotError> {
        self.chat(messages(prompt, system), false).await
    }

    async fn complete_structured(&self, prompt: &str, schema: &Value, system: Option<&str>) -> Result<Value, PilotError> {
        let prompt = format!("{}\n\n{}", prompt, schema_instructions(schema));
        let response = self.chat(messages(&prompt, system), true).await?;
        extract_json(&response.content)
    }

    fn provider_name(&self) -> &str { "openai" }
    fn model_name(&self) -> &str { &self.model }
}
