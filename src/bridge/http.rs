use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use crate::errors::PilotError;
use super::ToolBridge;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridge to a locally running tool server.
///
/// `GET {base}/health` answers availability; `POST {base}/tools/{name}`
/// takes the JSON arguments and returns either `{"output": "..."}`,
/// `{"error": "..."}` or plain text.
pub struct HttpToolBridge {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    disconnected: AtomicBool,
}

#[derive(Deserialize)]
struct ToolReply {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpToolBridge {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Option<Duration>) -> Result<Self, PilotError> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| PilotError::Config(format!("Cannot build bridge client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            disconnected: AtomicBool::new(false),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl ToolBridge for HttpToolBridge {
    async fn is_available(&self) -> bool {
        if self.disconnected.load(Ordering::SeqCst) {
            return false;
        }
        let url = format!("{}/health", self.base_url);
        match self.request(self.client.get(&url)).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(url = %url, status = %resp.status(), "Tool bridge health check failed");
                false
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Tool bridge unreachable");
                false
            }
        }
    }

    async fn call_tool(&self, name: &str, args: &Value) -> Result<String, PilotError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(PilotError::ToolBridgeUnavailable("bridge disconnected".into()));
        }
        let url = format!("{}/tools/{}", self.base_url, name);
        let resp = self
            .request(self.client.post(&url))
            .json(args)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PilotError::Timeout(format!("tool {} timed out", name))
                } else {
                    PilotError::Tool(format!("tool {} request failed: {}", name, e))
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PilotError::Tool(format!("tool {} response unreadable: {}", name, e)))?;
        debug!(tool = name, status = %status, bytes = body.len(), "Tool bridge reply");

        let reply = serde_json::from_str::<ToolReply>(&body).ok();
        if !status.is_success() {
            let detail = reply.and_then(|r| r.error).unwrap_or(body);
            return Err(PilotError::Tool(format!("tool {} returned {}: {}", name, status, detail)));
        }
        match reply {
            Some(ToolReply { error: Some(error), .. }) => Err(PilotError::Tool(format!("tool {}: {}", name, error))),
            Some(ToolReply { output: Some(output), .. }) => Ok(output),
            _ => Ok(body),
        }
    }

    async fn disconnect(&self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            debug!(url = %self.base_url, "Tool bridge disconnected");
        }
    }
}
