use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "scan": {
                "type": "object",
                "properties": {
                    "rate_limit": { "type": "number", "minimum": 0.001 },
                    "use_nuclei": { "type": "boolean" },
                    "use_ffuf": { "type": "boolean" },
                    "max_iterations": { "type": "integer", "minimum": 1, "maximum": 500 },
                    "max_plan_rounds": { "type": "integer", "minimum": 0 },
                    "parallel_agents": { "type": "integer", "minimum": 1, "maximum": 50 },
                    "custom_system_prompt": { "type": "string" },
                    "idor_users": { "type": "array", "items": { "$ref": "#/$defs/idor_user" } }
                }
            },
            "engine": {
                "type": "object",
                "properties": {
                    "provider_failure_limit": { "type": "integer", "minimum": 1 },
                    "provider_retry_base_ms": { "type": "integer", "minimum": 0 },
                    "tool_output_limit": { "type": "integer", "minimum": 100 },
                    "history_window": { "type": "integer", "minimum": 1 }
                }
            },
            "llm": {
                "type": "object",
                "properties": {
                    "provider": { "type": "string", "enum": ["anthropic", "claude", "openai", "openai-compatible", "local"] },
                    "model": { "type": "string" },
                    "api_key": { "type": "string" },
                    "base_url": { "type": "string" },
                    "timeout_secs": { "type": "integer", "minimum": 1 }
                }
            },
            "bridge": {
                "type": "object",
                "properties": {
                    "url": { "type": "string" },
                    "api_key": { "type": "string" },
                    "timeout_secs": { "type": "integer", "minimum": 1 }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" }
                }
            }
        },
        "$defs": {
            "idor_user": {
                "type": "object",
                "required": ["label"],
                "properties": {
                    "label": { "type": "string", "minLength": 1 },
                    "username": { "type": "string" },
                    "password": { "type": "string" },
                    "token": { "type": "string" },
                    "cookie": { "type": "string" }
                }
            }
        }
    })
});
