use serde_json::Value;
use crate::errors::PilotError;

/// Pull a JSON value out of model output: bare JSON, a fenced ```json block,
/// or the outermost `{...}` span.
pub fn extract_json(text: &str) -> Result<Value, PilotError> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        if let Some(end) = rest.find("```") {
            return serde_json::from_str(rest[..end].trim())
                .map_err(|e| PilotError::LLMApi(format!("Invalid JSON in code block: {}", e)));
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return serde_json::from_str(&trimmed[start..=end])
                .map_err(|e| PilotError::LLMApi(format!("Invalid JSON extraction: {}", e)));
        }
    }
    Err(PilotError::LLMApi("No valid JSON found in model response".into()))
}

/// Prompt suffix asking for JSON matching `schema`.
pub fn schema_instructions(schema: &Value) -> String {
    format!(
        "Respond with valid JSON matching this schema:\n```json\n{}\n```\n\nReturn ONLY the JSON, no other text.",
        serde_json::to_string_pretty(schema).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_json() {
        assert_eq!(extract_json(" {\"a\": 1} ").unwrap()["a"], 1);
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here you go:\n```json\n{\"next\": \"complete\"}\n```\nGood luck";
        assert_eq!(extract_json(text).unwrap()["next"], "complete");
    }

    #[test]
    fn test_embedded_object() {
        let text = "Decision: {\"thought\": \"look at /admin\"} end";
        assert_eq!(extract_json(text).unwrap()["thought"], "look at /admin");
    }

    #[test]
    fn test_no_json() {
        assert!(matches!(extract_json("I cannot help"), Err(PilotError::LLMApi(_))));
    }
}
