use serde::{Deserialize, Serialize};

/// Severity level for a vulnerability, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Info,
}

impl Severity {
    /// Returns a numeric rank where lower values indicate higher severity.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vulnerability recorded by an agent as a side effect of a tool call the
/// decision provider classified as a finding. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub cvss_score: Option<f64>,
    #[serde(default)]
    pub cwe: Option<String>,
    #[serde(default)]
    pub remediation: String,
    #[serde(default)]
    pub request_evidence: String,
    #[serde(default)]
    pub response_evidence: String,
}

impl Vulnerability {
    /// Key used to merge the same issue reported by several agents.
    pub fn dedup_key(&self) -> (String, String) {
        (normalize(&self.name), normalize(&self.request_evidence))
    }

    /// One-line label for log output.
    pub fn headline(&self) -> String {
        match &self.cwe {
            Some(cwe) => format!("[{}] {} ({})", self.severity.as_str().to_uppercase(), self.name, cwe),
            None => format!("[{}] {}", self.severity.as_str().to_uppercase(), self.name),
        }
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && !c.is_whitespace(), "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vuln(name: &str, request: &str) -> Vulnerability {
        Vulnerability {
            name: name.to_string(),
            description: String::new(),
            severity: Severity::High,
            cvss_score: Some(8.1),
            cwe: Some("CWE-639".to_string()),
            remediation: String::new(),
            request_evidence: request.to_string(),
            response_evidence: String::new(),
        }
    }

    #[test]
    fn test_dedup_key_ignores_case_and_punctuation() {
        let a = vuln("IDOR on /api/orders", "GET /api/orders/2");
        let b = vuln("idor on apiorders", "get  /api/orders/2");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_dedup_key_distinguishes_evidence() {
        let a = vuln("IDOR", "GET /api/orders/2");
        let b = vuln("IDOR", "GET /api/invoices/2");
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_severity_rank_ordering() {
        assert!(Severity::Critical.rank() < Severity::High.rank());
        assert!(Severity::Low.rank() < Severity::Info.rank());
    }

    #[test]
    fn test_vulnerability_deserializes_with_defaults() {
        let v: Vulnerability = serde_json::from_str(r#"{"name": "Reflected XSS", "severity": "medium"}"#).unwrap();
        assert_eq!(v.severity, Severity::Medium);
        assert!(v.cwe.is_none());
        assert!(v.request_evidence.is_empty());
    }

    #[test]
    fn test_headline_includes_cwe() {
        assert_eq!(vuln("IDOR", "").headline(), "[HIGH] IDOR (CWE-639)");
    }
}
