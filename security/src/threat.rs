use crate::request::ClientRequest;
use jobhub_models::Severity;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A named attack signature over a text fragment.
///
/// The catalogue is fixed at startup and never mutated; new signatures
/// are additive rows in the table below.
pub struct SecurityPattern {
    pub name: &'static str,
    pub reason: &'static str,
    pub severity: Severity,
    matcher: Regex,
}

impl SecurityPattern {
    fn new(name: &'static str, reason: &'static str, severity: Severity, pattern: &str) -> Self {
        Self {
            name,
            reason,
            severity,
            // Built-in patterns are compile-time constants; a failure
            // here is a programmer error and should abort startup.
            matcher: Regex::new(pattern).expect("built-in security pattern must compile"),
        }
    }
}

/// Injection/traversal signatures, checked in definition order. All
/// expressions are flat alternations so matching stays linear in the
/// input.
static PATTERNS: Lazy<Vec<SecurityPattern>> = Lazy::new(|| {
    vec![
        SecurityPattern::new(
            "sql_injection",
            "Potential SQL injection detected",
            Severity::High,
            r"(?i)(\bunion\s+(all\s+)?select\b|\bdrop\s+table\b|\binsert\s+into\b|\bdelete\s+from\b|'\s*or\s*'1'\s*=\s*'1|'\s*or\s*1\s*=\s*1|;\s*(drop|delete|update|insert|truncate|shutdown)\b|--\s*$)",
        ),
        SecurityPattern::new(
            "xss",
            "Potential XSS attack detected",
            Severity::High,
            r"(?i)(<\s*script\b|\bjavascript\s*:|\bon(error|load|click|mouseover|focus)\s*=|<\s*iframe\b|document\.cookie)",
        ),
        SecurityPattern::new(
            "path_traversal",
            "Path traversal attempt detected",
            Severity::High,
            r"(?i)(\.\./|\.\.\\|\.\.%2f|%2e%2e%2f|%2e%2e/)",
        ),
        SecurityPattern::new(
            "command_injection",
            "Potential command injection detected",
            Severity::High,
            r"(?i)(;\s*(rm|cat|wget|curl|chmod|nc|bash|sh|kill)\b|\|\s*(rm|cat|nc|bash|sh)\b|&&\s*(rm|cat|wget|curl)\b|\$\(|`\s*(rm|cat|wget|curl|id|whoami)\b)",
        ),
    ]
});

/// Substrings of User-Agent values sent by known scanning tools.
const SCANNER_AGENTS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "dirbuster",
    "gobuster",
    "wpscan",
    "acunetix",
    "nessus",
    "metasploit",
    "hydra",
    "burpsuite",
    "owasp zap",
];

const SUSPICIOUS_AGENT_REASON: &str = "Suspicious user agent detected";

/// Per-request verdict. Never persisted.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub is_suspicious: bool,
    /// One human-readable reason per matched signature, in
    /// signature-definition order; the user-agent reason comes last.
    pub reasons: Vec<String>,
    pub severity: Severity,
}

impl DetectionResult {
    fn benign() -> Self {
        Self {
            is_suspicious: false,
            reasons: Vec::new(),
            severity: Severity::Low,
        }
    }
}

/// Heuristic inspection of request content against the signature table.
///
/// Classifies, never blocks: whether a suspicious verdict rejects the
/// request is the caller's policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreatDetector;

impl ThreatDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn inspect(&self, req: &ClientRequest) -> DetectionResult {
        let mut fragments: Vec<&str> = Vec::new();
        if let Some(body) = &req.body {
            collect_string_leaves(body, &mut fragments);
        }
        if !req.path.is_empty() {
            fragments.push(&req.path);
        }

        // Missing body/url/headers contribute nothing; absence is
        // benign, not an error.
        if fragments.is_empty() && req.user_agent().is_none() {
            return DetectionResult::benign();
        }

        let mut result = DetectionResult::benign();

        for pattern in PATTERNS.iter() {
            if fragments.iter().any(|f| pattern.matcher.is_match(f)) {
                result.reasons.push(pattern.reason.to_string());
                result.severity = result.severity.max(pattern.severity);
            }
        }

        if let Some(agent) = req.user_agent() {
            let agent = agent.to_ascii_lowercase();
            if SCANNER_AGENTS.iter().any(|sig| agent.contains(sig)) {
                result.reasons.push(SUSPICIOUS_AGENT_REASON.to_string());
                result.severity = result.severity.max(Severity::Medium);
            }
        }

        result.is_suspicious = !result.reasons.is_empty();
        result
    }
}

fn collect_string_leaves<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s.as_str()),
        Value::Array(items) => {
            for item in items {
                collect_string_leaves(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_string_leaves(item, out);
            }
        }
        _ => {}
    }
}
