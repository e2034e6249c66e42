//! User-input preprocessing: term redaction and an injection heuristic.
//!
//! The heuristic is best-effort. Text framed as a question only faces the
//! high-risk pattern set, so a payload phrased as "how do I ..." passes the
//! medium-risk checks.

use regex::{Captures, Regex, RegexSet};
use serde::{Deserialize, Serialize};

use parley_types::{Message, Role};

use crate::error::{AgentError, Result};

/// Replaces the whole body of a blocked message.
pub const DEFAULT_BLOCKED_MARKER: &str = "[blocked: possible command injection detected]";

/// Substrings suggesting the user is discussing commands rather than issuing them.
pub const DEFAULT_DISCUSSION_MARKERS: &[&str] = &[
    "如何", "怎么", "什么是", "请问", "能否", "可以", "解释", "说明", "举例", "示例", "例子",
    "学习", "教程", "文档", "原理", "区别", "how", "what", "why", "explain", "example",
    "tutorial", "learn",
];

const HIGH_RISK_PATTERNS: &[&str] = &[
    r"(?i);\s*(rm|del|format|fdisk|mkfs|dd)\s+",
    r"(?i)&&\s*(rm|del|format|fdisk|mkfs|dd)\s+",
    r"(?i)\|\|\s*(rm|del|format|fdisk|mkfs|dd)\s+",
    r"(?i)\b(rm\s+-rf|del\s+/[sq]|format\s+c:|fdisk\s+/mbr)\b",
    r"(?i)`[^`]*\b(rm|del|wget|curl|nc|netcat)\b[^`]*`",
    r"(?i)\$\([^)]*\b(rm|del|wget|curl|nc|netcat)\b[^)]*\)",
    r"(?i)(wget|curl)\s+\S+\s*\|\s*(sh|bash|python|perl)",
    r"(?i)\b(nc|netcat|ncat)\s+.*-[el]",
    r"(?i)/bin/(sh|bash)\s+-i",
    r"(?i)sudo\s+(rm|chmod|chown)\s+.*/\*",
    r"(?i)kill(all)?\s+-9",
];

const MEDIUM_RISK_PATTERNS: &[&str] = &[
    r"[;&|`]{2,}",
    r"\$\([^)]{20,}\)",
    r"`[^`]{20,}`",
    r"(?i)\b(cat|head|tail|less|more)\s+\S*[;&|]",
    r"(?i)(wget|curl|lynx)\s+\S+\s*\|",
    r"(?i)(echo|printf)\s+[A-Za-z0-9+/=]{20,}\s*\|\s*(base64|xxd)",
];

/// Preprocessor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    pub sensitive_terms: Vec<String>,
    pub discussion_markers: Vec<String>,
    pub blocked_marker: String,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            sensitive_terms: Vec::new(),
            discussion_markers: DEFAULT_DISCUSSION_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            blocked_marker: DEFAULT_BLOCKED_MARKER.to_string(),
        }
    }
}

impl PreprocessorConfig {
    pub fn with_sensitive_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_terms = terms.into_iter().map(Into::into).collect();
        self
    }
}

/// Which pattern set matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTier {
    High,
    Medium,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::High => "high",
            RiskTier::Medium => "medium",
        }
    }
}

/// Compiled preprocessor.
#[derive(Debug, Clone)]
pub struct InputPreprocessor {
    terms: Vec<Regex>,
    discussion_markers: Vec<String>,
    high_risk: RegexSet,
    medium_risk: RegexSet,
    blocked_marker: String,
}

impl InputPreprocessor {
    pub fn new(config: PreprocessorConfig) -> Result<Self> {
        let terms = config
            .sensitive_terms
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| Regex::new(&format!("(?i){}", regex::escape(t))))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AgentError::config(format!("invalid sensitive term: {}", e)))?;

        let high_risk = RegexSet::new(HIGH_RISK_PATTERNS)
            .map_err(|e| AgentError::config(format!("invalid risk pattern: {}", e)))?;
        let medium_risk = RegexSet::new(MEDIUM_RISK_PATTERNS)
            .map_err(|e| AgentError::config(format!("invalid risk pattern: {}", e)))?;

        Ok(Self {
            terms,
            discussion_markers: config
                .discussion_markers
                .iter()
                .filter(|m| !m.is_empty())
                .map(|m| m.to_lowercase())
                .collect(),
            high_risk,
            medium_risk,
            blocked_marker: config.blocked_marker,
        })
    }

    /// Redact configured terms, then block the text if it looks like an injection.
    pub fn preprocess(&self, text: &str) -> String {
        let redacted = self.redact(text);
        match self.detect_injection(&redacted) {
            Some(tier) => {
                tracing::warn!(risk = tier.as_str(), "Blocked user input as possible command injection");
                self.blocked_marker.clone()
            }
            None => redacted,
        }
    }

    /// Replace every case-insensitive occurrence of a term with `*` per character.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for term in &self.terms {
            out = term
                .replace_all(&out, |caps: &Captures| "*".repeat(caps[0].chars().count()))
                .into_owned();
        }
        out
    }

    pub fn is_discussion(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.discussion_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    pub fn detect_injection(&self, text: &str) -> Option<RiskTier> {
        if self.high_risk.is_match(text) {
            return Some(RiskTier::High);
        }
        if !self.is_discussion(text) && self.medium_risk.is_match(text) {
            return Some(RiskTier::Medium);
        }
        None
    }

    /// Preprocess the text of every user message in place. Images are untouched.
    pub fn apply(&self, messages: &mut [Message]) {
        for msg in messages.iter_mut().filter(|m| m.role == Role::User) {
            if let Some(content) = msg.content.as_mut() {
                content.map_text(|t| self.preprocess(t));
            }
        }
    }
}
