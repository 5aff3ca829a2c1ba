//! Security Validator
//!
//! Heuristic screening of outgoing query text and parameters, plus a
//! post-failure check that turns injection-shaped parser errors into
//! security events.
//!
//! These rules are a monitoring and defense-in-depth signal. They are not a
//! SQL parser and do not replace parameterized execution by the caller.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::QueryError;

/// Longest query text or parameter accepted.
pub const MAX_INPUT_LENGTH: usize = 10_000;

// == Rules ==
/// How a rule inspects its input.
#[derive(Debug, Clone)]
pub enum RuleKind {
    Pattern(Regex),
    MaxLength(usize),
}

/// One named heuristic. The validator checks rules in list order and reports
/// the first match.
#[derive(Debug, Clone)]
pub struct SecurityRule {
    pub name: String,
    pub kind: RuleKind,
    /// Whether string parameters are screened by this rule too
    pub applies_to_params: bool,
}

impl SecurityRule {
    pub fn pattern(
        name: impl Into<String>,
        pattern: &str,
        applies_to_params: bool,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            kind: RuleKind::Pattern(Regex::new(pattern)?),
            applies_to_params,
        })
    }

    pub fn max_length(name: impl Into<String>, limit: usize, applies_to_params: bool) -> Self {
        Self {
            name: name.into(),
            kind: RuleKind::MaxLength(limit),
            applies_to_params,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.kind {
            RuleKind::Pattern(regex) => regex.is_match(text),
            RuleKind::MaxLength(limit) => text.chars().count() > *limit,
        }
    }
}

static DEFAULT_RULES: LazyLock<Vec<SecurityRule>> = LazyLock::new(|| {
    let patterns: [(&str, &str, bool); 6] = [
        (
            "statement_chaining",
            r"(?i);\s*(drop|delete|insert|update|alter|create|truncate|exec|execute|grant|revoke|shutdown)\b",
            true,
        ),
        ("union_select", r"(?i)\bunion\b(\s+all)?\s+select\b", true),
        (
            "tautology",
            r"(?i)\bor\s+('[^']*'|\d+)\s*=\s*('[^']*'|\d+)|\bor\s+true\b",
            true,
        ),
        ("inline_comment", r"--|/\*", false),
        (
            "dangerous_procedure",
            r"(?i)\b(xp_cmdshell|xp_regread|xp_dirtree|sp_executesql|sp_oacreate|sp_configure)\b|\b(pg_sleep|pg_read_file|load_file|benchmark)\s*\(|\bwaitfor\s+delay\b|\binto\s+(out|dump)file\b",
            true,
        ),
        ("unsafe_interpolation", r"\$\{[^}]*\}|\{\{[^}]*\}\}", false),
    ];

    let mut rules = vec![SecurityRule::max_length("oversized_input", MAX_INPUT_LENGTH, true)];
    rules.extend(patterns.into_iter().map(|(name, pattern, params)| {
        SecurityRule::pattern(name, pattern, params).expect("built-in security pattern compiles")
    }));
    rules
});

/// Parser-error phrases typical of a query broken by injected quotes.
const INJECTION_ERROR_PHRASES: &[&str] = &[
    "unclosed quotation mark",
    "unterminated quoted string",
    "quoted string not properly terminated",
    "you have an error in your sql syntax",
    "syntax error at or near",
    "incorrect syntax near",
    "unrecognized token",
];

static SUSPICIOUS_STRUCTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)'\s*(or|and)\s|'\s*(--|#|/\*)|;\s*\S").expect("structure pattern compiles")
});

// == Security Events ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A record handed to the security-monitoring sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: Severity,
    pub details: Value,
}

/// Receives security events. Emission must not block or fail the caller.
pub trait SecurityEventSink: Send + Sync {
    fn emit(&self, event: SecurityEvent);
}

/// Default sink: logs each event on the `security` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSecurityEvents;

impl SecurityEventSink for TracingSecurityEvents {
    fn emit(&self, event: SecurityEvent) {
        warn!(
            target: "security",
            event_type = %event.event_type,
            severity = ?event.severity,
            details = %event.details,
            "Security event"
        );
    }
}

// == Validator ==
/// Stateless screen applied before execution and after failures.
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    rules: Vec<SecurityRule>,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl SecurityValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the rule list entirely.
    pub fn with_rules(rules: Vec<SecurityRule>) -> Self {
        Self { rules }
    }

    /// Appends a rule after the built-in ones.
    pub fn add_rule(&mut self, rule: SecurityRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    // == Validate ==
    /// Screens query text against every rule and parameters against the
    /// rules marked for them. Returns the first matching rule as an error.
    pub fn validate(&self, query: &str, params: &[Value]) -> Result<(), QueryError> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(query)) {
            return Err(QueryError::Validation {
                rule: rule.name.clone(),
            });
        }

        for param in params {
            let text: Cow<'_, str> = match param {
                Value::String(s) => Cow::Borrowed(s),
                Value::Null | Value::Bool(_) | Value::Number(_) => continue,
                other => Cow::Owned(other.to_string()),
            };
            if let Some(rule) = self
                .rules
                .iter()
                .filter(|rule| rule.applies_to_params)
                .find(|rule| rule.matches(&text))
            {
                return Err(QueryError::Validation {
                    rule: rule.name.clone(),
                });
            }
        }
        Ok(())
    }

    // == Assess Failure ==
    /// Decides whether a failed execution looks injection-driven.
    ///
    /// Requires an injection-shaped parser error; a suspicious query
    /// structure raises the severity. Never affects control flow.
    pub fn assess_failure(
        &self,
        query: &str,
        query_hash: &str,
        error_message: &str,
    ) -> Option<SecurityEvent> {
        let message = error_message.to_lowercase();
        let phrase = INJECTION_ERROR_PHRASES
            .iter()
            .find(|phrase| message.contains(*phrase))?;
        let structural = SUSPICIOUS_STRUCTURE.is_match(query);

        Some(SecurityEvent {
            event_type: "possible_sql_injection".to_string(),
            severity: if structural {
                Severity::High
            } else {
                Severity::Medium
            },
            details: json!({
                "query_hash": query_hash,
                "error_pattern": phrase,
                "suspicious_structure": structural,
            }),
        })
    }
}
