//! Incident and webhook message templates.
//!
//! Templates use `{{ .Key }}` placeholders that are substituted with plain
//! string replacement. Keys are validated once at configuration time.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Placeholder keys a template may reference.
pub const KNOWN_KEYS: &[&str] = &[
    "SystemName",
    "now",
    "FailReason",
    "Monitor.Name",
    "Monitor.Target",
    "Monitor.Type",
    "Monitor.ComponentID",
    "Monitor.MetricID",
    "Incident.ID",
    "Incident.Message",
];

/// Template error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder '{0}'")]
    UnknownKey(String),
    #[error("unterminated placeholder")]
    Unterminated,
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*\.?([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").unwrap())
}

fn check(text: &str) -> Result<(), TemplateError> {
    for caps in placeholder().captures_iter(text) {
        let key = &caps[1];
        if !KNOWN_KEYS.contains(&key) {
            return Err(TemplateError::UnknownKey(key.to_string()));
        }
    }

    // Anything left that opens a placeholder did not parse as one.
    if placeholder().replace_all(text, "").contains("{{") {
        return Err(TemplateError::Unterminated);
    }

    Ok(())
}

/// Values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateData(HashMap<String, String>);

impl TemplateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    fn render(&self, text: &str) -> String {
        placeholder()
            .replace_all(text, |caps: &Captures| self.get(&caps[1]).to_string())
            .into_owned()
    }
}

/// A subject/message pair rendered for incidents and webhooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

impl MessageTemplate {
    pub fn new(subject: &str, message: &str) -> Self {
        Self {
            subject: subject.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_empty() && self.message.is_empty()
    }

    pub fn compile(&self) -> Result<(), TemplateError> {
        check(&self.subject)?;
        check(&self.message)
    }

    /// Render both parts, returning `(subject, message)`.
    pub fn render(&self, data: &TemplateData) -> (String, String) {
        (data.render(&self.subject), data.render(&self.message))
    }

    pub fn render_message(&self, data: &TemplateData) -> String {
        data.render(&self.message)
    }
}

/// Built-in template used when an incident is opened.
pub fn default_investigating() -> MessageTemplate {
    MessageTemplate::new(
        "{{ .Monitor.Name }} - {{ .SystemName }}",
        "{{ .Monitor.Name }} check **failed** (server time: {{ .now }})\n\n{{ .FailReason }}",
    )
}

/// Built-in template used when an incident is resolved.
pub fn default_fixed() -> MessageTemplate {
    MessageTemplate::new(
        "{{ .Monitor.Name }} - {{ .SystemName }}",
        "**Resolved** - {{ .now }}\n\n- - -\n\n{{ .Incident.Message }}",
    )
}
