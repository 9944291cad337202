//! Process-wide defaults applied to every monitor during validation.

use crate::template::MessageTemplate;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S %b %-d %Z";
pub const DEFAULT_HISTORY_SIZE: usize = 10;
pub const DEFAULT_EXPECTED_STATUS_CODE: u16 = 200;
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultMessage {
    pub def_message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultWebhook {
    pub def_content_type: String,
    pub def_url: String,
    pub def_investigating: DefaultMessage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultWebhooks {
    pub def_on_critical: DefaultWebhook,
    pub def_on_partial: DefaultWebhook,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultTemplate {
    pub def_subject: String,
    pub def_message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultTemplates {
    pub def_investigating: DefaultTemplate,
    pub def_fixed: DefaultTemplate,
}

/// The `default_config` section. Zero or empty values mean "use the built-in default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultConfig {
    /// Seconds
    pub def_interval: u64,
    /// Seconds
    pub def_timeout: u64,
    pub def_history_size: usize,
    pub def_threshold_critical: u32,
    pub def_threshold_partial: u32,
    pub def_expected_status_code: u16,
    pub def_webhook: DefaultWebhooks,
    pub def_template: DefaultTemplates,
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

impl DefaultWebhook {
    pub fn content_type(&self) -> String {
        or_default(&self.def_content_type, DEFAULT_CONTENT_TYPE)
    }
}

impl DefaultTemplate {
    /// Overlay the configured default parts on `builtin`.
    pub fn over(&self, builtin: MessageTemplate) -> MessageTemplate {
        MessageTemplate {
            subject: or_default(&self.def_subject, &builtin.subject),
            message: or_default(&self.def_message, &builtin.message),
        }
    }
}

impl DefaultConfig {
    pub fn interval(&self) -> Duration {
        if self.def_interval == 0 {
            DEFAULT_INTERVAL
        } else {
            Duration::from_secs(self.def_interval)
        }
    }

    pub fn timeout(&self) -> Duration {
        if self.def_timeout == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_secs(self.def_timeout)
        }
    }

    pub fn history_size(&self) -> usize {
        if self.def_history_size == 0 {
            DEFAULT_HISTORY_SIZE
        } else {
            self.def_history_size
        }
    }

    pub fn expected_status_code(&self) -> u16 {
        if self.def_expected_status_code == 0 {
            DEFAULT_EXPECTED_STATUS_CODE
        } else {
            self.def_expected_status_code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults() {
        let defaults = DefaultConfig::default();
        assert_eq!(defaults.interval(), Duration::from_secs(60));
        assert_eq!(defaults.timeout(), Duration::from_secs(1));
        assert_eq!(defaults.history_size(), 10);
        assert_eq!(defaults.expected_status_code(), 200);
        assert_eq!(defaults.def_webhook.def_on_partial.content_type(), "text/plain");
    }

    #[test]
    fn test_configured_defaults_win() {
        let defaults: DefaultConfig = serde_json::from_str(
            r#"{
                "def_interval": 30,
                "def_history_size": 20,
                "def_template": { "def_fixed": { "def_subject": "fixed!" } }
            }"#,
        )
        .unwrap();

        assert_eq!(defaults.interval(), Duration::from_secs(30));
        assert_eq!(defaults.history_size(), 20);

        let fixed = defaults
            .def_template
            .def_fixed
            .over(MessageTemplate::new("builtin", "body"));
        assert_eq!(fixed, MessageTemplate::new("fixed!", "body"));
    }
}
