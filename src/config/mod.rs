//! Configuration module.
//!
//! Loads the monitor configuration from a file or URL (JSON, or YAML for
//! `.yaml`/`.yml` sources) and applies environment overrides.

mod defaults;
mod monitor;

pub use defaults::*;
pub use monitor::*;

use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to open file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to download configuration: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("unable to parse configuration: {0}")]
    Parse(String),
}

/// Status API connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub token: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub system_name: String,
    /// chrono strftime format used for `{{ .now }}`.
    pub date_format: String,
    pub api: ApiConfig,
    #[serde(rename = "default_config")]
    pub defaults: DefaultConfig,
    /// Decoded entry by entry in [`Config::parse`].
    #[serde(skip)]
    pub monitors: Vec<MonitorConfig>,
    /// Entries of `monitors` that could not be decoded, by index.
    #[serde(skip)]
    pub rejected: BTreeMap<usize, String>,
    /// Limit on in-flight background jobs; 0 means unbounded.
    pub max_background_tasks: usize,
    /// Tick once as soon as a monitor starts. Set from the command line.
    #[serde(skip)]
    pub immediate: bool,
}

/// Outcome of [`Config::validate`].
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Problems that prevent starting at all.
    pub global: Vec<String>,
    /// Problems per monitor index; those monitors are not scheduled.
    pub monitors: BTreeMap<usize, Vec<String>>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.global.is_empty() && self.monitors.is_empty()
    }

    pub fn is_excluded(&self, index: usize) -> bool {
        self.monitors.contains_key(&index)
    }
}

fn is_url(source: &str) -> bool {
    reqwest::Url::parse(source)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn is_yaml(source: &str) -> bool {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    path.ends_with(".yaml") || path.ends_with(".yml")
}

/// Best effort name of this machine.
fn hostname() -> String {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Decode one `monitors` entry. The `type` discriminator is case-insensitive.
fn decode_monitor(mut entry: Value) -> Result<MonitorConfig, String> {
    if let Some(Value::String(kind)) = entry.get_mut("type") {
        *kind = kind.to_lowercase();
    }
    serde_json::from_value(entry).map_err(|e| e.to_string())
}

impl Config {
    /// Load configuration from a path or an `http(s)://` URL.
    pub async fn load(source: &str) -> Result<Self, ConfigError> {
        let data = if is_url(source) {
            let data = reqwest::get(source).await?.error_for_status()?.text().await?;
            tracing::info!("Downloaded network configuration");
            data
        } else {
            std::fs::read_to_string(source).map_err(|e| ConfigError::Read {
                path: source.to_string(),
                source: e,
            })?
        };

        Self::parse(&data, is_yaml(source))
    }

    /// Decode a configuration document.
    ///
    /// A broken monitor entry does not fail the whole document; it is kept
    /// in [`Config::rejected`] and reported by [`Config::validate`].
    pub fn parse(data: &str, yaml: bool) -> Result<Self, ConfigError> {
        let mut doc: Value = if yaml {
            serde_yaml::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            serde_json::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        if doc.is_null() {
            doc = Value::Object(Default::default());
        }

        let entries = match doc.as_object_mut().and_then(|o| o.remove("monitors")) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(ConfigError::Parse("monitors must be a list".to_string())),
        };

        let mut cfg: Config =
            serde_json::from_value(doc).map_err(|e| ConfigError::Parse(e.to_string()))?;

        for (index, entry) in entries.into_iter().enumerate() {
            match decode_monitor(entry) {
                Ok(monitor) => cfg.monitors.push(monitor),
                Err(e) => {
                    tracing::error!("Unable to decode monitor #{}: {}", index, e);
                    cfg.monitors.push(MonitorConfig::default());
                    cfg.rejected.insert(index, e);
                }
            }
        }

        Ok(cfg)
    }

    /// Apply `CACHET_API` and `CACHET_TOKEN` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(env::var("CACHET_API").ok(), env::var("CACHET_TOKEN").ok());
    }

    fn apply_overrides(&mut self, url: Option<String>, token: Option<String>) {
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            self.api.url = url;
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.api.token = token;
        }
    }

    /// Fill defaults and validate the configuration and every monitor.
    pub fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.system_name.is_empty() {
            self.system_name = hostname();
        }

        if self.date_format.is_empty() {
            self.date_format = DEFAULT_TIME_FORMAT.to_string();
        } else if StrftimeItems::new(&self.date_format).any(|i| matches!(i, Item::Error)) {
            report
                .global
                .push(format!("Invalid date_format: {}", self.date_format));
        }

        if self.api.url.is_empty() || self.api.token.is_empty() {
            report.global.push("API URL or API Token missing".to_string());
        }

        if self.monitors.is_empty() {
            report.global.push("No monitors defined".to_string());
        }

        for (index, monitor) in self.monitors.iter_mut().enumerate() {
            if let Some(e) = self.rejected.get(&index) {
                report
                    .monitors
                    .insert(index, vec![format!("Invalid monitor: {}", e)]);
                continue;
            }

            let errs = monitor.validate(&self.defaults);
            if !errs.is_empty() {
                report.monitors.insert(index, errs);
            }
        }

        if !self.monitors.is_empty() && report.monitors.len() == self.monitors.len() {
            report.global.push("No valid monitors".to_string());
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeKind;
    use std::io::Write;

    const JSON: &str = r#"{
        "api": { "url": "https://status.example.com/api/v1", "token": "secret" },
        "system_name": "edge-1",
        "default_config": { "def_interval": 30 },
        "monitors": [
            { "name": "site", "target": "https://example.com", "component_id": 1 },
            { "name": "broken", "target": "https://example.com", "interval": 5, "timeout": 10, "component_id": 2 }
        ]
    }"#;

    const YAML: &str = r#"
api:
  url: https://status.example.com/api/v1
  token: secret
date_format: "%Y-%m-%d"
max_background_tasks: 32
monitors:
  - name: resolver
    type: dns
    target: 9.9.9.9
    component_id: 4
    threshold_partial: 20
    answers:
      - exact: 93.184.216.34
"#;

    #[test]
    fn test_parse_json_and_validate() {
        let mut cfg = Config::parse(JSON, false).unwrap();
        let report = cfg.validate();

        assert!(report.global.is_empty(), "{:?}", report.global);
        assert!(!report.is_valid());
        assert!(!report.is_excluded(0));
        assert!(report.is_excluded(1));
        assert_eq!(cfg.monitors[0].interval, 30);
        assert_eq!(cfg.date_format, DEFAULT_TIME_FORMAT);
        assert_eq!(cfg.system_name, "edge-1");
    }

    #[test]
    fn test_parse_yaml() {
        let mut cfg = Config::parse(YAML, true).unwrap();
        assert_eq!(cfg.max_background_tasks, 32);
        assert_eq!(cfg.monitors[0].kind, ProbeKind::Dns);
        assert_eq!(cfg.monitors[0].probe.answers.len(), 1);
        assert_eq!(cfg.monitors[0].thresholds.partial, 20);

        let report = cfg.validate();
        assert!(report.is_valid(), "{:?}", report);
        assert!(!cfg.system_name.is_empty());
    }

    #[test]
    fn test_broken_monitor_entries_are_excluded() {
        let data = r#"{
            "api": { "url": "https://status.example.com/api/v1", "token": "secret" },
            "monitors": [
                { "name": "site", "type": "HTTP", "target": "https://example.com", "component_id": 1 },
                { "name": "pinger", "type": "icmp", "target": "10.0.0.1", "component_id": 2 },
                { "name": "slow", "target": "https://example.com", "interval": "soon", "component_id": 3 },
                "not a monitor"
            ]
        }"#;

        let mut cfg = Config::parse(data, false).unwrap();
        assert_eq!(cfg.monitors.len(), 4);
        assert_eq!(cfg.monitors[0].kind, ProbeKind::Http);

        let report = cfg.validate();
        assert!(report.global.is_empty(), "{:?}", report.global);
        assert!(!report.is_excluded(0));
        for index in 1..4 {
            assert!(report.is_excluded(index), "monitor #{}", index);
        }
        assert!(report.monitors[&1][0].contains("icmp"));
    }

    #[test]
    fn test_only_broken_monitors_is_fatal() {
        let yaml = r#"
api:
  url: https://status.example.com/api/v1
  token: secret
monitors:
  - name: a
    type: ping
"#;
        let mut cfg = Config::parse(yaml, true).unwrap();
        let report = cfg.validate();
        assert_eq!(report.global, vec!["No valid monitors".to_string()]);
    }

    #[test]
    fn test_missing_api_and_monitors_are_global_errors() {
        let mut cfg = Config::parse("{}", false).unwrap();
        let report = cfg.validate();
        assert_eq!(report.global.len(), 2);
    }

    #[test]
    fn test_invalid_date_format() {
        let mut cfg = Config::parse(JSON, false).unwrap();
        cfg.date_format = "%Q".to_string();
        let report = cfg.validate();
        assert!(report.global.iter().any(|e| e.starts_with("Invalid date_format")));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::parse(JSON, false).unwrap();
        cfg.apply_overrides(Some("https://other/api/v1".to_string()), Some(String::new()));
        assert_eq!(cfg.api.url, "https://other/api/v1");
        assert_eq!(cfg.api.token, "secret");
    }

    #[test]
    fn test_source_detection() {
        assert!(is_url("https://config.example.com/monitor.yml"));
        assert!(!is_url("/etc/cachet-monitor.json"));
        assert!(is_yaml("https://config.example.com/monitor.yml?rev=2"));
        assert!(is_yaml("monitor.yaml"));
        assert!(!is_yaml("monitor.json"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let cfg = tokio_test::assert_ok!(Config::load(file.path().to_str().unwrap()).await);
        assert_eq!(cfg.monitors[0].name, "resolver");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = Config::load("/nonexistent/cachet-monitor.json").await;
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
