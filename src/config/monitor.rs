//! Per-monitor configuration and its validation pass.

use super::defaults::DefaultConfig;
use crate::monitor::ThresholdConfig;
use crate::probe::{Probe, ProbeKind, ProbeSettings};
use crate::template::{self, MessageTemplate};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Metric ids receiving points every tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub response_time: Vec<u64>,
    pub availability: Vec<u64>,
    pub incident_count: Vec<u64>,
}

/// Local executables run on state changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellHookConfig {
    pub on_success: String,
    pub on_failure: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookTarget {
    pub url: String,
    pub content_type: String,
    pub investigating: MessageTemplate,
}

impl WebhookTarget {
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub on_critical: WebhookTarget,
    pub on_partial: WebhookTarget,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub investigating: MessageTemplate,
    pub fixed: MessageTemplate,
}

/// One entry of the `monitors` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub name: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: ProbeKind,
    pub enabled: bool,
    /// Verify TLS certificates (HTTP only).
    pub strict: bool,
    /// Seconds between ticks.
    pub interval: u64,
    /// Seconds a probe may take.
    pub timeout: u64,
    /// Re-pull remote state every this many ticks (0 disables).
    pub resync: u32,
    pub metric_id: u64,
    pub component_id: u64,
    pub metrics: MetricsConfig,
    pub shellhook: ShellHookConfig,
    pub webhook: WebhookConfig,
    pub template: TemplateConfig,
    pub history_size: usize,
    #[serde(flatten)]
    pub thresholds: ThresholdConfig,
    #[serde(flatten)]
    pub probe: ProbeSettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            target: String::new(),
            kind: ProbeKind::default(),
            enabled: true,
            strict: false,
            interval: 0,
            timeout: 0,
            resync: 0,
            metric_id: 0,
            component_id: 0,
            metrics: MetricsConfig::default(),
            shellhook: ShellHookConfig::default(),
            webhook: WebhookConfig::default(),
            template: TemplateConfig::default(),
            history_size: 0,
            thresholds: ThresholdConfig::default(),
            probe: ProbeSettings::default(),
        }
    }
}

fn fill(value: &mut String, fallback: impl Into<String>) {
    if value.is_empty() {
        *value = fallback.into();
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Apply `defaults` to unset fields and collect every problem found.
    ///
    /// A monitor with a non-empty error list must not be scheduled.
    pub fn validate(&mut self, defaults: &DefaultConfig) -> Vec<String> {
        let mut errs = Vec::new();

        if self.name.is_empty() {
            errs.push("Name is required".to_string());
        }

        if self.interval == 0 {
            self.interval = defaults.interval().as_secs();
        }
        if self.timeout == 0 {
            self.timeout = defaults.timeout().as_secs();
        }
        if self.timeout >= self.interval {
            errs.push(format!(
                "Timeout ({}s) must be lower than interval ({}s)",
                self.timeout, self.interval
            ));
        }

        if self.component_id == 0 && self.metric_id == 0 {
            errs.push("component_id & metric_id are unset".to_string());
        }

        if self.history_size == 0 {
            self.history_size = defaults.history_size();
        }

        if self.thresholds.critical == 0 {
            self.thresholds.critical = defaults.def_threshold_critical;
        }
        if self.thresholds.partial == 0 {
            self.thresholds.partial = defaults.def_threshold_partial;
        }
        self.thresholds.apply_defaults();

        if self.kind == ProbeKind::Http && self.probe.expected_status_code == 0 {
            self.probe.expected_status_code = defaults.expected_status_code();
        }

        let templates = &defaults.def_template;
        if self.template.investigating.is_empty() {
            self.template.investigating = templates
                .def_investigating
                .over(template::default_investigating());
        }
        if self.template.fixed.is_empty() {
            self.template.fixed = templates.def_fixed.over(template::default_fixed());
        }

        let investigating_message = self.template.investigating.message.clone();
        for (target, def) in [
            (&mut self.webhook.on_critical, &defaults.def_webhook.def_on_critical),
            (&mut self.webhook.on_partial, &defaults.def_webhook.def_on_partial),
        ] {
            fill(&mut target.content_type, def.content_type());
            fill(&mut target.url, def.def_url.clone());
            fill(&mut target.investigating.message, def.def_investigating.def_message.clone());
            fill(&mut target.investigating.message, investigating_message.clone());
        }

        for (label, tpl) in [
            ("fixed", &self.template.fixed),
            ("investigating", &self.template.investigating),
            ("on_critical webhook", &self.webhook.on_critical.investigating),
            ("on_partial webhook", &self.webhook.on_partial.investigating),
        ] {
            if let Err(e) = tpl.compile() {
                errs.push(format!("Could not compile \"{}\" template: {}", label, e));
            }
        }

        if let Err(e) = Probe::from_config(
            self.kind,
            &self.target,
            &self.probe,
            self.timeout(),
            self.strict,
        ) {
            errs.push(e.to_string());
        }

        errs
    }

    /// Feature summary logged when the monitor starts.
    pub fn describe(&self) -> Vec<String> {
        let mut features = vec![format!("Type: {}", self.kind)];

        if !self.name.is_empty() {
            features.push(format!("Name: {}", self.name));
        }
        if self.target.is_empty() {
            features.push("Target: <mock>".to_string());
        } else {
            features.push(format!("Target: {}", self.target));
        }
        features.push(format!(
            "Interval: {}s, timeout: {}s, history: {}",
            self.interval, self.timeout, self.history_size
        ));
        features.extend(self.thresholds.describe());
        features.push(format!(
            "Availability count metrics: {}",
            self.metrics.availability.len()
        ));
        features.push(format!(
            "Incident count metrics: {}",
            self.metrics.incident_count.len()
        ));
        features.push(format!(
            "Response time metrics: {}",
            self.metrics.response_time.len()
        ));
        if self.resync > 0 {
            features.push(format!("Resyncs cycle: {}", self.resync));
        }
        if !self.shellhook.on_success.is_empty() {
            features.push("Has a 'on_success' shellhook".to_string());
        }
        if !self.shellhook.on_failure.is_empty() {
            features.push("Has a 'on_failure' shellhook".to_string());
        }

        features
    }
}
