//! Monitor execution engine.
//!
//! A [`Monitor`] owns its history window and at most one open incident, and
//! drives one scheduling loop: probe, record, classify, reconcile the
//! incident with the status page, notify. Each monitor runs as its own task;
//! the only shared piece is the [`MonitorContext`].

mod background;
mod history;
mod incident;
mod notify;
mod threshold;

pub use background::*;
pub use history::*;
pub use incident::Transition;
pub use threshold::*;

use crate::cachet::{ComponentStatus, Incident, StatusApi};
use crate::config::{Config, MonitorConfig};
use crate::probe::{Probe, ProbeError};
use crate::template::TemplateData;

use chrono::Local;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Monitor initialisation error types.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("component_id is not set")]
    MissingComponent,
    #[error("unable to load component {id}: {source}")]
    Api {
        id: u64,
        source: crate::cachet::ApiError,
    },
}

/// State shared by every monitor task.
pub struct MonitorContext {
    pub api: Arc<dyn StatusApi>,
    /// Client used for webhooks.
    pub http: reqwest::Client,
    pub background: BackgroundTasks,
    pub system_name: String,
    pub date_format: String,
    pub immediate: bool,
}

impl MonitorContext {
    pub fn new(config: &Config, api: Arc<dyn StatusApi>) -> Self {
        Self {
            api,
            http: reqwest::Client::new(),
            background: BackgroundTasks::new(config.max_background_tasks),
            system_name: config.system_name.clone(),
            date_format: config.date_format.clone(),
            immediate: config.immediate,
        }
    }
}

/// One monitored target.
pub struct Monitor {
    config: MonitorConfig,
    ctx: Arc<MonitorContext>,
    probe: Probe,
    history: HistoryWindow,
    enabled: bool,
    /// Mirror of the remote component status.
    status: ComponentStatus,
    incident: Option<Incident>,
    last_fail_reason: String,
    resync_mod: u32,
}

impl Monitor {
    /// Build a monitor from a configuration that passed validation.
    pub fn new(config: MonitorConfig, ctx: Arc<MonitorContext>) -> Result<Self, ProbeError> {
        let probe = Probe::from_config(
            config.kind,
            &config.target,
            &config.probe,
            config.timeout(),
            config.strict,
        )?;

        Ok(Self {
            history: HistoryWindow::new(config.history_size),
            enabled: config.enabled,
            config,
            ctx,
            probe,
            status: ComponentStatus::Operational,
            incident: None,
            last_fail_reason: String::new(),
            resync_mod: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn status(&self) -> ComponentStatus {
        self.status
    }

    pub fn incident(&self) -> Option<&Incident> {
        self.incident.as_ref()
    }

    pub fn last_fail_reason(&self) -> &str {
        &self.last_fail_reason
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    /// Pull the authoritative component state and seed the history.
    ///
    /// On error the monitor must not be started; other monitors are unaffected.
    pub async fn init(&mut self) -> Result<(), InitError> {
        if self.config.component_id == 0 {
            return Err(InitError::MissingComponent);
        }

        self.reload().await.map_err(|source| InitError::Api {
            id: self.config.component_id,
            source,
        })?;

        self.history
            .record(self.status == ComponentStatus::Operational);
        Ok(())
    }

    /// Overwrite local status, enablement and incident with the remote state.
    async fn reload(&mut self) -> Result<(), crate::cachet::ApiError> {
        let id = self.config.component_id;
        let component = self.ctx.api.get_component(id).await?;
        let incident = self.ctx.api.get_current_incident(id).await?;

        tracing::info!(
            "Component {} ({}): enabled={}, status={}",
            component.id,
            component.name,
            component.enabled,
            component.status
        );
        match &incident {
            Some(i) => tracing::info!("Current incident ID: {:?}", i.id),
            None => tracing::info!("No current incident"),
        }

        self.status = component.status;
        self.enabled = component.enabled;
        self.incident = incident;
        Ok(())
    }

    /// Tick until `stop` is cancelled. The monitor is handed back afterwards.
    pub async fn run(mut self, stop: CancellationToken) -> Self {
        if self.ctx.immediate && !stop.is_cancelled() {
            self.tick().await;
        }

        let period = self.config.interval();
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        tracing::info!("Monitor stopped");
        self
    }

    /// One probe-evaluate-dispatch cycle.
    pub async fn tick(&mut self) {
        if self.enabled {
            self.check().await;
        } else {
            tracing::info!("Monitor is disabled");
        }

        // Disabled monitors keep resyncing so they can be re-enabled remotely.
        if self.config.resync > 0 {
            self.resync_mod = (self.resync_mod + 1) % self.config.resync;
            if self.resync_mod == 0 {
                tracing::debug!("Reloading component's data");
                if let Err(e) = self.reload().await {
                    tracing::warn!("Resync failed, keeping local state: {}", e);
                }
            } else {
                tracing::debug!("Resync progress: {}/{}", self.resync_mod, self.config.resync);
            }
        }
    }

    async fn check(&mut self) {
        let started = Instant::now();
        let outcome = self.probe.test().await;
        let lag = if outcome.up {
            started.elapsed().as_millis() as i64
        } else {
            0
        };

        if !outcome.up {
            tracing::debug!("Check failed: {}", outcome.reason);
            self.last_fail_reason = outcome.reason.clone();
        }

        if self.history.len() + 1 == self.history.capacity() {
            tracing::debug!("History saturated, monitor is now fully operational");
        }
        self.history.record(outcome.up);

        self.analyse().await;

        if !outcome.up {
            self.trigger_shellhook(notify::HookType::OnFailure, outcome.reason);
        }

        let mut response_time = self.config.metrics.response_time.clone();
        if self.config.metric_id > 0 {
            response_time.push(self.config.metric_id);
        }
        self.send_metrics("response time", response_time, lag);
    }

    /// Classify the window and drive the incident lifecycle.
    async fn analyse(&mut self) {
        let down = self.history.down_count();
        if down == 0 {
            tracing::debug!("Monitor is fully up");
            self.send_metrics("availability", self.config.metrics.availability.clone(), 1);
        }

        let Some(classification) = evaluate(&self.history, &self.config.thresholds) else {
            tracing::debug!(
                "History not yet saturated ({}/{})",
                self.history.len(),
                self.history.capacity()
            );
            return;
        };

        if down > 0 {
            tracing::info!(
                "Monitor down (down count={}, percentage={:.2}%): {}",
                down,
                self.history.down_rate(),
                classification
            );
        }

        if classification.is_breach() {
            self.send_metrics("incident count", self.config.metrics.incident_count.clone(), 1);
        }

        match self.reconcile(classification).await {
            Transition::Opened(c) => self.trigger_webhook(c),
            Transition::Resolved => {
                self.trigger_shellhook(notify::HookType::OnSuccess, String::new())
            }
            Transition::Reset | Transition::Unchanged => {}
        }
    }

    fn template_data(&self) -> TemplateData {
        TemplateData::new()
            .with("SystemName", self.ctx.system_name.clone())
            .with(
                "now",
                Local::now().format(&self.ctx.date_format).to_string(),
            )
            .with("FailReason", self.last_fail_reason.clone())
            .with("Monitor.Name", self.config.name.clone())
            .with("Monitor.Target", self.config.target.clone())
            .with("Monitor.Type", self.config.kind.to_string())
            .with("Monitor.ComponentID", self.config.component_id.to_string())
            .with("Monitor.MetricID", self.config.metric_id.to_string())
    }
}
