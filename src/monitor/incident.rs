//! Incident lifecycle: open on breach, resolve on recovery, keep the remote
//! component status in step with the local decision.
//!
//! Sends to the status page are best effort. A failed call is logged and the
//! local state still moves forward; nothing is retried.

use super::{Classification, Monitor};
use crate::cachet::{ComponentStatus, Incident};

/// What [`Monitor::reconcile`] did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened(Classification),
    Resolved,
    /// No incident was open but the component was not operational.
    Reset,
    Unchanged,
}

fn outage_status(classification: Classification) -> ComponentStatus {
    match classification {
        Classification::Major => ComponentStatus::MajorOutage,
        Classification::Partial => ComponentStatus::PartialOutage,
        Classification::Normal => ComponentStatus::Operational,
    }
}

impl Monitor {
    pub(super) async fn reconcile(&mut self, classification: Classification) -> Transition {
        if classification.is_breach() {
            let opened = self.incident.is_none();
            if opened {
                self.open_incident(classification).await;
            }
            self.set_status(outage_status(classification)).await;

            return if opened {
                Transition::Opened(classification)
            } else {
                Transition::Unchanged
            };
        }

        if self.incident.is_some() {
            self.resolve_incident().await;
            return Transition::Resolved;
        }

        if self.status != ComponentStatus::Operational {
            tracing::info!(
                "Component is {} without an open incident, resetting to operational",
                self.status
            );
            self.set_status(ComponentStatus::Operational).await;
            self.last_fail_reason.clear();
            return Transition::Reset;
        }

        Transition::Unchanged
    }

    async fn open_incident(&mut self, classification: Classification) {
        let status = outage_status(classification);
        let (subject, message) = self
            .config
            .template
            .investigating
            .render(&self.template_data());

        let mut incident = Incident::new(subject, message, self.config.component_id, status);
        incident.set_investigating();

        tracing::warn!("Creating incident ({}): {}", classification, incident.name);
        match self.ctx.api.create_incident(&incident).await {
            Ok(id) => {
                tracing::info!("Created incident ID: {}", id);
                incident.id = Some(id);
            }
            Err(e) => tracing::error!("Error sending incident: {}", e),
        }

        self.incident = Some(incident);
    }

    async fn resolve_incident(&mut self) {
        let Some(mut incident) = self.incident.take() else {
            return;
        };

        let data = self
            .template_data()
            .with(
                "Incident.ID",
                incident.id.map(|id| id.to_string()).unwrap_or_default(),
            )
            .with("Incident.Message", incident.message.clone());
        let (subject, message) = self.config.template.fixed.render(&data);

        incident.name = subject;
        incident.message = message;
        incident.set_fixed();

        tracing::info!("Resolving incident {:?}", incident.id);
        if let Err(e) = self.ctx.api.update_incident(&incident).await {
            tracing::error!("Error updating incident: {}", e);
        }

        self.last_fail_reason.clear();
        self.status = ComponentStatus::Operational;
    }

    /// Push `status` to the status page unless it is already the local status.
    async fn set_status(&mut self, status: ComponentStatus) {
        if self.status == status {
            return;
        }

        tracing::info!("Setting component status to {}", status);
        if let Err(e) = self
            .ctx
            .api
            .set_component_status(self.config.component_id, status)
            .await
        {
            tracing::error!("Error updating component status: {}", e);
        }
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cachet::fake::FakeApi;
    use crate::cachet::IncidentStatus;
    use crate::monitor::tests::{context, mock_config};
    use crate::monitor::ThresholdConfig;
    use std::sync::Arc;

    fn monitor(api: &Arc<FakeApi>) -> Monitor {
        let config = mock_config(vec![true], 5, ThresholdConfig::default());
        Monitor::new(config, context(api.clone(), false)).unwrap()
    }

    #[tokio::test]
    async fn test_transitions() {
        let api = Arc::new(FakeApi::new(7));
        let mut m = monitor(&api);

        assert_eq!(m.reconcile(Classification::Normal).await, Transition::Unchanged);
        assert_eq!(
            m.reconcile(Classification::Partial).await,
            Transition::Opened(Classification::Partial)
        );
        // Escalation keeps the incident and only moves the component status.
        assert_eq!(m.reconcile(Classification::Major).await, Transition::Unchanged);
        assert_eq!(m.reconcile(Classification::Normal).await, Transition::Resolved);
        assert_eq!(m.reconcile(Classification::Normal).await, Transition::Unchanged);

        assert_eq!(api.created().len(), 1);
        assert_eq!(
            api.status_updates(),
            vec![ComponentStatus::PartialOutage, ComponentStatus::MajorOutage]
        );
        assert_eq!(api.updated()[0].status, IncidentStatus::Fixed);
    }

    #[tokio::test]
    async fn test_remote_investigating_is_reset() {
        let api = Arc::new(FakeApi::new(7));
        let mut m = monitor(&api);
        m.status = ComponentStatus::Investigating;

        assert_eq!(m.reconcile(Classification::Normal).await, Transition::Reset);
        assert_eq!(m.reconcile(Classification::Major).await, Transition::Opened(Classification::Major));
        assert!(!api.status_updates().contains(&ComponentStatus::Investigating));
        assert_eq!(
            api.status_updates(),
            vec![ComponentStatus::Operational, ComponentStatus::MajorOutage]
        );
    }

    #[tokio::test]
    async fn test_fixed_template_sees_incident() {
        let api = Arc::new(FakeApi::new(7));
        let mut m = monitor(&api);
        m.config.template.fixed = crate::template::MessageTemplate::new(
            "fixed #{{ .Incident.ID }}",
            "was: {{ .Incident.Message }}",
        );
        m.last_fail_reason = "timeout".to_string();

        m.reconcile(Classification::Major).await;
        let opened = m.incident().unwrap().message.clone();
        m.reconcile(Classification::Normal).await;

        let fixed = &api.updated()[0];
        assert_eq!(fixed.name, "fixed #100");
        assert_eq!(fixed.message, format!("was: {}", opened));
        assert_eq!(fixed.component_status, ComponentStatus::Operational);
    }
}
