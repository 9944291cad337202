//! In-memory status page that records every call, for tests.

use super::{ApiError, Component, ComponentStatus, Incident, StatusApi};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    SetStatus(u64, ComponentStatus),
    CreateIncident(Incident),
    UpdateIncident(Incident),
    Metric(u64, i64),
}

pub struct FakeApi {
    pub component: Mutex<Component>,
    pub current_incident: Mutex<Option<Incident>>,
    pub calls: Mutex<Vec<ApiCall>>,
    pub fail_writes: AtomicBool,
    next_id: AtomicU64,
}

impl FakeApi {
    pub fn new(component_id: u64) -> Self {
        Self {
            component: Mutex::new(Component {
                id: component_id,
                name: format!("component-{}", component_id),
                enabled: true,
                status: ComponentStatus::Operational,
            }),
            current_incident: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            next_id: AtomicU64::new(100),
        }
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_updates(&self) -> Vec<ComponentStatus> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::SetStatus(_, s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<Incident> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::CreateIncident(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    pub fn updated(&self) -> Vec<Incident> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::UpdateIncident(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    pub fn metrics(&self) -> Vec<(u64, i64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Metric(id, v) => Some((id, v)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StatusApi for FakeApi {
    async fn ping(&self) -> Result<(), ApiError> {
        Ok(())
    }

    async fn get_component(&self, component_id: u64) -> Result<Component, ApiError> {
        let component = self.component.lock().unwrap().clone();
        if component.id != component_id {
            return Err(ApiError::Status {
                status: 404,
                body: "not found".to_string(),
            });
        }
        Ok(component)
    }

    async fn get_current_incident(&self, _component_id: u64) -> Result<Option<Incident>, ApiError> {
        Ok(self.current_incident.lock().unwrap().clone())
    }

    async fn set_component_status(
        &self,
        component_id: u64,
        status: ComponentStatus,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::SetStatus(component_id, status))?;
        self.component.lock().unwrap().status = status;
        Ok(())
    }

    async fn create_incident(&self, incident: &Incident) -> Result<u64, ApiError> {
        self.record(ApiCall::CreateIncident(incident.clone()))?;
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn update_incident(&self, incident: &Incident) -> Result<(), ApiError> {
        self.record(ApiCall::UpdateIncident(incident.clone()))
    }

    async fn send_metric_point(&self, metric_id: u64, value: i64) -> Result<(), ApiError> {
        self.record(ApiCall::Metric(metric_id, value))
    }
}
