//! Status-page domain types and the API seam shared by every monitor.
//!
//! Monitors never talk HTTP to the status page directly; they go through
//! [`StatusApi`], which the [`CachetClient`] implements for Cachet's v1 REST
//! API. One client instance is shared by all monitor tasks.

mod client;
#[cfg(test)]
pub mod fake;

pub use client::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status API error types.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("incident has not been created yet")]
    MissingIncidentId,
}

/// Health code of a status-page component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ComponentStatus {
    Operational = 1,
    /// Only ever read back from the status page; monitors never send it.
    Investigating = 2,
    PartialOutage = 3,
    MajorOutage = 4,
}

impl TryFrom<i64> for ComponentStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Operational),
            2 => Ok(Self::Investigating),
            3 => Ok(Self::PartialOutage),
            4 => Ok(Self::MajorOutage),
            other => Err(format!("unknown component status {}", other)),
        }
    }
}

impl From<ComponentStatus> for i64 {
    fn from(status: ComponentStatus) -> Self {
        status as i64
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentStatus::Operational => write!(f, "operational"),
            ComponentStatus::Investigating => write!(f, "investigating"),
            ComponentStatus::PartialOutage => write!(f, "partial outage"),
            ComponentStatus::MajorOutage => write!(f, "major outage"),
        }
    }
}

/// Lifecycle code of an incident on the status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum IncidentStatus {
    Investigating = 1,
    Identified = 2,
    Watching = 3,
    Fixed = 4,
}

impl TryFrom<i64> for IncidentStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Investigating),
            2 => Ok(Self::Identified),
            3 => Ok(Self::Watching),
            4 => Ok(Self::Fixed),
            other => Err(format!("unknown incident status {}", other)),
        }
    }
}

impl From<IncidentStatus> for i64 {
    fn from(status: IncidentStatus) -> Self {
        status as i64
    }
}

/// A status-page component as seen by a monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub id: u64,
    pub name: String,
    pub enabled: bool,
    pub status: ComponentStatus,
}

/// An incident tied to one component.
///
/// `id` stays `None` until the status page has accepted the creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub id: Option<u64>,
    pub name: String,
    pub message: String,
    pub status: IncidentStatus,
    pub component_id: u64,
    pub component_status: ComponentStatus,
    pub notify: bool,
    pub visible: bool,
}

impl Incident {
    pub fn new(
        name: String,
        message: String,
        component_id: u64,
        component_status: ComponentStatus,
    ) -> Self {
        Self {
            id: None,
            name,
            message,
            status: IncidentStatus::Investigating,
            component_id,
            component_status,
            notify: true,
            visible: true,
        }
    }

    pub fn set_investigating(&mut self) {
        self.status = IncidentStatus::Investigating;
    }

    /// Mark the incident resolved; the component goes back to operational with it.
    pub fn set_fixed(&mut self) {
        self.status = IncidentStatus::Fixed;
        self.component_status = ComponentStatus::Operational;
    }

    pub fn is_open(&self) -> bool {
        self.status != IncidentStatus::Fixed
    }
}

/// Operations the monitors need from the status page.
///
/// Implementations must be safe to share between all monitor tasks.
#[async_trait]
pub trait StatusApi: Send + Sync {
    /// Connectivity check used once at startup.
    async fn ping(&self) -> Result<(), ApiError>;

    async fn get_component(&self, component_id: u64) -> Result<Component, ApiError>;

    /// The most recent incident of the component that is not fixed yet.
    async fn get_current_incident(&self, component_id: u64) -> Result<Option<Incident>, ApiError>;

    async fn set_component_status(
        &self,
        component_id: u64,
        status: ComponentStatus,
    ) -> Result<(), ApiError>;

    /// Create the incident and return the id assigned by the status page.
    async fn create_incident(&self, incident: &Incident) -> Result<u64, ApiError>;

    async fn update_incident(&self, incident: &Incident) -> Result<(), ApiError>;

    async fn send_metric_point(&self, metric_id: u64, value: i64) -> Result<(), ApiError>;
}
