//! Cachet v1 REST API client.

use super::{ApiError, Component, ComponentStatus, Incident, IncidentStatus, StatusApi};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::time::Duration;

const TOKEN_HEADER: &str = "X-Cachet-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Every Cachet response wraps its payload in a `data` field.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    #[serde(deserialize_with = "code")]
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(deserialize_with = "code")]
    status: i64,
}

#[derive(Debug, Deserialize)]
struct RawIncident {
    #[serde(deserialize_with = "code")]
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
    #[serde(deserialize_with = "code")]
    status: i64,
    #[serde(default, deserialize_with = "code")]
    component_id: i64,
    #[serde(default = "enabled_by_default")]
    visible: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Cachet versions disagree on whether numeric fields are numbers or strings.
fn code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Int(i64),
        Str(String),
    }

    match Code::deserialize(deserializer)? {
        Code::Int(n) => Ok(n),
        Code::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl RawComponent {
    fn into_component(self) -> Result<Component, ApiError> {
        Ok(Component {
            id: self.id as u64,
            name: self.name,
            enabled: self.enabled,
            status: ComponentStatus::try_from(self.status).map_err(ApiError::Decode)?,
        })
    }
}

impl RawIncident {
    /// Incidents created by other tools may carry no component status; the
    /// component's own status is used instead.
    fn into_incident(self, component_status: ComponentStatus) -> Result<Incident, ApiError> {
        Ok(Incident {
            id: Some(self.id as u64),
            name: self.name,
            message: self.message,
            status: IncidentStatus::try_from(self.status).map_err(ApiError::Decode)?,
            component_id: self.component_id as u64,
            component_status,
            notify: false,
            visible: self.visible,
        })
    }
}

/// HTTP client for a Cachet status page.
pub struct CachetClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl CachetClient {
    /// Create a client for the API rooted at `url` (e.g. `https://status.example.com/api/v1`).
    ///
    /// `insecure` disables TLS certificate verification.
    pub fn new(url: &str, token: &str, insecure: bool) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(insecure)
            .build()?;

        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let mut request = self
            .http
            .request(method, self.endpoint(path))
            .header(TOKEN_HEADER, &self.token);

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }
}

fn incident_body(incident: &Incident) -> Value {
    json!({
        "name": incident.name,
        "message": incident.message,
        "status": i64::from(incident.status),
        "visible": if incident.visible { 1 } else { 0 },
        "component_id": incident.component_id,
        "component_status": i64::from(incident.component_status),
        "notify": incident.notify,
    })
}

#[async_trait]
impl StatusApi for CachetClient {
    async fn ping(&self) -> Result<(), ApiError> {
        let pong: String = self.request(Method::GET, "ping", None).await?;
        tracing::debug!("Status API answered ping: {}", pong);
        Ok(())
    }

    async fn get_component(&self, component_id: u64) -> Result<Component, ApiError> {
        let raw: RawComponent = self
            .request(Method::GET, &format!("components/{}", component_id), None)
            .await?;
        raw.into_component()
    }

    async fn get_current_incident(&self, component_id: u64) -> Result<Option<Incident>, ApiError> {
        let raw: Vec<RawIncident> = self
            .request(
                Method::GET,
                &format!(
                    "incidents?component_id={}&sort=id&order=desc&per_page=50",
                    component_id
                ),
                None,
            )
            .await?;

        let open = raw.into_iter().find(|i| {
            i.component_id as u64 == component_id && i.status != IncidentStatus::Fixed as i64
        });

        match open {
            Some(raw) => {
                let component = self.get_component(component_id).await?;
                raw.into_incident(component.status).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn set_component_status(
        &self,
        component_id: u64,
        status: ComponentStatus,
    ) -> Result<(), ApiError> {
        let _: Value = self
            .request(
                Method::PUT,
                &format!("components/{}", component_id),
                Some(json!({ "status": i64::from(status) })),
            )
            .await?;
        Ok(())
    }

    async fn create_incident(&self, incident: &Incident) -> Result<u64, ApiError> {
        let raw: RawIncident = self
            .request(Method::POST, "incidents", Some(incident_body(incident)))
            .await?;
        Ok(raw.id as u64)
    }

    async fn update_incident(&self, incident: &Incident) -> Result<(), ApiError> {
        let id = incident.id.ok_or(ApiError::MissingIncidentId)?;
        let _: Value = self
            .request(
                Method::PUT,
                &format!("incidents/{}", id),
                Some(incident_body(incident)),
            )
            .await?;
        Ok(())
    }

    async fn send_metric_point(&self, metric_id: u64, value: i64) -> Result<(), ApiError> {
        let _: Value = self
            .request(
                Method::POST,
                &format!("metrics/{}/points", metric_id),
                Some(json!({ "value": value, "timestamp": Utc::now().timestamp() })),
            )
            .await?;
        Ok(())
    }
}
