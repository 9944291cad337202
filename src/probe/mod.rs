//! Probe module for reachability checks.
//!
//! Supports HTTP, DNS, and mock (synthetic) probes. The variant is picked
//! from the monitor's `type` field when the configuration is decoded.

mod dns;
mod http;
mod mock;

pub use dns::*;
pub use http::*;
pub use mock::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Discriminator selecting the probe variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Http,
    Dns,
    Mock,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Http => write!(f, "http"),
            ProbeKind::Dns => write!(f, "dns"),
            ProbeKind::Mock => write!(f, "mock"),
        }
    }
}

/// Probe-specific settings. Each variant reads only its own fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    // http
    pub method: String,
    pub headers: HashMap<String, String>,
    pub data: String,
    pub expected_status_code: u16,
    pub expected_body: String,

    // dns
    pub question: String,
    pub dns_type: String,
    pub answers: Vec<AnswerMatcher>,

    // mock
    pub sequence: Vec<bool>,
    pub reason: String,
}

/// Result of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub up: bool,
    /// Why the check failed; empty when up.
    pub reason: String,
}

impl ProbeOutcome {
    pub fn up() -> Self {
        Self {
            up: true,
            reason: String::new(),
        }
    }

    pub fn down(reason: impl Into<String>) -> Self {
        Self {
            up: false,
            reason: reason.into(),
        }
    }
}

impl<E: fmt::Display> From<Result<(), E>> for ProbeOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::up(),
            Err(e) => Self::down(e.to_string()),
        }
    }
}

/// A configured reachability check.
#[derive(Debug)]
pub enum Probe {
    Http(HttpProbe),
    Dns(DnsProbe),
    Mock(MockProbe),
}

impl Probe {
    /// Build the probe variant selected by `kind`.
    ///
    /// `strict` only matters for HTTP, where it enables TLS verification.
    pub fn from_config(
        kind: ProbeKind,
        target: &str,
        settings: &ProbeSettings,
        timeout: Duration,
        strict: bool,
    ) -> Result<Self, ProbeError> {
        let probe = match kind {
            ProbeKind::Http => Probe::Http(HttpProbe::new(target, settings, timeout, strict)?),
            ProbeKind::Dns => Probe::Dns(DnsProbe::new(target, settings, timeout)?),
            ProbeKind::Mock => Probe::Mock(MockProbe::new(settings)),
        };
        Ok(probe)
    }

    pub fn kind(&self) -> ProbeKind {
        match self {
            Probe::Http(_) => ProbeKind::Http,
            Probe::Dns(_) => ProbeKind::Dns,
            Probe::Mock(_) => ProbeKind::Mock,
        }
    }

    /// Run the check. Never blocks past the configured timeout.
    pub async fn test(&self) -> ProbeOutcome {
        match self {
            Probe::Http(p) => p.test().await,
            Probe::Dns(p) => p.test().await,
            Probe::Mock(p) => p.test(),
        }
    }
}
