//! HTTP probe implementation.

use super::{ProbeError, ProbeOutcome, ProbeSettings};

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::time::Duration;

const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Checks that a URL answers with the expected status code and, optionally,
/// a body matching a regular expression.
#[derive(Debug)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    method: Method,
    headers: HeaderMap,
    body: String,
    expected_status: u16,
    expected_body: Option<Regex>,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(
        address: &str,
        settings: &ProbeSettings,
        timeout: Duration,
        strict: bool,
    ) -> Result<Self, ProbeError> {
        let url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let method = if settings.method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(settings.method.to_uppercase().as_bytes())
                .map_err(|_| ProbeError::Config(format!("invalid HTTP method: {}", settings.method)))?
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProbeError::Config(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ProbeError::Config(format!("invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let expected_body = if settings.expected_body.is_empty() {
            None
        } else {
            Some(Regex::new(&settings.expected_body).map_err(|e| {
                ProbeError::Config(format!("invalid expected_body regex: {}", e))
            })?)
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!strict)
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url,
            method,
            headers,
            body: settings.data.clone(),
            expected_status: if settings.expected_status_code == 0 {
                DEFAULT_EXPECTED_STATUS
            } else {
                settings.expected_status_code
            },
            expected_body,
            timeout,
        })
    }

    pub async fn test(&self) -> ProbeOutcome {
        self.fetch().await.into()
    }

    async fn fetch(&self) -> Result<(), ProbeError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());
        if !self.body.is_empty() {
            request = request.body(self.body.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status != self.expected_status {
            return Err(ProbeError::Network(format!(
                "unexpected response code: {}. Expected {}",
                status, self.expected_status
            )));
        }

        let Some(expected) = &self.expected_body else {
            return Ok(());
        };

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        if !expected.is_match(&body) {
            return Err(ProbeError::Network(format!(
                "unexpected body: {}. Expected to match: {}",
                truncate(&body, 200),
                expected
            )));
        }

        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
