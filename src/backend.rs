//! Delivery of log reports to the collection backend
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::errors::EmulatorError;
use crate::models::{Emulator, LogReport};
use crate::wire::{encode_report, BackendResponse};

const USER_AGENT: &str = concat!("gps-emulator/", env!("CARGO_PKG_VERSION"));
const HEALTH_PATH: &str = "/api/auth/health";

/// Sends one report to wherever logs are collected.
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn send(&self, emulator: &Emulator, report: &LogReport) -> Result<(), EmulatorError>;
}

/// JSON over HTTP transport
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, EmulatorError> {
        Self::with_base_url(config.base_url(), config.timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmulatorError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the backend; 401 still proves it is up.
    pub async fn health(&self) -> Result<bool, EmulatorError> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        let reachable = matches!(status, StatusCode::OK | StatusCode::UNAUTHORIZED);
        if reachable {
            info!("Backend reachable at {} ({})", self.base_url, status);
        } else {
            warn!("Backend health check returned {}", status);
        }
        Ok(reachable)
    }
}

#[async_trait]
impl LogTransport for HttpBackend {
    async fn send(&self, emulator: &Emulator, report: &LogReport) -> Result<(), EmulatorError> {
        let kind = report.kind();
        let url = format!("{}{}", self.base_url, kind.endpoint());
        let body = encode_report(emulator, report)?;

        debug!(mdn = %emulator.mdn(), %kind, "POST {url}");
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !matches!(status, StatusCode::OK | StatusCode::CREATED) {
            return Err(EmulatorError::Transmission(format!(
                "{kind} log rejected with HTTP {status}: {text}"
            )));
        }

        let reply: BackendResponse = serde_json::from_str(&text).map_err(|e| {
            EmulatorError::Transmission(format!("Unreadable backend response: {e}"))
        })?;
        reply.into_result()?;

        debug!(mdn = %emulator.mdn(), %kind, records = report.record_count(), "Log accepted");
        Ok(())
    }
}
