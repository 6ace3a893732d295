//! HTTP client for the drop box servo on the ESP32

use std::fmt;
use std::time::Duration;

use crate::config::ActuatorConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    Open,
    Close,
}

impl ActuatorCommand {
    /// Path segment the ESP32 firmware serves for this command
    pub fn path(&self) -> &'static str {
        match self {
            ActuatorCommand::Open => "open",
            ActuatorCommand::Close => "close",
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

pub struct ActuatorClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ActuatorClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &ActuatorConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one command; the response body is the actuator's status text
    pub async fn send(&self, command: ActuatorCommand) -> Result<String> {
        let url = format!("{}/{}", self.base_url, command.path());
        tracing::debug!(%url, "Sending actuator command");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_error(e))?;

        if status.is_success() {
            tracing::info!(command = %command, status = %body.trim(), "Actuator answered");
        } else {
            tracing::warn!(command = %command, http_status = status.as_u16(), "Actuator returned an error status");
        }
        Ok(body)
    }

    fn map_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::ActuatorTimeout(self.timeout)
        } else {
            Error::ActuatorUnreachable(error.to_string())
        }
    }
}
