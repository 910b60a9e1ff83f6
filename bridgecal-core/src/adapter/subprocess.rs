//! Provider subprocess client.
//!
//! Spawns `bridgecal-provider-<name>` and speaks the JSON protocol over
//! stdin/stdout. Any executable that speaks the protocol can be a provider.
//! Providers manage their own credentials and tokens; bridgecal only passes
//! provider-specific parameters through from the side's config table.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use async_trait::async_trait;
use serde::Serialize;

use crate::adapter::protocol::{
    Command, CreateEvent, DeleteEvent, FaultKind, ListEvents, ProviderCommand, Request, Response,
    UpdateEvent,
};
use crate::adapter::{AdapterError, CalendarAdapter, EventPage};
use crate::config::AdapterConfig;
use crate::event::{CanonicalEvent, Origin};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// A calendar side fronted by an external provider binary.
pub struct SubprocessAdapter {
    origin: Origin,
    provider: String,
    remote_config: serde_json::Map<String, serde_json::Value>,
}

impl SubprocessAdapter {
    pub fn new(origin: Origin, config: &AdapterConfig) -> Self {
        let remote_config = config
            .options
            .iter()
            .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.clone(), v)))
            .collect();

        SubprocessAdapter {
            origin,
            provider: config.provider.clone(),
            remote_config,
        }
    }

    fn binary_path(&self) -> Result<std::path::PathBuf, AdapterError> {
        let binary_name = format!("bridgecal-provider-{}", self.provider);
        which::which(&binary_name).map_err(|_| AdapterError::NotInstalled(binary_name))
    }

    fn remote_config(&self) -> serde_json::Map<String, serde_json::Value> {
        self.remote_config.clone()
    }

    /// Call a typed provider command and return the result.
    async fn call<C: ProviderCommand>(&self, cmd: C) -> Result<C::Response, AdapterError> {
        timeout(PROVIDER_TIMEOUT, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| AdapterError::Timeout(PROVIDER_TIMEOUT.as_secs()))?
    }

    /// Low-level call that sends a command with params and deserializes the
    /// response.
    async fn call_raw<P: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> Result<R, AdapterError> {
        let params =
            serde_json::to_value(params).map_err(|e| AdapterError::Protocol(e.to_string()))?;
        let request = Request { command, params };
        let request_json =
            serde_json::to_string(&request).map_err(|e| AdapterError::Protocol(e.to_string()))?;

        let binary_path = self.binary_path()?;

        let mut child = TokioCommand::new(&binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .spawn()?;

        // Write request to stdin (unwrap safe: we piped stdin above)
        let mut stdin = child.stdin.take().unwrap();
        stdin
            .write_all(format!("{request_json}\n").as_bytes())
            .await?;
        drop(stdin);

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(AdapterError::transient(
                "provider_exit",
                format!(
                    "provider exited with status {}",
                    output.status.code().unwrap_or(-1)
                ),
            ));
        }

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(AdapterError::Protocol("provider returned no response".into()));
        }

        let response: Response<R> = serde_json::from_str(&response_str)
            .map_err(|e| AdapterError::Protocol(format!("failed to parse response: {e}")))?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { kind, message } => Err(match kind {
                FaultKind::Auth => AdapterError::Auth(message),
                FaultKind::Transient => AdapterError::transient("provider", message),
                FaultKind::Invalid => AdapterError::Protocol(message),
            }),
        }
    }
}

#[async_trait]
impl CalendarAdapter for SubprocessAdapter {
    fn origin(&self) -> Origin {
        self.origin
    }

    async fn list_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: Option<String>,
    ) -> Result<EventPage, AdapterError> {
        let response = self
            .call(ListEvents {
                remote_config: self.remote_config(),
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
                cursor,
            })
            .await?;

        Ok(EventPage {
            events: response.events,
            cursor: response.cursor,
        })
    }

    async fn create(&self, event: &CanonicalEvent) -> Result<String, AdapterError> {
        self.call(CreateEvent {
            remote_config: self.remote_config(),
            event: event.clone(),
        })
        .await
    }

    async fn update(&self, id: &str, event: &CanonicalEvent) -> Result<(), AdapterError> {
        self.call(UpdateEvent {
            remote_config: self.remote_config(),
            event_id: id.to_string(),
            event: event.clone(),
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), AdapterError> {
        self.call(DeleteEvent {
            remote_config: self.remote_config(),
            event_id: id.to_string(),
        })
        .await
    }
}
