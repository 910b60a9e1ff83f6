//! Defines the JSON protocol used for communication between bridgecal
//! and provider binaries over stdin/stdout.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::event::CanonicalEvent;
use crate::normalize::RawEvent;

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ListEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
}

/// Request sent to the provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Provider fault classification carried over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Credentials are unusable; re-authentication is required.
    Auth,
    /// Worth retrying on a later tick.
    Transient,
    /// The request itself was unacceptable.
    Invalid,
}

/// Response sent from provider to bridgecal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success { data: T },
    Error { kind: FaultKind, message: String },
}

impl<T: Serialize> Response<T> {
    pub fn success(data: T) -> String {
        serde_json::to_string(&Response::Success { data }).unwrap()
    }
}

impl Response<()> {
    pub fn error(kind: FaultKind, message: &str) -> String {
        serde_json::to_string(&Response::<()>::Error {
            kind,
            message: message.to_string(),
        })
        .unwrap()
    }
}

/// List events within a window.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListEvents {
    /// Provider-specific config (e.g. google_calendar_id).
    #[serde(flatten)]
    pub remote_config: serde_json::Map<String, serde_json::Value>,
    pub from: String,
    pub to: String,
    /// Opaque incremental-listing token from the previous tick, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListEventsResponse {
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl ProviderCommand for ListEvents {
    type Response = ListEventsResponse;
    fn command() -> Command {
        Command::ListEvents
    }
}

/// Create a new event.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEvent {
    #[serde(flatten)]
    pub remote_config: serde_json::Map<String, serde_json::Value>,
    pub event: CanonicalEvent,
}

impl ProviderCommand for CreateEvent {
    type Response = String; // Provider-assigned event id
    fn command() -> Command {
        Command::CreateEvent
    }
}

/// Update an existing event in place.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateEvent {
    #[serde(flatten)]
    pub remote_config: serde_json::Map<String, serde_json::Value>,
    pub event_id: String,
    pub event: CanonicalEvent,
}

impl ProviderCommand for UpdateEvent {
    type Response = ();
    fn command() -> Command {
        Command::UpdateEvent
    }
}

/// Delete an event by id. A missing target is success.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteEvent {
    #[serde(flatten)]
    pub remote_config: serde_json::Map<String, serde_json::Value>,
    pub event_id: String,
}

impl ProviderCommand for DeleteEvent {
    type Response = ();
    fn command() -> Command {
        Command::DeleteEvent
    }
}
