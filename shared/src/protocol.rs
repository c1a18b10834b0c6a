//! Message types for pfurl communication.
//!
//! A message is either an `ActionRequest` (`{"action": ..., "meta": ...}`)
//! or some other payload the remote service understands on its own terms.
//! Only `pushPath` and `pullPath` get a typed view; every other action is
//! passed through untouched.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Action asking the remote service to shut itself down.
pub const SHUTDOWN_ACTION: &str = "quit";

pub const PUSH_PATH: &str = "pushPath";
pub const PULL_PATH: &str = "pullPath";

/// Default `Content-Type` for outbound bodies
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// JSON-described instruction for the remote control service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,

    /// Any other top-level keys, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, meta: Value) -> Self {
        Self {
            action: action.into(),
            meta,
            extra: Map::new(),
        }
    }

    /// The control message sent after the primary exchange in one-shot mode.
    pub fn shutdown() -> Self {
        Self::new(
            SHUTDOWN_ACTION,
            serde_json::json!({ "when": "now", "saveDB": true }),
        )
    }

    /// Typed view of the request, keyed by `action`.
    pub fn classify(&self) -> Result<Action> {
        match self.action.as_str() {
            PUSH_PATH => Ok(Action::PushPath(PathTransfer::from_meta(&self.meta)?)),
            PULL_PATH => Ok(Action::PullPath(PathTransfer::from_meta(&self.meta)?)),
            _ => Ok(Action::Other),
        }
    }
}

/// What the client has to do for a given action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Client is the source
    PushPath(PathTransfer),
    /// Client is the destination
    PullPath(PathTransfer),
    /// Opaque to the client
    Other,
}

/// `meta` of a `pushPath`/`pullPath` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTransfer {
    pub local: PathBuf,
    pub remote: PathBuf,
    pub transport: TransportSpec,
}

impl PathTransfer {
    pub fn from_meta(meta: &Value) -> Result<Self> {
        let local = meta
            .pointer("/local/path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidLocalPath("meta.local.path is missing".into()))?;

        let remote = meta
            .pointer("/remote/path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidRemotePath("meta.remote.path is missing".into()))?;

        let transport = TransportSpec::from_value(meta.get("transport"))?;

        Ok(Self {
            local: PathBuf::from(local),
            remote: PathBuf::from(remote),
            transport,
        })
    }
}

/// Path transfer mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSpec {
    Compress(CompressSpec),
    Copy(CopySpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressSpec {
    pub archive: ArchiveFormat,
    /// Unpack the archive on arrival
    pub unpack: bool,
    /// Delete the archive artifact after the transfer
    pub cleanup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CopySpec {
    #[serde(default)]
    pub symlink: bool,
}

#[derive(Deserialize)]
struct RawCompress {
    #[serde(default = "default_archive")]
    archive: String,
    #[serde(default)]
    unpack: bool,
    #[serde(default)]
    cleanup: bool,
}

fn default_archive() -> String {
    "zip".to_string()
}

impl TransportSpec {
    /// Parse `meta.transport`: `{"mechanism": "<m>", "<m>": {...options}}`
    pub fn from_value(transport: Option<&Value>) -> Result<Self> {
        let transport = transport
            .ok_or_else(|| Error::UnsupportedTransport("meta.transport is missing".into()))?;

        let mechanism = transport
            .get("mechanism")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::UnsupportedTransport("meta.transport.mechanism is missing".into()))?;

        let options = transport
            .get(mechanism)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        match mechanism {
            "compress" => {
                let raw: RawCompress = serde_json::from_value(options).map_err(|e| {
                    Error::UnsupportedTransport(format!("invalid compress options: {}", e))
                })?;
                let archive = match raw.archive.as_str() {
                    "zip" => ArchiveFormat::Zip,
                    other => {
                        return Err(Error::UnsupportedTransport(format!(
                            "archive format '{}'",
                            other
                        )))
                    }
                };
                Ok(TransportSpec::Compress(CompressSpec {
                    archive,
                    unpack: raw.unpack,
                    cleanup: raw.cleanup,
                }))
            }
            "copy" => {
                let copy: CopySpec = serde_json::from_value(options).map_err(|e| {
                    Error::UnsupportedTransport(format!("invalid copy options: {}", e))
                })?;
                Ok(TransportSpec::Copy(copy))
            }
            other => Err(Error::UnsupportedTransport(format!("mechanism '{}'", other))),
        }
    }
}

/// Nest `payload` one level under `wrapper`, if one is configured.
pub fn wrap(payload: Value, wrapper: Option<&str>) -> Value {
    match wrapper {
        Some(key) => {
            let mut outer = Map::new();
            outer.insert(key.to_string(), payload);
            Value::Object(outer)
        }
        None => payload,
    }
}

/// The `--msg` payload as supplied by the user
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Empty,
    /// Not JSON; sent verbatim
    Text(String),
    /// JSON without an `action` key
    Json(Value),
    Action(ActionRequest),
}

impl Message {
    pub fn parse(raw: Option<&str>) -> Self {
        let raw = match raw {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Message::Empty,
        };

        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return Message::Text(raw.to_string()),
        };

        if value.get("action").map(Value::is_string).unwrap_or(false) {
            if let Ok(request) = serde_json::from_value::<ActionRequest>(value.clone()) {
                return Message::Action(request);
            }
        }
        Message::Json(value)
    }

    pub fn action(&self) -> Option<&ActionRequest> {
        match self {
            Message::Action(request) => Some(request),
            _ => None,
        }
    }

    /// Serialize for transmission, applying the outer wrapper exactly once.
    /// An empty message stays an empty body.
    pub fn to_body(&self, wrapper: Option<&str>) -> Result<Vec<u8>> {
        let value = match self {
            Message::Empty => return Ok(Vec::new()),
            Message::Text(text) if wrapper.is_none() => return Ok(text.clone().into_bytes()),
            Message::Text(text) => Value::String(text.clone()),
            Message::Json(value) => value.clone(),
            Message::Action(request) => serde_json::to_value(request)
                .map_err(|e| Error::InvalidMessage(e.to_string()))?,
        };

        serde_json::to_vec(&wrap(value, wrapper)).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}

impl From<ActionRequest> for Message {
    fn from(request: ActionRequest) -> Self {
        Message::Action(request)
    }
}
