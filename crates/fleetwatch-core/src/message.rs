// ── Dashboard wire protocol ──
//
// Every frame in either direction is a JSON object `{type, payload}`.
// Server → client frames are `ServerMessage`; client → server frames
// are `ClientMessage`. Field names are fixed by deployed dashboards.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Latest known properties of one device, plus `status` and `timestamp`.
pub type DeviceState = BTreeMap<String, String>;

/// `(timestamp, value)`; a `None` value records that the property vanished.
pub type HistoryEntry = (String, Option<String>);

/// Per-property history, newest first.
pub type History = BTreeMap<String, VecDeque<HistoryEntry>>;

/// Changed properties of one update; `None` means removed.
pub type StateDiff = BTreeMap<String, Option<String>>;

/// History entries appended by one update, in `StateDiff` order.
pub type HistoryDiff = Vec<(String, HistoryEntry)>;

/// Full snapshot sent to a client right after it connects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedRecords {
    pub state: BTreeMap<String, DeviceState>,
    pub history: BTreeMap<String, History>,
}

/// One device mutation. `state` and `history` are both `None` when the
/// device was cleared and clients should forget it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub id: String,
    pub state: Option<StateDiff>,
    pub history: Option<HistoryDiff>,
}

impl DeviceUpdate {
    pub fn removed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: None,
            history: None,
        }
    }
}

// ── Remote actions / commands ────────────────────────────────────────

/// `DEVICE_ACTION` payload, handed untouched to the action dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub targets: Vec<String>,
    pub action: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Any other payload fields, passed through as sent.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub err: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub err: Option<String>,
    pub results: Option<Vec<ActionResult>>,
}

impl ActionResponse {
    pub fn failed(err: impl Into<String>) -> Self {
        Self {
            err: Some(err.into()),
            results: None,
        }
    }
}

/// `PSTOOLS_COMMAND` payload, handed to the command runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub target: String,
    pub mode: String,
    #[serde(default)]
    pub argument: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub err: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// `REFRESH_DEVICE` / `CLEAR_DEVICE` payload. Missing targets mean
/// every device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

// ── Envelopes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    DeviceDataAll(AccumulatedRecords),
    DeviceDataUpdate(DeviceUpdate),
    DeviceActionResponse(ActionResponse),
    PstoolsCommandResponse(CommandResponse),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceDataAll(_) => "DEVICE_DATA_ALL",
            Self::DeviceDataUpdate(_) => "DEVICE_DATA_UPDATE",
            Self::DeviceActionResponse(_) => "DEVICE_ACTION_RESPONSE",
            Self::PstoolsCommandResponse(_) => "PSTOOLS_COMMAND_RESPONSE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    RefreshDevice(Targets),
    ClearDevice(Targets),
    DeviceAction(ActionRequest),
    PstoolsCommand(CommandRequest),
}
