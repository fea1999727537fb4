//! Mission, action and queue records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProtocolError;
use crate::ids::{ActionGuid, GroupGuid, MissionGuid, QueueEntryId};

// ============================================================================
// Parameters
// ============================================================================

/// Scalar parameter value. The robot stores numbers, strings and booleans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Null,
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Integer(i) => write!(f, "{}", i),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl TryFrom<Value> for ParamValue {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(_) | Value::Object(_) => {
                Err(ProtocolError::UnsupportedValue(value.to_string()))
            }
            other => serde_json::from_value(other)
                .map_err(|e| ProtocolError::UnsupportedValue(e.to_string())),
        }
    }
}

/// One entry of an action's parameter list.
///
/// `id` is the stable key. A non-null `input_name` marks the slot as a
/// mission variable; either key addresses the slot when patching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSlot {
    pub id: String,
    #[serde(default)]
    pub input_name: Option<String>,
    pub value: ParamValue,
    /// Display label only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fields this crate does not model, written back unchanged.
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, Value>,
}

impl ParameterSlot {
    pub fn new(id: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            id: id.into(),
            input_name: None,
            value: value.into(),
            name: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_input_name(mut self, input_name: impl Into<String>) -> Self {
        self.input_name = Some(input_name.into());
        self
    }

    /// True when `key` equals the slot id or its input name.
    pub fn matches_key(&self, key: &str) -> bool {
        self.id == key || self.input_name.as_deref() == Some(key)
    }
}

// ============================================================================
// Missions and actions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRecord {
    pub guid: MissionGuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub group_id: Option<GroupGuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionGroup {
    pub guid: GroupGuid,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub guid: ActionGuid,
    pub action_type: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSlot>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub mission_id: Option<MissionGuid>,
}

/// Body of `POST missions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMission {
    pub name: String,
    pub description: String,
    pub group_id: Option<GroupGuid>,
}

/// Body of `POST missions/<guid>/actions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAction {
    pub action_type: String,
    pub parameters: Vec<ParameterSlot>,
    pub mission_id: MissionGuid,
    pub priority: i64,
}

/// Body of `PUT missions/<guid>/actions/<guid>`. The slot list is always
/// sent whole; the robot has no per-parameter update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionUpdate {
    pub parameters: Vec<ParameterSlot>,
    pub priority: i64,
    pub scope_reference: Option<String>,
}

// ============================================================================
// Mission queue
// ============================================================================

/// Remote-owned lifecycle of a queue entry. Observed locally, never set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueState {
    Pending,
    Executing,
    Done,
    Aborted,
    Error,
    #[serde(other)]
    Unknown,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Pending => "Pending",
            QueueState::Executing => "Executing",
            QueueState::Done => "Done",
            QueueState::Aborted => "Aborted",
            QueueState::Error => "Error",
            QueueState::Unknown => "Unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueState::Done | QueueState::Aborted | QueueState::Error)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled execution of a mission.
///
/// Search results from the robot may omit `mission_id`; the single-entry
/// resource always carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    #[serde(default)]
    pub mission_id: Option<MissionGuid>,
    #[serde(default)]
    pub priority: i64,
    pub state: QueueState,
}

/// One action of a queued run, as listed by `mission_queue/<id>/actions`.
/// Its state advances independently of the mission definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueActionRecord {
    #[serde(default)]
    pub id: Option<u64>,
    pub action_type: String,
    pub state: QueueState,
}

/// Body of `POST mission_queue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueueEntry {
    pub mission_id: MissionGuid,
    pub priority: i64,
}

// ============================================================================
// Robot status
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state_text: String,
}

/// Coarse robot state derived from the status `state_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum RobotState {
    Idle,
    Executing,
    Error(String),
}

impl RobotState {
    pub fn from_state_text(text: &str) -> Self {
        let upper = text.trim().to_uppercase();
        match upper.as_str() {
            "READY" | "IDLE" => RobotState::Idle,
            "PENDING" | "EXECUTING" => RobotState::Executing,
            _ => RobotState::Error(upper),
        }
    }
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobotState::Idle => write!(f, "IDLE"),
            RobotState::Executing => write!(f, "EXECUTING"),
            RobotState::Error(text) => write!(f, "ERROR ({})", text),
        }
    }
}
