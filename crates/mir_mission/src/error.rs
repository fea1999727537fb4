//! Mission engine error types

use mir_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

use crate::gateway::Verb;

pub type Result<T> = std::result::Result<T, MirError>;

#[derive(Error, Debug)]
pub enum MirError {
    /// Transport failure: the request never produced an HTTP status.
    #[error("{verb} {path}: robot unreachable: {message}")]
    RemoteUnavailable {
        verb: Verb,
        path: String,
        message: String,
    },

    /// The robot answered with a status outside the verb's success set.
    #[error("{verb} {path} rejected with status {status}: {body}")]
    RemoteRejected {
        verb: Verb,
        path: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {path}: {source}")]
    MalformedResponse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The caller's action-type sequence disagrees with the one recorded when
    /// the mission was first created. `None` marks the shorter side.
    #[error(
        "mission '{mission}' action {position}: recorded type {recorded:?}, requested {requested:?}"
    )]
    MissionActionMismatch {
        mission: String,
        position: usize,
        recorded: Option<String>,
        requested: Option<String>,
    },

    #[error("action type '{0}' is not in the parameter catalog")]
    UnknownActionType(String),

    #[error("parameter '{key}' matches no slot of action '{action_type}'")]
    UnknownParameter { action_type: String, key: String },

    #[error("invalid action specification: {0}")]
    InvalidActionSpec(String),

    #[error("robot reports no mission groups")]
    NoMissionGroup,

    #[error("location '{location}' not found in map '{map}'")]
    UnknownWaypoint { map: String, location: String },

    #[error("waypoint file {}: {message}", path.display())]
    Waypoints { path: PathBuf, message: String },

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl MirError {
    /// Transport or status failures from the robot.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            MirError::RemoteUnavailable { .. }
                | MirError::RemoteRejected { .. }
                | MirError::MalformedResponse { .. }
        )
    }

    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            MirError::RemoteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
