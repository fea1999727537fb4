//! Wire types for the MiR REST object model.
//!
//! The robot exposes missions, mission actions and mission-queue entries as
//! JSON resource collections under `/api/v2.0.0/`. These types mirror the
//! subset of fields the mission engine reads and writes.
//!
//! Records tolerate unknown fields on read; parameter slots additionally keep
//! any unrecognised fields so a full slot list can be written back verbatim.

pub mod defaults;
pub mod error;
pub mod ids;
pub mod search;
pub mod types;

pub use error::{ProtocolError, Result};
pub use ids::{ActionGuid, GroupGuid, MissionGuid, QueueEntryId};
pub use search::{FilterOperator, SearchFilter, SearchRequest};
pub use types::{
    ActionRecord, ActionUpdate, MissionGroup, MissionRecord, NewAction, NewMission,
    NewQueueEntry, ParamValue, ParameterSlot, QueueActionRecord, QueueEntry, QueueState, RobotState,
    StatusRecord,
};
