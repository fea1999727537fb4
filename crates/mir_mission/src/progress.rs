//! Execution Progress Tracker
//!
//! Pull-based snapshot of how far the queue has advanced since a checkpoint.
//! The fraction is position-based (index of the executing entry over queue
//! length), not a time estimate. The executing run gets the same treatment
//! over its own action list. Polling cadence belongs to the caller.

use mir_protocol::defaults::MISSIONS;
use mir_protocol::{
    MissionGuid, MissionRecord, QueueActionRecord, QueueEntry, QueueEntryId, QueueState,
};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::dispatcher::QueueDispatcher;
use crate::error::{MirError, Result};
use crate::gateway::{GatewayExt, RemoteGateway};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Progress {
    /// Nothing queued since the checkpoint.
    QueueEmpty,
    Snapshot(ProgressSnapshot),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// `position / total`; 0 when nothing is executing.
    pub fraction: f64,
    /// 0-based index of the executing entry.
    pub position: Option<usize>,
    pub total: usize,
    pub executing_entry: Option<QueueEntryId>,
    pub current_mission_name: Option<String>,
    /// Entries still waiting to run.
    pub pending: usize,
    /// Entries in a terminal state.
    pub finished: usize,
    /// Action-level progress of the executing run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_actions: Option<ActionProgress>,
}

/// Progress through the executing run's action list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProgress {
    /// `position / total`; 0 when no action is executing.
    pub fraction: f64,
    pub position: Option<usize>,
    pub total: usize,
    pub current_action_type: Option<String>,
    pub actions: Vec<QueueActionRecord>,
}

impl ProgressSnapshot {
    pub fn is_idle(&self) -> bool {
        self.executing_entry.is_none()
    }
}

impl Progress {
    pub fn is_empty(&self) -> bool {
        matches!(self, Progress::QueueEmpty)
    }

    /// `[####------]  40.00% Queue Complete` followed by the current mission,
    /// then a `Mission Complete` bar and the current action when known.
    pub fn render(&self, width: usize) -> String {
        match self {
            Progress::QueueEmpty => "No missions in the queue.".to_string(),
            Progress::Snapshot(snapshot) => {
                let current = snapshot
                    .current_mission_name
                    .as_deref()
                    .unwrap_or("(idle)");
                let mut out = format!(
                    "{} Queue Complete\nCurrent Mission: {}",
                    bar(width, snapshot.fraction),
                    current
                );
                if let Some(actions) = &snapshot.mission_actions {
                    let action = actions.current_action_type.as_deref().unwrap_or("(idle)");
                    out.push_str(&format!(
                        "\n{} Mission Complete\nCurrent Action: {}",
                        bar(width, actions.fraction),
                        action
                    ));
                }
                out
            }
        }
    }
}

fn bar(width: usize, fraction: f64) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = ((width as f64) * fraction) as usize;
    format!(
        "[{}{}] {:6.2}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        fraction * 100.0
    )
}

/// Position-based completion over one run's action list.
pub fn action_progress_of(actions: Vec<QueueActionRecord>) -> Option<ActionProgress> {
    if actions.is_empty() {
        return None;
    }
    let total = actions.len();
    let position = actions.iter().position(|a| a.state == QueueState::Executing);

    Some(ActionProgress {
        fraction: position.map_or(0.0, |i| i as f64 / total as f64),
        position,
        total,
        current_action_type: position.map(|i| actions[i].action_type.clone()),
        actions,
    })
}

/// Position-based completion over an ordered queue slice.
pub fn snapshot_of(entries: &[QueueEntry]) -> Option<ProgressSnapshot> {
    if entries.is_empty() {
        return None;
    }
    let total = entries.len();
    let position = entries.iter().position(|e| e.state == QueueState::Executing);
    let fraction = position.map_or(0.0, |i| i as f64 / total as f64);

    Some(ProgressSnapshot {
        fraction,
        position,
        total,
        executing_entry: position.map(|i| entries[i].id),
        current_mission_name: None,
        pending: entries
            .iter()
            .filter(|e| e.state == QueueState::Pending)
            .count(),
        finished: entries.iter().filter(|e| e.state.is_terminal()).count(),
        mission_actions: None,
    })
}

pub struct ProgressTracker<'a, G: ?Sized> {
    gateway: &'a G,
}

impl<'a, G: RemoteGateway + ?Sized> ProgressTracker<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Snapshot of the queue since `checkpoint`. Remote failures propagate
    /// unchanged; the caller's poll loop decides whether to try again.
    pub fn current_progress(&self, checkpoint: QueueEntryId) -> Result<Progress> {
        let dispatcher = QueueDispatcher::new(self.gateway);
        let entries = dispatcher.queue_since(checkpoint)?;
        let Some(mut snapshot) = snapshot_of(&entries) else {
            return Ok(Progress::QueueEmpty);
        };

        if let Some(index) = snapshot.position {
            let entry = &entries[index];
            let mission_id = self.mission_of(&dispatcher, entry)?;
            let mission: MissionRecord = self
                .gateway
                .get_as(&format!("{}/{}", MISSIONS, mission_id))?;
            snapshot.current_mission_name = Some(mission.name);
            snapshot.mission_actions = action_progress_of(dispatcher.entry_actions(entry.id)?);
        }
        Ok(Progress::Snapshot(snapshot))
    }

    /// Search listings may omit `mission_id`; the entry resource has it.
    fn mission_of(
        &self,
        dispatcher: &QueueDispatcher<'a, G>,
        entry: &QueueEntry,
    ) -> Result<MissionGuid> {
        if let Some(guid) = &entry.mission_id {
            return Ok(guid.clone());
        }
        let full = dispatcher.entry(entry.id)?;
        full.mission_id.ok_or_else(|| MirError::MalformedResponse {
            path: format!("mission_queue/{}", entry.id),
            source: serde_json::Error::missing_field("mission_id"),
        })
    }
}
