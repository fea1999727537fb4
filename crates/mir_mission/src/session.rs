//! Mission session: the operations a dispatch wrapper exposes.
//!
//! A session pins the mission group, holds the queue checkpoint and owns the
//! per-name locks; everything else lives on the robot.

use chrono::Local;
use mir_protocol::defaults::{ACTIONS, MISSIONS, MISSION_GROUPS, STATUS};
use mir_protocol::{
    ActionRecord, GroupGuid, MissionGroup, MissionGuid, MissionRecord, QueueEntry, QueueEntryId,
    RobotState, StatusRecord,
};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::catalog::ActionCatalog;
use crate::dispatcher::{QueueDispatcher, SessionCheckpoint};
use crate::error::{MirError, Result};
use crate::gateway::{GatewayExt, RemoteGateway};
use crate::progress::{Progress, ProgressTracker};
use crate::synchronizer::{MissionSynchronizer, NameLocks, PatchMode, WantedAction};
use crate::waypoints::WaypointBook;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Use this group instead of the robot's first mission group.
    pub group_id: Option<GroupGuid>,
    pub patch_mode: PatchMode,
    pub map_name: String,
    pub locations_file: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            group_id: None,
            patch_mode: PatchMode::default(),
            map_name: mir_protocol::defaults::DEFAULT_MAP_NAME.to_string(),
            locations_file: None,
        }
    }
}

/// A queued run of a named mission together with its actions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionInQueue {
    pub mission: MissionRecord,
    pub entry: QueueEntry,
    pub actions: Vec<ActionRecord>,
}

pub struct MirSession<G> {
    gateway: G,
    catalog: Arc<ActionCatalog>,
    group_id: GroupGuid,
    patch_mode: PatchMode,
    map_name: String,
    locations_file: Option<PathBuf>,
    checkpoint: SessionCheckpoint,
    locks: NameLocks,
}

impl<G: RemoteGateway> MirSession<G> {
    /// Resolve the mission group and take the current queue tail as the
    /// checkpoint, so work from earlier sessions is not reported.
    pub fn open(gateway: G, catalog: Arc<ActionCatalog>, options: SessionOptions) -> Result<Self> {
        let group_id = match options.group_id {
            Some(group_id) => group_id,
            None => first_group(&gateway)?,
        };
        let tail = QueueDispatcher::new(&gateway).tail_id()?;
        info!(
            "Session opened: group {}, queue checkpoint {}, {} action types",
            group_id,
            tail,
            catalog.len()
        );

        Ok(Self {
            gateway,
            catalog,
            group_id,
            patch_mode: options.patch_mode,
            map_name: options.map_name,
            locations_file: options.locations_file,
            checkpoint: SessionCheckpoint::new(tail),
            locks: NameLocks::default(),
        })
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn group_id(&self) -> &GroupGuid {
        &self.group_id
    }

    pub fn checkpoint(&self) -> QueueEntryId {
        self.checkpoint.get()
    }

    /// Adopt a checkpoint persisted by the caller.
    pub fn set_checkpoint(&self, id: QueueEntryId) {
        self.checkpoint.set(id);
    }

    fn synchronizer(&self) -> MissionSynchronizer<'_, G> {
        MissionSynchronizer::new(&self.gateway, &self.catalog, &self.locks)
            .with_group(Some(&self.group_id))
            .with_patch_mode(self.patch_mode)
    }

    fn dispatcher(&self) -> QueueDispatcher<'_, G> {
        QueueDispatcher::new(&self.gateway)
    }

    // ========================================================================
    // Core operations
    // ========================================================================

    pub fn sync_mission(
        &self,
        name: &str,
        wanted: &[WantedAction],
        description: &str,
        priority: i64,
    ) -> Result<MissionGuid> {
        self.synchronizer()
            .sync_mission(name, wanted, description, priority)
    }

    pub fn enqueue(&self, mission_id: &MissionGuid, priority: i64) -> Result<QueueEntry> {
        self.dispatcher().enqueue(mission_id, priority)
    }

    pub fn sync_and_enqueue(
        &self,
        name: &str,
        wanted: &[WantedAction],
        description: &str,
        priority: i64,
    ) -> Result<QueueEntry> {
        let mission_id = self.sync_mission(name, wanted, description, priority)?;
        self.enqueue(&mission_id, priority)
    }

    pub fn queue_since(&self, checkpoint: QueueEntryId) -> Result<Vec<QueueEntry>> {
        self.dispatcher().queue_since(checkpoint)
    }

    pub fn queue_since_checkpoint(&self) -> Result<Vec<QueueEntry>> {
        self.queue_since(self.checkpoint())
    }

    /// Abort every pending and executing mission on the robot, including
    /// ones this session did not queue.
    pub fn abort_all(&self) -> Result<()> {
        self.dispatcher().abort_all()
    }

    pub fn current_progress(&self) -> Result<Progress> {
        ProgressTracker::new(&self.gateway).current_progress(self.checkpoint())
    }

    pub fn reset_checkpoint(&self) -> Result<QueueEntryId> {
        self.dispatcher().reset_checkpoint(&self.checkpoint)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn find_mission(&self, name: &str) -> Result<Option<MissionRecord>> {
        self.synchronizer().find_mission(name)
    }

    pub fn list_missions(&self) -> Result<Vec<MissionRecord>> {
        self.gateway.get_as(MISSIONS)
    }

    pub fn mission_actions(&self, mission_id: &MissionGuid) -> Result<Vec<ActionRecord>> {
        self.gateway
            .get_as(&format!("{}/{}/{}", MISSIONS, mission_id, ACTIONS))
    }

    /// First run of mission `name` queued since the checkpoint.
    pub fn find_mission_in_queue(&self, name: &str) -> Result<Option<MissionInQueue>> {
        let Some(mission) = self.find_mission(name)? else {
            return Ok(None);
        };
        let dispatcher = self.dispatcher();
        let Some(listed) = dispatcher
            .entries_for_mission(&mission.guid, self.checkpoint())?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let entry = dispatcher.entry(listed.id)?;
        let actions = self.mission_actions(&mission.guid)?;
        Ok(Some(MissionInQueue {
            mission,
            entry,
            actions,
        }))
    }

    /// Abort the first run of mission `name` queued since the checkpoint.
    /// Returns the aborted entry id, or `None` when there was nothing to cancel.
    pub fn cancel_mission_in_queue(&self, name: &str) -> Result<Option<QueueEntryId>> {
        let Some(mission) = self.find_mission(name)? else {
            return Ok(None);
        };
        let dispatcher = self.dispatcher();
        let Some(entry) = dispatcher
            .entries_for_mission(&mission.guid, self.checkpoint())?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        dispatcher.cancel(entry.id)?;
        Ok(Some(entry.id))
    }

    pub fn robot_state(&self) -> Result<RobotState> {
        let status: StatusRecord = self
            .gateway
            .get_as(&format!("{}?whitelist=state_text", STATUS))?;
        Ok(RobotState::from_state_text(&status.state_text))
    }

    /// The robot's own action-type listing.
    pub fn remote_action_types(&self) -> Result<Value> {
        self.gateway.get(ACTIONS)
    }

    pub fn remote_action_type(&self, action_type: &str) -> Result<Value> {
        self.gateway.get(&format!("{}/{}", ACTIONS, action_type))
    }

    // ========================================================================
    // Single-action missions
    // ========================================================================

    fn waypoint_guid(&self, location: &str) -> Result<String> {
        let path = self
            .locations_file
            .as_deref()
            .ok_or_else(|| MirError::Config("no locations file configured".to_string()))?;
        let book = WaypointBook::load(path)?;
        Ok(book.guid(&self.map_name, location)?.to_string())
    }

    /// Queue a one-off mission that drives to a named waypoint.
    pub fn move_to(&self, location: &str, priority: i64) -> Result<QueueEntry> {
        let guid = self.waypoint_guid(location)?;
        let name = format!("move_to_{}_{}", location, mission_stamp());
        let wanted = [WantedAction::new("move").with("position", guid)];
        self.sync_and_enqueue(&name, &wanted, "", priority)
    }

    /// Queue a one-off mission that docks at a named marker.
    pub fn dock_at(&self, location: &str, priority: i64) -> Result<QueueEntry> {
        let guid = self.waypoint_guid(location)?;
        let name = format!("dock_to_{}_{}", location, mission_stamp());
        let wanted = [WantedAction::new("docking").with("marker", guid)];
        self.sync_and_enqueue(&name, &wanted, "", priority)
    }

    pub fn wait_for(&self, delay: Duration, priority: i64) -> Result<QueueEntry> {
        let time = format_wait_time(delay);
        let name = format!("wait_for_{}_{}", time, mission_stamp());
        let wanted = [WantedAction::new("wait").with("time", time)];
        self.sync_and_enqueue(&name, &wanted, "", priority)
    }
}

fn first_group<G: RemoteGateway>(gateway: &G) -> Result<GroupGuid> {
    let groups: Vec<MissionGroup> = gateway.get_as(MISSION_GROUPS)?;
    groups
        .into_iter()
        .next()
        .map(|g| g.guid)
        .ok_or(MirError::NoMissionGroup)
}

fn mission_stamp() -> String {
    Local::now().format("%Y-%m-%d_%H:%M:%S%.6f").to_string()
}

/// `HH:MM:SS`, with a `.ffffff` suffix for sub-second durations.
pub fn format_wait_time(delay: Duration) -> String {
    let secs = delay.as_secs();
    let base = format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    match delay.subsec_micros() {
        0 => base,
        micros => format!("{}.{:06}", base, micros),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::InMemoryGateway;

    fn session() -> MirSession<InMemoryGateway> {
        MirSession::open(
            InMemoryGateway::new(),
            Arc::new(ActionCatalog::builtin()),
            SessionOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_format_wait_time() {
        assert_eq!(format_wait_time(Duration::from_secs(10)), "00:00:10");
        assert_eq!(format_wait_time(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_wait_time(Duration::from_millis(1500)), "00:00:01.500000");
    }

    #[test]
    fn test_open_requires_a_mission_group() {
        let result = MirSession::open(
            InMemoryGateway::without_groups(),
            Arc::new(ActionCatalog::builtin()),
            SessionOptions::default(),
        );
        assert!(matches!(result, Err(MirError::NoMissionGroup)));

        let session = MirSession::open(
            InMemoryGateway::without_groups(),
            Arc::new(ActionCatalog::builtin()),
            SessionOptions {
                group_id: Some(GroupGuid::from("configured")),
                ..SessionOptions::default()
            },
        )
        .unwrap();
        assert_eq!(session.group_id().as_str(), "configured");
    }

    #[test]
    fn test_find_and_cancel_mission_in_queue() {
        let session = session();
        assert!(session.find_mission_in_queue("patrol").unwrap().is_none());

        let wanted = [WantedAction::new("wait")];
        session.sync_mission("patrol", &wanted, "", 0).unwrap();
        assert!(session.find_mission_in_queue("patrol").unwrap().is_none());

        let entry = session.sync_and_enqueue("patrol", &wanted, "", 0).unwrap();
        let found = session.find_mission_in_queue("patrol").unwrap().unwrap();
        assert_eq!(found.entry.id, entry.id);
        assert_eq!(found.actions.len(), 1);
        assert_eq!(found.mission.name, "patrol");

        assert_eq!(
            session.cancel_mission_in_queue("patrol").unwrap(),
            Some(entry.id)
        );
        assert_eq!(session.cancel_mission_in_queue("unknown").unwrap(), None);
    }

    #[test]
    fn test_robot_state() {
        let session = session();
        assert_eq!(session.robot_state().unwrap(), RobotState::Idle);
        session.gateway().set_state_text("Executing");
        assert_eq!(session.robot_state().unwrap(), RobotState::Executing);
    }

    #[test]
    fn test_move_without_locations_file_is_config_error() {
        let session = session();
        assert!(matches!(
            session.move_to("charger1", 0),
            Err(MirError::Config(_))
        ));
    }
}
