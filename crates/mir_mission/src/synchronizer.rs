//! Mission Synchronizer
//!
//! Finds or creates a mission by name, then patches its action parameters to
//! match the caller's intent. The action-type sequence recorded when a mission
//! is first created is immutable: the robot cannot reorder or retype actions
//! through this interface, so any divergence is a caller error.

use mir_protocol::defaults::{ACTIONS, MISSIONS};
use mir_protocol::{
    ActionRecord, ActionUpdate, GroupGuid, MissionGuid, MissionRecord, NewAction, NewMission,
    ParamValue, ParameterSlot, SearchFilter,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::catalog::ActionCatalog;
use crate::error::{MirError, Result};
use crate::gateway::{GatewayExt, RemoteGateway};

/// How override keys that match no parameter slot are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    /// Skip the key with a warning.
    #[default]
    Lenient,
    /// Fail with [`MirError::UnknownParameter`] before any update is sent.
    Strict,
}

/// One desired action: its type plus parameter overrides keyed by slot `id`
/// or `input_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WantedAction {
    pub action_type: String,
    #[serde(default)]
    pub overrides: BTreeMap<String, ParamValue>,
}

impl WantedAction {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Parse the compact list form `[{"<type>": {"<key>": <value>}}, ...]`.
    pub fn parse_list(value: &Value) -> Result<Vec<Self>> {
        let items = value
            .as_array()
            .ok_or_else(|| MirError::InvalidActionSpec("expected a JSON array".to_string()))?;

        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let object = item.as_object().filter(|o| o.len() == 1).ok_or_else(|| {
                    MirError::InvalidActionSpec(format!(
                        "entry {} must be an object with exactly one action type",
                        index
                    ))
                })?;
                let (action_type, params) = object.iter().next().ok_or_else(|| {
                    MirError::InvalidActionSpec(format!("entry {} is empty", index))
                })?;

                let mut wanted = WantedAction::new(action_type.clone());
                match params {
                    Value::Null => {}
                    Value::Object(params) => {
                        for (key, raw) in params {
                            let value = ParamValue::try_from(raw.clone()).map_err(|e| {
                                MirError::InvalidActionSpec(format!(
                                    "{}.{}: {}",
                                    action_type, key, e
                                ))
                            })?;
                            wanted.overrides.insert(key.clone(), value);
                        }
                    }
                    _ => {
                        return Err(MirError::InvalidActionSpec(format!(
                            "parameters of '{}' must be an object",
                            action_type
                        )))
                    }
                }
                Ok(wanted)
            })
            .collect()
    }

    pub fn parse_list_str(json: &str) -> Result<Vec<Self>> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| MirError::InvalidActionSpec(e.to_string()))?;
        Self::parse_list(&value)
    }
}

/// Per-mission-name locks so concurrent callers sharing one synchronizer do
/// not both take the create branch for the same name.
#[derive(Debug, Default)]
pub struct NameLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    /// Run `f` while holding the lock for `name`. The entry is dropped once
    /// no other caller holds or waits on it.
    pub fn with_lock<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let handle = {
            let mut table = self.table();
            Arc::clone(table.entry(name.to_string()).or_default())
        };

        let result = {
            let _guard = handle.lock().unwrap_or_else(|p| p.into_inner());
            f()
        };

        // Handles are only cloned under the table lock, so a count of two
        // (table plus ours) means nobody else wants this name.
        let mut table = self.table();
        if Arc::strong_count(&handle) == 2 {
            table.remove(name);
        }
        result
    }

    /// Names with a live lock entry.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.table.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct MissionSynchronizer<'a, G: ?Sized> {
    gateway: &'a G,
    catalog: &'a ActionCatalog,
    locks: &'a NameLocks,
    group_id: Option<&'a GroupGuid>,
    patch_mode: PatchMode,
}

impl<'a, G: RemoteGateway + ?Sized> MissionSynchronizer<'a, G> {
    pub fn new(gateway: &'a G, catalog: &'a ActionCatalog, locks: &'a NameLocks) -> Self {
        Self {
            gateway,
            catalog,
            locks,
            group_id: None,
            patch_mode: PatchMode::default(),
        }
    }

    pub fn with_group(mut self, group_id: Option<&'a GroupGuid>) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_patch_mode(mut self, patch_mode: PatchMode) -> Self {
        self.patch_mode = patch_mode;
        self
    }

    /// Locate or create mission `name`, then patch its parameters.
    ///
    /// Returns the mission guid. Creation seeds every action from the catalog
    /// defaults; the patch pass then applies `wanted` overrides positionally.
    pub fn sync_mission(
        &self,
        name: &str,
        wanted: &[WantedAction],
        description: &str,
        priority: i64,
    ) -> Result<MissionGuid> {
        if name.trim().is_empty() {
            return Err(MirError::InvalidActionSpec(
                "mission name cannot be empty".to_string(),
            ));
        }

        self.locks.with_lock(name, || {
            let guid = match self.find_mission(name)? {
                Some(mission) => {
                    debug!("Mission '{}' exists as {}, skipping creation", name, mission.guid);
                    mission.guid
                }
                None => self.create_mission(name, wanted, description, priority)?,
            };

            self.patch_parameters(name, &guid, wanted)?;
            Ok(guid)
        })
    }

    /// First mission named `name`, by remote ordering.
    pub fn find_mission(&self, name: &str) -> Result<Option<MissionRecord>> {
        let matches: Vec<MissionRecord> = self
            .gateway
            .search_as(MISSIONS, vec![SearchFilter::name_is(name)])?;
        if matches.len() > 1 {
            warn!(
                "{} missions share the name '{}'; using {}",
                matches.len(),
                name,
                matches[0].guid
            );
        }
        Ok(matches.into_iter().next())
    }

    fn create_mission(
        &self,
        name: &str,
        wanted: &[WantedAction],
        description: &str,
        priority: i64,
    ) -> Result<MissionGuid> {
        // Resolve every template first so an unknown type creates nothing.
        let templates = wanted
            .iter()
            .map(|w| self.catalog.template(&w.action_type))
            .collect::<Result<Vec<_>>>()?;

        let mission: MissionRecord = self.gateway.create_as(
            MISSIONS,
            &NewMission {
                name: name.to_string(),
                description: description.to_string(),
                group_id: self.group_id.cloned(),
            },
        )?;
        info!("Created mission '{}' ({})", name, mission.guid);

        let collection = actions_path(&mission.guid);
        for (want, parameters) in wanted.iter().zip(templates) {
            let created: Result<ActionRecord> = self.gateway.create_as(
                &collection,
                &NewAction {
                    action_type: want.action_type.clone(),
                    parameters,
                    mission_id: mission.guid.clone(),
                    priority,
                },
            );
            match created {
                Ok(action) => {
                    debug!("Added {} action {} to '{}'", action.action_type, action.guid, name)
                }
                Err(e) => {
                    self.discard_partial(name, &mission.guid);
                    return Err(e);
                }
            }
        }

        Ok(mission.guid)
    }

    /// Remove a mission whose action list could not be completed, so the
    /// next sync of `name` creates it afresh instead of failing the
    /// sequence check.
    fn discard_partial(&self, name: &str, guid: &MissionGuid) {
        let resource = format!("{}/{}", MISSIONS, guid);
        match self.gateway.delete(&resource) {
            Ok(()) => warn!("Removed partially created mission '{}' ({})", name, guid),
            Err(e) => warn!(
                "Failed to remove partially created mission '{}' ({}): {}",
                name, guid, e
            ),
        }
    }

    fn patch_parameters(
        &self,
        name: &str,
        guid: &MissionGuid,
        wanted: &[WantedAction],
    ) -> Result<()> {
        let collection = actions_path(guid);
        let actions: Vec<ActionRecord> = self.gateway.get_as(&collection)?;
        check_sequence(name, &actions, wanted)?;

        let mut updates = Vec::with_capacity(actions.len());
        for (action, want) in actions.into_iter().zip(wanted) {
            let mut parameters = action.parameters;
            for key in apply_overrides(&mut parameters, &want.overrides) {
                match self.patch_mode {
                    PatchMode::Strict => {
                        return Err(MirError::UnknownParameter {
                            action_type: action.action_type,
                            key,
                        })
                    }
                    PatchMode::Lenient => warn!(
                        "Mission '{}': '{}' has no parameter '{}', skipped",
                        name, action.action_type, key
                    ),
                }
            }
            let update = ActionUpdate {
                parameters,
                priority: action.priority,
                scope_reference: None,
            };
            updates.push((action.guid, update));
        }

        for (action_guid, update) in updates {
            let resource = format!("{}/{}", collection, action_guid);
            let _: Value = self.gateway.replace_as(&resource, &update)?;
            debug!("Patched action {} of '{}'", action_guid, name);
        }
        Ok(())
    }
}

fn actions_path(guid: &MissionGuid) -> String {
    format!("{}/{}/{}", MISSIONS, guid, ACTIONS)
}

/// Compare the recorded action-type sequence with the requested one.
pub fn check_sequence(
    mission: &str,
    recorded: &[ActionRecord],
    requested: &[WantedAction],
) -> Result<()> {
    for position in 0..recorded.len().max(requested.len()) {
        let have = recorded.get(position).map(|a| a.action_type.as_str());
        let want = requested.get(position).map(|w| w.action_type.as_str());
        if have != want {
            return Err(MirError::MissionActionMismatch {
                mission: mission.to_string(),
                position,
                recorded: have.map(str::to_string),
                requested: want.map(str::to_string),
            });
        }
    }
    Ok(())
}

/// Set every slot whose `id` or `input_name` equals an override key.
///
/// Returns the keys that matched no slot.
pub fn apply_overrides(
    slots: &mut [ParameterSlot],
    overrides: &BTreeMap<String, ParamValue>,
) -> Vec<String> {
    let mut unmatched = Vec::new();
    for (key, value) in overrides {
        let mut matched = false;
        for slot in slots.iter_mut().filter(|s| s.matches_key(key)) {
            slot.value = value.clone();
            matched = true;
        }
        if !matched {
            unmatched.push(key.clone());
        }
    }
    unmatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::InMemoryGateway;
    use crate::gateway::Verb;
    use mir_protocol::ActionGuid;
    use serde_json::json;

    fn action(action_type: &str) -> ActionRecord {
        ActionRecord {
            guid: ActionGuid::from("a"),
            action_type: action_type.to_string(),
            parameters: vec![],
            priority: 0,
            mission_id: None,
        }
    }

    fn fetch_actions(gateway: &InMemoryGateway, guid: &MissionGuid) -> Vec<ActionRecord> {
        gateway.get_as(&actions_path(guid)).unwrap()
    }

    #[test]
    fn test_overrides_touch_only_matching_slots() {
        let catalog = ActionCatalog::builtin();
        let mut slots = catalog.template("relative_move").unwrap();
        let before = slots.clone();

        let wanted = WantedAction::new("relative_move").with("x", 5.0);
        let unmatched = apply_overrides(&mut slots, &wanted.overrides);

        assert!(unmatched.is_empty());
        assert_eq!(slots[0].value, ParamValue::Number(5.0));
        assert_eq!(&slots[1..], &before[1..]);
    }

    #[test]
    fn test_overrides_match_input_name_and_report_unmatched() {
        let mut slots = vec![
            ParameterSlot::new("time", "00:00:05").with_input_name("delay"),
            ParameterSlot::new("other", 1),
        ];
        let wanted = WantedAction::new("wait")
            .with("delay", "00:00:30")
            .with("volume", 3);

        let unmatched = apply_overrides(&mut slots, &wanted.overrides);

        assert_eq!(slots[0].value, ParamValue::from("00:00:30"));
        assert_eq!(slots[1].value, ParamValue::Integer(1));
        assert_eq!(unmatched, vec!["volume".to_string()]);
    }

    #[test]
    fn test_check_sequence_reports_first_divergence() {
        let recorded = vec![action("move"), action("wait")];
        let err = check_sequence(
            "m",
            &recorded,
            &[WantedAction::new("wait"), WantedAction::new("move")],
        )
        .unwrap_err();
        match err {
            MirError::MissionActionMismatch {
                position,
                recorded,
                requested,
                ..
            } => {
                assert_eq!(position, 0);
                assert_eq!(recorded.as_deref(), Some("move"));
                assert_eq!(requested.as_deref(), Some("wait"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = check_sequence("m", &recorded, &[WantedAction::new("move")]).unwrap_err();
        assert!(matches!(
            err,
            MirError::MissionActionMismatch { position: 1, requested: None, .. }
        ));
    }

    #[test]
    fn test_parse_list_compact_form() {
        let wanted = WantedAction::parse_list(&json!([
            {"move": {"position": "d99494c0"}},
            {"docking": {"marker": "f0908191", "retries": 3}},
            {"wait": null}
        ]))
        .unwrap();
        assert_eq!(wanted.len(), 3);
        assert_eq!(wanted[0].overrides["position"], ParamValue::from("d99494c0"));
        assert_eq!(wanted[1].overrides["retries"], ParamValue::Integer(3));
        assert!(wanted[2].overrides.is_empty());

        assert!(WantedAction::parse_list(&json!([{"a": {}, "b": {}}])).is_err());
        assert!(WantedAction::parse_list(&json!([{"wait": {"time": [1]}}])).is_err());
        assert!(WantedAction::parse_list_str("{}").is_err());
    }

    #[test]
    fn test_create_then_reuse() {
        let gateway = InMemoryGateway::new();
        let catalog = ActionCatalog::builtin();
        let locks = NameLocks::default();
        let sync = MissionSynchronizer::new(&gateway, &catalog, &locks);
        let wanted = vec![
            WantedAction::new("move").with("position", "p-1"),
            WantedAction::new("wait"),
        ];

        let first = sync.sync_mission("tour", &wanted, "desc", 2).unwrap();
        let second = sync.sync_mission("tour", &wanted, "desc", 2).unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.missions_named("tour"), 1);
        assert_eq!(gateway.count_requests(Verb::Create, MISSIONS), 3);

        let actions = fetch_actions(&gateway, &first);
        let types: Vec<&str> = actions.iter().map(|a| a.action_type.as_str()).collect();
        assert_eq!(types, vec!["move", "wait"]);
        assert!(actions.iter().all(|a| a.priority == 2));
        assert_eq!(actions[0].parameters[0].value, ParamValue::from("p-1"));
    }

    #[test]
    fn test_unknown_action_type_creates_nothing() {
        let gateway = InMemoryGateway::new();
        let catalog = ActionCatalog::builtin();
        let locks = NameLocks::default();
        let sync = MissionSynchronizer::new(&gateway, &catalog, &locks);

        let err = sync
            .sync_mission("bad", &[WantedAction::new("wait"), WantedAction::new("teleport")], "", 0)
            .unwrap_err();

        assert!(matches!(err, MirError::UnknownActionType(_)));
        assert_eq!(gateway.count_requests(Verb::Create, MISSIONS), 0);
    }

    #[test]
    fn test_strict_mode_fails_before_any_update() {
        let gateway = InMemoryGateway::new();
        let catalog = ActionCatalog::builtin();
        let locks = NameLocks::default();
        let lenient = MissionSynchronizer::new(&gateway, &catalog, &locks);
        let wanted = vec![
            WantedAction::new("wait").with("time", "00:00:09"),
            WantedAction::new("relative_move").with("z", 1.0),
        ];
        lenient.sync_mission("typo", &wanted, "", 0).unwrap();
        gateway.clear_requests();

        let strict = MissionSynchronizer::new(&gateway, &catalog, &locks)
            .with_patch_mode(PatchMode::Strict);
        let err = strict.sync_mission("typo", &wanted, "", 0).unwrap_err();

        assert!(matches!(
            err,
            MirError::UnknownParameter { ref key, .. } if key == "z"
        ));
        assert_eq!(gateway.count_requests(Verb::Replace, MISSIONS), 0);
    }

    #[test]
    fn test_group_id_is_attached_to_new_missions() {
        let gateway = InMemoryGateway::new();
        let catalog = ActionCatalog::builtin();
        let locks = NameLocks::default();
        let group = GroupGuid::from("g-7");
        let sync = MissionSynchronizer::new(&gateway, &catalog, &locks).with_group(Some(&group));

        sync.sync_mission("grouped", &[WantedAction::new("wait")], "", 0)
            .unwrap();

        let mission = sync.find_mission("grouped").unwrap().unwrap();
        assert_eq!(mission.group_id, Some(group));
    }

    #[test]
    fn test_concurrent_first_sync_creates_one_mission() {
        let gateway = InMemoryGateway::new();
        let catalog = ActionCatalog::builtin();
        let locks = NameLocks::default();
        let wanted = vec![WantedAction::new("wait")];

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    MissionSynchronizer::new(&gateway, &catalog, &locks)
                        .sync_mission("shared", &wanted, "", 0)
                        .unwrap();
                });
            }
        });

        assert_eq!(gateway.missions_named("shared"), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_failed_action_create_discards_mission() {
        let gateway = InMemoryGateway::new();
        let catalog = ActionCatalog::builtin();
        let locks = NameLocks::default();
        let sync = MissionSynchronizer::new(&gateway, &catalog, &locks);
        let wanted = vec![WantedAction::new("wait"), WantedAction::new("relative_move")];

        gateway.fail_next_at(Verb::Create, "/actions", 500);
        let err = sync.sync_mission("flaky", &wanted, "", 0).unwrap_err();

        assert!(matches!(err, MirError::RemoteRejected { status: 500, .. }));
        assert_eq!(gateway.missions_named("flaky"), 0);
        assert_eq!(gateway.count_requests(Verb::Delete, MISSIONS), 1);

        let guid = sync.sync_mission("flaky", &wanted, "", 0).unwrap();
        let types: Vec<String> = fetch_actions(&gateway, &guid)
            .into_iter()
            .map(|a| a.action_type)
            .collect();
        assert_eq!(types, vec!["wait", "relative_move"]);
        assert_eq!(gateway.missions_named("flaky"), 1);
    }

    #[test]
    fn test_name_locks_release_their_entries() {
        let gateway = InMemoryGateway::new();
        let catalog = ActionCatalog::builtin();
        let locks = NameLocks::default();
        let sync = MissionSynchronizer::new(&gateway, &catalog, &locks);

        for name in ["a", "b", "c", "a"] {
            sync.sync_mission(name, &[WantedAction::new("wait")], "", 0)
                .unwrap();
        }
        assert!(locks.is_empty());

        let inside = locks.with_lock("held", || locks.len());
        assert_eq!(inside, 1);
        assert_eq!(locks.len(), 0);
    }
}
