//! In-process robot for tests and dry runs.
//!
//! Implements the subset of the REST object model the mission engine uses:
//! missions, mission actions, mission groups, the mission queue, status and
//! the action-type definitions. Queue ids increase monotonically and are never
//! reused. Deleting the queue (or one entry) marks entries `Aborted`, the way
//! the robot does. Each queued run carries its own copy of the mission's
//! action list, with per-action state.

use mir_protocol::defaults::{ACTIONS, MISSIONS, MISSION_GROUPS, MISSION_QUEUE, STATUS};
use mir_protocol::{QueueEntryId, QueueState, SearchRequest};
use serde_json::{json, Map, Value};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{RemoteGateway, Verb};
use crate::error::{MirError, Result};

pub const DEFAULT_GROUP_GUID: &str = "mirconst-guid-0000-0011-missiongroup";

/// A request as seen by the in-memory robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub verb: Verb,
    pub path: String,
}

#[derive(Default)]
struct Inner {
    missions: Vec<Value>,
    /// (mission guid, action record)
    actions: Vec<(String, Value)>,
    groups: Vec<Value>,
    queue: Vec<Value>,
    last_queue_id: u64,
    state_text: String,
    action_types: Vec<Value>,
    /// (queue entry id, per-action execution records)
    queue_actions: Vec<(u64, Vec<Value>)>,
    last_queue_action_id: u64,
    strip_search_mission_ids: bool,
    fail_next: Option<InjectedFailure>,
    requests: Vec<RecordedRequest>,
}

struct InjectedFailure {
    verb: Verb,
    status: u16,
    path_contains: Option<String>,
}

pub struct InMemoryGateway {
    inner: Mutex<Inner>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// A robot with one mission group, an empty queue and state `Ready`.
    pub fn new() -> Self {
        let gateway = Self::without_groups();
        gateway.add_group(DEFAULT_GROUP_GUID, "Missions");
        gateway
    }

    pub fn without_groups() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state_text: "Ready".to_string(),
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_group(&self, guid: &str, name: &str) {
        self.lock().groups.push(json!({"guid": guid, "name": name}));
    }

    /// Register a remote action-type definition (`GET actions/<type>`).
    pub fn add_action_type(&self, definition: Value) {
        self.lock().action_types.push(definition);
    }

    pub fn set_state_text(&self, text: &str) {
        self.lock().state_text = text.to_string();
    }

    /// Simulate the robot scheduler moving an entry to `state`.
    pub fn set_entry_state(&self, id: QueueEntryId, state: QueueState) -> bool {
        let mut inner = self.lock();
        match inner.queue.iter_mut().find(|e| entry_id(e) == Some(id.as_u64())) {
            Some(entry) => {
                entry["state"] = json!(state.as_str());
                true
            }
            None => false,
        }
    }

    /// Queue entry ids skip ahead, as on a robot with prior history.
    pub fn advance_queue_ids(&self, by: u64) {
        self.lock().last_queue_id += by;
    }

    /// Drop `mission_id` from queue search results, as the robot's compact
    /// search listing does.
    pub fn strip_search_mission_ids(&self, strip: bool) {
        self.lock().strip_search_mission_ids = strip;
    }

    /// The next request with `verb` fails with `status`.
    pub fn fail_next(&self, verb: Verb, status: u16) {
        self.lock().fail_next = Some(InjectedFailure {
            verb,
            status,
            path_contains: None,
        });
    }

    /// The next request with `verb` whose path contains `fragment` fails.
    pub fn fail_next_at(&self, verb: Verb, fragment: &str, status: u16) {
        self.lock().fail_next = Some(InjectedFailure {
            verb,
            status,
            path_contains: Some(fragment.to_string()),
        });
    }

    /// Simulate the robot advancing action `index` of a queued run.
    pub fn set_entry_action_state(&self, id: QueueEntryId, index: usize, state: QueueState) -> bool {
        let mut inner = self.lock();
        let action = inner
            .queue_actions
            .iter_mut()
            .find(|(entry, _)| *entry == id.as_u64())
            .and_then(|(_, actions)| actions.get_mut(index));
        match action {
            Some(action) => {
                action["state"] = json!(state.as_str());
                true
            }
            None => false,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn count_requests(&self, verb: Verb, path_prefix: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.verb == verb && r.path.starts_with(path_prefix))
            .count()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    pub fn missions_named(&self, name: &str) -> usize {
        self.lock()
            .missions
            .iter()
            .filter(|m| m.get("name").and_then(Value::as_str) == Some(name))
            .count()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Record the request and apply any pending injected failure.
    fn begin(&self, inner: &mut Inner, verb: Verb, path: &str) -> Result<()> {
        inner.requests.push(RecordedRequest {
            verb,
            path: path.to_string(),
        });
        let fires = inner.fail_next.as_ref().is_some_and(|rule| {
            rule.verb == verb
                && rule
                    .path_contains
                    .as_deref()
                    .map_or(true, |fragment| path.contains(fragment))
        });
        if fires {
            if let Some(rule) = inner.fail_next.take() {
                return Err(rejected(verb, path, rule.status, "injected failure"));
            }
        }
        Ok(())
    }
}

fn rejected(verb: Verb, path: &str, status: u16, message: &str) -> MirError {
    MirError::RemoteRejected {
        verb,
        path: path.to_string(),
        status,
        body: json!({"error_human": message}).to_string(),
    }
}

fn not_found(verb: Verb, path: &str) -> MirError {
    rejected(verb, path, 404, "not found")
}

fn entry_id(entry: &Value) -> Option<u64> {
    entry.get("id").and_then(Value::as_u64)
}

fn guid_of(record: &Value) -> Option<&str> {
    record.get("guid").and_then(Value::as_str)
}

/// Split `a/b?query` into segments, dropping the query string.
fn segments(path: &str) -> Vec<&str> {
    let path = path.split('?').next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn body_object(verb: Verb, path: &str, body: &Value) -> Result<Map<String, Value>> {
    body.as_object()
        .cloned()
        .ok_or_else(|| rejected(verb, path, 400, "body must be a JSON object"))
}

fn is_live(entry: &Value) -> bool {
    matches!(
        entry.get("state").and_then(Value::as_str),
        Some("Pending") | Some("Executing")
    )
}

impl RemoteGateway for InMemoryGateway {
    fn get(&self, path: &str) -> Result<Value> {
        let mut inner = self.lock();
        self.begin(&mut inner, Verb::Get, path)?;
        let verb = Verb::Get;

        match segments(path).as_slice() {
            [MISSIONS] => Ok(Value::Array(inner.missions.clone())),
            [MISSIONS, guid] => inner
                .missions
                .iter()
                .find(|m| guid_of(m) == Some(*guid))
                .cloned()
                .ok_or_else(|| not_found(verb, path)),
            [MISSIONS, guid, ACTIONS] => {
                if !inner.missions.iter().any(|m| guid_of(m) == Some(*guid)) {
                    return Err(not_found(verb, path));
                }
                let actions = inner
                    .actions
                    .iter()
                    .filter(|(owner, _)| owner == guid)
                    .map(|(_, action)| action.clone())
                    .collect();
                Ok(Value::Array(actions))
            }
            [MISSION_GROUPS] => Ok(Value::Array(inner.groups.clone())),
            [MISSION_QUEUE] => Ok(Value::Array(inner.queue.clone())),
            [MISSION_QUEUE, id] => {
                let id: u64 = id.parse().map_err(|_| not_found(verb, path))?;
                inner
                    .queue
                    .iter()
                    .find(|e| entry_id(e) == Some(id))
                    .cloned()
                    .ok_or_else(|| not_found(verb, path))
            }
            [MISSION_QUEUE, id, ACTIONS] => {
                let id: u64 = id.parse().map_err(|_| not_found(verb, path))?;
                inner
                    .queue_actions
                    .iter()
                    .find(|(entry, _)| *entry == id)
                    .map(|(_, actions)| Value::Array(actions.clone()))
                    .ok_or_else(|| not_found(verb, path))
            }
            [STATUS] => Ok(json!({"state_text": inner.state_text})),
            [ACTIONS] => Ok(Value::Array(inner.action_types.clone())),
            [ACTIONS, action_type] => inner
                .action_types
                .iter()
                .find(|a| a.get("action_type").and_then(Value::as_str) == Some(*action_type))
                .cloned()
                .ok_or_else(|| not_found(verb, path)),
            _ => Err(not_found(verb, path)),
        }
    }

    fn search(&self, collection: &str, request: &SearchRequest) -> Result<Value> {
        let path = format!("{}/search", collection);
        let mut inner = self.lock();
        self.begin(&mut inner, Verb::Search, &path)?;

        let records: Vec<Value> = match segments(collection).as_slice() {
            [MISSIONS] => inner
                .missions
                .iter()
                .filter(|m| request.matches(m))
                .cloned()
                .collect(),
            [MISSION_QUEUE] => inner
                .queue
                .iter()
                .filter(|e| request.matches(e))
                .map(|e| {
                    let mut e = e.clone();
                    if inner.strip_search_mission_ids {
                        if let Some(obj) = e.as_object_mut() {
                            obj.remove("mission_id");
                        }
                    }
                    e
                })
                .collect(),
            _ => return Err(not_found(Verb::Search, &path)),
        };
        Ok(Value::Array(records))
    }

    fn create(&self, collection: &str, body: &Value) -> Result<Value> {
        let verb = Verb::Create;
        let mut inner = self.lock();
        self.begin(&mut inner, verb, collection)?;
        let mut record = body_object(verb, collection, body)?;

        match segments(collection).as_slice() {
            [MISSIONS] => {
                if record.get("name").and_then(Value::as_str).is_none() {
                    return Err(rejected(verb, collection, 400, "name is required"));
                }
                record.insert("guid".to_string(), json!(Uuid::new_v4().to_string()));
                let record = Value::Object(record);
                inner.missions.push(record.clone());
                Ok(record)
            }
            [MISSIONS, guid, ACTIONS] => {
                if !inner.missions.iter().any(|m| guid_of(m) == Some(*guid)) {
                    return Err(not_found(verb, collection));
                }
                record.insert("guid".to_string(), json!(Uuid::new_v4().to_string()));
                record.insert("mission_id".to_string(), json!(guid));
                let record = Value::Object(record);
                inner.actions.push((guid.to_string(), record.clone()));
                Ok(record)
            }
            [MISSION_QUEUE] => {
                let mission_id = record
                    .get("mission_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| rejected(verb, collection, 400, "mission_id is required"))?;
                if !inner
                    .missions
                    .iter()
                    .any(|m| guid_of(m) == Some(mission_id.as_str()))
                {
                    return Err(rejected(verb, collection, 400, "unknown mission_id"));
                }
                inner.last_queue_id += 1;
                let id = inner.last_queue_id;
                record.insert("id".to_string(), json!(id));
                record.insert("state".to_string(), json!(QueueState::Pending.as_str()));
                record.entry("priority").or_insert(json!(0));
                let record = Value::Object(record);
                inner.queue.push(record.clone());

                // Each run tracks its own copy of the mission's actions.
                let action_types: Vec<Value> = inner
                    .actions
                    .iter()
                    .filter(|(owner, _)| *owner == mission_id)
                    .map(|(_, action)| action.get("action_type").cloned().unwrap_or(Value::Null))
                    .collect();
                let mut run = Vec::with_capacity(action_types.len());
                for action_type in action_types {
                    inner.last_queue_action_id += 1;
                    run.push(json!({
                        "id": inner.last_queue_action_id,
                        "action_type": action_type,
                        "state": QueueState::Pending.as_str(),
                    }));
                }
                inner.queue_actions.push((id, run));
                Ok(record)
            }
            _ => Err(not_found(verb, collection)),
        }
    }

    fn replace(&self, resource: &str, body: &Value) -> Result<Value> {
        let verb = Verb::Replace;
        let mut inner = self.lock();
        self.begin(&mut inner, verb, resource)?;
        let update = body_object(verb, resource, body)?;

        match segments(resource).as_slice() {
            [MISSIONS, mission, ACTIONS, action] => {
                let (_, record) = inner
                    .actions
                    .iter_mut()
                    .find(|(owner, a)| owner == mission && guid_of(a) == Some(*action))
                    .ok_or_else(|| not_found(verb, resource))?;
                if let Some(obj) = record.as_object_mut() {
                    for (key, value) in update {
                        obj.insert(key, value);
                    }
                }
                Ok(record.clone())
            }
            _ => Err(not_found(verb, resource)),
        }
    }

    fn delete(&self, resource: &str) -> Result<()> {
        let verb = Verb::Delete;
        let mut inner = self.lock();
        self.begin(&mut inner, verb, resource)?;

        match segments(resource).as_slice() {
            [MISSIONS, guid] => {
                let before = inner.missions.len();
                inner.missions.retain(|m| guid_of(m) != Some(*guid));
                if inner.missions.len() == before {
                    return Err(not_found(verb, resource));
                }
                inner.actions.retain(|(owner, _)| owner != guid);
                Ok(())
            }
            [MISSION_QUEUE] => {
                for entry in inner.queue.iter_mut().filter(|e| is_live(e)) {
                    entry["state"] = json!(QueueState::Aborted.as_str());
                }
                Ok(())
            }
            [MISSION_QUEUE, id] => {
                let id: u64 = id.parse().map_err(|_| not_found(verb, resource))?;
                let entry = inner
                    .queue
                    .iter_mut()
                    .find(|e| entry_id(e) == Some(id))
                    .ok_or_else(|| not_found(verb, resource))?;
                if is_live(entry) {
                    entry["state"] = json!(QueueState::Aborted.as_str());
                }
                Ok(())
            }
            _ => Err(not_found(verb, resource)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mir_protocol::SearchFilter;

    fn create_mission(gateway: &InMemoryGateway, name: &str) -> String {
        let mission = gateway
            .create(MISSIONS, &json!({"name": name, "description": ""}))
            .unwrap();
        mission["guid"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_queue_ids_increase_and_start_pending() {
        let gateway = InMemoryGateway::new();
        let guid = create_mission(&gateway, "m");
        let first = gateway
            .create(MISSION_QUEUE, &json!({"mission_id": guid, "priority": 0}))
            .unwrap();
        let second = gateway
            .create(MISSION_QUEUE, &json!({"mission_id": guid}))
            .unwrap();
        assert_eq!(first["state"], "Pending");
        assert!(second["id"].as_u64().unwrap() > first["id"].as_u64().unwrap());
    }

    #[test]
    fn test_search_filters_and_strips_mission_ids() {
        let gateway = InMemoryGateway::new();
        let guid = create_mission(&gateway, "m");
        for _ in 0..3 {
            gateway
                .create(MISSION_QUEUE, &json!({"mission_id": guid}))
                .unwrap();
        }
        gateway.strip_search_mission_ids(true);
        let request = SearchRequest::new(vec![SearchFilter::id_after(QueueEntryId::new(1))]);
        let found = gateway.search(MISSION_QUEUE, &request).unwrap();
        let found = found.as_array().unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|e| e.get("mission_id").is_none()));
    }

    #[test]
    fn test_delete_queue_aborts_only_live_entries() {
        let gateway = InMemoryGateway::new();
        let guid = create_mission(&gateway, "m");
        for _ in 0..3 {
            gateway
                .create(MISSION_QUEUE, &json!({"mission_id": guid}))
                .unwrap();
        }
        gateway.set_entry_state(QueueEntryId::new(1), QueueState::Done);
        gateway.set_entry_state(QueueEntryId::new(2), QueueState::Executing);
        gateway.delete(MISSION_QUEUE).unwrap();

        let queue = gateway.get(MISSION_QUEUE).unwrap();
        let states: Vec<&str> = queue
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["state"].as_str().unwrap())
            .collect();
        assert_eq!(states, vec!["Done", "Aborted", "Aborted"]);
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(Verb::Get, 503);
        let err = gateway.get(MISSIONS).unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(gateway.get(MISSIONS).is_ok());
        assert_eq!(gateway.count_requests(Verb::Get, MISSIONS), 2);
    }

    #[test]
    fn test_queued_run_tracks_its_own_actions() {
        let gateway = InMemoryGateway::new();
        let guid = create_mission(&gateway, "m");
        for action_type in ["move", "wait"] {
            gateway
                .create(
                    &format!("missions/{}/actions", guid),
                    &json!({"action_type": action_type, "parameters": []}),
                )
                .unwrap();
        }
        let entry = gateway
            .create(MISSION_QUEUE, &json!({"mission_id": guid}))
            .unwrap();
        let id = QueueEntryId::new(entry["id"].as_u64().unwrap());

        assert!(gateway.set_entry_action_state(id, 1, QueueState::Executing));
        assert!(!gateway.set_entry_action_state(id, 2, QueueState::Done));

        let actions = gateway.get(&format!("mission_queue/{}/actions", id)).unwrap();
        let states: Vec<(&str, &str)> = actions
            .as_array()
            .unwrap()
            .iter()
            .map(|a| (a["action_type"].as_str().unwrap(), a["state"].as_str().unwrap()))
            .collect();
        assert_eq!(states, vec![("move", "Pending"), ("wait", "Executing")]);
    }

    #[test]
    fn test_delete_mission_removes_its_actions() {
        let gateway = InMemoryGateway::new();
        let guid = create_mission(&gateway, "m");
        let actions = format!("missions/{}/actions", guid);
        gateway
            .create(&actions, &json!({"action_type": "wait", "parameters": []}))
            .unwrap();

        gateway.delete(&format!("missions/{}", guid)).unwrap();

        assert_eq!(gateway.missions_named("m"), 0);
        assert_eq!(gateway.get(&actions).unwrap_err().status(), Some(404));
        assert_eq!(
            gateway.delete(&format!("missions/{}", guid)).unwrap_err().status(),
            Some(404)
        );
    }

    #[test]
    fn test_path_scoped_failure_skips_other_paths() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next_at(Verb::Create, "/actions", 500);
        let guid = create_mission(&gateway, "m");

        let err = gateway
            .create(&format!("missions/{}/actions", guid), &json!({"action_type": "wait"}))
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_unknown_paths_are_not_found() {
        let gateway = InMemoryGateway::new();
        assert_eq!(gateway.get("maps").unwrap_err().status(), Some(404));
        assert_eq!(
            gateway
                .create("missions/nope/actions", &json!({"action_type": "wait"}))
                .unwrap_err()
                .status(),
            Some(404)
        );
    }
}
