//! Queue Dispatcher
//!
//! Enqueues synchronized missions and answers "what is new since the last
//! checkpoint" queries against the robot's mission queue.

use mir_protocol::defaults::{ACTIONS, MISSION_QUEUE};
use mir_protocol::{
    MissionGuid, NewQueueEntry, QueueActionRecord, QueueEntry, QueueEntryId, SearchFilter,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::gateway::{GatewayExt, RemoteGateway};

/// Highest queue-entry id already accounted for by this session.
#[derive(Debug, Default)]
pub struct SessionCheckpoint {
    value: AtomicU64,
}

impl SessionCheckpoint {
    pub fn new(id: QueueEntryId) -> Self {
        Self {
            value: AtomicU64::new(id.as_u64()),
        }
    }

    pub fn get(&self) -> QueueEntryId {
        QueueEntryId::new(self.value.load(Ordering::SeqCst))
    }

    pub fn set(&self, id: QueueEntryId) {
        self.value.store(id.as_u64(), Ordering::SeqCst);
    }
}

pub struct QueueDispatcher<'a, G: ?Sized> {
    gateway: &'a G,
}

impl<'a, G: RemoteGateway + ?Sized> QueueDispatcher<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Single create call; never retried, since the robot has no enqueue
    /// idempotency key and a retry could run the mission twice.
    pub fn enqueue(&self, mission_id: &MissionGuid, priority: i64) -> Result<QueueEntry> {
        let entry: QueueEntry = self.gateway.create_as(
            MISSION_QUEUE,
            &NewQueueEntry {
                mission_id: mission_id.clone(),
                priority,
            },
        )?;
        info!(
            "Queued mission {} as entry {} (priority {})",
            mission_id, entry.id, priority
        );
        Ok(entry)
    }

    /// Entries with `id > checkpoint`, in remote order. Empty means nothing
    /// happened since the checkpoint.
    pub fn queue_since(&self, checkpoint: QueueEntryId) -> Result<Vec<QueueEntry>> {
        let entries: Vec<QueueEntry> = self
            .gateway
            .search_as(MISSION_QUEUE, vec![SearchFilter::id_after(checkpoint)])?;
        debug!("{} queue entries after {}", entries.len(), checkpoint);
        Ok(entries)
    }

    /// Entries after `checkpoint` that run `mission_id`.
    pub fn entries_for_mission(
        &self,
        mission_id: &MissionGuid,
        checkpoint: QueueEntryId,
    ) -> Result<Vec<QueueEntry>> {
        self.gateway.search_as(
            MISSION_QUEUE,
            vec![
                SearchFilter::mission_is(mission_id),
                SearchFilter::id_after(checkpoint),
            ],
        )
    }

    pub fn entry(&self, id: QueueEntryId) -> Result<QueueEntry> {
        self.gateway.get_as(&format!("{}/{}", MISSION_QUEUE, id))
    }

    /// Per-action execution state of one queued run.
    pub fn entry_actions(&self, id: QueueEntryId) -> Result<Vec<QueueActionRecord>> {
        self.gateway
            .get_as(&format!("{}/{}/{}", MISSION_QUEUE, id, ACTIONS))
    }

    /// Abort every pending and executing entry on the robot.
    ///
    /// This is global: entries queued by other clients are aborted too.
    pub fn abort_all(&self) -> Result<()> {
        warn!("Aborting the entire mission queue");
        self.gateway.delete(MISSION_QUEUE)
    }

    /// Abort a single queue entry.
    pub fn cancel(&self, id: QueueEntryId) -> Result<()> {
        self.gateway.delete(&format!("{}/{}", MISSION_QUEUE, id))?;
        info!("Cancelled queue entry {}", id);
        Ok(())
    }

    /// Highest id currently in the queue, or 0 for an empty queue.
    pub fn tail_id(&self) -> Result<QueueEntryId> {
        let entries: Vec<QueueEntry> = self.gateway.get_as(MISSION_QUEUE)?;
        Ok(entries
            .iter()
            .map(|e| e.id)
            .max()
            .unwrap_or_default())
    }

    /// Adopt the current tail id as the new baseline. Remote state is untouched.
    pub fn reset_checkpoint(&self, checkpoint: &SessionCheckpoint) -> Result<QueueEntryId> {
        let tail = self.tail_id()?;
        checkpoint.set(tail);
        info!("Queue checkpoint reset to {}", tail);
        Ok(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::InMemoryGateway;
    use crate::gateway::Verb;
    use mir_protocol::QueueState;
    use serde_json::json;

    fn mission(gateway: &InMemoryGateway, name: &str) -> MissionGuid {
        let record = gateway
            .create("missions", &json!({"name": name, "description": ""}))
            .unwrap();
        MissionGuid::from(record["guid"].as_str().unwrap())
    }

    #[test]
    fn test_enqueue_returns_pending_entry_with_fresh_id() {
        let gateway = InMemoryGateway::new();
        let guid = mission(&gateway, "m");
        let dispatcher = QueueDispatcher::new(&gateway);

        let first = dispatcher.enqueue(&guid, 0).unwrap();
        let second = dispatcher.enqueue(&guid, 3).unwrap();

        assert_eq!(first.state, QueueState::Pending);
        assert_eq!(first.mission_id.as_ref(), Some(&guid));
        assert!(second.id > first.id);
        assert_eq!(second.priority, 3);
    }

    #[test]
    fn test_enqueue_failure_is_not_retried() {
        let gateway = InMemoryGateway::new();
        let guid = mission(&gateway, "m");
        gateway.fail_next(Verb::Create, 500);

        let err = QueueDispatcher::new(&gateway).enqueue(&guid, 0).unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(gateway.count_requests(Verb::Create, MISSION_QUEUE), 1);
        assert_eq!(gateway.queue_len(), 0);
    }

    #[test]
    fn test_tail_id_of_empty_queue_is_zero() {
        let gateway = InMemoryGateway::new();
        assert_eq!(
            QueueDispatcher::new(&gateway).tail_id().unwrap(),
            QueueEntryId::new(0)
        );
    }

    #[test]
    fn test_reset_checkpoint_hides_history() {
        let gateway = InMemoryGateway::new();
        let guid = mission(&gateway, "m");
        let dispatcher = QueueDispatcher::new(&gateway);
        let checkpoint = SessionCheckpoint::default();
        dispatcher.enqueue(&guid, 0).unwrap();
        dispatcher.enqueue(&guid, 0).unwrap();
        assert_eq!(dispatcher.queue_since(checkpoint.get()).unwrap().len(), 2);

        let k = dispatcher.reset_checkpoint(&checkpoint).unwrap();

        assert_eq!(k, QueueEntryId::new(2));
        assert_eq!(checkpoint.get(), k);
        assert!(dispatcher.queue_since(k).unwrap().is_empty());
        assert_eq!(gateway.queue_len(), 2);
    }

    #[test]
    fn test_cancel_aborts_one_entry() {
        let gateway = InMemoryGateway::new();
        let guid = mission(&gateway, "m");
        let dispatcher = QueueDispatcher::new(&gateway);
        let keep = dispatcher.enqueue(&guid, 0).unwrap();
        let drop = dispatcher.enqueue(&guid, 0).unwrap();

        dispatcher.cancel(drop.id).unwrap();

        assert_eq!(dispatcher.entry(drop.id).unwrap().state, QueueState::Aborted);
        assert_eq!(dispatcher.entry(keep.id).unwrap().state, QueueState::Pending);
        assert_eq!(
            dispatcher
                .entries_for_mission(&guid, QueueEntryId::new(0))
                .unwrap()
                .len(),
            2
        );
    }
}
