//! Subcommand execution against an open session.

use anyhow::{Context, Result};
use mir_mission::{MirSession, Progress, RemoteGateway};
use mir_protocol::QueueEntryId;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cli::{since_arg, wait_duration, Command};

const CHECKPOINT_FILE: &str = "checkpoint";
const PROGRESS_BAR_WIDTH: usize = 40;

/// Saved queue checkpoint, shared by successive invocations.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CHECKPOINT_FILE),
        }
    }

    pub fn load(&self) -> Result<Option<QueueEntryId>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let id = text
            .trim()
            .parse::<QueueEntryId>()
            .with_context(|| format!("corrupt checkpoint in {}", self.path.display()))?;
        Ok(Some(id))
    }

    /// The saved checkpoint, saving `initial` first when nothing is saved yet.
    pub fn load_or_init(&self, initial: QueueEntryId) -> Result<QueueEntryId> {
        match self.load()? {
            Some(id) => Ok(id),
            None => {
                self.save(initial)?;
                info!("Saved initial queue checkpoint {}", initial);
                Ok(initial)
            }
        }
    }

    pub fn save(&self, id: QueueEntryId) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, format!("{}\n", id))
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Explicit `--since` wins; otherwise the saved checkpoint. The first
/// invocation saves the tail its session opened at, so missions queued by
/// later invocations stay in scope.
fn adopt_checkpoint<G: RemoteGateway>(
    session: &MirSession<G>,
    store: &CheckpointStore,
    since: Option<u64>,
) -> Result<()> {
    let checkpoint = match since_arg(since) {
        Some(id) => id,
        None => store.load_or_init(session.checkpoint())?,
    };
    session.set_checkpoint(checkpoint);
    Ok(())
}

pub fn execute<G: RemoteGateway>(
    session: &MirSession<G>,
    store: &CheckpointStore,
    command: Command,
) -> Result<()> {
    store.load_or_init(session.checkpoint())?;

    match command {
        Command::Sync {
            name,
            actions,
            description,
            priority,
        } => {
            let wanted = actions.load()?;
            let guid = session.sync_mission(&name, &wanted, &description, priority)?;
            println!("{}", guid);
        }

        Command::Run {
            name,
            actions,
            description,
            priority,
        } => {
            let wanted = actions.load()?;
            let entry = session.sync_and_enqueue(&name, &wanted, &description, priority)?;
            info!("Queued '{}' as entry {}", name, entry.id);
            print_json(&entry)?;
        }

        Command::Queue { since } => {
            adopt_checkpoint(session, store, since)?;
            print_json(&session.queue_since_checkpoint()?)?;
        }

        Command::Abort { yes } => {
            if !yes {
                anyhow::bail!(
                    "abort clears the whole robot queue, including missions queued by other clients; pass --yes"
                );
            }
            session.abort_all()?;
            println!("Mission queue aborted.");
        }

        Command::Progress { since, json } => {
            adopt_checkpoint(session, store, since)?;
            let progress = session.current_progress()?;
            if json {
                print_json(&progress)?;
            } else {
                println!("{}", progress.render(PROGRESS_BAR_WIDTH));
            }
        }

        Command::Watch {
            since,
            interval_secs,
            timeout_secs,
        } => {
            adopt_checkpoint(session, store, since)?;
            watch(
                session,
                Duration::from_secs(interval_secs.max(1)),
                Duration::from_secs(timeout_secs),
            )?;
        }

        Command::ResetCheckpoint => {
            let id = session.reset_checkpoint()?;
            store.save(id)?;
            println!("{}", id);
        }

        Command::Find { name, since } => {
            adopt_checkpoint(session, store, since)?;
            match session.find_mission_in_queue(&name)? {
                Some(found) => print_json(&found)?,
                None => println!("Mission '{}' not found in queue.", name),
            }
        }

        Command::Cancel { name, since } => {
            adopt_checkpoint(session, store, since)?;
            match session.cancel_mission_in_queue(&name)? {
                Some(id) => println!("Cancelled queue entry {}", id),
                None => println!("Mission '{}' not found in queue.", name),
            }
        }

        Command::State => {
            println!("{}", session.robot_state()?);
        }

        Command::Missions => {
            print_json(&session.list_missions()?)?;
        }

        Command::Move { location, priority } => {
            print_json(&session.move_to(&location, priority)?)?;
        }

        Command::Dock { location, priority } => {
            print_json(&session.dock_at(&location, priority)?)?;
        }

        Command::Wait { seconds, priority } => {
            print_json(&session.wait_for(wait_duration(seconds)?, priority)?)?;
        }

        Command::ActionTypes { action_type } => {
            let listing: Value = match action_type {
                Some(action_type) => session.remote_action_type(&action_type)?,
                None => session.remote_action_types()?,
            };
            print_json(&listing)?;
        }
    }
    Ok(())
}

/// Render progress every `interval` until nothing is pending or executing.
/// Failed polls are logged and retried until `timeout`.
fn watch<G: RemoteGateway>(
    session: &MirSession<G>,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let started = Instant::now();
    loop {
        match session.current_progress() {
            Ok(Progress::QueueEmpty) => {
                println!("{}", Progress::QueueEmpty.render(PROGRESS_BAR_WIDTH));
                return Ok(());
            }
            Ok(progress) => {
                println!("{}", progress.render(PROGRESS_BAR_WIDTH));
                if let Progress::Snapshot(snapshot) = &progress {
                    if snapshot.is_idle() && snapshot.pending == 0 {
                        return Ok(());
                    }
                }
            }
            Err(e) if e.is_remote() => warn!("Progress poll failed: {}", e),
            Err(e) => return Err(e.into()),
        }

        if started.elapsed() >= timeout {
            anyhow::bail!("queue still running after {}s", timeout.as_secs());
        }
        std::thread::sleep(interval);
    }
}
