//! Command-line surface of the node.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mir_mission::{MirConfig, PatchMode, WantedAction};
use mir_protocol::defaults::{
    DEFAULT_API_PREFIX, DEFAULT_LOCATIONS_FILE, DEFAULT_MAP_NAME, DEFAULT_MIR_HOST,
    DEFAULT_QUEUE_PRIORITY, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use mir_protocol::{GroupGuid, QueueEntryId};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mir-node", about = "Mission dispatch for MiR mobile robots")]
pub struct Cli {
    /// Robot hostname or IP
    #[arg(long, env = "MIR_HOST", default_value = DEFAULT_MIR_HOST, global = true)]
    pub host: String,

    /// Authorization header value (e.g. "Basic ...")
    #[arg(long, env = "MIR_AUTH", hide_env_values = true, global = true)]
    pub auth: Option<String>,

    #[arg(long, default_value = DEFAULT_API_PREFIX, global = true)]
    pub api_prefix: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,

    /// Map used to resolve named locations
    #[arg(long, env = "MIR_MAP", default_value = DEFAULT_MAP_NAME, global = true)]
    pub map: String,

    /// Mission group for new missions (default: the robot's first group)
    #[arg(long, env = "MIR_GROUP_ID", global = true)]
    pub group_id: Option<String>,

    /// Waypoint book, `{map: {location: {guid, ...}}}`
    #[arg(long, env = "MIR_LOCATIONS", default_value = DEFAULT_LOCATIONS_FILE, global = true)]
    pub locations: PathBuf,

    /// Action catalog replacing the built-in defaults
    #[arg(long, env = "MIR_CATALOG", global = true)]
    pub catalog: Option<PathBuf>,

    /// Fail on override keys that match no parameter slot
    #[arg(long, env = "MIR_STRICT_PARAMS", global = true)]
    pub strict_params: bool,

    /// Mirror debug logs on stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Only errors on stderr
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where a mission's actions come from.
#[derive(clap::Args, Debug, Clone)]
pub struct ActionsArg {
    /// Actions as JSON, e.g. '[{"wait": {"time": "00:00:10"}}]'
    #[arg(long, conflicts_with = "actions_file")]
    pub actions: Option<String>,

    /// File holding the actions JSON
    #[arg(long)]
    pub actions_file: Option<PathBuf>,
}

impl ActionsArg {
    pub fn load(&self) -> Result<Vec<WantedAction>> {
        let json = match (&self.actions, &self.actions_file) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => anyhow::bail!("one of --actions or --actions-file is required"),
        };
        Ok(WantedAction::parse_list_str(&json)?)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or update a named mission without queueing it
    Sync {
        name: String,
        #[command(flatten)]
        actions: ActionsArg,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = DEFAULT_QUEUE_PRIORITY)]
        priority: i64,
    },

    /// Create or update a named mission, then queue it
    Run {
        name: String,
        #[command(flatten)]
        actions: ActionsArg,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = DEFAULT_QUEUE_PRIORITY)]
        priority: i64,
    },

    /// List queue entries after the checkpoint
    Queue {
        /// Checkpoint override. Defaults to the saved checkpoint, which the
        /// first invocation sets to the queue tail.
        #[arg(long)]
        since: Option<u64>,
    },

    /// Abort every pending and executing mission on the robot
    Abort {
        /// Required: this also aborts missions queued by other clients
        #[arg(long)]
        yes: bool,
    },

    /// Show queue progress since the checkpoint
    Progress {
        #[arg(long)]
        since: Option<u64>,
        /// Print JSON instead of a progress bar
        #[arg(long)]
        json: bool,
    },

    /// Poll progress until the queue drains
    Watch {
        #[arg(long)]
        since: Option<u64>,
        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },

    /// Move the checkpoint to the current queue tail and save it
    ResetCheckpoint,

    /// Show a mission's queued run and its actions
    Find {
        name: String,
        #[arg(long)]
        since: Option<u64>,
    },

    /// Abort the queued run of a named mission
    Cancel {
        name: String,
        #[arg(long)]
        since: Option<u64>,
    },

    /// Print the robot state (Idle, Executing, Error)
    State,

    /// List named missions on the robot
    Missions,

    /// Drive to a named location
    Move {
        location: String,
        #[arg(long, default_value_t = DEFAULT_QUEUE_PRIORITY)]
        priority: i64,
    },

    /// Dock at a named marker
    Dock {
        location: String,
        #[arg(long, default_value_t = DEFAULT_QUEUE_PRIORITY)]
        priority: i64,
    },

    /// Queue a wait mission
    Wait {
        /// Seconds to wait (fractions allowed)
        seconds: f64,
        #[arg(long, default_value_t = DEFAULT_QUEUE_PRIORITY)]
        priority: i64,
    },

    /// Show the robot's action-type definitions
    ActionTypes {
        /// One action type instead of the full listing
        action_type: Option<String>,
    },
}

impl Cli {
    pub fn to_config(&self) -> Result<MirConfig> {
        let config = MirConfig {
            host: self.host.clone(),
            api_prefix: self.api_prefix.clone(),
            auth: self.auth.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            map_name: self.map.clone(),
            group_id: self
                .group_id
                .as_deref()
                .map(GroupGuid::parse)
                .transpose()?,
            locations_file: self.locations.clone(),
            patch_mode: if self.strict_params {
                PatchMode::Strict
            } else {
                PatchMode::Lenient
            },
            catalog_file: self.catalog.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

pub fn since_arg(since: Option<u64>) -> Option<QueueEntryId> {
    since.map(QueueEntryId::new)
}

pub fn wait_duration(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| anyhow::anyhow!("invalid wait time {}: {}", seconds, e))
}
