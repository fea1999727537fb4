//! Canonical default values shared by the mission engine and the node binary.

pub const DEFAULT_MIR_HOST: &str = "mirbase2.cels.anl.gov";
pub const DEFAULT_API_PREFIX: &str = "api/v2.0.0";
pub const DEFAULT_MAP_NAME: &str = "RPL";
pub const DEFAULT_LOCATIONS_FILE: &str = "locations.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUEUE_PRIORITY: i64 = 0;

/// Resource collection names on the robot.
pub const MISSIONS: &str = "missions";
pub const MISSION_GROUPS: &str = "mission_groups";
pub const MISSION_QUEUE: &str = "mission_queue";
pub const ACTIONS: &str = "actions";
pub const STATUS: &str = "status";
