//! Mission engine for MiR mobile robots.
//!
//! Translates named, idempotent missions (ordered lists of parameterized
//! actions) into the robot's mission/action/queue object model and reports
//! execution progress against the mission queue.
//!
//! Every remote interaction is a blocking request/response round trip. Nothing
//! is retried: a failed call surfaces immediately and the caller decides.

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod progress;
pub mod session;
pub mod synchronizer;
pub mod waypoints;

pub use catalog::{ActionCatalog, ActionTypeDescriptor};
pub use config::MirConfig;
pub use dispatcher::{QueueDispatcher, SessionCheckpoint};
pub use error::{MirError, Result};
pub use gateway::http::HttpGateway;
pub use gateway::memory::InMemoryGateway;
pub use gateway::{GatewayExt, RemoteGateway, Verb};
pub use progress::{Progress, ProgressSnapshot, ProgressTracker};
pub use session::{MirSession, MissionInQueue, SessionOptions};
pub use synchronizer::{MissionSynchronizer, NameLocks, PatchMode, WantedAction};
pub use waypoints::WaypointBook;
