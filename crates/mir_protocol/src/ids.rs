//! Identifier wrappers for robot-assigned records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Opaque guid assigned by the robot. Never generated locally except by test
/// doubles, so no format is enforced beyond non-emptiness.
macro_rules! define_guid {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(value: &str) -> Result<Self> {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ProtocolError::EmptyId($label));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_guid!(MissionGuid, "mission guid");
define_guid!(ActionGuid, "action guid");
define_guid!(GroupGuid, "mission group guid");

/// Mission-queue entry id. Assigned by the robot, monotonically increasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct QueueEntryId(u64);

impl QueueEntryId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for QueueEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for QueueEntryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<QueueEntryId> for u64 {
    fn from(value: QueueEntryId) -> Self {
        value.0
    }
}

impl TryFrom<i64> for QueueEntryId {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self> {
        if value < 0 {
            return Err(ProtocolError::NegativeQueueEntryId(value));
        }
        Ok(QueueEntryId::new(value as u64))
    }
}

impl std::str::FromStr for QueueEntryId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidQueueEntryId(s.to_string()))?;
        Ok(QueueEntryId::new(value))
    }
}
