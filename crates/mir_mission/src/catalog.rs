//! Action Parameter Catalog
//!
//! Maps an action-type name to its canonical ordered parameter list with the
//! system defaults. New action types are added here (or in a catalog file),
//! never by changing synchronizer logic.

use mir_protocol::ParameterSlot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{MirError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTypeDescriptor {
    pub action_type: String,
    pub parameters: Vec<ParameterSlot>,
}

impl ActionTypeDescriptor {
    pub fn new(action_type: impl Into<String>, parameters: Vec<ParameterSlot>) -> Self {
        Self {
            action_type: action_type.into(),
            parameters,
        }
    }
}

/// Immutable once built; shared behind an `Arc` by sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionCatalog {
    descriptors: BTreeMap<String, ActionTypeDescriptor>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. A later descriptor replaces an earlier one.
    pub fn with(mut self, descriptor: ActionTypeDescriptor) -> Self {
        self.descriptors
            .insert(descriptor.action_type.clone(), descriptor);
        self
    }

    /// Defaults for the action types the node drives on a MiR 250.
    pub fn builtin() -> Self {
        Self::new()
            .with(ActionTypeDescriptor::new(
                "relative_move",
                vec![
                    ParameterSlot::new("x", 0.0),
                    ParameterSlot::new("y", 0.0),
                    ParameterSlot::new("orientation", 0.0),
                    ParameterSlot::new("max_linear_speed", 0.25),
                    ParameterSlot::new("max_angular_speed", 0.25),
                    ParameterSlot::new("collision_detection", true),
                ],
            ))
            .with(ActionTypeDescriptor::new(
                "move_to_position",
                vec![
                    ParameterSlot::new("x", 0.0),
                    ParameterSlot::new("y", 0.0),
                    ParameterSlot::new("orientation", 0.0),
                    ParameterSlot::new("retries", 10),
                    ParameterSlot::new("distance_threshold", 0.1),
                ],
            ))
            .with(ActionTypeDescriptor::new(
                "move",
                vec![
                    ParameterSlot::new("position", "b34d6e54-5670-11ef-a572-0001297b4d50")
                        .with_name("another_move"),
                    ParameterSlot::new("cart_entry_position", "main").with_name("Main"),
                    ParameterSlot::new("main_or_entry_position", "main").with_name("Main"),
                    ParameterSlot::new("marker_entry_position", "entry").with_name("Entry"),
                    ParameterSlot::new("retries", 10),
                    ParameterSlot::new("distance_threshold", 0.1),
                ],
            ))
            .with(ActionTypeDescriptor::new(
                "docking",
                vec![
                    ParameterSlot::new("marker", "4ccacd0d-7f46-11ee-8521-0001297b4d50")
                        .with_name("camera_marker"),
                    ParameterSlot::new("marker_type", "mirconst-guid-0000-0001-marker000001")
                        .with_name("Narrow asymmetric MiR500/1000 shelf"),
                    ParameterSlot::new("retries", 10),
                    ParameterSlot::new("max_linear_speed", 0.3),
                ],
            ))
            .with(ActionTypeDescriptor::new(
                "wait",
                vec![ParameterSlot::new("time", "00:00:05.000000")],
            ))
    }

    /// Parse a catalog file: a JSON array of descriptors.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let descriptors: Vec<ActionTypeDescriptor> =
            serde_json::from_str(json).map_err(|e| MirError::Catalog(e.to_string()))?;

        let mut catalog = Self::new();
        for descriptor in descriptors {
            if descriptor.action_type.trim().is_empty() {
                return Err(MirError::Catalog("action_type cannot be empty".to_string()));
            }
            if catalog.descriptors.contains_key(&descriptor.action_type) {
                return Err(MirError::Catalog(format!(
                    "duplicate action type '{}'",
                    descriptor.action_type
                )));
            }
            catalog = catalog.with(descriptor);
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| MirError::Catalog(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, action_type: &str) -> Option<&ActionTypeDescriptor> {
        self.descriptors.get(action_type)
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.descriptors.contains_key(action_type)
    }

    /// A fresh copy of the default slot list for `action_type`.
    pub fn template(&self, action_type: &str) -> Result<Vec<ParameterSlot>> {
        self.get(action_type)
            .map(|d| d.parameters.clone())
            .ok_or_else(|| MirError::UnknownActionType(action_type.to_string()))
    }

    pub fn action_types(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
