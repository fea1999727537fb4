//! Waypoint Book
//!
//! Read-only lookup of named positions, produced by the map bootstrap as
//! `{ "<map>": { "<location>": { "guid": ..., "pos_x": ..., ... } } }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MirError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub guid: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaypointBook {
    path: PathBuf,
    maps: BTreeMap<String, BTreeMap<String, Waypoint>>,
}

impl WaypointBook {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| MirError::Waypoints {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json_str(path, &json)
    }

    pub fn from_json_str(path: &Path, json: &str) -> Result<Self> {
        let maps = serde_json::from_str(json).map_err(|e| MirError::Waypoints {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            maps,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, map: &str, location: &str) -> Result<&Waypoint> {
        self.maps
            .get(map)
            .and_then(|locations| locations.get(location))
            .ok_or_else(|| MirError::UnknownWaypoint {
                map: map.to_string(),
                location: location.to_string(),
            })
    }

    pub fn guid(&self, map: &str, location: &str) -> Result<&str> {
        self.get(map, location).map(|w| w.guid.as_str())
    }

    pub fn locations(&self, map: &str) -> Vec<&str> {
        self.maps
            .get(map)
            .map(|locations| locations.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BOOK: &str = r#"{
        "RPL": {
            "charger1": {"guid": "f0908191-7f46", "pos_x": 12.5, "pos_y": 3.0, "orientation": 90.0},
            "test_pos": {"guid": "d99494c0-54d5", "pos_x": 1.0, "pos_y": 2.0}
        }
    }"#;

    #[test]
    fn test_load_and_lookup() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(BOOK.as_bytes()).unwrap();

        let book = WaypointBook::load(file.path()).unwrap();

        assert_eq!(book.guid("RPL", "charger1").unwrap(), "f0908191-7f46");
        assert_eq!(book.locations("RPL"), vec!["charger1", "test_pos"]);
        assert!(book.locations("other").is_empty());
        assert_eq!(
            book.get("RPL", "charger1").unwrap().extra.get("pos_x"),
            Some(&serde_json::json!(12.5))
        );
    }

    #[test]
    fn test_missing_location_and_file() {
        let book = WaypointBook::from_json_str(Path::new("mem.json"), BOOK).unwrap();
        assert!(matches!(
            book.guid("RPL", "kitchen"),
            Err(MirError::UnknownWaypoint { .. })
        ));
        assert!(matches!(
            WaypointBook::load(Path::new("/nonexistent/locations.json")),
            Err(MirError::Waypoints { .. })
        ));
    }
}
