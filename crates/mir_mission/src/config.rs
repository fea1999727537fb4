//! Node configuration for talking to one robot.

use mir_protocol::defaults::{
    DEFAULT_API_PREFIX, DEFAULT_LOCATIONS_FILE, DEFAULT_MAP_NAME, DEFAULT_MIR_HOST,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use mir_protocol::GroupGuid;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::ActionCatalog;
use crate::error::{MirError, Result};
use crate::session::SessionOptions;
use crate::synchronizer::PatchMode;

/// Canonical configuration used by the node binary and session setup.
#[derive(Debug, Clone)]
pub struct MirConfig {
    /// Robot hostname or IP, optionally with an `http://` / `https://` scheme
    pub host: String,
    /// REST API root below the host
    pub api_prefix: String,
    /// Value of the `Authorization` header (e.g. `Basic ...`)
    pub auth: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Map whose waypoints `move_to`/`dock_at` resolve against
    pub map_name: String,
    /// Mission group for new missions; the robot's first group when unset
    pub group_id: Option<GroupGuid>,
    /// Waypoint book (JSON)
    pub locations_file: PathBuf,
    pub patch_mode: PatchMode,
    /// Replaces the built-in action catalog when set
    pub catalog_file: Option<PathBuf>,
}

impl Default for MirConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MIR_HOST.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            auth: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            map_name: DEFAULT_MAP_NAME.to_string(),
            group_id: None,
            locations_file: PathBuf::from(DEFAULT_LOCATIONS_FILE),
            patch_mode: PatchMode::Lenient,
            catalog_file: None,
        }
    }
}

impl MirConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MirError::Config("host cannot be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(MirError::Config("timeout must be positive".to_string()));
        }
        if self.map_name.trim().is_empty() {
            return Err(MirError::Config("map name cannot be empty".to_string()));
        }
        Ok(())
    }

    /// `http://<host>/<api_prefix>/`, always with a trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        let prefix = self.api_prefix.trim().trim_matches('/');
        if prefix.is_empty() {
            format!("{}/", host)
        } else {
            format!("{}/{}/", host, prefix)
        }
    }

    /// The built-in catalog, or the one in `catalog_file`.
    pub fn load_catalog(&self) -> Result<ActionCatalog> {
        match &self.catalog_file {
            Some(path) => ActionCatalog::load(path),
            None => Ok(ActionCatalog::builtin()),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            group_id: self.group_id.clone(),
            patch_mode: self.patch_mode,
            map_name: self.map_name.clone(),
            locations_file: Some(self.locations_file.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_forms() {
        let mut config = MirConfig {
            host: "10.0.0.5".to_string(),
            ..MirConfig::default()
        };
        assert_eq!(config.base_url(), "http://10.0.0.5/api/v2.0.0/");

        config.host = "https://mir.local/".to_string();
        config.api_prefix = "/api/v2.0.0/".to_string();
        assert_eq!(config.base_url(), "https://mir.local/api/v2.0.0/");
    }

    #[test]
    fn test_validate_rejects_blank_host() {
        let config = MirConfig {
            host: "  ".to_string(),
            ..MirConfig::default()
        };
        assert!(matches!(config.validate(), Err(MirError::Config(_))));
        assert!(MirConfig::default().validate().is_ok());
    }
}
