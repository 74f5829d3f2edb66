//! Client-local preferences in `prefs.json`.
//!
//! Only a cache of the user's last choices: anything unreadable is treated as
//! empty, and a remembered plant is used only while it is still active.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::directory::Plant;
use crate::errors::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_plant_id: Option<u64>,
}

impl Prefs {
    pub fn load(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Prefs::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable preferences");
            Prefs::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(StoreError::Serialize)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }

    /// The remembered plant, if it still names an active plant.
    pub fn restore_plant(&self, plants: &[Plant]) -> Option<u64> {
        let id = self.selected_plant_id?;
        plants.iter().find(|p| p.id == id && p.is_active).map(|p| p.id)
    }
}
