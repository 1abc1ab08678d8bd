//! `enabled_mods.json` management
//!
//! The game reads `{"enabledMods": [id, ...]}` from the mods directory.
//! Writes are atomic.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::write_atomic;
use super::scan::scan_installed_mods;
use crate::paths::ENABLED_MODS_FILE;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledMods {
    #[serde(rename = "enabledMods", default)]
    pub enabled_mods: Vec<String>,
}

/// Read the enabled list. Missing or unparseable files give an empty list.
pub fn read_enabled_mods(mods_dir: &Path) -> EnabledMods {
    let path = mods_dir.join(ENABLED_MODS_FILE);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return EnabledMods::default();
    };
    match serde_json::from_str(&content) {
        Ok(enabled) => enabled,
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            EnabledMods::default()
        }
    }
}

/// Write `ids` to `enabled_mods.json`.
///
/// With `merge`, ids already enabled are kept first and new ids appended.
/// Duplicates are dropped, keeping first occurrence. Returns the final list.
pub fn update_enabled_mods(mods_dir: &Path, ids: &[String], merge: bool) -> Result<Vec<String>> {
    let mut list: Vec<String> = if merge {
        read_enabled_mods(mods_dir).enabled_mods
    } else {
        Vec::new()
    };

    for id in ids {
        if !list.contains(id) {
            list.push(id.clone());
        }
    }

    let enabled = EnabledMods {
        enabled_mods: list,
    };
    let content =
        serde_json::to_string_pretty(&enabled).context("Failed to serialize enabled mods")?;
    write_atomic(
        &mods_dir.join(ENABLED_MODS_FILE),
        content.as_bytes(),
        ".tmp_enabled_mods_",
    )?;

    Ok(enabled.enabled_mods)
}

/// Enable every installed mod, replacing the current list.
///
/// Uses manifest ids, falling back to folder names. Fails when nothing is
/// installed rather than writing an empty list.
pub fn enable_all_installed(mods_dir: &Path) -> Result<Vec<String>> {
    let records = scan_installed_mods(mods_dir);
    if records.is_empty() {
        bail!("No mods found in {}", mods_dir.display());
    }

    let ids: Vec<String> = records.iter().map(|r| r.id_or_folder().to_string()).collect();
    let enabled = update_enabled_mods(mods_dir, &ids, false)?;
    info!("Enabled {} mod(s) in {}", enabled.len(), ENABLED_MODS_FILE);
    Ok(enabled)
}
