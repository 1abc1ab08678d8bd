//! Modlist configuration and installed-mod state
//!
//! - [`types`]: the persisted modlist data model
//! - [`config`]: atomic load/save of the modlist JSON
//! - [`scan`]: discovery of mods already installed in the game
//! - [`enabled`]: the game's `enabled_mods.json`

pub mod config;
pub mod enabled;
pub mod scan;
mod types;

pub use config::{ConfigStore, CONFIG_FILE};
pub use enabled::{enable_all_installed, read_enabled_mods, update_enabled_mods};
pub use scan::{
    check_missing_dependencies, detect_outdated_mods, find_installed, installed_ids,
    is_mod_up_to_date, refresh_from_installed, scan_installed_mods, InstalledModRecord,
    OutdatedMod,
};
pub use types::*;
