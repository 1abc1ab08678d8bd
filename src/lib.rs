//! modlist-installer - Starsector modlist installer
//!
//! Reads a declarative list of mods, downloads each archive, verifies it and
//! extracts it into the game's `mods` folder in dependency order.

pub mod archive;
pub mod backup;
pub mod downloaders;
pub mod installer;
pub mod manifest;
pub mod modlist;
pub mod paths;
pub mod version;
