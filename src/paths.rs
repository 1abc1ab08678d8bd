//! Installation target layout and path helpers
//!
//! A Starsector install keeps mods under `<target>/mods/`:
//! - `mods/<folder>/mod_info.json` per mod
//! - `mods/enabled_mods.json` listing enabled mod ids
//!
//! Backups of the enabled list live in `<target>/modlist_backups/`.
//!
//! Archive entry names come from arbitrary zips built on Windows, so they
//! may use `\` separators. Everything here resolves them lexically, without
//! touching the filesystem.

use std::path::{Component, Path, PathBuf};

/// Per-mod manifest file name
pub const MANIFEST_FILE: &str = "mod_info.json";

/// Enabled-mods list inside `mods/`
pub const ENABLED_MODS_FILE: &str = "enabled_mods.json";

/// Backup root directory name
pub const BACKUPS_DIR: &str = "modlist_backups";

/// `<target>/mods`
pub fn mods_dir(target: &Path) -> PathBuf {
    target.join("mods")
}

/// `<target>/mods/enabled_mods.json`
pub fn enabled_mods_path(target: &Path) -> PathBuf {
    mods_dir(target).join(ENABLED_MODS_FILE)
}

/// `<target>/modlist_backups`
pub fn backups_dir(target: &Path) -> PathBuf {
    target.join(BACKUPS_DIR)
}

/// Convert Windows path separators
/// `data\config\settings.json` -> `data/config/settings.json`
pub fn to_unix_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Split an archive entry name into its non-empty components
pub fn entry_components(entry: &str) -> Vec<&str> {
    entry.split(['\\', '/']).filter(|s| !s.is_empty()).collect()
}

/// Number of components, used to find the shallowest manifest in an archive
pub fn depth(entry: &str) -> usize {
    entry_components(entry).len()
}

/// Get the filename from an entry name (handles both / and \)
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches(['\\', '/'])
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(path)
}

/// Resolve `entry` under `base` lexically.
///
/// `.` is dropped and `..` pops one component. Returns `None` when the entry
/// is absolute, carries a drive prefix, or pops above `base`.
pub fn resolve_entry(base: &Path, entry: &str) -> Option<PathBuf> {
    let unix = to_unix_separators(entry);
    let relative = Path::new(&unix);

    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => stack.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    // Windows drive letters survive as a Normal component on Unix
    if let Some(first) = stack.first() {
        let first = first.to_string_lossy();
        if first.len() == 2 && first.ends_with(':') {
            return None;
        }
    }

    let mut resolved = base.to_path_buf();
    for part in stack {
        resolved.push(part);
    }
    Some(resolved)
}

/// `true` when `path` is `base` or lies beneath it (component-wise)
pub fn is_within(base: &Path, path: &Path) -> bool {
    path.starts_with(base)
}

/// Create parent directories for a path if they don't exist
pub fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Lowercase and strip whitespace, `-` and `_` for fuzzy mod-name matching
pub fn normalize_mod_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Loose mod-name match.
///
/// Matches when the normalized config name equals the normalized folder or
/// manifest name, or when it and the folder name contain one another.
/// Empty names never match.
pub fn is_mod_name_match(config_name: &str, folder_name: &str, installed_name: Option<&str>) -> bool {
    let wanted = normalize_mod_name(config_name);
    if wanted.is_empty() {
        return false;
    }

    let folder = normalize_mod_name(folder_name);
    if wanted == folder {
        return true;
    }

    if installed_name.map(normalize_mod_name).as_deref() == Some(wanted.as_str()) {
        return true;
    }

    !folder.is_empty() && (folder.contains(&wanted) || wanted.contains(&folder))
}
