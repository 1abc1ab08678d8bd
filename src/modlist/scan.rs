//! Installed-mod discovery
//!
//! Scans `<target>/mods/` for mod folders and derives everything else from
//! their manifests. Results are never cached: every call re-reads the disk.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::ModDescriptor;
use crate::manifest::{extract_dependencies, extract_metadata};
use crate::paths::{is_mod_name_match, MANIFEST_FILE};
use crate::version::compare_versions;

/// One installed mod folder with a readable manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModRecord {
    pub folder_name: String,
    pub path: PathBuf,
    pub mod_id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub game_version: Option<String>,
    /// Raw manifest text
    pub content: String,
}

impl InstalledModRecord {
    /// Manifest id, or the folder name when the manifest has none
    pub fn id_or_folder(&self) -> &str {
        self.mod_id.as_deref().unwrap_or(&self.folder_name)
    }

    /// Does this installed folder correspond to `descriptor`?
    ///
    /// When both sides carry an id the ids decide; the name match only
    /// applies when one side has none.
    pub fn matches(&self, descriptor: &ModDescriptor) -> bool {
        match (descriptor.id(), self.mod_id.as_deref()) {
            (Some(wanted), Some(installed)) => wanted.eq_ignore_ascii_case(installed),
            _ => is_mod_name_match(&descriptor.name, &self.folder_name, self.name.as_deref()),
        }
    }

    fn matches_id(&self, descriptor: &ModDescriptor) -> bool {
        matches!(
            (descriptor.id(), self.mod_id.as_deref()),
            (Some(wanted), Some(installed)) if wanted.eq_ignore_ascii_case(installed)
        )
    }
}

/// Scan a mods directory.
///
/// Hidden entries, plain files, folders without `mod_info.json` and
/// unreadable manifests are skipped. A missing directory yields nothing.
/// Records are sorted by folder name.
pub fn scan_installed_mods(mods_dir: &Path) -> Vec<InstalledModRecord> {
    let entries = match std::fs::read_dir(mods_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot scan {}: {}", mods_dir.display(), e);
            return Vec::new();
        }
    };

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let folder_name = entry.file_name().to_string_lossy().into_owned();
        if folder_name.starts_with('.') || !path.is_dir() {
            continue;
        }

        let manifest = path.join(MANIFEST_FILE);
        let content = match std::fs::read(&manifest) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => continue,
        };

        let metadata = extract_metadata(&content);
        records.push(InstalledModRecord {
            folder_name,
            path,
            mod_id: metadata.id,
            name: metadata.name,
            version: metadata.version,
            game_version: metadata.game_version,
            content,
        });
    }

    records.sort_by(|a, b| a.folder_name.cmp(&b.folder_name));
    debug!("Found {} installed mods in {}", records.len(), mods_dir.display());
    records
}

/// Installed ids (or folder names for id-less manifests)
pub fn installed_ids(records: &[InstalledModRecord]) -> HashSet<String> {
    records.iter().map(|r| r.id_or_folder().to_string()).collect()
}

/// Find the installed record for a descriptor
pub fn find_installed<'a>(
    descriptor: &ModDescriptor,
    records: &'a [InstalledModRecord],
) -> Option<&'a InstalledModRecord> {
    records
        .iter()
        .find(|r| r.matches_id(descriptor))
        .or_else(|| records.iter().find(|r| r.matches(descriptor)))
}

/// Result of an up-to-date check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyCheck {
    pub up_to_date: bool,
    pub installed_version: Option<String>,
}

/// Is `descriptor` already installed at its expected version or newer?
///
/// Without an expected version nothing is considered current, so the
/// download runs and the extractor decides.
pub fn is_mod_up_to_date(descriptor: &ModDescriptor, records: &[InstalledModRecord]) -> CurrencyCheck {
    let installed_version = find_installed(descriptor, records).and_then(|r| r.version.clone());

    let up_to_date = match (descriptor.expected_version(), installed_version.as_deref()) {
        (Some(expected), Some(installed)) => {
            compare_versions(installed, expected) != Ordering::Less
        }
        _ => false,
    };

    CurrencyCheck {
        up_to_date,
        installed_version,
    }
}

/// Fill empty descriptor fields from installed manifests.
///
/// Matching is by id when both sides have one, else by name. Fields that
/// already hold a value are left alone. Returns the number of descriptors
/// changed.
pub fn refresh_from_installed(mods: &mut [ModDescriptor], records: &[InstalledModRecord]) -> usize {
    let mut updated = 0;

    for descriptor in mods.iter_mut() {
        let Some(record) = find_installed(descriptor, records) else {
            continue;
        };

        let mut changed = false;
        changed |= fill(&mut descriptor.mod_id, &record.mod_id);
        changed |= fill(&mut descriptor.mod_version, &record.version);
        changed |= fill(&mut descriptor.game_version, &record.game_version);

        if descriptor.dependencies.is_empty() {
            let deps = extract_dependencies(&record.content);
            if !deps.is_empty() {
                descriptor.dependencies = deps;
                changed = true;
            }
        }

        if changed {
            debug!("Refreshed '{}' from {}", descriptor.name, record.folder_name);
            updated += 1;
        }
    }

    if updated > 0 {
        info!("Refreshed metadata for {} mod(s) from installed files", updated);
    }
    updated
}

fn fill(slot: &mut Option<String>, value: &Option<String>) -> bool {
    let empty = slot.as_deref().map(str::trim).is_none_or(str::is_empty);
    match value {
        Some(v) if empty && !v.trim().is_empty() => {
            *slot = Some(v.clone());
            true
        }
        _ => false,
    }
}

/// Map of mod id to the dependency ids it declares that are not installed.
///
/// Mods without an id or without dependencies are ignored.
pub fn check_missing_dependencies(
    mods: &[ModDescriptor],
    installed: &HashSet<String>,
) -> BTreeMap<String, Vec<String>> {
    let installed_lower: HashSet<String> = installed.iter().map(|s| s.to_lowercase()).collect();
    let mut missing = BTreeMap::new();

    for descriptor in mods {
        let Some(id) = descriptor.id() else { continue };

        let absent: Vec<String> = descriptor
            .dependencies
            .iter()
            .filter_map(|dep| dep.id.as_deref().or(dep.name.as_deref()))
            .filter(|dep| !installed_lower.contains(&dep.to_lowercase()))
            .map(str::to_string)
            .collect();

        if !absent.is_empty() {
            missing.insert(id.to_string(), absent);
        }
    }

    missing
}

/// An installed mod older than the modlist expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedMod {
    pub name: String,
    pub folder_name: String,
    pub installed_version: String,
    pub expected_version: String,
}

/// Installed mods whose version is below the descriptor's expected version
pub fn detect_outdated_mods(mods: &[ModDescriptor], records: &[InstalledModRecord]) -> Vec<OutdatedMod> {
    mods.iter()
        .filter_map(|descriptor| {
            let expected = descriptor.expected_version()?;
            let record = find_installed(descriptor, records)?;
            let installed = record.version.as_deref()?;
            (compare_versions(installed, expected) == Ordering::Less).then(|| OutdatedMod {
                name: descriptor.name.clone(),
                folder_name: record.folder_name.clone(),
                installed_version: installed.to_string(),
                expected_version: expected.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modlist::Dependency;
    use tempfile::tempdir;

    fn install(mods_dir: &Path, folder: &str, manifest: &str) {
        let dir = mods_dir.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
    }

    fn descriptor(name: &str, version: Option<&str>) -> ModDescriptor {
        ModDescriptor {
            name: name.to_string(),
            mod_version: version.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_scan_skips_hidden_files_and_manifestless() {
        let dir = tempdir().unwrap();
        let mods = dir.path();
        install(mods, "LazyLib", r#"{"id": "lw_lazylib", "name": "LazyLib", "version": "2.8b"}"#);
        install(mods, ".hidden", r#"{"id": "hidden"}"#);
        std::fs::create_dir_all(mods.join("NoManifest")).unwrap();
        std::fs::write(mods.join("enabled_mods.json"), "{}").unwrap();

        let records = scan_installed_mods(mods);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].folder_name, "LazyLib");
        assert_eq!(records[0].mod_id.as_deref(), Some("lw_lazylib"));
        assert_eq!(records[0].version.as_deref(), Some("2.8b"));
    }

    #[test]
    fn test_scan_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(scan_installed_mods(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn test_up_to_date_rules() {
        let dir = tempdir().unwrap();
        install(dir.path(), "LazyLib", r#"{"id": "lw_lazylib", "name": "LazyLib", "version": "2.8"}"#);
        let records = scan_installed_mods(dir.path());

        let current = is_mod_up_to_date(&descriptor("LazyLib", Some("2.8")), &records);
        assert!(current.up_to_date);
        assert_eq!(current.installed_version.as_deref(), Some("2.8"));

        assert!(is_mod_up_to_date(&descriptor("LazyLib", Some("2.7")), &records).up_to_date);
        assert!(!is_mod_up_to_date(&descriptor("LazyLib", Some("2.9")), &records).up_to_date);
        // No expected version: let the extractor decide
        assert!(!is_mod_up_to_date(&descriptor("LazyLib", None), &records).up_to_date);
        // Not installed
        let missing = is_mod_up_to_date(&descriptor("MagicLib", Some("1.0")), &records);
        assert!(!missing.up_to_date);
        assert!(missing.installed_version.is_none());
    }

    #[test]
    fn test_conflicting_ids_never_fall_back_to_name() {
        let dir = tempdir().unwrap();
        install(
            dir.path(),
            "GraphicsLib Addon",
            r#"{"id": "glib_addon", "name": "GraphicsLib Addon", "version": "3.0"}"#,
        );
        install(dir.path(), "Shader", r#"{"id": "shaderLib", "name": "Shader", "version": "1.0"}"#);
        let records = scan_installed_mods(dir.path());

        let mut wanted = descriptor("GraphicsLib", Some("2.0"));
        wanted.mod_id = Some("shaderLib".to_string());

        let found = find_installed(&wanted, &records).unwrap();
        assert_eq!(found.folder_name, "Shader");
        assert!(!records[0].matches(&wanted));

        let check = is_mod_up_to_date(&wanted, &records);
        assert!(!check.up_to_date);
        assert_eq!(check.installed_version.as_deref(), Some("1.0"));

        // Without an id on the descriptor the name still matches
        let by_name = descriptor("GraphicsLib", None);
        assert_eq!(find_installed(&by_name, &records).unwrap().folder_name, "GraphicsLib Addon");
    }

    #[test]
    fn test_refresh_fills_only_empty_fields() {
        let dir = tempdir().unwrap();
        install(
            dir.path(),
            "Nexerelin",
            r#"{"id": "nexerelin", "name": "Nexerelin", "version": "0.11.2",
                "gameVersion": "0.98a-RC8", "dependencies": [{"id": "lw_lazylib", "name": "LazyLib"}]}"#,
        );
        let records = scan_installed_mods(dir.path());

        let mut mods = vec![descriptor("Nexerelin", Some("0.11.3")), descriptor("Other", None)];
        assert_eq!(refresh_from_installed(&mut mods, &records), 1);

        let nex = &mods[0];
        assert_eq!(nex.mod_id.as_deref(), Some("nexerelin"));
        assert_eq!(nex.mod_version.as_deref(), Some("0.11.3"));
        assert_eq!(nex.game_version.as_deref(), Some("0.98a-RC8"));
        assert_eq!(nex.dependencies.len(), 1);
        assert!(mods[1].mod_id.is_none());

        // Second pass has nothing left to fill
        assert_eq!(refresh_from_installed(&mut mods, &records), 0);
    }

    #[test]
    fn test_missing_dependencies() {
        let mut nex = descriptor("Nexerelin", None);
        nex.mod_id = Some("nexerelin".to_string());
        nex.dependencies = vec![
            Dependency {
                id: Some("lw_lazylib".to_string()),
                name: None,
            },
            Dependency {
                id: Some("MagicLib".to_string()),
                name: None,
            },
        ];
        let no_id = ModDescriptor {
            dependencies: vec![Dependency {
                id: Some("x".to_string()),
                name: None,
            }],
            ..descriptor("NoId", None)
        };

        let installed: HashSet<String> = ["nexerelin", "LW_LAZYLIB"].iter().map(|s| s.to_string()).collect();
        let missing = check_missing_dependencies(&[nex, no_id], &installed);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing["nexerelin"], vec!["MagicLib".to_string()]);
    }

    #[test]
    fn test_detect_outdated() {
        let dir = tempdir().unwrap();
        install(dir.path(), "LazyLib", r#"{"id": "lw_lazylib", "version": "2.7"}"#);
        install(dir.path(), "MagicLib", r#"{"id": "MagicLib", "version": "1.4.0"}"#);
        let records = scan_installed_mods(dir.path());

        let mods = vec![
            descriptor("LazyLib", Some("2.8")),
            descriptor("MagicLib", Some("1.4")),
            descriptor("GraphicsLib", Some("1.9")),
        ];
        let outdated = detect_outdated_mods(&mods, &records);
        assert_eq!(outdated.len(), 1);
        assert_eq!(outdated[0].name, "LazyLib");
        assert_eq!(outdated[0].installed_version, "2.7");
        assert_eq!(outdated[0].expected_version, "2.8");
    }
}
