//! Secure extraction of mod archives into the mods directory.
//!
//! Order of operations for one archive:
//! 1. List entries; an archive without files is a failure
//! 2. Resolve every entry under the target and block anything escaping it
//! 3. Decide between install, update (replace folder) and skip
//! 4. Write entries
//!
//! Nothing is written before step 2 has passed for every entry, so a
//! traversal entry hidden behind an "already installed" root still fails
//! the archive.

use std::collections::BTreeSet;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::{list_entries, read_zip_entry_text, sevenzip, ArchiveEntry, ArchiveFormat};
use crate::installer::error::ErrorKind;
use crate::manifest;
use crate::modlist::ModDescriptor;
use crate::paths::{self, MANIFEST_FILE};
use crate::version::compare_versions;

/// Why an archive was not written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Root folder already present (no comparable manifest, or same version)
    AlreadyInstalled {
        folder: String,
        version: Option<String>,
    },
    /// Installed copy is newer than the one offered
    NewerInstalled {
        folder: String,
        installed: String,
        offered: String,
    },
    /// Manifest could not be read; treated as installed
    VersionUnreadable { folder: String },
    /// Multi-root archive would collide with existing files
    WouldOverlap { existing: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyInstalled { folder, version: Some(v) } => {
                write!(f, "'{}' v{} already installed", folder, v)
            }
            SkipReason::AlreadyInstalled { folder, version: None } => {
                write!(f, "'{}' already installed", folder)
            }
            SkipReason::NewerInstalled { folder, installed, offered } => write!(
                f,
                "'{}' v{} newer installed (offered v{})",
                folder, installed, offered
            ),
            SkipReason::VersionUnreadable { folder } => write!(
                f,
                "'{}' already installed (version comparison unavailable)",
                folder
            ),
            SkipReason::WouldOverlap { existing } => {
                write!(f, "installation would overlap existing files ('{}')", existing)
            }
        }
    }
}

/// Result of [`extract_archive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Installed,
    UpdateApplied {
        folder: String,
        from: Option<String>,
        to: String,
    },
    Skipped(SkipReason),
    Failed { kind: ErrorKind, reason: String },
}

impl ExtractOutcome {
    fn failed(kind: ErrorKind, reason: impl Into<String>) -> Self {
        ExtractOutcome::Failed {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractOutcome::Installed | ExtractOutcome::UpdateApplied { .. })
    }
}

/// Extract `archive` into `target_dir` (the mods directory).
///
/// `expected_version`, when non-empty, replaces the archive's own declared
/// version as the version being installed when deciding whether an existing
/// folder is outdated.
pub fn extract_archive(
    archive: &Path,
    target_dir: &Path,
    format: ArchiveFormat,
    expected_version: Option<&str>,
) -> ExtractOutcome {
    if format == ArchiveFormat::SevenZ && !sevenzip::decoder_available() {
        return ExtractOutcome::failed(
            ErrorKind::Other,
            "7z support not available (built without the `sevenz` feature)",
        );
    }

    let entries = match list_entries(archive, format) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {}: {:#}", archive.display(), e);
            return ExtractOutcome::failed(ErrorKind::CorruptedArchive, format!("{:#}", e));
        }
    };

    if !entries.iter().any(|e| !e.is_dir) {
        return ExtractOutcome::failed(ErrorKind::InvalidData, "archive is empty");
    }

    let base = match resolve_base(target_dir) {
        Ok(base) => base,
        Err(e) => return ExtractOutcome::failed(ErrorKind::from_io(&e), e.to_string()),
    };

    let resolved = match resolve_all(&base, &entries) {
        Ok(resolved) => resolved,
        Err(entry) => {
            warn!(
                "Security: path traversal blocked in {} (entry '{}')",
                archive.display(),
                entry
            );
            return ExtractOutcome::failed(
                ErrorKind::PathTraversal,
                format!("path traversal blocked: '{}'", entry),
            );
        }
    };

    let mut update: Option<(String, Option<String>, String)> = None;
    match check_installed(archive, &base, &resolved, format, expected_version) {
        InstalledState::NotInstalled => {}
        InstalledState::Skip(reason) => {
            info!("Skipped: {}", reason);
            return ExtractOutcome::Skipped(reason);
        }
        InstalledState::Outdated { folder, installed, offered } => {
            let old = base.join(&folder);
            info!(
                "Update available: '{}' {} -> {}",
                folder,
                installed.as_deref().unwrap_or("unknown"),
                offered
            );
            if let Err(e) = fs::remove_dir_all(&old) {
                warn!("Failed to remove old version {}: {}", old.display(), e);
                return ExtractOutcome::failed(
                    ErrorKind::from_io(&e),
                    format!("could not remove old version '{}': {}", folder, e),
                );
            }
            update = Some((folder, installed, offered));
        }
    }

    let written = match format {
        ArchiveFormat::Zip => write_zip_entries(archive, &resolved),
        ArchiveFormat::SevenZ => sevenzip::extract_all(archive, &base),
    };

    match (written, update) {
        (Err(e), _) => {
            warn!("Extraction of {} failed: {:#}", archive.display(), e);
            ExtractOutcome::failed(ErrorKind::from_anyhow(&e), format!("{:#}", e))
        }
        (Ok(()), Some((folder, from, to))) => ExtractOutcome::UpdateApplied { folder, from, to },
        (Ok(()), None) => ExtractOutcome::Installed,
    }
}

/// Canonical target directory; falls back to an absolute lexical path when
/// the directory does not exist yet.
fn resolve_base(target_dir: &Path) -> io::Result<PathBuf> {
    match target_dir.canonicalize() {
        Ok(path) => Ok(path),
        Err(_) => std::path::absolute(target_dir),
    }
}

/// Resolve every entry under `base`. Returns the offending entry name when
/// one escapes, either lexically or through an existing symlink.
fn resolve_all(base: &Path, entries: &[ArchiveEntry]) -> Result<Vec<(ArchiveEntry, PathBuf)>, String> {
    entries
        .iter()
        .map(|entry| {
            let path = paths::resolve_entry(base, &entry.name)
                .filter(|p| paths::is_within(base, p))
                .filter(|p| !escapes_via_symlink(base, p))
                .ok_or_else(|| entry.name.clone())?;
            Ok((entry.clone(), path))
        })
        .collect()
}

/// Check the deepest existing ancestor of `path` still resolves under `base`
fn escapes_via_symlink(base: &Path, path: &Path) -> bool {
    let mut probe = Some(path);
    while let Some(current) = probe {
        if current == base {
            return false;
        }
        if fs::symlink_metadata(current).is_ok() {
            return match current.canonicalize() {
                Ok(real) => !real.starts_with(base),
                // Dangling symlink: cannot prove it stays inside
                Err(_) => true,
            };
        }
        probe = current.parent();
    }
    false
}

enum InstalledState {
    NotInstalled,
    Skip(SkipReason),
    Outdated {
        folder: String,
        installed: Option<String>,
        offered: String,
    },
}

/// Components of a resolved entry path below `base`
fn relative_parts(base: &Path, path: &Path) -> Vec<String> {
    path.strip_prefix(base)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn check_installed(
    archive: &Path,
    base: &Path,
    resolved: &[(ArchiveEntry, PathBuf)],
    format: ArchiveFormat,
    expected_version: Option<&str>,
) -> InstalledState {
    // Roots come from where entries land, not from their raw names
    let roots: BTreeSet<String> = resolved
        .iter()
        .filter_map(|(_, path)| relative_parts(base, path).into_iter().next())
        .collect();

    if roots.len() != 1 {
        return match roots.iter().find(|root| base.join(root).exists()) {
            Some(existing) => InstalledState::Skip(SkipReason::WouldOverlap {
                existing: existing.to_string(),
            }),
            None => InstalledState::NotInstalled,
        };
    }

    let Some(root) = roots.into_iter().next() else {
        return InstalledState::NotInstalled;
    };
    let mod_root = base.join(&root);
    if !mod_root.exists() {
        return InstalledState::NotInstalled;
    }

    let already = || {
        InstalledState::Skip(SkipReason::AlreadyInstalled {
            folder: root.clone(),
            version: None,
        })
    };

    if !format.supports_entry_reads() {
        return already();
    }

    let archive_manifest = resolved
        .iter()
        .find(|(e, path)| {
            !e.is_dir && {
                let parts = relative_parts(base, path);
                parts.len() == 2 && parts[1].eq_ignore_ascii_case(MANIFEST_FILE)
            }
        })
        .map(|(e, _)| e);
    let installed_manifest = mod_root.join(MANIFEST_FILE);

    let Some(archive_manifest) = archive_manifest else {
        return already();
    };
    if !installed_manifest.is_file() {
        return already();
    }

    let texts = fs::read(&installed_manifest)
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .map_err(anyhow::Error::from)
        .and_then(|installed| {
            read_zip_entry_text(archive, &archive_manifest.name).map(|offered| (installed, offered))
        });
    let (installed_text, offered_text) = match texts {
        Ok(texts) => texts,
        Err(e) => {
            warn!("Error reading mod metadata for '{}': {:#}", root, e);
            return InstalledState::Skip(SkipReason::VersionUnreadable {
                folder: root.to_string(),
            });
        }
    };

    let installed = manifest::extract_version(&installed_text);
    let offered = expected_version
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .or_else(|| manifest::extract_version(&offered_text));

    let installed_str = installed.clone().unwrap_or_default();
    let offered_str = offered.unwrap_or_default();
    debug!(
        "Version check for '{}': installed={:?} offered={:?}",
        root, installed_str, offered_str
    );

    match compare_versions(&offered_str, &installed_str) {
        Ordering::Greater => InstalledState::Outdated {
            folder: root.to_string(),
            installed,
            offered: offered_str,
        },
        Ordering::Less => InstalledState::Skip(SkipReason::NewerInstalled {
            folder: root.to_string(),
            installed: installed_str,
            offered: offered_str,
        }),
        Ordering::Equal => InstalledState::Skip(SkipReason::AlreadyInstalled {
            folder: root.to_string(),
            version: installed,
        }),
    }
}

fn write_zip_entries(archive: &Path, resolved: &[(ArchiveEntry, PathBuf)]) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let mut zip = ZipArchive::new(BufReader::new(file)).context("Failed to read ZIP archive")?;

    for (index, (entry, out_path)) in resolved.iter().enumerate() {
        if entry.is_dir {
            fs::create_dir_all(out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            continue;
        }

        paths::ensure_parent_dirs(out_path)
            .with_context(|| format!("Failed to create parent of {}", out_path.display()))?;

        let mut source = zip
            .by_index(index)
            .with_context(|| format!("Failed to read entry '{}'", entry.name))?;
        let mut out = File::create(out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut source, &mut out)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
    }

    Ok(())
}

/// Metadata discovered inside a downloaded archive, applied to the
/// descriptor by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataPatch {
    pub mod_id: Option<String>,
    pub mod_version: Option<String>,
    pub game_version: Option<String>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.mod_id.is_none() && self.mod_version.is_none() && self.game_version.is_none()
    }

    /// Fill empty descriptor fields. Returns `true` when anything changed.
    pub fn apply(&self, descriptor: &mut ModDescriptor) -> bool {
        fn fill(slot: &mut Option<String>, value: &Option<String>) -> bool {
            let empty = slot.as_deref().map_or(true, |s| s.trim().is_empty());
            match value {
                Some(v) if empty && !v.trim().is_empty() => {
                    *slot = Some(v.clone());
                    true
                }
                _ => false,
            }
        }

        let id = fill(&mut descriptor.mod_id, &self.mod_id);
        let version = fill(&mut descriptor.mod_version, &self.mod_version);
        let game = fill(&mut descriptor.game_version, &self.game_version);
        id || version || game
    }
}

/// Read the shallowest `mod_info.json` inside an archive.
///
/// Never fails: unreadable archives yield an empty patch. 7z archives are
/// decompressed under `scratch_dir` when the decoder is available.
pub fn detect_archive_metadata(
    archive: &Path,
    format: ArchiveFormat,
    scratch_dir: &Path,
) -> MetadataPatch {
    let text = match format {
        ArchiveFormat::Zip => read_zip_manifest(archive),
        ArchiveFormat::SevenZ if sevenzip::decoder_available() => {
            sevenzip::read_shallowest_file(archive, MANIFEST_FILE, scratch_dir)
        }
        ArchiveFormat::SevenZ => Ok(None),
    };

    match text {
        Ok(Some(text)) => {
            let meta = manifest::extract_metadata(&text);
            MetadataPatch {
                mod_id: meta.id,
                mod_version: meta.version,
                game_version: meta.game_version,
            }
        }
        Ok(None) => MetadataPatch::default(),
        Err(e) => {
            debug!("Metadata detection failed for {}: {:#}", archive.display(), e);
            MetadataPatch::default()
        }
    }
}

fn read_zip_manifest(archive: &Path) -> Result<Option<String>> {
    let entries = list_entries(archive, ArchiveFormat::Zip)?;
    let shallowest = entries
        .iter()
        .filter(|e| !e.is_dir && paths::file_name(&e.name).eq_ignore_ascii_case(MANIFEST_FILE))
        .min_by_key(|e| paths::depth(&e.name));

    match shallowest {
        Some(entry) => read_zip_entry_text(archive, &entry.name).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::write_zip;
    use tempfile::tempdir;
    use walkdir::WalkDir;

    fn snapshot(dir: &Path) -> Vec<(String, String)> {
        let mut files: Vec<(String, String)> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(dir).unwrap().to_string_lossy().to_string();
                let contents = fs::read_to_string(e.path()).unwrap_or_default();
                (rel, contents)
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_single_root_into_empty_target() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(&mods).unwrap();
        let archive = dir.path().join("foo.zip");
        write_zip(
            &archive,
            &[("Foo/", ""), ("Foo/mod_info.json", r#"{"version":"1.0"}"#), ("Foo/data/a.csv", "x")],
        );

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert_eq!(outcome, ExtractOutcome::Installed);
        assert_eq!(
            snapshot(&mods),
            vec![
                ("Foo/data/a.csv".to_string(), "x".to_string()),
                ("Foo/mod_info.json".to_string(), r#"{"version":"1.0"}"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_rerun_without_manifest_is_skipped() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(&mods).unwrap();
        let archive = dir.path().join("foo.zip");
        write_zip(&archive, &[("Foo/readme.txt", "hello")]);

        assert_eq!(
            extract_archive(&archive, &mods, ArchiveFormat::Zip, None),
            ExtractOutcome::Installed
        );
        fs::write(mods.join("Foo/readme.txt"), "edited locally").unwrap();
        let before = snapshot(&mods);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert!(matches!(
            outcome,
            ExtractOutcome::Skipped(SkipReason::AlreadyInstalled { .. })
        ));
        assert_eq!(snapshot(&mods), before);
    }

    #[test]
    fn test_path_traversal_blocked_nothing_written() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("a/b/mods");
        fs::create_dir_all(&mods).unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("Foo/ok.txt", "fine"), ("../../evil.txt", "pwned")]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        match outcome {
            ExtractOutcome::Failed { kind, reason } => {
                assert_eq!(kind, ErrorKind::PathTraversal);
                assert!(reason.contains("path traversal blocked"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!dir.path().join("a/evil.txt").exists());
        assert!(!dir.path().join("evil.txt").exists());
        assert!(snapshot(&mods).is_empty());
    }

    #[test]
    fn test_traversal_blocked_even_when_root_installed() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(mods.join("Foo")).unwrap();
        let archive = dir.path().join("bait.zip");
        write_zip(&archive, &[("Foo/a.txt", "a"), ("Foo/../../escape.txt", "x")]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert!(matches!(
            outcome,
            ExtractOutcome::Failed { kind: ErrorKind::PathTraversal, .. }
        ));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_folder_escape_blocked() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&mods).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, mods.join("Link")).unwrap();

        let archive = dir.path().join("link.zip");
        write_zip(&archive, &[("Other/a.txt", "a"), ("Link/payload.txt", "x")]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert!(matches!(
            outcome,
            ExtractOutcome::Failed { kind: ErrorKind::PathTraversal, .. }
        ));
        assert!(!outside.join("payload.txt").exists());
    }

    #[test]
    fn test_multi_root_overlap_skipped() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(&mods).unwrap();
        fs::write(mods.join("readme.txt"), "existing").unwrap();
        let archive = dir.path().join("flat.zip");
        write_zip(&archive, &[("readme.txt", "new"), ("data/x.csv", "1")]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert!(matches!(
            outcome,
            ExtractOutcome::Skipped(SkipReason::WouldOverlap { .. })
        ));
        assert_eq!(fs::read_to_string(mods.join("readme.txt")).unwrap(), "existing");
        assert!(!mods.join("data").exists());
    }

    #[test]
    fn test_root_taken_from_resolved_path() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(mods.join("Bar")).unwrap();
        fs::write(mods.join("Bar/keep.txt"), "existing").unwrap();
        let archive = dir.path().join("sneaky.zip");
        write_zip(&archive, &[("Foo/mod_info.json", "{}"), ("Foo/../Bar/keep.txt", "overwritten")]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert!(matches!(
            outcome,
            ExtractOutcome::Skipped(SkipReason::WouldOverlap { ref existing }) if existing == "Bar"
        ));
        assert_eq!(fs::read_to_string(mods.join("Bar/keep.txt")).unwrap(), "existing");
        assert!(!mods.join("Foo").exists());
    }

    #[test]
    fn test_multi_root_without_overlap_installs() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(&mods).unwrap();
        let archive = dir.path().join("two.zip");
        write_zip(&archive, &[("A/x.txt", "a"), ("B/y.txt", "b")]);

        assert_eq!(
            extract_archive(&archive, &mods, ArchiveFormat::Zip, None),
            ExtractOutcome::Installed
        );
        assert!(mods.join("A/x.txt").exists());
        assert!(mods.join("B/y.txt").exists());
    }

    fn install_version(mods: &Path, version: &str) {
        fs::create_dir_all(mods.join("Foo")).unwrap();
        fs::write(
            mods.join("Foo/mod_info.json"),
            format!(r#"{{"id": "foo", "version": "{}"}}"#, version),
        )
        .unwrap();
        fs::write(mods.join("Foo/stale.txt"), "old").unwrap();
    }

    #[test]
    fn test_newer_archive_replaces_folder() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        install_version(&mods, "1.0");
        let archive = dir.path().join("foo.zip");
        write_zip(&archive, &[("Foo/mod_info.json", r#"{"id": "foo", "version": "1.2"}"#)]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert_eq!(
            outcome,
            ExtractOutcome::UpdateApplied {
                folder: "Foo".to_string(),
                from: Some("1.0".to_string()),
                to: "1.2".to_string(),
            }
        );
        assert!(!mods.join("Foo/stale.txt").exists());
        assert!(fs::read_to_string(mods.join("Foo/mod_info.json"))
            .unwrap()
            .contains("1.2"));
    }

    #[test]
    fn test_same_version_skipped() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        install_version(&mods, "1.2");
        let archive = dir.path().join("foo.zip");
        write_zip(&archive, &[("Foo/mod_info.json", r#"{"version": "1.2.0"}"#)]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert_eq!(
            outcome,
            ExtractOutcome::Skipped(SkipReason::AlreadyInstalled {
                folder: "Foo".to_string(),
                version: Some("1.2".to_string()),
            })
        );
        assert!(mods.join("Foo/stale.txt").exists());
    }

    #[test]
    fn test_newer_installed_annotated() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        install_version(&mods, "2.0");
        let archive = dir.path().join("foo.zip");
        write_zip(&archive, &[("Foo/mod_info.json", r#"{"version": "1.9"}"#)]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        match outcome {
            ExtractOutcome::Skipped(reason @ SkipReason::NewerInstalled { .. }) => {
                assert!(reason.to_string().contains("newer"));
            }
            other => panic!("expected newer-installed skip, got {:?}", other),
        }
    }

    #[test]
    fn test_expected_version_overrides_archive_version() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        install_version(&mods, "1.0");
        let archive = dir.path().join("foo.zip");
        // Archive still declares 1.0, but the modlist expects 1.1
        write_zip(&archive, &[("Foo/mod_info.json", r#"{"version": "1.0"}"#)]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, Some("1.1"));
        assert!(matches!(outcome, ExtractOutcome::UpdateApplied { ref to, .. } if to == "1.1"));

        // Blank expectation falls back to the archive's version
        install_version(&mods, "1.0");
        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, Some("  "));
        assert!(matches!(outcome, ExtractOutcome::Skipped(_)));
    }

    #[test]
    fn test_empty_archive_fails() {
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(&mods).unwrap();
        let archive = dir.path().join("empty.zip");
        write_zip(&archive, &[("Foo/", "")]);

        let outcome = extract_archive(&archive, &mods, ArchiveFormat::Zip, None);
        assert!(matches!(
            outcome,
            ExtractOutcome::Failed { kind: ErrorKind::InvalidData, .. }
        ));
    }

    #[test]
    fn test_unreadable_archive_fails_as_corrupted() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("junk.zip");
        fs::write(&archive, "not a zip").unwrap();

        let outcome = extract_archive(&archive, dir.path(), ArchiveFormat::Zip, None);
        assert!(matches!(
            outcome,
            ExtractOutcome::Failed { kind: ErrorKind::CorruptedArchive, .. }
        ));
    }

    #[test]
    fn test_detect_archive_metadata_shallowest() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("foo.zip");
        write_zip(
            &archive,
            &[
                ("Foo/nested/mod_info.json", r#"{"id": "nested", "version": "9.9"}"#),
                (
                    "Foo/mod_info.json",
                    r#"{"id": "foo", "version": "1.4", "gameVersion": "0.98a-RC8"}"#,
                ),
            ],
        );

        let patch = detect_archive_metadata(&archive, ArchiveFormat::Zip, dir.path());
        assert_eq!(patch.mod_id.as_deref(), Some("foo"));
        assert_eq!(patch.mod_version.as_deref(), Some("1.4"));
        assert_eq!(patch.game_version.as_deref(), Some("0.98a-RC8"));
    }

    #[test]
    fn test_detect_archive_metadata_never_fails() {
        let dir = tempdir().unwrap();
        let junk = dir.path().join("junk.zip");
        fs::write(&junk, "junk").unwrap();
        assert!(detect_archive_metadata(&junk, ArchiveFormat::Zip, dir.path()).is_empty());

        let no_manifest = dir.path().join("plain.zip");
        write_zip(&no_manifest, &[("Foo/a.txt", "a")]);
        assert!(detect_archive_metadata(&no_manifest, ArchiveFormat::Zip, dir.path()).is_empty());
    }

    #[test]
    fn test_patch_fills_only_empty_fields() {
        let mut descriptor = ModDescriptor {
            name: "Foo".to_string(),
            download_url: "https://example.com/foo.zip".to_string(),
            mod_version: Some("1.0".to_string()),
            game_version: Some(String::new()),
            ..Default::default()
        };
        let patch = MetadataPatch {
            mod_id: Some("foo".to_string()),
            mod_version: Some("2.0".to_string()),
            game_version: Some("0.98a".to_string()),
        };

        assert!(patch.apply(&mut descriptor));
        assert_eq!(descriptor.mod_id.as_deref(), Some("foo"));
        assert_eq!(descriptor.mod_version.as_deref(), Some("1.0"));
        assert_eq!(descriptor.game_version.as_deref(), Some("0.98a"));
        assert!(!patch.apply(&mut descriptor));
    }
}
