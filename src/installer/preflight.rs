//! Pre-flight checks run before any download starts.
//!
//! Write permission on the mods directory is fatal. Everything else (game
//! folder layout, free disk space, connectivity, missing dependencies) is a
//! warning the caller may accept or decline through a confirmation callback.

use std::collections::HashSet;
use std::fs;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::Disks;
use tracing::{debug, info, warn};

use super::config::InstallConfig;
use super::error::InstallError;
use super::log::{LogSink, Severity};
use crate::modlist::{check_missing_dependencies, installed_ids, InstalledModRecord, ModDescriptor};

const CONNECTIVITY_HOST: &str = "www.google.com:80";
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(3);
const WRITE_TEST_FILE: &str = ".write_test";
const GB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightCheck {
    GameFolder,
    DiskSpace,
    Connectivity,
    Dependencies,
}

/// A non-fatal problem the user must accept to continue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightWarning {
    pub check: PreflightCheck,
    pub message: String,
}

/// Decides whether to continue past a warning
pub type ConfirmFn<'a> = &'a (dyn Fn(&PreflightWarning) -> bool + Sync);

/// Run every check in order. Returns the warnings that were accepted.
pub fn run_preflight(
    config: &InstallConfig,
    mods: &[ModDescriptor],
    installed: &[InstalledModRecord],
    log: &dyn LogSink,
    confirm: ConfirmFn<'_>,
) -> Result<Vec<PreflightWarning>, InstallError> {
    let mut accepted = Vec::new();
    let mut gate = |warning: PreflightWarning| -> Result<(), InstallError> {
        log.log(&warning.message, Severity::Warning);
        if confirm(&warning) {
            accepted.push(warning);
            Ok(())
        } else {
            Err(InstallError::Declined(warning.message))
        }
    };

    if !looks_like_game_dir(&config.target_dir) {
        gate(PreflightWarning {
            check: PreflightCheck::GameFolder,
            message: format!(
                "{} does not look like a Starsector folder (no data/ or launcher found)",
                config.target_dir.display()
            ),
        })?;
    }

    match free_space_bytes(&config.target_dir) {
        Some(free) if free < config.min_free_space_gb * GB => gate(PreflightWarning {
            check: PreflightCheck::DiskSpace,
            message: format!(
                "Low disk space: {:.1} GB free, {} GB recommended",
                free as f64 / GB as f64,
                config.min_free_space_gb
            ),
        })?,
        Some(free) => debug!("Disk space OK: {:.1} GB free", free as f64 / GB as f64),
        None => debug!("Could not determine free space for {}", config.target_dir.display()),
    }

    check_writable(&config.mods_dir())?;
    log.log("Write permissions verified", Severity::Debug);

    if config.skip_connectivity_check {
        debug!("Connectivity check skipped");
    } else if check_connectivity(CONNECTIVITY_HOST, CONNECTIVITY_TIMEOUT) {
        log.log("Internet connection verified", Severity::Debug);
    } else {
        gate(PreflightWarning {
            check: PreflightCheck::Connectivity,
            message: "Could not verify internet connection".to_string(),
        })?;
    }

    // Dependencies shipped in the same batch count as available
    let mut available = installed_ids(installed);
    available.extend(mods.iter().filter_map(|m| m.id().map(str::to_string)));
    let missing = missing_dependencies(mods, &available);
    if missing.is_empty() {
        log.log("No dependency issues found", Severity::Debug);
    } else {
        gate(PreflightWarning {
            check: PreflightCheck::Dependencies,
            message: format!("Some mods have missing dependencies:\n{}", missing.join("\n")),
        })?;
    }

    info!("Pre-flight checks passed with {} warning(s)", accepted.len());
    Ok(accepted)
}

fn missing_dependencies(mods: &[ModDescriptor], available: &HashSet<String>) -> Vec<String> {
    check_missing_dependencies(mods, available)
        .into_iter()
        .map(|(id, deps)| format!("  {}: missing {}", id, deps.join(", ")))
        .collect()
}

/// Create the mods directory if needed and prove a file can be written in it
pub fn check_writable(mods_dir: &Path) -> Result<(), InstallError> {
    let not_writable = |source| InstallError::NotWritable {
        path: mods_dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(mods_dir).map_err(not_writable)?;
    let probe = mods_dir.join(WRITE_TEST_FILE);
    fs::write(&probe, b"test").map_err(not_writable)?;
    fs::remove_file(&probe).map_err(not_writable)?;
    Ok(())
}

/// Free bytes on the disk holding `path`, from the longest matching mount point
pub fn free_space_bytes(path: &Path) -> Option<u64> {
    let path = path.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

/// Can a TCP connection to `addr` be opened within `timeout`?
pub fn check_connectivity(addr: &str, timeout: Duration) -> bool {
    let addrs = match addr.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            warn!("Could not resolve {}: {}", addr, e);
            return false;
        }
    };
    addrs
        .into_iter()
        .any(|socket| TcpStream::connect_timeout(&socket, timeout).is_ok())
}

/// Does `path` look like a Starsector installation?
///
/// A `.app` bundle needs `Contents/`; anything else needs `data/` or a
/// launcher script.
pub fn looks_like_game_dir(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }

    if path.extension().is_some_and(|ext| ext == "app") {
        return path.join("Contents").is_dir();
    }

    path.join("data").exists()
        || path.join("starsector.exe").exists()
        || path.join("starsector.sh").exists()
}

/// Usual install locations for this platform
pub fn candidate_game_dirs() -> Vec<PathBuf> {
    let home = dirs::home_dir();
    let home = home.as_deref();

    let mut candidates: Vec<Option<PathBuf>> = Vec::new();
    if cfg!(target_os = "windows") {
        candidates.push(Some(PathBuf::from(r"C:\Program Files (x86)\Fractal Softworks\Starsector")));
        candidates.push(Some(PathBuf::from(r"C:\Program Files\Fractal Softworks\Starsector")));
        candidates.push(join_all(home, &["Games", "Starsector"]));
    } else if cfg!(target_os = "macos") {
        candidates.push(Some(PathBuf::from("/Applications/Starsector.app")));
        candidates.push(join_all(home, &["Applications", "Starsector.app"]));
        candidates.push(join_all(home, &["Games", "Starsector.app"]));
    } else {
        candidates.push(join_all(home, &["starsector"]));
        candidates.push(join_all(home, &["Games", "starsector"]));
        candidates.push(Some(PathBuf::from("/opt/starsector")));
    }

    candidates.into_iter().flatten().collect()
}

fn join_all(base: Option<&Path>, parts: &[&str]) -> Option<PathBuf> {
    base.map(|b| parts.iter().fold(b.to_path_buf(), |p, part| p.join(part)))
}

/// First usual location that looks like a Starsector installation
pub fn auto_detect_game_dir() -> Option<PathBuf> {
    let found = candidate_game_dirs().into_iter().find(|p| looks_like_game_dir(p));
    if let Some(path) = &found {
        info!("Detected Starsector at {}", path.display());
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::log::MemorySink;
    use crate::modlist::Dependency;
    use tempfile::tempdir;

    fn game_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        dir
    }

    fn offline_config(target: &Path) -> InstallConfig {
        let mut config = InstallConfig::new(target);
        config.skip_connectivity_check = true;
        config.min_free_space_gb = 0;
        config
    }

    fn with_dep(name: &str, id: &str, dep: &str) -> ModDescriptor {
        ModDescriptor {
            name: name.to_string(),
            mod_id: Some(id.to_string()),
            dependencies: vec![Dependency {
                id: Some(dep.to_string()),
                name: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_looks_like_game_dir() {
        let dir = tempdir().unwrap();
        assert!(!looks_like_game_dir(dir.path()));

        fs::write(dir.path().join("starsector.sh"), "#!/bin/sh").unwrap();
        assert!(looks_like_game_dir(dir.path()));

        let bundle = dir.path().join("Starsector.app");
        fs::create_dir(&bundle).unwrap();
        assert!(!looks_like_game_dir(&bundle));
        fs::create_dir(bundle.join("Contents")).unwrap();
        assert!(looks_like_game_dir(&bundle));
    }

    #[test]
    fn test_clean_run_has_no_warnings() {
        let dir = game_dir();
        let sink = MemorySink::new();
        let warnings = run_preflight(&offline_config(dir.path()), &[], &[], &sink, &|_| false).unwrap();
        assert!(warnings.is_empty());
        // Mods dir is created, probe file removed
        assert!(dir.path().join("mods").is_dir());
        assert!(!dir.path().join("mods").join(WRITE_TEST_FILE).exists());
    }

    #[test]
    fn test_declined_warning_aborts() {
        let dir = tempdir().unwrap();
        let sink = MemorySink::new();
        let result = run_preflight(&offline_config(dir.path()), &[], &[], &sink, &|_| false);
        assert!(matches!(result, Err(InstallError::Declined(_))));
        assert!(!sink.messages(Severity::Warning).is_empty());
    }

    #[test]
    fn test_accepted_warnings_are_returned() {
        let dir = tempdir().unwrap();
        let mods = vec![with_dep("Nex", "nex", "lw_lazylib")];
        let sink = MemorySink::new();

        let warnings =
            run_preflight(&offline_config(dir.path()), &mods, &[], &sink, &|_| true).unwrap();
        let checks: Vec<PreflightCheck> = warnings.iter().map(|w| w.check).collect();
        assert_eq!(checks, vec![PreflightCheck::GameFolder, PreflightCheck::Dependencies]);
        assert!(warnings[1].message.contains("lw_lazylib"));
    }

    #[test]
    fn test_dependency_in_batch_is_not_missing() {
        let dir = game_dir();
        let mods = vec![
            with_dep("Nex", "nex", "lw_lazylib"),
            ModDescriptor {
                mod_id: Some("lw_lazylib".into()),
                ..ModDescriptor::new("LazyLib", "")
            },
        ];
        let sink = MemorySink::new();
        let warnings =
            run_preflight(&offline_config(dir.path()), &mods, &[], &sink, &|_| false).unwrap();
        assert!(warnings.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_mods_dir_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = game_dir();
        let mods = dir.path().join("mods");
        fs::create_dir(&mods).unwrap();
        fs::set_permissions(&mods, fs::Permissions::from_mode(0o555)).unwrap();

        // Root ignores permission bits
        if fs::write(mods.join("probe"), b"x").is_ok() {
            fs::remove_file(mods.join("probe")).unwrap();
            return;
        }

        let sink = MemorySink::new();
        let result = run_preflight(&offline_config(dir.path()), &[], &[], &sink, &|_| true);
        fs::set_permissions(&mods, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result, Err(InstallError::NotWritable { .. })));
    }

    #[test]
    fn test_free_space_of_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(free_space_bytes(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn test_unresolvable_host_is_offline() {
        assert!(!check_connectivity("host.invalid:80", Duration::from_millis(200)));
    }
}
