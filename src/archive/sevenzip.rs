//! Native 7z support via sevenz-rust2.
//!
//! Compiled in with the `sevenz` feature (on by default). When the feature
//! is off every function here reports the decoder as unavailable and callers
//! fall back to degraded behavior.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::ArchiveEntry;

/// Whether the 7z decoder is compiled in
pub const fn decoder_available() -> bool {
    cfg!(feature = "sevenz")
}

/// List entries of a 7z archive
#[cfg(feature = "sevenz")]
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    use anyhow::Context;

    let archive = sevenz_rust2::Archive::open(path)
        .with_context(|| format!("Failed to read 7z archive: {}", path.display()))?;

    Ok(archive
        .files
        .iter()
        .map(|entry| ArchiveEntry {
            name: entry.name().to_string(),
            is_dir: entry.is_directory(),
        })
        .collect())
}

#[cfg(not(feature = "sevenz"))]
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    anyhow::bail!(
        "7z support not compiled in (enable the `sevenz` feature): {}",
        path.display()
    )
}

/// Decompress the whole archive into `dest`
#[cfg(feature = "sevenz")]
pub fn extract_all(path: &Path, dest: &Path) -> Result<()> {
    use anyhow::Context;

    sevenz_rust2::decompress_file(path, dest)
        .with_context(|| format!("Failed to decompress 7z archive: {}", path.display()))
}

#[cfg(not(feature = "sevenz"))]
pub fn extract_all(path: &Path, _dest: &Path) -> Result<()> {
    anyhow::bail!(
        "7z support not compiled in (enable the `sevenz` feature): {}",
        path.display()
    )
}

/// Read the shallowest file named `file_name` (case-insensitive) from a 7z.
///
/// 7z archives are usually solid, so the archive is decompressed into a
/// scratch directory under `scratch_base` and searched there. Returns
/// `Ok(None)` when no such file exists.
pub fn read_shallowest_file(
    path: &Path,
    file_name: &str,
    scratch_base: &Path,
) -> Result<Option<String>> {
    use anyhow::Context;

    let scratch = tempfile::Builder::new()
        .prefix("modlist_scan_")
        .tempdir_in(scratch_base)
        .context("Failed to create scratch directory")?;

    extract_all(path, scratch.path())?;

    let Some(found) = find_shallowest(scratch.path(), file_name) else {
        return Ok(None);
    };
    let bytes = std::fs::read(&found)
        .with_context(|| format!("Failed to read extracted file: {}", found.display()))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

fn find_shallowest(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let wanted = file_name.to_lowercase();
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().to_lowercase() == wanted)
        .min_by_key(|e| e.depth())
        .map(|e| e.into_path())
}
