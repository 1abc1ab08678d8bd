//! Structural integrity checks for downloaded archives.
//!
//! Not authenticity: only "is this a readable archive of the claimed format".

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::{sevenzip, ArchiveFormat};

/// Check that `path` is a structurally sound archive of `format`.
///
/// A missing or zero-byte file is never valid. ZIP archives must pass a
/// full CRC self-test. 7z archives are accepted on non-zero size when the
/// decoder is unavailable or fails to list them.
pub fn is_valid_archive(path: &Path, format: ArchiveFormat) -> bool {
    let size = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return false,
    };
    if size == 0 {
        return false;
    }

    match format {
        ArchiveFormat::Zip => match zip_self_test(path) {
            Ok(entries) => {
                debug!("ZIP self-test passed: {} entries in {}", entries, path.display());
                true
            }
            Err(e) => {
                warn!("ZIP integrity check failed for {}: {:#}", path.display(), e);
                false
            }
        },
        ArchiveFormat::SevenZ => {
            if !sevenzip::decoder_available() {
                debug!("7z decoder unavailable, size check only: {}", path.display());
                return true;
            }
            match sevenzip::list_entries(path) {
                Ok(entries) => {
                    debug!("7z listing ok: {} entries in {}", entries.len(), path.display());
                }
                Err(e) => {
                    // Decoder corruption detection is unreliable; keep the size verdict
                    debug!("7z listing failed, falling back to size check: {:#}", e);
                }
            }
            true
        }
    }
}

/// Read every entry to the end so the zip crate verifies each CRC.
/// Returns the number of entries tested.
fn zip_self_test(path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).context("Not a readable ZIP archive")?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Corrupt entry header at index {}", i))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink())
            .with_context(|| format!("CRC/consistency check failed for '{}'", name))?;
    }

    Ok(archive.len())
}
