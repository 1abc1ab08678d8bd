//! Archive handling for downloaded mods.
//!
//! Mods ship as ZIP (read with the `zip` crate) or 7z (read natively with
//! sevenz-rust2 when the `sevenz` feature is enabled). Without the decoder,
//! 7z archives still pass a size-only integrity check but cannot be listed
//! or extracted.

pub mod extract;
pub mod integrity;
pub mod sevenzip;

pub use extract::{detect_archive_metadata, extract_archive, ExtractOutcome, MetadataPatch};
pub use integrity::is_valid_archive;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

/// Archive formats a mod download can arrive in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    SevenZ,
}

impl ArchiveFormat {
    /// Decide format from the download URL and response content type.
    ///
    /// 7z only when either explicitly says so; everything else is treated
    /// as ZIP.
    pub fn from_url_and_content_type(url: &str, content_type: Option<&str>) -> Self {
        let url_lower = url.to_lowercase();
        let ct_lower = content_type.unwrap_or("").to_lowercase();
        if url_lower.contains(".7z") || ct_lower.contains("7z") {
            ArchiveFormat::SevenZ
        } else {
            ArchiveFormat::Zip
        }
    }

    /// Extension used for temp files
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZ => "7z",
        }
    }

    /// Whether single entries can be read as text for version comparison.
    ///
    /// 7z solid blocks make per-entry reads expensive, so 7z installs only
    /// check for folder existence.
    pub fn supports_entry_reads(&self) -> bool {
        matches!(self, ArchiveFormat::Zip)
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveFormat::Zip => write!(f, "zip"),
            ArchiveFormat::SevenZ => write!(f, "7z"),
        }
    }
}

/// Detect archive type from magic bytes. `None` when unrecognised.
pub fn detect_archive_type(path: &Path) -> Result<Option<ArchiveFormat>> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut magic = [0u8; 6];
    let bytes_read = file.read(&mut magic).unwrap_or(0);

    // ZIP: PK\x03\x04, PK\x05\x06 (empty) or PK\x07\x08 (spanned)
    if bytes_read >= 2 && magic[0..2] == [0x50, 0x4B] {
        return Ok(Some(ArchiveFormat::Zip));
    }

    // 7z: 7z\xBC\xAF\x27\x1C
    if bytes_read >= 6 && magic == [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C] {
        return Ok(Some(ArchiveFormat::SevenZ));
    }

    Ok(None)
}

/// A single entry inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path as stored in the archive (separators untouched)
    pub name: String,
    pub is_dir: bool,
}

/// List all entries of an archive, directories included.
pub fn list_entries(path: &Path, format: ArchiveFormat) -> Result<Vec<ArchiveEntry>> {
    match format {
        ArchiveFormat::Zip => list_zip_entries(path),
        ArchiveFormat::SevenZ => sevenzip::list_entries(path),
    }
}

fn open_zip(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open archive: {}", path.display()))?;
    ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read ZIP archive: {}", path.display()))
}

fn list_zip_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut archive = open_zip(path)?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let file = archive
            .by_index_raw(i)
            .with_context(|| format!("Failed to read entry {} of {}", i, path.display()))?;
        let name = file.name().to_string();
        let is_dir = file.is_dir() || name.ends_with('\\');
        entries.push(ArchiveEntry { name, is_dir });
    }

    Ok(entries)
}

/// Read one ZIP entry as UTF-8 text (lossy).
pub fn read_zip_entry_text(path: &Path, entry_name: &str) -> Result<String> {
    let mut archive = open_zip(path)?;
    let mut entry = archive
        .by_name(entry_name)
        .with_context(|| format!("Entry not found in archive: {}", entry_name))?;

    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read entry: {}", entry_name))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
