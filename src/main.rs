//! modlist-installer - Starsector modlist installer
//!
//! Command-line front end over the `modlist_installer` library.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use modlist_installer::backup::BackupManager;
use modlist_installer::downloaders::{fix_google_drive_url, validate_mod_urls, HttpClient};
use modlist_installer::installer::{
    auto_detect_game_dir, InstallConfig, Installer, LogSink, PreflightWarning, ProgressEvent,
    Severity, TracingSink,
};
use modlist_installer::modlist::{
    enable_all_installed, refresh_from_installed, scan_installed_mods, ConfigStore, ModBatchConfig,
};
use modlist_installer::paths;

#[derive(Parser)]
#[command(name = "modlist-installer")]
#[command(version)]
#[command(about = "Starsector modlist installer - downloads, verifies and extracts a mod list")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the mods of a modlist config
    Install {
        /// Path to the modlist JSON
        config: PathBuf,

        /// Starsector directory (auto-detected when omitted)
        #[arg(short, long, env = "STARSECTOR_DIR")]
        target: Option<PathBuf>,

        /// Maximum concurrent downloads
        #[arg(short, long, default_value_t = 3)]
        concurrent: usize,

        /// Number of enabled_mods.json backups to keep
        #[arg(long, default_value_t = 4)]
        retention: usize,

        /// Directory for temporary archives (defaults to the system temp dir)
        #[arg(long)]
        download_dir: Option<PathBuf>,

        /// Accept every pre-flight warning without asking
        #[arg(short, long)]
        yes: bool,

        /// Only install these mods (by name)
        #[arg(long, num_args = 1..)]
        only: Vec<String>,

        /// Enable every installed mod afterwards
        #[arg(long)]
        enable: bool,

        /// Do not back up enabled_mods.json first
        #[arg(long)]
        skip_backup: bool,

        /// Skip the internet connectivity check
        #[arg(long)]
        skip_connectivity_check: bool,
    },

    /// Manage enabled_mods.json backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,

        /// Starsector directory
        #[arg(short, long, global = true, env = "STARSECTOR_DIR")]
        target: Option<PathBuf>,
    },

    /// Check that every download URL of a modlist answers
    CheckUrls {
        /// Path to the modlist JSON
        config: PathBuf,
    },

    /// List mods installed in a Starsector directory
    Scan {
        #[arg(short, long, env = "STARSECTOR_DIR")]
        target: Option<PathBuf>,
    },

    /// Fill missing ids and versions in a modlist from installed mods
    Refresh {
        /// Path to the modlist JSON
        config: PathBuf,

        #[arg(short, long, env = "STARSECTOR_DIR")]
        target: Option<PathBuf>,
    },

    /// Enable every installed mod
    EnableAll {
        #[arg(short, long, env = "STARSECTOR_DIR")]
        target: Option<PathBuf>,
    },

    /// Print the direct-download form of a Google Drive link
    FixUrl { url: String },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Back up enabled_mods.json now
    Create,
    /// List backups, newest first
    List,
    /// Restore enabled_mods.json from a backup
    Restore { path: PathBuf },
    /// Delete a backup
    Delete { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(if cli.verbose {
                "modlist_installer=debug".parse()?
            } else {
                "modlist_installer=warn".parse()?
            }))
            .init();
    }

    match cli.command {
        Commands::Install {
            config,
            target,
            concurrent,
            retention,
            download_dir,
            yes,
            only,
            enable,
            skip_backup,
            skip_connectivity_check,
        } => {
            let target = resolve_target(target)?;
            let mut install_config = InstallConfig::new(&target);
            install_config.max_concurrent_downloads = concurrent;
            install_config.backup_retention = retention;
            install_config.skip_backup = skip_backup;
            install_config.skip_connectivity_check = skip_connectivity_check;
            install_config.enable_installed_mods = enable;
            if let Some(dir) = download_dir {
                install_config.download_dir = dir;
            }
            run_install(&config, install_config, &only, yes, cli.verbose)?;
        }

        Commands::Backup { action, target } => {
            let target = resolve_target(target)?;
            let manager = BackupManager::new(&target).with_installed_list(true);
            match action {
                BackupAction::Create => {
                    let record = manager.create_backup()?;
                    println!("Backup created: {}", record.path.display());
                }
                BackupAction::List => {
                    let backups = manager.list_backups();
                    if backups.is_empty() {
                        println!("No backups in {}", manager.root().display());
                    }
                    for backup in backups {
                        let marker = if backup.has_manifest() { "" } else { "  (no enabled_mods.json)" };
                        println!("{}  {}{}", backup.timestamp, backup.path.display(), marker);
                    }
                }
                BackupAction::Restore { path } => {
                    manager.restore_backup(&path)?;
                    println!("Restored enabled_mods.json from {}", path.display());
                }
                BackupAction::Delete { path } => {
                    manager.delete_backup(&path)?;
                    println!("Deleted {}", path.display());
                }
            }
        }

        Commands::CheckUrls { config } => {
            let batch = load_batch(&config)?;
            let client = HttpClient::for_probes()?;

            let pb = progress_bar(batch.mods.len() as u64);
            pb.set_message("Checking URLs...");
            let progress = |done: usize, _total: usize, name: &str| {
                pb.set_position(done as u64);
                pb.set_message(name.to_string());
            };
            let report = validate_mod_urls(&batch.mods, &client, Some(&progress));
            pb.finish_and_clear();

            println!("=== URL Check: {} ===", batch.modlist_name);
            println!("GitHub:       {}", report.github.len());
            println!("Google Drive: {}", report.google_drive.len());
            for (domain, names) in &report.other {
                println!("{:<13} {}", format!("{}:", domain), names.len());
            }
            if report.has_failures() {
                println!("\n{} URL(s) failed:", report.failed.len());
                for failure in &report.failed {
                    println!("  {}: {} ({})", failure.name, failure.error, failure.url);
                    if let Some(fixed) = fix_google_drive_url(&failure.url) {
                        println!("    try: {}", fixed);
                    }
                }
            } else {
                println!("\nAll {} URLs reachable", report.total_ok());
            }
        }

        Commands::Scan { target } => {
            let target = resolve_target(target)?;
            let records = scan_installed_mods(&paths::mods_dir(&target));
            for record in &records {
                println!(
                    "{:<32} {:<24} {}",
                    record.folder_name,
                    record.mod_id.as_deref().unwrap_or("-"),
                    record.version.as_deref().unwrap_or("-")
                );
            }
            eprintln!("\nTotal: {} mods", records.len());
        }

        Commands::Refresh { config, target } => {
            let target = resolve_target(target)?;
            let store = ConfigStore::new(&config);
            let mut batch = load_batch(&config)?;
            let records = scan_installed_mods(&paths::mods_dir(&target));
            let updated = refresh_from_installed(&mut batch.mods, &records);
            if updated > 0 {
                store.save(&batch)?;
            }
            println!("Updated {} of {} mods", updated, batch.mods.len());
        }

        Commands::EnableAll { target } => {
            let target = resolve_target(target)?;
            let ids = enable_all_installed(&paths::mods_dir(&target))?;
            println!("Enabled {} mods", ids.len());
        }

        Commands::FixUrl { url } => match fix_google_drive_url(&url) {
            Some(fixed) => println!("{}", fixed),
            None => println!("{}", url),
        },
    }

    Ok(())
}

fn run_install(
    config_path: &Path,
    config: InstallConfig,
    only: &[String],
    yes: bool,
    verbose: bool,
) -> Result<()> {
    let store = ConfigStore::new(config_path);
    let mut full = load_batch(config_path)?;

    println!("modlist-installer - {} v{}", full.modlist_name, full.version);
    println!("Target:     {}", config.target_dir.display());
    println!("Concurrent downloads: {}", config.max_concurrent_downloads);
    println!();

    let mut batch = select_mods(&full, only)?;

    let pb = progress_bar(0);
    let log_pb = pb.clone();
    let sink = move |message: &str, severity: Severity| {
        TracingSink.log(message, severity);
        let prefix = match severity {
            Severity::Debug if !verbose => return,
            Severity::Debug => "  ",
            Severity::Info => "",
            Severity::Success => "OK ",
            Severity::Warning => "WARN ",
            Severity::Error => "ERROR ",
        };
        log_pb.suspend(|| println!("{}{}", prefix, message));
    };

    let event_pb = pb.clone();
    let on_progress = move |event: ProgressEvent| match event {
        ProgressEvent::PhaseStarted { phase, total } => {
            event_pb.set_length(total as u64);
            event_pb.set_position(0);
            event_pb.set_message(format!("{}...", phase));
        }
        ProgressEvent::DownloadFinished { name, .. } => {
            event_pb.inc(1);
            event_pb.set_message(name);
        }
        ProgressEvent::Extracting { name, .. } => event_pb.set_message(format!("Extracting {}", name)),
        ProgressEvent::ModFinished { .. } => event_pb.inc(1),
    };

    let mut installer = Installer::with_http(config)?
        .with_log_sink(Arc::new(sink))
        .with_progress(Arc::new(on_progress));
    if only.is_empty() {
        installer = installer.with_config_store(store.clone());
    }

    let prompt_pb = pb.clone();
    let confirm = move |warning: &PreflightWarning| yes || prompt_pb.suspend(|| ask_continue(warning));
    let result = installer.install(&mut batch, &confirm);
    pb.finish_and_clear();
    let report = result?;

    // Partial runs write their detected metadata back into the full list
    if !only.is_empty() {
        let mut changed = false;
        for descriptor in batch.mods {
            if let Some(slot) = full.find_mut(&descriptor.name) {
                if *slot != descriptor {
                    *slot = descriptor;
                    changed = true;
                }
            }
        }
        if changed {
            store.save(&full)?;
        }
    }

    println!("\n=== Installation Summary ===");
    print!("{}", report.summary());
    if report.has_errors() {
        println!("\nSome mods failed. Fix the issues above and run again.");
    } else if !report.cancelled {
        println!("\nInstallation complete!");
    }

    Ok(())
}

/// Restrict a modlist to `only` (all mods when empty)
fn select_mods(full: &ModBatchConfig, only: &[String]) -> Result<ModBatchConfig> {
    if only.is_empty() {
        return Ok(full.clone());
    }

    let wanted: HashSet<&str> = only.iter().map(String::as_str).collect();
    let unknown: Vec<&str> = wanted
        .iter()
        .copied()
        .filter(|name| full.find(name).is_none())
        .collect();
    if !unknown.is_empty() {
        bail!("Unknown mod(s) in --only: {}", unknown.join(", "));
    }

    let mut subset = full.clone();
    subset.mods.retain(|m| wanted.contains(m.name.as_str()));
    Ok(subset)
}

fn load_batch(path: &Path) -> Result<ModBatchConfig> {
    ConfigStore::new(path)
        .try_load()
        .with_context(|| format!("Failed to read modlist {}", path.display()))?
        .with_context(|| format!("Modlist not found: {}", path.display()))
}

fn resolve_target(target: Option<PathBuf>) -> Result<PathBuf> {
    match target {
        Some(target) => Ok(target),
        None => auto_detect_game_dir()
            .context("Could not find Starsector; pass --target <dir> or set STARSECTOR_DIR"),
    }
}

fn ask_continue(warning: &PreflightWarning) -> bool {
    println!("\n{}", warning.message);
    print!("Continue anyway? [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut input = String::new();
    if std::io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    let accepted = input.trim().eq_ignore_ascii_case("y");
    if !accepted {
        println!("Aborted.");
    }
    accepted
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
