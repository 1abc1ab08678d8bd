//! Final installation report
//!
//! Every mod of a batch lands in exactly one bucket. Insertion goes through
//! [`InstallationReport::record`], which refuses a second entry for a name.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use super::error::ErrorKind;

/// An update that replaced an installed folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedEntry {
    pub name: String,
    pub from: Option<String>,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub name: String,
    pub kind: ErrorKind,
    pub error: String,
}

/// A Google Drive link that returned a confirmation page, with the rewrite
/// that should be used instead
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlFix {
    pub name: String,
    pub original: String,
    pub fixed: String,
}

/// Which bucket a mod ended in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModOutcome {
    Installed,
    Updated { from: Option<String>, to: String },
    Skipped(String),
    Failed { kind: ErrorKind, error: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallationReport {
    pub installed: Vec<String>,
    pub updated: Vec<UpdatedEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub errors: Vec<FailedEntry>,
    pub url_fixes: Vec<UrlFix>,
    /// Descriptors changed by archive metadata detection
    pub metadata_updated: usize,
    pub cancelled: bool,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl InstallationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `name` in the bucket for `outcome`.
    ///
    /// Returns `false` (and records nothing) if `name` already has a bucket.
    pub fn record(&mut self, name: &str, outcome: ModOutcome) -> bool {
        if !self.seen.insert(name.to_string()) {
            warn!("'{}' already reported, ignoring second outcome", name);
            return false;
        }

        let name = name.to_string();
        match outcome {
            ModOutcome::Installed => self.installed.push(name),
            ModOutcome::Updated { from, to } => self.updated.push(UpdatedEntry { name, from, to }),
            ModOutcome::Skipped(reason) => self.skipped.push(SkippedEntry { name, reason }),
            ModOutcome::Failed { kind, error } => self.errors.push(FailedEntry { name, kind, error }),
        }
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn total_processed(&self) -> usize {
        self.installed.len() + self.updated.len() + self.skipped.len() + self.errors.len()
    }

    /// Distinct error kinds, in first-seen order
    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        let mut kinds = Vec::new();
        for entry in &self.errors {
            if !kinds.contains(&entry.kind) {
                kinds.push(entry.kind);
            }
        }
        kinds
    }

    /// Human-readable summary with per-bucket listings and remedies
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Installation complete in {:.1}s", self.duration.as_secs_f64());
        if self.cancelled {
            let _ = writeln!(out, "Installation was cancelled before all mods were processed");
        }
        let _ = writeln!(
            out,
            "  {} installed, {} updated, {} skipped, {} failed",
            self.installed.len(),
            self.updated.len(),
            self.skipped.len(),
            self.errors.len()
        );

        if !self.installed.is_empty() {
            let _ = writeln!(out, "\nInstalled:");
            for name in &self.installed {
                let _ = writeln!(out, "  + {}", name);
            }
        }

        if !self.updated.is_empty() {
            let _ = writeln!(out, "\nUpdated:");
            for entry in &self.updated {
                match &entry.from {
                    Some(from) => {
                        let _ = writeln!(out, "  ^ {} ({} -> {})", entry.name, from, entry.to);
                    }
                    None => {
                        let _ = writeln!(out, "  ^ {} (-> {})", entry.name, entry.to);
                    }
                }
            }
        }

        if !self.skipped.is_empty() {
            let _ = writeln!(out, "\nSkipped:");
            for entry in &self.skipped {
                let _ = writeln!(out, "  = {}: {}", entry.name, entry.reason);
            }
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out, "\nFailed:");
            for entry in &self.errors {
                let _ = writeln!(out, "  x {} [{}]: {}", entry.name, entry.kind, entry.error);
            }
            let _ = writeln!(out, "\nWhat to do:");
            for kind in self.error_kinds() {
                let _ = writeln!(out, "  {}: {}", kind, kind.remedy());
            }
        }

        if !self.url_fixes.is_empty() {
            let _ = writeln!(out, "\nSuggested link fixes:");
            for fix in &self.url_fixes {
                let _ = writeln!(out, "  {}: {}", fix.name, fix.fixed);
            }
        }

        out
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_disjoint() {
        let mut report = InstallationReport::new();
        assert!(report.record("A", ModOutcome::Installed));
        assert!(report.record("B", ModOutcome::Skipped("already installed".into())));
        assert!(!report.record(
            "A",
            ModOutcome::Failed {
                kind: ErrorKind::Other,
                error: "late".into()
            }
        ));

        assert_eq!(report.installed, vec!["A".to_string()]);
        assert!(report.errors.is_empty());
        assert_eq!(report.total_processed(), 2);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_summary_lists_remedies_once_per_kind() {
        let mut report = InstallationReport::new();
        for name in ["A", "B"] {
            report.record(
                name,
                ModOutcome::Failed {
                    kind: ErrorKind::NotFound,
                    error: "HTTP 404".into(),
                },
            );
        }
        report.record(
            "C",
            ModOutcome::Updated {
                from: Some("1.0".into()),
                to: "1.1".into(),
            },
        );

        let summary = report.summary();
        assert!(summary.contains("0 installed, 1 updated, 0 skipped, 2 failed"));
        assert!(summary.contains("C (1.0 -> 1.1)"));
        assert_eq!(summary.matches(ErrorKind::NotFound.remedy()).count(), 1);
        assert_eq!(report.error_kinds(), vec![ErrorKind::NotFound]);
    }

    #[test]
    fn test_serializes_to_json() {
        let mut report = InstallationReport::new();
        report.record("A", ModOutcome::Installed);
        report.duration = Duration::from_millis(1500);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["installed"][0], "A");
        assert_eq!(json["duration"], 1.5);
        assert!(json.get("seen").is_none());
    }
}
