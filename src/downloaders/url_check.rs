//! Pre-flight URL reachability report
//!
//! Every download URL is probed with HEAD (falling back to a one-byte ranged
//! GET when HEAD fails or is refused with 403) and bucketed by host. Probes
//! that failed at the connection level get one more, narrower round.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::google_drive::domain_of;
use super::http::{truncate, Fetch};
use super::{run_pool, DownloadError};
use crate::modlist::ModDescriptor;

/// Parallel probes in the first round
pub const VALIDATION_WORKERS: usize = 5;

/// Parallel probes in the retry round
const RETRY_WORKERS: usize = 3;

const MAX_ERROR_LEN: usize = 50;

/// A URL that did not answer with 2xx
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlCheckFailure {
    pub name: String,
    pub url: String,
    pub domain: Option<String>,
    /// HTTP status, or 0 for connection-level failures
    pub status: u16,
    pub error: String,
}

/// Reachable URLs grouped by host, plus failures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlCheckReport {
    pub github: Vec<String>,
    pub google_drive: Vec<String>,
    /// Domain to mod names
    pub other: BTreeMap<String, Vec<String>>,
    pub failed: Vec<UrlCheckFailure>,
}

impl UrlCheckReport {
    pub fn total_ok(&self) -> usize {
        self.github.len() + self.google_drive.len() + self.other.values().map(Vec::len).sum::<usize>()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Github,
    GoogleDrive,
    Other,
}

#[derive(Debug)]
enum Probe {
    Ok { bucket: Bucket, domain: String },
    Failed(UrlCheckFailure),
}

/// Probe every mod URL and group the results.
///
/// `progress` is called with `(done, total, mod name)` as probes finish.
pub fn validate_mod_urls<F: Fetch>(
    mods: &[ModDescriptor],
    fetcher: &F,
    progress: Option<&(dyn Fn(usize, usize, &str) + Sync)>,
) -> UrlCheckReport {
    let total = mods.len();
    let done = std::sync::atomic::AtomicUsize::new(0);

    let mut probes: Vec<Probe> = run_pool(VALIDATION_WORKERS, || {
        mods.par_iter()
            .map(|m| {
                let probe = check_url(m, fetcher);
                let n = done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                if let Some(cb) = progress {
                    cb(n, total, &m.name);
                }
                probe
            })
            .collect()
    })
    .unwrap_or_else(|e| {
        warn!("Probe pool unavailable ({}), checking sequentially", e);
        mods.iter().map(|m| check_url(m, fetcher)).collect()
    });

    // One more try for connection-level failures only
    let retry_indices: Vec<usize> = probes
        .iter()
        .enumerate()
        .filter(|(_, p)| matches!(p, Probe::Failed(f) if f.status == 0 && !f.url.is_empty()))
        .map(|(i, _)| i)
        .collect();

    if !retry_indices.is_empty() {
        info!("Retrying {} URL(s) that failed to connect", retry_indices.len());
        let retried: Vec<(usize, Probe)> = run_pool(RETRY_WORKERS, || {
            retry_indices
                .par_iter()
                .map(|&i| (i, check_url(&mods[i], fetcher)))
                .collect()
        })
        .unwrap_or_else(|_| {
            retry_indices
                .iter()
                .map(|&i| (i, check_url(&mods[i], fetcher)))
                .collect()
        });
        for (i, probe) in retried {
            probes[i] = probe;
        }
    }

    let mut report = UrlCheckReport::default();
    for (descriptor, probe) in mods.iter().zip(probes) {
        match probe {
            Probe::Ok { bucket: Bucket::Github, .. } => report.github.push(descriptor.name.clone()),
            Probe::Ok { bucket: Bucket::GoogleDrive, .. } => {
                report.google_drive.push(descriptor.name.clone())
            }
            Probe::Ok { bucket: Bucket::Other, domain } => report
                .other
                .entry(domain)
                .or_default()
                .push(descriptor.name.clone()),
            Probe::Failed(failure) => report.failed.push(failure),
        }
    }

    debug!(
        "URL check: {} ok, {} failed",
        report.total_ok(),
        report.failed.len()
    );
    report
}

fn check_url<F: Fetch>(descriptor: &ModDescriptor, fetcher: &F) -> Probe {
    let url = descriptor.download_url.trim();
    let fail = |domain: Option<String>, status: u16, error: String| {
        Probe::Failed(UrlCheckFailure {
            name: descriptor.name.clone(),
            url: url.to_string(),
            domain,
            status,
            error,
        })
    };

    if url.is_empty() {
        return fail(None, 0, "No download URL".to_string());
    }

    let domain = domain_of(url).unwrap_or_else(|| "unknown".to_string());
    let bucket = if domain.contains("github.com") {
        Bucket::Github
    } else if domain.contains("drive.google.com") || domain.contains("drive.usercontent.google.com") {
        Bucket::GoogleDrive
    } else {
        Bucket::Other
    };

    let status = match fetcher.head(url) {
        Ok(status) if status != 403 => Ok(status),
        _ => fetcher.probe_range(url),
    };

    match status {
        Ok(status) if (200..300).contains(&status) => Probe::Ok { bucket, domain },
        Ok(status) => fail(Some(domain), status, format!("HTTP {}", status)),
        Err(DownloadError::Timeout(_)) => fail(Some(domain), 0, "Timeout".to_string()),
        Err(e) => fail(Some(domain), 0, truncate(&e.to_string(), MAX_ERROR_LEN)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloaders::test_support::{FakeFetcher, Reply};
    use std::sync::Mutex;

    fn mods(urls: &[(&str, &str)]) -> Vec<ModDescriptor> {
        urls.iter().map(|(n, u)| ModDescriptor::new(*n, *u)).collect()
    }

    #[test]
    fn test_buckets_by_domain() {
        let list = mods(&[
            ("Lazy", "https://github.com/a/lazy/releases/download/1/lazy.zip"),
            ("Drive", "https://drive.google.com/uc?id=X"),
            ("Other1", "https://fractalsoftworks.com/a.zip"),
            ("Other2", "https://fractalsoftworks.com/b.zip"),
            ("Dead", "https://example.com/dead.zip"),
            ("Empty", ""),
        ]);
        let fetcher = FakeFetcher::default()
            .on_probe("https://github.com/a/lazy/releases/download/1/lazy.zip", vec![Reply::status(200)])
            .on_probe("https://drive.google.com/uc?id=X", vec![Reply::status(200)])
            .on_probe("https://fractalsoftworks.com/a.zip", vec![Reply::status(204)])
            .on_probe("https://fractalsoftworks.com/b.zip", vec![Reply::status(200)])
            .on_probe("https://example.com/dead.zip", vec![Reply::status(404)]);

        let report = validate_mod_urls(&list, &fetcher, None);
        assert_eq!(report.github, vec!["Lazy".to_string()]);
        assert_eq!(report.google_drive, vec!["Drive".to_string()]);
        assert_eq!(
            report.other["fractalsoftworks.com"],
            vec!["Other1".to_string(), "Other2".to_string()]
        );
        assert_eq!(report.failed.len(), 2);

        let dead = report.failed.iter().find(|f| f.name == "Dead").unwrap();
        assert_eq!(dead.status, 404);
        assert_eq!(dead.error, "HTTP 404");
        let empty = report.failed.iter().find(|f| f.name == "Empty").unwrap();
        assert_eq!(empty.error, "No download URL");
        assert_eq!(report.total_ok(), 4);
    }

    #[test]
    fn test_head_403_falls_back_to_range_get() {
        let url = "https://example.com/guarded.zip";
        let fetcher = FakeFetcher::default().on_probe(url, vec![Reply::status(403), Reply::status(206)]);

        let report = validate_mod_urls(&mods(&[("Guarded", url)]), &fetcher, None);
        assert_eq!(report.other["example.com"], vec!["Guarded".to_string()]);
        assert_eq!(fetcher.call_count("HEAD"), 1);
        assert_eq!(fetcher.call_count("RANGE"), 1);
    }

    #[test]
    fn test_connection_failures_get_one_retry_round() {
        let flaky = "https://flaky.example/a.zip";
        let down = "https://down.example/b.zip";
        let fetcher = FakeFetcher::default()
            // HEAD + range fail in round one, HEAD succeeds in round two
            .on_probe(flaky, vec![Reply::Refused, Reply::Timeout, Reply::status(200)])
            .on_probe(down, vec![Reply::Timeout]);

        let report = validate_mod_urls(&mods(&[("Flaky", flaky), ("Down", down)]), &fetcher, None);
        assert_eq!(report.other["flaky.example"], vec!["Flaky".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "Down");
        assert_eq!(report.failed[0].status, 0);
        assert_eq!(report.failed[0].error, "Timeout");
        // Two probes per round, two rounds
        assert_eq!(fetcher.call_count("HEAD https://down.example"), 2);
        assert_eq!(fetcher.call_count("RANGE https://down.example"), 2);
    }

    #[test]
    fn test_http_errors_are_not_retried() {
        let url = "https://example.com/missing.zip";
        let fetcher = FakeFetcher::default().on_probe(url, vec![Reply::status(500)]);
        let report = validate_mod_urls(&mods(&[("Missing", url)]), &fetcher, None);
        assert_eq!(report.failed[0].status, 500);
        assert_eq!(fetcher.call_count("HEAD"), 1);
    }

    #[test]
    fn test_progress_reports_every_mod() {
        let list = mods(&[
            ("A", "https://a.example/a.zip"),
            ("B", "https://b.example/b.zip"),
            ("C", "https://c.example/c.zip"),
        ]);
        let fetcher = FakeFetcher::default();
        let seen = Mutex::new(Vec::new());
        let progress = |done: usize, total: usize, _name: &str| {
            seen.lock().unwrap().push((done, total));
        };

        validate_mod_urls(&list, &fetcher, Some(&progress));
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }
}
