//! Tolerant version comparison for mod manifests.
//!
//! Mod authors write versions in every shape imaginable: `1.5.0`, `v2.0a`,
//! `0.98a-RC8`, `unknown`. Versions are tokenized into digit runs (compared
//! as integers) and letter runs (compared by the ordinal of their first
//! letter, `a` = 1), then compared position by position with missing
//! trailing tokens treated as 0.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

/// Compare two version strings.
///
/// Identical strings are always equal, even when they contain nothing
/// parseable. An empty version sorts below any non-empty one.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    match (a.trim().is_empty(), b.trim().is_empty()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    let left = tokenize(a);
    let right = tokenize(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

/// `true` when `candidate` is strictly newer than `installed`.
pub fn is_newer(candidate: &str, installed: &str) -> bool {
    compare_versions(candidate, installed) == Ordering::Greater
}

/// Strip a leading `version`/`v` prefix and lowercase.
fn normalize(version: &str) -> String {
    let lower = version.trim().to_lowercase();
    let stripped = lower
        .strip_prefix("version")
        .or_else(|| lower.strip_prefix('v'))
        .unwrap_or(&lower);
    stripped.trim().to_string()
}

fn tokenize(version: &str) -> Vec<u64> {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    let token_re = TOKEN_RE.get_or_init(|| Regex::new(r"\d+|[a-z]+").unwrap());

    let normalized = normalize(version);
    token_re
        .find_iter(&normalized)
        .map(|m| {
            let token = m.as_str();
            match token.as_bytes()[0] {
                // Digit runs longer than u64 saturate rather than fail
                b'0'..=b'9' => token.parse::<u64>().unwrap_or(u64::MAX),
                first => u64::from(first - b'a' + 1),
            }
        })
        .collect()
}
