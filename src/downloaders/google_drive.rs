//! Google Drive link handling
//!
//! Drive serves an HTML "virus scan warning" page instead of the file for
//! anything it cannot scan. Share links (`/file/d/<id>/view`) hit that page
//! every time; the `drive.usercontent.google.com` endpoint with
//! `confirm=t` usually skips it.

use std::sync::OnceLock;

use anyhow::{bail, Result};
use regex::Regex;
use tracing::debug;

const DIRECT_BASE: &str = "https://drive.usercontent.google.com/download";

/// Lowercased host of a URL, if it parses
pub fn domain_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

/// `true` for `drive.google.com` and `drive.usercontent.google.com` links
pub fn is_google_drive_url(url: &str) -> bool {
    let domain = domain_of(url).unwrap_or_else(|| url.to_ascii_lowercase());
    domain.contains("drive.google.com") || domain.contains("drive.usercontent.google.com")
}

/// Extract the file id from `/d/<id>` or `?id=<id>` forms
pub fn extract_file_id(url: &str) -> Option<String> {
    static PATH_ID_RE: OnceLock<Regex> = OnceLock::new();
    static QUERY_ID_RE: OnceLock<Regex> = OnceLock::new();

    let path_re = PATH_ID_RE.get_or_init(|| Regex::new(r"/d/([a-zA-Z0-9_-]+)").unwrap());
    if let Some(caps) = path_re.captures(url) {
        return Some(caps[1].to_string());
    }

    let query_re = QUERY_ID_RE.get_or_init(|| Regex::new(r"[?&]id=([a-zA-Z0-9_-]+)").unwrap());
    query_re.captures(url).map(|caps| caps[1].to_string())
}

/// Direct-download URL for a Drive file id
pub fn direct_download_url(file_id: &str) -> String {
    format!("{}?id={}&export=download&confirm=t", DIRECT_BASE, file_id)
}

/// Rewrite a `drive.google.com` share link into a direct-download link.
///
/// Returns `None` for non-Drive URLs, links without a file id, and links
/// that are already in the direct form.
pub fn fix_google_drive_url(url: &str) -> Option<String> {
    if !is_google_drive_url(url) {
        return None;
    }
    let file_id = extract_file_id(url)?;
    let fixed = direct_download_url(&file_id);
    (fixed != url).then_some(fixed)
}

/// Pull the real download URL out of a Drive confirmation page.
///
/// Tries, in order: a `uuid` token, an old-style `/uc?export=download` link,
/// an embedded `downloadUrl`, and a `confirm=` token. A virus-scan warning
/// with none of those falls back to the plain `confirm=t` URL.
pub fn parse_confirmation_page(html: &str, file_id: &str) -> Result<String> {
    static UUID_RE: OnceLock<Regex> = OnceLock::new();
    static HREF_RE: OnceLock<Regex> = OnceLock::new();
    static JSON_RE: OnceLock<Regex> = OnceLock::new();
    static CONFIRM_RE: OnceLock<Regex> = OnceLock::new();
    static ERROR_RE: OnceLock<Regex> = OnceLock::new();

    let uuid_re = UUID_RE.get_or_init(|| Regex::new(r"uuid[&=]([a-f0-9-]+)").unwrap());
    if let Some(caps) = uuid_re.captures(html) {
        debug!("Found UUID token: {}", &caps[1]);
        return Ok(format!("{}&uuid={}", direct_download_url(file_id), &caps[1]));
    }

    let href_re =
        HREF_RE.get_or_init(|| Regex::new(r#"href="(/uc\?export=download[^"]+)""#).unwrap());
    if let Some(caps) = href_re.captures(html) {
        debug!("Found download link in page");
        return Ok(format!("https://docs.google.com{}", caps[1].replace("&amp;", "&")));
    }

    let json_re = JSON_RE.get_or_init(|| Regex::new(r#""downloadUrl":"([^"]+)""#).unwrap());
    if let Some(caps) = json_re.captures(html) {
        debug!("Found embedded downloadUrl");
        return Ok(caps[1]
            .replace(r"\u003d", "=")
            .replace(r"\u003f", "?")
            .replace(r"\u0026", "&"));
    }

    let confirm_re =
        CONFIRM_RE.get_or_init(|| Regex::new(r"confirm=([a-zA-Z0-9_-]+)").unwrap());
    if let Some(caps) = confirm_re.captures(html) {
        debug!("Found confirm token: {}", &caps[1]);
        return Ok(format!(
            "{}?id={}&export=download&confirm={}",
            DIRECT_BASE, file_id, &caps[1]
        ));
    }

    if html.contains("Virus scan warning") || html.contains("can't scan this file for viruses") {
        return Ok(direct_download_url(file_id));
    }

    let error_re = ERROR_RE
        .get_or_init(|| Regex::new(r#"<p class="uc-error-subcaption">(.*?)</p>"#).unwrap());
    if let Some(caps) = error_re.captures(html) {
        bail!("Google Drive error: {}", &caps[1]);
    }

    bail!("Could not extract download URL from Google Drive confirmation page")
}
