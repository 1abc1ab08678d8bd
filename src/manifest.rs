//! Tolerant `mod_info.json` field extraction.
//!
//! Starsector manifests are "JSON-ish": unquoted keys, trailing commas,
//! `#` comments and single quotes are all common, so `serde_json` rejects a
//! large share of real-world files. Fields are pulled out with regexes over
//! the raw text instead. Nothing here fails: a missing or unreadable field
//! is `None` (or an empty list).

use std::sync::OnceLock;

use regex::Regex;

use crate::modlist::Dependency;

/// Fields of interest from a mod manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestMetadata {
    pub id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub game_version: Option<String>,
}

impl ManifestMetadata {
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.name.is_none()
            && self.version.is_none()
            && self.game_version.is_none()
    }
}

/// Extract id, name, version and game version in one pass.
pub fn extract_metadata(text: &str) -> ManifestMetadata {
    ManifestMetadata {
        id: extract_id(text),
        name: extract_name(text),
        version: extract_version(text),
        game_version: extract_game_version(text),
    }
}

pub fn extract_id(text: &str) -> Option<String> {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = ID_RE
        .get_or_init(|| Regex::new(r#"(?i)["']?\bid["']?\s*:\s*["']([^"']+)["']"#).unwrap());
    re.captures(text).map(|caps| caps[1].to_string())
}

pub fn extract_name(text: &str) -> Option<String> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE
        .get_or_init(|| Regex::new(r#"(?i)["']?\bname["']?\s*:\s*["']([^"']+)["']"#).unwrap());
    re.captures(text).map(|caps| caps[1].to_string())
}

pub fn extract_game_version(text: &str) -> Option<String> {
    static GAME_VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = GAME_VERSION_RE.get_or_init(|| {
        Regex::new(r#"(?i)"?gameVersion"?\s*:\s*["']([^"']+)["']"#).unwrap()
    });
    re.captures(text).map(|caps| caps[1].trim().to_string())
}

/// Extract the mod's own version.
///
/// The structured form `version: {major: 0, minor: 12, patch: "1b"}` wins
/// over a flat `"version": "0.12.1b"`. Keys immediately preceded by `game`
/// (i.e. `gameVersion`) are never taken as the mod version.
pub fn extract_version(text: &str) -> Option<String> {
    extract_structured_version(text).or_else(|| extract_flat_version(text))
}

fn extract_structured_version(text: &str) -> Option<String> {
    static BLOCK_RE: OnceLock<Regex> = OnceLock::new();
    static MAJOR_RE: OnceLock<Regex> = OnceLock::new();
    static MINOR_RE: OnceLock<Regex> = OnceLock::new();
    static PATCH_RE: OnceLock<Regex> = OnceLock::new();

    let block_re =
        BLOCK_RE.get_or_init(|| Regex::new(r#"(?i)"?version"?\s*:\s*\{([^}]+)\}"#).unwrap());
    let major_re = MAJOR_RE
        .get_or_init(|| Regex::new(r#"(?i)"?major"?\s*:\s*["']?([0-9]+)"#).unwrap());
    let minor_re = MINOR_RE
        .get_or_init(|| Regex::new(r#"(?i)"?minor"?\s*:\s*["']?([0-9]+)"#).unwrap());
    let patch_re = PATCH_RE
        .get_or_init(|| Regex::new(r#"(?i)"?patch"?\s*:\s*["']?([0-9a-zA-Z]+)"#).unwrap());

    for caps in block_re.captures_iter(text) {
        let whole = caps.get(0)?;
        if preceded_by_game(text, whole.start()) {
            continue;
        }
        let block = &caps[1];

        let Some(major) = major_re.captures(block) else {
            continue;
        };
        let mut parts = vec![major[1].to_string()];
        // Stop at the first missing component so "major + patch" never
        // turns into a two-part version that looks like major.minor
        if let Some(minor) = minor_re.captures(block) {
            parts.push(minor[1].to_string());
            if let Some(patch) = patch_re.captures(block) {
                parts.push(patch[1].to_string());
            }
        }
        return Some(parts.join("."));
    }

    None
}

fn extract_flat_version(text: &str) -> Option<String> {
    static FLAT_RE: OnceLock<Regex> = OnceLock::new();
    let re = FLAT_RE.get_or_init(|| {
        Regex::new(r#"(?i)"?version"?\s*:\s*["']?([0-9]+[0-9a-zA-Z._-]*)"#).unwrap()
    });

    re.captures_iter(text)
        .filter(|caps| {
            caps.get(0)
                .map(|m| !preceded_by_game(text, m.start()))
                .unwrap_or(false)
        })
        .map(|caps| {
            caps[1]
                .trim_end_matches(['.', '-', '_'])
                .to_string()
        })
        .find(|v| !v.is_empty())
}

/// `true` when the key starting at `start` is really `gameVersion`.
fn preceded_by_game(text: &str, start: usize) -> bool {
    let head = &text[..start];
    let head = head.strip_suffix('"').unwrap_or(head);
    head.len() >= 4
        && head.is_char_boundary(head.len() - 4)
        && head[head.len() - 4..].eq_ignore_ascii_case("game")
}

/// Extract declared dependencies.
///
/// Two dialects are understood: a list of objects
/// (`[{"id": "lw_lazylib", "name": "LazyLib"}]`) and a flat list of ids
/// (`["lw_lazylib", "MagicLib"]`). A missing or malformed block yields an
/// empty list.
pub fn extract_dependencies(text: &str) -> Vec<Dependency> {
    static DEPS_RE: OnceLock<Regex> = OnceLock::new();
    static OBJECT_RE: OnceLock<Regex> = OnceLock::new();
    static QUOTED_RE: OnceLock<Regex> = OnceLock::new();

    let deps_re = DEPS_RE
        .get_or_init(|| Regex::new(r#"(?is)"?dependencies"?\s*:\s*\[(.*?)\]"#).unwrap());
    let object_re = OBJECT_RE.get_or_init(|| Regex::new(r"(?s)\{([^}]*)\}").unwrap());
    let quoted_re = QUOTED_RE.get_or_init(|| Regex::new(r#"["']([^"']+)["']"#).unwrap());

    let Some(caps) = deps_re.captures(text) else {
        return Vec::new();
    };
    let body = &caps[1];

    if body.contains('{') {
        return object_re
            .captures_iter(body)
            .filter_map(|obj| {
                let fields = &obj[1];
                let dep = Dependency {
                    id: extract_id(fields),
                    name: extract_name(fields),
                };
                (dep.id.is_some() || dep.name.is_some()).then_some(dep)
            })
            .collect();
    }

    quoted_re
        .captures_iter(body)
        .map(|q| Dependency {
            id: Some(q[1].to_string()),
            name: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRICT_JSON: &str = r#"{
        "id": "lw_lazylib",
        "name": "LazyLib",
        "author": "LazyWizard",
        "version": "2.8b",
        "gameVersion": "0.97a-RC11",
        "description": "Library"
    }"#;

    // Hand-edited dialect: unquoted keys, comments, structured version,
    // gameVersion listed before version
    const LOOSE: &str = r#"{
        id:"MagicLib", # the id
        name:"MagicLib",
        gameVersion:"0.98a-RC8",
        version:{major:1, minor:5, patch:"RC2"},
        dependencies: [ {id: "lw_lazylib", name: "LazyLib"}, ],
    }"#;

    #[test]
    fn test_strict_json_manifest() {
        let meta = extract_metadata(STRICT_JSON);
        assert_eq!(meta.id.as_deref(), Some("lw_lazylib"));
        assert_eq!(meta.name.as_deref(), Some("LazyLib"));
        assert_eq!(meta.version.as_deref(), Some("2.8b"));
        assert_eq!(meta.game_version.as_deref(), Some("0.97a-RC11"));
    }

    #[test]
    fn test_structured_version_joined() {
        assert_eq!(extract_version(LOOSE).as_deref(), Some("1.5.RC2"));
        let meta = extract_metadata(LOOSE);
        assert_eq!(meta.id.as_deref(), Some("MagicLib"));
        assert_eq!(meta.game_version.as_deref(), Some("0.98a-RC8"));
    }

    #[test]
    fn test_structured_version_quoted_parts() {
        let text = r#""version": {"major": "0", "minor": "12", "patch": "1b"}"#;
        assert_eq!(extract_version(text).as_deref(), Some("0.12.1b"));
    }

    #[test]
    fn test_structured_version_partial() {
        assert_eq!(
            extract_version("version: {major: 3}").as_deref(),
            Some("3")
        );
        assert_eq!(
            extract_version("version: {major: 3, minor: 1}").as_deref(),
            Some("3.1")
        );
    }

    #[test]
    fn test_structured_beats_flat() {
        let text = r#"{"version": {"major": 2, "minor": 0}, "oldVersion": "1.0"}"#;
        assert_eq!(extract_version(text).as_deref(), Some("2.0"));
    }

    #[test]
    fn test_game_version_not_taken_as_version() {
        let text = r#"{"gameVersion": "0.95.1a-RC6", "version": "1.2.3"}"#;
        assert_eq!(extract_version(text).as_deref(), Some("1.2.3"));

        let only_game = r#"{"gameVersion": "0.95.1a-RC6"}"#;
        assert_eq!(extract_version(only_game), None);

        let unquoted = "gameversion: '0.9', version: '4.0.1'";
        assert_eq!(extract_version(unquoted).as_deref(), Some("4.0.1"));
    }

    #[test]
    fn test_flat_version_trims_trailing_punctuation() {
        assert_eq!(extract_version(r#"version: 1.0.,"#).as_deref(), Some("1.0"));
        assert_eq!(extract_version(r#"'version':'3.1-'"#).as_deref(), Some("3.1"));
    }

    #[test]
    fn test_non_numeric_version_absent() {
        assert_eq!(extract_version(r#""version": "beta""#), None);
    }

    #[test]
    fn test_id_does_not_match_inside_other_keys() {
        let text = r#"{"uuid": "0000", "id": "real_id"}"#;
        assert_eq!(extract_id(text).as_deref(), Some("real_id"));
    }

    #[test]
    fn test_garbage_yields_empty() {
        let meta = extract_metadata("not a manifest at all {{{");
        assert!(meta.is_empty());
        assert!(extract_dependencies("dependencies: [").is_empty());
        assert!(extract_dependencies("").is_empty());
    }

    #[test]
    fn test_dependencies_flat_list() {
        let deps = extract_dependencies(r#""dependencies": ["lw_lazylib", 'MagicLib']"#);
        let ids: Vec<_> = deps.iter().filter_map(|d| d.id.as_deref()).collect();
        assert_eq!(ids, vec!["lw_lazylib", "MagicLib"]);
    }

    #[test]
    fn test_dependencies_object_list() {
        let deps = extract_dependencies(LOOSE);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].id.as_deref(), Some("lw_lazylib"));
        assert_eq!(deps[0].name.as_deref(), Some("LazyLib"));
    }

    #[test]
    fn test_dependencies_multiline_objects() {
        let text = r#"{
            "dependencies": [
                {
                    "id": "shaderLib",
                    "name": "GraphicsLib"
                },
                {
                    "id": "MagicLib"
                }
            ]
        }"#;
        let deps = extract_dependencies(text);
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name.as_deref(), Some("GraphicsLib"));
        assert_eq!(deps[1].id.as_deref(), Some("MagicLib"));
        assert_eq!(deps[1].name, None);
    }
}
