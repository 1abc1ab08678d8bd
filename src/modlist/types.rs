//! Modlist data model
//!
//! Mirrors the persisted `modlist_config.json`. Unknown keys are kept in
//! `extra` so a load/save cycle never drops fields written by other tools.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::paths::normalize_mod_name;

/// Reference from one mod to another it requires
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DependencyRepr")]
pub struct Dependency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Dependencies may be written as a bare id or as an object
#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyRepr {
    Id(String),
    Full {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl From<DependencyRepr> for Dependency {
    fn from(repr: DependencyRepr) -> Self {
        match repr {
            DependencyRepr::Id(id) => Dependency {
                id: Some(id),
                name: None,
            },
            DependencyRepr::Full { id, name } => Dependency { id, name },
        }
    }
}

impl Dependency {
    /// Does this dependency refer to `candidate`? Ids are compared first,
    /// then normalized names.
    pub fn matches(&self, candidate: &ModDescriptor) -> bool {
        if let (Some(id), Some(candidate_id)) = (non_empty(&self.id), non_empty(&candidate.mod_id)) {
            return id.eq_ignore_ascii_case(candidate_id);
        }

        let wanted = self.name.as_deref().or(self.id.as_deref()).map(normalize_mod_name);
        match wanted {
            Some(wanted) if !wanted.is_empty() => wanted == normalize_mod_name(&candidate.name),
            _ => false,
        }
    }

    /// Display label: name when known, else id
    pub fn label(&self) -> &str {
        non_empty(&self.name)
            .or_else(|| non_empty(&self.id))
            .unwrap_or("<unnamed>")
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn default_category() -> String {
    "Uncategorized".to_string()
}

/// One mod entry of a modlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModDescriptor {
    /// Unique display key within a modlist
    pub name: String,

    #[serde(default)]
    pub download_url: String,

    /// Stable id from the mod's own manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<String>,

    /// Expected mod version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_version: Option<String>,

    /// Expected game version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_version: Option<String>,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ModDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            download_url: String::new(),
            mod_id: None,
            mod_version: None,
            game_version: None,
            category: default_category(),
            dependencies: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl ModDescriptor {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            ..Default::default()
        }
    }

    /// Expected version, ignoring blank strings
    pub fn expected_version(&self) -> Option<&str> {
        non_empty(&self.mod_version)
    }

    pub fn id(&self) -> Option<&str> {
        non_empty(&self.mod_id)
    }
}

/// A whole modlist as persisted on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModBatchConfig {
    #[serde(default)]
    pub modlist_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub starsector_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mods: Vec<ModDescriptor>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ModBatchConfig {
    fn default() -> Self {
        Self {
            modlist_name: "ASTRA".to_string(),
            version: "1.0".to_string(),
            starsector_version: "0.98a-RC8".to_string(),
            description: "Starsector Modlist".to_string(),
            mods: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl ModBatchConfig {
    /// Names that appear more than once, in first-seen order
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates: Vec<String> = Vec::new();
        for m in &self.mods {
            if !seen.insert(m.name.as_str()) && !duplicates.contains(&m.name) {
                duplicates.push(m.name.clone());
            }
        }
        duplicates
    }

    pub fn find(&self, name: &str) -> Option<&ModDescriptor> {
        self.mods.iter().find(|m| m.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ModDescriptor> {
        self.mods.iter_mut().find(|m| m.name == name)
    }
}
