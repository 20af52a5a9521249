//! Block rename mappings.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;

/// Old block name to new block name, loaded from a JSON object:
///
/// ```json
/// { "minecraft:grass_path": "minecraft:dirt_path" }
/// ```
///
/// Names are matched exactly, namespace included. Properties are carried
/// over untouched.
pub struct BlockMapping {
    renames: IndexMap<String, String>,
}

impl BlockMapping {
    /// The mapping that renames nothing.
    pub fn identity() -> Self {
        Self {
            renames: IndexMap::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading block mapping {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let renames: IndexMap<String, String> =
            serde_json::from_str(text).context("parsing block mapping")?;
        Ok(Self { renames })
    }

    /// The new name for `name`, if the mapping renames it.
    pub fn rename(&self, name: &str) -> Option<&str> {
        self.renames.get(name).map(String::as_str)
    }

    pub fn is_identity(&self) -> bool {
        self.renames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_json_object() {
        let mapping = BlockMapping::from_json(
            r#"{ "minecraft:grass_path": "minecraft:dirt_path",
                 "minecraft:cauldron": "minecraft:water_cauldron" }"#,
        )
        .unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(
            mapping.rename("minecraft:grass_path"),
            Some("minecraft:dirt_path")
        );
        assert_eq!(mapping.rename("minecraft:stone"), None);
    }

    #[test]
    fn identity_renames_nothing() {
        let mapping = BlockMapping::identity();
        assert!(mapping.is_identity());
        assert_eq!(mapping.rename("minecraft:stone"), None);
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(BlockMapping::from_json("[1, 2, 3]").is_err());
    }
}
