use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::game::InlineEntrypoint;

/// Where the game module comes from.
#[derive(Clone)]
pub enum Entrypoint {
    /// Module constructed directly by host-side code.
    Inline(InlineEntrypoint),
    /// Path of a script to fetch through the content provider.
    Script(String),
}

impl Entrypoint {
    pub fn script(path: impl Into<String>) -> Self {
        Self::Script(path.into())
    }

    pub fn inline(entrypoint: InlineEntrypoint) -> Self {
        Self::Inline(entrypoint)
    }
}

impl fmt::Debug for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entrypoint::Inline(_) => f.write_str("Inline(..)"),
            Entrypoint::Script(path) => f.debug_tuple("Script").field(path).finish(),
        }
    }
}

impl Serialize for Entrypoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Entrypoint::Script(path) => serializer.serialize_str(path),
            Entrypoint::Inline(_) => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Entrypoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Entrypoint::Script)
    }
}

/// Named remote resource listed by a game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Declarative description of a game, owned by the embedding player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<Entrypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    /// Fields the host does not interpret (title, author, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GameHeader {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid game header")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read header {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn with_main(mut self, main: Entrypoint) -> Self {
        self.main = Some(main);
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(aspect_ratio.into());
        self
    }

    /// Looks up an asset path by its declared name.
    pub fn asset_path(&self, name: &str) -> Option<&str> {
        self.assets
            .iter()
            .find(|asset| asset.name.as_deref() == Some(name))
            .and_then(|asset| asset.path.as_deref())
    }

    /// JSON view of the header, as handed to game scripts.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "title": "Bunnies",
        "main": "game.lua",
        "aspectRatio": "16/9",
        "assets": [{ "name": "bunny", "path": "assets/bunny.rgba" }]
    }"#;

    #[test]
    fn parses_header_fields() {
        let header = GameHeader::from_json(SAMPLE).unwrap();
        assert!(matches!(header.main, Some(Entrypoint::Script(ref path)) if path == "game.lua"));
        assert_eq!(header.aspect_ratio.as_deref(), Some("16/9"));
        assert_eq!(header.asset_path("bunny"), Some("assets/bunny.rgba"));
        assert_eq!(header.asset_path("carrot"), None);
        assert_eq!(header.extra.get("title"), Some(&Value::from("Bunnies")));
        assert!(header.width.is_none());
    }

    #[test]
    fn empty_header_is_valid() {
        let header = GameHeader::from_json("{}").unwrap();
        assert!(header.main.is_none());
        assert!(header.assets.is_empty());
    }

    #[test]
    fn json_view_includes_write_back_fields() {
        let mut header = GameHeader::from_json(SAMPLE).unwrap();
        header.width = Some(128);
        header.height = Some(72);
        let json = header.to_json();
        assert_eq!(json["width"], 128);
        assert_eq!(json["height"], 72);
        assert_eq!(json["main"], "game.lua");
        assert_eq!(json["title"], "Bunnies");
    }
}
