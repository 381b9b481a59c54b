//! Shared test fixtures: scene descriptions, media files and a minimal web
//! player runtime, indexed by `fixtures/manifest.json` at the workspace root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static INDEX: Lazy<Index> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../../../fixtures/manifest.json"))
        .expect("fixtures/manifest.json should parse")
});

#[derive(Debug, Deserialize)]
struct Index {
    scenes: HashMap<String, String>,
    media: HashMap<String, String>,
    webplayer: String,
}

#[derive(Clone, Copy, Debug)]
enum Kind {
    Scene,
    Media,
}

impl Kind {
    fn table(self) -> &'static HashMap<String, String> {
        match self {
            Kind::Scene => &INDEX.scenes,
            Kind::Media => &INDEX.media,
        }
    }

    fn locate(self, name: &str) -> Result<PathBuf> {
        let rel = self
            .table()
            .get(name)
            .ok_or_else(|| anyhow!("no {self:?} fixture named '{name}'"))?;
        Ok(root().join(rel))
    }
}

fn root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

/// Scene descriptions, as consumed by the exporter.
pub mod scenes {
    use super::*;

    pub fn json(name: &str) -> Result<String> {
        let path = Kind::Scene.locate(name)?;
        std::fs::read_to_string(&path)
            .with_context(|| format!("reading scene fixture {}", path.display()))
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        serde_json::from_str(&json(name)?)
            .with_context(|| format!("scene fixture '{name}' does not match the requested type"))
    }
}

/// Image, sound and video files referenced by the scenes.
pub mod media {
    use super::*;

    pub fn bytes(name: &str) -> Result<Vec<u8>> {
        let path = Kind::Media.locate(name)?;
        std::fs::read(&path).with_context(|| format!("reading media fixture {}", path.display()))
    }
}

/// Directory holding the template, script, style and runtime textures.
pub fn webplayer_dir() -> PathBuf {
    root().join(&INDEX.webplayer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_indexed_file_exists() {
        for (name, rel) in INDEX.scenes.iter().chain(INDEX.media.iter()) {
            assert!(root().join(rel).is_file(), "{name} -> {rel}");
        }
        assert!(webplayer_dir().join("template/webplayer_template.html").is_file());
    }
}
