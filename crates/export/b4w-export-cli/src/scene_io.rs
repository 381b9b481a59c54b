use std::path::Path;

use anyhow::{Context, Result};

use b4w_export::SceneGraph;

/// Read a scene description. A description that names no source file is
/// its own source: `filepath` becomes the absolute path it was read from.
pub fn load_scene(path: &Path) -> Result<SceneGraph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    let mut graph = SceneGraph::from_json(&text)
        .with_context(|| format!("failed to parse scene {}", path.display()))?;
    if graph.filepath.is_empty() {
        let abs = std::path::absolute(path)
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        graph.filepath = abs.to_string_lossy().into_owned();
    }
    Ok(graph)
}

/// Write `graph` back, pretty-printed.
pub fn save_scene(path: &Path, graph: &SceneGraph) -> Result<()> {
    let text = serde_json::to_string_pretty(graph).context("failed to serialize scene")?;
    std::fs::write(path, text).with_context(|| format!("failed to write scene {}", path.display()))
}
