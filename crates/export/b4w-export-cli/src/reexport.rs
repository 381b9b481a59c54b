//! Batch re-export: find previously exported manifests and HTML bundles,
//! trace each back to its source scene, and export it again in place.
//!
//! Every file gets classified; a failure on one file never stops the batch.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Deserialize;
use walkdir::WalkDir;

use b4w_export::paths;
use b4w_export::{
    write_html_export, write_json_export, ExportContext, ManifestHeader, WebplayerAssets,
};

use crate::config::ToolConfig;
use crate::scene_io::load_scene;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Ok,
    BadJson,
    UnsavedBlend,
    Old,
    NoBlend,
    EmptyMetaContent,
    WrongPath,
    NotInManifest,
    ExportFailure(String),
    Crash(String),
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Ok => "[OK]",
            Classification::BadJson => "[BAD JSON]",
            Classification::UnsavedBlend => "[UNSAVED BLEND]",
            Classification::Old => "[OLD]",
            Classification::NoBlend => "[NO BLEND]",
            Classification::EmptyMetaContent => "[EMPTY META CONTENT]",
            Classification::WrongPath => "[WRONG PATH]",
            Classification::NotInManifest => "[NOT IN MANIFEST]",
            Classification::ExportFailure(_) => "[EXPORT FAILURE]",
            Classification::Crash(_) => "[CRASH]",
        }
    }

    /// Problems that do not stop processing of the file.
    pub fn is_warning(&self) -> bool {
        matches!(self, Classification::NotInManifest)
    }
}

/// One classification line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub path: PathBuf,
    pub class: Classification,
    /// Source scene involved, when known.
    pub scene: Option<PathBuf>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class.label(), self.path.display())?;
        if let Some(scene) = &self.scene {
            write!(f, " {}", scene.display())?;
        }
        match &self.class {
            Classification::ExportFailure(reason) | Classification::Crash(reason) => {
                write!(f, " ({reason})")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReexportOptions {
    /// Classify only; never export.
    pub report_only: bool,
    pub json: bool,
    pub html: bool,
    /// Runtime directory for HTML bundles.
    pub webplayer: Option<PathBuf>,
    /// Asset list every JSON export is expected to appear in.
    pub assets: Option<PathBuf>,
    pub config: ToolConfig,
}

#[derive(Debug, Deserialize)]
struct AssetGroup {
    #[serde(default)]
    items: Vec<AssetItem>,
}

#[derive(Debug, Deserialize)]
struct AssetItem {
    load_file: String,
}

/// Absolute paths of every `load_file` in an asset list, relative to the
/// list's directory.
fn load_asset_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read asset list {}", path.display()))?;
    let groups: Vec<AssetGroup> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse asset list {}", path.display()))?;
    let base = absolute(path.parent().unwrap_or(Path::new(".")));
    Ok(groups
        .iter()
        .flat_map(|g| &g.items)
        .map(|i| paths::normalize(&paths::join(&base, &i.load_file)))
        .collect())
}

fn absolute(path: &Path) -> String {
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    paths::normalize(&abs.to_string_lossy())
}

/// Files under `dirs` with extension `ext`, sorted per directory.
pub fn collect_files(dirs: &[PathBuf], ext: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for dir in dirs {
        let mut found: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|x| x == ext))
            .map(|e| e.into_path())
            .collect();
        found.sort();
        out.extend(found);
    }
    out
}

/// Value of `content` of the `<meta name="b4w_export_path_html">` tag, if
/// the document has one.
pub fn find_meta_content(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(start) = lower[from..].find("<meta") {
        let start = from + start;
        let end = lower[start..].find('>').map_or(html.len(), |e| start + e);
        let attrs = parse_attributes(&html[start + "<meta".len()..end]);
        let named = attrs
            .iter()
            .any(|(k, v)| k == "name" && v == "b4w_export_path_html");
        if named {
            if let Some((_, content)) = attrs.iter().find(|(k, _)| k == "content") {
                return Some(unescape_attr(content));
            }
        }
        from = end;
    }
    None
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = tag.trim_start_matches(|c: char| c.is_whitespace());
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace() || c == '/')
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();
        let mut value = String::new();
        if let Some(after) = rest.strip_prefix('=') {
            let after = after.trim_start();
            let quote = after.chars().next().filter(|c| *c == '\'' || *c == '"');
            let (v, tail) = match quote {
                Some(q) => {
                    let body = &after[1..];
                    let close = body.find(q).unwrap_or(body.len());
                    (&body[..close], body.get(close + 1..).unwrap_or(""))
                }
                None => {
                    let end = after.find(char::is_whitespace).unwrap_or(after.len());
                    (&after[..end], &after[end..])
                }
            };
            value = v.to_string();
            rest = tail;
        }
        if !key.is_empty() {
            attrs.push((key, value));
        }
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
    }
    attrs
}

struct Batch<'a> {
    opts: &'a ReexportOptions,
    assets: Option<Vec<String>>,
    webplayer: Option<WebplayerAssets>,
    reports: Vec<Report>,
}

impl Batch<'_> {
    fn report(&mut self, path: &Path, class: Classification, scene: Option<&Path>) {
        let report = Report {
            path: path.to_path_buf(),
            class,
            scene: scene.map(Path::to_path_buf),
        };
        println!("{report}");
        self.reports.push(report);
    }

    /// Source scene referenced relative to an exported file, if it exists.
    fn source_scene(&mut self, path: &Path, rel: &str) -> Option<PathBuf> {
        let dir = absolute(path.parent().unwrap_or(Path::new(".")));
        let scene = PathBuf::from(paths::normalize(&paths::join(&dir, rel)));
        if scene.is_file() {
            Some(scene)
        } else {
            self.report(path, Classification::NoBlend, None);
            None
        }
    }

    fn json(&mut self, path: &Path) {
        let header = match std::fs::read_to_string(path)
            .ok()
            .and_then(|t| ManifestHeader::from_json(&t).ok())
        {
            Some(h) => h,
            None => return self.report(path, Classification::BadJson, None),
        };
        if !matches!(header.version(), Some(v) if v > (0, 0)) {
            debug!("{} is not an export manifest", path.display());
            return;
        }
        let rel = match header.b4w_filepath_blend.as_deref() {
            Some("") => return self.report(path, Classification::UnsavedBlend, None),
            None => return self.report(path, Classification::Old, None),
            Some(rel) => rel.to_string(),
        };
        let Some(scene_path) = self.source_scene(path, &rel) else {
            return;
        };
        let graph = match load_scene(&scene_path) {
            Ok(g) => g,
            Err(e) => {
                return self.report(path, Classification::Crash(format!("{e:#}")), Some(&scene_path))
            }
        };

        let own = absolute(path);
        let saved = graph.export_path_json.as_deref().map(paths::normalize);
        if saved.as_deref() != Some(own.as_str()) {
            return self.report(path, Classification::WrongPath, Some(&scene_path));
        }
        if let Some(list) = &self.assets {
            if !list.contains(&own) {
                self.report(path, Classification::NotInManifest, Some(&scene_path));
            }
        }
        if self.opts.report_only {
            return;
        }

        let cfg = self.opts.config.export.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = ExportContext::init(cfg)?;
            write_json_export(&mut ctx, &graph, &own)?;
            ctx.shutdown();
            Ok::<_, b4w_export::ExportError>(())
        }));
        let class = match outcome {
            Ok(Ok(())) => Classification::Ok,
            Ok(Err(e)) => Classification::ExportFailure(e.to_string()),
            Err(_) => Classification::Crash("exporter panicked".to_string()),
        };
        let scene = (class != Classification::Ok).then_some(scene_path.as_path());
        self.report(path, class, scene);
    }

    fn html(&mut self, path: &Path) {
        let Ok(text) = std::fs::read_to_string(path) else {
            return self.report(path, Classification::Crash("unreadable file".into()), None);
        };
        let Some(rel) = find_meta_content(&text) else {
            debug!("{} carries no export meta tag", path.display());
            return;
        };
        if rel.is_empty() {
            return self.report(path, Classification::EmptyMetaContent, None);
        }
        let Some(scene_path) = self.source_scene(path, &rel) else {
            return;
        };
        let graph = match load_scene(&scene_path) {
            Ok(g) => g,
            Err(e) => {
                return self.report(path, Classification::Crash(format!("{e:#}")), Some(&scene_path))
            }
        };

        let own = absolute(path);
        let saved = graph.export_path_html.as_deref().map(paths::normalize);
        if saved.as_deref() != Some(own.as_str()) {
            return self.report(path, Classification::WrongPath, Some(&scene_path));
        }
        if self.opts.report_only {
            return;
        }

        let Some(player) = self.webplayer.as_ref() else {
            let reason = "no webplayer directory given".to_string();
            return self.report(path, Classification::ExportFailure(reason), Some(&scene_path));
        };
        let cfg = self.opts.config.export.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = ExportContext::init(cfg)?;
            write_html_export(&mut ctx, &graph, &own, player)?;
            ctx.shutdown();
            Ok::<_, b4w_export::ExportError>(())
        }));
        let class = match outcome {
            Ok(Ok(())) => Classification::Ok,
            Ok(Err(e)) => Classification::ExportFailure(e.to_string()),
            Err(_) => Classification::Crash("exporter panicked".to_string()),
        };
        let scene = (class != Classification::Ok).then_some(scene_path.as_path());
        self.report(path, class, scene);
    }
}

/// Classify (and unless `report_only`, re-export) every `.json` and
/// `.html` file under `dirs`. Returns one report per printed line.
pub fn reexport(dirs: &[PathBuf], opts: &ReexportOptions) -> Result<Vec<Report>> {
    let assets = opts.assets.as_deref().map(load_asset_list).transpose()?;
    let webplayer = match &opts.webplayer {
        Some(dir) if opts.html => Some(
            WebplayerAssets::load(&absolute(dir), &opts.config.export)
                .with_context(|| format!("failed to load webplayer from {}", dir.display()))?,
        ),
        _ => None,
    };
    let mut batch = Batch {
        opts,
        assets,
        webplayer,
        reports: Vec::new(),
    };

    if opts.json {
        for file in collect_files(dirs, "json") {
            batch.json(&file);
        }
    }
    if opts.html {
        for file in collect_files(dirs, "html") {
            batch.html(&file);
        }
    }

    let failures = batch
        .reports
        .iter()
        .filter(|r| r.class != Classification::Ok && !r.class.is_warning())
        .count();
    info!(
        "re-export finished: {} report(s), {} problem(s)",
        batch.reports.len(),
        failures
    );
    Ok(batch.reports)
}
