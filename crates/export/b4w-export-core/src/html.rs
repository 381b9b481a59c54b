//! Single-file HTML bundle: player template, script, style, and every
//! exported resource base64-encoded into one data map.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use log::{debug, info};
use serde_json::Value;

use crate::config::ExportConfig;
use crate::context::ExportContext;
use crate::error::ExportError;
use crate::paths;
use crate::scene::SceneGraph;
use crate::template::substitute;
use crate::walker::{export_scene, write_atomic, ExportOutput};

/// Player runtime files read from a webplayer directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebplayerAssets {
    pub dir: String,
    pub template: String,
    pub script: String,
    pub style: String,
}

fn read_text(path: &str) -> Result<Option<String>, ExportError> {
    if !Path::new(path).is_file() {
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|e| ExportError::file(path, e))
}

impl WebplayerAssets {
    /// Load the runtime from `dir`. The template is looked up under
    /// `template/` first, then in `dir` itself; script and style are
    /// optional and default to empty.
    pub fn load(dir: &str, config: &ExportConfig) -> Result<Self, ExportError> {
        let nested = paths::join(dir, &format!("template/{}", config.template_name));
        let flat = paths::join(dir, &config.template_name);
        let template = match read_text(&nested)? {
            Some(t) => t,
            None => read_text(&flat)?.ok_or(ExportError::MissingResource { path: flat })?,
        };
        let script = read_text(&paths::join(dir, &config.script_name))?.unwrap_or_default();
        let style = read_text(&paths::join(dir, &config.style_name))?.unwrap_or_default();
        Ok(Self {
            dir: dir.to_string(),
            template,
            script,
            style,
        })
    }
}

/// Values substituted into the template.
#[derive(Clone, Copy, Debug)]
pub struct HtmlParts<'a> {
    pub template: &'a str,
    pub scripts: &'a str,
    pub styles: &'a str,
    pub built_in_data: &'a str,
    pub b4w_meta: &'a str,
}

pub fn bundle(parts: &HtmlParts<'_>) -> Result<String, ExportError> {
    let mut values = IndexMap::new();
    values.insert("scripts", parts.scripts.to_string());
    values.insert("styles", parts.styles.to_string());
    values.insert("built_in_data", parts.built_in_data.to_string());
    values.insert("b4w_meta", parts.b4w_meta.to_string());
    substitute(parts.template, &values)
}

/// `<meta>` tag pointing back at the source file, relative to the bundle.
pub fn meta_tag(blend_relative: &str) -> String {
    let content = escape_attr(blend_relative);
    format!("<meta name='b4w_export_path_html' content='{content}'/>")
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn encoded(ctx: &ExportContext, path: &str, base_dir: &str) -> Result<Option<String>, ExportError> {
    Ok(ctx
        .packer()
        .resolve(path, base_dir)?
        .map(|bytes| STANDARD.encode(&*bytes)))
}

fn required(ctx: &ExportContext, path: &str, base_dir: &str) -> Result<Value, ExportError> {
    encoded(ctx, path, base_dir)?
        .map(Value::String)
        .ok_or_else(|| ExportError::MissingResource {
            path: paths::normalize(&paths::join(base_dir, path)),
        })
}

fn add_converted(
    ctx: &mut ExportContext,
    data: &mut IndexMap<String, Value>,
    base_dir: &str,
    source: &str,
    converted: String,
) -> Result<(), ExportError> {
    if ctx.packer().is_packed(source) {
        ctx.err(format!(
            "Packed media '{source}' has not been exported to '{converted}'"
        ));
        return Ok(());
    }
    match encoded(ctx, &converted, base_dir)? {
        Some(b64) => {
            data.insert(converted, Value::String(b64));
        }
        None => {
            ctx.warn(format!("Converted media '{converted}' not found."));
            data.insert(converted, Value::Null);
        }
    }
    Ok(())
}

fn movie_variant(path: &str) -> Option<String> {
    let (stem, ext) = paths::split_ext(path);
    match ext {
        ".ogv" | ".m4v" => Some(format!("{stem}.altconv.webm")),
        ".webm" => Some(format!("{stem}.altconv.m4v")),
        _ => None,
    }
}

fn sound_variant(path: &str) -> Option<String> {
    let (stem, ext) = paths::split_ext(path);
    match ext {
        ".mp3" | ".mp4" => Some(format!("{stem}.altconv.ogg")),
        ".ogg" => Some(format!("{stem}.altconv.mp4")),
        _ => None,
    }
}

/// Build the data map embedded in the bundle. Messages raised here are
/// appended to the embedded manifest.
pub fn extract_data(
    ctx: &mut ExportContext,
    output: &ExportOutput,
    webplayer_dir: &str,
) -> Result<IndexMap<String, Value>, ExportError> {
    let main_file = ctx.config().html_main_file.clone();
    let base_dir = paths::dirname(ctx.export_path()).to_string();
    let warnings_before = ctx.messages().warnings.len();
    let errors_before = ctx.messages().errors.len();
    let manifest = &output.manifest;

    let mut data: IndexMap<String, Value> = IndexMap::new();
    data.insert("main_file".to_string(), Value::String(main_file.clone()));
    // placeholder keeps the key first; the final manifest replaces it below
    data.insert(main_file.clone(), Value::Null);

    if let (Some(binfile), Some(blob)) = (manifest.binfile(), &output.binary) {
        data.insert(binfile.to_string(), Value::String(STANDARD.encode(blob)));
    }

    let convert = ctx.config().export_converted_media;
    for img in &manifest.images {
        if img.source != "FILE" && img.source != "MOVIE" {
            continue;
        }
        let value = required(ctx, &img.filepath, &base_dir)?;
        data.insert(img.filepath.clone(), value);
        if img.source == "MOVIE" && convert {
            if let Some(conv) = movie_variant(&img.filepath) {
                add_converted(ctx, &mut data, &base_dir, &img.filepath, conv)?;
                let seq = format!("{}.altconv.seq", paths::split_ext(&img.filepath).0);
                add_converted(ctx, &mut data, &base_dir, &img.filepath, seq)?;
            }
        }
    }

    for snd in &manifest.sounds {
        let value = required(ctx, &snd.filepath, &base_dir)?;
        data.insert(snd.filepath.clone(), value);
        if convert {
            if let Some(conv) = sound_variant(&snd.filepath) {
                add_converted(ctx, &mut data, &base_dir, &snd.filepath, conv)?;
            }
        }
    }

    let assets = ctx.config().runtime_assets.clone();
    for name in assets {
        let full = paths::join(webplayer_dir, &name);
        let value = match encoded(ctx, &full, "")? {
            Some(b64) => Value::String(b64),
            None => {
                ctx.warn(format!("Runtime file '{full}' not found."));
                Value::Null
            }
        };
        data.insert(name, value);
    }

    let mut manifest = manifest.clone();
    let messages = ctx.messages();
    manifest
        .b4w_export_warnings
        .extend_from_slice(&messages.warnings[warnings_before..]);
    manifest
        .b4w_export_errors
        .extend_from_slice(&messages.errors[errors_before..]);
    data.insert(main_file, Value::String(manifest.to_json(false)?));
    debug!("html data map holds {} entries", data.len());
    Ok(data)
}

/// Export `graph` as a self-contained HTML document destined for
/// `export_path`.
pub fn export_html(
    ctx: &mut ExportContext,
    graph: &SceneGraph,
    export_path: &str,
    webplayer: &WebplayerAssets,
) -> Result<String, ExportError> {
    let json_path = paths::join(paths::dirname(export_path), &ctx.config().html_main_file);
    let output = export_scene(ctx, graph, &json_path, true)?;
    let data = extract_data(ctx, &output, &webplayer.dir)?;

    let messages = ctx.messages();
    if ctx.config().strict_mode && !messages.is_empty() {
        return Err(ExportError::Strict {
            warnings: messages.warnings.len(),
            errors: messages.errors.len(),
        });
    }

    let built_in_data = serde_json::to_string(&data)?;
    let meta = meta_tag(&paths::blend_relative_to_export(&graph.filepath, export_path)?);
    bundle(&HtmlParts {
        template: &webplayer.template,
        scripts: &webplayer.script,
        styles: &webplayer.style,
        built_in_data: &built_in_data,
        b4w_meta: &meta,
    })
}

/// [`export_html`], written to `export_path` (`.html` appended if missing).
/// Returns the path written.
pub fn write_html_export(
    ctx: &mut ExportContext,
    graph: &SceneGraph,
    export_path: &str,
    webplayer: &WebplayerAssets,
) -> Result<String, ExportError> {
    let path = if export_path.to_lowercase().ends_with(".html") {
        export_path.to_string()
    } else {
        format!("{export_path}.html")
    };
    let html = export_html(ctx, graph, &path, webplayer)?;
    write_atomic(&path, html.as_bytes())?;
    info!("HTML file saved to {path}");
    Ok(path)
}
