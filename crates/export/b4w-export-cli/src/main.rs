use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use b4w_export::{write_html_export, write_json_export, ExportContext, WebplayerAssets};
use b4w_export_cli::reexport::reexport;
use b4w_export_cli::{bake_scene, load_scene, save_scene, ReexportOptions, ToolConfig};

#[derive(Parser, Debug)]
#[command(
    name = "b4w-export",
    version,
    about = "Bake, export and re-export Blend4Web scenes"
)]
struct Cli {
    /// JSON file with `bake` and `export` option sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bake armature actions into the scene's action library
    Bake(BakeArgs),
    /// Export a scene to a JSON manifest and binary
    Export(ExportArgs),
    /// Export a scene to a single self-contained HTML file
    ExportHtml(ExportHtmlArgs),
    /// Re-export every previously exported file under the given directories
    Reexport(ReexportArgs),
}

#[derive(Args, Debug)]
struct BakeArgs {
    /// Scene description to bake
    scene: PathBuf,
    /// Where to write the baked scene (defaults to overwriting SCENE)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Objects to bake; every armature when omitted
    objects: Vec<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    scene: PathBuf,
    /// Output path (defaults to the path saved in the scene)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Remember the output path in the scene file
    #[arg(long)]
    save_path: bool,
}

#[derive(Args, Debug)]
struct ExportHtmlArgs {
    scene: PathBuf,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Web player runtime directory
    #[arg(long)]
    webplayer: PathBuf,
    #[arg(long)]
    save_path: bool,
}

#[derive(Args, Debug)]
struct ReexportArgs {
    /// Directories to scan recursively
    #[arg(required = true)]
    dirs: Vec<PathBuf>,
    /// Only classify; do not export anything
    #[arg(long)]
    report_only: bool,
    #[arg(long, conflicts_with = "html_only")]
    json_only: bool,
    #[arg(long)]
    html_only: bool,
    /// Web player runtime directory, needed to rebuild HTML files
    #[arg(long)]
    webplayer: Option<PathBuf>,
    /// Asset list that every JSON export should be registered in
    #[arg(long)]
    assets: Option<PathBuf>,
}

fn absolute(path: &Path) -> Result<String> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    Ok(abs.to_string_lossy().into_owned())
}

/// Explicit output, else the path remembered in the scene.
fn output_path(explicit: Option<&Path>, saved: Option<&str>, flag: &str) -> Result<String> {
    match (explicit, saved) {
        (Some(path), _) => absolute(path),
        (None, Some(saved)) if !saved.is_empty() => Ok(saved.to_string()),
        _ => Err(anyhow!("scene has no saved export path; pass {flag}")),
    }
}

fn run_bake(args: BakeArgs, cfg: &ToolConfig) -> Result<()> {
    let mut graph = load_scene(&args.scene)?;
    let summary = bake_scene(&mut graph, &args.objects, &cfg.bake);
    for name in &summary.baked {
        println!("baked {name}");
    }
    for (name, err) in &summary.skipped {
        println!("skipped {name}: {err}");
    }
    let out = args.output.as_deref().unwrap_or(&args.scene);
    save_scene(out, &graph)?;
    if !summary.failed.is_empty() {
        let names: Vec<&str> = summary.failed.iter().map(|(n, _)| n.as_str()).collect();
        bail!("bake failed for {}", names.join(", "));
    }
    Ok(())
}

fn run_export(args: ExportArgs, cfg: &ToolConfig) -> Result<()> {
    let mut graph = load_scene(&args.scene)?;
    let path = output_path(
        args.output.as_deref(),
        graph.export_path_json.as_deref(),
        "--output",
    )?;

    let mut ctx = ExportContext::init(cfg.export.clone())?;
    let out = write_json_export(&mut ctx, &graph, &path)?;
    let stats = ctx.shutdown();
    info!(
        "media lookups: {} packed, {} on disk, {} missing",
        stats.packed_hits, stats.disk_hits, stats.misses
    );
    for msg in out
        .manifest
        .b4w_export_warnings
        .iter()
        .chain(&out.manifest.b4w_export_errors)
    {
        eprintln!("{}", msg.text);
    }

    if args.save_path {
        graph.export_path_json = Some(path);
        save_scene(&args.scene, &graph)?;
    }
    println!("EXPORT OK");
    Ok(())
}

fn run_export_html(args: ExportHtmlArgs, cfg: &ToolConfig) -> Result<()> {
    let mut graph = load_scene(&args.scene)?;
    let path = output_path(
        args.output.as_deref(),
        graph.export_path_html.as_deref(),
        "--output",
    )?;
    let player = WebplayerAssets::load(&absolute(&args.webplayer)?, &cfg.export)?;

    let mut ctx = ExportContext::init(cfg.export.clone())?;
    let written = write_html_export(&mut ctx, &graph, &path, &player)?;
    ctx.shutdown();

    if args.save_path {
        graph.export_path_html = Some(written);
        save_scene(&args.scene, &graph)?;
    }
    println!("HTML EXPORT OK");
    Ok(())
}

fn run_reexport(args: ReexportArgs, cfg: ToolConfig) -> Result<()> {
    let opts = ReexportOptions {
        report_only: args.report_only,
        json: !args.html_only,
        html: !args.json_only,
        webplayer: args.webplayer,
        assets: args.assets,
        config: cfg,
    };
    reexport(&args.dirs, &opts)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = ToolConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Bake(args) => run_bake(args, &cfg),
        Command::Export(args) => run_export(args, &cfg),
        Command::ExportHtml(args) => run_export_html(args, &cfg),
        Command::Reexport(args) => run_reexport(args, cfg),
    }
}
