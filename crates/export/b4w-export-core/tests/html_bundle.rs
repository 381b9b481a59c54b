use std::fs;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use b4w_export::{
    export_html, ids::media_digest, write_html_export, ExportConfig, ExportContext, ExportError,
    ExportManifest, SceneGraph, WebplayerAssets,
};
use b4w_test_fixtures::{media, scenes, webplayer_dir};
use serde_json::Value;
use tempfile::TempDir;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("project.blend"), b"BLENDER").unwrap();
        Self { dir }
    }

    fn root(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    fn add_media(&self, fixture: &str, rel: &str) {
        let target = self.dir.path().join(rel);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, media::bytes(fixture).unwrap()).unwrap();
    }

    fn scene(&self, name: &str) -> SceneGraph {
        let mut graph: SceneGraph = scenes::load(name).unwrap();
        graph.filepath = format!("{}/project.blend", self.root());
        graph
    }

    fn html_path(&self) -> String {
        format!("{}/deploy/app.html", self.root())
    }
}

fn webplayer(cfg: &ExportConfig) -> WebplayerAssets {
    WebplayerAssets::load(&webplayer_dir().to_string_lossy(), cfg).unwrap()
}

/// The data map literal embedded by the fixture template.
fn built_in_data(html: &str) -> &str {
    let start = html.find("var b4w_built_in_data = ").unwrap() + "var b4w_built_in_data = ".len();
    let len = html[start..].find(";</script>").unwrap();
    &html[start..start + len]
}

#[test]
fn bundle_embeds_manifest_binary_and_media() {
    let project = Project::new();
    project.add_media("checker", "textures/checker.png");
    let graph = project.scene("textured-quad");
    let cfg = ExportConfig::default();
    let player = webplayer(&cfg);

    let mut ctx = ExportContext::init(cfg).unwrap();
    let html = export_html(&mut ctx, &graph, &project.html_path(), &player).unwrap();

    assert!(html.contains("<meta name='b4w_export_path_html' content='../project.blend'/>"));
    assert!(html.contains("var b4w={init:function(){}};"));
    assert!(html.contains("body{margin:0}"));

    let raw = built_in_data(&html);
    assert!(raw.starts_with(r#"{"main_file":"main.json","main.json":"#));
    let data: Value = serde_json::from_str(raw).unwrap();

    let manifest = ExportManifest::from_json(data["main.json"].as_str().unwrap()).unwrap();
    assert_eq!(manifest.binfile(), Some("main.bin"));
    assert_eq!(manifest.b4w_filepath_blend, "../project.blend");

    let blob = STANDARD.decode(data["main.bin"].as_str().unwrap()).unwrap();
    assert_eq!(&blob[..4], b"B4WB");

    let checker = STANDARD
        .decode(data["../textures/checker.png"].as_str().unwrap())
        .unwrap();
    assert_eq!(checker, media::bytes("checker").unwrap());
    assert!(data["smaa_area_texture.png"].is_string());
    assert!(data["smaa_search_texture.png"].is_string());
}

#[test]
fn bundling_is_deterministic() {
    let project = Project::new();
    project.add_media("checker", "textures/checker.png");
    let graph = project.scene("textured-quad");
    let cfg = ExportConfig::default();
    let player = webplayer(&cfg);

    let mut ctx = ExportContext::init(cfg).unwrap();
    let first = export_html(&mut ctx, &graph, &project.html_path(), &player).unwrap();
    let second = export_html(&mut ctx, &graph, &project.html_path(), &player).unwrap();
    assert_eq!(first, second);
}

#[test]
fn converted_media_are_bundled_when_requested() {
    let project = Project::new();
    project.add_media("chime", "sounds/chime.ogg");
    let graph = project.scene("packed-media");
    let cfg = ExportConfig {
        export_converted_media: true,
        ..ExportConfig::default()
    };
    let player = webplayer(&cfg);
    let mut ctx = ExportContext::init(cfg).unwrap();

    // variant missing: bundled as null with a warning in the embedded manifest
    let html = export_html(&mut ctx, &graph, &project.html_path(), &player).unwrap();
    let data: Value = serde_json::from_str(built_in_data(&html)).unwrap();
    assert!(data["../sounds/chime.altconv.mp4"].is_null());
    let manifest = ExportManifest::from_json(data["main.json"].as_str().unwrap()).unwrap();
    assert_eq!(manifest.b4w_export_warnings.len(), 1);
    assert!(manifest.b4w_export_warnings[0].text.contains("chime.altconv.mp4"));

    // packed image is looked up under its salted digest name
    let logo = &graph.image("logo").unwrap().packed.as_ref().unwrap().0;
    let name = format!("{}.png", media_digest(logo, true));
    assert_eq!(manifest.images[0].filepath, name);
    assert_eq!(STANDARD.decode(data[&name].as_str().unwrap()).unwrap(), *logo);

    project.add_media("chime-mp4", "sounds/chime.altconv.mp4");
    let html = export_html(&mut ctx, &graph, &project.html_path(), &player).unwrap();
    let data: Value = serde_json::from_str(built_in_data(&html)).unwrap();
    assert_eq!(
        STANDARD
            .decode(data["../sounds/chime.altconv.mp4"].as_str().unwrap())
            .unwrap(),
        media::bytes("chime-mp4").unwrap()
    );
}

#[test]
fn packed_image_wins_over_a_stale_file_on_disk() {
    let project = Project::new();
    project.add_media("chime", "sounds/chime.ogg");
    let graph = project.scene("packed-media");
    let logo = &graph.image("logo").unwrap().packed.as_ref().unwrap().0;
    let name = format!("{}.png", media_digest(logo, true));
    let stale = project.dir.path().join("deploy").join(&name);
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, b"stale image").unwrap();

    let cfg = ExportConfig::default();
    let player = webplayer(&cfg);
    let mut ctx = ExportContext::init(cfg).unwrap();
    let html = export_html(&mut ctx, &graph, &project.html_path(), &player).unwrap();
    let data: Value = serde_json::from_str(built_in_data(&html)).unwrap();
    assert_eq!(STANDARD.decode(data[&name].as_str().unwrap()).unwrap(), *logo);
}

#[test]
fn missing_required_media_is_fatal() {
    let project = Project::new();
    let graph = project.scene("textured-quad");
    let cfg = ExportConfig::default();
    let player = webplayer(&cfg);
    let mut ctx = ExportContext::init(cfg).unwrap();
    let err = export_html(&mut ctx, &graph, &project.html_path(), &player).unwrap_err();
    match err {
        ExportError::MissingResource { path } => assert!(path.ends_with("textures/checker.png")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn webplayer_layout_fallbacks() {
    let cfg = ExportConfig::default();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().into_owned();

    assert!(matches!(
        WebplayerAssets::load(&root, &cfg),
        Err(ExportError::MissingResource { .. })
    ));

    fs::write(dir.path().join("webplayer_template.html"), "<p>$scripts</p>").unwrap();
    let player = WebplayerAssets::load(&root, &cfg).unwrap();
    assert_eq!(player.template, "<p>$scripts</p>");
    assert_eq!(player.script, "");
    assert_eq!(player.style, "");
}

#[test]
fn html_extension_is_appended() {
    let project = Project::new();
    project.add_media("checker", "textures/checker.png");
    let graph = project.scene("textured-quad");
    let cfg = ExportConfig::default();
    let player = webplayer(&cfg);
    let mut ctx = ExportContext::init(cfg).unwrap();

    fs::create_dir_all(project.dir.path().join("deploy")).unwrap();
    let written = write_html_export(
        &mut ctx,
        &graph,
        &format!("{}/deploy/app", project.root()),
        &player,
    )
    .unwrap();
    assert!(written.ends_with("deploy/app.html"));
    let html = fs::read_to_string(&written).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
}
