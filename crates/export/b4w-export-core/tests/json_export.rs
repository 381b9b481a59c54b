use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use b4w_bake_core::{bake_armature, ActionPoseEvaluator, BakeConfig, BakeTarget};
use b4w_export::{
    binary::read_f32, export_scene, ids::media_digest, write_json_export, ExportConfig,
    ExportContext, ExportError, ExportManifest, SceneGraph,
};
use b4w_test_fixtures::{media, scenes};
use tempfile::TempDir;

/// A project directory with a saved source file and media laid out the way
/// the scene fixtures reference them.
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

    fn export_path(&self) -> String {
        format!("{}/deploy/scene.json", self.root())
    }
}

fn context() -> ExportContext {
    ExportContext::init(ExportConfig::default()).unwrap()
}

fn read_manifest(path: &str) -> ExportManifest {
    ExportManifest::from_json(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn textured_quad_writes_manifest_and_binary() {
    let project = Project::new();
    project.add_media("checker", "textures/checker.png");
    let graph = project.scene("textured-quad");
    let export_path = project.export_path();

    let mut ctx = context();
    write_json_export(&mut ctx, &graph, &export_path).unwrap();
    let m = read_manifest(&export_path);

    assert_eq!(m.b4w_format_version, "6.03");
    assert_eq!(m.b4w_filepath_blend, "../project.blend");
    assert_eq!(m.scenes.len(), 1, "do_not_export scenes are skipped");
    let scene = &m.scenes[0];
    assert_eq!(scene.objects.len(), 2);
    let camera = m.objects.iter().find(|o| o.name == "Camera").unwrap();
    assert_eq!(scene.camera.as_ref().unwrap().uuid, camera.uuid);
    assert!(camera.data.is_none());

    assert_eq!(m.images[0].filepath, "../textures/checker.png");
    assert_eq!(m.images[0].source, "FILE");
    assert_eq!(m.textures[0].image.as_ref().unwrap().uuid, m.images[0].uuid);
    assert_eq!(m.materials[0].texture_slots.len(), 1);

    let warnings: Vec<&str> = m.b4w_export_warnings.iter().map(|w| w.text.as_str()).collect();
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].contains("Checker"));
    assert!(warnings[1].contains("Unbaked"));
    assert!(m.b4w_export_errors.is_empty());

    let mesh = &m.meshes[0];
    assert_eq!(mesh.submeshes[0].base_length, 4);
    assert_eq!(mesh.submeshes[0].position, [0, 12]);
    assert_eq!(mesh.submeshes[0].normal, [12, 12]);
    assert_eq!(mesh.submeshes[0].indices, [0, 6]);
    assert_eq!(mesh.b4w_vertex_anim.len(), 1);
    let ripple = &mesh.b4w_vertex_anim[0];
    assert_eq!(ripple.name, "Ripple");
    assert!(ripple.averaging);
    assert_eq!(ripple.averaging_interval, 5);
    assert_eq!(ripple.frames, [24, 48]);

    assert_eq!(m.binfile(), Some("scene.bin"));
    let info = &m.binaries[0];
    assert_eq!((info.int, info.float, info.short), (0, 24, 24 + 72 * 4));
    let blob = fs::read(project.dir.path().join("deploy/scene.bin")).unwrap();
    assert_eq!(&blob[..4], b"B4WB");
    assert_eq!(i32::from_le_bytes(blob[4..8].try_into().unwrap()), 6);
    assert_eq!(i32::from_le_bytes(blob[8..12].try_into().unwrap()), 3);
    assert_eq!(blob.len(), 12 + info.uchar);
    let second_frame_first_vertex = read_f32(&blob, info, 24 + 24, 6).unwrap();
    assert_eq!(second_frame_first_vertex, vec![0.0, 0.0, 0.5, 0.0, 0.0, 1.0]);

    assert!(!Path::new(&format!("{export_path}.part")).exists());
}

#[test]
fn baked_actions_replace_their_sources() {
    let project = Project::new();
    let mut graph = project.scene("rigged-arm");

    let arm = graph.object("Arm").unwrap().clone();
    let skeleton = graph.armature("ArmRig").unwrap().skeleton.clone();
    let cfg = BakeConfig::default();
    let report = {
        let mut eval = ActionPoseEvaluator::new(&skeleton, &graph.actions);
        let target = BakeTarget {
            object: &arm.name,
            skeleton: Some(&skeleton),
            has_animation_data: true,
            linked: false,
            anim_names: &arm.anim_names,
        };
        bake_armature(&target, &graph.actions, &mut eval, &cfg).unwrap()
    };
    assert_eq!(report.baked.len(), 1, "anim_names limits the bake to Wave");
    assert!(report.apply(&mut graph.actions).is_empty());

    let export_path = project.export_path();
    let mut ctx = context();
    let out = write_json_export(&mut ctx, &graph, &export_path).unwrap();
    let m = read_manifest(&export_path);
    assert_eq!(m, out.manifest);

    let names: Vec<&str> = m.actions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Wave_B4W_BAKED", "Drift"]);

    let baked = m.action_named("Wave_B4W_BAKED").unwrap();
    let arm_entry = m.objects.iter().find(|o| o.name == "Arm").unwrap();
    let played = arm_entry.animation_data.as_ref().unwrap().action.as_ref().unwrap();
    assert_eq!(played.uuid, baked.uuid);
    let paths: Vec<&str> = baked.fcurves.keys().map(String::as_str).collect();
    assert_eq!(paths, vec![r#"pose.bones["forearm"].rotation_quaternion"#]);
    let quat = &baked.fcurves[r#"pose.bones["forearm"].rotation_quaternion"#];
    assert_eq!(quat.keys().copied().collect::<Vec<_>>(), vec![0, 3]);
    assert!(quat.values().all(|c| c.num_channels == 8));

    let drift = m.action_named("Drift").unwrap();
    assert_eq!(drift.frame_range, [1, 5]);
    let loc = &drift.fcurves["location"][&0];
    assert_eq!(loc.bin_data_pos[1], 12);
    assert_eq!(loc.last_frame_offset, 5);
    let blob = out.binary.unwrap();
    let floats = read_f32(&blob, &m.binaries[0], loc.bin_data_pos[0], 12).unwrap();
    assert_eq!(
        floats,
        vec![0.0, 1.0, 0.0, 2.0, 0.5, 0.0, 5.0, 2.0, 4.0, 1.5, 6.0, 2.5]
    );

    let rig = &m.armatures[0];
    assert_eq!(rig.bones.len(), 3);
    assert_eq!(rig.bones[1].parent.as_deref(), Some("upper"));
    assert_relative_eq!(rig.bones[1].matrix_local[13], 1.0);
}

#[test]
fn packed_media_are_named_by_content() {
    let project = Project::new();
    project.add_media("chime", "sounds/chime.ogg");
    let graph = project.scene("packed-media");
    let export_path = project.export_path();

    let mut ctx = context();
    write_json_export(&mut ctx, &graph, &export_path).unwrap();
    let m = read_manifest(&export_path);

    let logo = &graph.image("logo").unwrap().packed.as_ref().unwrap().0;
    let expected = format!("{}.png", media_digest(logo, false));
    assert_eq!(m.images[0].filepath, expected);
    let written = fs::read(project.dir.path().join("deploy").join(&expected)).unwrap();
    assert_eq!(&written, logo);

    assert_eq!(m.sounds[0].filepath, "../sounds/chime.ogg");
    let spk = &m.speakers[0];
    assert_eq!(spk.sound.as_ref().unwrap().uuid, m.sounds[0].uuid);
    assert_relative_eq!(spk.volume, 0.8);
    assert_relative_eq!(spk.distance_max, 25.0);
    assert!(spk.b4w_cyclic_play);
    assert!(m.b4w_export_warnings.is_empty());
    assert!(m.b4w_export_errors.is_empty());

    let stats = ctx.shutdown();
    assert_eq!(stats.misses, 0);
}

#[test]
fn packed_bytes_replace_a_stale_file_of_the_same_name() {
    let project = Project::new();
    project.add_media("chime", "sounds/chime.ogg");
    let graph = project.scene("packed-media");
    let logo = &graph.image("logo").unwrap().packed.as_ref().unwrap().0;
    let stale = project
        .dir
        .path()
        .join("deploy")
        .join(format!("{}.png", media_digest(logo, false)));
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, b"stale image").unwrap();

    write_json_export(&mut context(), &graph, &project.export_path()).unwrap();
    assert_eq!(&fs::read(&stale).unwrap(), logo);
}

#[test]
fn failed_write_leaves_no_files_behind() {
    let project = Project::new();
    project.add_media("chime", "sounds/chime.ogg");
    let graph = project.scene("packed-media");
    let export_path = project.export_path();
    let deploy = project.dir.path().join("deploy");
    // a directory in place of the side-car makes its rename fail
    fs::create_dir_all(deploy.join("scene.bin")).unwrap();
    fs::write(deploy.join("scene.bin").join("keep"), b"x").unwrap();

    let err = write_json_export(&mut context(), &graph, &export_path).unwrap_err();
    assert!(matches!(err, ExportError::File { .. }), "{err}");
    assert!(!Path::new(&export_path).exists());

    let mut left: Vec<String> = fs::read_dir(&deploy)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(left, vec!["scene.bin".to_string()]);
}

#[test]
fn relative_media_need_a_saved_source() {
    let project = Project::new();
    let mut graph = project.scene("textured-quad");
    graph.filepath.clear();
    let err = export_scene(&mut context(), &graph, &project.export_path(), false).unwrap_err();
    assert!(
        matches!(err, ExportError::Component { ref component, .. } if component == "checker"),
        "{err}"
    );
}

#[test]
fn export_to_another_drive_is_refused() {
    let mut graph: SceneGraph = scenes::load("textured-quad").unwrap();
    graph.filepath = "C:/proj/project.blend".into();
    let err = export_scene(&mut context(), &graph, "D:/deploy/scene.json", false).unwrap_err();
    assert_eq!(err.to_string(), "Export to different disk is forbidden");
}

#[test]
fn strict_mode_writes_nothing() {
    let project = Project::new();
    project.add_media("checker", "textures/checker.png");
    let graph = project.scene("textured-quad");
    let export_path = project.export_path();

    let mut ctx = ExportContext::init(ExportConfig {
        strict_mode: true,
        ..ExportConfig::default()
    })
    .unwrap();
    let err = write_json_export(&mut ctx, &graph, &export_path).unwrap_err();
    assert!(matches!(err, ExportError::Strict { warnings: 2, errors: 0 }));
    assert!(!Path::new(&export_path).exists());
}
