//! Scene graph walker: turns a [`SceneGraph`] into an [`ExportManifest`]
//! plus binary sections.
//!
//! The walk starts at every exportable scene, follows object, data,
//! material, texture and media references, and writes each datablock once
//! (keyed by uuid). Actions are exported afterwards in library order, except
//! those superseded by a baked counterpart.

use std::path::Path;

use log::{debug, info, warn};

use b4w_bake_core::{math::mat4_to_cols, Action};

use crate::action::{encode_action, has_baked_version, select_action};
use crate::context::ExportContext;
use crate::error::ExportError;
use crate::ids::{gen_uuid, media_digest};
use crate::manifest::*;
use crate::paths;
use crate::scene::*;

/// Upper bound the runtime accepts for speaker attenuation distance.
const MAX_SPEAKER_DISTANCE: f64 = 10000.0;

/// Manifest plus the binary side-car of one export.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportOutput {
    pub manifest: ExportManifest,
    /// Header followed by the binary sections, `None` when there is no data.
    pub binary: Option<Vec<u8>>,
}

struct Walker<'a> {
    ctx: &'a mut ExportContext,
    graph: &'a SceneGraph,
    manifest: ExportManifest,
}

/// Column-major flatten, rounded to 5 decimals.
fn matrix_to_list(m: &[f64; 16]) -> Vec<f64> {
    m.iter().map(|v| (v * 1e5).round() / 1e5).collect()
}

fn missing(kind: &str, owner: &str, name: &str) -> ExportError {
    ExportError::component(owner, format!("{kind} \"{name}\" does not exist"))
}

impl<'a> Walker<'a> {
    fn uuid<T: Datablock>(&self, block: &T) -> String {
        gen_uuid(T::RNA_TYPE, block.name(), block.library(), &self.graph.filepath)
    }

    fn scene(&mut self, scene: &SceneDesc) -> Result<(), ExportError> {
        let uuid = self.uuid(scene);
        if !self.ctx.mark_exported(&uuid) {
            return Ok(());
        }
        debug!("exporting scene {}", scene.name);

        let mut objects = Vec::with_capacity(scene.objects.len());
        for name in &scene.objects {
            let obj = self
                .graph
                .object(name)
                .ok_or_else(|| missing("Object", &scene.name, name))?;
            if obj.do_not_export {
                continue;
            }
            objects.push(UuidRef::new(self.object(obj)?));
        }

        let camera = match &scene.camera {
            Some(name) => {
                let obj = self
                    .graph
                    .object(name)
                    .ok_or_else(|| missing("Camera", &scene.name, name))?;
                if obj.do_not_export {
                    None
                } else {
                    Some(UuidRef::new(self.object(obj)?))
                }
            }
            None => None,
        };

        self.manifest.scenes.push(SceneEntry {
            name: scene.name.clone(),
            uuid,
            objects,
            frame_start: scene.frame_start,
            frame_end: scene.frame_end,
            fps: scene.fps,
            camera,
        });
        Ok(())
    }

    fn object(&mut self, obj: &ObjectDesc) -> Result<String, ExportError> {
        let uuid = self.uuid(obj);
        if !self.ctx.mark_exported(&uuid) {
            return Ok(uuid);
        }

        let parent = match &obj.parent {
            Some(name) => {
                let p = self
                    .graph
                    .object(name)
                    .ok_or_else(|| missing("Parent object", &obj.name, name))?;
                Some(UuidRef::new(self.object(p)?))
            }
            None => None,
        };

        let data = match (obj.kind, &obj.data) {
            (_, None) => None,
            (ObjectKind::Mesh, Some(name)) => {
                let mesh = self
                    .graph
                    .mesh(name)
                    .ok_or_else(|| missing("Mesh", &obj.name, name))?;
                Some(UuidRef::new(self.mesh(mesh, obj)?))
            }
            (ObjectKind::Armature, Some(name)) => {
                let arm = self
                    .graph
                    .armature(name)
                    .ok_or_else(|| missing("Armature", &obj.name, name))?;
                Some(UuidRef::new(self.armature(arm)))
            }
            (ObjectKind::Speaker, Some(name)) => {
                let spk = self
                    .graph
                    .speaker(name)
                    .ok_or_else(|| missing("Speaker", &obj.name, name))?;
                Some(UuidRef::new(self.speaker(spk)?))
            }
            // cameras and lamps carry no exported data
            (_, Some(_)) => None,
        };

        let animation_data = match &obj.animation_data {
            Some(anim) => {
                let action = match &anim.action {
                    Some(name) => match select_action(name, &self.graph.actions) {
                        Some(action) => Some(UuidRef::new(self.action(action))),
                        None => {
                            self.ctx.warn(format!(
                                "Object \"{}\" references a missing action \"{}\".",
                                obj.name, name
                            ));
                            None
                        }
                    },
                    None => None,
                };
                Some(AnimationDataEntry { action })
            }
            None => None,
        };

        self.manifest.objects.push(ObjectEntry {
            name: obj.name.clone(),
            uuid: uuid.clone(),
            kind: obj.kind.as_str().to_string(),
            data,
            parent,
            matrix_world: matrix_to_list(&obj.matrix_world),
            animation_data,
        });
        Ok(uuid)
    }

    fn mesh(&mut self, mesh: &MeshDesc, owner: &ObjectDesc) -> Result<String, ExportError> {
        let uuid = self.uuid(mesh);
        if !self.ctx.mark_exported(&uuid) {
            return Ok(uuid);
        }

        if !mesh.normals.is_empty() && mesh.normals.len() != mesh.positions.len() {
            return Err(ExportError::component(
                &mesh.name,
                format!(
                    "{} normals for {} vertices",
                    mesh.normals.len(),
                    mesh.positions.len()
                ),
            ));
        }
        let vertex_count = mesh.positions.len();
        if let Some(bad) = mesh.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(ExportError::component(
                &mesh.name,
                format!("index {bad} out of range for {vertex_count} vertices"),
            ));
        }

        let mut materials = Vec::with_capacity(mesh.materials.len());
        for name in &mesh.materials {
            let mat = self
                .graph
                .material(name)
                .ok_or_else(|| missing("Material", &mesh.name, name))?;
            materials.push(UuidRef::new(self.material(mat)?));
        }

        let flat_pos: Vec<f32> = mesh.positions.iter().flatten().copied().collect();
        let flat_nor: Vec<f32> = mesh.normals.iter().flatten().copied().collect();
        let indices: Vec<i32> = mesh.indices.iter().map(|&i| i as i32).collect();
        let binary = self.ctx.binary_mut();
        let position = binary.push_f32(&flat_pos);
        let normal = binary.push_f32(&flat_nor);
        let indices = binary.push_i32(&indices);
        let submeshes = vec![SubmeshEntry {
            base_length: vertex_count,
            position,
            normal,
            indices,
        }];

        let mut b4w_vertex_anim = Vec::new();
        if owner.export_vertex_anim {
            for va in &owner.vertex_animations {
                if !va.is_baked() {
                    self.ctx.warn(format!(
                        "Vertex animation \"{}\" of object \"{}\" is not baked.",
                        va.name, owner.name
                    ));
                    continue;
                }
                if va.vertex_count() != Some(vertex_count) {
                    self.ctx.err(format!(
                        "Wrong vertex animation vertices count for mesh \"{}\". It doesn't match with the mesh vertices count for \"{}\"",
                        mesh.name, va.name
                    ));
                    continue;
                }
                let flat: Vec<f32> = va
                    .frames
                    .iter()
                    .flat_map(|f| f.posnor.iter().flatten().copied())
                    .collect();
                let frames = self.ctx.binary_mut().push_f32(&flat);
                b4w_vertex_anim.push(VertexAnimEntry {
                    name: va.name.clone(),
                    frame_start: va.frame_start,
                    frame_end: va.frame_end,
                    averaging: va.averaging,
                    averaging_interval: va.averaging_interval,
                    allow_nla: va.allow_nla,
                    frames,
                });
            }
        }

        self.manifest.meshes.push(MeshEntry {
            name: mesh.name.clone(),
            uuid: uuid.clone(),
            materials,
            submeshes,
            b4w_vertex_anim,
        });
        Ok(uuid)
    }

    fn material(&mut self, mat: &MaterialDesc) -> Result<String, ExportError> {
        let uuid = self.uuid(mat);
        if !self.ctx.mark_exported(&uuid) {
            return Ok(uuid);
        }
        let alpha_texture = mat.textures.iter().any(|t| {
            self.graph
                .texture(t)
                .and_then(|t| t.image.as_deref())
                .and_then(|i| self.graph.image(i))
                .is_some_and(|i| i.use_alpha)
        });
        if alpha_texture && !mat.use_transparency {
            self.ctx.warn(format!(
                "Material \"{}\" has a texture with alpha channel but transparency is disabled.",
                mat.name
            ));
        }

        let mut texture_slots = Vec::with_capacity(mat.textures.len());
        for name in &mat.textures {
            let tex = self
                .graph
                .texture(name)
                .ok_or_else(|| missing("Texture", &mat.name, name))?;
            texture_slots.push(TextureSlot {
                texture: UuidRef::new(self.texture(tex)?),
            });
        }

        let [r, g, b] = mat.diffuse_color;
        self.manifest.materials.push(MaterialEntry {
            name: mat.name.clone(),
            uuid: uuid.clone(),
            diffuse_color: [r as f64, g as f64, b as f64],
            alpha: mat.alpha as f64,
            use_transparency: mat.use_transparency,
            texture_slots,
        });
        Ok(uuid)
    }

    fn texture(&mut self, tex: &TextureDesc) -> Result<String, ExportError> {
        let uuid = self.uuid(tex);
        if !self.ctx.mark_exported(&uuid) {
            return Ok(uuid);
        }
        let image = match &tex.image {
            Some(name) => {
                let img = self
                    .graph
                    .image(name)
                    .ok_or_else(|| missing("Image", &tex.name, name))?;
                Some(UuidRef::new(self.image(img)?))
            }
            None => None,
        };
        self.manifest.textures.push(TextureEntry {
            name: tex.name.clone(),
            uuid: uuid.clone(),
            kind: if image.is_some() { "IMAGE" } else { "NONE" }.to_string(),
            image,
        });
        Ok(uuid)
    }

    /// Manifest path of a media file. Packed data is registered under a
    /// content-derived name next to the export; everything else is made
    /// relative to the export file.
    fn media_path(
        &mut self,
        filepath: &str,
        packed: Option<&PackedBytes>,
        fallback_ext: &str,
    ) -> Result<String, ExportError> {
        if let Some(PackedBytes(bytes)) = packed {
            let (_, ext) = paths::split_ext(filepath);
            let ext = if ext.is_empty() { fallback_ext } else { ext };
            let name = format!(
                "{}{}",
                media_digest(bytes, self.ctx.is_html_export()),
                ext.to_lowercase()
            );
            self.ctx.packer_mut().register(name.clone(), bytes);
            return Ok(name);
        }
        let blend = &self.graph.filepath;
        if blend.is_empty() && filepath.starts_with("//") {
            return Err(ExportError::Path(format!(
                "Can't resolve \"{filepath}\": the source file has never been saved"
            )));
        }
        paths::json_relative_filepath(filepath, blend, self.ctx.export_path())
    }

    fn image(&mut self, img: &ImageDesc) -> Result<String, ExportError> {
        let uuid = self.uuid(img);
        if !self.ctx.mark_exported(&uuid) {
            return Ok(uuid);
        }
        let filepath = match img.source {
            ImageSource::Generated if img.packed.is_none() => String::new(),
            _ => {
                let fallback = format!(".{}", img.file_format.to_lowercase());
                self.media_path(&img.filepath, img.packed.as_ref(), &fallback)
                    .map_err(|e| ExportError::component(&img.name, e.to_string()))?
            }
        };
        self.manifest.images.push(ImageEntry {
            name: img.name.clone(),
            uuid: uuid.clone(),
            filepath,
            size: img.size,
            source: img.source.as_str().to_string(),
            colorspace_settings_name: img.colorspace.clone(),
        });
        Ok(uuid)
    }

    fn sound(&mut self, sound: &SoundDesc) -> Result<String, ExportError> {
        let uuid = self.uuid(sound);
        if !self.ctx.mark_exported(&uuid) {
            return Ok(uuid);
        }
        let filepath = self.media_path(&sound.filepath, sound.packed.as_ref(), "")?;
        self.manifest.sounds.push(SoundEntry {
            name: sound.name.clone(),
            uuid: uuid.clone(),
            filepath,
        });
        Ok(uuid)
    }

    fn speaker(&mut self, spk: &SpeakerDesc) -> Result<String, ExportError> {
        let uuid = self.uuid(spk);
        if !self.ctx.mark_exported(&uuid) {
            return Ok(uuid);
        }
        let sound = match &spk.sound {
            Some(name) => {
                let snd = self
                    .graph
                    .sound(name)
                    .ok_or_else(|| missing("Sound", &spk.name, name))?;
                match self.sound(snd) {
                    Ok(uuid) => Some(UuidRef::new(uuid)),
                    Err(ExportError::Path(reason)) => {
                        self.ctx.err(format!("Speaker \"{}\": {reason}", spk.name));
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
            None => None,
        };
        self.manifest.speakers.push(SpeakerEntry {
            name: spk.name.clone(),
            uuid: uuid.clone(),
            sound,
            volume: spk.volume,
            pitch: spk.pitch,
            muted: spk.muted,
            distance_max: spk.distance_max.min(MAX_SPEAKER_DISTANCE),
            b4w_cyclic_play: spk.cyclic_play,
        });
        Ok(uuid)
    }

    fn armature(&mut self, arm: &ArmatureDesc) -> String {
        let uuid = self.uuid(arm);
        if !self.ctx.mark_exported(&uuid) {
            return uuid;
        }
        let skeleton = &arm.skeleton;
        let bones = skeleton
            .bones()
            .iter()
            .map(|bone| BoneEntry {
                name: bone.name.clone(),
                parent: bone.parent.map(|p| skeleton.bone(p).name.clone()),
                matrix_local: matrix_to_list(&mat4_to_cols(&bone.rest_matrix)),
            })
            .collect();
        self.manifest.armatures.push(ArmatureEntry {
            name: arm.name.clone(),
            uuid: uuid.clone(),
            bones,
        });
        uuid
    }

    fn action(&mut self, action: &Action) -> String {
        let uuid = self.uuid(action);
        if !self.ctx.mark_exported(&uuid) {
            return uuid;
        }
        debug!("exporting action {}", action.name);
        let (binary, messages) = self.ctx.binary_and_messages_mut();
        let entry = encode_action(action, uuid.clone(), binary, messages);
        self.manifest.actions.push(entry);
        uuid
    }
}

/// Walk `graph` and produce the manifest and binary data for an export to
/// `export_path`. Resets `ctx` first; packed media stay registered in it
/// afterwards.
pub fn export_scene(
    ctx: &mut ExportContext,
    graph: &SceneGraph,
    export_path: &str,
    html_export: bool,
) -> Result<ExportOutput, ExportError> {
    ctx.begin(export_path, html_export);

    let scenes: Vec<&SceneDesc> = graph.scenes.iter().filter(|s| !s.do_not_export).collect();
    if scenes.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let filepath_blend = paths::blend_relative_to_export(&graph.filepath, export_path)?;
    let format_version = ctx.config().format_version.clone();
    let mut walker = Walker {
        ctx: &mut *ctx,
        graph,
        manifest: ExportManifest::new(format_version, filepath_blend),
    };

    for scene in scenes {
        walker.scene(scene)?;
    }
    for action in graph.actions.iter() {
        if !has_baked_version(action, &graph.actions) {
            walker.action(action);
        }
    }
    let mut manifest = walker.manifest;

    let messages = ctx.messages().clone();
    if ctx.config().strict_mode && !messages.is_empty() {
        return Err(ExportError::Strict {
            warnings: messages.warnings.len(),
            errors: messages.errors.len(),
        });
    }

    let binfile = format!("{}.bin", paths::split_ext(paths::file_name(export_path)).0);
    manifest.binaries.push(ctx.binary().info(Some(binfile)));
    manifest.b4w_export_warnings = messages.warnings;
    manifest.b4w_export_errors = messages.errors;

    let binary = if ctx.binary().is_empty() {
        None
    } else {
        Some(ctx.binary().to_blob(ctx.version()))
    };
    info!(
        "walked {} scene(s), {} object(s), {} action(s)",
        manifest.scenes.len(),
        manifest.objects.len(),
        manifest.actions.len()
    );
    Ok(ExportOutput { manifest, binary })
}

/// Write `bytes` to `path` through a sibling temporary file.
pub(crate) fn write_atomic(path: &str, bytes: &[u8]) -> Result<(), ExportError> {
    let tmp = format!("{path}.part");
    std::fs::write(&tmp, bytes).map_err(|e| ExportError::file(tmp.clone(), e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        ExportError::file(path, e)
    })
}

/// Export `graph` to a JSON manifest at `export_path`, with its binary
/// side-car and any packed media written next to it.
pub fn write_json_export(
    ctx: &mut ExportContext,
    graph: &SceneGraph,
    export_path: &str,
) -> Result<ExportOutput, ExportError> {
    let output = export_scene(ctx, graph, export_path, false)?;
    let dir = paths::dirname(export_path);
    if !dir.is_empty() && !Path::new(dir).is_dir() {
        std::fs::create_dir_all(dir).map_err(|e| ExportError::file(dir, e))?;
    }

    let json = output.manifest.to_json(ctx.config().json_pretty)?;
    let mut files = ExportFiles::default();
    for (name, bytes) in ctx.packer().packed() {
        let target = paths::join(dir, name);
        files.write(&target, bytes)?;
        debug!("wrote packed media {target}");
    }
    if let (Some(blob), Some(binfile)) = (&output.binary, output.manifest.binfile()) {
        files.write(&paths::join(dir, binfile), blob)?;
    }
    // manifest last: it names the side-car
    files.write(export_path, json.as_bytes())?;
    files.keep();
    info!("exported {export_path}");
    Ok(output)
}

/// Files written by one export. Unless [`ExportFiles::keep`] is called,
/// dropping the set removes every file in it.
#[derive(Default)]
struct ExportFiles {
    written: Vec<String>,
}

impl ExportFiles {
    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), ExportError> {
        write_atomic(path, bytes)?;
        self.written.push(path.to_string());
        Ok(())
    }

    fn keep(mut self) {
        self.written.clear();
    }
}

impl Drop for ExportFiles {
    fn drop(&mut self) {
        for path in self.written.drain(..).rev() {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("failed to remove {path} after an aborted export: {err}");
            }
        }
    }
}
