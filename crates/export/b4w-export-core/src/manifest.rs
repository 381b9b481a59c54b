//! The exported JSON document.
//!
//! Top-level keys keep their historical order: header, datablock
//! collections, `binaries`, then accumulated warnings and errors. Unknown
//! top-level keys survive a read/write cycle through [`ExportManifest::extra`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binary::BinaryInfo;
use crate::config::parse_version;
use crate::error::ExportError;
use crate::messages::ExportMessage;

/// `{ "uuid": ... }` reference to another datablock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UuidRef {
    pub uuid: String,
}

impl UuidRef {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FCurveEntry {
    /// `[offset, length]` in floats within the float section.
    pub bin_data_pos: [usize; 2],
    /// Float offset of the last keyframe within this curve's data.
    pub last_frame_offset: usize,
    pub num_channels: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub name: String,
    pub uuid: String,
    pub frame_range: [i64; 2],
    /// data path -> array index -> curve.
    pub fcurves: IndexMap<String, IndexMap<usize, FCurveEntry>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub name: String,
    pub uuid: String,
    pub filepath: String,
    pub size: [u32; 2],
    pub source: String,
    pub colorspace_settings_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextureEntry {
    pub name: String,
    pub uuid: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub image: Option<UuidRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextureSlot {
    pub texture: UuidRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub name: String,
    pub uuid: String,
    pub diffuse_color: [f64; 3],
    pub alpha: f64,
    pub use_transparency: bool,
    pub texture_slots: Vec<TextureSlot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmeshEntry {
    pub base_length: usize,
    pub position: [usize; 2],
    pub normal: [usize; 2],
    pub indices: [usize; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexAnimEntry {
    pub name: String,
    pub frame_start: i32,
    pub frame_end: i32,
    pub averaging: bool,
    pub averaging_interval: i32,
    pub allow_nla: bool,
    /// Per-frame `[px, py, pz, nx, ny, nz]` records, frame-major.
    pub frames: [usize; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshEntry {
    pub name: String,
    pub uuid: String,
    pub materials: Vec<UuidRef>,
    pub submeshes: Vec<SubmeshEntry>,
    pub b4w_vertex_anim: Vec<VertexAnimEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneEntry {
    pub name: String,
    pub parent: Option<String>,
    /// Armature-space rest matrix, column-major.
    pub matrix_local: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArmatureEntry {
    pub name: String,
    pub uuid: String,
    pub bones: Vec<BoneEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoundEntry {
    pub name: String,
    pub uuid: String,
    pub filepath: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeakerEntry {
    pub name: String,
    pub uuid: String,
    pub sound: Option<UuidRef>,
    pub volume: f64,
    pub pitch: f64,
    pub muted: bool,
    pub distance_max: f64,
    pub b4w_cyclic_play: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationDataEntry {
    pub action: Option<UuidRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    pub uuid: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Option<UuidRef>,
    pub parent: Option<UuidRef>,
    pub matrix_world: Vec<f64>,
    pub animation_data: Option<AnimationDataEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub name: String,
    pub uuid: String,
    pub objects: Vec<UuidRef>,
    pub frame_start: i32,
    pub frame_end: i32,
    pub fps: f64,
    pub camera: Option<UuidRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub b4w_format_version: String,
    #[serde(default)]
    pub b4w_filepath_blend: String,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(default)]
    pub textures: Vec<TextureEntry>,
    #[serde(default)]
    pub materials: Vec<MaterialEntry>,
    #[serde(default)]
    pub meshes: Vec<MeshEntry>,
    #[serde(default)]
    pub armatures: Vec<ArmatureEntry>,
    #[serde(default)]
    pub sounds: Vec<SoundEntry>,
    #[serde(default)]
    pub speakers: Vec<SpeakerEntry>,
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
    #[serde(default)]
    pub scenes: Vec<SceneEntry>,
    #[serde(default)]
    pub binaries: Vec<BinaryInfo>,
    #[serde(default)]
    pub b4w_export_warnings: Vec<ExportMessage>,
    #[serde(default)]
    pub b4w_export_errors: Vec<ExportMessage>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ExportManifest {
    pub fn new(format_version: impl Into<String>, filepath_blend: impl Into<String>) -> Self {
        Self {
            b4w_format_version: format_version.into(),
            b4w_filepath_blend: filepath_blend.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a manifest document.
    pub fn from_json(s: &str) -> Result<Self, ExportError> {
        let manifest: ExportManifest =
            serde_json::from_str(s).map_err(|e| ExportError::InvalidManifest(e.to_string()))?;
        if parse_version(&manifest.b4w_format_version).is_none() {
            return Err(ExportError::InvalidManifest(format!(
                "non-numeric format version '{}'",
                manifest.b4w_format_version
            )));
        }
        Ok(manifest)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, ExportError> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }

    /// Side-car binary file name, if the export produced binary data.
    pub fn binfile(&self) -> Option<&str> {
        self.binaries.first().and_then(|b| b.binfile.as_deref())
    }

    pub fn image(&self, uuid: &str) -> Option<&ImageEntry> {
        self.images.iter().find(|i| i.uuid == uuid)
    }

    pub fn action_named(&self, name: &str) -> Option<&ActionEntry> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// The two header fields the batch tools look at. Everything else in the
/// document is ignored, so manifests of any age can be inspected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ManifestHeader {
    #[serde(default)]
    pub b4w_format_version: Option<String>,
    #[serde(default)]
    pub b4w_filepath_blend: Option<String>,
}

impl ManifestHeader {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Numeric `(major, minor)` version, if present and well formed.
    pub fn version(&self) -> Option<(i32, i32)> {
        self.b4w_format_version.as_deref().and_then(parse_version)
    }
}
