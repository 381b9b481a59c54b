//! Scene description: the in-memory asset graph handed to the exporter.
//!
//! Datablocks reference each other by name. Packed media travel as base64
//! strings.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use b4w_bake_core::{Action, ActionLibrary, Skeleton, VertexAnimation};

/// Bytes embedded in the source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackedBytes(pub Vec<u8>);

impl Serialize for PackedBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for PackedBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s.as_bytes())
            .map(PackedBytes)
            .map_err(serde::de::Error::custom)
    }
}

/// Common identity of every datablock.
pub trait Datablock {
    /// Type name mixed into uuids.
    const RNA_TYPE: &'static str;
    fn name(&self) -> &str;
    /// Library file the datablock is linked from, if any.
    fn library(&self) -> Option<&str>;
}

macro_rules! datablock {
    ($ty:ty, $rna:literal) => {
        impl Datablock for $ty {
            const RNA_TYPE: &'static str = $rna;
            fn name(&self) -> &str {
                &self.name
            }
            fn library(&self) -> Option<&str> {
                self.library.as_deref()
            }
        }
    };
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    /// Object names, in outliner order.
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default = "default_frame_start")]
    pub frame_start: i32,
    #[serde(default = "default_frame_end")]
    pub frame_end: i32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub do_not_export: bool,
}

fn default_frame_start() -> i32 {
    1
}
fn default_frame_end() -> i32 {
    250
}
fn default_fps() -> f64 {
    24.0
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectKind {
    Mesh,
    Armature,
    #[default]
    Empty,
    Camera,
    Lamp,
    Speaker,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Mesh => "MESH",
            ObjectKind::Armature => "ARMATURE",
            ObjectKind::Empty => "EMPTY",
            ObjectKind::Camera => "CAMERA",
            ObjectKind::Lamp => "LAMP",
            ObjectKind::Speaker => "SPEAKER",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationData {
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ObjectKind,
    /// Name of the mesh/armature/speaker datablock.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    /// Column-major world matrix.
    #[serde(default = "identity_cols")]
    pub matrix_world: [f64; 16],
    #[serde(default)]
    pub animation_data: Option<AnimationData>,
    /// Actions the armature bake is limited to; empty means all.
    #[serde(default)]
    pub anim_names: Vec<String>,
    #[serde(default)]
    pub export_vertex_anim: bool,
    #[serde(default)]
    pub vertex_animations: Vec<VertexAnimation>,
    #[serde(default)]
    pub do_not_export: bool,
}

pub fn identity_cols() -> [f64; 16] {
    let mut m = [0.0; 16];
    for i in 0..4 {
        m[i * 5] = 1.0;
    }
    m
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub normals: Vec<[f32; 3]>,
    #[serde(default)]
    pub indices: Vec<u32>,
    #[serde(default)]
    pub materials: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default = "default_color")]
    pub diffuse_color: [f32; 3],
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default)]
    pub use_transparency: bool,
    #[serde(default)]
    pub textures: Vec<String>,
}

fn default_color() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}
fn default_alpha() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextureDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageSource {
    #[default]
    File,
    Movie,
    Sequence,
    Generated,
}

impl ImageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSource::File => "FILE",
            ImageSource::Movie => "MOVIE",
            ImageSource::Sequence => "SEQUENCE",
            ImageSource::Generated => "GENERATED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    /// Blend-relative (`//`) or absolute path of the source file.
    #[serde(default)]
    pub filepath: String,
    #[serde(default)]
    pub source: ImageSource,
    #[serde(default)]
    pub size: [u32; 2],
    /// Used as extension when `filepath` has none.
    #[serde(default = "default_file_format")]
    pub file_format: String,
    #[serde(default)]
    pub use_alpha: bool,
    #[serde(default = "default_colorspace")]
    pub colorspace: String,
    #[serde(default)]
    pub packed: Option<PackedBytes>,
}

fn default_file_format() -> String {
    "PNG".to_string()
}
fn default_colorspace() -> String {
    "sRGB".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoundDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub filepath: String,
    #[serde(default)]
    pub packed: Option<PackedBytes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeakerDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default = "default_unit")]
    pub volume: f64,
    #[serde(default = "default_unit")]
    pub pitch: f64,
    #[serde(default)]
    pub muted: bool,
    #[serde(default = "default_distance_max")]
    pub distance_max: f64,
    #[serde(default)]
    pub cyclic_play: bool,
}

fn default_unit() -> f64 {
    1.0
}
fn default_distance_max() -> f64 {
    10000.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArmatureDesc {
    pub name: String,
    #[serde(default)]
    pub library: Option<String>,
    pub skeleton: Skeleton,
}

datablock!(SceneDesc, "Scene");
datablock!(ObjectDesc, "Object");
datablock!(MeshDesc, "Mesh");
datablock!(MaterialDesc, "Material");
datablock!(TextureDesc, "Texture");
datablock!(ImageDesc, "Image");
datablock!(SoundDesc, "Sound");
datablock!(SpeakerDesc, "Speaker");
datablock!(ArmatureDesc, "Armature");

impl Datablock for Action {
    const RNA_TYPE: &'static str = "Action";
    fn name(&self) -> &str {
        &self.name
    }
    fn library(&self) -> Option<&str> {
        None
    }
}

/// Whole scene description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneGraph {
    /// Source file path, `""` when the source was never saved.
    pub filepath: String,
    /// Export paths remembered from earlier exports.
    pub export_path_json: Option<String>,
    pub export_path_html: Option<String>,
    pub scenes: Vec<SceneDesc>,
    pub objects: Vec<ObjectDesc>,
    pub meshes: Vec<MeshDesc>,
    pub materials: Vec<MaterialDesc>,
    pub textures: Vec<TextureDesc>,
    pub images: Vec<ImageDesc>,
    pub sounds: Vec<SoundDesc>,
    pub speakers: Vec<SpeakerDesc>,
    pub armatures: Vec<ArmatureDesc>,
    pub actions: ActionLibrary,
}

fn find<'a, T: Datablock>(items: &'a [T], name: &str) -> Option<&'a T> {
    items.iter().find(|d| d.name() == name)
}

impl SceneGraph {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn is_saved(&self) -> bool {
        !self.filepath.is_empty()
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDesc> {
        find(&self.objects, name)
    }
    pub fn mesh(&self, name: &str) -> Option<&MeshDesc> {
        find(&self.meshes, name)
    }
    pub fn material(&self, name: &str) -> Option<&MaterialDesc> {
        find(&self.materials, name)
    }
    pub fn texture(&self, name: &str) -> Option<&TextureDesc> {
        find(&self.textures, name)
    }
    pub fn image(&self, name: &str) -> Option<&ImageDesc> {
        find(&self.images, name)
    }
    pub fn sound(&self, name: &str) -> Option<&SoundDesc> {
        find(&self.sounds, name)
    }
    pub fn speaker(&self, name: &str) -> Option<&SpeakerDesc> {
        find(&self.speakers, name)
    }
    pub fn armature(&self, name: &str) -> Option<&ArmatureDesc> {
        find(&self.armatures, name)
    }
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }
}
