//! Vertex animation baking: record evaluated positions and normals of a mesh
//! for every frame of a range.

use log::info;
use serde::{Deserialize, Serialize};

use crate::baker::FrameRange;
use crate::error::BakeError;
use crate::evaluator::MeshEvaluator;

/// All vertices of a mesh at one frame, each as
/// `[px, py, pz, nx, ny, nz]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexFrame {
    pub frame: i32,
    pub posnor: Vec<[f32; 6]>,
}

impl VertexFrame {
    pub fn vertex_count(&self) -> usize {
        self.posnor.len()
    }
}

/// A named vertex animation slot of a mesh object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexAnimation {
    pub name: String,
    pub frame_start: i32,
    pub frame_end: i32,
    /// Blend neighbouring frames at playback. Stored, not applied here.
    #[serde(default)]
    pub averaging: bool,
    #[serde(default = "default_averaging_interval")]
    pub averaging_interval: i32,
    #[serde(default)]
    pub allow_nla: bool,
    #[serde(default)]
    pub frames: Vec<VertexFrame>,
}

fn default_averaging_interval() -> i32 {
    5
}

impl VertexAnimation {
    pub fn new(name: impl Into<String>, frame_start: i32, frame_end: i32) -> Self {
        Self {
            name: name.into(),
            frame_start,
            frame_end,
            averaging: false,
            averaging_interval: default_averaging_interval(),
            allow_nla: false,
            frames: Vec::new(),
        }
    }

    /// Baked animations carry at least one frame.
    pub fn is_baked(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Vertex count shared by every frame, if baked.
    pub fn vertex_count(&self) -> Option<usize> {
        self.frames.first().map(VertexFrame::vertex_count)
    }
}

/// Bake `anim.frame_start..=anim.frame_end` from the evaluator.
///
/// Frames are sampled in increasing order into a fresh buffer that replaces
/// `anim.frames` only when every frame succeeded. The evaluator's frame is
/// restored in every case.
pub fn bake_vertex_animation<M>(mesh: &mut M, anim: &mut VertexAnimation) -> Result<(), BakeError>
where
    M: MeshEvaluator + ?Sized,
{
    let range = FrameRange::new(anim.frame_start, anim.frame_end)?;

    let saved = mesh.current_frame();
    let result = sample_frames(mesh, range);
    let restored = mesh.set_frame(saved);

    let frames = result?;
    restored?;
    info!(
        "baked vertex animation {} of {}: {} frames",
        anim.name,
        mesh.object_name(),
        frames.len()
    );
    anim.frames = frames;
    Ok(())
}

/// Upper bound on the frame buffer reserved up front.
const PREALLOCATED_FRAMES: usize = 1024;

fn sample_frames<M>(mesh: &mut M, range: FrameRange) -> Result<Vec<VertexFrame>, BakeError>
where
    M: MeshEvaluator + ?Sized,
{
    let mut frames: Vec<VertexFrame> = Vec::with_capacity(range.len().min(PREALLOCATED_FRAMES));
    let mut expected: Option<usize> = None;

    for frame in range.frames() {
        mesh.set_frame(frame)?;
        let vertices = mesh.evaluated_vertices()?;
        match expected {
            Some(count) if count != vertices.len() => {
                return Err(BakeError::TopologyChanged {
                    object: mesh.object_name().to_string(),
                    frame,
                    expected: count,
                    found: vertices.len(),
                });
            }
            Some(_) => {}
            None => expected = Some(vertices.len()),
        }
        let posnor = vertices
            .iter()
            .map(|v| {
                let [px, py, pz] = v.position;
                let [nx, ny, nz] = v.normal;
                [px, py, pz, nx, ny, nz]
            })
            .collect();
        frames.push(VertexFrame { frame, posnor });
    }
    Ok(frames)
}
