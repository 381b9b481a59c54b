//! Blend4Web bake core (host-agnostic)
//!
//! Turns hierarchical, constraint-driven armature animation into flat
//! per-bone location/quaternion/scale channels, optimizes the resulting
//! curves, and records per-frame vertex data for vertex animation. Scene
//! evaluation is abstracted behind [`PoseEvaluator`] and [`MeshEvaluator`].

pub mod baker;
pub mod channels;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod math;
pub mod optimize;
pub mod reconstruct;
pub mod skeleton;
pub mod vertex;

// Re-exports for consumers (exporter, CLI)
pub use baker::{bake_action, bake_armature, valid_actions, BakeReport, BakeTarget, FrameRange};
pub use channels::{
    Action, ActionLibrary, ChannelGroup, ChannelTarget, FCurve, IdRoot, Interpolation,
    KeyframePoint,
};
pub use config::{BakeConfig, BAKED_SUFFIX};
pub use error::BakeError;
pub use evaluator::{
    ActionPoseEvaluator, MeshEvaluator, MeshVertex, PoseConstraint, PoseEvaluator,
};
pub use math::{compose, decompose, safe_inverse, Mat4, Quat, Trs};
pub use optimize::{optimize_action, OptimizeStats};
pub use reconstruct::reconstruct_local_pose;
pub use skeleton::{Bone, Skeleton};
pub use vertex::{bake_vertex_animation, VertexAnimation, VertexFrame};
