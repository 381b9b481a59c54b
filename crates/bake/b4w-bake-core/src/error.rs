//! Error types for baking passes.

use serde::{Deserialize, Serialize};

/// Everything that can stop a skeletal or vertex bake.
///
/// The first three variants are preconditions on the bake target and are
/// reported to the user as "skipped" rather than as failures (see
/// [`BakeError::is_skip`]).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum BakeError {
    /// The bake target is not an armature.
    #[error("Not an armature object: {object}")]
    NotAnArmature { object: String },

    /// The armature has nothing to bake.
    #[error("No animation data: {object}")]
    NoAnimationData { object: String },

    /// Linked (library) objects cannot be rebaked in place.
    #[error("Armature object is linked: {object}")]
    LinkedObject { object: String },

    /// Frame range is reversed or not finite.
    #[error("Invalid frame range [{start}, {end}]")]
    InvalidFrameRange { start: f64, end: f64 },

    /// Skeleton violates its structural invariants.
    #[error("Invalid skeleton: {reason}")]
    InvalidSkeleton { reason: String },

    /// The evaluator produced no pose for a bone.
    #[error("No evaluated pose for bone '{bone}' at frame {frame}")]
    MissingPose { bone: String, frame: i32 },

    /// A matrix on the reconstruction path could not be inverted even with the
    /// safe-inverse fallback.
    #[error("Singular matrix for bone '{bone}' at frame {frame}")]
    SingularMatrix { bone: String, frame: i32 },

    /// The evaluated mesh changed its vertex count during a vertex bake.
    #[error(
        "Vertex count of '{object}' changed at frame {frame}: expected {expected}, found {found}"
    )]
    TopologyChanged {
        object: String,
        frame: i32,
        expected: usize,
        found: usize,
    },

    /// The evaluator does not know the requested action.
    #[error("Unknown action: {name}")]
    UnknownAction { name: String },
}

impl BakeError {
    /// Precondition failures that should be shown as "skip with message".
    #[inline]
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::NotAnArmature { .. } | Self::NoAnimationData { .. } | Self::LinkedObject { .. }
        )
    }

    /// Short label used in log lines and CLI reports.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotAnArmature { .. } | Self::NoAnimationData { .. } | Self::LinkedObject { .. } => {
                "precondition"
            }
            Self::InvalidFrameRange { .. } | Self::InvalidSkeleton { .. } => "validation",
            Self::MissingPose { .. } | Self::UnknownAction { .. } => "evaluation",
            Self::SingularMatrix { .. } => "math",
            Self::TopologyChanged { .. } => "topology",
        }
    }
}
