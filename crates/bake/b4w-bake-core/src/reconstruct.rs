//! Recover a bone's local pose (Blender's `matrix_basis`) from evaluated,
//! constraint-aware armature-space matrices.
//!
//! The evaluated matrix of a bone already contains everything constraints
//! and IK did to it, while the authored local transform does not. Going
//! through "pseudo channels" bakes those contributions into the local pose:
//!
//! ```text
//! channel   = global * rest^-1
//! own       = (parent_global * parent_rest^-1)^-1 * channel
//! local     = rest^-1 * own * rest
//! ```

use crate::error::BakeError;
use crate::math::{safe_inverse, Mat4};

/// Rest and evaluated matrices of the parent bone.
#[derive(Clone, Copy, Debug)]
pub struct ParentPose<'a> {
    pub rest: &'a Mat4,
    pub global: &'a Mat4,
}

/// Bone/frame pair used to label reconstruction failures.
#[derive(Clone, Copy, Debug)]
pub struct SampleSite<'a> {
    pub bone: &'a str,
    pub frame: i32,
}

fn invert(m: &Mat4, bias: f64, site: SampleSite<'_>) -> Result<Mat4, BakeError> {
    safe_inverse(m, bias).ok_or_else(|| BakeError::SingularMatrix {
        bone: site.bone.to_string(),
        frame: site.frame,
    })
}

/// `global * rest^-1`: the pose chain applied up to and including this bone,
/// without its rest offset.
pub fn pseudo_channel(
    rest: &Mat4,
    global: &Mat4,
    bias: f64,
    site: SampleSite<'_>,
) -> Result<Mat4, BakeError> {
    Ok(global * invert(rest, bias, site)?)
}

/// Local pose matrix of a bone, parent contribution removed.
pub fn reconstruct_local_pose(
    bone_rest: &Mat4,
    bone_global: &Mat4,
    parent: Option<ParentPose<'_>>,
    bias: f64,
    site: SampleSite<'_>,
) -> Result<Mat4, BakeError> {
    let rest_inv = invert(bone_rest, bias, site)?;
    let mut channel = bone_global * rest_inv;

    if let Some(parent) = parent {
        let parent_channel = pseudo_channel(parent.rest, parent.global, bias, site)?;
        channel = invert(&parent_channel, bias, site)? * channel;
    }

    Ok(rest_inv * channel * bone_rest)
}
