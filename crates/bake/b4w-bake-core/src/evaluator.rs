//! Scene evaluation seams and a forward-kinematics evaluator over actions.
//!
//! The bakers never evaluate animation themselves; they drive a
//! [`PoseEvaluator`] / [`MeshEvaluator`] frame by frame and read back the
//! evaluated state.

use hashbrown::HashMap;
use log::debug;

use crate::channels::{Action, ActionLibrary, ChannelTarget};
use crate::error::BakeError;
use crate::math::{compose, safe_inverse, Mat4, Quat, Trs};
use crate::skeleton::Skeleton;

/// Armature evaluation: set action and frame, read evaluated bone matrices.
pub trait PoseEvaluator {
    fn current_action(&self) -> Option<String>;
    fn set_action(&mut self, action: Option<&str>) -> Result<(), BakeError>;
    fn current_frame(&self) -> i32;
    fn set_frame(&mut self, frame: i32) -> Result<(), BakeError>;
    /// Armature-space matrix of `bone` after constraints, at the current frame.
    fn pose_matrix(&self, bone: usize) -> Option<Mat4>;
}

/// One evaluated vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Mesh evaluation with all modifiers/deformers applied.
pub trait MeshEvaluator {
    fn object_name(&self) -> &str;
    fn current_frame(&self) -> i32;
    fn set_frame(&mut self, frame: i32) -> Result<(), BakeError>;
    fn evaluated_vertices(&mut self) -> Result<Vec<MeshVertex>, BakeError>;
}

/// Post-FK adjustment of one bone's armature-space matrix, standing in for
/// constraints and IK. Children inherit the adjusted matrix.
pub trait PoseConstraint {
    fn apply(&self, frame: i32, pose: &Mat4, evaluated: &[Mat4]) -> Mat4;
}

impl<F> PoseConstraint for F
where
    F: Fn(i32, &Mat4, &[Mat4]) -> Mat4,
{
    fn apply(&self, frame: i32, pose: &Mat4, evaluated: &[Mat4]) -> Mat4 {
        self(frame, pose, evaluated)
    }
}

/// Evaluates a skeleton from the pose-bone channels of actions in a library.
///
/// Per bone: `pose = parent_pose * parent_rest^-1 * rest * basis` (root:
/// `rest * basis`), where `basis` comes from the active action's
/// location/rotation_quaternion/scale curves (identity where a curve is
/// absent), then any registered constraint is applied.
pub struct ActionPoseEvaluator<'a> {
    skeleton: &'a Skeleton,
    library: &'a ActionLibrary,
    constraints: HashMap<usize, Box<dyn PoseConstraint + 'a>>,
    action: Option<String>,
    frame: i32,
    poses: Vec<Mat4>,
    inverse_bias: f64,
}

impl<'a> ActionPoseEvaluator<'a> {
    pub fn new(skeleton: &'a Skeleton, library: &'a ActionLibrary) -> Self {
        let mut eval = Self {
            skeleton,
            library,
            constraints: HashMap::new(),
            action: None,
            frame: 0,
            poses: Vec::with_capacity(skeleton.len()),
            inverse_bias: 1e-8,
        };
        eval.refresh();
        eval
    }

    pub fn with_constraint(mut self, bone: usize, constraint: impl PoseConstraint + 'a) -> Self {
        self.constraints.insert(bone, Box::new(constraint));
        self.refresh();
        self
    }

    pub fn with_inverse_bias(mut self, bias: f64) -> Self {
        self.inverse_bias = bias;
        self.refresh();
        self
    }

    /// Re-evaluate after a builder change. A failure leaves no poses; the
    /// error resurfaces on the next `set_frame`/`set_action`.
    fn refresh(&mut self) {
        if let Err(err) = self.evaluate() {
            debug!("pose evaluation deferred: {err}");
        }
    }

    fn active(&self) -> Option<&Action> {
        self.action.as_deref().and_then(|name| self.library.get(name))
    }

    fn basis(action: Option<&Action>, bone: &str, frame: f64) -> Mat4 {
        let Some(action) = action else {
            return Mat4::identity();
        };
        let Some(group) = action.group(bone) else {
            return Mat4::identity();
        };
        let sample = |target: ChannelTarget, idx: usize| {
            group
                .channel(target, idx)
                .and_then(|c| c.evaluate(frame))
                .unwrap_or_else(|| target.identity(idx))
        };
        let trs = Trs {
            translation: [
                sample(ChannelTarget::Location, 0),
                sample(ChannelTarget::Location, 1),
                sample(ChannelTarget::Location, 2),
            ],
            rotation: Quat::new(
                sample(ChannelTarget::RotationQuaternion, 0),
                sample(ChannelTarget::RotationQuaternion, 1),
                sample(ChannelTarget::RotationQuaternion, 2),
                sample(ChannelTarget::RotationQuaternion, 3),
            ),
            scale: [
                sample(ChannelTarget::Scale, 0),
                sample(ChannelTarget::Scale, 1),
                sample(ChannelTarget::Scale, 2),
            ],
        };
        compose(&trs)
    }

    fn evaluate(&mut self) -> Result<(), BakeError> {
        self.poses.clear();
        let action = self.active();
        let frame = self.frame;
        let mut poses: Vec<Mat4> = Vec::with_capacity(self.skeleton.len());
        for (idx, bone) in self.skeleton.bones().iter().enumerate() {
            let basis = Self::basis(action, &bone.name, frame as f64);
            let mut pose = match bone.parent {
                Some(p) => {
                    let parent_rest = &self.skeleton.bone(p).rest_matrix;
                    let parent_rest_inv = safe_inverse(parent_rest, self.inverse_bias)
                        .ok_or_else(|| BakeError::SingularMatrix {
                            bone: self.skeleton.bone(p).name.clone(),
                            frame,
                        })?;
                    poses[p] * parent_rest_inv * bone.rest_matrix * basis
                }
                None => bone.rest_matrix * basis,
            };
            if let Some(constraint) = self.constraints.get(&idx) {
                pose = constraint.apply(frame, &pose, &poses);
            }
            poses.push(pose);
        }
        self.poses = poses;
        Ok(())
    }
}

impl PoseEvaluator for ActionPoseEvaluator<'_> {
    fn current_action(&self) -> Option<String> {
        self.action.clone()
    }

    fn set_action(&mut self, action: Option<&str>) -> Result<(), BakeError> {
        if let Some(name) = action {
            if self.library.get(name).is_none() {
                return Err(BakeError::UnknownAction {
                    name: name.to_string(),
                });
            }
        }
        self.action = action.map(str::to_string);
        self.evaluate()
    }

    fn current_frame(&self) -> i32 {
        self.frame
    }

    fn set_frame(&mut self, frame: i32) -> Result<(), BakeError> {
        self.frame = frame;
        self.evaluate()
    }

    fn pose_matrix(&self, bone: usize) -> Option<Mat4> {
        self.poses.get(bone).copied()
    }
}
