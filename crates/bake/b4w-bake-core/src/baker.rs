//! Skeletal baking: sample every frame of an action through the evaluator and
//! write plain location/quaternion/scale channels per bone.

use log::{info, warn};

use crate::channels::{Action, ActionLibrary, ChannelGroup, IdRoot};
use crate::config::BakeConfig;
use crate::error::BakeError;
use crate::evaluator::PoseEvaluator;
use crate::math::{decompose, Quat};
use crate::optimize::optimize_action;
use crate::reconstruct::{reconstruct_local_pose, ParentPose, SampleSite};
use crate::skeleton::Skeleton;

/// Inclusive integer frame range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRange {
    pub start: i32,
    pub end: i32,
}

impl FrameRange {
    pub fn new(start: i32, end: i32) -> Result<Self, BakeError> {
        if start > end {
            return Err(BakeError::InvalidFrameRange {
                start: start as f64,
                end: end as f64,
            });
        }
        Ok(Self { start, end })
    }

    /// Round an authored (possibly fractional) action range.
    pub fn from_action_range(range: [f64; 2]) -> Result<Self, BakeError> {
        let [start, end] = range;
        if !start.is_finite() || !end.is_finite() {
            return Err(BakeError::InvalidFrameRange { start, end });
        }
        Self::new(start.round() as i32, end.round() as i32)
    }

    pub fn frames(&self) -> std::ops::RangeInclusive<i32> {
        self.start..=self.end
    }

    /// Number of frames. Computed in `i64` so the widest `i32` range fits.
    pub fn len(&self) -> usize {
        usize::try_from(i64::from(self.end) - i64::from(self.start) + 1).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Bake the evaluator's currently active animation into a new action named
/// `name`, sampling `range` frame by frame in increasing order.
///
/// Quaternions are sign-corrected so consecutive samples of a bone never
/// have a negative dot product.
pub fn bake_action<E>(
    name: &str,
    skeleton: &Skeleton,
    evaluator: &mut E,
    range: FrameRange,
    cfg: &BakeConfig,
) -> Result<Action, BakeError>
where
    E: PoseEvaluator + ?Sized,
{
    let included: Vec<usize> = if cfg.only_deform_bones {
        skeleton
            .deform_mask()
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect()
    } else {
        (0..skeleton.len()).collect()
    };

    let mut groups: Vec<ChannelGroup> = included
        .iter()
        .map(|&i| ChannelGroup::transform(skeleton.bone(i).name.clone()))
        .collect();
    let mut prev_quats: Vec<Option<Quat>> = vec![None; included.len()];

    for frame in range.frames() {
        evaluator.set_frame(frame)?;

        for (slot, &idx) in included.iter().enumerate() {
            let bone = skeleton.bone(idx);
            let site = SampleSite {
                bone: &bone.name,
                frame,
            };
            let global = evaluator
                .pose_matrix(idx)
                .ok_or_else(|| BakeError::MissingPose {
                    bone: bone.name.clone(),
                    frame,
                })?;

            let parent_global = match bone.parent {
                Some(p) => Some((
                    p,
                    evaluator.pose_matrix(p).ok_or_else(|| BakeError::MissingPose {
                        bone: skeleton.bone(p).name.clone(),
                        frame,
                    })?,
                )),
                None => None,
            };
            let parent = parent_global.as_ref().map(|(p, global)| ParentPose {
                rest: &skeleton.bone(*p).rest_matrix,
                global,
            });

            let local =
                reconstruct_local_pose(&bone.rest_matrix, &global, parent, cfg.inverse_bias, site)?;
            let trs = decompose(&local);

            let mut quat = trs.rotation;
            if let Some(prev) = prev_quats[slot] {
                if quat.dot(&prev) < 0.0 {
                    quat = quat.negated();
                }
            }
            prev_quats[slot] = Some(quat);

            // channel order is fixed by ChannelGroup::transform
            let quat_values = quat.to_array();
            let values = trs
                .translation
                .iter()
                .chain(quat_values.iter())
                .chain(trs.scale.iter());
            let f = frame as f64;
            for (channel, &value) in groups[slot].channels.iter_mut().zip(values) {
                channel.insert(f, value);
            }
        }
    }

    for group in &mut groups {
        for channel in &mut group.channels {
            channel.recalculate_handles();
        }
    }

    let mut action = Action::new(name, [range.start as f64, range.end as f64]);
    action.groups = groups;
    Ok(action)
}

/// What to bake: an object and, if it is an armature, its skeleton.
#[derive(Clone, Copy, Debug)]
pub struct BakeTarget<'a> {
    pub object: &'a str,
    /// `None` when the object is not an armature.
    pub skeleton: Option<&'a Skeleton>,
    pub has_animation_data: bool,
    /// Object comes from a linked library.
    pub linked: bool,
    /// Explicit list of actions to bake; empty means every eligible action.
    pub anim_names: &'a [String],
}

/// Actions of `library` eligible for baking on a target: object actions,
/// not already baked, restricted to `anim_names` when given.
pub fn valid_actions<'l>(
    library: &'l ActionLibrary,
    anim_names: &[String],
    cfg: &BakeConfig,
) -> Vec<&'l Action> {
    library
        .iter()
        .filter(|a| a.id_root == IdRoot::Object)
        .filter(|a| !cfg.is_baked_name(&a.name))
        .filter(|a| anim_names.is_empty() || anim_names.iter().any(|n| *n == a.name))
        .collect()
}

/// Outcome of [`bake_armature`]: baked actions plus per-action failures.
#[derive(Debug, Default)]
pub struct BakeReport {
    pub baked: Vec<Action>,
    pub failed: Vec<(String, BakeError)>,
}

impl BakeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Store baked actions, replacing stale ones in place.
    pub fn apply(self, library: &mut ActionLibrary) -> Vec<(String, BakeError)> {
        for action in self.baked {
            library.store(action);
        }
        self.failed
    }
}

fn bake_one<E>(
    action: &Action,
    skeleton: &Skeleton,
    evaluator: &mut E,
    cfg: &BakeConfig,
) -> Result<Action, BakeError>
where
    E: PoseEvaluator + ?Sized,
{
    evaluator.set_action(Some(&action.name))?;
    let range = FrameRange::from_action_range(action.frame_range)?;
    let mut baked = bake_action(&cfg.baked_name(&action.name), skeleton, evaluator, range, cfg)?;
    optimize_action(&mut baked, cfg);
    Ok(baked)
}

/// Bake every eligible action of an armature.
///
/// Precondition failures (not an armature, no animation data, linked) are
/// returned as errors for which [`BakeError::is_skip`] holds. A failure while
/// baking one action is recorded in the report and does not affect the
/// other actions. The evaluator's action and frame are restored afterwards.
pub fn bake_armature<E>(
    target: &BakeTarget<'_>,
    library: &ActionLibrary,
    evaluator: &mut E,
    cfg: &BakeConfig,
) -> Result<BakeReport, BakeError>
where
    E: PoseEvaluator + ?Sized,
{
    let Some(skeleton) = target.skeleton else {
        return Err(BakeError::NotAnArmature {
            object: target.object.to_string(),
        });
    };
    if !target.has_animation_data {
        return Err(BakeError::NoAnimationData {
            object: target.object.to_string(),
        });
    }
    if target.linked {
        return Err(BakeError::LinkedObject {
            object: target.object.to_string(),
        });
    }

    let saved_action = evaluator.current_action();
    let saved_frame = evaluator.current_frame();

    let mut report = BakeReport::default();
    for action in valid_actions(library, target.anim_names, cfg) {
        info!("processing action {}", action.name);
        match bake_one(action, skeleton, evaluator, cfg) {
            Ok(baked) => report.baked.push(baked),
            Err(err) => {
                warn!("bake of '{}' failed: {err}", action.name);
                report.failed.push((action.name.clone(), err));
            }
        }
    }

    evaluator.set_action(saved_action.as_deref())?;
    evaluator.set_frame(saved_frame)?;
    Ok(report)
}
