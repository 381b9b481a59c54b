use log::{info, warn};

use b4w_bake_core::{
    bake_armature, ActionPoseEvaluator, BakeConfig, BakeError, BakeReport, BakeTarget, Mat4,
    PoseEvaluator,
};
use b4w_export::scene::ObjectKind;
use b4w_export::SceneGraph;

/// Result of [`bake_scene`].
#[derive(Debug, Default)]
pub struct BakeSummary {
    /// Names of the baked actions, in bake order.
    pub baked: Vec<String>,
    /// Objects that did not qualify, with the reason.
    pub skipped: Vec<(String, BakeError)>,
    /// Actions (or objects) whose bake failed.
    pub failed: Vec<(String, BakeError)>,
}

fn bake_object(
    graph: &SceneGraph,
    name: &str,
    cfg: &BakeConfig,
) -> Result<BakeReport, BakeError> {
    let Some(obj) = graph.object(name) else {
        return Err(BakeError::NotAnArmature {
            object: name.to_string(),
        });
    };
    let skeleton = match obj.kind {
        ObjectKind::Armature => obj
            .data
            .as_deref()
            .and_then(|d| graph.armature(d))
            .map(|a| &a.skeleton),
        _ => None,
    };
    let target = BakeTarget {
        object: &obj.name,
        skeleton,
        has_animation_data: obj.animation_data.is_some(),
        linked: obj.library.is_some(),
        anim_names: &obj.anim_names,
    };
    let Some(skeleton) = skeleton else {
        return bake_armature(&target, &graph.actions, &mut NoPose, cfg);
    };

    let mut eval =
        ActionPoseEvaluator::new(skeleton, &graph.actions).with_inverse_bias(cfg.inverse_bias);
    let current = obj.animation_data.as_ref().and_then(|a| a.action.as_deref());
    if let Some(action) = current {
        eval.set_action(Some(action))?;
    }
    bake_armature(&target, &graph.actions, &mut eval, cfg)
}

/// Stand-in evaluator for objects without a skeleton; the precondition
/// checks reject them before any evaluation happens.
struct NoPose;

impl PoseEvaluator for NoPose {
    fn current_action(&self) -> Option<String> {
        None
    }
    fn set_action(&mut self, _action: Option<&str>) -> Result<(), BakeError> {
        Ok(())
    }
    fn current_frame(&self) -> i32 {
        0
    }
    fn set_frame(&mut self, _frame: i32) -> Result<(), BakeError> {
        Ok(())
    }
    fn pose_matrix(&self, _bone: usize) -> Option<Mat4> {
        None
    }
}

/// Bake the actions of `objects` (every armature object when empty) and
/// store the results in the scene's action library.
pub fn bake_scene(graph: &mut SceneGraph, objects: &[String], cfg: &BakeConfig) -> BakeSummary {
    let names: Vec<String> = if objects.is_empty() {
        graph
            .objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Armature)
            .map(|o| o.name.clone())
            .collect()
    } else {
        objects.to_vec()
    };

    let mut summary = BakeSummary::default();
    let mut reports = Vec::with_capacity(names.len());
    for name in names {
        match bake_object(graph, &name, cfg) {
            Ok(report) => reports.push(report),
            Err(err) if err.is_skip() => {
                warn!("skipping '{name}': {err}");
                summary.skipped.push((name, err));
            }
            Err(err) => {
                warn!("bake of '{name}' failed: {err}");
                summary.failed.push((name, err));
            }
        }
    }

    for report in reports {
        summary
            .baked
            .extend(report.baked.iter().map(|a| a.name.clone()));
        summary.failed.extend(report.apply(&mut graph.actions));
    }
    info!(
        "baked {} action(s), {} skipped, {} failed",
        summary.baked.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    summary
}
