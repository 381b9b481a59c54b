use std::f64::consts::FRAC_1_SQRT_2;

use approx::assert_relative_eq;
use b4w_bake_core::{
    bake_action, bake_armature,
    channels::{Action, ActionLibrary, ChannelGroup, ChannelTarget, Interpolation},
    config::BakeConfig,
    error::BakeError,
    evaluator::{ActionPoseEvaluator, PoseEvaluator},
    math::Mat4,
    skeleton::{Bone, Skeleton},
    BakeTarget, FrameRange,
};
use nalgebra::{Matrix4, Rotation3, Vector3};

fn root_and_child() -> Skeleton {
    Skeleton::new(vec![
        Bone::new("root", Mat4::identity(), None),
        Bone::new(
            "child",
            Matrix4::new_translation(&Vector3::new(0.0, 1.0, 0.0)),
            Some(0),
        ),
    ])
    .unwrap()
}

/// Child rotates from identity at frame 1 to 90 degrees about Z at frame 10.
fn twist_action() -> Action {
    let mut action = Action::new("Twist", [1.0, 10.0]);
    let mut group = ChannelGroup::transform("child");
    let w = group.channel_mut(ChannelTarget::RotationQuaternion, 0).unwrap();
    w.insert(1.0, 1.0);
    w.insert(10.0, FRAC_1_SQRT_2);
    w.recalculate_handles();
    let z = group.channel_mut(ChannelTarget::RotationQuaternion, 3).unwrap();
    z.insert(1.0, 0.0);
    z.insert(10.0, FRAC_1_SQRT_2);
    z.recalculate_handles();
    action.groups.push(group);
    action
}

fn slide_action() -> Action {
    let mut action = Action::new("Slide", [1.0, 5.0]);
    let mut group = ChannelGroup::transform("root");
    let x = group.channel_mut(ChannelTarget::Location, 0).unwrap();
    x.insert(1.0, 0.0);
    x.insert(5.0, 2.0);
    x.recalculate_handles();
    action.groups.push(group);
    action
}

fn values(action: &Action, bone: &str, target: ChannelTarget, idx: usize) -> Vec<f64> {
    action
        .group(bone)
        .and_then(|g| g.channel(target, idx))
        .map(|c| c.points.iter().map(|p| p.value()).collect())
        .unwrap_or_default()
}

#[test]
fn child_twist_bakes_to_quaternion_ramp() {
    let skel = root_and_child();
    let lib = ActionLibrary::from_actions(vec![twist_action()]);
    let mut eval = ActionPoseEvaluator::new(&skel, &lib);
    let cfg = BakeConfig::default();

    let target = BakeTarget {
        object: "Armature",
        skeleton: Some(&skel),
        has_animation_data: true,
        linked: false,
        anim_names: &[],
    };
    let report = bake_armature(&target, &lib, &mut eval, &cfg).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.baked.len(), 1);
    let baked = &report.baked[0];
    assert_eq!(baked.name, "Twist_B4W_BAKED");
    assert_eq!(baked.frame_range, [1.0, 10.0]);

    // root never moves: every channel collapses to identity and is dropped
    assert!(baked.group("root").unwrap().channels.is_empty());

    let child = baked.group("child").unwrap();
    let kept: Vec<(ChannelTarget, usize)> = child
        .channels
        .iter()
        .map(|c| (c.target, c.array_index))
        .collect();
    assert_eq!(
        kept,
        vec![
            (ChannelTarget::RotationQuaternion, 0),
            (ChannelTarget::RotationQuaternion, 3)
        ]
    );

    let qw = values(baked, "child", ChannelTarget::RotationQuaternion, 0);
    let qz = values(baked, "child", ChannelTarget::RotationQuaternion, 3);
    assert_eq!(qz.len(), 10);
    assert_relative_eq!(qz[0], 0.0, epsilon = 1e-9);
    assert_relative_eq!(*qz.last().unwrap(), FRAC_1_SQRT_2, epsilon = 1e-9);
    assert_relative_eq!(*qw.last().unwrap(), FRAC_1_SQRT_2, epsilon = 1e-9);
    assert!(qz.windows(2).all(|w| w[1] >= w[0]));
    assert!(qw.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn consecutive_quaternions_never_flip_sign() {
    // w goes negative on the source curve; the bake must keep the hemisphere
    let skel = root_and_child();
    let mut action = Action::new("Spin", [1.0, 8.0]);
    let mut group = ChannelGroup::transform("child");
    let w = group.channel_mut(ChannelTarget::RotationQuaternion, 0).unwrap();
    w.insert(1.0, 1.0);
    w.insert(8.0, -1.0);
    w.recalculate_handles();
    let z = group.channel_mut(ChannelTarget::RotationQuaternion, 3).unwrap();
    z.insert(1.0, 0.0);
    z.insert(4.5, 1.0);
    z.insert(8.0, 0.0);
    z.recalculate_handles();
    action.groups.push(group);
    let lib = ActionLibrary::from_actions(vec![action]);

    let mut eval = ActionPoseEvaluator::new(&skel, &lib);
    eval.set_action(Some("Spin")).unwrap();
    let baked = bake_action(
        "Spin_B4W_BAKED",
        &skel,
        &mut eval,
        FrameRange::new(1, 8).unwrap(),
        &BakeConfig::default(),
    )
    .unwrap();

    let group = baked.group("child").unwrap();
    let comps: Vec<Vec<f64>> = (0..4)
        .map(|i| {
            group
                .channel(ChannelTarget::RotationQuaternion, i)
                .unwrap()
                .points
                .iter()
                .map(|p| p.value())
                .collect()
        })
        .collect();
    for f in 1..comps[0].len() {
        let dot: f64 = (0..4).map(|i| comps[i][f] * comps[i][f - 1]).sum();
        assert!(dot >= 0.0, "sign flip between samples {} and {f}", f - 1);
    }
}

#[test]
fn constrained_pose_is_reproduced_without_constraints() {
    let skel = root_and_child();
    let lib = ActionLibrary::from_actions(vec![slide_action()]);

    // world-space rotation override on the child, like a copy-rotation constraint
    let copy_rotation = |frame: i32, pose: &Mat4, _: &[Mat4]| -> Mat4 {
        let mut out =
            Rotation3::from_axis_angle(&Vector3::x_axis(), 0.1 * frame as f64).to_homogeneous();
        for row in 0..3 {
            out[(row, 3)] = pose[(row, 3)];
        }
        out
    };
    let mut constrained = ActionPoseEvaluator::new(&skel, &lib).with_constraint(1, copy_rotation);
    constrained.set_action(Some("Slide")).unwrap();

    let range = FrameRange::new(1, 5).unwrap();
    let baked = bake_action(
        "Slide_B4W_BAKED",
        &skel,
        &mut constrained,
        range,
        &BakeConfig::default(),
    )
    .unwrap();

    let expected: Vec<Vec<Mat4>> = range
        .frames()
        .map(|f| {
            constrained.set_frame(f).unwrap();
            (0..skel.len())
                .map(|b| constrained.pose_matrix(b).unwrap())
                .collect()
        })
        .collect();

    let baked_lib = ActionLibrary::from_actions(vec![baked]);
    let mut plain = ActionPoseEvaluator::new(&skel, &baked_lib);
    plain.set_action(Some("Slide_B4W_BAKED")).unwrap();
    for (i, f) in range.frames().enumerate() {
        plain.set_frame(f).unwrap();
        for b in 0..skel.len() {
            assert_relative_eq!(
                plain.pose_matrix(b).unwrap(),
                expected[i][b],
                epsilon = 1e-6
            );
        }
    }
}

#[test]
fn rebaking_replaces_in_place() {
    let skel = root_and_child();
    let mut lib = ActionLibrary::from_actions(vec![twist_action()]);
    let cfg = BakeConfig::default();
    let target = BakeTarget {
        object: "Armature",
        skeleton: Some(&skel),
        has_animation_data: true,
        linked: false,
        anim_names: &[],
    };

    for _ in 0..2 {
        let report = {
            let mut eval = ActionPoseEvaluator::new(&skel, &lib);
            bake_armature(&target, &lib, &mut eval, &cfg).unwrap()
        };
        assert!(report.apply(&mut lib).is_empty());
    }

    let names: Vec<&str> = lib.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Twist", "Twist_B4W_BAKED"]);
    let baked = lib.get("Twist_B4W_BAKED").unwrap();
    assert_eq!(baked.groups.len(), 2);
    assert_eq!(baked.fcurve_count(), 2);
}

#[test]
fn preconditions_skip_and_failures_stay_local() {
    let skel = root_and_child();
    let cfg = BakeConfig::default();
    let lib = ActionLibrary::new();
    let mut eval = ActionPoseEvaluator::new(&skel, &lib);

    let mut target = BakeTarget {
        object: "Cube",
        skeleton: None,
        has_animation_data: true,
        linked: false,
        anim_names: &[],
    };
    let err = bake_armature(&target, &lib, &mut eval, &cfg).unwrap_err();
    assert!(matches!(err, BakeError::NotAnArmature { .. }));
    assert!(err.is_skip());

    target.skeleton = Some(&skel);
    target.linked = true;
    assert!(bake_armature(&target, &lib, &mut eval, &cfg)
        .unwrap_err()
        .is_skip());

    // one broken range next to a good action
    let mut broken = Action::new("Broken", [5.0, 1.0]);
    broken.groups.push(ChannelGroup::transform("root"));
    let lib = ActionLibrary::from_actions(vec![broken, twist_action()]);
    let mut eval = ActionPoseEvaluator::new(&skel, &lib);
    eval.set_action(Some("Twist")).unwrap();
    eval.set_frame(42).unwrap();
    target.linked = false;

    let report = bake_armature(&target, &lib, &mut eval, &cfg).unwrap();
    assert_eq!(report.baked.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "Broken");
    assert!(matches!(
        report.failed[0].1,
        BakeError::InvalidFrameRange { .. }
    ));
    assert_eq!(eval.current_action().as_deref(), Some("Twist"));
    assert_eq!(eval.current_frame(), 42);
}

#[test]
fn deform_filter_drops_helper_bones() {
    let skel = Skeleton::new(vec![
        Bone::new("root", Mat4::identity(), None).with_deform(false),
        Bone::new("ik_target", Mat4::identity(), Some(0)).with_deform(false),
        Bone::new(
            "child",
            Matrix4::new_translation(&Vector3::new(0.0, 1.0, 0.0)),
            Some(0),
        ),
    ])
    .unwrap();
    let lib = ActionLibrary::from_actions(vec![twist_action()]);
    let mut eval = ActionPoseEvaluator::new(&skel, &lib);
    eval.set_action(Some("Twist")).unwrap();

    let cfg = BakeConfig {
        only_deform_bones: true,
        ..BakeConfig::default()
    };
    let baked = bake_action("T", &skel, &mut eval, FrameRange::new(1, 10).unwrap(), &cfg).unwrap();
    let groups: Vec<&str> = baked.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(groups, vec!["root", "child"]);
}

#[test]
fn singular_rest_matrix_is_reported() {
    let skel = Skeleton::new(vec![Bone::new("broken", Mat4::zeros(), None)]).unwrap();
    let lib = ActionLibrary::new();
    let mut eval = ActionPoseEvaluator::new(&skel, &lib);
    let err = bake_action(
        "X",
        &skel,
        &mut eval,
        FrameRange::new(3, 4).unwrap(),
        &BakeConfig::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        BakeError::SingularMatrix {
            bone: "broken".into(),
            frame: 3
        }
    );
}

#[test]
fn baked_curves_mark_steady_motion_linear() {
    // root slides at constant speed between keys with linear source curves
    let skel = root_and_child();
    let mut action = Action::new("March", [1.0, 6.0]);
    let mut group = ChannelGroup::transform("root");
    let x = group.channel_mut(ChannelTarget::Location, 0).unwrap();
    x.insert(1.0, 0.0);
    x.insert(6.0, 5.0);
    for p in &mut x.points {
        p.interpolation = Interpolation::Linear;
    }
    action.groups.push(group);
    let lib = ActionLibrary::from_actions(vec![action]);
    let mut eval = ActionPoseEvaluator::new(&skel, &lib);
    let target = BakeTarget {
        object: "Armature",
        skeleton: Some(&skel),
        has_animation_data: true,
        linked: false,
        anim_names: &[],
    };
    let report = bake_armature(&target, &lib, &mut eval, &BakeConfig::default()).unwrap();
    let baked = &report.baked[0];
    let x = baked
        .group("root")
        .unwrap()
        .channel(ChannelTarget::Location, 0)
        .unwrap();
    assert_eq!(x.points.len(), 6);
    assert!(x
        .points
        .iter()
        .all(|p| p.interpolation == Interpolation::Linear));
    assert_relative_eq!(x.points[3].value(), 3.0, epsilon = 1e-9);
}
