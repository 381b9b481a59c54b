//! Post-bake curve optimization: key cleaning, dead-channel removal and
//! linear-segment detection. Keyframe values are never modified; only keys,
//! whole channels, interpolation modes and handle heights change.

use log::debug;

use crate::channels::{Action, ChannelTarget, FCurve, Interpolation, KeyframePoint};
use crate::config::BakeConfig;

/// Drop keys that repeat their neighbours' value within `threshold`.
///
/// An interior key goes when it matches both the previously kept key and the
/// next key; a trailing key goes when it matches the previously kept key.
/// A constant channel collapses to its first key.
pub fn clean_keys(curve: &mut FCurve, threshold: f64) -> usize {
    let n = curve.points.len();
    if n < 2 {
        return 0;
    }
    let source = std::mem::take(&mut curve.points);
    let mut kept = Vec::with_capacity(n);
    kept.push(source[0]);
    for i in 1..n {
        let cur = source[i].value();
        let prev = kept.last().map_or(cur, KeyframePoint::value);
        let same_as_prev = (cur - prev).abs() <= threshold;
        let redundant = match source.get(i + 1) {
            Some(next) => same_as_prev && (cur - next.value()).abs() <= threshold,
            None => same_as_prev,
        };
        if !redundant {
            kept.push(source[i]);
        }
    }
    let removed = n - kept.len();
    curve.points = kept;
    if removed > 0 {
        curve.recalculate_handles();
    }
    removed
}

/// A single-key channel sitting on the identity value of its property.
pub fn is_dead_channel(curve: &FCurve, epsilon: f64) -> bool {
    match curve.points.as_slice() {
        [only] => {
            let identity = curve.target.identity(curve.array_index);
            let relevant = matches!(
                curve.target,
                ChannelTarget::Location | ChannelTarget::RotationQuaternion | ChannelTarget::Scale
            );
            relevant && (only.value() - identity).abs() < epsilon
        }
        _ => false,
    }
}

/// Remove dead channels from every group; returns how many went.
pub fn remove_dead_channels(action: &mut Action, epsilon: f64) -> usize {
    let mut removed = 0;
    for group in &mut action.groups {
        let before = group.channels.len();
        group.channels.retain(|c| !is_dead_channel(c, epsilon));
        removed += before - group.channels.len();
    }
    removed
}

/// Mark collinear runs and one-frame steps as LINEAR and flatten the Bezier
/// handles that border them.
pub fn detect_linear_parts(curve: &mut FCurve, tolerance: f64) {
    let n = curve.points.len();
    if n < 3 {
        return;
    }
    let pts = &mut curve.points;
    for i in 1..n - 1 {
        let [x1, y1] = pts[i - 1].co;
        let [x2, y2] = pts[i].co;
        let [x3, y3] = pts[i + 1].co;

        let neighbour = x3 - x2 == 1.0;
        let k = (y2 - y1) / (x2 - x1);
        let b = y1 - k * x1;
        let on_line = (k * x3 + b - y3).abs() < tolerance;

        if neighbour || on_line {
            pts[i].interpolation = Interpolation::Linear;
            if i == 1 {
                pts[0].interpolation = Interpolation::Linear;
            }
            if i == n - 2 {
                pts[n - 1].interpolation = Interpolation::Linear;
            }
        }

        let prev_interp = pts[i - 1].interpolation;
        let cur_interp = pts[i].interpolation;
        if prev_interp == Interpolation::Bezier && cur_interp == Interpolation::Linear {
            pts[i].handle_left[1] = k * pts[i].handle_left[0] + b;
            pts[i - 1].handle_right[1] = k * pts[i - 1].handle_right[0] + b;
        }
        if prev_interp == Interpolation::Linear && cur_interp == Interpolation::Bezier {
            pts[i].handle_right[1] = y3;
        }
    }
}

/// Counts of what [`optimize_action`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub keys_removed: usize,
    pub channels_removed: usize,
}

/// Full post-bake pass: cleaning (when enabled), dead-channel removal, then
/// linearity detection.
pub fn optimize_action(action: &mut Action, cfg: &BakeConfig) -> OptimizeStats {
    let mut stats = OptimizeStats::default();
    if cfg.clean_keys {
        for group in &mut action.groups {
            for curve in &mut group.channels {
                stats.keys_removed += clean_keys(curve, cfg.clean_threshold);
            }
        }
    }
    stats.channels_removed = remove_dead_channels(action, cfg.identity_epsilon);
    for group in &mut action.groups {
        for curve in &mut group.channels {
            detect_linear_parts(curve, cfg.linear_tolerance);
        }
    }
    debug!(
        "optimized {}: {} keys, {} channels removed",
        action.name, stats.keys_removed, stats.channels_removed
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(target: ChannelTarget, idx: usize, pts: &[(f64, f64)]) -> FCurve {
        let mut c = FCurve::new(target, idx);
        for &(f, v) in pts {
            c.insert(f, v);
        }
        c.recalculate_handles();
        c
    }

    #[test]
    fn constant_channel_collapses_to_one_key() {
        let mut c = curve(
            ChannelTarget::Location,
            0,
            &[(1.0, 0.5), (2.0, 0.5), (3.0, 0.5004), (4.0, 0.5)],
        );
        assert_eq!(clean_keys(&mut c, 1e-3), 3);
        assert_eq!(c.points.len(), 1);
        assert_eq!(c.points[0].frame(), 1.0);
    }

    #[test]
    fn cleaning_keeps_the_edges_of_a_hold() {
        let mut c = curve(
            ChannelTarget::Location,
            0,
            &[(1.0, 0.0), (2.0, 1.0), (3.0, 1.0), (4.0, 1.0), (5.0, 2.0)],
        );
        clean_keys(&mut c, 1e-3);
        let frames: Vec<f64> = c.points.iter().map(|p| p.frame()).collect();
        assert_eq!(frames, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn dead_channel_only_for_single_identity_keys() {
        let w = curve(ChannelTarget::RotationQuaternion, 0, &[(1.0, 1.00005)]);
        let x = curve(ChannelTarget::RotationQuaternion, 1, &[(1.0, 1.0)]);
        let s = curve(ChannelTarget::Scale, 2, &[(1.0, 1.0), (2.0, 1.0)]);
        assert!(is_dead_channel(&w, 1e-4));
        assert!(!is_dead_channel(&x, 1e-4));
        assert!(!is_dead_channel(&s, 1e-4));
    }

    #[test]
    fn straight_ramp_becomes_linear_end_to_end() {
        let mut c = curve(
            ChannelTarget::Location,
            0,
            &[(0.0, 0.0), (2.0, 2.0), (4.0, 4.0), (6.0, 6.0)],
        );
        let values: Vec<f64> = c.points.iter().map(|p| p.value()).collect();
        detect_linear_parts(&mut c, 1e-4);
        assert!(c
            .points
            .iter()
            .all(|p| p.interpolation == Interpolation::Linear));
        let after: Vec<f64> = c.points.iter().map(|p| p.value()).collect();
        assert_eq!(values, after);
    }

    #[test]
    fn curved_sparse_keys_stay_bezier() {
        let mut c = curve(
            ChannelTarget::Location,
            0,
            &[(0.0, 0.0), (5.0, 3.0), (10.0, 4.0), (15.0, 0.0)],
        );
        detect_linear_parts(&mut c, 1e-4);
        assert!(c
            .points
            .iter()
            .all(|p| p.interpolation == Interpolation::Bezier));
    }

    #[test]
    fn adjacent_frames_mark_linear() {
        let mut c = curve(
            ChannelTarget::Location,
            0,
            &[(0.0, 0.0), (5.0, 3.0), (6.0, 4.0), (15.0, 0.0)],
        );
        detect_linear_parts(&mut c, 1e-4);
        assert_eq!(c.points[1].interpolation, Interpolation::Linear);
        assert_eq!(c.points[0].interpolation, Interpolation::Linear);
        assert_eq!(c.points[2].interpolation, Interpolation::Bezier);
    }
}
