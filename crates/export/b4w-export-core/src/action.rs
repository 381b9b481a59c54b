//! Action encoding: fcurve keyframes packed into the float section.
//!
//! Each keyframe becomes `[interpolation code, frame, value]`, followed by
//! the left handle only when the previous keyframe is Bezier and by the
//! right handle only when this keyframe is Bezier.

use indexmap::IndexMap;

use b4w_bake_core::{Action, ActionLibrary, FCurve, Interpolation, BAKED_SUFFIX};

use crate::binary::BinaryBuffers;
use crate::manifest::{ActionEntry, FCurveEntry};
use crate::messages::Messages;

/// Channel count the runtime allocates per transform data path.
pub const TRANSFORM_NUM_CHANNELS: u32 = 8;

/// Frames further than this from an integer are reported as fractional.
const DECIMAL_FRAME_EPS: f64 = 0.003;

/// The action an animated datablock should play: its baked counterpart
/// when one exists.
pub fn select_action<'a>(name: &str, library: &'a ActionLibrary) -> Option<&'a Action> {
    if name.contains(BAKED_SUFFIX) {
        return library.get(name);
    }
    library
        .get(&format!("{name}{BAKED_SUFFIX}"))
        .or_else(|| library.get(name))
}

/// Whether `action` is superseded by a baked version in `library`.
pub fn has_baked_version(action: &Action, library: &ActionLibrary) -> bool {
    library.get(&format!("{}{BAKED_SUFFIX}", action.name)).is_some()
}

fn num_channels(path: &str) -> u32 {
    let transform = ["location", "rotation_quaternion", "rotation_euler", "scale"];
    if transform.iter().any(|p| path.contains(p)) {
        TRANSFORM_NUM_CHANNELS
    } else if path.starts_with("color") {
        3
    } else {
        1
    }
}

/// Flatten one fcurve. Returns the float stream and the offset of the last
/// keyframe's record, plus whether any frame had to be rounded.
fn encode_fcurve(curve: &FCurve) -> (Vec<f32>, usize, bool) {
    let mut data: Vec<f32> = Vec::with_capacity(curve.points.len() * 7);
    let mut seen: Vec<f64> = Vec::with_capacity(curve.points.len());
    let mut previous: Option<Interpolation> = None;
    let mut last_frame_offset = 0;
    let mut decimal = false;
    let last = curve.points.len().saturating_sub(1);

    for (i, point) in curve.points.iter().enumerate() {
        let frame = point.frame();
        // identical frames: keep the first
        if seen.contains(&frame) {
            continue;
        }
        seen.push(frame);

        if (frame.round() - frame).abs() > DECIMAL_FRAME_EPS {
            decimal = true;
        }

        if i == last {
            last_frame_offset = data.len();
        }
        data.push(point.interpolation.code() as f32);
        data.push(frame.round() as f32);
        data.push(point.value() as f32);

        if previous == Some(Interpolation::Bezier) {
            data.push(point.handle_left[0] as f32);
            data.push(point.handle_left[1] as f32);
        }
        if point.interpolation == Interpolation::Bezier {
            data.push(point.handle_right[0] as f32);
            data.push(point.handle_right[1] as f32);
        }
        previous = Some(point.interpolation);
    }
    (data, last_frame_offset, decimal)
}

/// Encode `action` into the binary buffers and describe it for the manifest.
pub fn encode_action(
    action: &Action,
    uuid: String,
    binary: &mut BinaryBuffers,
    messages: &mut Messages,
) -> ActionEntry {
    let frame_range = [
        action.frame_range[0].round() as i64,
        action.frame_range[1].round() as i64,
    ];

    if action.fcurve_count() == 0 {
        messages.warn(format!("The action \"{}\" has no fcurves.", action.name));
    }

    // group curves by data path, first appearance order
    let mut by_path: IndexMap<String, Vec<&FCurve>> = IndexMap::new();
    for (group, curve) in action.fcurves() {
        by_path
            .entry(curve.data_path(group.bone()))
            .or_default()
            .push(curve);
    }
    let has_quat = by_path.keys().any(|p| p.contains("rotation_quaternion"));
    if has_quat {
        by_path.retain(|p, _| !p.contains("rotation_euler"));
    }

    let mut fcurves: IndexMap<String, IndexMap<usize, FCurveEntry>> = IndexMap::new();
    let mut has_decimal_frames = false;
    for (path, curves) in &by_path {
        let is_scale = path.contains("scale");
        let channels = num_channels(path);
        let slot = fcurves.entry(path.clone()).or_default();
        for curve in curves {
            if is_scale && !slot.is_empty() {
                // uniform scale: one channel is enough
                continue;
            }
            let array_index = if is_scale { 0 } else { curve.array_index };
            let (data, last_frame_offset, decimal) = encode_fcurve(curve);
            has_decimal_frames |= decimal;
            let bin_data_pos = binary.push_f32(&data);
            slot.insert(
                array_index,
                FCurveEntry {
                    bin_data_pos,
                    last_frame_offset,
                    num_channels: channels,
                },
            );
        }
    }

    if has_decimal_frames {
        messages.err(format!(
            "The \"{}\" action has decimal frames. Converted to integer.",
            action.name
        ));
    }

    ActionEntry {
        name: action.name.clone(),
        uuid,
        frame_range,
        fcurves,
    }
}
