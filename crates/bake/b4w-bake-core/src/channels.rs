//! Action data model: keyframe points, fcurves, per-bone channel groups and
//! the action library baked actions are stored in.

use serde::{Deserialize, Serialize};

/// Per-keyframe interpolation toward the next keyframe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Interpolation {
    #[default]
    Bezier,
    Linear,
    Constant,
}

impl Interpolation {
    /// Numeric code stored in the exported keyframe stream.
    pub fn code(self) -> u8 {
        match self {
            Interpolation::Bezier => 0,
            Interpolation::Linear => 1,
            Interpolation::Constant => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyframePoint {
    /// `(frame, value)`
    pub co: [f64; 2],
    pub handle_left: [f64; 2],
    pub handle_right: [f64; 2],
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl KeyframePoint {
    /// Bezier point with handles collapsed onto the control point.
    pub fn new(frame: f64, value: f64) -> Self {
        Self {
            co: [frame, value],
            handle_left: [frame, value],
            handle_right: [frame, value],
            interpolation: Interpolation::Bezier,
        }
    }

    #[inline]
    pub fn frame(&self) -> f64 {
        self.co[0]
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.co[1]
    }
}

/// Animated property of a bone or object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelTarget {
    Location,
    RotationQuaternion,
    RotationEuler,
    Scale,
}

impl ChannelTarget {
    pub fn property(self) -> &'static str {
        match self {
            ChannelTarget::Location => "location",
            ChannelTarget::RotationQuaternion => "rotation_quaternion",
            ChannelTarget::RotationEuler => "rotation_euler",
            ChannelTarget::Scale => "scale",
        }
    }

    /// Value of component `index` in the rest (identity) transform.
    /// Quaternion component 0 is `w`.
    pub fn identity(self, index: usize) -> f64 {
        match self {
            ChannelTarget::Location | ChannelTarget::RotationEuler => 0.0,
            ChannelTarget::RotationQuaternion if index == 0 => 1.0,
            ChannelTarget::RotationQuaternion => 0.0,
            ChannelTarget::Scale => 1.0,
        }
    }

    pub fn components(self) -> usize {
        match self {
            ChannelTarget::RotationQuaternion => 4,
            _ => 3,
        }
    }
}

/// One animated scalar: a property component and its keyframes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FCurve {
    pub target: ChannelTarget,
    pub array_index: usize,
    #[serde(default)]
    pub points: Vec<KeyframePoint>,
}

impl FCurve {
    pub fn new(target: ChannelTarget, array_index: usize) -> Self {
        Self {
            target,
            array_index,
            points: Vec::new(),
        }
    }

    /// Full RNA-style data path, e.g. `pose.bones["spine"].location`.
    pub fn data_path(&self, bone: Option<&str>) -> String {
        match bone {
            Some(bone) => format!("pose.bones[\"{bone}\"].{}", self.target.property()),
            None => self.target.property().to_string(),
        }
    }

    /// Insert or replace the keyframe at `frame`, keeping points ordered.
    pub fn insert(&mut self, frame: f64, value: f64) {
        match self
            .points
            .binary_search_by(|p| p.frame().total_cmp(&frame))
        {
            Ok(idx) => {
                let p = &mut self.points[idx];
                p.co[1] = value;
                p.handle_left[1] = value;
                p.handle_right[1] = value;
            }
            Err(idx) => self.points.insert(idx, KeyframePoint::new(frame, value)),
        }
    }

    /// Recompute auto-clamped Bezier handles: one third of the neighbouring
    /// frame distance, slope from the neighbours, flat at extremes and ends.
    pub fn recalculate_handles(&mut self) {
        let n = self.points.len();
        for i in 0..n {
            let [x, y] = self.points[i].co;
            let prev = (i > 0).then(|| self.points[i - 1].co);
            let next = (i + 1 < n).then(|| self.points[i + 1].co);

            let slope = match (prev, next) {
                (Some(p), Some(q)) => {
                    let extreme = (y >= p[1] && y >= q[1]) || (y <= p[1] && y <= q[1]);
                    if extreme || q[0] == p[0] {
                        0.0
                    } else {
                        (q[1] - p[1]) / (q[0] - p[0])
                    }
                }
                _ => 0.0,
            };

            let dx_left = prev.map(|p| x - p[0]).or(next.map(|q| q[0] - x)).unwrap_or(1.0) / 3.0;
            let dx_right = next.map(|q| q[0] - x).or(prev.map(|p| x - p[0])).unwrap_or(1.0) / 3.0;

            let point = &mut self.points[i];
            point.handle_left = [x - dx_left, y - slope * dx_left];
            point.handle_right = [x + dx_right, y + slope * dx_right];
        }
    }

    /// Evaluate at `frame` with constant extrapolation.
    pub fn evaluate(&self, frame: f64) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if frame <= first.frame() {
            return Some(first.value());
        }
        if frame >= last.frame() {
            return Some(last.value());
        }
        let idx = self.points.partition_point(|p| p.frame() <= frame);
        let a = &self.points[idx - 1];
        let b = &self.points[idx];
        let span = b.frame() - a.frame();
        if span <= 0.0 {
            return Some(b.value());
        }
        let value = match a.interpolation {
            Interpolation::Constant => a.value(),
            Interpolation::Linear => {
                let t = (frame - a.frame()) / span;
                a.value() + (b.value() - a.value()) * t
            }
            Interpolation::Bezier => bezier_segment(a, b, frame),
        };
        Some(value)
    }
}

fn cubic(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

/// Solve the 2D Bezier between `a` and `b` for x = `frame`. Handle x values
/// are clamped into the segment so x(t) stays monotonic.
fn bezier_segment(a: &KeyframePoint, b: &KeyframePoint, frame: f64) -> f64 {
    let (x0, x3) = (a.frame(), b.frame());
    let x1 = a.handle_right[0].clamp(x0, x3);
    let x2 = b.handle_left[0].clamp(x0, x3);

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    let mut t = 0.5;
    for _ in 0..48 {
        t = 0.5 * (lo + hi);
        let x = cubic(x0, x1, x2, x3, t);
        if (x - frame).abs() < 1e-9 {
            break;
        }
        if x < frame {
            lo = t;
        } else {
            hi = t;
        }
    }
    cubic(a.value(), a.handle_right[1], b.handle_left[1], b.value(), t)
}

/// Channels of one bone (or of the object itself when `name` is empty).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub name: String,
    #[serde(default)]
    pub channels: Vec<FCurve>,
}

impl ChannelGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: Vec::new(),
        }
    }

    /// The ten transform channels in bake order: location xyz, quaternion
    /// wxyz, scale xyz.
    pub fn transform(name: impl Into<String>) -> Self {
        let mut group = Self::new(name);
        for target in [
            ChannelTarget::Location,
            ChannelTarget::RotationQuaternion,
            ChannelTarget::Scale,
        ] {
            for idx in 0..target.components() {
                group.channels.push(FCurve::new(target, idx));
            }
        }
        group
    }

    pub fn channel(&self, target: ChannelTarget, array_index: usize) -> Option<&FCurve> {
        self.channels
            .iter()
            .find(|c| c.target == target && c.array_index == array_index)
    }

    pub fn channel_mut(&mut self, target: ChannelTarget, array_index: usize) -> Option<&mut FCurve> {
        self.channels
            .iter_mut()
            .find(|c| c.target == target && c.array_index == array_index)
    }

    /// Data path owner: bone name for pose channels, `None` for object channels.
    pub fn bone(&self) -> Option<&str> {
        (!self.name.is_empty()).then_some(self.name.as_str())
    }
}

/// Datablock kind an action animates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdRoot {
    #[default]
    Object,
    Material,
    World,
    Scene,
    Lamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub id_root: IdRoot,
    /// Inclusive `[start, end]`; may be fractional for authored actions.
    pub frame_range: [f64; 2],
    #[serde(default)]
    pub groups: Vec<ChannelGroup>,
}

impl Action {
    pub fn new(name: impl Into<String>, frame_range: [f64; 2]) -> Self {
        Self {
            name: name.into(),
            id_root: IdRoot::Object,
            frame_range,
            groups: Vec::new(),
        }
    }

    pub fn group(&self, name: &str) -> Option<&ChannelGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ChannelGroup> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    /// All fcurves with their owning group.
    pub fn fcurves(&self) -> impl Iterator<Item = (&ChannelGroup, &FCurve)> {
        self.groups
            .iter()
            .flat_map(|g| g.channels.iter().map(move |c| (g, c)))
    }

    pub fn fcurve_count(&self) -> usize {
        self.groups.iter().map(|g| g.channels.len()).sum()
    }

    /// Evaluate one property component; `None` if the action has no such curve.
    pub fn evaluate(
        &self,
        group: &str,
        target: ChannelTarget,
        array_index: usize,
        frame: f64,
    ) -> Option<f64> {
        self.group(group)?
            .channel(target, array_index)?
            .evaluate(frame)
    }
}

/// Named action storage. Replacing an action keeps its slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLibrary {
    actions: Vec<Action>,
}

impl ActionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Store `action`. An existing action of the same name has its groups
    /// cleared and refilled in place instead of being duplicated.
    pub fn store(&mut self, action: Action) {
        match self.actions.iter_mut().find(|a| a.name == action.name) {
            Some(existing) => {
                existing.groups.clear();
                existing.groups.extend(action.groups);
                existing.frame_range = action.frame_range;
                existing.id_root = action.id_root;
            }
            None => self.actions.push(action),
        }
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }
}
