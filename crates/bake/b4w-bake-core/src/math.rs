//! Linear-algebra helpers on top of nalgebra: safe inversion and TRS
//! decomposition/composition in Blender's conventions.

use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub type Mat4 = Matrix4<f64>;

/// Quaternion in Blender component order `(w, x, y, z)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    #[inline]
    pub fn dot(&self, other: &Quat) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn negated(&self) -> Quat {
        Quat::new(-self.w, -self.x, -self.y, -self.z)
    }

    /// Components as stored in `rotation_quaternion[0..4]`.
    #[inline]
    pub fn to_array(&self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    pub fn from_unit(q: &UnitQuaternion<f64>) -> Self {
        let q = q.quaternion();
        Quat::new(q.w, q.i, q.j, q.k)
    }

    /// Normalizing conversion; a zero quaternion maps to identity.
    pub fn to_unit(&self) -> UnitQuaternion<f64> {
        let raw = Quaternion::new(self.w, self.x, self.y, self.z);
        if raw.norm() <= f64::EPSILON {
            UnitQuaternion::identity()
        } else {
            UnitQuaternion::from_quaternion(raw)
        }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Translation, rotation and scale of an affine matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trs {
    pub translation: [f64; 3],
    pub rotation: Quat,
    pub scale: [f64; 3],
}

impl Default for Trs {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: Quat::IDENTITY,
            scale: [1.0; 3],
        }
    }
}

fn all_finite(m: &Mat4) -> bool {
    m.iter().all(|v| v.is_finite())
}

/// Safe inverse.
///
/// Returns the exact inverse whenever one exists. An exactly singular matrix
/// (typically a zero-scale bone) is retried with `bias` added to the diagonal
/// of its 3x3 part, which yields a best-effort inverse. `None` means no finite
/// inverse could be produced; callers must treat that as an error rather than
/// substituting identity.
pub fn safe_inverse(m: &Mat4, bias: f64) -> Option<Mat4> {
    if let Some(inv) = m.try_inverse() {
        if all_finite(&inv) {
            return Some(inv);
        }
    }
    let mut biased = *m;
    for i in 0..3 {
        biased[(i, i)] += bias;
    }
    biased.try_inverse().filter(all_finite)
}

/// Split an affine matrix into translation, unit quaternion and per-axis
/// scale (column lengths).
pub fn decompose(m: &Mat4) -> Trs {
    let translation = [m[(0, 3)], m[(1, 3)], m[(2, 3)]];
    let basis: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();

    let mut scale = [0.0; 3];
    let mut normalized = basis;
    for i in 0..3 {
        let len = basis.column(i).norm();
        scale[i] = len;
        if len > f64::EPSILON {
            normalized.set_column(i, &(basis.column(i) / len));
        } else {
            normalized.set_column(i, &Vector3::ith(i, 1.0));
        }
    }
    // a mirrored basis still has to yield a proper rotation
    if normalized.determinant() < 0.0 {
        normalized = -normalized;
    }

    let rotation = Rotation3::from_matrix(&normalized);
    Trs {
        translation,
        rotation: Quat::from_unit(&UnitQuaternion::from_rotation_matrix(&rotation)),
        scale,
    }
}

/// `T * R * S`.
pub fn compose(trs: &Trs) -> Mat4 {
    let [tx, ty, tz] = trs.translation;
    let [sx, sy, sz] = trs.scale;
    Matrix4::new_translation(&Vector3::new(tx, ty, tz))
        * trs.rotation.to_unit().to_homogeneous()
        * Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz))
}

/// Build a matrix from 16 column-major values.
pub fn mat4_from_cols(values: &[f64; 16]) -> Mat4 {
    Mat4::from_column_slice(values)
}

/// Flatten a matrix column by column.
pub fn mat4_to_cols(m: &Mat4) -> [f64; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(m.as_slice());
    out
}
