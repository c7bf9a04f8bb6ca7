//! Coordinate-system conversion between left- and right-handed conventions.
//!
//! The host scene is left-handed (+Z forward); the target document is
//! right-handed. Negating the Z axis per vertex would corrupt triangle
//! winding and normal orientation, so the bulk of the reorientation is
//! carried by a single synthetic root node with a 180° yaw correction
//! matrix (see [`CoordinateConverter::correction_matrix`]); per-value
//! conversion is applied only where data is baked into accessors and node
//! transforms.
//!
//! All conversions are involutions: applying any of them twice restores the
//! input (within floating-point tolerance), which is the property the
//! round-trip tests pin down.

use glam::{Mat4, Quat, Vec3, Vec4};

/// Pure transform math converting positions, normals, tangents, quaternions
/// and 4x4 matrices into the opposite handedness.
///
/// When disabled every method is the identity, which keeps call sites free
/// of conditionals (the original exporter's debug right-handed mode).
#[derive(Debug, Clone, Copy)]
pub struct CoordinateConverter {
    enabled: bool,
}

impl CoordinateConverter {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Converts a position by flipping the Z axis.
    #[inline]
    #[must_use]
    pub fn position(&self, v: Vec3) -> Vec3 {
        if self.enabled {
            Vec3::new(v.x, v.y, -v.z)
        } else {
            v
        }
    }

    /// Converts a direction vector (normals transform like positions under
    /// an axis flip).
    #[inline]
    #[must_use]
    pub fn normal(&self, v: Vec3) -> Vec3 {
        self.position(v)
    }

    /// Converts a tangent; w carries the bitangent sign, which flips with
    /// the handedness.
    #[inline]
    #[must_use]
    pub fn tangent(&self, v: Vec4) -> Vec4 {
        if self.enabled {
            Vec4::new(v.x, v.y, -v.z, -v.w)
        } else {
            v
        }
    }

    /// Converts a rotation. The flipped-axis component and the scalar are
    /// negated; this sign convention matches [`Self::matrix`] so a converted
    /// quaternion and a converted matrix describe the same rotation.
    #[inline]
    #[must_use]
    pub fn quat(&self, q: Quat) -> Quat {
        if self.enabled {
            Quat::from_xyzw(q.x, q.y, -q.z, -q.w)
        } else {
            q
        }
    }

    /// Converts a 4x4 matrix by conjugation with diag(1, 1, -1, 1): every
    /// element with exactly one index on the flipped axis is negated,
    /// translation Z included.
    #[must_use]
    pub fn matrix(&self, m: Mat4) -> Mat4 {
        if !self.enabled {
            return m;
        }
        let mut cols = m.to_cols_array_2d();
        for (c, col) in cols.iter_mut().enumerate() {
            for (r, v) in col.iter_mut().enumerate() {
                if (r == 2) != (c == 2) {
                    *v = -*v;
                }
            }
        }
        Mat4::from_cols_array_2d(&cols)
    }

    /// Converts a decomposed transform. Scale is invariant under the axis
    /// flip (the conjugation leaves diagonal matrices untouched).
    #[must_use]
    pub fn trs(&self, translation: Vec3, rotation: Quat, scale: Vec3) -> (Vec3, Quat, Vec3) {
        (self.position(translation), self.quat(rotation), scale)
    }

    /// The correction matrix carried by the synthetic root node: a 180° yaw
    /// expressed in the target handedness. Identity when conversion is
    /// disabled.
    #[must_use]
    pub fn correction_matrix(&self) -> Mat4 {
        if self.enabled {
            Mat4::from_quat(self.quat(Quat::from_rotation_y(std::f32::consts::PI)))
        } else {
            Mat4::IDENTITY
        }
    }

    /// Whether triangle winding must be reversed when emitting index data.
    #[inline]
    #[must_use]
    pub fn flips_winding(&self) -> bool {
        self.enabled
    }
}

impl Default for CoordinateConverter {
    fn default() -> Self {
        Self::new(true)
    }
}
