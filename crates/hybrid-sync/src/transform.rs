//! Scene-side pose of an authored object.
//!
//! A [`Transform`] stores a parent pose and a local position, rotation and
//! scale relative to it. World-space position and rotation are derived on
//! demand, and the world-space setters rewrite the local values so the two
//! views never disagree.

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rotation whose +Z axis points along `forward` and whose +Y axis is as close
/// to `up` as possible.
///
/// Falls back to the shortest arc from +Z to `forward` when `up` is parallel
/// to it, and to identity when `forward` is zero.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let Some(f) = forward.try_normalize() else {
        return Quat::IDENTITY;
    };
    let Some(r) = up.cross(f).try_normalize() else {
        return Quat::from_rotation_arc(Vec3::Z, f);
    };
    let u = f.cross(r);
    Quat::from_mat3(&Mat3::from_cols(r, u, f)).normalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    parent_position: Vec3,
    parent_rotation: Quat,
    parent_scale: Vec3,
    local_position: Vec3,
    local_rotation: Quat,
    local_scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        parent_position: Vec3::ZERO,
        parent_rotation: Quat::IDENTITY,
        parent_scale: Vec3::ONE,
        local_position: Vec3::ZERO,
        local_rotation: Quat::IDENTITY,
        local_scale: Vec3::ONE,
    };

    /// Root transform at `position`.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            local_position: position,
            ..Self::IDENTITY
        }
    }

    /// Root transform at `position` with `rotation`.
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            local_position: position,
            local_rotation: rotation,
            ..Self::IDENTITY
        }
    }

    // -- parent -------------------------------------------------------------

    /// Reparent under a pose, keeping the local values.
    pub fn set_parent_pose(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.parent_position = position;
        self.parent_rotation = rotation;
        self.parent_scale = scale;
    }

    pub fn parent_position(&self) -> Vec3 {
        self.parent_position
    }

    pub fn parent_rotation(&self) -> Quat {
        self.parent_rotation
    }

    pub fn parent_scale(&self) -> Vec3 {
        self.parent_scale
    }

    // -- local --------------------------------------------------------------

    pub fn local_position(&self) -> Vec3 {
        self.local_position
    }

    pub fn local_rotation(&self) -> Quat {
        self.local_rotation
    }

    pub fn local_scale(&self) -> Vec3 {
        self.local_scale
    }

    pub fn set_local_position(&mut self, position: Vec3) {
        self.local_position = position;
    }

    pub fn set_local_rotation(&mut self, rotation: Quat) {
        self.local_rotation = rotation;
    }

    pub fn set_local_scale(&mut self, scale: Vec3) {
        self.local_scale = scale;
    }

    // -- world --------------------------------------------------------------

    /// World-space position.
    pub fn position(&self) -> Vec3 {
        self.parent_position + self.parent_rotation * (self.parent_scale * self.local_position)
    }

    /// World-space rotation.
    pub fn rotation(&self) -> Quat {
        self.parent_rotation * self.local_rotation
    }

    /// Move to a world-space position. A zero parent scale axis leaves that
    /// local component at zero.
    pub fn set_position(&mut self, position: Vec3) {
        let unrotated = self.parent_rotation.inverse() * (position - self.parent_position);
        let scale = self.parent_scale;
        let safe_div = |v: f32, s: f32| if s == 0.0 { 0.0 } else { v / s };
        self.local_position = Vec3::new(
            safe_div(unrotated.x, scale.x),
            safe_div(unrotated.y, scale.y),
            safe_div(unrotated.z, scale.z),
        );
    }

    /// Turn to a world-space rotation.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.local_rotation = (self.parent_rotation.inverse() * rotation).normalize();
    }

    /// World-space +Y axis.
    pub fn up(&self) -> Vec3 {
        self.rotation() * Vec3::Y
    }

    /// World-space +Z axis.
    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::Z
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-5;

    #[test]
    fn root_transform_world_equals_local() {
        let t =
            Transform::from_position_rotation(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.3));
        assert_eq!(t.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(t.rotation().abs_diff_eq(Quat::from_rotation_y(0.3), EPS));
    }

    #[test]
    fn parent_pose_applies_to_world_position() {
        let mut t = Transform::from_position(Vec3::X);
        t.set_parent_pose(
            Vec3::new(10.0, 0.0, 0.0),
            Quat::from_rotation_z(FRAC_PI_2),
            Vec3::splat(2.0),
        );
        assert!(t.position().abs_diff_eq(Vec3::new(10.0, 2.0, 0.0), EPS));
    }

    #[test]
    fn world_setters_keep_local_consistent() {
        let mut t = Transform::IDENTITY;
        t.set_parent_pose(
            Vec3::new(0.0, 5.0, 0.0),
            Quat::from_rotation_y(1.0),
            Vec3::new(2.0, 1.0, 4.0),
        );

        t.set_position(Vec3::new(3.0, -1.0, 7.0));
        assert!(t.position().abs_diff_eq(Vec3::new(3.0, -1.0, 7.0), 1e-4));

        let target = Quat::from_rotation_x(0.5);
        t.set_rotation(target);
        assert!(t.rotation().abs_diff_eq(target, EPS));
    }

    #[test]
    fn look_rotation_with_world_up_is_identity() {
        assert!(look_rotation(Vec3::Z, Vec3::Y).abs_diff_eq(Quat::IDENTITY, EPS));
    }

    #[test]
    fn look_rotation_aligns_axes() {
        let up = Vec3::new(1.0, 1.0, 0.0).normalize();
        let q = look_rotation(Vec3::Z, up);
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::Z, EPS));
        assert!((q * Vec3::Y).abs_diff_eq(up, EPS));
    }

    #[test]
    fn look_rotation_degenerate_inputs() {
        assert_eq!(look_rotation(Vec3::ZERO, Vec3::Y), Quat::IDENTITY);
        let q = look_rotation(Vec3::Y, Vec3::Y);
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::Y, EPS));
    }
}
