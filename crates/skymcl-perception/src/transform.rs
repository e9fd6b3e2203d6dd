//! Rigid-body transform algebra and the static frame graph.
//!
//! Rotations are composed as unit quaternions and only converted to
//! roll/pitch/yaw at the [`PoseState`] boundary.  [`TfEngine`] keeps the fixed
//! mechanical offsets between named frames (e.g. `base_link → camera`) and
//! composes a chain of them via BFS.
//!
//! # Example
//!
//! ```rust
//! use skymcl_perception::transform::{TfEngine, Transform3D, Vec3, Quaternion};
//!
//! let mut tf = TfEngine::new();
//!
//! // base_link is 0.1 m above base_footprint.
//! tf.set_transform("base_footprint", "base_link",
//!     Transform3D::new(Vec3::new(0.0, 0.0, 0.1), Quaternion::identity()));
//!
//! // camera is 0.2 m forward of base_link.
//! tf.set_transform("base_link", "camera",
//!     Transform3D::new(Vec3::new(0.2, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("base_footprint", "camera").unwrap();
//! assert!((t.translation.x - 0.2).abs() < 1e-9);
//! assert!((t.translation.z - 0.1).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use skymcl_types::{LookupError, PoseState};

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    /// Linear interpolation: `t = 0` yields `self`, `t = 1` yields `other`.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let delta = Self::new(other.x - self.x, other.y - self.y, other.z - self.z);
        self.add(delta.scale(t))
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1) or calling [`Quaternion::normalize`].
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Build a rotation from fixed-axis roll, pitch, yaw (radians), i.e.
    /// `Rz(yaw) · Ry(pitch) · Rx(roll)`.
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    /// Decompose into `(roll, pitch, yaw)`.
    ///
    /// Pitch is clamped to ±π/2 at gimbal lock, where roll and yaw are no
    /// longer uniquely defined.
    pub fn to_rpy(self) -> (f64, f64, f64) {
        let Self { w, x, y, z } = self;

        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));

        let sin_pitch = 2.0 * (w * y - z * x);
        let pitch = if sin_pitch.abs() >= 1.0 {
            std::f64::consts::FRAC_PI_2.copysign(sin_pitch)
        } else {
            sin_pitch.asin()
        };

        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        (roll, pitch, yaw)
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Scale to unit length.  A degenerate (zero or non-finite norm)
    /// quaternion collapses to the identity.
    pub fn normalize(self) -> Self {
        let n = self.norm();
        if !n.is_finite() || n < f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Spherical linear interpolation along the shorter arc.
    pub fn slerp(self, other: Self, t: f64) -> Self {
        let mut other = other;
        let mut cos_theta = self.dot(other);
        if cos_theta < 0.0 {
            other = Self::new(-other.w, -other.x, -other.y, -other.z);
            cos_theta = -cos_theta;
        }

        // Nearly parallel: fall back to normalized lerp.
        if cos_theta > 1.0 - 1e-9 {
            return Self::new(
                self.w + (other.w - self.w) * t,
                self.x + (other.x - self.x) * t,
                self.y + (other.y - self.y) * t,
                self.z + (other.z - self.z) * t,
            )
            .normalize();
        }

        let theta = cos_theta.acos();
        let sin_theta = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin_theta;
        let b = (t * theta).sin() / sin_theta;
        Self::new(
            a * self.w + b * other.w,
            a * self.x + b * other.x,
            a * self.y + b * other.y,
            a * self.z + b * other.z,
        )
        .normalize()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: translation followed by rotation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

/// Motion between two timestamped poses, `inverse(older) ∘ newer`.
pub type RelativeTransform = Transform3D;

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation).normalize();
        Self::new(translated, rotated)
    }

    /// If `self` = T_A_B, returns T_B_A.
    pub fn inverse(self) -> Self {
        let rotation = self.rotation.conjugate();
        let translation = rotation.rotate(self.translation).scale(-1.0);
        Self::new(translation, rotation)
    }

    /// `self⁻¹ ∘ other`: the motion that takes `self` to `other`, expressed
    /// in `self`'s frame.
    pub fn inverse_times(self, other: Self) -> Self {
        self.inverse().compose(other)
    }

    /// Interpolate between two transforms (lerp translation, slerp rotation).
    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self::new(
            self.translation.lerp(other.translation, t),
            self.rotation.slerp(other.rotation, t),
        )
    }

    pub fn from_pose(pose: &PoseState) -> Self {
        let translation = Vec3::new(pose.x(), pose.y(), pose.z());
        let rotation = Quaternion::from_rpy(pose.roll(), pose.pitch(), pose.yaw());
        Self::new(translation, rotation.normalize())
    }

    /// Convert back to a roll/pitch/yaw pose.  The rotation is renormalized
    /// first.
    pub fn to_pose(self) -> PoseState {
        let (roll, pitch, yaw) = self.rotation.normalize().to_rpy();
        PoseState::new(
            self.translation.x,
            self.translation.y,
            self.translation.z,
            roll,
            pitch,
            yaw,
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

/// A graph of named reference frames linked by fixed [`Transform3D`]s.
///
/// Registering `"A" → "B"` also makes `"B" → "A"` reachable through the
/// inverse transform, unless an explicit `"B" → "A"` edge is registered.
///
/// [`TfEngine::lookup`] performs BFS to find the shortest path from source
/// to target and returns the composed transform.
#[derive(Debug, Default, Clone)]
pub struct TfEngine {
    /// `edges[from][to] = (Transform3D, explicit)`
    edges: HashMap<String, HashMap<String, (Transform3D, bool)>>,
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the transform from `parent_frame` to `child_frame`.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
    ) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), (transform, true));

        let reverse = self.edges.entry(child_frame.to_string()).or_default();
        match reverse.get(parent_frame) {
            Some((_, true)) => {}
            _ => {
                reverse.insert(parent_frame.to_string(), (transform.inverse(), false));
            }
        }
    }

    /// Whether `frame` appears in any registered edge.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame)
    }

    /// Compute the pose of `target_frame` expressed in `source_frame`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::FrameNotFound`] naming the frame that could not
    /// be reached.
    pub fn lookup(
        &self,
        source_frame: &str,
        target_frame: &str,
    ) -> Result<Transform3D, LookupError> {
        if source_frame == target_frame {
            return Ok(Transform3D::identity());
        }
        if !self.has_frame(source_frame) {
            return Err(LookupError::FrameNotFound {
                frame: source_frame.to_string(),
            });
        }

        // Each queue item carries the transform accumulated from source_frame
        // to the current node.
        let mut queue: VecDeque<(&str, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();

        queue.push_back((source_frame, Transform3D::identity()));
        visited.insert(source_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            let Some(neighbours) = self.edges.get(current) else {
                continue;
            };
            for (next, (edge_tf, _)) in neighbours {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                let composed = accumulated.compose(*edge_tf);
                if next == target_frame {
                    return Ok(composed);
                }
                queue.push_back((next.as_str(), composed));
            }
        }

        Err(LookupError::FrameNotFound {
            frame: target_frame.to_string(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert_close(r.x, 0.0, 1e-12);
        assert_close(r.y, 1.0, 1e-12);
        assert_close(r.z, 0.0, 1e-12);
    }

    #[test]
    fn from_rpy_matches_axis_quaternion() {
        let q = Quaternion::from_rpy(0.0, 0.0, FRAC_PI_2);
        assert_close(q.w, FRAC_1_SQRT_2, 1e-12);
        assert_close(q.z, FRAC_1_SQRT_2, 1e-12);
        assert_close(q.x, 0.0, 1e-12);
        assert_close(q.y, 0.0, 1e-12);
    }

    #[test]
    fn rpy_round_trip() {
        let q = Quaternion::from_rpy(0.3, 0.2, -0.5);
        let (roll, pitch, yaw) = q.normalize().to_rpy();
        assert_close(roll, 0.3, 1e-6);
        assert_close(pitch, 0.2, 1e-6);
        assert_close(yaw, -0.5, 1e-6);
    }

    #[test]
    fn gimbal_lock_pitch_is_clamped() {
        let (_, pitch, _) = Quaternion::from_rpy(0.0, FRAC_PI_2, 0.0).to_rpy();
        assert_close(pitch, FRAC_PI_2, 1e-6);
    }

    #[test]
    fn rpy_composition_differs_from_adding_angles() {
        // Rolling then yawing is not the same as summing Euler angles.
        let a = Quaternion::from_rpy(FRAC_PI_2, 0.0, 0.0);
        let b = Quaternion::from_rpy(0.0, 0.0, FRAC_PI_2);
        let (roll, pitch, yaw) = a.mul(b).to_rpy();
        let summed = (FRAC_PI_2, 0.0, FRAC_PI_2);
        let diff = (roll - summed.0).abs() + (pitch - summed.1).abs() + (yaw - summed.2).abs();
        assert!(diff > 0.1);
    }

    #[test]
    fn normalize_restores_unit_length() {
        let q = Quaternion::new(2.0, 0.0, 0.0, 2.0).normalize();
        assert_close(q.norm(), 1.0, 1e-12);
        let degenerate = Quaternion::new(0.0, 0.0, 0.0, 0.0).normalize();
        assert_eq!(degenerate, Quaternion::identity());
    }

    #[test]
    fn slerp_halfway_yaw() {
        let a = Quaternion::identity();
        let b = Quaternion::from_rpy(0.0, 0.0, 1.0);
        let (_, _, yaw) = a.slerp(b, 0.5).to_rpy();
        assert_close(yaw, 0.5, 1e-9);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_inverse_composes_to_identity() {
        let rotation = Quaternion::from_rpy(0.1, 0.2, 0.3);
        let t = Transform3D::new(Vec3::new(1.0, -2.0, 0.5), rotation);
        let id = t.compose(t.inverse());
        assert_close(id.translation.x, 0.0, 1e-12);
        assert_close(id.translation.y, 0.0, 1e-12);
        assert_close(id.translation.z, 0.0, 1e-12);
        assert_close(id.rotation.w.abs(), 1.0, 1e-12);
    }

    #[test]
    fn inverse_times_recovers_relative_motion() {
        let facing_y = Quaternion::from_rpy(0.0, 0.0, FRAC_PI_2);
        let older = Transform3D::new(Vec3::new(1.0, 1.0, 0.0), facing_y);
        let newer = Transform3D::new(Vec3::new(1.0, 2.0, 0.0), facing_y);
        // Moving +1 in world Y while facing +Y is +1 forward in the body frame.
        let rel = older.inverse_times(newer);
        assert_close(rel.translation.x, 1.0, 1e-12);
        assert_close(rel.translation.y, 0.0, 1e-12);
    }

    #[test]
    fn pose_conversion_round_trip() {
        let pose = PoseState::new(1.0, 2.0, 3.0, 0.3, 0.2, -0.5);
        let back = Transform3D::from_pose(&pose).to_pose();
        assert_close(back.x(), 1.0, 1e-12);
        assert_close(back.roll(), 0.3, 1e-6);
        assert_close(back.pitch(), 0.2, 1e-6);
        assert_close(back.yaw(), -0.5, 1e-6);
    }

    // ── TfEngine ────────────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfEngine::new();
        let same = tf.lookup("world", "world").unwrap();
        assert_eq!(same, Transform3D::identity());
    }

    #[test]
    fn lookup_composed_chain() {
        let mut tf = TfEngine::new();
        tf.set_transform(
            "base_footprint",
            "base_link",
            Transform3D::new(Vec3::new(0.0, 0.0, 0.1), Quaternion::identity()),
        );
        tf.set_transform(
            "base_link",
            "camera",
            Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()),
        );
        let t = tf.lookup("base_footprint", "camera").unwrap();
        assert_close(t.translation.x, 0.5, 1e-12);
        assert_close(t.translation.z, 0.1, 1e-12);
    }

    #[test]
    fn lookup_traverses_edges_in_reverse() {
        let q90z = Quaternion::from_rpy(0.0, 0.0, FRAC_PI_2);
        let mut tf = TfEngine::new();
        tf.set_transform("base_link", "camera", Transform3D::new(Vec3::new(1.0, 0.0, 0.0), q90z));

        let t = tf.lookup("camera", "base_link").unwrap();
        // base_link's origin seen from the rotated camera: 1 m behind along camera -Y.
        assert_close(t.translation.x, 0.0, 1e-12);
        assert_close(t.translation.y, 1.0, 1e-12);
        let (_, _, yaw) = t.rotation.to_rpy();
        assert_close(yaw, -FRAC_PI_2, 1e-12);
    }

    #[test]
    fn explicit_reverse_edge_is_not_overwritten() {
        let mut tf = TfEngine::new();
        let shift = |x| Transform3D::new(Vec3::new(x, 0.0, 0.0), Quaternion::identity());
        tf.set_transform("b", "a", shift(7.0));
        tf.set_transform("a", "b", shift(1.0));
        let b_to_a = tf.lookup("b", "a").unwrap();
        assert_close(b_to_a.translation.x, 7.0, 1e-12);
    }

    #[test]
    fn lookup_unknown_frame_is_frame_not_found() {
        let mut tf = TfEngine::new();
        tf.set_transform("base_link", "camera", Transform3D::identity());
        assert_eq!(
            tf.lookup("base_link", "ghost").unwrap_err(),
            LookupError::FrameNotFound { frame: "ghost".into() }
        );
        assert_eq!(
            tf.lookup("ghost", "base_link").unwrap_err(),
            LookupError::FrameNotFound { frame: "ghost".into() }
        );
    }
}
