//! Particle motion model for 6-DOF drone localization.
//!
//! Each filter cycle the particle container calls [`MovementModel::drift`]
//! then [`MovementModel::diffuse`] on every particle:
//!
//! - **drift** moves the particle by the odometry measured since the last
//!   accepted odometry pose.  The motion is applied in the particle's own body
//!   frame: `new = particle ∘ (last_odom⁻¹ ∘ current_odom)`.
//! - **diffuse** adds zero-mean Gaussian noise to every axis, scaled by `dt`.
//!
//! A failed transform lookup degrades the cycle to diffusion-only motion: the
//! relative transform is replaced by the identity and a warning is logged.
//!
//! For whole particle sets use [`MotionModel::predict`], which resolves the
//! relative transform once and applies it to all particles in parallel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use rayon::prelude::*;
use skymcl_types::{MclError, PoseState, TimestampedPose};
use tracing::{debug, info, warn};

use crate::noise::GaussianNoiseSource;
use crate::odometry::{OdometryState, OdometryTracker, OdometryUpdate};
use crate::provider::FrameTransformProvider;
use crate::tf_buffer::FrameIds;
use crate::transform::{RelativeTransform, Transform3D};

// ────────────────────────────────────────────────────────────────────────────
// Movement model contract
// ────────────────────────────────────────────────────────────────────────────

/// The two prediction operations a particle filter invokes per particle per
/// cycle.
pub trait MovementModel<S> {
    /// Deterministic motion propagation over `dt` seconds.
    fn drift(&self, state: &mut S, dt: f64);

    /// Stochastic process noise over `dt` seconds.
    fn diffuse(&self, state: &mut S, dt: f64);
}

// ────────────────────────────────────────────────────────────────────────────
// Noise configuration
// ────────────────────────────────────────────────────────────────────────────

/// Per-axis diffusion standard deviations (metres / radians per second).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionNoise {
    pub x_std_dev: f64,
    pub y_std_dev: f64,
    pub z_std_dev: f64,
    pub roll_std_dev: f64,
    pub pitch_std_dev: f64,
    pub yaw_std_dev: f64,
}

impl Default for MotionNoise {
    fn default() -> Self {
        Self::uniform(0.2)
    }
}

impl MotionNoise {
    /// Same standard deviation on every axis.
    pub fn uniform(std_dev: f64) -> Self {
        Self {
            x_std_dev: std_dev,
            y_std_dev: std_dev,
            z_std_dev: std_dev,
            roll_std_dev: std_dev,
            pitch_std_dev: std_dev,
            yaw_std_dev: std_dev,
        }
    }

    pub fn zero() -> Self {
        Self::uniform(0.0)
    }

    fn axes(&self) -> [(&'static str, f64); 6] {
        [
            ("x_std_dev", self.x_std_dev),
            ("y_std_dev", self.y_std_dev),
            ("z_std_dev", self.z_std_dev),
            ("roll_std_dev", self.roll_std_dev),
            ("pitch_std_dev", self.pitch_std_dev),
            ("yaw_std_dev", self.yaw_std_dev),
        ]
    }

    /// # Errors
    ///
    /// Returns [`MclError::InvalidNoise`] for the first negative or non-finite
    /// standard deviation.
    pub fn validate(&self) -> Result<(), MclError> {
        let invalid = self
            .axes()
            .into_iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0);
        match invalid {
            Some((axis, value)) => Err(MclError::InvalidNoise {
                axis: axis.to_string(),
                value,
            }),
            None => Ok(()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MotionModel
// ────────────────────────────────────────────────────────────────────────────

/// Odometry-driven drift plus Gaussian diffusion for [`PoseState`] particles.
pub struct MotionModel {
    provider: Arc<dyn FrameTransformProvider>,
    frames: FrameIds,
    tracker: OdometryTracker,
    noise: MotionNoise,
    rng: Mutex<GaussianNoiseSource>,
    lookup_failures: AtomicU64,
}

impl std::fmt::Debug for MotionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionModel")
            .field("frames", &self.frames)
            .field("odometry", &self.tracker.state())
            .field("noise", &self.noise)
            .field("lookup_failures", &self.lookup_failures())
            .finish()
    }
}

impl MotionModel {
    /// # Errors
    ///
    /// Returns [`MclError::InvalidNoise`] if `noise` fails validation.
    pub fn new(
        provider: Arc<dyn FrameTransformProvider>,
        frames: FrameIds,
        noise: MotionNoise,
        rng: GaussianNoiseSource,
    ) -> Result<Self, MclError> {
        noise.validate()?;
        info!(
            world = %frames.world,
            base = %frames.base_footprint,
            "drone motion model initialized"
        );
        Ok(Self {
            provider,
            frames,
            tracker: OdometryTracker::new(),
            noise,
            rng: Mutex::new(rng),
            lookup_failures: AtomicU64::new(0),
        })
    }

    pub fn noise(&self) -> MotionNoise {
        self.noise
    }

    /// # Errors
    ///
    /// Returns [`MclError::InvalidNoise`] and keeps the previous values if
    /// `noise` fails validation.
    pub fn set_noise(&mut self, noise: MotionNoise) -> Result<(), MclError> {
        noise.validate()?;
        self.noise = noise;
        Ok(())
    }

    pub fn frames(&self) -> &FrameIds {
        &self.frames
    }

    // ── Odometry ingestion ──────────────────────────────────────────────────

    /// Store the odometry pose that the next cycle's motion is measured from.
    pub fn set_last_odom_pose(&self, pose: TimestampedPose) -> OdometryUpdate {
        self.tracker.update(pose)
    }

    pub fn last_odom_pose(&self) -> Option<TimestampedPose> {
        self.tracker.last_pose()
    }

    pub fn odometry_state(&self) -> OdometryState {
        self.tracker.state()
    }

    /// Forget the stored odometry pose; subsequent drifts are the identity
    /// until a new pose is stored.
    pub fn reset(&self) {
        self.tracker.reset();
    }

    /// Number of cycles whose lookup failed and fell back to the identity.
    pub fn lookup_failures(&self) -> u64 {
        self.lookup_failures.load(Ordering::Relaxed)
    }

    // ── Lookups ─────────────────────────────────────────────────────────────

    /// World pose of the body at `at`, or `None` (with a warning) on failure.
    pub fn lookup_odom_pose(&self, at: DateTime<Utc>) -> Option<TimestampedPose> {
        match self.provider.lookup_world_pose(at) {
            Ok(pose) => Some(pose),
            Err(e) => {
                warn!(error = %e, requested = %at, "failed to compute odom pose");
                None
            }
        }
    }

    /// Fixed offset mapping `base_link` points into `target_frame`, or `None`
    /// (with a warning) on failure.
    pub fn lookup_target_to_base(
        &self,
        target_frame: &str,
        at: DateTime<Utc>,
    ) -> Option<RelativeTransform> {
        match self
            .provider
            .lookup_static_transform(target_frame, &self.frames.base_link, at)
        {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(error = %e, target_frame, "failed to lookup local transform");
                None
            }
        }
    }

    /// Body-frame motion over the next `dt` seconds, measured from the stored
    /// odometry pose.
    ///
    /// Identity when no odometry has been stored or when the lookup fails.
    pub fn relative_motion(&self, dt: f64) -> RelativeTransform {
        let last = self.tracker.last_pose();
        let base = last.map_or_else(Utc::now, |p| p.stamp);
        let target = base + seconds_to_delta(dt);

        if let Some(last) = &last
            && target <= last.stamp
        {
            warn!(
                behind_ms = (last.stamp - target).num_milliseconds(),
                "looking up odom transform at or before the last odom pose"
            );
        }

        let Some(current) = self.lookup_odom_pose(target) else {
            self.lookup_failures.fetch_add(1, Ordering::Relaxed);
            warn!("transform not found, drifting by identity this cycle");
            return Transform3D::identity();
        };

        match last {
            Some(last) => Transform3D::from_pose(&last.pose)
                .inverse_times(Transform3D::from_pose(&current.pose)),
            None => Transform3D::identity(),
        }
    }

    /// Right-compose `relative` onto `state` (body-frame motion).
    pub fn apply_relative(&self, state: &mut PoseState, relative: &RelativeTransform) {
        *state = Transform3D::from_pose(state).compose(*relative).to_pose();
    }

    /// Drift and diffuse a whole particle set for one cycle.
    ///
    /// The transform lookup happens once; drift runs in parallel, diffusion
    /// draws sequentially from the single noise source so seeded runs stay
    /// reproducible.
    pub fn predict(&self, particles: &mut [PoseState], dt: f64) {
        let relative = self.relative_motion(dt);
        particles
            .par_iter_mut()
            .for_each(|p| self.apply_relative(p, &relative));

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        for p in particles.iter_mut() {
            diffuse_with(&mut rng, &self.noise, p, dt);
        }
        debug!(
            particles = particles.len(),
            dt,
            dx = relative.translation.x,
            dy = relative.translation.y,
            dz = relative.translation.z,
            "prediction cycle complete"
        );
    }
}

impl MovementModel<PoseState> for MotionModel {
    fn drift(&self, state: &mut PoseState, dt: f64) {
        let relative = self.relative_motion(dt);
        self.apply_relative(state, &relative);
    }

    fn diffuse(&self, state: &mut PoseState, dt: f64) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        diffuse_with(&mut rng, &self.noise, state, dt);
    }
}

fn diffuse_with(
    rng: &mut GaussianNoiseSource,
    noise: &MotionNoise,
    state: &mut PoseState,
    dt: f64,
) {
    state.set_x(state.x() + rng.sample(noise.x_std_dev) * dt);
    state.set_y(state.y() + rng.sample(noise.y_std_dev) * dt);
    state.set_z(state.z() + rng.sample(noise.z_std_dev) * dt);
    state.set_roll(state.roll() + rng.sample(noise.roll_std_dev) * dt);
    state.set_pitch(state.pitch() + rng.sample(noise.pitch_std_dev) * dt);
    state.set_yaw(state.yaw() + rng.sample(noise.yaw_std_dev) * dt);
}

fn seconds_to_delta(dt: f64) -> TimeDelta {
    TimeDelta::nanoseconds((dt * 1e9).round() as i64)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
