//! `skymcl-perception` – motion prediction for drone Monte-Carlo localization.
//!
//! Advances every particle's 6-DOF pose hypothesis by the measured odometry
//! and injects calibrated process noise.
//!
//! # Modules
//!
//! - [`transform`] – [`Transform3D`][transform::Transform3D] quaternion algebra,
//!   roll/pitch/yaw conversion and the static frame graph
//!   [`TfEngine`][transform::TfEngine].
//! - [`provider`] – [`FrameTransformProvider`][provider::FrameTransformProvider]:
//!   the lookup interface the motion model consumes.
//! - [`tf_buffer`] – [`TfBuffer`][tf_buffer::TfBuffer]: time-indexed pose history
//!   implementing the provider with bounded waits and interpolation.
//! - [`odometry`] – [`OdometryTracker`][odometry::OdometryTracker]: the last
//!   accepted odometry pose, rejecting out-of-order samples.
//! - [`noise`] – [`GaussianNoiseSource`][noise::GaussianNoiseSource]: seedable
//!   zero-mean Gaussian draws.
//! - [`motion_model`] – [`MotionModel`][motion_model::MotionModel]: `drift` and
//!   `diffuse`, plus whole-set [`predict`][motion_model::MotionModel::predict].

pub mod motion_model;
pub mod noise;
pub mod odometry;
pub mod provider;
pub mod tf_buffer;
pub mod transform;

pub use motion_model::{MotionModel, MotionNoise, MovementModel};
pub use noise::GaussianNoiseSource;
pub use odometry::{OdometryState, OdometryTracker, OdometryUpdate};
pub use provider::FrameTransformProvider;
pub use tf_buffer::{FrameIds, TfBuffer};
pub use transform::{Quaternion, RelativeTransform, TfEngine, Transform3D, Vec3};
