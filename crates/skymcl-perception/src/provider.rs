//! The frame-transform lookup interface consumed by the motion model.
//!
//! The motion model never talks to a transform store directly; it holds an
//! `Arc<dyn FrameTransformProvider>`.  [`TfBuffer`][crate::tf_buffer::TfBuffer]
//! is the in-process implementation; tests substitute scripted stubs.

use chrono::{DateTime, Utc};
use skymcl_types::{LookupError, TimestampedPose};

use crate::transform::RelativeTransform;

/// Resolves where the robot is, and how its rigidly mounted frames relate.
///
/// Implementations may block for a bounded time (typically 100 ms) waiting
/// for data; they must not retry on the caller's behalf.
pub trait FrameTransformProvider: Send + Sync {
    /// Pose of the robot body frame in the world frame at `at`.
    ///
    /// # Errors
    ///
    /// [`LookupError::FrameNotFound`] when the body frame is unknown,
    /// [`LookupError::Timeout`] when data for `at` did not arrive in time,
    /// [`LookupError::Extrapolation`] when `at` is outside the history window.
    fn lookup_world_pose(&self, at: DateTime<Utc>) -> Result<TimestampedPose, LookupError>;

    /// Fixed offset mapping points in `source_frame` into `target_frame`
    /// (the pose of `source_frame` expressed in `target_frame`).
    ///
    /// # Errors
    ///
    /// [`LookupError::FrameNotFound`] when either frame cannot be reached.
    fn lookup_static_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        at: DateTime<Utc>,
    ) -> Result<RelativeTransform, LookupError>;
}
