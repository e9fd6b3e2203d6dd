//! [`OdometryTracker`] – the last accepted odometry pose.
//!
//! The odometry-ingestion path is the single writer; prediction cycles read
//! the stored pose concurrently.  The `(stamp, pose)` pair lives behind one
//! `RwLock`, so a reader never observes a timestamp from one sample and a pose
//! from another.

use std::sync::{PoisonError, RwLock};

use skymcl_types::TimestampedPose;
use tracing::{debug, warn};

/// Whether the tracker currently holds a pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OdometryState {
    #[default]
    NoOdometryReceived,
    OdometryReceived,
}

/// Outcome of [`OdometryTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdometryUpdate {
    Accepted,
    /// The sample was older than the stored one and was dropped.
    RejectedStale,
}

/// Holds the most recent odometry pose and rejects out-of-order samples.
#[derive(Debug, Default)]
pub struct OdometryTracker {
    last: RwLock<Option<TimestampedPose>>,
}

impl OdometryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `pose` unless it is strictly older than the stored sample.
    ///
    /// Equal timestamps are accepted and overwrite the stored pose.
    pub fn update(&self, pose: TimestampedPose) -> OdometryUpdate {
        let mut guard = self.last.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(stored) = guard.as_ref()
            && pose.stamp < stored.stamp
        {
            warn!(
                incoming = %pose.stamp,
                stored = %stored.stamp,
                "odometry pose is older than the stored one, ignoring"
            );
            return OdometryUpdate::RejectedStale;
        }
        debug!(stamp = %pose.stamp, "odometry pose accepted");
        *guard = Some(pose);
        OdometryUpdate::Accepted
    }

    /// Discard the stored pose (e.g. when localization restarts).
    pub fn reset(&self) {
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Snapshot of the stored pose, or `None` before the first update.
    pub fn last_pose(&self) -> Option<TimestampedPose> {
        *self.last.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> OdometryState {
        match self.last_pose() {
            Some(_) => OdometryState::OdometryReceived,
            None => OdometryState::NoOdometryReceived,
        }
    }
}
