//! `skymcl-types` – shared data model for the SkyMCL motion model.
//!
//! Every particle of the localization filter carries a [`PoseState`]; odometry
//! arrives as [`TimestampedPose`] samples.  Failures that can cross a crate
//! boundary are described by [`LookupError`] and [`MclError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Six degree-of-freedom pose hypothesis carried by a single particle.
///
/// Orientation is stored as roll, pitch and yaw (radians).  Setters perform no
/// validation; the motion model is responsible for producing finite values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseState {
    x: f64,
    y: f64,
    z: f64,
    roll: f64,
    pitch: f64,
    yaw: f64,
}

impl PoseState {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    /// Pose at the world origin with zero rotation.
    pub fn origin() -> Self {
        Self::default()
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn roll(&self) -> f64 {
        self.roll
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn set_x(&mut self, x: f64) {
        self.x = x;
    }

    pub fn set_y(&mut self, y: f64) {
        self.y = y;
    }

    pub fn set_z(&mut self, z: f64) {
        self.z = z;
    }

    pub fn set_roll(&mut self, roll: f64) {
        self.roll = roll;
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.pitch = pitch;
    }

    pub fn set_yaw(&mut self, yaw: f64) {
        self.yaw = yaw;
    }

    /// Position as an `(x, y, z)` tuple.
    pub fn position(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    /// Orientation as a `(roll, pitch, yaw)` tuple.
    pub fn rpy(&self) -> (f64, f64, f64) {
        (self.roll, self.pitch, self.yaw)
    }
}

/// A pose tagged with the time at which it was measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedPose {
    pub stamp: DateTime<Utc>,
    pub pose: PoseState,
}

impl TimestampedPose {
    pub fn new(stamp: DateTime<Utc>, pose: PoseState) -> Self {
        Self { stamp, pose }
    }
}

/// Reasons a frame-transform lookup can fail.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LookupError {
    #[error("Frame not found: {frame}")]
    FrameNotFound { frame: String },

    #[error("Lookup of {frame} timed out after {waited_ms} ms")]
    Timeout { frame: String, waited_ms: u64 },

    #[error("Extrapolation on {frame}: requested {requested}, history covers {oldest} .. {latest}")]
    Extrapolation {
        frame: String,
        requested: DateTime<Utc>,
        oldest: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

/// Workspace error for configuration and replay surfaces.
///
/// The motion model itself never returns these for lookup or odometry
/// problems; those are absorbed and logged.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum MclError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid standard deviation for {axis}: {value}")]
    InvalidNoise { axis: String, value: f64 },

    #[error("Replay Error: {0}")]
    Replay(String),
}
