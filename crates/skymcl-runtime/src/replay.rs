//! Odometry replay – drives full prediction cycles from a recorded log.
//!
//! A log is a JSON-lines file of [`TimestampedPose`] samples, one per line
//! (blank lines and lines starting with `#` are skipped):
//!
//! ```text
//! {"stamp":"2024-05-01T12:00:00Z","pose":{"x":0.0,"y":0.0,"z":1.0,"roll":0.0,"pitch":0.0,"yaw":0.0}}
//! ```
//!
//! For every sample the replay mirrors what the live odometry-ingestion path
//! does: the pose is recorded in the [`TfBuffer`], one prediction cycle runs
//! over the particle set with `dt` equal to the time since the previous
//! accepted sample, and the sample becomes the model's last odometry pose.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use skymcl_perception::{GaussianNoiseSource, MotionModel, MotionNoise, OdometryUpdate, TfBuffer};
use skymcl_types::{MclError, PoseState, TimestampedPose};
use tracing::{info, instrument};

// ────────────────────────────────────────────────────────────────────────────
// OdometryLog
// ────────────────────────────────────────────────────────────────────────────

/// Recorded odometry samples in arrival order.
#[derive(Debug, Clone, Default)]
pub struct OdometryLog {
    samples: Vec<TimestampedPose>,
}

impl OdometryLog {
    pub fn new(samples: Vec<TimestampedPose>) -> Self {
        Self { samples }
    }

    /// Parse JSON lines from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`MclError::Replay`] naming the first unreadable or malformed
    /// line.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, MclError> {
        let mut samples = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line =
                line.map_err(|e| MclError::Replay(format!("line {}: {}", idx + 1, e)))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let sample: TimestampedPose = serde_json::from_str(trimmed)
                .map_err(|e| MclError::Replay(format!("line {}: {}", idx + 1, e)))?;
            samples.push(sample);
        }
        Ok(Self { samples })
    }

    /// Load a log from disk.
    pub fn load(path: &Path) -> Result<Self, MclError> {
        let file = File::open(path)
            .map_err(|e| MclError::Replay(format!("Failed to open {}: {}", path.display(), e)))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn samples(&self) -> &[TimestampedPose] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Summary
// ────────────────────────────────────────────────────────────────────────────

/// What a replay did to the particle set.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    /// Prediction cycles run.
    pub cycles: usize,
    /// Samples dropped for being older than the stored odometry pose.
    pub rejected_samples: usize,
    /// Cycles that fell back to an identity drift.
    pub lookup_failures: u64,
    /// Mean particle pose (circular mean for the angles).
    pub mean_pose: PoseState,
}

/// Mean of a particle set; angles are averaged on the unit circle.
pub fn mean_pose(particles: &[PoseState]) -> PoseState {
    if particles.is_empty() {
        return PoseState::origin();
    }
    let n = particles.len() as f64;
    let sum = |f: fn(&PoseState) -> f64| -> f64 { particles.iter().map(f).sum() };
    let circular = |f: fn(&PoseState) -> f64| {
        let s = particles.iter().map(|p| f(p).sin()).sum::<f64>();
        let c = particles.iter().map(|p| f(p).cos()).sum::<f64>();
        s.atan2(c)
    };
    PoseState::new(
        sum(PoseState::x) / n,
        sum(PoseState::y) / n,
        sum(PoseState::z) / n,
        circular(PoseState::roll),
        circular(PoseState::pitch),
        circular(PoseState::yaw),
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Replay
// ────────────────────────────────────────────────────────────────────────────

/// Couples a [`TfBuffer`] with a [`MotionModel`] reading from it.
///
/// Log samples are recorded as `odom_frame → base_footprint`; by default the
/// odometry frame is the world frame.
#[derive(Debug)]
pub struct Replay {
    buffer: Arc<TfBuffer>,
    model: MotionModel,
    odom_frame: String,
}

impl Replay {
    /// # Errors
    ///
    /// Returns [`MclError::InvalidNoise`] if `noise` fails validation.
    pub fn new(
        buffer: Arc<TfBuffer>,
        noise: MotionNoise,
        rng: GaussianNoiseSource,
    ) -> Result<Self, MclError> {
        let frames = buffer.frames().clone();
        let odom_frame = frames.world.clone();
        let model = MotionModel::new(buffer.clone(), frames, noise, rng)?;
        Ok(Self {
            buffer,
            model,
            odom_frame,
        })
    }

    /// Record log samples under `frame` instead of the world frame.  The
    /// buffer then needs a static `world → frame` link to resolve them.
    pub fn with_odom_frame(mut self, frame: impl Into<String>) -> Self {
        self.odom_frame = frame.into();
        self
    }

    pub fn odom_frame(&self) -> &str {
        &self.odom_frame
    }

    pub fn model(&self) -> &MotionModel {
        &self.model
    }

    pub fn buffer(&self) -> &TfBuffer {
        &self.buffer
    }

    /// Feed every sample of `log` through the buffer and the model,
    /// predicting `particles` once per accepted sample after the first.
    #[instrument(skip_all, fields(samples = log.len(), particles = particles.len()))]
    pub fn run(&self, log: &OdometryLog, particles: &mut [PoseState]) -> ReplaySummary {
        let failures_before = self.model.lookup_failures();
        let mut previous: Option<DateTime<Utc>> = self.model.last_odom_pose().map(|p| p.stamp);
        let mut cycles = 0;
        let mut rejected_samples = 0;

        for sample in log.samples() {
            self.buffer.insert_odometry(&self.odom_frame, *sample);

            if let Some(prev) = previous {
                let gap = sample.stamp - prev;
                let dt = gap.num_microseconds().unwrap_or(0) as f64 * 1e-6;
                if dt > 0.0 {
                    self.model.predict(particles, dt);
                    cycles += 1;
                }
            }

            match self.model.set_last_odom_pose(*sample) {
                OdometryUpdate::Accepted => previous = Some(sample.stamp),
                OdometryUpdate::RejectedStale => rejected_samples += 1,
            }
        }

        let summary = ReplaySummary {
            cycles,
            rejected_samples,
            lookup_failures: self.model.lookup_failures() - failures_before,
            mean_pose: mean_pose(particles),
        };
        info!(
            cycles = summary.cycles,
            rejected = summary.rejected_samples,
            lookup_failures = summary.lookup_failures,
            "replay finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_json_lines_and_skips_comments() {
        let text = "\
# recorded on the bench
{\"stamp\":\"2024-05-01T12:00:00Z\",\"pose\":{\"x\":0.0,\"y\":0.0,\"z\":1.0,\"roll\":0.0,\"pitch\":0.0,\"yaw\":0.0}}

{\"stamp\":\"2024-05-01T12:00:01Z\",\"pose\":{\"x\":1.0,\"y\":0.0,\"z\":1.0,\"roll\":0.0,\"pitch\":0.0,\"yaw\":0.0}}
";
        let log = OdometryLog::from_reader(Cursor::new(text)).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.samples()[1].pose.x(), 1.0);
    }

    #[test]
    fn malformed_line_is_reported() {
        let err = OdometryLog::from_reader(Cursor::new("{\"stamp\": 3}\n")).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn mean_pose_wraps_angles() {
        let particles = [
            PoseState::new(0.0, 0.0, 0.0, 0.0, 0.0, 3.1),
            PoseState::new(2.0, 4.0, 0.0, 0.0, 0.0, -3.1),
        ];
        let m = mean_pose(&particles);
        assert!((m.x() - 1.0).abs() < 1e-12);
        assert!((m.y() - 2.0).abs() < 1e-12);
        assert!(m.yaw().abs() > 3.1, "yaw = {}", m.yaw());
    }

    #[test]
    fn mean_of_empty_set_is_origin() {
        assert_eq!(mean_pose(&[]), PoseState::origin());
    }
}
