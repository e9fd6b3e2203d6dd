//! [`TfBuffer`] – time-indexed transform history.
//!
//! Stores a sliding window of `parent → child` poses per frame pair and
//! answers "where was the body at time *t*" by interpolating between the
//! bracketing samples.  Static mechanical offsets live in an embedded
//! [`TfEngine`][crate::transform::TfEngine].
//!
//! A request newer than the latest sample blocks (up to the lookup timeout)
//! waiting for a writer to catch up; a request older than the oldest sample
//! fails immediately with [`LookupError::Extrapolation`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use chrono::DateTime;
//! use skymcl_perception::provider::FrameTransformProvider;
//! use skymcl_perception::tf_buffer::{FrameIds, TfBuffer};
//! use skymcl_types::{PoseState, TimestampedPose};
//!
//! let buffer = TfBuffer::new(FrameIds::default()).with_lookup_timeout(Duration::ZERO);
//! let t0 = DateTime::from_timestamp(0, 0).unwrap();
//! let t2 = DateTime::from_timestamp(2, 0).unwrap();
//! buffer.insert_pose(TimestampedPose::new(t0, PoseState::origin()));
//! let ahead = PoseState::new(2.0, 0.0, 0.0, 0.0, 0.0, 0.0);
//! buffer.insert_pose(TimestampedPose::new(t2, ahead));
//!
//! let mid = buffer.lookup_world_pose(DateTime::from_timestamp(1, 0).unwrap()).unwrap();
//! assert!((mid.pose.x() - 1.0).abs() < 1e-9);
//! ```

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use skymcl_types::{LookupError, TimestampedPose};
use tracing::trace;

use crate::provider::FrameTransformProvider;
use crate::transform::{RelativeTransform, TfEngine, Transform3D};

/// Default bounded wait for a lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(100);

/// Default length of retained history, in seconds.
pub const DEFAULT_CACHE_WINDOW_S: f64 = 10.0;

// ────────────────────────────────────────────────────────────────────────────
// Frame identifiers
// ────────────────────────────────────────────────────────────────────────────

/// Names of the coordinate frames the buffer resolves against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameIds {
    /// Fixed world frame.
    pub world: String,
    /// Body frame projected onto the ground; odometry is reported for it.
    pub base_footprint: String,
    /// Body frame that sensors are mounted to.
    pub base_link: String,
}

impl Default for FrameIds {
    fn default() -> Self {
        Self {
            world: "world".to_string(),
            base_footprint: "base_footprint".to_string(),
            base_link: "base_link".to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// History resolution
// ────────────────────────────────────────────────────────────────────────────

type History = Vec<(DateTime<Utc>, Transform3D)>;

/// History is keyed by `(parent, child)` frame pair.
type FramePair = (String, String);

enum Resolution {
    Found(Transform3D),
    /// Nothing recorded that connects the frames yet.
    NoData,
    /// Requested time is past the newest sample.
    AheadOfData,
    Failed(LookupError),
}

fn resolve(frame: &str, history: &History, at: DateTime<Utc>) -> Resolution {
    let (Some(&(oldest, _)), Some(&(latest, _))) = (history.first(), history.last()) else {
        return Resolution::NoData;
    };

    if at < oldest {
        return Resolution::Failed(LookupError::Extrapolation {
            frame: frame.to_string(),
            requested: at,
            oldest,
            latest,
        });
    }
    if at > latest {
        return Resolution::AheadOfData;
    }

    // First index whose stamp is >= at; exists because at <= latest.
    let idx = history.partition_point(|(stamp, _)| *stamp < at);
    let (after_stamp, after) = history[idx];
    if after_stamp == at || idx == 0 {
        return Resolution::Found(after);
    }
    let (before_stamp, before) = history[idx - 1];
    let span = seconds(after_stamp - before_stamp);
    let ratio = if span > 0.0 {
        seconds(at - before_stamp) / span
    } else {
        1.0
    };
    Resolution::Found(before.interpolate(after, ratio))
}

fn seconds(delta: TimeDelta) -> f64 {
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 * 1e-9,
        None => delta.num_milliseconds() as f64 * 1e-3,
    }
}

fn window_from_seconds(window_s: f64) -> TimeDelta {
    let millis = (window_s.max(0.0) * 1000.0).min(i64::MAX as f64) as i64;
    TimeDelta::try_milliseconds(millis).unwrap_or(TimeDelta::MAX)
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

/// In-process [`FrameTransformProvider`] backed by per-frame-pair pose history.
///
/// `lookup_world_pose` resolves `world → base_footprint` either from history
/// recorded directly under that pair, or by chaining a static
/// `world → parent` offset with history recorded under
/// `parent → base_footprint` (e.g. a fixed `map → odom` link plus odometry).
#[derive(Debug)]
pub struct TfBuffer {
    frames: FrameIds,
    lookup_timeout: Duration,
    cache_window: TimeDelta,
    history: Mutex<HashMap<FramePair, History>>,
    arrived: Condvar,
    statics: RwLock<TfEngine>,
}

impl TfBuffer {
    pub fn new(frames: FrameIds) -> Self {
        Self {
            frames,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            cache_window: window_from_seconds(DEFAULT_CACHE_WINDOW_S),
            history: Mutex::new(HashMap::new()),
            arrived: Condvar::new(),
            statics: RwLock::new(TfEngine::new()),
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Keep roughly `window_s` seconds of history behind the newest sample.
    ///
    /// Windows longer than chrono can represent keep everything.
    pub fn with_cache_window(mut self, window_s: f64) -> Self {
        self.cache_window = window_from_seconds(window_s);
        self
    }

    pub fn frames(&self) -> &FrameIds {
        &self.frames
    }

    /// Record the `parent_frame → child_frame` transform at `stamp`.
    ///
    /// Samples may arrive out of order; they are kept sorted.  A sample with
    /// an existing stamp replaces it.  History older than the cache window is
    /// dropped.
    pub fn insert(
        &self,
        parent_frame: &str,
        child_frame: &str,
        stamp: DateTime<Utc>,
        transform: Transform3D,
    ) {
        let mut guard = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (parent_frame.to_string(), child_frame.to_string());
        let history = guard.entry(key).or_default();

        match history.binary_search_by(|(s, _)| s.cmp(&stamp)) {
            Ok(i) => history[i] = (stamp, transform),
            Err(i) => history.insert(i, (stamp, transform)),
        }

        if let Some(&(latest, _)) = history.last()
            && let Some(horizon) = latest.checked_sub_signed(self.cache_window)
        {
            let stale = history.partition_point(|(s, _)| *s < horizon);
            history.drain(..stale);
        }
        trace!(
            parent = parent_frame,
            child = child_frame,
            stamp = %stamp,
            samples = history.len(),
            "transform inserted"
        );
        drop(guard);
        self.arrived.notify_all();
    }

    /// Record an odometry pose of `base_footprint` expressed in the world
    /// frame.
    pub fn insert_pose(&self, pose: TimestampedPose) {
        let world = self.frames.world.clone();
        self.insert_odometry(&world, pose);
    }

    /// Record an odometry pose of `base_footprint` expressed in
    /// `parent_frame`.
    pub fn insert_odometry(&self, parent_frame: &str, pose: TimestampedPose) {
        let child = self.frames.base_footprint.clone();
        let transform = Transform3D::from_pose(&pose.pose);
        self.insert(parent_frame, &child, pose.stamp, transform);
    }

    /// Register a fixed offset from `parent_frame` to `child_frame`.
    pub fn set_static_transform(
        &self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
    ) {
        self.statics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_transform(parent_frame, child_frame, transform);
        self.arrived.notify_all();
    }

    /// Drop all recorded history (static transforms are kept).
    pub fn clear(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Resolve `parent → child` at `at` from direct history, falling back to
    /// a static `parent → p` chain onto history recorded under `p → child`.
    fn resolve_pair(
        &self,
        history: &HashMap<FramePair, History>,
        parent: &str,
        child: &str,
        at: DateTime<Utc>,
    ) -> Resolution {
        let direct = (parent.to_string(), child.to_string());
        if let Some(h) = history.get(&direct) {
            return resolve(child, h, at);
        }

        let statics = self.statics.read().unwrap_or_else(PoisonError::into_inner);
        let mut candidates: Vec<(&str, &History)> = history
            .iter()
            .filter(|((_, c), _)| c == child)
            .map(|((p, _), h)| (p.as_str(), h))
            .collect();
        candidates.sort_by_key(|(p, _)| *p);

        for (via, h) in candidates {
            let Ok(link) = statics.lookup(parent, via) else {
                continue;
            };
            return match resolve(child, h, at) {
                Resolution::Found(t) => Resolution::Found(link.compose(t)),
                other => other,
            };
        }
        Resolution::NoData
    }

    /// Resolve the `parent_frame → child_frame` transform at `at`, waiting up
    /// to the lookup timeout for data that has not arrived yet.
    ///
    /// # Errors
    ///
    /// [`LookupError::FrameNotFound`] when nothing connects the frames by the
    /// deadline, [`LookupError::Timeout`] when history exists but stops short
    /// of `at`, [`LookupError::Extrapolation`] when `at` predates it.
    pub fn lookup_frame(
        &self,
        parent_frame: &str,
        child_frame: &str,
        at: DateTime<Utc>,
    ) -> Result<Transform3D, LookupError> {
        let deadline = Instant::now() + self.lookup_timeout;
        let mut guard = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let pending = match self.resolve_pair(&guard, parent_frame, child_frame, at) {
                Resolution::Found(t) => return Ok(t),
                Resolution::Failed(e) => return Err(e),
                pending => pending,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(match pending {
                    Resolution::NoData => LookupError::FrameNotFound {
                        frame: child_frame.to_string(),
                    },
                    _ => LookupError::Timeout {
                        frame: child_frame.to_string(),
                        waited_ms: self.lookup_timeout.as_millis() as u64,
                    },
                });
            }
            guard = self
                .arrived
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl FrameTransformProvider for TfBuffer {
    fn lookup_world_pose(&self, at: DateTime<Utc>) -> Result<TimestampedPose, LookupError> {
        let frames = &self.frames;
        let transform = self.lookup_frame(&frames.world, &frames.base_footprint, at)?;
        Ok(TimestampedPose::new(at, transform.to_pose()))
    }

    fn lookup_static_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        _at: DateTime<Utc>,
    ) -> Result<RelativeTransform, LookupError> {
        self.statics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(target_frame, source_frame)
    }
}
