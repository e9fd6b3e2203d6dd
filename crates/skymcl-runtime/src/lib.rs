//! `skymcl-runtime` – process plumbing around the motion model.
//!
//! # Modules
//!
//! - [`replay`] – [`Replay`][replay::Replay]: feeds a recorded
//!   [`OdometryLog`][replay::OdometryLog] through a
//!   [`TfBuffer`][skymcl_perception::TfBuffer] and runs one prediction cycle
//!   per odometry sample over a particle set.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod replay;
pub mod telemetry;

pub use replay::{mean_pose, OdometryLog, Replay, ReplaySummary};
pub use telemetry::{init_tracing, LogFormat, TracerProviderGuard};
