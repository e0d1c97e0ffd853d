//! Follow and cancel BuildRuns.
//!
//! Observes the eventually-consistent chain BuildRun → TaskRun → Pod and
//! attaches to the pod's output once it can serve it:
//!
//! - [`watch::wait_for`]: predicate-driven wait over one resource's watch
//! - [`tracker`]: run → task and task → unit trackers built on it
//! - [`logs::attach`]: readiness retry plus verbatim output copy
//! - [`cancel::cancel_run`]: guarded cancellation patch
//! - [`pipeline`]: submission and the sequential follow pipeline
//!
//! Every operation takes the [`buildrun_client::ResourceApi`] capability
//! and a [`tokio_util::sync::CancellationToken`] explicitly.

pub mod cancel;
pub mod error;
pub mod logs;
pub mod pipeline;
pub mod tracker;
pub mod watch;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use cancel::cancel_run;
pub use error::FollowError;
pub use logs::{
    attach, AttachOutcome, AttachPolicy, DEFAULT_ATTACH_ATTEMPTS, DEFAULT_ATTACH_DELAY_SECS,
};
pub use pipeline::{follow_run, submit, submit_and_follow, BuildFollower, FollowReport};
pub use tracker::{track, wait_for_task, wait_for_unit, Trackable, Tracked};
pub use watch::wait_for;
