//! rollcall-engine — Services around the rollcall decision core.
//!
//! Wires the pure logic of `rollcall-core` to its collaborators: a blocking
//! store behind [`Gateway`], a face extractor on its own OS thread behind
//! [`ExtractorHandle`], and a notifier. Enrollment and sweeping for the
//! same identity are serialized through [`IdentityLocks`].

pub mod config;
pub mod enroll;
pub mod error;
pub mod gateway;
pub mod lecture;
pub mod locks;
pub mod sweep;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use enroll::{EnrollOutcome, Enroller, PhotoEnrollment};
pub use error::EngineError;
pub use gateway::Gateway;
pub use lecture::LectureMatcher;
pub use locks::IdentityLocks;
pub use sweep::{spawn_sweeper, LowCoverage, SweepReport, Sweeper};
pub use worker::{spawn_extractor, ExtractorHandle};
