//! Test doubles for the supervisor's operating-system seams.
//!
//! Every double appends to one shared [`Journal`], so ordering properties
//! spanning several collaborators can be asserted directly.

mod host;
mod journal;
mod reporter;
mod runner;
mod sink;
mod world;

pub use host::{FAKE_GROUP, FAKE_LAUNCHER, FakeHost, WorkerBehaviour};
pub use journal::{Entry, Journal};
pub use reporter::RecordingReporter;
pub use runner::FakeRunner;
pub use sink::JournalSink;
pub use world::{SupervisorWorld, fast_timings};
