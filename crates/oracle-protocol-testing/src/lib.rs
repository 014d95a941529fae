//! Scenario-replay test harness for the Oracle TNS protocol engine.
//!
//! Grounded on the teacher's `mssql-testing` crate: where that crate drives
//! real (or mocked) TDS bytes over a socket, this one drives the already-typed
//! `ConnectionStateMachine` API directly, since the engine under test performs
//! no I/O of its own (spec. §5). A [`Scenario`] is a named, ordered list of
//! steps; each step applies one call to a `ConnectionStateMachine` and labels
//! the `Action` it returned, so a failing assertion names which step in the
//! trace misbehaved rather than just "some action didn't match".

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod dispatcher;
pub mod fixtures;
pub mod scenario;

pub use dispatcher::FakeDispatcher;
pub use scenario::{Scenario, ScenarioStep, StepOutcome};
