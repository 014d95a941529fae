//! Composable state machines driving the Oracle TNS connection and query
//! protocol.
//!
//! This crate owns exactly the decision logic: given a typed inbound event
//! or caller request, what side effect follows next. It performs no I/O, no
//! byte-level decoding, and never awaits anything itself; every method on
//! [`ConnectionStateMachine`] takes already-typed arguments and returns an
//! [`Action`] describing what the dispatcher should do next. Wiring bytes to
//! typed events, actually sending them over a transport, and completing
//! caller-visible futures are all the job of the external dispatcher this
//! crate hands `Action`s to.
//!
//! # Layout
//!
//! - [`ConnectionStateMachine`] (`csm`) is the top-level engine: handshake,
//!   authentication, and one-statement-at-a-time execution.
//! - [`AuthenticationStateMachine`] (`asm`) drives the two-phase AUTH
//!   exchange; owned by the CSM while authenticating.
//! - [`ExtendedQueryStateMachine`] (`eqsm`) drives one statement from
//!   submission through DESCRIBE/EXECUTE/FETCH to completion; owned by the
//!   CSM while executing.
//! - [`RowStreamBuffer`] (`row_stream_buffer`) adapts server-driven row
//!   delivery to caller-driven demand with an adaptive prefetch target.
//! - [`TaskQueue`] (`task_queue`) is the small FIFO used to serialize
//!   statement execution.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod action;
pub mod asm;
pub mod csm;
pub mod eqsm;
pub mod marker;
pub mod row_stream_buffer;
pub mod task_queue;

pub use action::{Action, CleanupContext, StatementTask, TeardownKind};
pub use asm::{AsmAction, AuthenticationStateMachine};
pub use csm::ConnectionStateMachine;
pub use eqsm::{EqsmAction, ExtendedQueryStateMachine};
pub use marker::MarkerState;
pub use row_stream_buffer::{Demand, RowStreamBuffer};
pub use task_queue::TaskQueue;
