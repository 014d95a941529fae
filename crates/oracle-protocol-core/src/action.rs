//! The `Action` type: everything the core ever hands back to a caller.
//!
//! An `Action` is inert data. The core never performs I/O, never awaits,
//! and never completes a caller future itself — every variant here names a
//! side effect the dispatcher must carry out (send these bytes, complete
//! this completer, tear down the transport). This is the entire contract
//! between this crate and its external dispatcher.

use oracle_proto_types::{
    AuthContext, Bind, CleanupAction, CloseCompleter, Completer, OracleError, ParameterSet, Row,
    StatementContext, StatementOutcome,
};

use crate::task_queue::TaskQueue;

/// A statement waiting in the connection's FIFO. The completer lives
/// inside `ctx` itself (taken exactly once, whether the statement starts
/// normally or is failed outright by a connection teardown).
pub struct StatementTask {
    /// The statement's shared context.
    pub ctx: StatementContext,
}

impl std::fmt::Debug for StatementTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementTask").field("ctx", &self.ctx).finish()
    }
}

/// What the dispatcher should do with the transport once cleanup finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownKind {
    /// Send a CLOSE message and close the transport.
    Close,
    /// The transport is already gone; just fire the inactive event.
    FireChannelInactive,
}

/// Everything the dispatcher needs to tear a connection down cleanly: the
/// transport action to take, every task that must be failed, the error
/// that triggered the teardown, and any close completers waiting on the
/// outcome (spec. §4.1 cleanup protocol).
pub struct CleanupContext {
    /// Which transport action to perform.
    pub action: TeardownKind,
    /// Queued statements to fail with `error`, in FIFO order.
    pub tasks: Vec<StatementTask>,
    /// The error that caused the teardown.
    pub error: OracleError,
    /// Completers for any `close()` calls accepted before or during
    /// teardown; all must be completed with the same outcome.
    pub close_completers: Vec<CloseCompleter>,
}

impl std::fmt::Debug for CleanupContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupContext")
            .field("action", &self.action)
            .field("task_count", &self.tasks.len())
            .field("error", &self.error)
            .field("close_completer_count", &self.close_completers.len())
            .finish()
    }
}

impl CleanupContext {
    /// Build a teardown context, draining `queue` into `tasks` in FIFO order.
    pub fn new(
        action: TeardownKind,
        queue: &mut TaskQueue<StatementTask>,
        error: OracleError,
        close_completers: Vec<CloseCompleter>,
    ) -> Self {
        Self {
            action,
            tasks: queue.drain().collect(),
            error,
            close_completers,
        }
    }
}

/// Every side effect the core can request.
///
/// Grouped per spec. §4.5: transport, authentication, statement, and
/// lifecycle actions. Dispatcher guarantee: every completer named in an
/// emitted action is completed exactly once.
pub enum Action {
    // --- Transport ---
    /// Send the CONNECT message.
    SendConnect,
    /// Send the PROTOCOL message.
    SendProtocol,
    /// Send the DATA-TYPES message.
    SendDataTypes,
    /// Send the out-of-band probe byte that confirms whether the transport
    /// actually carries OOB signaling (spec. §6 capability negotiation).
    SendOob,
    /// Send an out-of-band MARKER frame.
    SendMarker,
    /// Send LOGOFF. The completer(s) owed for this close are held inside
    /// the core until STATUS arrives; this action carries none of its own.
    LogoffConnection,
    /// Send CLOSE and tear down the transport; the listed completers
    /// resolve once this completes.
    CloseConnection { completers: Vec<CloseCompleter> },
    /// The transport is already gone; no CLOSE is sent. Carries any
    /// completers that were waiting on a graceful close already in
    /// flight when the transport disappeared.
    FireChannelInactive { completers: Vec<CloseCompleter> },
    /// Notify upstream that the connection is ready for the next statement.
    FireEventReadyForStatement,
    /// Request more bytes from the transport.
    Read,
    /// No side effect required this call.
    Wait,
    /// The current message is incomplete; more bytes are required before
    /// framing can continue.
    NeedMoreData,

    // --- Authentication ---
    /// Ask the caller's authentication provider for an `AuthContext`.
    ProvideAuthenticationContext,
    /// Send phase-one of the AUTH exchange.
    SendAuthPhaseOne {
        ctx: AuthContext,
        cookie: Option<bytes::Bytes>,
    },
    /// Send phase-two of the AUTH exchange.
    SendAuthPhaseTwo { ctx: AuthContext, params: ParameterSet },
    /// Authentication succeeded; these are the server's session parameters.
    Authenticated { params: ParameterSet },

    // --- Statement ---
    /// Send EXECUTE, optionally re-describing the statement first.
    SendExecute {
        ctx: StatementContext,
        describe: Option<oracle_proto_types::DescribeInfo>,
    },
    /// Re-send EXECUTE with an updated describe, flushing any pending
    /// per-statement cleanup (e.g. closing a superseded cursor) first.
    SendReexecute {
        ctx: StatementContext,
        cleanup: Vec<CleanupAction>,
    },
    /// Request the next batch of rows for an already-executing statement.
    SendFetch { ctx: StatementContext },
    /// Fail the statement's completer.
    FailQuery {
        completer: Completer<StatementOutcome>,
        err: OracleError,
        cleanup: Vec<CleanupAction>,
    },
    /// Resolve the statement's completer successfully.
    SucceedQuery {
        completer: Completer<StatementOutcome>,
        result: StatementOutcome,
    },
    /// Deliver a batch of rows to the caller's open stream.
    ForwardRows { rows: Vec<Row> },
    /// The stream completed normally; these are the final buffered rows.
    ForwardStreamComplete { rows: Vec<Row> },
    /// The stream terminated with an error.
    ForwardStreamError {
        err: OracleError,
        read: bool,
        cursor_id: Option<u32>,
        client_cancelled: bool,
    },
    /// A caller-initiated cancellation has been fully acknowledged by the
    /// server.
    ForwardCancelComplete,
    /// PL/SQL OUT-bind values accumulated for this execution.
    ForwardOutBinds { binds: Vec<Bind> },

    // --- Lifecycle ---
    /// Tear the connection down; see `CleanupContext`.
    CloseConnectionAndCleanup(CleanupContext),
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendConnect => write!(f, "SendConnect"),
            Self::SendProtocol => write!(f, "SendProtocol"),
            Self::SendDataTypes => write!(f, "SendDataTypes"),
            Self::SendOob => write!(f, "SendOob"),
            Self::SendMarker => write!(f, "SendMarker"),
            Self::LogoffConnection => write!(f, "LogoffConnection"),
            Self::CloseConnection { completers } => f
                .debug_struct("CloseConnection")
                .field("completer_count", &completers.len())
                .finish(),
            Self::FireChannelInactive { completers } => f
                .debug_struct("FireChannelInactive")
                .field("completer_count", &completers.len())
                .finish(),
            Self::FireEventReadyForStatement => write!(f, "FireEventReadyForStatement"),
            Self::Read => write!(f, "Read"),
            Self::Wait => write!(f, "Wait"),
            Self::NeedMoreData => write!(f, "NeedMoreData"),
            Self::ProvideAuthenticationContext => write!(f, "ProvideAuthenticationContext"),
            Self::SendAuthPhaseOne { .. } => write!(f, "SendAuthPhaseOne"),
            Self::SendAuthPhaseTwo { .. } => write!(f, "SendAuthPhaseTwo"),
            Self::Authenticated { params } => {
                f.debug_struct("Authenticated").field("params", params).finish()
            }
            Self::SendExecute { describe, .. } => f
                .debug_struct("SendExecute")
                .field("has_describe", &describe.is_some())
                .finish(),
            Self::SendReexecute { cleanup, .. } => f
                .debug_struct("SendReexecute")
                .field("cleanup_count", &cleanup.len())
                .finish(),
            Self::SendFetch { .. } => write!(f, "SendFetch"),
            Self::FailQuery { err, cleanup, .. } => f
                .debug_struct("FailQuery")
                .field("err", err)
                .field("cleanup_count", &cleanup.len())
                .finish(),
            Self::SucceedQuery { result, .. } => {
                f.debug_struct("SucceedQuery").field("result", result).finish()
            }
            Self::ForwardRows { rows } => {
                f.debug_struct("ForwardRows").field("row_count", &rows.len()).finish()
            }
            Self::ForwardStreamComplete { rows } => f
                .debug_struct("ForwardStreamComplete")
                .field("row_count", &rows.len())
                .finish(),
            Self::ForwardStreamError {
                err,
                read,
                cursor_id,
                client_cancelled,
            } => f
                .debug_struct("ForwardStreamError")
                .field("err", err)
                .field("read", read)
                .field("cursor_id", cursor_id)
                .field("client_cancelled", client_cancelled)
                .finish(),
            Self::ForwardCancelComplete => write!(f, "ForwardCancelComplete"),
            Self::ForwardOutBinds { binds } => f
                .debug_struct("ForwardOutBinds")
                .field("bind_count", &binds.len())
                .finish(),
            Self::CloseConnectionAndCleanup(ctx) => {
                f.debug_tuple("CloseConnectionAndCleanup").field(ctx).finish()
            }
        }
    }
}
