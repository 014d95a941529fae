//! The ConnectionStateMachine: the top-level engine that owns the
//! handshake, authentication, and one-statement-at-a-time query execution
//! for a single Oracle TNS connection.
//!
//! CSM is the only state machine a dispatcher talks to directly. It embeds
//! the `AuthenticationStateMachine` and `ExtendedQueryStateMachine` as owned
//! sub-machines, routes inbound events to whichever one is active, and maps
//! their outward-facing actions onto its own `Action` (spec. §4.1 sub-machine
//! integration).

use bytes::Bytes;

use oracle_proto_types::{
    AuthContext, BitVector, Capabilities, ColumnFramer, DescribeInfo, OracleError, ParameterSet,
    RowHeader, ServerError,
};

use crate::action::{Action, CleanupContext, StatementTask, TeardownKind};
use crate::asm::{AsmAction, AuthenticationStateMachine};
use crate::eqsm::{EqsmAction, ExtendedQueryStateMachine};
use crate::marker::MarkerState;
use crate::task_queue::TaskQueue;

pub use oracle_proto_types::CloseCompleter;

/// CSM's state (spec. §3 `ConnectionState`).
///
/// `Ready` never coexists with a non-empty task queue: every statement
/// enqueued while ready starts immediately, so the queue only ever holds
/// work that arrived while some other state occupied the connection.
enum ConnectionState {
    Initialized,
    ConnectSent,
    /// ACCEPT arrived and advertised OOB support; the OOB probe byte has
    /// been sent and the engine is waiting for the server to confirm it
    /// (MARKER) or decline it (RESET-OOB) before negotiation continues.
    OobProbeSent,
    ProtocolSent,
    DataTypesSent,
    AwaitingAuthContext,
    Authenticating(Box<AuthenticationStateMachine>),
    Ready,
    Executing(Box<ExtendedQueryStateMachine>),
    /// A teardown (error-driven or client-requested) has been handed to the
    /// dispatcher as a `CloseConnectionAndCleanup`; waiting for the
    /// transport to actually go away.
    ReadyToLogOff,
    /// LOGOFF sent; waiting for STATUS. Carries every completer owed once
    /// the close sequence finishes.
    LoggingOff(Vec<CloseCompleter>),
    /// CLOSE sent (or about to be); completers for this round already
    /// handed to the dispatcher via the triggering action.
    Closing,
    Closed,
    /// Transient placeholder; see `crate::marker`.
    Modifying,
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "Initialized"),
            Self::ConnectSent => write!(f, "ConnectSent"),
            Self::OobProbeSent => write!(f, "OobProbeSent"),
            Self::ProtocolSent => write!(f, "ProtocolSent"),
            Self::DataTypesSent => write!(f, "DataTypesSent"),
            Self::AwaitingAuthContext => write!(f, "AwaitingAuthContext"),
            Self::Authenticating(_) => write!(f, "Authenticating"),
            Self::Ready => write!(f, "Ready"),
            Self::Executing(_) => write!(f, "Executing"),
            Self::ReadyToLogOff => write!(f, "ReadyToLogOff"),
            Self::LoggingOff(c) => write!(f, "LoggingOff({})", c.len()),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
            Self::Modifying => write!(f, "Modifying"),
        }
    }
}

/// Whether the connection is winding down a caller-requested `close()` that
/// arrived while busy. Separate from `ConnectionState` because quiescing can
/// be true while `Authenticating` or `Executing` is also true; it resolves
/// the next time the connection would otherwise become ready.
enum QuiescingState {
    NotQuiescing,
    /// Completers for every `close()` call accepted while quiescing,
    /// merged by chaining (spec. §4.1 close() table).
    Quiescing(Vec<CloseCompleter>),
}

/// Drives one Oracle TNS connection end to end: handshake, authentication,
/// and serialized statement execution, producing one `Action` per inbound
/// event or caller request.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    quiescing: QuiescingState,
    marker: MarkerState,
    capabilities: Capabilities,
    tasks: TaskQueue<StatementTask>,
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("state", &self.state)
            .field("queued_tasks", &self.tasks.len())
            .field("marker", &self.marker)
            .finish()
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    /// A fresh machine, not yet connected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Initialized,
            quiescing: QuiescingState::NotQuiescing,
            marker: MarkerState::default(),
            capabilities: Capabilities::default(),
            tasks: TaskQueue::new(),
        }
    }

    /// Number of statements currently queued behind in-flight work.
    #[must_use]
    pub fn queued_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether a `close()` has been accepted and is waiting for in-flight
    /// work to finish.
    #[must_use]
    pub fn is_quiescing(&self) -> bool {
        matches!(self.quiescing, QuiescingState::Quiescing(_))
    }

    // ---- Handshake ----

    /// The transport connected; begin the TNS handshake.
    pub fn connected(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Initialized => {
                self.state = ConnectionState::ConnectSent;
                tracing::debug!("csm: sending connect");
                Action::SendConnect
            }
            other => {
                self.state = other;
                Action::Wait
            }
        }
    }

    /// ACCEPT arrived: the server accepted the CONNECT request. If the
    /// capabilities blob advertises OOB support, the handshake detours
    /// through an OOB probe (spec. §6 capability negotiation: send OOB,
    /// then MARKER, expecting MARKER back for OOB-capable transports or
    /// RESET-OOB otherwise) before PROTOCOL negotiation begins.
    pub fn accept_received(&mut self, capabilities: Capabilities) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::ConnectSent => {
                self.capabilities = capabilities;
                if self.capabilities.oob_capable {
                    self.state = ConnectionState::OobProbeSent;
                    tracing::debug!("csm: probing oob support");
                    Action::SendOob
                } else {
                    self.state = ConnectionState::ProtocolSent;
                    Action::SendProtocol
                }
            }
            other => unreachable_from("accept_received", &other),
        }
    }

    /// The dispatcher finished sending the OOB probe byte; follow it with an
    /// inline MARKER so the server's echo (or RESET-OOB) can be correlated
    /// with this probe.
    pub fn oob_sent(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::OobProbeSent => {
                self.state = ConnectionState::OobProbeSent;
                self.marker.mark_sent();
                Action::SendMarker
            }
            other => unreachable_from("oob_sent", &other),
        }
    }

    /// RESET-OOB arrived: the server declined the OOB probe. Negotiation
    /// continues regardless; only the probe's own marker is cleared.
    pub fn reset_oob_received(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::OobProbeSent => {
                self.marker.clear();
                self.state = ConnectionState::ProtocolSent;
                tracing::debug!("csm: oob declined, proceeding without it");
                Action::SendProtocol
            }
            other => unreachable_from("reset_oob_received", &other),
        }
    }

    /// PROTOCOL negotiation finished.
    pub fn protocol_received(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::ProtocolSent => {
                self.state = ConnectionState::DataTypesSent;
                Action::SendDataTypes
            }
            other => unreachable_from("protocol_received", &other),
        }
    }

    /// DATA-TYPES negotiation finished.
    pub fn data_types_received(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::DataTypesSent => {
                self.state = ConnectionState::AwaitingAuthContext;
                Action::ProvideAuthenticationContext
            }
            other => unreachable_from("data_types_received", &other),
        }
    }

    /// The caller's authentication provider produced an `AuthContext`;
    /// begins the two-phase AUTH exchange.
    pub fn provide_authentication_context(&mut self, auth_context: AuthContext) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::AwaitingAuthContext => {
                let mut asm = AuthenticationStateMachine::new(auth_context);
                let action = asm.start();
                self.map_asm_action(asm, action)
            }
            other => unreachable_from("provide_authentication_context", &other),
        }
    }

    /// A PARAMETER message arrived; only meaningful mid-authentication.
    pub fn parameter_received(&mut self, params: ParameterSet) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Authenticating(asm) => {
                let mut asm = *asm;
                let action = asm.parameter_received(params);
                self.map_asm_action(asm, action)
            }
            other => {
                self.state = other;
                self.unexpected_message("PARAMETER")
            }
        }
    }

    /// RESEND arrived: the server wants the last message retransmitted.
    /// Conservative on purpose: only valid immediately after CONNECT, where
    /// retransmission is unambiguous.
    pub fn resend_received(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::ConnectSent => {
                self.state = ConnectionState::ConnectSent;
                Action::SendConnect
            }
            other => unreachable_from("resend_received", &other),
        }
    }

    // ---- Statement lifecycle ----

    /// Submit a statement. Starts immediately if ready; queues otherwise;
    /// fails outright if the connection is quiescing or winding down.
    pub fn enqueue(&mut self, task: StatementTask) -> Action {
        if self.is_quiescing() || self.is_terminal() {
            let completer = task.ctx.take_completer();
            return Action::FailQuery {
                completer,
                err: OracleError::ClientClosesConnection,
                cleanup: Vec::new(),
            };
        }

        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Ready => {
                let mut eqsm = ExtendedQueryStateMachine::new(task.ctx);
                let action = eqsm.start();
                self.map_eqsm_action(eqsm, action)
            }
            other => {
                self.state = other;
                self.tasks.push(task);
                Action::Wait
            }
        }
    }

    /// Cancel the statement currently executing, if any.
    pub fn cancel_query_stream(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Executing(eqsm) => {
                let mut eqsm = *eqsm;
                let action = eqsm.cancel();
                self.map_eqsm_action(eqsm, action)
            }
            other => {
                self.state = other;
                Action::Wait
            }
        }
    }

    /// The caller's stream asked for more rows.
    pub fn request_query_rows(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Executing(eqsm) => {
                let mut eqsm = *eqsm;
                let action = eqsm.request_query_rows();
                self.map_eqsm_action(eqsm, action)
            }
            other => {
                self.state = other;
                Action::Wait
            }
        }
    }

    // ---- Inbound protocol messages ----

    /// DESCRIBE-INFO arrived.
    pub fn describe_info_received(&mut self, describe: DescribeInfo) -> Action {
        self.route_to_eqsm("DESCRIBE-INFO", move |eqsm| eqsm.describe_info_received(describe))
    }

    /// ROW-HEADER arrived.
    pub fn row_header_received(&mut self, header: RowHeader) -> Action {
        self.route_to_eqsm("ROW-HEADER", move |eqsm| eqsm.row_header_received(header))
    }

    /// BIT-VECTOR arrived.
    pub fn bit_vector_received(&mut self, bit_vector: BitVector) -> Action {
        self.route_to_eqsm("BIT-VECTOR", move |eqsm| eqsm.bit_vector_received(bit_vector))
    }

    /// ROW-DATA arrived.
    pub fn row_data_received(&mut self, buf: Bytes, framer: &dyn ColumnFramer) -> Action {
        self.route_to_eqsm("ROW-DATA", move |eqsm| eqsm.row_data_received(buf, framer))
    }

    /// Further bytes arrived for a ROW-DATA message left incomplete by a
    /// previous call.
    pub fn chunk_received(&mut self, buf: Bytes, framer: &dyn ColumnFramer) -> Action {
        self.route_to_eqsm("ROW-DATA", move |eqsm| eqsm.chunk_received(buf, framer))
    }

    /// SERVER-ERROR arrived while a statement is executing.
    pub fn backend_error_received(&mut self, err: ServerError) -> Action {
        self.route_to_eqsm("SERVER-ERROR", move |eqsm| eqsm.backend_error_received(err))
    }

    /// READY-FOR-STATEMENT arrived: the in-flight statement's round trip is
    /// fully done. Becomes ready, pulls the next queued statement, or
    /// resolves an outstanding quiesced close, in that priority order.
    pub fn ready_for_query_received(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Executing(eqsm) => {
                debug_assert!(
                    eqsm.is_complete(),
                    "readyForQuery observed before EQSM reached a terminal substate"
                );
                drop(eqsm);
                self.resolve_ready(Action::FireEventReadyForStatement)
            }
            other => {
                self.state = other;
                self.unexpected_message("READY-FOR-STATEMENT")
            }
        }
    }

    /// STATUS arrived while logging off.
    pub fn status_received(&mut self, call_status: u32) -> Action {
        tracing::trace!(call_status, "csm: status received");
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::LoggingOff(completers) => {
                self.state = ConnectionState::Closing;
                Action::CloseConnection { completers }
            }
            other => {
                self.state = other;
                self.unexpected_message("STATUS")
            }
        }
    }

    /// MARKER arrived: either the echo of our own out-of-band marker, or a
    /// marker the server sent unprompted. Toggles regardless of which
    /// (spec. §9: no additional correlation is tracked) — except while the
    /// handshake's OOB probe is outstanding, where this MARKER is the
    /// probe's confirmation and negotiation proceeds to PROTOCOL.
    pub fn marker_received(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::OobProbeSent => {
                self.marker.clear();
                self.state = ConnectionState::ProtocolSent;
                tracing::debug!("csm: oob probe confirmed, proceeding to protocol negotiation");
                Action::SendProtocol
            }
            other => {
                self.state = other;
                if self.marker.is_sent() {
                    self.marker.clear();
                    Action::Wait
                } else {
                    self.marker.mark_sent();
                    Action::SendMarker
                }
            }
        }
    }

    // ---- Transport plumbing ----

    /// The transport has no more bytes immediately available.
    pub fn channel_read_complete(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Executing(eqsm) => {
                let mut eqsm = *eqsm;
                let action = eqsm.channel_read_complete();
                self.map_eqsm_action(eqsm, action)
            }
            other => {
                let action = if matches!(other, ConnectionState::Closed) {
                    Action::Wait
                } else {
                    Action::Read
                };
                self.state = other;
                action
            }
        }
    }

    /// A readiness event landed on the transport's read side.
    pub fn read_event_caught(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Initialized => {
                unreachable!("read_event_caught() called before connected()")
            }
            ConnectionState::Closed => {
                unreachable!("read_event_caught() called after the connection closed")
            }
            ConnectionState::Executing(eqsm) => {
                let mut eqsm = *eqsm;
                let action = eqsm.read_event_caught();
                self.map_eqsm_action(eqsm, action)
            }
            other => {
                self.state = other;
                Action::Read
            }
        }
    }

    // ---- Errors and shutdown ----

    /// The connection layer observed an error outside any specific
    /// sub-machine routing (e.g. a transport failure while idle).
    pub fn error_happened(&mut self, err: OracleError) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            // Reentrancy during an already-decided shutdown: swallowed
            // (spec. §7: these are shutdown reentrancy paths, not fresh
            // failures requiring a second teardown).
            other @ (ConnectionState::ReadyToLogOff
            | ConnectionState::LoggingOff(_)
            | ConnectionState::Closing
            | ConnectionState::Closed) => {
                self.state = other;
                Action::Wait
            }
            ConnectionState::Authenticating(asm) => {
                let mut asm = *asm;
                let action = asm.error_happened(err);
                self.map_asm_action(asm, action)
            }
            ConnectionState::Executing(eqsm) => {
                let mut eqsm = *eqsm;
                let action = eqsm.error_happened(err);
                self.map_eqsm_action(eqsm, action)
            }
            other => {
                self.state = other;
                self.teardown(shutdown_kind(&err), err, None)
            }
        }
    }

    /// A transport-level close was observed (EOF, reset).
    pub fn closed(&mut self) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Initialized => {
                unreachable!("closed() called before the transport ever connected")
            }
            ConnectionState::Closed => {
                unreachable!("closed() called on an already-closed connection")
            }
            ConnectionState::LoggingOff(completers) => {
                self.state = ConnectionState::Closed;
                Action::FireChannelInactive { completers }
            }
            ConnectionState::Closing => {
                self.state = ConnectionState::Closed;
                Action::FireChannelInactive {
                    completers: Vec::new(),
                }
            }
            other => {
                self.state = other;
                self.teardown(TeardownKind::FireChannelInactive, OracleError::UncleanShutdown, None)
            }
        }
    }

    /// Request that the connection close gracefully.
    pub fn close(&mut self, completer: CloseCompleter) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Ready => {
                self.state = ConnectionState::LoggingOff(vec![completer]);
                tracing::debug!("csm: logging off");
                Action::LogoffConnection
            }
            ConnectionState::LoggingOff(mut completers) => {
                completers.push(completer);
                self.state = ConnectionState::Closing;
                Action::CloseConnection { completers }
            }
            other @ (ConnectionState::ReadyToLogOff | ConnectionState::Closing | ConnectionState::Closed) => {
                self.state = other;
                Action::CloseConnection {
                    completers: vec![completer],
                }
            }
            other => {
                self.state = other;
                match std::mem::replace(&mut self.quiescing, QuiescingState::NotQuiescing) {
                    QuiescingState::Quiescing(mut completers) => {
                        completers.push(completer);
                        self.quiescing = QuiescingState::Quiescing(completers);
                    }
                    QuiescingState::NotQuiescing => {
                        self.quiescing = QuiescingState::Quiescing(vec![completer]);
                    }
                }
                Action::Wait
            }
        }
    }

    // ---- Internals ----

    fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::ReadyToLogOff
                | ConnectionState::LoggingOff(_)
                | ConnectionState::Closing
                | ConnectionState::Closed
        )
    }

    fn unexpected_message(&mut self, what: &str) -> Action {
        self.teardown(
            TeardownKind::Close,
            OracleError::UnexpectedBackendMessage(what.to_string()),
            None,
        )
    }

    /// Route an inbound event to the active EQSM, or fail the connection if
    /// no statement is executing (spec. §4.1 REDESIGN FLAGS: data-path
    /// methods invalid in the current state close the connection rather
    /// than panicking).
    fn route_to_eqsm(
        &mut self,
        what: &str,
        f: impl FnOnce(&mut ExtendedQueryStateMachine) -> EqsmAction,
    ) -> Action {
        match std::mem::replace(&mut self.state, ConnectionState::Modifying) {
            ConnectionState::Executing(eqsm) => {
                let mut eqsm = *eqsm;
                let action = f(&mut eqsm);
                self.map_eqsm_action(eqsm, action)
            }
            other => {
                self.state = other;
                self.unexpected_message(what)
            }
        }
    }

    /// Build a connection-wide teardown, absorbing any completers already
    /// waiting on a quiesced close alongside `extra_completer`.
    fn teardown(&mut self, kind: TeardownKind, err: OracleError, extra_completer: Option<CloseCompleter>) -> Action {
        let mut completers = match std::mem::replace(&mut self.quiescing, QuiescingState::NotQuiescing) {
            QuiescingState::Quiescing(completers) => completers,
            QuiescingState::NotQuiescing => Vec::new(),
        };
        if let Some(completer) = extra_completer {
            completers.push(completer);
        }
        self.state = ConnectionState::ReadyToLogOff;
        tracing::warn!(error = %err, "csm: tearing down connection");
        Action::CloseConnectionAndCleanup(CleanupContext::new(kind, &mut self.tasks, err, completers))
    }

    /// The connection has nothing left in flight: either resolve a pending
    /// quiesced close, start the next queued statement, or report idle via
    /// `idle_action`, in that priority order.
    fn resolve_ready(&mut self, idle_action: Action) -> Action {
        if let QuiescingState::Quiescing(completers) =
            std::mem::replace(&mut self.quiescing, QuiescingState::NotQuiescing)
        {
            self.state = ConnectionState::ReadyToLogOff;
            return Action::CloseConnectionAndCleanup(CleanupContext::new(
                TeardownKind::Close,
                &mut self.tasks,
                OracleError::ClientClosesConnection,
                completers,
            ));
        }

        if let Some(task) = self.tasks.pop() {
            let mut eqsm = ExtendedQueryStateMachine::new(task.ctx);
            let action = eqsm.start();
            return self.map_eqsm_action(eqsm, action);
        }

        self.state = ConnectionState::Ready;
        idle_action
    }

    fn map_asm_action(&mut self, asm: AuthenticationStateMachine, action: AsmAction) -> Action {
        match action {
            AsmAction::SendAuthPhaseOne { ctx, cookie } => {
                self.state = ConnectionState::Authenticating(Box::new(asm));
                Action::SendAuthPhaseOne { ctx, cookie }
            }
            AsmAction::SendAuthPhaseTwo { ctx, params } => {
                self.state = ConnectionState::Authenticating(Box::new(asm));
                Action::SendAuthPhaseTwo { ctx, params }
            }
            AsmAction::Authenticated { params } => {
                debug_assert!(asm.is_complete());
                self.resolve_ready(Action::Authenticated { params })
            }
            AsmAction::ReportAuthError { err } => {
                debug_assert!(asm.is_complete());
                self.teardown(shutdown_kind(&err), err, None)
            }
        }
    }

    fn map_eqsm_action(&mut self, eqsm: ExtendedQueryStateMachine, action: EqsmAction) -> Action {
        match action {
            EqsmAction::SendExecute { describe } => {
                let ctx = eqsm.ctx().clone();
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::SendExecute { ctx, describe }
            }
            EqsmAction::SendFetch => {
                let ctx = eqsm.ctx().clone();
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::SendFetch { ctx }
            }
            EqsmAction::FailQuery { err } => {
                let completer = eqsm.ctx().take_completer();
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::FailQuery {
                    completer,
                    err,
                    cleanup: Vec::new(),
                }
            }
            EqsmAction::SucceedQuery { result } => {
                let completer = eqsm.ctx().take_completer();
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::SucceedQuery { completer, result }
            }
            EqsmAction::NeedMoreData => {
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::NeedMoreData
            }
            EqsmAction::ForwardRows { rows } => {
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::ForwardRows { rows }
            }
            EqsmAction::ForwardStreamComplete { rows } => {
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::ForwardStreamComplete { rows }
            }
            EqsmAction::ForwardStreamError {
                err,
                read,
                cursor_id,
                client_cancelled,
            } => {
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::ForwardStreamError {
                    err,
                    read,
                    cursor_id,
                    client_cancelled,
                }
            }
            EqsmAction::ForwardCancelComplete => {
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::ForwardCancelComplete
            }
            EqsmAction::ForwardOutBinds => {
                let binds = eqsm.ctx().binds.borrow().clone();
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::ForwardOutBinds { binds }
            }
            EqsmAction::Read => {
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::Read
            }
            EqsmAction::Wait => {
                self.state = ConnectionState::Executing(Box::new(eqsm));
                Action::Wait
            }
            EqsmAction::EvaluateErrorAtConnectionLevel { err } => {
                if err.should_close_connection() {
                    drop(eqsm);
                    self.teardown(shutdown_kind(&err), err, None)
                } else {
                    self.state = ConnectionState::Executing(Box::new(eqsm));
                    Action::Wait
                }
            }
        }
    }
}

fn shutdown_kind(err: &OracleError) -> TeardownKind {
    if err.is_unclean_shutdown() {
        TeardownKind::FireChannelInactive
    } else {
        TeardownKind::Close
    }
}

#[track_caller]
fn unreachable_from(method: &str, state: &ConnectionState) -> ! {
    unreachable!("csm.{method}() called from invalid state {state:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_proto_types::{Column, OracleType, QueryOptions, StatementContext, StatementKind, StatementOutcome};
    use tokio::sync::oneshot;

    struct FixedWidthFramer {
        width: usize,
    }

    impl ColumnFramer for FixedWidthFramer {
        fn frame_next_column(&self, _column: &Column, buf: &[u8]) -> Option<(Option<Bytes>, usize)> {
            if buf.len() < self.width {
                return None;
            }
            Some((Some(Bytes::copy_from_slice(&buf[..self.width])), self.width))
        }

        fn frame_bind_row_count(&self, buf: &[u8]) -> Option<(u32, usize)> {
            if buf.len() < 4 {
                return None;
            }
            Some((u32::from_be_bytes(buf[..4].try_into().unwrap()), 4))
        }
    }

    fn auth_ctx() -> AuthContext {
        AuthContext::new("scott", "tiger", "orclpdb1")
    }

    fn statement_task() -> (StatementTask, oneshot::Receiver<oracle_proto_types::Result<StatementOutcome>>) {
        let (tx, rx) = oneshot::channel();
        let ctx = StatementContext::new(StatementKind::Query, QueryOptions::default(), tx);
        (StatementTask { ctx }, rx)
    }

    fn one_column_describe() -> DescribeInfo {
        DescribeInfo {
            columns: vec![Column::new("VAL", OracleType::Varchar, 4)],
        }
    }

    /// Drives a fresh CSM through CONNECT/ACCEPT/PROTOCOL/DATA-TYPES and a
    /// full two-phase authentication, returning it parked in `Ready`.
    fn ready_csm() -> ConnectionStateMachine {
        let mut csm = ConnectionStateMachine::new();
        assert!(matches!(csm.connected(), Action::SendConnect));
        assert!(matches!(
            csm.accept_received(Capabilities { oob_capable: true }),
            Action::SendOob
        ));
        assert!(matches!(csm.oob_sent(), Action::SendMarker));
        assert!(matches!(csm.marker_received(), Action::SendProtocol));
        assert!(matches!(csm.protocol_received(), Action::SendDataTypes));
        assert!(matches!(
            csm.data_types_received(),
            Action::ProvideAuthenticationContext
        ));
        assert!(matches!(
            csm.provide_authentication_context(auth_ctx()),
            Action::SendAuthPhaseOne { .. }
        ));
        assert!(matches!(
            csm.parameter_received(ParameterSet::new()),
            Action::SendAuthPhaseTwo { .. }
        ));
        assert!(matches!(
            csm.parameter_received(ParameterSet::new()),
            Action::Authenticated { .. }
        ));
        csm
    }

    #[test]
    fn handshake_and_auth_reach_ready_with_empty_queue() {
        let csm = ready_csm();
        assert!(matches!(csm.state, ConnectionState::Ready));
        assert_eq!(csm.queued_task_count(), 0);
    }

    #[test]
    fn simple_query_runs_to_completion_and_returns_to_ready() {
        let mut csm = ready_csm();
        let (task, _rx) = statement_task();
        assert!(matches!(csm.enqueue(task), Action::SendExecute { .. }));
        assert!(matches!(
            csm.describe_info_received(one_column_describe()),
            Action::Wait
        ));
        assert!(matches!(
            csm.row_header_received(RowHeader::default()),
            Action::SucceedQuery { .. }
        ));

        let framer = FixedWidthFramer { width: 4 };
        assert!(matches!(
            csm.row_data_received(Bytes::from_static(b"test"), &framer),
            Action::Wait
        ));
        assert!(matches!(
            csm.backend_error_received(ServerError::new(
                oracle_proto_types::error::TNS_ERR_NO_DATA_FOUND,
                "no data found"
            )),
            Action::ForwardStreamComplete { .. }
        ));
        assert!(matches!(
            csm.ready_for_query_received(),
            Action::FireEventReadyForStatement
        ));
        assert!(matches!(csm.state, ConnectionState::Ready));
    }

    #[test]
    fn statements_enqueued_while_executing_run_serially() {
        let mut csm = ready_csm();
        let (first, _rx1) = statement_task();
        let (second, rx2) = statement_task();

        assert!(matches!(csm.enqueue(first), Action::SendExecute { .. }));
        assert!(matches!(csm.enqueue(second), Action::Wait));
        assert_eq!(csm.queued_task_count(), 1);

        csm.describe_info_received(one_column_describe());
        csm.row_header_received(RowHeader::default());
        csm.backend_error_received(ServerError::new(
            oracle_proto_types::error::TNS_ERR_NO_DATA_FOUND,
            "no data found",
        ));
        // The second statement starts the moment the first finishes its
        // round trip, ahead of the idle `FireEventReadyForStatement` signal.
        assert!(matches!(
            csm.ready_for_query_received(),
            Action::SendExecute { .. }
        ));
        assert_eq!(csm.queued_task_count(), 0);
        drop(rx2);
    }

    #[test]
    fn close_from_ready_sends_logoff_then_close_on_status() {
        let mut csm = ready_csm();
        let (tx, _rx) = oneshot::channel();
        assert!(matches!(csm.close(tx), Action::LogoffConnection));
        assert!(matches!(csm.state, ConnectionState::LoggingOff(_)));
        assert!(matches!(
            csm.status_received(0),
            Action::CloseConnection { .. }
        ));
        assert!(matches!(csm.state, ConnectionState::Closing));
    }

    #[test]
    fn second_close_during_logoff_forces_close_without_waiting_for_status() {
        let mut csm = ready_csm();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        csm.close(tx1);
        match csm.close(tx2) {
            Action::CloseConnection { completers } => assert_eq!(completers.len(), 2),
            other => panic!("unexpected action {other:?}"),
        }
        assert!(matches!(csm.state, ConnectionState::Closing));
    }

    #[test]
    fn close_while_executing_quiesces_then_tears_down_once_statement_completes() {
        let mut csm = ready_csm();
        let (task, _rx) = statement_task();
        csm.enqueue(task);

        let (tx, _rx_close) = oneshot::channel();
        assert!(matches!(csm.close(tx), Action::Wait));
        assert!(csm.is_quiescing());

        csm.describe_info_received(one_column_describe());
        csm.row_header_received(RowHeader::default());
        csm.backend_error_received(ServerError::new(
            oracle_proto_types::error::TNS_ERR_NO_DATA_FOUND,
            "no data found",
        ));
        match csm.ready_for_query_received() {
            Action::CloseConnectionAndCleanup(ctx) => {
                assert_eq!(ctx.close_completers.len(), 1);
                assert!(matches!(ctx.error, OracleError::ClientClosesConnection));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(!csm.is_quiescing());
        assert!(matches!(csm.state, ConnectionState::ReadyToLogOff));
    }

    #[test]
    fn enqueue_while_quiescing_fails_immediately() {
        let mut csm = ready_csm();
        let (running, _rx) = statement_task();
        csm.enqueue(running);
        let (tx, _rx_close) = oneshot::channel();
        csm.close(tx);

        let (queued, rx_queued) = statement_task();
        match csm.enqueue(queued) {
            Action::FailQuery { err, .. } => assert!(matches!(err, OracleError::ClientClosesConnection)),
            other => panic!("unexpected action {other:?}"),
        }
        drop(rx_queued);
    }

    #[test]
    fn oob_capable_accept_runs_probe_before_protocol_negotiation() {
        let mut csm = ConnectionStateMachine::new();
        assert!(matches!(csm.connected(), Action::SendConnect));
        assert!(matches!(
            csm.accept_received(Capabilities { oob_capable: true }),
            Action::SendOob
        ));
        assert!(matches!(csm.oob_sent(), Action::SendMarker));
        assert!(matches!(csm.marker_received(), Action::SendProtocol));
        assert!(matches!(csm.protocol_received(), Action::SendDataTypes));
    }

    #[test]
    fn oob_probe_declined_with_reset_oob_still_proceeds() {
        let mut csm = ConnectionStateMachine::new();
        csm.connected();
        assert!(matches!(
            csm.accept_received(Capabilities { oob_capable: true }),
            Action::SendOob
        ));
        assert!(matches!(csm.oob_sent(), Action::SendMarker));
        assert!(matches!(csm.reset_oob_received(), Action::SendProtocol));
        assert!(matches!(csm.protocol_received(), Action::SendDataTypes));
    }

    #[test]
    fn non_oob_capable_accept_skips_the_probe_entirely() {
        let mut csm = ConnectionStateMachine::new();
        csm.connected();
        assert!(matches!(
            csm.accept_received(Capabilities { oob_capable: false }),
            Action::SendProtocol
        ));
    }

    #[test]
    fn marker_received_toggles_without_resending() {
        let mut csm = ready_csm();
        assert!(matches!(csm.marker_received(), Action::SendMarker));
        assert!(matches!(csm.marker_received(), Action::Wait));
        assert!(matches!(csm.marker_received(), Action::SendMarker));
    }

    #[test]
    fn unexpected_message_while_ready_tears_down_the_connection() {
        let mut csm = ready_csm();
        match csm.describe_info_received(one_column_describe()) {
            Action::CloseConnectionAndCleanup(ctx) => {
                assert!(matches!(ctx.error, OracleError::UnexpectedBackendMessage(_)));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn transport_close_during_handshake_is_unclean_shutdown() {
        let mut csm = ConnectionStateMachine::new();
        csm.connected();
        match csm.closed() {
            Action::CloseConnectionAndCleanup(ctx) => {
                assert!(matches!(ctx.error, OracleError::UncleanShutdown));
                assert!(matches!(ctx.action, TeardownKind::FireChannelInactive));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn transport_close_after_logoff_fires_channel_inactive() {
        let mut csm = ready_csm();
        let (tx, _rx) = oneshot::channel();
        csm.close(tx);
        match csm.closed() {
            Action::FireChannelInactive { completers } => assert_eq!(completers.len(), 1),
            other => panic!("unexpected action {other:?}"),
        }
        assert!(matches!(csm.state, ConnectionState::Closed));
    }
}
