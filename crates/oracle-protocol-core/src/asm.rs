//! The two-phase authentication exchange.

use oracle_proto_types::{AuthContext, OracleError, ParameterSet};

/// Outward-facing result of a single ASM step: the `ConnectionStateMachine`
/// maps each of these onto one of its own `Action` variants (spec. §4.1
/// ASM action mapping).
#[derive(Debug)]
pub enum AsmAction {
    /// Send phase one of the AUTH exchange.
    SendAuthPhaseOne {
        ctx: AuthContext,
        cookie: Option<bytes::Bytes>,
    },
    /// Send phase two of the AUTH exchange.
    SendAuthPhaseTwo { ctx: AuthContext, params: ParameterSet },
    /// Authentication succeeded.
    Authenticated { params: ParameterSet },
    /// Authentication failed; the connection must be torn down.
    ReportAuthError { err: OracleError },
}

/// ASM's state (spec. §3 `ASMState`).
#[derive(Debug)]
enum AsmState {
    Initialized,
    PhaseOneSent,
    PhaseTwoSent,
    Authenticated,
    Error(OracleError),
}

/// Drives the two-phase AUTH handshake for one connection attempt.
///
/// Owned exclusively by the `ConnectionStateMachine` while the connection
/// is in its `authenticating` state; dropped once `is_complete()` is true.
#[derive(Debug)]
pub struct AuthenticationStateMachine {
    state: AsmState,
    auth_context: AuthContext,
}

impl AuthenticationStateMachine {
    /// Construct the machine; call `start()` to produce the first action.
    #[must_use]
    pub fn new(auth_context: AuthContext) -> Self {
        Self {
            state: AsmState::Initialized,
            auth_context,
        }
    }

    /// Whether the exchange has reached a terminal substate.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, AsmState::Authenticated | AsmState::Error(_))
    }

    /// Begin the exchange: from `Initialized`, emits phase one.
    pub fn start(&mut self) -> AsmAction {
        match &self.state {
            AsmState::Initialized => {
                self.state = AsmState::PhaseOneSent;
                tracing::debug!("asm: sending auth phase one");
                AsmAction::SendAuthPhaseOne {
                    ctx: self.auth_context.clone(),
                    cookie: None,
                }
            }
            other => unreachable!("asm.start() called from {other:?}"),
        }
    }

    /// A PARAMETER message arrived; advances phase one→two, or
    /// phase two→authenticated.
    pub fn parameter_received(&mut self, params: ParameterSet) -> AsmAction {
        match &self.state {
            AsmState::PhaseOneSent => {
                self.state = AsmState::PhaseTwoSent;
                tracing::debug!("asm: sending auth phase two");
                AsmAction::SendAuthPhaseTwo {
                    ctx: self.auth_context.clone(),
                    params,
                }
            }
            AsmState::PhaseTwoSent => {
                self.state = AsmState::Authenticated;
                tracing::debug!("asm: authenticated");
                AsmAction::Authenticated { params }
            }
            other => unreachable!("asm.parameter_received() called from {other:?}"),
        }
    }

    /// A SERVER-ERROR arrived during authentication.
    pub fn error_received(&mut self, err: OracleError) -> AsmAction {
        self.fail(err)
    }

    /// The connection layer observed an error (e.g. transport failure)
    /// while authentication was in flight.
    pub fn error_happened(&mut self, err: OracleError) -> AsmAction {
        self.fail(err)
    }

    fn fail(&mut self, err: OracleError) -> AsmAction {
        match &self.state {
            AsmState::PhaseOneSent | AsmState::PhaseTwoSent => {
                tracing::warn!(error = %err, "asm: authentication failed");
                self.state = AsmState::Error(err.clone());
                AsmAction::ReportAuthError { err }
            }
            other => unreachable!("asm error path called from {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_proto_types::ServerError;

    fn ctx() -> AuthContext {
        AuthContext::new("scott", "tiger", "orclpdb1")
    }

    #[test]
    fn happy_path_reaches_authenticated() {
        let mut asm = AuthenticationStateMachine::new(ctx());
        assert!(matches!(asm.start(), AsmAction::SendAuthPhaseOne { .. }));
        assert!(matches!(
            asm.parameter_received(ParameterSet::new()),
            AsmAction::SendAuthPhaseTwo { .. }
        ));
        assert!(matches!(
            asm.parameter_received(ParameterSet::new()),
            AsmAction::Authenticated { .. }
        ));
        assert!(asm.is_complete());
    }

    #[test]
    fn error_during_phase_one_reports_and_completes() {
        let mut asm = AuthenticationStateMachine::new(ctx());
        asm.start();
        let action = asm.error_received(OracleError::Server(ServerError::new(1017, "invalid credential")));
        assert!(matches!(action, AsmAction::ReportAuthError { .. }));
        assert!(asm.is_complete());
    }
}
