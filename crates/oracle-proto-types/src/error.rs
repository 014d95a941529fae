//! Error taxonomy for the protocol engine.
//!
//! These are error *kinds*, not wrapped transport errors: the dispatcher is
//! expected to classify whatever it observes (IO errors, decode failures,
//! server responses) into one of these before handing it to the engine.

use thiserror::Error;

/// Oracle error numbers the engine interprets directly (spec. §6).
///
/// ORA-01403: no rows matched a query / array DML boundary reached.
pub const TNS_ERR_NO_DATA_FOUND: i32 = 1403;
/// ORA-24381: one or more array DML operations failed (batch-error sentinel).
pub const TNS_ERR_ARRAY_DML_ERRORS: i32 = 24381;
/// ORA-01007: a bind variable is not in the cursor's select list (describe went stale).
pub const TNS_ERR_VAR_NOT_IN_SELECT_LIST: i32 = 1007;
/// ORA-01013: the user requested cancellation of the current operation.
pub const TNS_ERR_USER_CANCEL: i32 = 1013;

/// Server error numbers considered transient: a retry of the same
/// statement may succeed without any client-side corrective action.
const TRANSIENT_SERVER_ERRORS: &[i32] = &[
    12528, // TNS:listener: all appropriate instances are blocking new connections
    12537, // TNS:connection closed
    3113,  // end-of-file on communication channel
    3135,  // connection lost contact
];

/// A server-reported error, as relayed by the decoder.
///
/// Carries just enough structure for the engine to classify and route the
/// error; the human-readable message and any vendor-specific detail are
/// opaque strings the engine never parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// ORA-NNNNN error number.
    pub number: i32,
    /// Human-readable message as sent by the server.
    pub message: String,
    /// Cursor id this error pertains to, if any (0 means "none").
    pub cursor_id: u32,
    /// Describe information bundled with certain EXECUTE-time errors (used
    /// by the LOB-describe-rewrite path, spec. §4.3).
    pub describe: Option<crate::describe::DescribeInfo>,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ORA-{:05}: {}", self.number, self.message)
    }
}

impl ServerError {
    /// Create a bare server error with no cursor id or bundled describe.
    #[must_use]
    pub fn new(number: i32, message: impl Into<String>) -> Self {
        Self {
            number,
            message: message.into(),
            cursor_id: 0,
            describe: None,
        }
    }

    /// Attach a cursor id, returning `self` for chaining.
    #[must_use]
    pub fn with_cursor_id(mut self, cursor_id: u32) -> Self {
        self.cursor_id = cursor_id;
        self
    }

    /// Attach bundled describe information, returning `self` for chaining.
    #[must_use]
    pub fn with_describe(mut self, describe: crate::describe::DescribeInfo) -> Self {
        self.describe = Some(describe);
        self
    }
}

/// The error taxonomy the protocol engine classifies every failure into.
///
/// These are kinds, not wrapped transport types (spec. §7): the dispatcher
/// owns translating IO errors, TLS errors, and decode failures into one of
/// these before calling into the engine.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// The transport is unusable (connect failure, reset, broken pipe).
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// The transport disappeared without a clean LOGOFF/CLOSE handshake.
    #[error("unclean shutdown")]
    UncleanShutdown,

    /// A message could not be decoded from the byte stream.
    #[error("message decoding failure: {0}")]
    MessageDecodingFailure(String),

    /// An inbound message arrived that is not valid in the current state.
    #[error("unexpected backend message: {0}")]
    UnexpectedBackendMessage(String),

    /// The server reported an error for the in-flight operation.
    #[error("{0}")]
    Server(#[from] ServerError),

    /// The caller cancelled the in-flight query.
    #[error("query cancelled")]
    QueryCancelled,

    /// The client is closing the connection; queued work is being failed.
    #[error("client closes connection")]
    ClientClosesConnection,

    /// The client already closed the connection.
    #[error("client closed connection")]
    ClientClosedConnection,
}

impl OracleError {
    /// Whether observing this error at the connection level requires
    /// tearing down the transport (spec. §4.1 `shouldCloseConnection`).
    ///
    /// `Server` errors are not classified here: callers decide on a
    /// case-by-case basis (pre-stream fail vs. post-stream forward), and
    /// the two client-closing kinds never originate inside the engine.
    #[must_use]
    pub fn should_close_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::MessageDecodingFailure(_)
                | Self::UnexpectedBackendMessage(_)
                | Self::UncleanShutdown
        )
    }

    /// Whether this error indicates the shutdown path should report
    /// `fireChannelInactive` (transport already gone) rather than `close`.
    #[must_use]
    pub fn is_unclean_shutdown(&self) -> bool {
        matches!(self, Self::UncleanShutdown)
    }

    /// Whether a retry of the same statement, unmodified, might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::UncleanShutdown => true,
            Self::Server(e) => TRANSIENT_SERVER_ERRORS.contains(&e.number),
            _ => false,
        }
    }

    /// Whether `self` is the specific server error `number`.
    #[must_use]
    pub fn is_server_error(&self, number: i32) -> bool {
        matches!(self, Self::Server(e) if e.number == number)
    }
}

/// Result type used throughout the protocol engine.
pub type Result<T> = std::result::Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_close_connection_matches_spec_kinds() {
        assert!(OracleError::ConnectionError("reset".into()).should_close_connection());
        assert!(OracleError::MessageDecodingFailure("truncated".into()).should_close_connection());
        assert!(OracleError::UnexpectedBackendMessage("rowData".into()).should_close_connection());
        assert!(OracleError::UncleanShutdown.should_close_connection());
        assert!(!OracleError::QueryCancelled.should_close_connection());
        let server = ServerError::new(942, "table or view does not exist");
        assert!(!OracleError::Server(server).should_close_connection());
    }

    #[test]
    fn transient_server_errors_classified() {
        let transient = ServerError::new(3113, "end-of-file on communication channel");
        assert!(OracleError::Server(transient).is_transient());
        let terminal = ServerError::new(942, "table or view does not exist");
        assert!(!OracleError::Server(terminal).is_transient());
    }

    #[test]
    fn is_server_error_checks_number() {
        let err = OracleError::Server(ServerError::new(1403, "no data found"));
        assert!(err.is_server_error(1403));
        assert!(!err.is_server_error(1));
    }
}
