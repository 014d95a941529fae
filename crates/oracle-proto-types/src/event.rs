//! Typed inbound events: the closed surface the decoder hands to the
//! connection state machine in place of raw bytes.
//!
//! Producing these from wire bytes is the out-of-scope decoder's job; the
//! engine only ever consumes already-typed values.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::describe::DescribeInfo;
use crate::error::ServerError;
use crate::row::{BitVector, RowHeader};

/// A PARAMETER message payload: an ordered-by-key bag of name/value pairs.
///
/// `BTreeMap` rather than `HashMap` so two parameter sets with identical
/// content compare and render identically, which matters for scenario
/// tests that assert on emitted actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet(BTreeMap<String, String>);

impl ParameterSet {
    /// An empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a parameter set from an iterator of key/value pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Look up a parameter by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert or overwrite a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

/// Capabilities observed on the ACCEPT message's handshake blob, as far as
/// the engine cares (spec. §6 capability negotiation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether the server supports out-of-band attention signaling.
    pub oob_capable: bool,
}

/// Everything the decoder can hand to `ConnectionStateMachine` once a
/// complete inbound message is framed.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// ACCEPT: the server accepted the CONNECT request.
    Accept(Capabilities),
    /// RESEND: the server wants the last outbound message retransmitted.
    Resend,
    /// MARKER: an out-of-band marker frame, used to synchronize cancellation.
    Marker,
    /// RESET-OOB: the server does not support out-of-band signaling.
    ResetOob,
    /// STATUS: a call-status report, observed while logging off.
    Status { call_status: u32 },
    /// PARAMETER: a bag of server-provided name/value pairs.
    Parameter(ParameterSet),
    /// DESCRIBE-INFO: column metadata for an upcoming result set.
    DescribeInfo(DescribeInfo),
    /// ROW-HEADER: begins or continues a streaming result set.
    RowHeader(RowHeader),
    /// BIT-VECTOR: duplicate-column bitmap for the next row.
    BitVector(BitVector),
    /// ROW-DATA: one or more rows' worth of still-encoded column bytes.
    RowData(Bytes),
    /// QUERY-PARAMETER: an opaque parameter echoed back during PL/SQL binds.
    QueryParameter(Bytes),
    /// IO-VECTOR: an opaque scatter/gather descriptor for LOB streaming.
    IoVector(Bytes),
    /// SERVER-ERROR: the server reported an error for the in-flight call.
    ServerError(ServerError),
    /// READY-FOR-STATEMENT: the server is ready to accept the next call.
    ReadyForStatement,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_set_lookup_is_case_sensitive_and_ordered() {
        let params = ParameterSet::from_pairs([
            ("AUTH_SESSION_ID".to_string(), "52".to_string()),
            ("AUTH_SERIAL_NUM".to_string(), "11865".to_string()),
        ]);
        assert_eq!(params.get("AUTH_SESSION_ID"), Some("52"));
        assert_eq!(params.get("auth_session_id"), None);
    }
}
