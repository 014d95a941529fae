//! The ExtendedQueryStateMachine: drives one statement from submission
//! through DESCRIBE → EXECUTE → FETCH to completion.
//!
//! This is the largest machine in the crate because it owns the one piece
//! of genuine parsing-adjacent logic the engine performs: walking a
//! ROW-DATA payload column by column (via the external `ColumnFramer`)
//! and reassembling rows that straddle transport chunks.

use bytes::{Bytes, BytesMut};

use oracle_proto_types::{
    error::{TNS_ERR_ARRAY_DML_ERRORS, TNS_ERR_NO_DATA_FOUND, TNS_ERR_USER_CANCEL, TNS_ERR_VAR_NOT_IN_SELECT_LIST},
    Bind, BindDirection, Column, ColumnFramer, DescribeInfo, OracleError, Row, RowHeader,
    ServerError, StatementContext, StatementOutcome,
};

use crate::row_stream_buffer::{Demand, RowStreamBuffer};

/// Outward-facing result of a single EQSM step; the `ConnectionStateMachine`
/// maps these onto its own `Action` variants one-to-one or near enough
/// (spec. §4.1 EQSM action mapping).
#[derive(Debug)]
pub enum EqsmAction {
    /// (Re-)send EXECUTE, optionally with an updated describe.
    SendExecute { describe: Option<DescribeInfo> },
    /// Request the next batch of rows.
    SendFetch,
    /// Fail the statement's completer.
    FailQuery { err: OracleError },
    /// Resolve the statement's completer successfully.
    SucceedQuery { result: StatementOutcome },
    /// The current row-data message is incomplete; more bytes are needed.
    NeedMoreData,
    /// Deliver a batch of rows to the caller's stream.
    ForwardRows { rows: Vec<Row> },
    /// The stream completed normally.
    ForwardStreamComplete { rows: Vec<Row> },
    /// The stream terminated with an error.
    ForwardStreamError {
        err: OracleError,
        read: bool,
        cursor_id: Option<u32>,
        client_cancelled: bool,
    },
    /// A caller-initiated cancellation was fully acknowledged by the server.
    ForwardCancelComplete,
    /// PL/SQL OUT-bind values accumulated for this execution.
    ForwardOutBinds,
    /// Request more transport bytes.
    Read,
    /// No action required.
    Wait,
    /// An error was observed that must be evaluated for its effect on the
    /// whole connection (closing it or not), not just this statement.
    EvaluateErrorAtConnectionLevel { err: OracleError },
}

/// EQSM's state (spec. §3 `EQSMState`).
enum EqsmState {
    Initialized,
    DescribeInfoReceived(DescribeInfo),
    Streaming(DescribeInfo, RowHeader, RowStreamBuffer),
    StreamingAndWaiting(DescribeInfo, RowHeader, RowStreamBuffer, BytesMut),
    Drain(DescribeInfo),
    CommandComplete,
    Error(OracleError),
    /// Transient placeholder; see `crate::marker`.
    Modifying,
}

impl std::fmt::Debug for EqsmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "Initialized"),
            Self::DescribeInfoReceived(_) => write!(f, "DescribeInfoReceived"),
            Self::Streaming(..) => write!(f, "Streaming"),
            Self::StreamingAndWaiting(..) => write!(f, "StreamingAndWaiting"),
            Self::Drain(_) => write!(f, "Drain"),
            Self::CommandComplete => write!(f, "CommandComplete"),
            Self::Error(e) => write!(f, "Error({e})"),
            Self::Modifying => write!(f, "Modifying"),
        }
    }
}

/// Drives one statement. Owned exclusively by the `ConnectionStateMachine`
/// while the connection is in its `executing` state; dropped once
/// `is_complete()` is true and the server confirms READY-FOR-STATEMENT.
pub struct ExtendedQueryStateMachine {
    state: EqsmState,
    ctx: StatementContext,
}

impl std::fmt::Debug for ExtendedQueryStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedQueryStateMachine")
            .field("state", &self.state)
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl ExtendedQueryStateMachine {
    /// Construct the machine; call `start()` to produce the first action.
    #[must_use]
    pub fn new(ctx: StatementContext) -> Self {
        Self {
            state: EqsmState::Initialized,
            ctx,
        }
    }

    /// Whether this statement has reached a terminal substate.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, EqsmState::CommandComplete | EqsmState::Error(_))
    }

    /// The statement's shared context.
    #[must_use]
    pub fn ctx(&self) -> &StatementContext {
        &self.ctx
    }

    /// Begin execution: emits the first EXECUTE.
    pub fn start(&mut self) -> EqsmAction {
        debug_assert!(matches!(self.state, EqsmState::Initialized));
        tracing::debug!("eqsm: sending execute");
        EqsmAction::SendExecute { describe: None }
    }

    /// A DESCRIBE-INFO message arrived ahead of the first ROW-HEADER.
    pub fn describe_info_received(&mut self, describe: DescribeInfo) -> EqsmAction {
        match std::mem::replace(&mut self.state, EqsmState::Modifying) {
            EqsmState::Initialized => {
                self.ctx.set_describe(describe.clone());
                self.state = EqsmState::DescribeInfoReceived(describe);
                EqsmAction::Wait
            }
            other => unreachable_from("describe_info_received", other),
        }
    }

    /// A ROW-HEADER arrived: begins streaming on the first occurrence,
    /// otherwise just updates the current header.
    pub fn row_header_received(&mut self, header: RowHeader) -> EqsmAction {
        match std::mem::replace(&mut self.state, EqsmState::Modifying) {
            EqsmState::DescribeInfoReceived(describe) => {
                let result = StatementOutcome::Query(describe.clone());
                self.state = EqsmState::Streaming(describe, header, RowStreamBuffer::new());
                EqsmAction::SucceedQuery { result }
            }
            EqsmState::Streaming(describe, mut current, buffer) => {
                current.merge_from(header);
                self.state = EqsmState::Streaming(describe, current, buffer);
                EqsmAction::Wait
            }
            EqsmState::StreamingAndWaiting(describe, mut current, buffer, partial) => {
                current.merge_from(header);
                self.state = EqsmState::StreamingAndWaiting(describe, current, buffer, partial);
                EqsmAction::Wait
            }
            other => unreachable_from("row_header_received", other),
        }
    }

    /// A BIT-VECTOR arrived: attaches to the current row header.
    pub fn bit_vector_received(&mut self, bit_vector: oracle_proto_types::BitVector) -> EqsmAction {
        match &mut self.state {
            EqsmState::Streaming(_, header, _) | EqsmState::StreamingAndWaiting(_, header, _, _) => {
                header.bit_vector = Some(bit_vector);
                EqsmAction::Wait
            }
            other => unreachable_from("bit_vector_received", std::mem::replace(other, EqsmState::Modifying)),
        }
    }

    /// ROW-DATA arrived. In `Initialized`, reinterpreted as PL/SQL OUT-bind
    /// values; while streaming, parsed into rows via `framer`.
    pub fn row_data_received(&mut self, buf: Bytes, framer: &dyn ColumnFramer) -> EqsmAction {
        match std::mem::replace(&mut self.state, EqsmState::Modifying) {
            EqsmState::Initialized => {
                self.apply_out_binds(&buf, framer);
                self.state = EqsmState::Initialized;
                EqsmAction::ForwardOutBinds
            }
            EqsmState::Streaming(describe, header, mut buffer) => {
                match parse_rows(&describe, &header, &buf, framer, &mut buffer) {
                    ParseOutcome::Consumed => {
                        self.state = EqsmState::Streaming(describe, header, buffer);
                        EqsmAction::Wait
                    }
                    ParseOutcome::Partial(remainder) => {
                        self.state = EqsmState::StreamingAndWaiting(describe, header, buffer, remainder);
                        EqsmAction::NeedMoreData
                    }
                }
            }
            EqsmState::StreamingAndWaiting(describe, header, mut buffer, mut partial) => {
                partial.extend_from_slice(&buf);
                match parse_rows(&describe, &header, &partial.split().freeze(), framer, &mut buffer) {
                    ParseOutcome::Consumed => {
                        self.state = EqsmState::Streaming(describe, header, buffer);
                        EqsmAction::Wait
                    }
                    ParseOutcome::Partial(remainder) => {
                        self.state = EqsmState::StreamingAndWaiting(describe, header, buffer, remainder);
                        EqsmAction::NeedMoreData
                    }
                }
            }
            other => unreachable_from("row_data_received", other),
        }
    }

    /// Further transport bytes arrived for a row-data message that was
    /// left incomplete by a previous call.
    pub fn chunk_received(&mut self, buf: Bytes, framer: &dyn ColumnFramer) -> EqsmAction {
        self.row_data_received(buf, framer)
    }

    fn apply_out_binds(&self, buf: &[u8], framer: &dyn ColumnFramer) {
        let mut binds = self.ctx.binds.borrow_mut();
        let mut cursor = 0usize;
        for bind in binds.iter_mut() {
            if bind.metadata.direction == BindDirection::In {
                continue;
            }
            let Some((row_count, consumed)) = framer.frame_bind_row_count(&buf[cursor..]) else {
                break;
            };
            cursor += consumed;
            let mut out = BytesMut::new();
            for _ in 0..row_count {
                let column = Column::new("", oracle_proto_types::OracleType::Other(0), bind.metadata.max_size);
                let Some((value, consumed)) = framer.frame_next_column(&column, &buf[cursor..]) else {
                    break;
                };
                cursor += consumed;
                if let Some(value) = value {
                    out.extend_from_slice(&value);
                }
            }
            bind.value = Some(out.freeze());
        }
    }

    /// A SERVER-ERROR arrived. Handles end-of-data sentinels, the
    /// describe-driven LOB re-execute path, var-not-in-select-list, and
    /// user-cancel absorption, per spec. §4.3.
    pub fn backend_error_received(&mut self, err: ServerError) -> EqsmAction {
        if err.cursor_id != 0 {
            self.ctx.set_cursor_id(err.cursor_id);
        }

        match std::mem::replace(&mut self.state, EqsmState::Modifying) {
            EqsmState::Initialized | EqsmState::DescribeInfoReceived(_) => {
                self.pre_stream_error(err)
            }
            EqsmState::Streaming(describe, _header, mut buffer)
            | EqsmState::StreamingAndWaiting(describe, _header, mut buffer, _) => {
                if is_end_of_data(err.number) {
                    let rows = buffer.end();
                    self.state = EqsmState::CommandComplete;
                    EqsmAction::ForwardStreamComplete { rows }
                } else {
                    // Variable-not-in-select-list on an active stream carries
                    // the cursor id forward so the dispatcher can issue a
                    // cursor-close in a subsequent round trip (spec. §4.3),
                    // unlike the generic stream-error case below.
                    let cursor_id = if err.number == TNS_ERR_VAR_NOT_IN_SELECT_LIST {
                        Some(self.ctx.cursor_id())
                    } else {
                        None
                    };
                    let demand = buffer.fail();
                    self.state = EqsmState::Error(OracleError::Server(err.clone()));
                    EqsmAction::ForwardStreamError {
                        err: OracleError::Server(err),
                        read: demand == Demand::Read,
                        cursor_id,
                        client_cancelled: false,
                    }
                }
            }
            EqsmState::Drain(_describe) => {
                if err.number == TNS_ERR_USER_CANCEL {
                    self.state = EqsmState::CommandComplete;
                    EqsmAction::ForwardCancelComplete
                } else {
                    let wrapped = OracleError::Server(err);
                    self.state = EqsmState::Error(wrapped.clone());
                    EqsmAction::EvaluateErrorAtConnectionLevel { err: wrapped }
                }
            }
            other @ (EqsmState::CommandComplete | EqsmState::Error(_)) => {
                unreachable_from("backend_error_received", other)
            }
            EqsmState::Modifying => crate::marker::unreachable_modifying("EQSM"),
        }
    }

    fn pre_stream_error(&mut self, err: ServerError) -> EqsmAction {
        if err.number == TNS_ERR_VAR_NOT_IN_SELECT_LIST {
            let wrapped = OracleError::Server(err);
            self.state = EqsmState::Error(wrapped.clone());
            return EqsmAction::FailQuery { err: wrapped };
        }

        let describe = err.describe.clone();
        let wants_inline_lobs = self.ctx.options.fetch_lobs_inline;
        if let Some(describe) = describe {
            if describe.has_lob_columns() && !wants_inline_lobs {
                let rewritten = describe.rewrite_lobs_as_long();
                self.ctx.set_describe(rewritten.clone());
                self.state = EqsmState::Initialized;
                return EqsmAction::SendExecute {
                    describe: Some(rewritten),
                };
            }
        }

        let wrapped = OracleError::Server(err);
        self.state = EqsmState::Error(wrapped.clone());
        EqsmAction::FailQuery { err: wrapped }
    }

    /// Caller requested cancellation.
    pub fn cancel(&mut self) -> EqsmAction {
        match std::mem::replace(&mut self.state, EqsmState::Modifying) {
            EqsmState::Initialized => {
                self.state = EqsmState::Error(OracleError::QueryCancelled);
                EqsmAction::FailQuery {
                    err: OracleError::QueryCancelled,
                }
            }
            EqsmState::DescribeInfoReceived(_) => {
                self.state = EqsmState::Error(OracleError::QueryCancelled);
                EqsmAction::FailQuery {
                    err: OracleError::QueryCancelled,
                }
            }
            EqsmState::Streaming(describe, _header, mut buffer)
            | EqsmState::StreamingAndWaiting(describe, _header, mut buffer, _) => {
                let demand = buffer.fail();
                self.state = EqsmState::Drain(describe);
                EqsmAction::ForwardStreamError {
                    err: OracleError::QueryCancelled,
                    read: demand == Demand::Read,
                    cursor_id: None,
                    client_cancelled: true,
                }
            }
            other @ (EqsmState::Drain(_) | EqsmState::CommandComplete | EqsmState::Error(_)) => {
                self.state = other;
                EqsmAction::Wait
            }
            EqsmState::Modifying => crate::marker::unreachable_modifying("EQSM"),
        }
    }

    /// The connection layer observed a transport-level error while this
    /// statement was in flight (`setAndFireError`, spec. §4.3).
    pub fn error_happened(&mut self, err: OracleError) -> EqsmAction {
        match std::mem::replace(&mut self.state, EqsmState::Modifying) {
            EqsmState::Initialized | EqsmState::DescribeInfoReceived(_) => {
                if matches!(err, OracleError::QueryCancelled) {
                    // The statement's completer was already failed by cancel();
                    // avoid double-completing it.
                    self.state = EqsmState::Error(err.clone());
                    EqsmAction::EvaluateErrorAtConnectionLevel { err }
                } else {
                    self.state = EqsmState::Error(err.clone());
                    EqsmAction::FailQuery { err }
                }
            }
            EqsmState::Drain(_) => {
                self.state = EqsmState::Error(err.clone());
                EqsmAction::EvaluateErrorAtConnectionLevel { err }
            }
            EqsmState::Streaming(_, _, mut buffer) | EqsmState::StreamingAndWaiting(_, _, mut buffer, _) => {
                let demand = buffer.fail();
                self.state = EqsmState::Error(err.clone());
                EqsmAction::ForwardStreamError {
                    err,
                    read: demand == Demand::Read,
                    cursor_id: None,
                    client_cancelled: false,
                }
            }
            other @ (EqsmState::CommandComplete | EqsmState::Error(_)) => {
                unreachable_from("error_happened", other)
            }
            EqsmState::Modifying => crate::marker::unreachable_modifying("EQSM"),
        }
    }

    /// The caller asked for more rows.
    pub fn request_query_rows(&mut self) -> EqsmAction {
        match &self.state {
            EqsmState::Streaming(_, _, buffer) | EqsmState::StreamingAndWaiting(_, _, buffer, _) => {
                match buffer.demand_more_response_body_parts() {
                    Demand::Read => EqsmAction::Read,
                    Demand::Wait => EqsmAction::Wait,
                }
            }
            _ => EqsmAction::Wait,
        }
    }

    /// The transport signaled it has no more bytes immediately available;
    /// release whatever the buffer is holding.
    pub fn channel_read_complete(&mut self) -> EqsmAction {
        match &mut self.state {
            EqsmState::Streaming(_, _, buffer) | EqsmState::StreamingAndWaiting(_, _, buffer, _) => {
                match buffer.channel_read_complete() {
                    Some(rows) => EqsmAction::ForwardRows { rows },
                    None => EqsmAction::Wait,
                }
            }
            _ => EqsmAction::Wait,
        }
    }

    /// Plumbing signal that a read event landed; mirrors
    /// `request_query_rows` for the raw transport-readiness call site.
    pub fn read_event_caught(&mut self) -> EqsmAction {
        match &self.state {
            EqsmState::Streaming(_, _, buffer) | EqsmState::StreamingAndWaiting(_, _, buffer, _) => match buffer.read() {
                Demand::Read => EqsmAction::Read,
                Demand::Wait => EqsmAction::Wait,
            },
            _ => EqsmAction::Wait,
        }
    }
}

#[track_caller]
fn unreachable_from(method: &str, state: EqsmState) -> ! {
    unreachable!("eqsm.{method}() called from invalid state {state:?}")
}

fn is_end_of_data(number: i32) -> bool {
    number == TNS_ERR_NO_DATA_FOUND || number == TNS_ERR_ARRAY_DML_ERRORS
}

enum ParseOutcome {
    Consumed,
    Partial(BytesMut),
}

/// Parse as many complete rows as possible out of `buf`, appending each to
/// `buffer`. Any trailing bytes that do not yet form a complete row are
/// returned as `Partial` for the caller to stash and retry once more bytes
/// arrive (spec. §4.3 step 4-5, §6 chunk reassembly).
fn parse_rows(
    describe: &DescribeInfo,
    header: &RowHeader,
    buf: &Bytes,
    framer: &dyn ColumnFramer,
    buffer: &mut RowStreamBuffer,
) -> ParseOutcome {
    let mut offset = 0usize;
    loop {
        match parse_one_row(describe, header, &buf[offset..], framer, buffer) {
            Some(consumed) if consumed == 0 => break,
            Some(consumed) => offset += consumed,
            None => {
                let mut remainder = BytesMut::new();
                remainder.extend_from_slice(&buf[offset..]);
                return ParseOutcome::Partial(remainder);
            }
        }
        if offset >= buf.len() {
            break;
        }
    }
    ParseOutcome::Consumed
}

fn parse_one_row(
    describe: &DescribeInfo,
    header: &RowHeader,
    buf: &[u8],
    framer: &dyn ColumnFramer,
    buffer: &mut RowStreamBuffer,
) -> Option<usize> {
    if buf.is_empty() {
        return Some(0);
    }
    let mut offset = 0usize;
    let mut columns = Vec::with_capacity(describe.columns.len());
    for (index, column) in describe.columns.iter().enumerate() {
        let is_duplicate = header
            .bit_vector
            .as_ref()
            .is_some_and(|bv| bv.is_duplicate(index));
        if is_duplicate {
            columns.push(buffer.received_duplicate(index));
            continue;
        }
        let (value, consumed) = framer.frame_next_column(column, &buf[offset..])?;
        offset += consumed;
        columns.push(value);
    }
    buffer.received_row(Row::new(columns));
    Some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_proto_types::{BindMetadata, Column, OracleType, QueryOptions, StatementKind};
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

    fn query_ctx() -> StatementContext {
        let (tx, _rx) = oneshot::channel();
        StatementContext::new(StatementKind::Query, QueryOptions::default(), tx)
    }

    fn one_column_describe() -> DescribeInfo {
        DescribeInfo {
            columns: vec![Column::new("VAL", OracleType::Varchar, 4)],
        }
    }

    #[test]
    fn happy_path_query_emits_succeed_then_rows_then_complete() {
        let mut eqsm = ExtendedQueryStateMachine::new(query_ctx());
        assert!(matches!(eqsm.start(), EqsmAction::SendExecute { describe: None }));
        assert!(matches!(
            eqsm.describe_info_received(one_column_describe()),
            EqsmAction::Wait
        ));
        assert!(matches!(
            eqsm.row_header_received(RowHeader::default()),
            EqsmAction::SucceedQuery { .. }
        ));

        let framer = FixedWidthFramer { width: 4 };
        assert!(matches!(
            eqsm.row_data_received(Bytes::from_static(b"test"), &framer),
            EqsmAction::Wait
        ));

        let action = eqsm.backend_error_received(ServerError::new(TNS_ERR_NO_DATA_FOUND, "no data found"));
        match action {
            EqsmAction::ForwardStreamComplete { rows } => assert_eq!(rows.len(), 1),
            other => panic!("unexpected action {other:?}"),
        }
        assert!(eqsm.is_complete());
    }

    #[test]
    fn partial_row_across_chunks_reassembles() {
        let mut eqsm = ExtendedQueryStateMachine::new(query_ctx());
        eqsm.start();
        eqsm.describe_info_received(one_column_describe());
        eqsm.row_header_received(RowHeader::default());

        let framer = FixedWidthFramer { width: 4 };
        let action = eqsm.row_data_received(Bytes::from_static(b"te"), &framer);
        assert!(matches!(action, EqsmAction::NeedMoreData));

        let action = eqsm.chunk_received(Bytes::from_static(b"st"), &framer);
        assert!(matches!(action, EqsmAction::Wait));
    }

    #[test]
    fn cancel_mid_stream_drains_and_absorbs_user_cancel() {
        let mut eqsm = ExtendedQueryStateMachine::new(query_ctx());
        eqsm.start();
        eqsm.describe_info_received(one_column_describe());
        eqsm.row_header_received(RowHeader::default());

        let action = eqsm.cancel();
        match action {
            EqsmAction::ForwardStreamError {
                err: OracleError::QueryCancelled,
                client_cancelled: true,
                ..
            } => {}
            other => panic!("unexpected action {other:?}"),
        }

        let action = eqsm.backend_error_received(ServerError::new(TNS_ERR_USER_CANCEL, "user requested cancel"));
        assert!(matches!(action, EqsmAction::ForwardCancelComplete));
        assert!(eqsm.is_complete());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut eqsm = ExtendedQueryStateMachine::new(query_ctx());
        eqsm.start();
        eqsm.cancel();
        assert!(matches!(eqsm.cancel(), EqsmAction::Wait));
    }

    #[test]
    fn empty_result_set_succeeds_with_no_rows() {
        let mut eqsm = ExtendedQueryStateMachine::new(query_ctx());
        eqsm.start();
        let action = eqsm.backend_error_received(ServerError::new(TNS_ERR_NO_DATA_FOUND, "no data found"));
        assert!(matches!(action, EqsmAction::FailQuery { .. }) || matches!(action, EqsmAction::ForwardStreamComplete { .. }));
    }

    #[test]
    fn var_not_in_select_list_fails_statement_on_initial_execute() {
        let mut eqsm = ExtendedQueryStateMachine::new(query_ctx());
        eqsm.start();
        let action =
            eqsm.backend_error_received(ServerError::new(TNS_ERR_VAR_NOT_IN_SELECT_LIST, "not in select list"));
        assert!(matches!(action, EqsmAction::FailQuery { .. }));
        assert!(eqsm.is_complete());
    }

    #[test]
    fn var_not_in_select_list_on_active_stream_carries_cursor_id() {
        let mut eqsm = ExtendedQueryStateMachine::new(query_ctx());
        eqsm.start();
        eqsm.describe_info_received(one_column_describe());
        eqsm.row_header_received(RowHeader::default());

        let err = ServerError::new(TNS_ERR_VAR_NOT_IN_SELECT_LIST, "not in select list").with_cursor_id(9);
        let action = eqsm.backend_error_received(err);
        match action {
            EqsmAction::ForwardStreamError { cursor_id, .. } => assert_eq!(cursor_id, Some(9)),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn lob_describe_triggers_rewritten_reexecute() {
        let (tx, _rx) = oneshot::channel();
        let mut options = QueryOptions::default();
        options.fetch_lobs_inline = false;
        let ctx = StatementContext::new(StatementKind::Query, options, tx);
        let mut eqsm = ExtendedQueryStateMachine::new(ctx);
        eqsm.start();

        let lob_describe = DescribeInfo {
            columns: vec![Column::new("DOC", OracleType::Clob, 0)],
        };
        let err = ServerError::new(4068, "cursor invalidated")
            .with_cursor_id(7)
            .with_describe(lob_describe);
        let action = eqsm.backend_error_received(err);
        match action {
            EqsmAction::SendExecute { describe: Some(d) } => {
                assert_eq!(d.columns[0].oracle_type, OracleType::Long);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn out_binds_are_accumulated_in_initialized_state() {
        let (tx, _rx) = oneshot::channel();
        let ctx = StatementContext::new(StatementKind::PlSqlBlock, QueryOptions::default(), tx);
        ctx.set_binds(vec![Bind {
            metadata: BindMetadata {
                position: 0,
                direction: BindDirection::Out,
                max_size: 32,
            },
            value: None,
        }]);
        let mut eqsm = ExtendedQueryStateMachine::new(ctx.clone());
        eqsm.start();

        let framer = FixedWidthFramer { width: 4 };
        let mut payload = BytesMut::new();
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(b"test");
        let action = eqsm.row_data_received(payload.freeze(), &framer);
        assert!(matches!(action, EqsmAction::ForwardOutBinds));
        assert_eq!(ctx.binds.borrow()[0].value.as_deref(), Some(&b"test"[..]));
    }
}
