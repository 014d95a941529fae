//! Small, reusable test fixtures shared by scenario tests.
//!
//! Grounded on the teacher's `mssql-testing::fixtures::TestFixture`: plain
//! constructors for commonly needed values, kept deliberately minimal since
//! this engine has no database to seed.

use bytes::Bytes;
use oracle_protocol_core::StatementTask;
use oracle_proto_types::{
    AuthContext, Column, ColumnFramer, DescribeInfo, OracleType, QueryOptions, StatementContext, StatementKind,
    StatementOutcome,
};
use tokio::sync::oneshot;

/// A plain username/password auth context for `scott/tiger@orclpdb1`, the
/// canonical Oracle sample schema credentials used throughout the seed
/// scenarios.
#[must_use]
pub fn scott_tiger_auth() -> AuthContext {
    AuthContext::new("scott", "tiger", "orclpdb1")
}

/// A single-column `VARCHAR2` describe, as returned for `SELECT 'test' FROM
/// dual`.
#[must_use]
pub fn single_varchar_describe(column_name: &str, width: u32) -> DescribeInfo {
    DescribeInfo {
        columns: vec![Column::new(column_name, OracleType::Varchar, width)],
    }
}

/// Build a fresh query [`StatementTask`] plus the receiver for its outcome.
#[must_use]
pub fn query_task() -> (StatementTask, oneshot::Receiver<oracle_proto_types::Result<StatementOutcome>>) {
    let (tx, rx) = oneshot::channel();
    let ctx = StatementContext::new(StatementKind::Query, QueryOptions::default(), tx);
    (StatementTask { ctx }, rx)
}

/// Build a fresh query task with the given options.
#[must_use]
pub fn query_task_with_options(
    options: QueryOptions,
) -> (StatementTask, oneshot::Receiver<oracle_proto_types::Result<StatementOutcome>>) {
    let (tx, rx) = oneshot::channel();
    let ctx = StatementContext::new(StatementKind::Query, options, tx);
    (StatementTask { ctx }, rx)
}

/// A `ColumnFramer` test double that frames every column as a fixed-width
/// byte slice, regardless of declared column type. Good enough for
/// exercising row/chunk reassembly without a real column codec.
pub struct FixedWidthFramer {
    width: usize,
}

impl FixedWidthFramer {
    /// Build a framer that always consumes exactly `width` bytes per column.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self { width }
    }
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
