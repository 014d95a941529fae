//! Bind variables and the shared, mutable state a statement carries for its
//! whole lifetime.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::describe::DescribeInfo;
use crate::error::OracleError;
use crate::outcome::StatementOutcome;

/// Direction of a single bind variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDirection {
    /// IN bind: value flows from client to server only.
    In,
    /// OUT bind: value flows from server to client only.
    Out,
    /// IN/OUT bind (PL/SQL): value flows both ways.
    InOut,
}

/// Static metadata for a single bind position, independent of the value
/// bound on any particular execution.
#[derive(Debug, Clone)]
pub struct BindMetadata {
    /// Position in the bind list, 0-based.
    pub position: u32,
    /// Direction of data flow.
    pub direction: BindDirection,
    /// Maximum byte size of the bound value's wire representation.
    pub max_size: u32,
}

/// A single bind variable occurrence: metadata plus the value bound for the
/// execution currently in flight.
#[derive(Debug, Clone)]
pub struct Bind {
    /// Static metadata for this position.
    pub metadata: BindMetadata,
    /// Already-encoded value, or `None` for a bound NULL.
    pub value: Option<Bytes>,
}

/// What kind of statement is being executed; governs which EQSM substates
/// are reachable (spec. §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// A SELECT, expected to stream zero or more rows.
    Query,
    /// INSERT/UPDATE/DELETE/MERGE, expected to return only a completion and
    /// row count (affected-rows, batch row-counts, batch-error list).
    Dml,
    /// CREATE/ALTER/DROP and friends, expected to return only a completion.
    Ddl,
    /// PL/SQL block with OUT or IN/OUT binds.
    PlSqlBlock,
}

/// Caller-supplied options that shape how a single execution behaves.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Number of rows to prefetch before the first `poll` call returns.
    pub prefetch_rows: u32,
    /// Whether to fetch LOB columns inline rather than falling back to
    /// LONG/LONG RAW/LONG NVARCHAR (spec. §4.3 describe-driven re-execute).
    pub fetch_lobs_inline: bool,
    /// Number of rows to execute for an array DML batch; 1 for a single row.
    pub batch_size: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            prefetch_rows: 1,
            fetch_lobs_inline: true,
            batch_size: 1,
        }
    }
}

/// A oneshot-backed completion handle handed in by the caller, completed
/// exactly once by the engine's dispatcher.
pub type Completer<T> = oneshot::Sender<Result<T, OracleError>>;

/// The per-statement state shared between the ExtendedQueryStateMachine and
/// the RowStreamBuffer for the lifetime of one execution.
///
/// Fields use interior mutability (`Rc<RefCell<_>>`/`Rc<Cell<_>>`) rather
/// than `Arc<Mutex<_>>`: the engine is single-threaded and cooperatively
/// scheduled, so ordinary aliasing rules — not thread-safety — are all that
/// is needed here.
#[derive(Clone)]
pub struct StatementContext {
    /// Statement kind, fixed for the lifetime of this context.
    pub kind: StatementKind,
    /// Server-assigned cursor id; 0 until the first EXECUTE response.
    pub cursor_id: Rc<Cell<u32>>,
    /// Bind variables for the execution currently in flight.
    pub binds: Rc<RefCell<Vec<Bind>>>,
    /// Column metadata once a DESCRIBE-INFO has been received.
    pub describe: Rc<RefCell<Option<DescribeInfo>>>,
    /// Options supplied by the caller for this execution.
    pub options: QueryOptions,
    /// The result completer, taken exactly once when the statement
    /// resolves (or is failed without ever starting).
    completer: Rc<RefCell<Option<Completer<StatementOutcome>>>>,
}

impl StatementContext {
    /// Build a fresh context with no cursor id and no describe yet.
    #[must_use]
    pub fn new(kind: StatementKind, options: QueryOptions, completer: Completer<StatementOutcome>) -> Self {
        Self {
            kind,
            cursor_id: Rc::new(Cell::new(0)),
            binds: Rc::new(RefCell::new(Vec::new())),
            describe: Rc::new(RefCell::new(None)),
            options,
            completer: Rc::new(RefCell::new(Some(completer))),
        }
    }

    /// Take the completer, leaving `None` behind. Panics if already taken:
    /// the dispatcher contract guarantees a completer is resolved exactly
    /// once, so a second take is a bug in this crate.
    #[track_caller]
    pub fn take_completer(&self) -> Completer<StatementOutcome> {
        self.completer
            .borrow_mut()
            .take()
            .expect("statement completer already taken")
    }

    /// Current cursor id, 0 meaning "not yet assigned".
    #[must_use]
    pub fn cursor_id(&self) -> u32 {
        self.cursor_id.get()
    }

    /// Record the cursor id assigned by the server's EXECUTE response.
    pub fn set_cursor_id(&self, cursor_id: u32) {
        self.cursor_id.set(cursor_id);
    }

    /// Replace the bind list for the next execution of this statement.
    pub fn set_binds(&self, binds: Vec<Bind>) {
        *self.binds.borrow_mut() = binds;
    }

    /// Record describe information received for this statement.
    pub fn set_describe(&self, describe: DescribeInfo) {
        *self.describe.borrow_mut() = Some(describe);
    }

    /// Whether a describe has been recorded yet.
    #[must_use]
    pub fn has_describe(&self) -> bool {
        self.describe.borrow().is_some()
    }
}

impl std::fmt::Debug for StatementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementContext")
            .field("kind", &self.kind)
            .field("cursor_id", &self.cursor_id.get())
            .field("bind_count", &self.binds.borrow().len())
            .field("has_describe", &self.has_describe())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context(kind: StatementKind) -> (StatementContext, oneshot::Receiver<Result<StatementOutcome, OracleError>>) {
        let (tx, rx) = oneshot::channel();
        (StatementContext::new(kind, QueryOptions::default(), tx), rx)
    }

    #[test]
    fn cursor_id_starts_unassigned_and_is_settable() {
        let (ctx, _rx) = test_context(StatementKind::Query);
        assert_eq!(ctx.cursor_id(), 0);
        ctx.set_cursor_id(42);
        assert_eq!(ctx.cursor_id(), 42);
    }

    #[test]
    fn cloned_context_shares_underlying_state() {
        let (ctx, _rx) = test_context(StatementKind::PlSqlBlock);
        let cloned = ctx.clone();
        ctx.set_cursor_id(7);
        assert_eq!(cloned.cursor_id(), 7);
    }

    #[test]
    fn set_describe_is_visible_through_has_describe() {
        let (ctx, _rx) = test_context(StatementKind::Query);
        assert!(!ctx.has_describe());
        ctx.set_describe(DescribeInfo::empty());
        assert!(ctx.has_describe());
    }

    #[test]
    fn take_completer_can_only_succeed_once() {
        let (ctx, _rx) = test_context(StatementKind::Query);
        let _completer = ctx.take_completer();
    }

    #[test]
    #[should_panic(expected = "already taken")]
    fn take_completer_twice_panics() {
        let (ctx, _rx) = test_context(StatementKind::Query);
        let _first = ctx.take_completer();
        let _second = ctx.take_completer();
    }
}
