//! A fake action dispatcher: accumulates every `Action` a scenario produces
//! so a test can assert on the aggregate shape of a trace (how many rows
//! were forwarded, whether a given completer kind fired) without having to
//! match on each step's `Action` by hand.
//!
//! Grounded on the teacher's `mssql-testing::mock_server::MockTdsServer`,
//! which plays the same role for the byte-level protocol: a test double that
//! stands in for the real transport/dispatcher and records what passed
//! through it.

use oracle_protocol_core::Action;
use oracle_proto_types::Row;

/// Counts and captured payloads accumulated from a sequence of `Action`s, as
/// a real dispatcher would observe them arriving one per call.
///
/// `Action` itself is not `Clone` (it carries one-shot completers), so this
/// type consumes each action by feeding it into `record`, pulling out
/// whatever is assertable and dropping (completing, where applicable) any
/// completer it carries.
#[derive(Debug, Default)]
pub struct FakeDispatcher {
    /// Every row forwarded via `ForwardRows`, in arrival order.
    pub forwarded_rows: Vec<Row>,
    /// Number of times `ForwardStreamComplete` was observed.
    pub stream_completions: usize,
    /// Number of times `ForwardStreamError` was observed.
    pub stream_errors: usize,
    /// Number of times `ForwardCancelComplete` was observed.
    pub cancel_completions: usize,
    /// Number of times `SucceedQuery` was observed.
    pub query_successes: usize,
    /// Number of times `FailQuery` was observed.
    pub query_failures: usize,
    /// Number of times `CloseConnectionAndCleanup` was observed.
    pub teardowns: usize,
    /// Number of statements failed via a recorded teardown's drained queue.
    pub tasks_failed_by_teardown: usize,
    /// Number of times `Read` was returned.
    pub reads_requested: usize,
    /// Number of times `Wait` was returned.
    pub waits: usize,
}

impl FakeDispatcher {
    /// A dispatcher with nothing recorded yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one action, completing any completer it carries with a
    /// best-effort canned outcome (tests that need a *specific* outcome
    /// should inspect the completer themselves before handing the action
    /// here, or match on it directly instead of routing through this type).
    pub fn record(&mut self, action: Action) {
        match action {
            Action::ForwardRows { rows } => self.forwarded_rows.extend(rows),
            Action::ForwardStreamComplete { rows } => {
                self.forwarded_rows.extend(rows);
                self.stream_completions += 1;
            }
            Action::ForwardStreamError { .. } => self.stream_errors += 1,
            Action::ForwardCancelComplete => self.cancel_completions += 1,
            Action::SucceedQuery { completer, result } => {
                self.query_successes += 1;
                let _ = completer.send(Ok(result));
            }
            Action::FailQuery { completer, err, .. } => {
                self.query_failures += 1;
                let _ = completer.send(Err(err));
            }
            Action::CloseConnectionAndCleanup(ctx) => {
                self.teardowns += 1;
                self.tasks_failed_by_teardown += ctx.tasks.len();
                for task in ctx.tasks {
                    let completer = task.ctx.take_completer();
                    let _ = completer.send(Err(ctx.error.clone()));
                }
                for completer in ctx.close_completers {
                    let _ = completer.send(Ok(()));
                }
            }
            Action::CloseConnection { completers } | Action::FireChannelInactive { completers } => {
                for completer in completers {
                    let _ = completer.send(Ok(()));
                }
            }
            Action::Read => self.reads_requested += 1,
            Action::Wait => self.waits += 1,
            // Transport/auth/lifecycle plumbing actions carry nothing this
            // harness needs to aggregate across a scenario.
            _ => {}
        }
    }

    /// Total rows observed across every `ForwardRows`/`ForwardStreamComplete`.
    #[must_use]
    pub fn total_rows_forwarded(&self) -> usize {
        self.forwarded_rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_proto_types::OracleError;

    #[test]
    fn records_forwarded_rows_from_both_variants() {
        let mut dispatcher = FakeDispatcher::new();
        dispatcher.record(Action::ForwardRows {
            rows: vec![Row::new(vec![None])],
        });
        dispatcher.record(Action::ForwardStreamComplete {
            rows: vec![Row::new(vec![None]), Row::new(vec![None])],
        });
        assert_eq!(dispatcher.total_rows_forwarded(), 3);
        assert_eq!(dispatcher.stream_completions, 1);
    }

    #[test]
    fn teardown_fails_every_drained_task_with_the_teardown_error() {
        use oracle_protocol_core::{CleanupContext, StatementTask, TaskQueue, TeardownKind};
        use oracle_proto_types::{QueryOptions, StatementContext, StatementKind};

        let (tx, rx) = tokio::sync::oneshot::channel();
        let ctx = StatementContext::new(StatementKind::Query, QueryOptions::default(), tx);
        let mut queue = TaskQueue::new();
        queue.push(StatementTask { ctx });

        let cleanup = CleanupContext::new(TeardownKind::Close, &mut queue, OracleError::UncleanShutdown, Vec::new());
        let mut dispatcher = FakeDispatcher::new();
        dispatcher.record(Action::CloseConnectionAndCleanup(cleanup));

        assert_eq!(dispatcher.teardowns, 1);
        assert_eq!(dispatcher.tasks_failed_by_teardown, 1);
        assert!(matches!(rx.try_recv(), Ok(Err(OracleError::UncleanShutdown))));
    }
}
