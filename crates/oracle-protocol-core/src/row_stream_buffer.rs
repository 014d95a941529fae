//! The adaptive demand/supply buffer sitting between row parsing and the
//! caller's consumer.
//!
//! This is the one part of the engine that is not purely reactive to
//! inbound bytes: it also tracks an adaptive `target` size so that
//! backpressure adjusts to how fast the caller actually drains rows,
//! rather than to a fixed prefetch count.

use std::collections::VecDeque;

use oracle_proto_types::Row;

/// Lower bound for the adaptive `target`.
pub const MIN_TARGET: usize = 50;
/// Upper bound for the adaptive `target`.
pub const MAX_TARGET: usize = 1024;
/// Starting `target` before any receive has adjusted it.
pub const DEFAULT_TARGET: usize = 256;

/// What the buffer wants from the transport after a demand-shaped call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// More bytes are needed; issue a read.
    Read,
    /// Nothing is needed right now.
    Wait,
}

/// Adaptive demand buffer: accumulates decoded rows and adjusts its
/// `target` watermark to keep throughput smooth across uneven row widths
/// and server chunk sizes (spec. §4.4).
#[derive(Debug, Clone)]
pub struct RowStreamBuffer {
    rows: VecDeque<Row>,
    target: usize,
    failed: bool,
    seen_first_receive: bool,
}

impl RowStreamBuffer {
    /// A fresh buffer at the default target, empty and not failed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: VecDeque::new(),
            target: DEFAULT_TARGET,
            failed: false,
            seen_first_receive: false,
        }
    }

    /// Current number of buffered rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the buffer currently holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Current adaptive target; always in `[MIN_TARGET, MAX_TARGET]`.
    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Record a freshly parsed row, adjusting `target` if this receive
    /// pushes the buffer to or past it.
    ///
    /// `target` only halves after the *first* post-construction receive:
    /// the very first row of a stream never triggers a shrink, since one
    /// row arriving while the buffer is otherwise empty says nothing about
    /// sustained throughput.
    pub fn received_row(&mut self, row: Row) {
        self.rows.push_back(row);
        if self.seen_first_receive && self.rows.len() >= self.target {
            self.target = (self.target / 2).max(MIN_TARGET);
        }
        self.seen_first_receive = true;
    }

    /// Record a row flagged as a duplicate of the previous row's value at
    /// `column_index`, returning the bytes being reused so the caller can
    /// splice them into the new row before appending it.
    #[must_use]
    pub fn received_duplicate(&self, column_index: usize) -> Option<bytes::Bytes> {
        self.rows.back()?.columns.get(column_index)?.clone()
    }

    /// Called when the transport has no more bytes immediately available.
    /// Releases whatever is buffered to the caller, if anything.
    ///
    /// Returns `None` when the buffer is empty (nothing to release).
    pub fn channel_read_complete(&mut self) -> Option<Vec<Row>> {
        if self.rows.is_empty() {
            return None;
        }
        let released: Vec<Row> = self.rows.drain(..).collect();
        if self.target < MAX_TARGET {
            self.target = (self.target * 2).min(MAX_TARGET);
        }
        Some(released)
    }

    /// The caller is asking for more rows. Decides whether the transport
    /// should be asked for more bytes: a read is only issued while the
    /// buffer sits at or below `target - 1`.
    #[must_use]
    pub fn demand_more_response_body_parts(&self) -> Demand {
        if self.rows.len() <= self.target.saturating_sub(1) {
            Demand::Read
        } else {
            Demand::Wait
        }
    }

    /// Plumbing equivalent of `demand_more_response_body_parts` invoked
    /// from the raw "give me bytes" path rather than a row-count driven
    /// one; same rule, kept distinct to match the two call sites named in
    /// the dispatcher contract.
    #[must_use]
    pub fn read(&self) -> Demand {
        self.demand_more_response_body_parts()
    }

    /// Put the buffer into fail mode: further receives are rejected by the
    /// owning state machine (enforced by the caller, not this type), and
    /// any outstanding demand resolves to `Read` once so a final drain can
    /// observe the last bytes already in flight.
    #[must_use]
    pub fn fail(&mut self) -> Demand {
        self.failed = true;
        self.read()
    }

    /// Whether `fail()` has been called.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Drain every remaining buffered row; used when the stream ends
    /// (naturally or via cancellation) to hand the tail of the buffer to
    /// the caller in one shot.
    pub fn end(&mut self) -> Vec<Row> {
        self.rows.drain(..).collect()
    }
}

impl Default for RowStreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(vec![Some(bytes::Bytes::from_static(b"x"))])
    }

    #[test]
    fn target_starts_at_default() {
        let buf = RowStreamBuffer::new();
        assert_eq!(buf.target(), DEFAULT_TARGET);
    }

    #[test]
    fn first_receive_never_shrinks_target_even_if_small() {
        let mut buf = RowStreamBuffer::new();
        // Force target very low by construction is not possible publicly;
        // instead assert the happy path: one row never shrinks a 256 target.
        buf.received_row(row());
        assert_eq!(buf.target(), DEFAULT_TARGET);
    }

    #[test]
    fn target_halves_once_receives_reach_it_after_first() {
        let mut buf = RowStreamBuffer::new();
        // Drive target down manually by simulating many receives-at-target.
        for _ in 0..DEFAULT_TARGET {
            buf.received_row(row());
        }
        assert!(buf.target() < DEFAULT_TARGET);
        assert!(buf.target() >= MIN_TARGET);
    }

    #[test]
    fn target_never_drops_below_min() {
        let mut buf = RowStreamBuffer::new();
        for _ in 0..10_000 {
            buf.received_row(row());
            buf.end();
        }
        assert!(buf.target() >= MIN_TARGET);
    }

    #[test]
    fn channel_read_complete_doubles_target_on_full_drain_from_empty() {
        let mut buf = RowStreamBuffer::new();
        buf.received_row(row());
        let released = buf.channel_read_complete();
        assert_eq!(released.unwrap().len(), 1);
        assert!(buf.target() > DEFAULT_TARGET || buf.target() == MAX_TARGET);
        assert!(buf.is_empty());
    }

    #[test]
    fn channel_read_complete_returns_none_when_empty() {
        let mut buf = RowStreamBuffer::new();
        assert!(buf.channel_read_complete().is_none());
    }

    #[test]
    fn demand_reads_only_at_or_below_target_minus_one() {
        let mut buf = RowStreamBuffer::new();
        assert_eq!(buf.demand_more_response_body_parts(), Demand::Read);
        for _ in 0..DEFAULT_TARGET {
            buf.received_row(row());
        }
        // At/above adjusted target, demand should wait until drained.
        if buf.len() >= buf.target() {
            assert_eq!(buf.demand_more_response_body_parts(), Demand::Wait);
        }
    }

    #[test]
    fn received_duplicate_reuses_previous_row_column() {
        let mut buf = RowStreamBuffer::new();
        buf.received_row(Row::new(vec![Some(bytes::Bytes::from_static(b"hello"))]));
        let dup = buf.received_duplicate(0);
        assert_eq!(dup, Some(bytes::Bytes::from_static(b"hello")));
        assert_eq!(buf.received_duplicate(5), None);
    }

    #[test]
    fn end_drains_all_remaining_rows() {
        let mut buf = RowStreamBuffer::new();
        buf.received_row(row());
        buf.received_row(row());
        let remaining = buf.end();
        assert_eq!(remaining.len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn fail_marks_failed_and_still_reports_demand() {
        let mut buf = RowStreamBuffer::new();
        let demand = buf.fail();
        assert!(buf.is_failed());
        assert_eq!(demand, Demand::Read);
    }
}
