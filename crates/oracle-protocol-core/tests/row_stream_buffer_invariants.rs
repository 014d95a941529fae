//! Property-based invariants for the adaptive row stream buffer.
//!
//! These complement the inline unit tests in `row_stream_buffer.rs`, which
//! exercise specific fixed sequences; here we throw arbitrary receive/drain
//! interleavings at the buffer and check the invariants that must hold no
//! matter the order (spec. §4.4 adaptive target bounds).

use bytes::Bytes;
use oracle_proto_types::Row;
use oracle_protocol_core::row_stream_buffer::{RowStreamBuffer, MAX_TARGET, MIN_TARGET};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Receive,
    Drain,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Receive), Just(Op::Drain)]
}

fn row() -> Row {
    Row::new(vec![Some(Bytes::from_static(b"x"))])
}

proptest! {
    /// No matter how receives and drains interleave, `target` never leaves
    /// `[MIN_TARGET, MAX_TARGET]`.
    #[test]
    fn target_always_stays_in_bounds(ops in proptest::collection::vec(op_strategy(), 0..2000)) {
        let mut buf = RowStreamBuffer::new();
        for op in ops {
            match op {
                Op::Receive => buf.received_row(row()),
                Op::Drain => {
                    buf.channel_read_complete();
                }
            }
            prop_assert!(buf.target() >= MIN_TARGET);
            prop_assert!(buf.target() <= MAX_TARGET);
        }
    }

    /// `end()` always drains exactly what was buffered, and leaves the
    /// buffer empty no matter how many rows piled up beforehand.
    #[test]
    fn end_drains_everything_buffered(receive_count in 0usize..500) {
        let mut buf = RowStreamBuffer::new();
        for _ in 0..receive_count {
            buf.received_row(row());
        }
        let drained = buf.end();
        prop_assert_eq!(drained.len(), receive_count);
        prop_assert!(buf.is_empty());
    }

    /// `demand_more_response_body_parts` only ever says `Wait` once the
    /// buffer has caught up to (or passed) its current target; it always
    /// says `Read` below that line.
    #[test]
    fn demand_matches_target_threshold(receive_count in 0usize..1500) {
        let mut buf = RowStreamBuffer::new();
        for _ in 0..receive_count {
            buf.received_row(row());
        }
        let demand = buf.demand_more_response_body_parts();
        if buf.len() <= buf.target().saturating_sub(1) {
            prop_assert_eq!(demand, oracle_protocol_core::row_stream_buffer::Demand::Read);
        } else {
            prop_assert_eq!(demand, oracle_protocol_core::row_stream_buffer::Demand::Wait);
        }
    }

    /// A full drain via `channel_read_complete` always empties the buffer
    /// and returns exactly as many rows as were pending.
    #[test]
    fn channel_read_complete_returns_exactly_whats_pending(receive_count in 0usize..500) {
        let mut buf = RowStreamBuffer::new();
        for _ in 0..receive_count {
            buf.received_row(row());
        }
        let released = buf.channel_read_complete();
        if receive_count == 0 {
            prop_assert!(released.is_none());
        } else {
            prop_assert_eq!(released.unwrap().len(), receive_count);
        }
        prop_assert!(buf.is_empty());
    }
}
