//! The external collaborator that knows how to frame individual column
//! values and bind-row counts out of raw row-data bytes.
//!
//! Byte-level value decoding is explicitly out of scope for the protocol
//! engine; this trait is the seam the engine drives without ever
//! implementing it itself.

use bytes::Bytes;

use crate::describe::Column;

/// Frames column and bind-row-count values out of a `ROW-DATA` payload.
///
/// Implementations are expected to be stateless with respect to the
/// connection (no buffering across calls): the engine itself owns
/// accumulating partial reads across `chunkReceived` boundaries and only
/// calls in with bytes it believes may contain a complete value.
pub trait ColumnFramer {
    /// Attempt to frame the next column's value out of `buf`.
    ///
    /// Returns `None` if `buf` does not yet contain enough bytes to
    /// determine the value. Otherwise returns the framed value (`None`
    /// meaning SQL NULL) together with the number of bytes consumed.
    fn frame_next_column(&self, column: &Column, buf: &[u8]) -> Option<(Option<Bytes>, usize)>;

    /// Attempt to frame a PL/SQL OUT-bind row count out of `buf`.
    ///
    /// Returns `None` if not enough bytes are available yet. Otherwise
    /// returns the row count together with the number of bytes consumed.
    fn frame_bind_row_count(&self, buf: &[u8]) -> Option<(u32, usize)>;
}
