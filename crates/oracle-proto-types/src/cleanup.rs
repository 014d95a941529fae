//! Cleanup and close-path types.
//!
//! The connection close path (spec. §4.1, §7) accumulates completers from
//! however many callers are waiting on a close that's already in flight;
//! these types give that accumulation a concrete, owned shape.

use tokio::sync::oneshot;

use crate::error::OracleError;

/// Caller-provided completion handle for a `close()` call. Not `Clone`
/// (it's a `oneshot::Sender`); multiple in-flight close requests are kept as
/// a `Vec` and drained together when the connection actually tears down.
pub type CloseCompleter = oneshot::Sender<Result<(), OracleError>>;

/// An opaque handle to an open LOB, JSON, or vector value returned by the
/// server (spec. §5: "referenced by handle-like structures... that the core
/// passes through without parsing", and §9's "weak back-references to a
/// cleanup context for LOBs" source pattern, replaced here with an explicit
/// owned token rather than an ambient/global reference).
///
/// The engine threads this value through LOB-related actions without
/// interpreting `locator`'s bytes; only the out-of-scope column codec knows
/// how to read or construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobLocator {
    /// Total size of the referenced value, in bytes, as reported by the
    /// server; 0 if unknown at locator-creation time.
    pub size: u64,
    /// Chunk size the server will use when streaming this value.
    pub chunk_size: u32,
    /// The opaque, server-assigned locator bytes themselves.
    pub locator: bytes::Bytes,
    /// The cleanup token this locator was registered under, if the active
    /// `PendingCleanup` tracked it; lets the dispatcher cancel the owed
    /// `FreeLob` if the value is consumed (and explicitly freed) before the
    /// statement completes.
    pub cleanup_ref: Option<CleanupToken>,
}

impl LobLocator {
    /// Wrap an already-decoded LOB locator with no size/chunk-size
    /// information and no cleanup registration yet.
    #[must_use]
    pub fn new(locator: bytes::Bytes) -> Self {
        Self {
            size: 0,
            chunk_size: 0,
            locator,
            cleanup_ref: None,
        }
    }

    /// Attach the server-reported size and chunk size, returning `self` for
    /// chaining.
    #[must_use]
    pub fn with_size(mut self, size: u64, chunk_size: u32) -> Self {
        self.size = size;
        self.chunk_size = chunk_size;
        self
    }

    /// Record which `CleanupToken` this locator's owed `FreeLob` was
    /// registered under, returning `self` for chaining.
    #[must_use]
    pub fn with_cleanup_ref(mut self, token: CleanupToken) -> Self {
        self.cleanup_ref = Some(token);
        self
    }

    /// Borrow the locator's raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &bytes::Bytes {
        &self.locator
    }
}

/// A token identifying one outstanding piece of session cleanup (an open
/// cursor to close, a LOB locator to free) that must be flushed to the
/// server before the connection can be considered idle again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CleanupToken(pub u64);

/// What kind of cleanup a token refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupAction {
    /// Close a server-side cursor the caller dropped without fetching to
    /// completion.
    CloseCursor { cursor_id: u32 },
    /// Free a LOB locator the caller dropped without explicitly freeing.
    FreeLob { locator: LobLocator },
}

/// Cleanup actions accumulated for a single statement, piggybacked onto
/// its next re-execute or failure (spec. §4.3/§4.5 `sendReexecute(ctx,
/// cleanup)` / `failQuery(completer, err, cleanup?)`).
///
/// This is distinct from the connection-wide teardown context the CSM
/// builds when closing the whole connection (`action::CleanupContext`);
/// this one scopes to resources (cursors, LOBs) owned by one statement.
#[derive(Debug, Clone, Default)]
pub struct PendingCleanup {
    pending: Vec<(CleanupToken, CleanupAction)>,
    next_token: u64,
}

impl PendingCleanup {
    /// An empty cleanup accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new piece of owed cleanup, returning its token.
    pub fn push(&mut self, action: CleanupAction) -> CleanupToken {
        let token = CleanupToken(self.next_token);
        self.next_token += 1;
        self.pending.push((token, action));
        token
    }

    /// Whether any cleanup is currently owed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every pending cleanup action, leaving this context empty.
    ///
    /// Used when the next outbound message is built: the actions are
    /// piggybacked onto it rather than sent on their own.
    pub fn drain(&mut self) -> Vec<CleanupAction> {
        self.pending.drain(..).map(|(_, action)| action).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_distinct_and_increasing() {
        let mut ctx = PendingCleanup::new();
        let a = ctx.push(CleanupAction::CloseCursor { cursor_id: 1 });
        let b = ctx.push(CleanupAction::CloseCursor { cursor_id: 2 });
        assert_ne!(a, b);
        assert!(a.0 < b.0);
    }

    #[test]
    fn lob_locator_builders_attach_size_and_cleanup_ref() {
        let token = CleanupToken(3);
        let locator = LobLocator::new(bytes::Bytes::from_static(b"loc"))
            .with_size(4096, 512)
            .with_cleanup_ref(token);
        assert_eq!(locator.size, 4096);
        assert_eq!(locator.chunk_size, 512);
        assert_eq!(locator.cleanup_ref, Some(token));
        assert_eq!(locator.as_bytes(), &bytes::Bytes::from_static(b"loc"));
    }

    #[test]
    fn drain_empties_context_and_returns_actions_in_order() {
        let mut ctx = PendingCleanup::new();
        ctx.push(CleanupAction::CloseCursor { cursor_id: 1 });
        ctx.push(CleanupAction::FreeLob {
            locator: LobLocator::new(bytes::Bytes::from_static(b"loc")),
        });
        assert!(!ctx.is_empty());
        let drained = ctx.drain();
        assert_eq!(drained.len(), 2);
        assert!(ctx.is_empty());
    }
}
