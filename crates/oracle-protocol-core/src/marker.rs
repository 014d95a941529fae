//! The out-of-band MARKER protocol used to synchronize cancellation
//! (spec. §3 `MarkerState`, §5 cancellation), plus the `Modifying`
//! sentinel shared by every top-level state enum in this crate.

/// Whether an unacknowledged MARKER frame is currently in flight.
///
/// At most one marker may be outstanding at a time (spec. §3 invariant).
/// `markerReceived()` toggles this regardless of which code path last set
/// it (spec. §9 third open question: no additional correlation is added).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker is outstanding.
    #[default]
    NoMarkerSent,
    /// A marker was sent and not yet acknowledged.
    MarkerSent,
}

impl MarkerState {
    /// Record that a marker was just sent.
    pub fn mark_sent(&mut self) {
        *self = Self::MarkerSent;
    }

    /// Whether a marker is currently outstanding.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::MarkerSent)
    }

    /// Clear the outstanding marker (an echo of our own marker was observed).
    pub fn clear(&mut self) {
        *self = Self::NoMarkerSent;
    }
}

/// Every top-level state enum in this crate (`ConnectionState`, `EqsmState`)
/// owns its sub-machines by value, not by reference, so a transition that
/// both reads and replaces a sub-machine cannot borrow `self.state` and also
/// write to it. The standard trick applies: `mem::replace` the field out to
/// a `Modifying` sentinel, move the owned value out, build the new state
/// from it, and write the new state back. `Modifying` must never be
/// observed outside of a single step call; if it is, a transition returned
/// early without restoring the field, which is a bug in this crate, not a
/// reachable protocol state.
///
/// Panics with a message identifying which state machine leaked the
/// sentinel; call this from the fallback arm of a `match` over a state enum
/// whenever the `Modifying` arm is reached.
#[track_caller]
pub fn unreachable_modifying(machine: &str) -> ! {
    unreachable!("{machine} observed in the Modifying placeholder state outside of a transition")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_state_toggles_on_receive_regardless_of_origin() {
        let mut state = MarkerState::default();
        assert!(!state.is_sent());
        state.mark_sent();
        assert!(state.is_sent());
        state.clear();
        assert!(!state.is_sent());
    }
}
