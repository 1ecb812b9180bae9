//! Sequence-id acceptance for the data plane.
//!
//! Data frames arrive over an unreliable channel, so they can be lost,
//! duplicated, or reordered. The gate accepts only strictly-forward
//! progress: with `last` the last accepted id, a frame with id `s` passes
//! iff there is no `last` yet or the unsigned distance
//! `(s - last) mod 2^32` lies in `[1, 2^31)`. That admits normal forward
//! steps and the full forward wrap region while rejecting duplicates and
//! anything older. Rejected frames are dropped silently and only counted.

/// Half of the u32 sequence space; distances at or past this are "behind".
const FORWARD_WINDOW: u32 = 1 << 31;

/// Strictly-forward sequence-id filter with wrap-around.
#[derive(Debug, Default)]
pub struct SequenceGate {
    last: Option<u32>,
    rejected: u64,
}

impl SequenceGate {
    /// A gate that will accept any first sequence id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept or reject a frame with sequence id `id`.
    ///
    /// Accepting advances the gate; rejecting only bumps the drop counter.
    pub fn accept(&mut self, id: u32) -> bool {
        match self.last {
            None => {
                self.last = Some(id);
                true
            }
            Some(last) => {
                let distance = id.wrapping_sub(last);
                if (1..FORWARD_WINDOW).contains(&distance) {
                    self.last = Some(id);
                    true
                } else {
                    self.rejected += 1;
                    false
                }
            }
        }
    }

    /// The last accepted sequence id, if any.
    pub fn last(&self) -> Option<u32> {
        self.last
    }

    /// How many frames have been rejected so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Forget all history, as when a new session begins.
    pub fn reset(&mut self) {
        self.last = None;
        self.rejected = 0;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn first_id_always_passes() {
        let mut gate = SequenceGate::new();
        assert!(gate.accept(u32::MAX));
        assert_eq!(gate.last(), Some(u32::MAX));
    }

    #[test]
    fn forward_progress_passes() {
        let mut gate = SequenceGate::new();
        assert!(gate.accept(1));
        assert!(gate.accept(2));
        assert!(gate.accept(50));
        assert_eq!(gate.rejected(), 0);
    }

    #[test]
    fn duplicates_and_reorders_are_dropped() {
        let mut gate = SequenceGate::new();
        assert!(gate.accept(10));
        assert!(!gate.accept(9));
        assert!(!gate.accept(10));
        assert!(gate.accept(11));
        assert_eq!(gate.rejected(), 2);
        assert_eq!(gate.last(), Some(11));
    }

    #[test]
    fn wrap_around_is_forward() {
        let mut gate = SequenceGate::new();
        assert!(gate.accept(u32::MAX - 1));
        assert!(gate.accept(u32::MAX));
        assert!(gate.accept(0));
        assert!(gate.accept(1));
        assert_eq!(gate.rejected(), 0);
    }

    #[test]
    fn window_boundary() {
        let mut gate = SequenceGate::new();
        assert!(gate.accept(0));
        // 2^31 - 1 ahead: the furthest accepted distance.
        assert!(gate.accept(FORWARD_WINDOW - 1));
        // Exactly 2^31 ahead of the new cursor is "behind".
        let mut gate = SequenceGate::new();
        assert!(gate.accept(0));
        assert!(!gate.accept(FORWARD_WINDOW));
    }

    #[test]
    fn reset_forgets_history() {
        let mut gate = SequenceGate::new();
        assert!(gate.accept(100));
        assert!(!gate.accept(50));
        gate.reset();
        assert!(gate.accept(50));
        assert_eq!(gate.rejected(), 0);
    }

    proptest! {
        /// Whatever interleaving arrives, the accepted subsequence moves
        /// strictly forward in wrap-aware distance.
        #[test]
        fn accepted_subsequence_is_strictly_forward(ids in prop::collection::vec(any::<u32>(), 1..200)) {
            let mut gate = SequenceGate::new();
            let mut accepted = Vec::new();
            for id in ids {
                if gate.accept(id) {
                    accepted.push(id);
                }
            }
            for pair in accepted.windows(2) {
                let distance = pair[1].wrapping_sub(pair[0]);
                prop_assert!((1..FORWARD_WINDOW).contains(&distance));
            }
        }
    }
}
