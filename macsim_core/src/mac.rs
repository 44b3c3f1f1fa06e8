//! The MAC protocol layer (C3): packet factories, sequencing, and binary-exponential
//! backoff. Grounded on `original_source/MAC_simulator/protocols.py`'s `MACProtocol`,
//! `ALOHA`, and `RTSCTSALOHA` classes; randomness is drawn from the single seedable PRNG
//! the `Simulator` owns (§5 expansion), never a process-global source, following the
//! teacher's `RefCell<ChaCha12Rng>` pattern in `simulation.rs`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    message::{AppMsg, Msg},
    units::Tick,
};

const MIN_BACKOFF: u64 = 1;
const INITIAL_MAX_BACKOFF: u64 = 16;

/// Per-node MAC state. `max_backoff` is the current *ceiling* a random backoff is
/// drawn under; it doubles on every `set_backoff` call up to `cap` and resets to
/// [`INITIAL_MAX_BACKOFF`] once an ACK is received (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mac {
    backoff: Tick,
    max_backoff: u64,
    cap: u64,
    seq: u64,
}

impl Mac {
    /// `cap` is the configurable hard ceiling on `max_backoff` (spec.md §9 ambiguity 4;
    /// default 1024, see [`crate::scenario::Scenario::max_backoff_cap`]).
    pub fn new(cap: u64) -> Self {
        Mac {
            backoff: Tick::ZERO,
            max_backoff: INITIAL_MAX_BACKOFF,
            cap,
            seq: 0,
        }
    }

    pub fn backoff(&self) -> Tick {
        self.backoff
    }

    pub fn max_backoff(&self) -> u64 {
        self.max_backoff
    }

    /// Draws a new `backoff ∈ [min_backoff, max_backoff]`, then doubles the ceiling
    /// (capped) for next time — binary-exponential backoff.
    pub fn set_backoff(&mut self, rng: &mut impl Rng) {
        self.backoff = Tick::new(rng.random_range(MIN_BACKOFF..=self.max_backoff));
        if self.max_backoff < self.cap {
            self.max_backoff = (self.max_backoff * 2).min(self.cap);
        }
    }

    /// Called after a successful ACK; resets the ceiling so the next loss starts the
    /// doubling sequence over.
    pub fn reset_max_backoff(&mut self) {
        self.max_backoff = INITIAL_MAX_BACKOFF;
    }

    /// Zeroes the backoff counter itself (distinct from [`Mac::reset_max_backoff`],
    /// which resets the ceiling a new backoff is drawn under). Used when a node
    /// returns to `Idle` outside the normal countdown-to-zero path.
    pub fn clear_backoff(&mut self) {
        self.backoff = Tick::ZERO;
    }

    /// Decrements the backoff timer by `by` ticks, saturating at zero. Used both for
    /// the ordinary one-tick-per-tick countdown and for crediting ticks already spent
    /// receiving an interrupting message (§4.3 Receiving).
    pub fn decrement_backoff(&mut self, by: Tick) {
        self.backoff = self.backoff.saturating_sub(by);
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn make_data(&mut self, src: usize, dst: usize, payload: AppMsg) -> Msg {
        Msg::Data {
            seq: self.next_seq(),
            src,
            dst,
            length: payload.length,
            payload,
        }
    }

    pub fn make_ack(&mut self, src: usize, dst: usize) -> Msg {
        Msg::Ack {
            seq: self.next_seq(),
            src,
            dst,
            length: Tick::new(1),
        }
    }

    /// `virtual_carrier = 3*distance + data_length + 2` (§4.2).
    pub fn make_rts(&mut self, src: usize, dst: usize, distance: Tick, data_length: Tick) -> Msg {
        let virtual_carrier = Tick::new(3 * distance.get() + data_length.get() + 2);
        Msg::Rts {
            seq: self.next_seq(),
            src,
            dst,
            length: Tick::new(1),
            virtual_carrier,
            data_length,
        }
    }

    /// `virtual_carrier = 2*distance + data_length + 1` (§4.2).
    pub fn make_cts(&mut self, src: usize, dst: usize, distance: Tick, data_length: Tick) -> Msg {
        let virtual_carrier = Tick::new(2 * distance.get() + data_length.get() + 1);
        Msg::Cts {
            seq: self.next_seq(),
            src,
            dst,
            length: Tick::new(1),
            virtual_carrier,
            data_length,
        }
    }

    pub fn make_broadcast(&mut self, src: usize, table: Vec<crate::message::AdvertEntry>, length: Tick) -> Msg {
        Msg::Broadcast {
            seq: self.next_seq(),
            src,
            length,
            table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn backoff_doubles_ceiling_up_to_cap() {
        let mut mac = Mac::new(1024);
        let mut rng = ChaCha12Rng::seed_from_u64(7);

        let mut last = INITIAL_MAX_BACKOFF;
        for _ in 0..20 {
            mac.set_backoff(&mut rng);
            assert!(mac.max_backoff() >= last || mac.max_backoff() == 1024);
            assert!(mac.max_backoff() <= 1024);
            last = mac.max_backoff();
        }
        assert_eq!(mac.max_backoff(), 1024);
    }

    #[test]
    fn reset_restores_initial_ceiling() {
        let mut mac = Mac::new(1024);
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        for _ in 0..5 {
            mac.set_backoff(&mut rng);
        }
        assert_ne!(mac.max_backoff(), INITIAL_MAX_BACKOFF);
        mac.reset_max_backoff();
        assert_eq!(mac.max_backoff(), INITIAL_MAX_BACKOFF);
    }

    #[test]
    fn rts_cts_virtual_carrier_formulas() {
        let mut mac = Mac::new(1024);
        let rts = mac.make_rts(0, 1, Tick::new(4), Tick::new(10));
        match rts {
            Msg::Rts { virtual_carrier, .. } => assert_eq!(virtual_carrier, Tick::new(3 * 4 + 10 + 2)),
            _ => panic!("expected Rts"),
        }

        let cts = mac.make_cts(0, 1, Tick::new(4), Tick::new(10));
        match cts {
            Msg::Cts { virtual_carrier, .. } => assert_eq!(virtual_carrier, Tick::new(2 * 4 + 10 + 1)),
            _ => panic!("expected Cts"),
        }
    }

    #[test]
    fn seq_monotonic_across_factories() {
        let mut mac = Mac::new(1024);
        let a = mac.make_ack(0, 1);
        let b = mac.make_ack(0, 1);
        assert!(b.seq() > a.seq());
    }
}
