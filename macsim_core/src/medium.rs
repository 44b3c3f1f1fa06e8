//! The shared half-duplex broadcast channel (C2).
//!
//! `Medium` holds every transmission still possibly in flight and answers, for a given
//! receiver and tick, "what can you observe right now?". It is a pure function of
//! `{transmissions, positions, now}` — no side effects on nodes, and no opinion on what
//! a receiver does with what it observes (collision policy is the node FSM's job).
//! Grounded on the teacher's `simulation/data_structs.rs` `Transmission`/`overlaps` and
//! on `node.py::get_receivable_messages`'s arrival-window predicate.

use serde::{Deserialize, Serialize};

use crate::{message::Msg, topology::Topology, units::Tick};

/// A message placed on the medium at `start_tick`. A receiver `R` observes it during
/// `[start_tick + ⌊d(src,R)⌋, start_tick + ⌊d(src,R)⌋ + msg.length)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transmission {
    pub start_tick: Tick,
    pub msg: Msg,
}

impl Transmission {
    /// The tick at which `receiver` starts observing this transmission.
    fn arrival_tick(&self, receiver: usize, topology: &Topology) -> Tick {
        self.start_tick + topology.propagation_delay(self.msg.src(), receiver)
    }

    /// The last tick (exclusive) at which any node anywhere could still be receiving
    /// this transmission, used by [`Medium::gc`]. Takes the worst case over every
    /// neighbor of the sender since a far neighbor's window opens later.
    fn last_possible_observation(&self, topology: &Topology) -> Tick {
        topology
            .neighbors_of(self.msg.src())
            .map(|n| self.start_tick + topology.propagation_delay(self.msg.src(), n) + self.msg.length())
            .max()
            .unwrap_or(self.start_tick + self.msg.length())
    }
}

/// Holds in-flight transmissions. Owned by the simulator driver, never by a node;
/// nodes borrow it for the duration of their tick (§5).
#[derive(Debug, Clone, Default)]
pub struct Medium {
    transmissions: Vec<Transmission>,
}

impl Medium {
    pub fn new() -> Self {
        Medium {
            transmissions: Vec::new(),
        }
    }

    pub fn add(&mut self, transmission: Transmission) {
        self.transmissions.push(transmission);
    }

    /// All transmissions `receiver` can currently observe: sent by a neighbor, and
    /// `now` falls inside that transmission's arrival window for this receiver.
    pub fn observe(&self, receiver: usize, now: Tick, topology: &Topology) -> Vec<&Transmission> {
        self.transmissions
            .iter()
            .filter(|t| topology.are_neighbors(t.msg.src(), receiver))
            .filter(|t| {
                let arrival = t.arrival_tick(receiver, topology);
                now >= arrival && now < arrival + t.msg.length()
            })
            .collect()
    }

    /// Transmissions arriving at `receiver` at exactly `now` — the "arriving this tick"
    /// predicate of §4.3/§4.4.
    pub fn arriving_now(&self, receiver: usize, now: Tick, topology: &Topology) -> Vec<&Transmission> {
        self.transmissions
            .iter()
            .filter(|t| topology.are_neighbors(t.msg.src(), receiver))
            .filter(|t| t.arrival_tick(receiver, topology) == now)
            .collect()
    }

    /// Drops transmissions no neighbor of the sender could still be receiving.
    pub fn gc(&mut self, now: Tick, topology: &Topology) {
        self.transmissions
            .retain(|t| t.last_possible_observation(topology) > now);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.transmissions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Msg;

    fn data_msg(src: usize, dst: usize, length: u64) -> Msg {
        Msg::Data {
            seq: 0,
            src,
            dst,
            length: Tick::new(length),
            payload: crate::message::AppMsg::new(
                crate::message::Destination::Node(dst),
                "hi",
                Tick::new(length),
            ),
        }
    }

    fn line_topology() -> Topology {
        // N0(0,0), N1(0,3); both within range 5.
        Topology::new(
            vec![
                crate::topology::NodeGeometry {
                    pos: crate::units::Position::new(0.0, 0.0),
                    radius: 0.0,
                    transceive_range: 5.0,
                },
                crate::topology::NodeGeometry {
                    pos: crate::units::Position::new(0.0, 3.0),
                    radius: 0.0,
                    transceive_range: 5.0,
                },
            ],
        )
    }

    #[test]
    fn observe_respects_arrival_window() {
        let topo = line_topology();
        let mut medium = Medium::new();
        medium.add(Transmission {
            start_tick: Tick::new(0),
            msg: data_msg(0, 1, 5),
        });

        // propagation delay is 3 ticks, so arrival window at N1 is [3, 8).
        assert!(medium.observe(1, Tick::new(2), &topo).is_empty());
        assert_eq!(medium.observe(1, Tick::new(3), &topo).len(), 1);
        assert_eq!(medium.observe(1, Tick::new(7), &topo).len(), 1);
        assert!(medium.observe(1, Tick::new(8), &topo).is_empty());
    }

    #[test]
    fn gc_drops_fully_observed_transmissions() {
        let topo = line_topology();
        let mut medium = Medium::new();
        medium.add(Transmission {
            start_tick: Tick::new(0),
            msg: data_msg(0, 1, 5),
        });

        medium.gc(Tick::new(7), &topo);
        assert_eq!(medium.len(), 1);
        medium.gc(Tick::new(8), &topo);
        assert_eq!(medium.len(), 0);
    }

    #[test]
    fn arriving_now_is_exact() {
        let topo = line_topology();
        let mut medium = Medium::new();
        medium.add(Transmission {
            start_tick: Tick::new(1),
            msg: data_msg(0, 1, 5),
        });

        assert!(medium.arriving_now(1, Tick::new(3), &topo).is_empty());
        assert_eq!(medium.arriving_now(1, Tick::new(4), &topo).len(), 1);
        assert!(medium.arriving_now(1, Tick::new(5), &topo).is_empty());
    }
}
