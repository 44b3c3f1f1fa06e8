//! DSDV distance-vector routing (C5). Grounded on
//! `original_source/MAC_simulator/protocols.py`'s `DSDVRoutingProtocol`: a
//! sequence-numbered table merged under the classic DSDV rule, staleness-based
//! withdrawal of dead direct links, a buffer of application messages awaiting a route,
//! and a periodic randomized full-table broadcast.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    log::{Log, LogLevel, LogSource},
    message::{AdvertEntry, AppMsg, Destination, Metric, Msg},
    units::Tick,
};

const MAX_SHARE_TABLE_BACKOFF: u64 = 200;
const STALENESS_THRESHOLD: u64 = 4 * MAX_SHARE_TABLE_BACKOFF;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Entry {
    next: Option<usize>,
    metric: Metric,
    seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsdvTable {
    id: usize,
    table: HashMap<usize, Entry>,
    staleness: HashMap<usize, u64>,
    share_table_backoff: u64,
    buffer: Vec<AppMsg>,
    sequence: i64,
}

impl DsdvTable {
    pub fn new(id: usize, rng: &mut impl Rng) -> Self {
        let mut table = HashMap::new();
        table.insert(
            id,
            Entry {
                next: Some(id),
                metric: Metric::Finite(0),
                seq: 0,
            },
        );

        DsdvTable {
            id,
            table,
            staleness: HashMap::new(),
            share_table_backoff: rng.random_range(0..=MAX_SHARE_TABLE_BACKOFF),
            buffer: Vec::new(),
            sequence: 0,
        }
    }

    pub fn next_hop(&self, target: usize) -> Option<usize> {
        self.table.get(&target).and_then(|e| e.next)
    }

    pub fn has_route(&self, target: usize) -> bool {
        self.table
            .get(&target)
            .is_some_and(|e| e.metric.is_finite())
    }

    pub fn own_row_seq(&self) -> i64 {
        self.table.get(&self.id).map(|e| e.seq).unwrap_or(0)
    }

    pub fn own_row_metric(&self) -> Metric {
        self.table
            .get(&self.id)
            .map(|e| e.metric)
            .unwrap_or(Metric::Finite(0))
    }

    /// Queues an application message; it leaves the buffer only once a route to its
    /// target exists (§4.5).
    pub fn send(&mut self, msg: AppMsg) {
        self.buffer.push(msg);
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Ages every direct link one tick and withdraws any that have gone quiet for too
    /// long. A link is only withdrawn if it's still a *direct* route (`next == node`)
    /// with an even (non-withdrawn) sequence number — mirrors `check_staleness`.
    fn check_staleness(&mut self) {
        let stale: Vec<usize> = self
            .staleness
            .iter_mut()
            .filter_map(|(&node, count)| {
                *count += 1;
                (*count > STALENESS_THRESHOLD).then_some(node)
            })
            .collect();

        for node in stale {
            if let Some(entry) = self.table.get_mut(&node) {
                if entry.seq % 2 == 0 && entry.next == Some(node) {
                    entry.seq += 1;
                    entry.metric = Metric::Infinite;
                }
            }
        }
    }

    /// Drains the buffer for the first message whose target now has a route, else
    /// counts down toward the next periodic table broadcast (§4.5).
    pub fn tick(&mut self, rng: &mut impl Rng) -> Option<AppMsg> {
        self.check_staleness();

        if let Some(pos) = self.buffer.iter().position(|m| {
            m.target
                .node_id()
                .is_some_and(|target| self.has_route(target))
        }) {
            let msg = self.buffer.remove(pos);
            let target = msg.target.node_id().expect("checked above");
            return Some(msg.with_envelope(target, self.id));
        }

        self.share_table_backoff = self.share_table_backoff.saturating_sub(1);
        if self.share_table_backoff == 0 {
            self.share_table_backoff = rng.random_range(0..=MAX_SHARE_TABLE_BACKOFF);
            self.sequence += 2;
            if let Some(own) = self.table.get_mut(&self.id) {
                own.seq = self.sequence;
            }
            return Some(AppMsg::advertisement(self.snapshot()));
        }

        None
    }

    fn snapshot(&self) -> Vec<AdvertEntry> {
        self.table
            .iter()
            .map(|(&target, entry)| AdvertEntry {
                target,
                next: entry.next,
                metric: entry.metric,
                seq: entry.seq,
            })
            .collect()
    }

    /// Handles an inbound message: resets the direct-link staleness clock for its
    /// sender, forwards DATA that isn't addressed here, merges a BROADCAST table, and
    /// otherwise falls through to [`DsdvTable::tick`] exactly as `DSDVRoutingProtocol.reply`
    /// does — a forward is returned immediately, everything else defers to the regular
    /// per-tick bookkeeping.
    pub fn reply(&mut self, msg: &Msg, distance: Tick, now: Tick, rng: &mut impl Rng, log: &mut Log) -> Option<AppMsg> {
        self.staleness.insert(msg.src(), 0);

        if let Msg::Data { payload, .. } = msg {
            let route_target = payload.route_target;
            let route_source = payload.route_source;
            if route_target == Some(self.id) {
                // Delivered here; the simulator already read this out of the node's
                // `delivered` slot before calling us, nothing further to route.
            } else if let Some(target) = route_target {
                if self.has_route(target) {
                    let forwarded = AppMsg {
                        target: Destination::Node(target),
                        content: payload.content.clone(),
                        length: payload.length,
                        msg_id: payload.msg_id,
                        route_target: Some(target),
                        route_source,
                        table: None,
                    };
                    return Some(forwarded);
                }
                // No route: message dies here (§7 error kind 3), matching the
                // original's log-and-drop rather than retrying at this layer.
                log.record(
                    now,
                    LogSource::Node(self.id),
                    LogLevel::Warning,
                    format!("no route to node {target}, dropping forward"),
                );
            }
        }

        if let Msg::Broadcast { table, src, .. } = msg {
            self.update_table(distance, table, *src);
        }

        self.tick(rng)
    }

    /// The DSDV merge rule (§4.5): a fresher, strictly-better route replaces the
    /// current entry with `next` rewritten to the advertiser; a fresher *withdrawal*
    /// (odd sequence number) propagates verbatim, keeping the advertised `next`.
    fn update_table(&mut self, distance: Tick, incoming: &[AdvertEntry], from: usize) {
        for entry in incoming {
            self.table.entry(entry.target).or_insert(Entry {
                next: None,
                metric: Metric::Infinite,
                seq: -1,
            });
        }

        for entry in incoming {
            let current = self.table[&entry.target];
            let adjusted = entry.metric.plus_delay(distance);

            if entry.seq > current.seq && current.metric >= adjusted {
                self.table.insert(
                    entry.target,
                    Entry {
                        next: Some(from),
                        metric: adjusted,
                        seq: entry.seq,
                    },
                );
            } else if entry.seq % 2 == 1 && entry.seq > current.seq {
                self.table.insert(
                    entry.target,
                    Entry {
                        next: entry.next,
                        metric: entry.metric,
                        seq: entry.seq,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn rng() -> ChaCha12Rng {
        ChaCha12Rng::seed_from_u64(42)
    }

    #[test]
    fn own_entry_starts_zero_distance() {
        let table = DsdvTable::new(0, &mut rng());
        assert!(table.has_route(0));
        assert_eq!(table.next_hop(0), Some(0));
        assert_eq!(table.own_row_seq(), 0);
        assert_eq!(table.own_row_metric(), Metric::Finite(0));
    }

    #[test]
    fn merge_installs_better_route() {
        let mut table = DsdvTable::new(0, &mut rng());
        let incoming = vec![AdvertEntry {
            target: 2,
            next: Some(2),
            metric: Metric::Finite(0),
            seq: 2,
        }];
        table.update_table(Tick::new(3), &incoming, 1);

        assert!(table.has_route(2));
        assert_eq!(table.next_hop(2), Some(1));
        assert_eq!(table.table[&2].metric, Metric::Finite(3));
    }

    #[test]
    fn merge_ignores_stale_sequence() {
        let mut table = DsdvTable::new(0, &mut rng());
        let first = vec![AdvertEntry {
            target: 2,
            next: Some(2),
            metric: Metric::Finite(0),
            seq: 4,
        }];
        table.update_table(Tick::new(1), &first, 1);

        let stale = vec![AdvertEntry {
            target: 2,
            next: Some(2),
            metric: Metric::Finite(0),
            seq: 2,
        }];
        table.update_table(Tick::new(1), &stale, 1);

        assert_eq!(table.table[&2].seq, 4);
    }

    #[test]
    fn withdrawal_propagates_on_odd_fresher_seq() {
        let mut table = DsdvTable::new(0, &mut rng());
        let fresh = vec![AdvertEntry {
            target: 2,
            next: Some(1),
            metric: Metric::Finite(2),
            seq: 2,
        }];
        table.update_table(Tick::new(0), &fresh, 1);

        let withdrawal = vec![AdvertEntry {
            target: 2,
            next: Some(1),
            metric: Metric::Infinite,
            seq: 3,
        }];
        table.update_table(Tick::new(0), &withdrawal, 1);

        assert_eq!(table.table[&2].metric, Metric::Infinite);
        assert_eq!(table.table[&2].seq, 3);
    }

    #[test]
    fn send_buffers_until_route_exists() {
        let mut table = DsdvTable::new(0, &mut rng());
        let mut r = rng();
        table.send(AppMsg::new(Destination::Node(5), "hi", Tick::new(3)));

        // No route yet: tick should not forward, but may still eventually broadcast.
        for _ in 0..5 {
            if let Some(m) = table.tick(&mut r) {
                assert!(m.is_advertisement(), "should not forward without a route");
            }
        }
        assert_eq!(table.buffer_len(), 1);

        table.update_table(
            Tick::new(1),
            &[AdvertEntry {
                target: 5,
                next: Some(5),
                metric: Metric::Finite(0),
                seq: 2,
            }],
            3,
        );

        let forwarded = loop {
            if let Some(m) = table.tick(&mut r) {
                if !m.is_advertisement() {
                    break m;
                }
            }
        };
        assert_eq!(forwarded.route_target, Some(5));
        assert_eq!(table.buffer_len(), 0);
    }

    #[test]
    fn staleness_withdraws_quiet_direct_link() {
        let mut table = DsdvTable::new(0, &mut rng());
        table.update_table(
            Tick::new(0),
            &[AdvertEntry {
                target: 9,
                next: Some(9),
                metric: Metric::Finite(0),
                seq: 2,
            }],
            9,
        );
        table.staleness.insert(9, 0);

        for _ in 0..=STALENESS_THRESHOLD {
            table.check_staleness();
        }

        assert_eq!(table.table[&9].metric, Metric::Infinite);
    }

    #[test]
    fn withdrawal_propagates_a_second_hop_after_staleness() {
        // Node 0 learns a direct route to node 9, goes quiet on it long enough to
        // withdraw, then re-broadcasts; a second node downstream of 0 must adopt
        // that withdrawal over its own previously-finite route, same as spec.md
        // scenario 5's "withdrawal propagates to N0" two-hop chain.
        let mut node0 = DsdvTable::new(0, &mut rng());
        node0.update_table(
            Tick::new(0),
            &[AdvertEntry {
                target: 9,
                next: Some(9),
                metric: Metric::Finite(0),
                seq: 2,
            }],
            9,
        );
        node0.staleness.insert(9, 0);
        for _ in 0..=STALENESS_THRESHOLD {
            node0.check_staleness();
        }
        assert_eq!(node0.table[&9].metric, Metric::Infinite, "node 0's direct link should have been withdrawn");

        let mut downstream = DsdvTable::new(7, &mut rng());
        downstream.update_table(
            Tick::new(1),
            &[AdvertEntry {
                target: 9,
                next: Some(9),
                metric: Metric::Finite(0),
                seq: 2,
            }],
            0,
        );
        assert!(downstream.has_route(9), "downstream node should have a finite route before the withdrawal arrives");

        downstream.update_table(Tick::new(1), &node0.snapshot(), 0);

        assert!(!downstream.has_route(9), "downstream node should adopt node 0's withdrawal");
        assert_eq!(downstream.table[&9].seq % 2, 1);
    }
}
