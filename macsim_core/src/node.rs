//! The per-node finite state machine (C4): pure ALOHA and the RTS/CTS-ALOHA
//! extension, unified behind one [`Node`] type parameterized by [`ProtocolKind`].
//! Grounded on `original_source/MAC_simulator/aloha_node.py` and `rts_cts_node.py` —
//! the state names, timer set, and priority cascade inside `process_received` follow
//! those two files almost line for line, with two deliberate departures recorded in
//! the crate's design notes: ACK delivery happens on the receiving side the moment a
//! DATA message is stored, not via a cross-node reach-in once the ACK round-trips;
//! and a BROADCAST is delivered unconditionally rather than discarded by the
//! addressed-to-self check that only makes sense for unicast traffic.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    log::{Log, LogLevel, LogSource},
    mac::Mac,
    medium::{Medium, Transmission},
    message::{AppMsg, Msg},
    routing::DsdvTable,
    topology::Topology,
    units::Tick,
};

/// Which MAC the node runs. A single [`Node`] type services both; only the
/// send-path framing and a handful of `process_received` branches differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolKind {
    Aloha,
    RtsCts,
}

/// The node's current FSM state (§4.3/§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Idle,
    Sending,
    Receiving,
    WaitingForAnswer,
    BackingOff,
    VirtualCarrierWait,
}

/// Every countdown a node tracks. At most one of `wait_for_ack`, `wait_for_cts`,
/// `wait_for_data` is ever nonzero at a time (§3 Invariant 4; enforced in
/// [`Node::transition_to_wait_for_answer`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timers {
    pub sending: Tick,
    pub receiving: Tick,
    pub wait_for_ack: Tick,
    pub wait_for_cts: Tick,
    pub wait_for_data: Tick,
    pub virtual_carrier: Tick,
}

/// `2*(⌊transceive_range⌋ + data_length)` — the round-trip budget a sender allows an
/// answer (ACK, CTS, or DATA) before giving up and backing off. Redesigned from the
/// original's flat hardcoded constant (§9 ambiguity: the original used `50`
/// regardless of topology or payload size).
fn rtt_budget(transceive_range: f64, data_length: Tick) -> Tick {
    Tick::new(2 * (transceive_range.floor() as u64 + data_length.get()))
}

fn rts_cts_virtual_carrier(m: &Msg) -> Tick {
    match m {
        Msg::Rts { virtual_carrier, .. } | Msg::Cts { virtual_carrier, .. } => *virtual_carrier,
        _ => unreachable!("rts_cts_virtual_carrier called on a non-RTS/CTS message"),
    }
}

/// One node in the simulation: its geometry lives in [`Topology`], its position in
/// the medium's arrival-window math, but everything about what it *does* each tick
/// lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: usize,
    protocol: ProtocolKind,
    state: State,
    timers: Timers,
    mac: Mac,
    pub routing: DsdvTable,
    send_queue: VecDeque<AppMsg>,
    receive_slot: Option<Msg>,
    delivered: Option<Msg>,
    collision_counter: u64,
    /// The message currently latched in `Receiving`, corresponding to the original's
    /// `currently_receiving`.
    latched: Option<Msg>,
    /// The message currently in flight while `Sending`, corresponding to the
    /// original's `currently_transmitting`.
    transmitting: Option<Msg>,
}

impl Node {
    pub fn new(id: usize, protocol: ProtocolKind, max_backoff_cap: u64, rng: &mut impl Rng) -> Self {
        Node {
            id,
            protocol,
            state: State::Idle,
            timers: Timers::default(),
            mac: Mac::new(max_backoff_cap),
            routing: DsdvTable::new(id, rng),
            send_queue: VecDeque::new(),
            receive_slot: None,
            delivered: None,
            collision_counter: 0,
            latched: None,
            transmitting: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn timers(&self) -> Timers {
        self.timers
    }

    pub fn collision_counter(&self) -> u64 {
        self.collision_counter
    }

    pub fn backoff(&self) -> Tick {
        self.mac.backoff()
    }

    pub fn max_backoff(&self) -> u64 {
        self.mac.max_backoff()
    }

    pub fn send_queue_len(&self) -> usize {
        self.send_queue.len()
    }

    pub fn receive_slot(&self) -> Option<&Msg> {
        self.receive_slot.as_ref()
    }

    /// The scenario-schedule entry point: hands an application message to this
    /// node's routing table, where it waits for a route before ever touching the MAC.
    pub fn inject(&mut self, msg: AppMsg) {
        self.routing.send(msg);
    }

    /// Called by the driver with whatever `routing.tick()`/`routing.reply()`
    /// produced this tick — queues it onto the MAC send path.
    pub fn queue_mac_send(&mut self, msg: AppMsg) {
        self.send_queue.push_back(msg);
    }

    /// Takes whatever was delivered to this node this tick, if anything — the
    /// driver's `node.receive()` equivalent.
    pub fn take_delivered(&mut self) -> Option<Msg> {
        self.delivered.take()
    }

    /// Advances this node by exactly one tick.
    pub fn step(&mut self, now: Tick, medium: &mut Medium, topology: &Topology, rng: &mut impl Rng, log: &mut Log) {
        match self.state {
            State::Idle => self.idle_state(now, medium, topology, log),
            State::Sending => self.sending_state(topology),
            State::Receiving => self.receiving_state(now, medium, topology, rng, log),
            State::WaitingForAnswer => self.waiting_for_answer_state(now, medium, topology, rng, log),
            State::BackingOff => self.backing_off_state(now, medium, topology, log),
            State::VirtualCarrierWait => self.virtual_carrier_state(now, medium, topology, log),
        }
    }

    fn idle_state(&mut self, now: Tick, medium: &mut Medium, topology: &Topology, log: &mut Log) {
        let arriving = medium.arriving_now(self.id, now, topology);
        match arriving.len() {
            0 => {}
            1 => {
                let msg = arriving[0].msg.clone();
                drop(arriving);
                self.transition_to_receiving(msg);
                return;
            }
            n => {
                drop(arriving);
                self.collision_counter += 1;
                log.record(
                    now,
                    LogSource::Node(self.id),
                    LogLevel::Warning,
                    format!("collision: {n} simultaneous arrivals while idle"),
                );
                return;
            }
        }

        let Some(front) = self.send_queue.front().cloned() else {
            return;
        };

        if front.is_advertisement() {
            self.send_queue.pop_front();
            let table = front.table.expect("is_advertisement implies table is Some");
            let msg = self.mac.make_broadcast(self.id, table, Tick::new(1));
            self.begin_sending(now, msg, medium, log);
            return;
        }

        let target = front
            .route_target
            .expect("queued AppMsg must carry a routing envelope before reaching the MAC");
        let next = self
            .routing
            .next_hop(target)
            .expect("send_queue entry queued with no route to its target");

        let msg = match self.protocol {
            ProtocolKind::Aloha => self.mac.make_data(self.id, next, front),
            ProtocolKind::RtsCts => {
                let distance = topology.propagation_delay(self.id, next);
                self.mac.make_rts(self.id, next, distance, front.length)
            }
        };
        self.begin_sending(now, msg, medium, log);
    }

    fn begin_sending(&mut self, now: Tick, msg: Msg, medium: &mut Medium, log: &mut Log) {
        self.state = State::Sending;
        self.timers.sending = msg.length();
        log.record(
            now,
            LogSource::Node(self.id),
            LogLevel::Debug,
            format!("sending {:?} (seq {})", variant_name(&msg), msg.seq()),
        );
        // Always scheduled one tick ahead so a node never observes its own emission
        // in the same tick it starts sending (§9).
        medium.add(Transmission {
            start_tick: now + Tick::new(1),
            msg: msg.clone(),
        });
        self.transmitting = Some(msg);
    }

    fn sending_state(&mut self, topology: &Topology) {
        self.timers.sending = self.timers.sending.saturating_sub(Tick::new(1));
        if !self.timers.sending.is_zero() {
            return;
        }

        let msg = self.transmitting.take().expect("Sending state with no in-flight message");
        let transceive_range = topology.geometry(self.id).transceive_range;

        match &msg {
            Msg::Data { length, .. } => {
                let budget = rtt_budget(transceive_range, *length);
                self.transition_to_wait_for_answer(budget, Tick::ZERO, Tick::ZERO);
            }
            Msg::Rts { data_length, .. } => {
                let budget = rtt_budget(transceive_range, *data_length);
                self.transition_to_wait_for_answer(Tick::ZERO, budget, Tick::ZERO);
            }
            Msg::Cts { data_length, .. } => {
                let budget = rtt_budget(transceive_range, *data_length) + Tick::new(1);
                self.transition_to_wait_for_answer(Tick::ZERO, Tick::ZERO, budget);
            }
            Msg::Ack { .. } | Msg::Broadcast { .. } => self.transition_to_idle(),
        }
    }

    fn transition_to_wait_for_answer(&mut self, ack: Tick, cts: Tick, data: Tick) {
        let active = [!ack.is_zero(), !cts.is_zero(), !data.is_zero()]
            .into_iter()
            .filter(|b| *b)
            .count();
        assert!(
            active <= 1,
            "at most one of wait_for_ack/wait_for_cts/wait_for_data may be active at a time"
        );
        self.state = State::WaitingForAnswer;
        self.timers.wait_for_ack = ack;
        self.timers.wait_for_cts = cts;
        self.timers.wait_for_data = data;
    }

    fn receiving_state(&mut self, now: Tick, medium: &mut Medium, topology: &Topology, rng: &mut impl Rng, log: &mut Log) {
        let arriving = medium.arriving_now(self.id, now, topology);
        if !arriving.is_empty() {
            let n = arriving.len();
            drop(arriving);
            self.collision_counter += 1;
            log.record(
                now,
                LogSource::Node(self.id),
                LogLevel::Warning,
                format!("collision: {n} new arrival(s) while receiving"),
            );
            let latched = self.latched.clone().expect("Receiving state with no latched message");
            let credit = latched.length().saturating_sub(self.timers.receiving);
            self.restore_timer(credit, rng);
            return;
        }
        drop(arriving);

        self.timers.receiving = self.timers.receiving.saturating_sub(Tick::new(1));
        if self.timers.receiving.is_zero() {
            let msg = self.latched.take().expect("Receiving state with no latched message");
            self.process_received(msg, now, medium, topology, rng, log);
        }
    }

    /// Credits `credit` ticks back into whichever timer was active before the
    /// interruption, resuming the matching wait state. This single cascade serves
    /// both a collision mid-`Receiving` (partial credit) and an irrelevant message
    /// arriving during any wait state (full-length credit), collapsing what the
    /// original spells out as several near-duplicate branches per state.
    fn restore_timer(&mut self, credit: Tick, rng: &mut impl Rng) {
        self.latched = None;
        self.transmitting = None;

        if !self.timers.wait_for_ack.is_zero() {
            self.timers.wait_for_ack = self.timers.wait_for_ack.saturating_sub(credit);
            self.state = State::WaitingForAnswer;
        } else if !self.timers.wait_for_cts.is_zero() {
            self.timers.wait_for_cts = self.timers.wait_for_cts.saturating_sub(credit);
            self.state = State::WaitingForAnswer;
        } else if !self.timers.wait_for_data.is_zero() {
            self.timers.wait_for_data = self.timers.wait_for_data.saturating_sub(credit);
            self.state = State::WaitingForAnswer;
        } else if !self.timers.virtual_carrier.is_zero() {
            self.timers.virtual_carrier = self.timers.virtual_carrier.saturating_sub(credit);
            self.state = State::VirtualCarrierWait;
        } else if !self.mac.backoff().is_zero() {
            self.mac.decrement_backoff(credit);
            self.state = State::BackingOff;
        } else {
            self.transition_to_idle();
        }
    }

    fn process_received(&mut self, m: Msg, now: Tick, medium: &mut Medium, topology: &Topology, rng: &mut impl Rng, log: &mut Log) {
        // A broadcast is delivered to every listening neighbor unconditionally: it
        // can never satisfy `is_addressed_to`, since it has no single destination,
        // so the unicast address check below would otherwise discard it and DSDV
        // gossip would never reach anyone.
        if m.is_broadcast() {
            log.record(now, LogSource::Node(self.id), LogLevel::Debug, "received table advertisement");
            self.delivered = Some(m.clone());
            self.restore_timer(m.length(), rng);
            return;
        }

        if !self.timers.wait_for_ack.is_zero() {
            if m.is_addressed_to(self.id) && m.is_ack() {
                self.complete_delivery();
            } else {
                self.restore_timer(m.length(), rng);
            }
            return;
        }
        if !self.timers.wait_for_cts.is_zero() {
            if m.is_addressed_to(self.id) && m.is_cts() {
                self.send_data_after_cts(now, medium, log);
            } else {
                self.restore_timer(m.length(), rng);
            }
            return;
        }
        if !self.timers.wait_for_data.is_zero() {
            if m.is_addressed_to(self.id) && m.is_data() {
                self.receive_data(now, m, medium, log);
            } else {
                self.restore_timer(m.length(), rng);
            }
            return;
        }
        if !self.timers.virtual_carrier.is_zero() {
            self.restore_timer(m.length(), rng);
            return;
        }
        if !self.mac.backoff().is_zero() {
            if self.protocol == ProtocolKind::RtsCts && m.is_addressed_to(self.id) && m.is_rts() {
                self.send_cts(now, &m, topology, medium, log);
            } else {
                self.restore_timer(m.length(), rng);
            }
            return;
        }

        // Idle-equivalent: nothing was pending, so this is an unsolicited arrival.
        if !m.is_addressed_to(self.id) {
            if self.protocol == ProtocolKind::RtsCts && (m.is_rts() || m.is_cts()) {
                self.enter_virtual_carrier(rts_cts_virtual_carrier(&m));
            } else {
                self.transition_to_idle();
            }
            return;
        }

        match self.protocol {
            ProtocolKind::Aloha => {
                if m.is_data() {
                    self.receive_data(now, m, medium, log);
                } else if m.is_ack() {
                    self.complete_delivery();
                } else {
                    self.transition_to_idle();
                }
            }
            ProtocolKind::RtsCts => {
                if m.is_rts() {
                    self.send_cts(now, &m, topology, medium, log);
                } else {
                    self.transition_to_idle();
                }
            }
        }
    }

    fn complete_delivery(&mut self) {
        self.send_queue.pop_front();
        self.mac.reset_max_backoff();
        self.transition_to_idle();
    }

    fn receive_data(&mut self, now: Tick, m: Msg, medium: &mut Medium, log: &mut Log) {
        let src = m.src();
        log.record(now, LogSource::Node(self.id), LogLevel::Info, format!("delivered data from node {src}"));
        self.receive_slot = Some(m.clone());
        // Delivery happens here, receiver-side, the instant the DATA is fully
        // received and addressed here — not once the sender later gets its ACK back
        // (§9 ambiguity 1: the original reaches across to the neighbor's object to
        // fake this, which only works by accident and breaks delivery timing).
        self.delivered = Some(m.clone());
        let ack = self.mac.make_ack(self.id, src);
        self.begin_sending(now, ack, medium, log);
    }

    fn send_cts(&mut self, now: Tick, m: &Msg, topology: &Topology, medium: &mut Medium, log: &mut Log) {
        let Msg::Rts { src, data_length, .. } = m else {
            unreachable!("send_cts called with a non-RTS message");
        };
        let distance = topology.propagation_delay(self.id, *src);
        let cts = self.mac.make_cts(self.id, *src, distance, *data_length);
        self.begin_sending(now, cts, medium, log);
    }

    fn send_data_after_cts(&mut self, now: Tick, medium: &mut Medium, log: &mut Log) {
        let front = self
            .send_queue
            .front()
            .cloned()
            .expect("waiting for a CTS with nothing queued to send");
        let target = front
            .route_target
            .expect("queued AppMsg must carry a routing envelope before reaching the MAC");
        // DATA goes to the same next hop the RTS was addressed to, not the final
        // route_target — the CTS responder here is the next hop, same as idle_state's
        // own RTS framing; only a single-hop route ever makes these equal.
        let next = self
            .routing
            .next_hop(target)
            .expect("waiting for a CTS implies a route to the target exists");
        let data = self.mac.make_data(self.id, next, front);
        self.begin_sending(now, data, medium, log);
    }

    fn enter_virtual_carrier(&mut self, duration: Tick) {
        let remaining = if self.state == State::VirtualCarrierWait {
            self.timers.virtual_carrier
        } else {
            Tick::ZERO
        };
        self.state = State::VirtualCarrierWait;
        self.timers.virtual_carrier = remaining.max(duration);
    }

    fn waiting_for_answer_state(&mut self, now: Tick, medium: &mut Medium, topology: &Topology, rng: &mut impl Rng, log: &mut Log) {
        if !self.timers.wait_for_data.is_zero() {
            self.timers.wait_for_data = self.timers.wait_for_data.saturating_sub(Tick::new(1));
            if self.timers.wait_for_data.is_zero() {
                self.transition_to_backoff(rng);
                return;
            }
        } else if !self.timers.wait_for_ack.is_zero() {
            self.timers.wait_for_ack = self.timers.wait_for_ack.saturating_sub(Tick::new(1));
            if self.timers.wait_for_ack.is_zero() {
                self.transition_to_backoff(rng);
                return;
            }
        } else if !self.timers.wait_for_cts.is_zero() {
            self.timers.wait_for_cts = self.timers.wait_for_cts.saturating_sub(Tick::new(1));
            if self.timers.wait_for_cts.is_zero() {
                self.transition_to_backoff(rng);
                return;
            }
        }

        let arriving = medium.arriving_now(self.id, now, topology);
        match arriving.len() {
            0 => {}
            1 => {
                let msg = arriving[0].msg.clone();
                drop(arriving);
                self.transition_to_receiving(msg);
            }
            n => {
                // None of the colliding arrivals gets latched, so — symmetrically
                // with the Idle handler — the wait simply continues; the timer was
                // already decremented above, nothing else about it changes.
                drop(arriving);
                self.collision_counter += 1;
                log.record(
                    now,
                    LogSource::Node(self.id),
                    LogLevel::Warning,
                    format!("collision: {n} simultaneous arrivals while waiting for an answer"),
                );
            }
        }
    }

    fn backing_off_state(&mut self, now: Tick, medium: &mut Medium, topology: &Topology, log: &mut Log) {
        self.mac.decrement_backoff(Tick::new(1));
        if self.mac.backoff().is_zero() {
            self.transition_to_idle();
        }
        // No early return here even once backoff hits zero: an arrival in this same
        // tick still takes priority over the just-finished backoff, matching the
        // original's fall-through quirk.

        let arriving = medium.arriving_now(self.id, now, topology);
        match arriving.len() {
            0 => {}
            1 => {
                let msg = arriving[0].msg.clone();
                drop(arriving);
                self.transition_to_receiving(msg);
            }
            n => {
                // As in the wait-state handler: a collision here latches nothing, so
                // it neither restores nor discards whatever backoff remains — it
                // just gets counted.
                drop(arriving);
                self.collision_counter += 1;
                log.record(
                    now,
                    LogSource::Node(self.id),
                    LogLevel::Warning,
                    format!("collision: {n} simultaneous arrivals while backing off"),
                );
            }
        }
    }

    fn virtual_carrier_state(&mut self, now: Tick, medium: &mut Medium, topology: &Topology, log: &mut Log) {
        let arriving = medium.arriving_now(self.id, now, topology);
        match arriving.len() {
            0 => {
                drop(arriving);
                self.timers.virtual_carrier = self.timers.virtual_carrier.saturating_sub(Tick::new(1));
                if self.timers.virtual_carrier.is_zero() {
                    if self.mac.backoff().is_zero() {
                        self.transition_to_idle();
                    } else {
                        self.state = State::BackingOff;
                    }
                }
            }
            1 => {
                let msg = arriving[0].msg.clone();
                drop(arriving);
                self.transition_to_receiving(msg);
            }
            n => {
                // The virtual carrier timer isn't touched here either — same
                // reasoning as the wait-for-answer and backoff branches above.
                drop(arriving);
                self.collision_counter += 1;
                log.record(
                    now,
                    LogSource::Node(self.id),
                    LogLevel::Warning,
                    format!("collision: {n} simultaneous arrivals during virtual carrier wait"),
                );
            }
        }
    }

    fn transition_to_receiving(&mut self, msg: Msg) {
        self.state = State::Receiving;
        self.timers.receiving = msg.length();
        self.latched = Some(msg);
    }

    fn transition_to_idle(&mut self) {
        self.state = State::Idle;
        self.timers = Timers::default();
        self.mac.clear_backoff();
        self.latched = None;
        self.transmitting = None;
    }

    fn transition_to_backoff(&mut self, rng: &mut impl Rng) {
        self.state = State::BackingOff;
        self.mac.set_backoff(rng);
    }
}

fn variant_name(m: &Msg) -> &'static str {
    if m.is_data() {
        "DATA"
    } else if m.is_rts() {
        "RTS"
    } else if m.is_cts() {
        "CTS"
    } else if m.is_ack() {
        "ACK"
    } else {
        "BROADCAST"
    }
}
