//! Tagged wire and application message types (C1).
//!
//! `AppMsg` is the application-level payload a node wants delivered somewhere; `Msg` is
//! what actually rides the [`medium`](crate::medium). Everything here is inert data —
//! no behavior lives in this module, matching the teacher's own split between
//! `transmission.py`'s dataclasses (in spirit) and the protocol logic that builds them.

use serde::{Deserialize, Serialize};

use crate::units::Tick;

/// Sentinel target id for a broadcast `AppMsg` read from a scenario file, mirroring the
/// external wire format of §6. Internally a broadcast is its own [`Destination`] variant;
/// this constant exists only at the scenario-loading boundary.
pub const BROADCAST_ID: i64 = -1;

/// Either a specific node or "everyone in range". Named and shaped after the teacher's
/// `node::Destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    Node(usize),
    Broadcast,
}

impl Destination {
    pub fn from_raw_id(id: i64) -> Self {
        if id == BROADCAST_ID {
            Destination::Broadcast
        } else {
            Destination::Node(id as usize)
        }
    }

    pub fn node_id(self) -> Option<usize> {
        match self {
            Destination::Node(id) => Some(id),
            Destination::Broadcast => None,
        }
    }
}

/// A distance-vector metric: a finite hop-equivalent cost, or infinity for a withdrawn
/// route. Lives here (rather than in `routing`) because it is also the unit a DSDV
/// table-snapshot broadcast carries as payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Finite(u64),
    Infinite,
}

impl Metric {
    pub fn plus_delay(self, delay: Tick) -> Metric {
        match self {
            Metric::Finite(m) => Metric::Finite(m + delay.get()),
            Metric::Infinite => Metric::Infinite,
        }
    }

    pub fn is_finite(self) -> bool {
        matches!(self, Metric::Finite(_))
    }
}

/// One row of a DSDV table as it travels inside a BROADCAST `Msg`'s payload. Carries
/// the sender's own `next` hop for that target verbatim (not recomputed by the
/// receiver) to match the table-merge rule of §4.5: a withdrawal propagates the
/// original advertiser's bookkeeping unchanged, only a fresh route gets `next`
/// rewritten to the sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdvertEntry {
    pub target: usize,
    pub next: Option<usize>,
    pub metric: Metric,
    pub seq: i64,
}

/// An application-level send request: `{target_id, content, length}` per §3, plus the
/// routing envelope a forwarded message picks up, and the `msg_id` correlation handle
/// the simulator assigns at schedule-injection time (§3 expansion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMsg {
    pub target: Destination,
    pub content: String,
    pub length: Tick,
    pub msg_id: Option<u64>,
    pub route_target: Option<usize>,
    pub route_source: Option<usize>,
    /// Present only for the periodic DSDV table-snapshot advertisement routing queues
    /// onto a node's MAC `send_queue` (§4.5 step 3). A plain application send always
    /// leaves this `None`; the MAC layer checks it to decide DATA vs BROADCAST framing.
    pub table: Option<Vec<AdvertEntry>>,
}

impl AppMsg {
    pub fn new(target: Destination, content: impl Into<String>, length: Tick) -> Self {
        AppMsg {
            target,
            content: content.into(),
            length,
            msg_id: None,
            route_target: None,
            route_source: None,
            table: None,
        }
    }

    pub fn advertisement(table: Vec<AdvertEntry>) -> Self {
        AppMsg {
            target: Destination::Broadcast,
            content: String::new(),
            length: Tick::new(1),
            msg_id: None,
            route_target: None,
            route_source: None,
            table: Some(table),
        }
    }

    pub fn is_advertisement(&self) -> bool {
        self.table.is_some()
    }

    pub fn with_envelope(mut self, route_target: usize, route_source: usize) -> Self {
        self.route_target = Some(route_target);
        self.route_source = Some(route_source);
        self
    }

    pub fn with_msg_id(mut self, msg_id: u64) -> Self {
        self.msg_id = Some(msg_id);
        self
    }
}

/// The wire message carried by a [`crate::medium::Transmission`]. One tagged enum per
/// §3's `{DATA, RTS, CTS, ACK, BROADCAST}`, each fixing `{seq, src, dst, length, payload}`
/// to the fields that variant actually needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Msg {
    Data {
        seq: u64,
        src: usize,
        dst: usize,
        length: Tick,
        payload: AppMsg,
    },
    Rts {
        seq: u64,
        src: usize,
        dst: usize,
        length: Tick,
        virtual_carrier: Tick,
        data_length: Tick,
    },
    Cts {
        seq: u64,
        src: usize,
        dst: usize,
        length: Tick,
        virtual_carrier: Tick,
        data_length: Tick,
    },
    Ack {
        seq: u64,
        src: usize,
        dst: usize,
        length: Tick,
    },
    Broadcast {
        seq: u64,
        src: usize,
        length: Tick,
        table: Vec<AdvertEntry>,
    },
}

impl Msg {
    pub fn seq(&self) -> u64 {
        match self {
            Msg::Data { seq, .. }
            | Msg::Rts { seq, .. }
            | Msg::Cts { seq, .. }
            | Msg::Ack { seq, .. }
            | Msg::Broadcast { seq, .. } => *seq,
        }
    }

    pub fn src(&self) -> usize {
        match self {
            Msg::Data { src, .. }
            | Msg::Rts { src, .. }
            | Msg::Cts { src, .. }
            | Msg::Ack { src, .. }
            | Msg::Broadcast { src, .. } => *src,
        }
    }

    /// `Destination::Broadcast` for a BROADCAST message, `Destination::Node(dst)` otherwise.
    pub fn dst(&self) -> Destination {
        match self {
            Msg::Data { dst, .. }
            | Msg::Rts { dst, .. }
            | Msg::Cts { dst, .. }
            | Msg::Ack { dst, .. } => Destination::Node(*dst),
            Msg::Broadcast { .. } => Destination::Broadcast,
        }
    }

    pub fn length(&self) -> Tick {
        match self {
            Msg::Data { length, .. }
            | Msg::Rts { length, .. }
            | Msg::Cts { length, .. }
            | Msg::Ack { length, .. }
            | Msg::Broadcast { length, .. } => *length,
        }
    }

    pub fn is_addressed_to(&self, node_id: usize) -> bool {
        match self.dst() {
            Destination::Node(id) => id == node_id,
            Destination::Broadcast => false,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Msg::Data { .. })
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Msg::Ack { .. })
    }

    pub fn is_rts(&self) -> bool {
        matches!(self, Msg::Rts { .. })
    }

    pub fn is_cts(&self) -> bool {
        matches!(self, Msg::Cts { .. })
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Msg::Broadcast { .. })
    }
}
