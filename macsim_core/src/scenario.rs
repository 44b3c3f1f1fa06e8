//! Scenario deserialization (C8, expansion): the static description of §6 — node
//! geometry, per-run protocol/backoff configuration, and the application-message
//! schedule — loaded from a JSON file into the driver's initial inputs. Shaped after
//! the teacher's `frogcore::scenario::{Scenario, ScenarioMessage}` split between
//! geometry and traffic, but flattened to the fields this simulator actually needs:
//! no `NodeLocation` mobility graph, no LoRa radio settings, no procedural
//! generator identity (procedural generation is out of scope per spec.md §1).

use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{error::ScenarioError, message::BROADCAST_ID, node::ProtocolKind, units::Tick};

fn default_protocol() -> ProtocolKind {
    ProtocolKind::Aloha
}

fn default_max_backoff_cap() -> u64 {
    1024
}

fn default_tick_cap() -> u64 {
    10_000
}

/// One node's position, per §6's `{id, x, y}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: usize,
    pub x: f64,
    pub y: f64,
}

/// One scheduled application send, per §6's `{tick, source_id, AppMsg{target,
/// content, length}}`. `target` uses the wire sentinel [`BROADCAST_ID`] rather than
/// [`crate::message::Destination`] directly, since that's the literal external
/// format a scenario file is authored in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub tick: Tick,
    pub source_id: usize,
    pub target: i64,
    pub content: String,
    pub length: Tick,
}

/// The static scenario description of §6: `{name, radius, transceive_range, nodes,
/// schedule}`, plus the ambient per-run knobs (§9 ambiguity 4, §4.10) that a real
/// scenario file needs to pin down a reproducible experiment: which MAC protocol
/// every node runs, the backoff cap, and the hard tick cap of §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub radius: f64,
    pub transceive_range: f64,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolKind,
    #[serde(default = "default_max_backoff_cap")]
    pub max_backoff_cap: u64,
    #[serde(default = "default_tick_cap")]
    pub tick_cap: u64,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

impl Scenario {
    /// Loads and validates a scenario from a JSON file (§6).
    pub fn load(path: impl AsRef<Path>) -> Result<Scenario, ScenarioError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let scenario: Scenario = serde_json::from_reader(reader)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        if self.nodes.is_empty() {
            return Err(ScenarioError::Empty);
        }

        let node_count = self.nodes.len();
        for entry in &self.schedule {
            if entry.source_id >= node_count {
                return Err(ScenarioError::UnknownNode(entry.source_id));
            }
            if entry.target != BROADCAST_ID && (entry.target < 0 || entry.target as usize >= node_count) {
                return Err(ScenarioError::UnknownNode(entry.target.max(0) as usize));
            }
        }

        Ok(())
    }
}
