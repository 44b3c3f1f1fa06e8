//! The crate's typed error surface (§7 expansion). Mirrors the teacher's
//! `sim_file::SimFileError` in shape: one `thiserror` enum per fallible boundary, with
//! `#[from]` conversions for the underlying I/O and JSON errors so call sites can use
//! `?` end to end.

use thiserror::Error;

/// Failures while loading a scenario file (C8).
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed scenario JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scenario references unknown node id {0}")]
    UnknownNode(usize),

    #[error("scenario has no nodes")]
    Empty,
}

/// Failures appending a metrics row to a scenario's CSV output (§4.9/§6).
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to write metrics CSV: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize metrics row: {0}")]
    Csv(#[from] csv::Error),
}
