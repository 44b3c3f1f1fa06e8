//! A discrete-event-free, tick-driven simulator for wireless MAC protocols (pure ALOHA
//! and RTS/CTS-ALOHA with binary-exponential backoff) running DSDV distance-vector
//! routing over a shared half-duplex broadcast medium.
//!
//! ## Layout
//! - [`message`] — wire (`Msg`) and application (`AppMsg`) message types.
//! - [`medium`] — the shared channel: in-flight transmissions and arrival-window queries.
//! - [`mac`] — packet factories, sequencing, and binary-exponential backoff.
//! - [`node`] — the per-node state machine (ALOHA and RTS/CTS variants).
//! - [`routing`] — the DSDV distance-vector routing protocol.
//! - [`topology`] — node positions and derived/cached neighbor sets.
//! - [`scenario`] — scenario file deserialization.
//! - [`simulator`] — the integer-tick driver loop and metrics emission.
//! - [`log`] — the in-memory structured log stream.
//! - [`error`] — the crate's typed error surface.
//! - [`verification`] — post-hoc invariant checks over a run's log trace.

pub mod error;
pub mod log;
pub mod mac;
pub mod medium;
pub mod message;
pub mod node;
pub mod routing;
pub mod scenario;
pub mod simulator;
pub mod topology;
pub mod units;
pub mod verification;

use std::fmt::Debug;

/// Checks two floats (or anything convertible to one) are within 0.001% of each other.
/// Ported from the teacher's `lib.rs`; used wherever distance or backoff-distribution
/// bounds are checked in tests.
#[allow(unused)]
pub(crate) fn assert_close<T>(a: T, b: T)
where
    T: Into<f64> + Copy + Debug,
{
    let float_a: f64 = a.into();
    let float_b: f64 = b.into();

    if float_a == 0. || float_b == 0. {
        assert!(float_a == float_b, "{a:?} and {b:?} are not close.");
        return;
    }

    let percent_diff = (float_a - float_b).abs() / float_a.abs();

    assert!(percent_diff < 0.00001, "{a:?} and {b:?} are not close.");
}
