//! Load-time error taxonomy.
//!
//! In-tick protocol errors (dead-source send, discovery timeout, route
//! errors) are not represented here — they travel as [`crate::telemetry`]
//! records, since the engine must keep running after one bad schedule
//! entry or one unreachable destination.

use thiserror::Error;

/// Everything that can go wrong building a [`crate::topology::Topology`] or
/// a packet schedule from manifest text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("node '{0}' declared more than once")]
    DuplicateNode(String),

    #[error("reference to undeclared node '{0}'")]
    UnknownNode(String),

    #[error("node name '{0}' contains the reserved '_' separator")]
    ReservedSeparator(String),

    #[error("link between '{0}' and '{1}' is not mutually declared")]
    AsymmetricLink(String, String),

    #[error("node '{0}' links to itself")]
    SelfLink(String),

    #[error("node '{0}' has battery {1} outside [0,1]")]
    BatteryOutOfRange(String, f64),

    #[error("malformed manifest line {line_no}: '{line}'")]
    Malformed { line_no: usize, line: String },
}
