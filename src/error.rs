use thiserror::Error;

/// Errors surfaced by the hash substrate and remap engine.
///
/// `remap`/`remap_compact` return these instead of panicking or silently
/// producing `NaN`; internal probe loops propagate them via an explicit
/// error slot rather than ignoring failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemapError {
    #[error("hash table capacity exceeded: {attempted} entries requested, capacity is {capacity}")]
    CapacityExceeded { attempted: usize, capacity: usize },

    #[error("concurrent insert gave up after {attempts} probes for key {key}")]
    ContentionTimeout { key: u64, attempts: u32 },

    #[error(
        "mesh integrity violation: level {level} key {key} was declared a sentinel by its parent but is absent"
    )]
    MeshIntegrity { level: u32, key: u64 },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}
