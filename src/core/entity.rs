// Entity is the in-memory projection of an entity's latest committed log row.
//
// Purpose
// - Carry the decoded state next to its canonical serialized bytes so a
//   command that changes nothing can carry the prior bytes forward verbatim.
//
// Boundaries
// - Owned by exactly one worker's cache at a time; never persisted directly.
// - May be evicted and rebuilt from the durable log at any point.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity<S> {
    pub entity_id: String,
    /// Monotonically increasing per entity; 0 before creation.
    pub version: i64,
    pub state: S,
    /// Canonical serialized form of `state`, the carry-forward value when a
    /// handler signals "no change".
    pub state_bytes: Vec<u8>,
    /// Commit timestamp of the row this projection was built from, epoch
    /// milliseconds. 0 for an entity that has not been committed yet.
    pub updated_at: i64,
}
