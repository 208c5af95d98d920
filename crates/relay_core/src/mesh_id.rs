//! Local mesh message ID allocation.
//!
//! The relay assigns the mesh-side half of a message-map row itself
//! rather than reading one back from the radio library: `MeshGateway`
//! (spec C3/C4) reports only send success/failure, not the packet ID the
//! firmware ultimately assigns on air (see DESIGN.md open-question
//! resolution). A process-local counter, seeded from the default
//! `RandomState` hasher so restarts don't collide with a previous run's
//! low IDs, is a close enough analog to the firmware's own random
//! packet-ID assignment and is unique enough for message-map lookups.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

use relay_ids::MeshMessageId;

pub struct MeshMessageIdGenerator {
    next: AtomicU32,
}

impl MeshMessageIdGenerator {
    pub fn new() -> Self {
        let seed = RandomState::new().build_hasher().finish() as u32;
        Self { next: AtomicU32::new(seed) }
    }

    pub fn next(&self) -> MeshMessageId {
        MeshMessageId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for MeshMessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_ids_are_distinct() {
        let generator = MeshMessageIdGenerator::new();
        let a = generator.next();
        let b = generator.next();
        assert_ne!(a, b);
    }
}
