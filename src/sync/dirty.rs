//! Dirty bits and the host-facing change tracker.

use std::collections::HashMap;

use bitflags::bitflags;
use parking_lot::Mutex;

bitflags! {
    /// What changed on a primitive since its last sync.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyBits: u32 {
        const TRANSFORM = 1 << 0;
        const TOPOLOGY = 1 << 1;
        const VISIBILITY = 1 << 2;
        /// Sidedness.
        const DOUBLE_SIDED = 1 << 3;
        const MATERIAL_ID = 1 << 4;
        const PRIMVAR = 1 << 5;
        const POINTS = 1 << 6;
        const NORMALS = 1 << 7;
        const WIDTHS = 1 << 8;
        const DISPLAY_STYLE = 1 << 9;
        const RENDER_TAG = 1 << 10;
        const CATEGORIES = 1 << 11;
        const INSTANCER = 1 << 12;
        const INSTANCE_INDEX = 1 << 13;
        const SUBDIV_TAGS = 1 << 14;
        const PRIM_ID = 1 << 15;
        const VOLUME_FIELD = 1 << 16;
        /// Non-primvar parameters of lights and native prims.
        const PARAMS = 1 << 17;
        /// Material network.
        const RESOURCE = 1 << 18;
    }
}

impl DirtyBits {
    pub const CLEAN: DirtyBits = DirtyBits::empty();
}

/// The fixed order sync steps run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStep {
    Material,
    Topology,
    Visibility,
    Primvars,
    Transform,
    Extras,
}

impl SyncStep {
    pub const ORDER: [SyncStep; 6] = [
        SyncStep::Material,
        SyncStep::Topology,
        SyncStep::Visibility,
        SyncStep::Primvars,
        SyncStep::Transform,
        SyncStep::Extras,
    ];

    /// Bits this step consumes. Every bit belongs to exactly one step.
    pub fn bits(self) -> DirtyBits {
        match self {
            SyncStep::Material => DirtyBits::MATERIAL_ID | DirtyBits::RESOURCE,
            SyncStep::Topology => DirtyBits::TOPOLOGY | DirtyBits::SUBDIV_TAGS | DirtyBits::VOLUME_FIELD,
            SyncStep::Visibility => DirtyBits::VISIBILITY | DirtyBits::DOUBLE_SIDED,
            SyncStep::Primvars => {
                DirtyBits::PRIMVAR
                    | DirtyBits::POINTS
                    | DirtyBits::NORMALS
                    | DirtyBits::WIDTHS
                    | DirtyBits::PRIM_ID
                    | DirtyBits::PARAMS
            }
            SyncStep::Transform => DirtyBits::TRANSFORM,
            SyncStep::Extras => {
                DirtyBits::DISPLAY_STYLE
                    | DirtyBits::RENDER_TAG
                    | DirtyBits::CATEGORIES
                    | DirtyBits::INSTANCER
                    | DirtyBits::INSTANCE_INDEX
            }
        }
    }

    /// Bits that make this step run: its own, plus upstream changes it
    /// depends on.
    pub fn triggers(self) -> DirtyBits {
        match self {
            // Face-varying indices follow topology; built-in routing follows
            // the bound material.
            SyncStep::Primvars => self.bits() | DirtyBits::TOPOLOGY | DirtyBits::MATERIAL_ID,
            // Prototypes hide themselves once instanced.
            SyncStep::Visibility => self.bits() | DirtyBits::INSTANCER,
            SyncStep::Extras => self.bits() | DirtyBits::VISIBILITY,
            _ => self.bits(),
        }
    }
}

/// Per-primitive dirty masks written by the host and drained by the engine.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    bits: Mutex<HashMap<String, DirtyBits>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&self, id: &str, bits: DirtyBits) {
        if bits.is_empty() {
            return;
        }
        *self.bits.lock().entry(id.to_string()).or_default() |= bits;
    }

    pub fn mark_many<'a>(&self, ids: impl IntoIterator<Item = &'a str>, bits: DirtyBits) {
        let mut map = self.bits.lock();
        for id in ids {
            *map.entry(id.to_string()).or_default() |= bits;
        }
    }

    pub fn dirty_bits(&self, id: &str) -> DirtyBits {
        self.bits.lock().get(id).copied().unwrap_or_default()
    }

    /// Drains the mask of `id`.
    pub fn take(&self, id: &str) -> DirtyBits {
        self.bits.lock().remove(id).unwrap_or_default()
    }

    pub fn forget(&self, id: &str) {
        self.bits.lock().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_partition_every_bit() {
        let mut seen = DirtyBits::empty();
        for step in SyncStep::ORDER {
            assert!(!seen.intersects(step.bits()), "{step:?} overlaps");
            seen |= step.bits();
        }
        assert_eq!(seen, DirtyBits::all());
    }

    #[test]
    fn test_tracker_accumulates_and_drains() {
        let tracker = ChangeTracker::new();
        tracker.mark_dirty("/a", DirtyBits::TRANSFORM);
        tracker.mark_dirty("/a", DirtyBits::POINTS);
        assert_eq!(tracker.dirty_bits("/a"), DirtyBits::TRANSFORM | DirtyBits::POINTS);
        assert_eq!(tracker.take("/a"), DirtyBits::TRANSFORM | DirtyBits::POINTS);
        assert_eq!(tracker.take("/a"), DirtyBits::CLEAN);
    }
}
