//! Lifetime tracker for boundary-allocated objects
//!
//! Every object handed out through the boundary lives in a [`PinArena`] slot.
//! Callers release objects explicitly; whatever they forget is reclaimed by a
//! single [`PinArena::finalize`] sweep at shutdown. Each slot's `freed` flag
//! flips false -> true exactly once per object, through one of the two paths
//! and never both.
//!
//! Ids carry a generation so a handle to a released object stays dead even
//! after its slot is reused.

use crate::error::{Error, Result};
use crate::table::Table;
use crate::value::Value;
use crate::vector::Vector;
use serde::Serialize;
use std::fmt;

/// Objects that can live in a [`PinArena`]
pub trait Pinnable {
    /// Short type label used in diagnostics
    fn label(&self) -> &'static str;
}

impl Pinnable for Value {
    fn label(&self) -> &'static str {
        "value"
    }
}

impl Pinnable for Vector {
    fn label(&self) -> &'static str {
        "vector"
    }
}

impl Pinnable for Table {
    fn label(&self) -> &'static str {
        "table"
    }
}

/// Who created a pinned object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Temporaries created by the runtime itself (callback argument vectors)
    Internal,
    /// Created by an explicit `*_new` boundary call
    BoundaryNew,
    /// Created as the result of a lookup (`vector_at`, `table_at`, call results)
    BoundaryLookup,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Internal => "internal",
            Origin::BoundaryNew => "boundary-new",
            Origin::BoundaryLookup => "boundary-lookup",
        }
    }
}

/// Generation-checked slot reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinId {
    index: u32,
    generation: u32,
}

impl PinId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Encode as a non-zero boundary handle: `(generation << 32) | (index + 1)`
    pub fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64 + 1)
    }

    /// Decode a boundary handle; `0` (the null handle) decodes to `None`
    pub fn from_raw(raw: u64) -> Option<PinId> {
        let low = (raw & 0xffff_ffff) as u32;
        if low == 0 {
            return None;
        }
        Some(PinId {
            index: low - 1,
            generation: (raw >> 32) as u32,
        })
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin#{}@{}", self.index, self.generation)
    }
}

/// Per-origin counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OriginCounts {
    pub internal: u64,
    pub boundary_new: u64,
    pub boundary_lookup: u64,
}

impl OriginCounts {
    fn bump(&mut self, origin: Origin) {
        match origin {
            Origin::Internal => self.internal += 1,
            Origin::BoundaryNew => self.boundary_new += 1,
            Origin::BoundaryLookup => self.boundary_lookup += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.internal + self.boundary_new + self.boundary_lookup
    }

    /// Add another set of counts into this one
    pub fn merge(&mut self, other: &OriginCounts) {
        self.internal += other.internal;
        self.boundary_new += other.boundary_new;
        self.boundary_lookup += other.boundary_lookup;
    }
}

/// What a [`PinArena::finalize`] sweep reclaimed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub reclaimed: OriginCounts,
}

impl SweepSummary {
    pub fn total(&self) -> u64 {
        self.reclaimed.total()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Lifetime statistics of an arena
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    pub pinned_total: u64,
    pub released_explicitly: u64,
    pub swept: u64,
    pub live: u64,
    /// Pins over the arena's lifetime, by origin
    pub by_origin: OriginCounts,
}

struct Slot<T> {
    object: Option<T>,
    freed: bool,
    origin: Origin,
    generation: u32,
}

/// Indexed slot table with a free-list
pub struct PinArena<T: Pinnable> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    swept: bool,
    stats: ArenaStats,
}

impl<T: Pinnable> Default for PinArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pinnable> PinArena<T> {
    pub fn new() -> Self {
        PinArena {
            slots: Vec::new(),
            free: Vec::new(),
            swept: false,
            stats: ArenaStats::default(),
        }
    }

    /// Register `object`; refused once the arena has been swept
    #[track_caller]
    pub fn pin(&mut self, object: T, origin: Origin) -> Result<PinId> {
        if self.swept {
            return Err(Error::invalid_handle(0));
        }
        let label = object.label();

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                slot.freed = false;
                slot.origin = origin;
                PinId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    object: Some(object),
                    freed: false,
                    origin,
                    generation: 0,
                });
                PinId {
                    index,
                    generation: 0,
                }
            }
        };

        self.stats.pinned_total += 1;
        self.stats.live += 1;
        self.stats.by_origin.bump(origin);
        tracing::debug!(%id, label, origin = origin.as_str(), "pinned");
        Ok(id)
    }

    fn live_slot(&self, id: PinId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation && !s.freed && s.object.is_some())
    }

    #[track_caller]
    pub fn get(&self, id: PinId) -> Result<&T> {
        self.live_slot(id)
            .and_then(|s| s.object.as_ref())
            .ok_or_else(|| Error::invalid_handle(id.to_raw()))
    }

    #[track_caller]
    pub fn get_mut(&mut self, id: PinId) -> Result<&mut T> {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && !slot.freed => slot
                .object
                .as_mut()
                .ok_or_else(|| Error::invalid_handle(id.to_raw())),
            _ => Err(Error::invalid_handle(id.to_raw())),
        }
    }

    pub fn contains(&self, id: PinId) -> bool {
        self.live_slot(id).is_some()
    }

    /// Origin of a live object
    pub fn origin(&self, id: PinId) -> Option<Origin> {
        self.live_slot(id).map(|s| s.origin)
    }

    /// Mark the object freed and hand it back without dropping it
    ///
    /// `None` if the id is stale, already freed, or the arena was swept.
    pub fn unpin(&mut self, id: PinId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation || slot.freed {
            return None;
        }
        let object = slot.object.take()?;
        slot.freed = true;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        self.stats.released_explicitly += 1;
        self.stats.live -= 1;
        tracing::debug!(%id, label = object.label(), "released");
        Some(object)
    }

    /// Free the object behind `id`. Idempotent: returns `false` when there
    /// was nothing left to free.
    pub fn release(&mut self, id: PinId) -> bool {
        match self.unpin(id) {
            Some(object) => {
                drop(object);
                true
            }
            None => false,
        }
    }

    /// Reclaim every live object, in ascending slot order
    ///
    /// The first call sweeps and releases all slot storage; later calls
    /// return an empty summary.
    pub fn finalize(&mut self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        if self.swept {
            return summary;
        }
        self.swept = true;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.freed {
                continue;
            }
            if let Some(object) = slot.object.take() {
                slot.freed = true;
                summary.reclaimed.bump(slot.origin);
                tracing::debug!(
                    index,
                    label = object.label(),
                    origin = slot.origin.as_str(),
                    "swept"
                );
                drop(object);
            }
        }

        self.slots = Vec::new();
        self.free = Vec::new();
        self.stats.swept += summary.total();
        self.stats.live = 0;
        tracing::debug!(reclaimed = summary.total(), "pin arena finalized");
        summary
    }

    pub fn is_swept(&self) -> bool {
        self.swept
    }

    /// Number of live (pinned, not yet freed) objects
    pub fn live(&self) -> usize {
        self.stats.live as usize
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }
}

impl<T: Pinnable> Drop for PinArena<T> {
    fn drop(&mut self) {
        if !self.swept {
            let summary = self.finalize();
            tracing::warn!(
                reclaimed = summary.total(),
                "pin arena dropped without finalize; swept implicitly"
            );
        }
    }
}
