//! Reference-counted glue specifications.

use paragon_utils::Scaled;

/// An order of infinity for glue stretch or shrink.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum GlueOrder {
    #[default]
    Normal = 0,
    Fil = 1,
    Fill = 2,
    Filll = 3,
}

impl GlueOrder {
    /// The array index of this order.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// The dimensions of a piece of glue.
///
/// Many glue nodes usually share one specification, so specs live in their
/// own pool and are reference-counted; see [`GlueSpecs`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct GlueSpec {
    pub width: Scaled,
    pub stretch: Scaled,
    pub shrink: Scaled,
    pub stretch_order: GlueOrder,
    pub shrink_order: GlueOrder,
}

impl GlueSpec {
    /// The zero glue.
    pub const ZERO: Self = Self {
        width: Scaled::ZERO,
        stretch: Scaled::ZERO,
        shrink: Scaled::ZERO,
        stretch_order: GlueOrder::Normal,
        shrink_order: GlueOrder::Normal,
    };

    /// Fixed glue of the given width.
    pub fn fixed(width: Scaled) -> Self {
        Self { width, ..Self::ZERO }
    }

    /// Glue with finite stretch and shrink.
    pub fn flexible(width: Scaled, stretch: Scaled, shrink: Scaled) -> Self {
        Self { width, stretch, shrink, ..Self::ZERO }
    }

    /// Glue stretching by one unit of first-order infinity.
    pub fn fil(width: Scaled) -> Self {
        Self {
            width,
            stretch: Scaled::ONE,
            stretch_order: GlueOrder::Fil,
            ..Self::ZERO
        }
    }
}

/// A handle into the glue specification pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SpecRef(u32);

enum SpecSlot {
    Vacant { next: u32 },
    Used { refs: u32, spec: GlueSpec },
}

/// The pool of glue specifications.
pub struct GlueSpecs {
    slots: Vec<SpecSlot>,
    free: u32,
}

impl GlueSpecs {
    /// Creates an empty pool. Slot 0 is reserved.
    pub fn new() -> Self {
        Self { slots: vec![SpecSlot::Vacant { next: 0 }], free: 0 }
    }

    /// Allocates a spec with a reference count of one.
    pub fn alloc(&mut self, spec: GlueSpec) -> SpecRef {
        let slot = SpecSlot::Used { refs: 1, spec };
        if self.free != 0 {
            let index = self.free;
            match self.slots[index as usize] {
                SpecSlot::Vacant { next } => self.free = next,
                SpecSlot::Used { .. } => unreachable!("free list points at a live spec"),
            }
            self.slots[index as usize] = slot;
            SpecRef(index)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(slot);
            SpecRef(index)
        }
    }

    /// Allocates a copy of an existing spec, with its own count of one.
    pub fn copy(&mut self, r: SpecRef) -> SpecRef {
        self.alloc(*self.get(r))
    }

    /// Takes another reference to a spec.
    pub fn add_ref(&mut self, r: SpecRef) {
        match &mut self.slots[r.0 as usize] {
            SpecSlot::Used { refs, .. } => *refs += 1,
            SpecSlot::Vacant { .. } => panic!("dangling spec reference"),
        }
    }

    /// Releases one reference; the spec is freed when the last one goes.
    pub fn delete_ref(&mut self, r: SpecRef) {
        match &mut self.slots[r.0 as usize] {
            SpecSlot::Used { refs, .. } => {
                *refs -= 1;
                if *refs == 0 {
                    self.slots[r.0 as usize] = SpecSlot::Vacant { next: self.free };
                    self.free = r.0;
                }
            }
            SpecSlot::Vacant { .. } => panic!("dangling spec reference"),
        }
    }

    /// The spec behind a handle.
    pub fn get(&self, r: SpecRef) -> &GlueSpec {
        match &self.slots[r.0 as usize] {
            SpecSlot::Used { spec, .. } => spec,
            SpecSlot::Vacant { .. } => panic!("dangling spec reference"),
        }
    }

    /// Mutable access; only sensible on a freshly copied spec.
    pub fn get_mut(&mut self, r: SpecRef) -> &mut GlueSpec {
        match &mut self.slots[r.0 as usize] {
            SpecSlot::Used { spec, .. } => spec,
            SpecSlot::Vacant { .. } => panic!("dangling spec reference"),
        }
    }

    /// The current reference count of a spec.
    pub fn ref_count(&self, r: SpecRef) -> u32 {
        match &self.slots[r.0 as usize] {
            SpecSlot::Used { refs, .. } => *refs,
            SpecSlot::Vacant { .. } => panic!("dangling spec reference"),
        }
    }

    /// The total number of outstanding references, over all live specs.
    pub fn total_refs(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| match slot {
                SpecSlot::Used { refs, .. } => *refs as u64,
                SpecSlot::Vacant { .. } => 0,
            })
            .sum()
    }
}

impl Default for GlueSpecs {
    fn default() -> Self {
        Self::new()
    }
}
