//! Spilling and live-range splitting.
//!
//! A spilled register lives in a stack slot. Its interval is cut into one
//! piece per instruction that touches it; each piece is a fresh virtual
//! register that only needs a physical register for that instruction, with
//! a reload in front of reading instructions and a store after writing ones.
//! A register live into the function is stored to its slot before the first
//! instruction, so later reloads read the value the caller passed.

use super::interval::LiveInterval;
use crate::mir::VReg;
use crate::target::SpillSlot;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// Direction of a spill memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SpillDirection {
    /// Write the incoming value to the slot before the instruction
    Entry,
    /// Reload from the slot before the instruction
    Load,
    /// Write to the slot after the instruction
    Store,
}

impl fmt::Display for SpillDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpillDirection::Load => write!(f, "load"),
            SpillDirection::Entry | SpillDirection::Store => write!(f, "store"),
        }
    }
}

/// One memory operation the rewriter has to insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpillRequest {
    /// Instruction the operation is attached to
    pub point: u32,
    /// Split piece holding the value at that instruction
    pub vreg: VReg,
    pub slot: SpillSlot,
    pub direction: SpillDirection,
}

impl fmt::Display for SpillRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let place = match self.direction {
            SpillDirection::Entry | SpillDirection::Load => "before",
            SpillDirection::Store => "after",
        };
        write!(f, "{} {} {} {} inst {}", self.direction, self.vreg, self.slot, place, self.point)
    }
}

/// Stack slots, one per spilled original register.
#[derive(Debug, Clone, Default)]
pub struct SpillSlots {
    slots: IndexMap<VReg, SpillSlot>,
}

impl SpillDirection {
    /// Does the operation write the slot?
    pub fn is_store(self) -> bool {
        matches!(self, SpillDirection::Entry | SpillDirection::Store)
    }
}

impl SpillSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `origin`, allocating one on first request.
    pub fn slot_for(&mut self, origin: VReg) -> SpillSlot {
        let next = SpillSlot(self.slots.len() as u32);
        *self.slots.entry(origin).or_insert(next)
    }

    pub fn into_map(self) -> IndexMap<VReg, SpillSlot> {
        self.slots
    }
}

/// Result of splitting one spilled interval.
#[derive(Debug, Clone, Default)]
pub struct Split {
    /// New registers with their one-instruction intervals
    pub children: Vec<(VReg, LiveInterval)>,
    pub requests: Vec<SpillRequest>,
}

/// Cut `interval` at its def/use sites.
///
/// `fresh` supplies one new register number per site.
pub fn split_at_sites(
    interval: &LiveInterval,
    slot: SpillSlot,
    mut fresh: impl FnMut() -> VReg,
) -> Split {
    let mut split = Split::default();

    for site in interval.sites() {
        let child = fresh();
        let piece = LiveInterval::for_site(*site);
        debug_assert!(piece.is_subset_of(interval));

        if site.at_entry {
            split.requests.push(SpillRequest {
                point: site.inst,
                vreg: child,
                slot,
                direction: SpillDirection::Entry,
            });
        } else if site.is_use {
            // An entry piece already holds the value it would reload
            split.requests.push(SpillRequest {
                point: site.inst,
                vreg: child,
                slot,
                direction: SpillDirection::Load,
            });
        }
        if site.is_def {
            split.requests.push(SpillRequest {
                point: site.inst,
                vreg: child,
                slot,
                direction: SpillDirection::Store,
            });
        }
        split.children.push((child, piece));
    }

    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regalloc::interval::{LiveRange, ProgramPoint, UseSite};

    fn spilled_interval() -> LiveInterval {
        // def at 1, read-modify-write at 3, use at 6
        let mut li = LiveInterval::new();
        li.add_range(LiveRange::new(ProgramPoint(3), ProgramPoint(13)));
        li.add_site(UseSite::def(1, 0));
        li.add_site(UseSite::read_write(3, 1));
        li.add_site(UseSite::use_(6, 0));
        li
    }

    #[test]
    fn test_split_one_piece_per_site() {
        let parent = spilled_interval();
        let mut next = 10;
        let split = split_at_sites(&parent, SpillSlot(0), || {
            next += 1;
            VReg(next)
        });

        assert_eq!(split.children.len(), 3);
        for (_, piece) in &split.children {
            assert_eq!(piece.sites().len(), 1);
            assert!(piece.is_subset_of(&parent));
            assert!(!piece.can_shrink());
        }
        assert_eq!(
            split.children[1].1.ranges(),
            &[LiveRange::new(ProgramPoint(6), ProgramPoint(8))]
        );
    }

    #[test]
    fn test_split_requests() {
        let parent = spilled_interval();
        let mut next = 10;
        let split = split_at_sites(&parent, SpillSlot(2), || {
            next += 1;
            VReg(next)
        });

        let summary: Vec<(u32, SpillDirection)> =
            split.requests.iter().map(|r| (r.point, r.direction)).collect();
        assert_eq!(
            summary,
            vec![
                (1, SpillDirection::Store),
                (3, SpillDirection::Load),
                (3, SpillDirection::Store),
                (6, SpillDirection::Load),
            ]
        );
        // The read-modify-write piece reloads and stores through one register
        assert_eq!(split.requests[1].vreg, split.requests[2].vreg);
        assert!(split.requests.iter().all(|r| r.slot == SpillSlot(2)));
    }

    #[test]
    fn test_entry_piece_stores_incoming_value() {
        // live in from the caller, used at 2 and at 5
        let mut parent = LiveInterval::new();
        parent.add_range(LiveRange::new(ProgramPoint(0), ProgramPoint(11)));
        parent.add_site(UseSite::entry(0, 0));
        parent.add_site(UseSite::use_(2, 0));
        parent.add_site(UseSite::use_(5, 0));

        let mut next = 0;
        let split = split_at_sites(&parent, SpillSlot(0), || {
            next += 1;
            VReg(next)
        });

        assert_eq!(split.children.len(), 3);
        assert_eq!(split.children[0].1.ranges(), &[LiveRange::new(ProgramPoint(0), ProgramPoint(1))]);
        for (_, piece) in &split.children {
            assert!(piece.sites().len() < parent.sites().len());
        }
        let summary: Vec<(u32, SpillDirection)> =
            split.requests.iter().map(|r| (r.point, r.direction)).collect();
        assert_eq!(
            summary,
            vec![
                (0, SpillDirection::Entry),
                (2, SpillDirection::Load),
                (5, SpillDirection::Load),
            ]
        );
        assert_eq!(split.requests[0].to_string(), "store v1 slot0 before inst 0");
    }

    #[test]
    fn test_entry_merged_with_first_use() {
        // Read by instruction 0 and again at 3: the first piece takes the
        // incoming register as is, with no reload
        let mut parent = LiveInterval::new();
        parent.add_range(LiveRange::new(ProgramPoint(0), ProgramPoint(7)));
        parent.add_site(UseSite::entry(0, 0));
        parent.add_site(UseSite::use_(0, 0));
        parent.add_site(UseSite::use_(3, 0));

        let split = split_at_sites(&parent, SpillSlot(0), || VReg(9));
        let directions: Vec<SpillDirection> = split.requests.iter().map(|r| r.direction).collect();
        assert_eq!(directions, vec![SpillDirection::Entry, SpillDirection::Load]);
        assert!(SpillDirection::Entry < SpillDirection::Load);
        assert!(SpillDirection::Entry.is_store());
    }

    #[test]
    fn test_slots_per_origin() {
        let mut slots = SpillSlots::new();
        assert_eq!(slots.slot_for(VReg(4)), SpillSlot(0));
        assert_eq!(slots.slot_for(VReg(9)), SpillSlot(1));
        assert_eq!(slots.slot_for(VReg(4)), SpillSlot(0));
        assert_eq!(slots.into_map().len(), 2);
    }
}
