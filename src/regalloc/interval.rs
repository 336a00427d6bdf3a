//! Live intervals over program points.
//!
//! Instructions are numbered globally in block layout order. Instruction `i`
//! owns two program points: the use slot `2i` and the def slot `2i + 1`. A
//! value read by `i` is live through `2i`; a value written by `i` becomes
//! live at `2i + 1`. An operand that dies at `i` therefore never interferes
//! with the result `i` defines.

use serde::Serialize;
use std::fmt;

/// A position in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProgramPoint(pub u32);

impl ProgramPoint {
    /// Slot where instruction `inst` reads its operands.
    #[inline]
    pub fn use_slot(inst: u32) -> Self {
        ProgramPoint(inst * 2)
    }

    /// Slot where instruction `inst` writes its result.
    #[inline]
    pub fn def_slot(inst: u32) -> Self {
        ProgramPoint(inst * 2 + 1)
    }

    /// First point after instruction `inst`.
    #[inline]
    pub fn after(inst: u32) -> Self {
        ProgramPoint(inst * 2 + 2)
    }

    /// Instruction this point belongs to.
    #[inline]
    pub fn inst(self) -> u32 {
        self.0 / 2
    }

    #[inline]
    pub fn is_def_slot(self) -> bool {
        self.0 % 2 == 1
    }
}

impl fmt::Display for ProgramPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = if self.is_def_slot() { 'd' } else { 'u' };
        write!(f, "{}{}", self.inst(), slot)
    }
}

/// Half-open range of program points `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiveRange {
    pub start: ProgramPoint,
    pub end: ProgramPoint,
}

impl LiveRange {
    pub fn new(start: ProgramPoint, end: ProgramPoint) -> Self {
        debug_assert!(start < end, "empty live range {}..{}", start, end);
        Self { start, end }
    }

    /// Check if this range overlaps with another.
    pub fn overlaps(&self, other: &LiveRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Does the range contain `point`?
    pub fn contains(&self, point: ProgramPoint) -> bool {
        self.start <= point && point < self.end
    }

    /// Number of points covered.
    pub fn len(&self) -> u32 {
        self.end.0 - self.start.0
    }
}

impl fmt::Display for LiveRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// One instruction that reads and/or writes the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UseSite {
    /// Global instruction index
    pub inst: u32,
    /// The instruction writes the register
    pub is_def: bool,
    /// The instruction reads the register
    pub is_use: bool,
    /// The register arrives already holding a value at function entry,
    /// just before this instruction (always instruction 0)
    pub at_entry: bool,
    /// Loop nesting depth of the containing block
    pub loop_depth: u32,
}

impl UseSite {
    pub fn def(inst: u32, loop_depth: u32) -> Self {
        Self { inst, is_def: true, is_use: false, at_entry: false, loop_depth }
    }

    pub fn use_(inst: u32, loop_depth: u32) -> Self {
        Self { inst, is_def: false, is_use: true, at_entry: false, loop_depth }
    }

    /// Definition by the caller, for registers live into the function.
    pub fn entry(inst: u32, loop_depth: u32) -> Self {
        Self { inst, is_def: false, is_use: false, at_entry: true, loop_depth }
    }

    /// Read and written by the same instruction.
    pub fn read_write(inst: u32, loop_depth: u32) -> Self {
        Self { inst, is_def: true, is_use: true, at_entry: false, loop_depth }
    }

    /// The smallest range that keeps the register available to this
    /// instruction alone.
    pub fn slot_range(&self) -> LiveRange {
        let start = if self.is_use || self.at_entry {
            ProgramPoint::use_slot(self.inst)
        } else {
            ProgramPoint::def_slot(self.inst)
        };
        let end = if self.is_def {
            ProgramPoint::after(self.inst)
        } else {
            ProgramPoint::def_slot(self.inst)
        };
        LiveRange::new(start, end)
    }
}

/// The live interval of a virtual register: sorted disjoint ranges plus the
/// instructions that touch it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveInterval {
    ranges: Vec<LiveRange>,
    sites: Vec<UseSite>,
}

impl LiveInterval {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interval made of exactly one instruction's slots.
    pub fn for_site(site: UseSite) -> Self {
        Self {
            ranges: vec![site.slot_range()],
            sites: vec![site],
        }
    }

    /// Add a range, merging it with any range it overlaps or touches.
    pub fn add_range(&mut self, range: LiveRange) {
        let mut merged = range;
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;

        for r in self.ranges.drain(..) {
            if r.end < merged.start {
                kept.push(r);
            } else if merged.end < r.start {
                if !placed {
                    kept.push(merged);
                    placed = true;
                }
                kept.push(r);
            } else {
                merged.start = merged.start.min(r.start);
                merged.end = merged.end.max(r.end);
            }
        }
        if !placed {
            kept.push(merged);
        }
        self.ranges = kept;
    }

    /// Record a def/use site. Two sites on the same instruction merge.
    pub fn add_site(&mut self, site: UseSite) {
        match self.sites.binary_search_by_key(&site.inst, |s| s.inst) {
            Ok(idx) => {
                let existing = &mut self.sites[idx];
                existing.is_def |= site.is_def;
                existing.is_use |= site.is_use;
                existing.at_entry |= site.at_entry;
            }
            Err(idx) => self.sites.insert(idx, site),
        }
    }

    pub fn ranges(&self) -> &[LiveRange] {
        &self.ranges
    }

    /// Sites in instruction order.
    pub fn sites(&self) -> &[UseSite] {
        &self.sites
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// First covered point.
    pub fn start(&self) -> Option<ProgramPoint> {
        self.ranges.first().map(|r| r.start)
    }

    /// One past the last covered point.
    pub fn end(&self) -> Option<ProgramPoint> {
        self.ranges.last().map(|r| r.end)
    }

    /// Total number of covered points.
    pub fn size(&self) -> u32 {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    pub fn contains(&self, point: ProgramPoint) -> bool {
        self.ranges.iter().any(|r| r.contains(point))
    }

    /// Does any range of `self` overlap any range of `other`?
    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let a = &self.ranges[i];
            let b = &other.ranges[j];
            if a.overlaps(b) {
                return true;
            }
            if a.end <= b.start {
                i += 1;
            } else {
                j += 1;
            }
        }
        false
    }

    /// Is every point of `self` also covered by `other`?
    pub fn is_subset_of(&self, other: &LiveInterval) -> bool {
        self.ranges.iter().all(|r| {
            other
                .ranges
                .iter()
                .any(|o| o.start <= r.start && r.end <= o.end)
        })
    }

    /// Would splitting at the def/use sites shrink this interval?
    ///
    /// An interval that already consists of one instruction's slots cannot
    /// be made any smaller, so spilling it would only reproduce it.
    pub fn can_shrink(&self) -> bool {
        match self.sites.as_slice() {
            [] => false,
            [site] => self.ranges != [site.slot_range()],
            _ => true,
        }
    }
}

impl fmt::Display for LiveInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}
