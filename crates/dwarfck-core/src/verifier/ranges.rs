//! Range sets of one entry and its children.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::types::{AddressRange, DieRef};

/// Address ranges of one entry plus the range sets of its children
///
/// `ranges` stays sorted and free of overlaps after every [`insert`]. The
/// children are a set ordered by `(ranges, entry)`, so two children with the
/// same range set and entry collapse into one.
///
/// [`insert`]: DieRangeInfo::insert
#[derive(Debug, Clone, Default)]
pub struct DieRangeInfo
{
    pub entry: Option<DieRef>,
    pub ranges: Vec<AddressRange>,
    pub children: BTreeSet<DieRangeInfo>,
}

impl PartialEq for DieRangeInfo
{
    fn eq(&self, other: &Self) -> bool
    {
        self.ranges == other.ranges && self.entry == other.entry
    }
}

impl Eq for DieRangeInfo {}

impl PartialOrd for DieRangeInfo
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering>
    {
        Some(self.cmp(other))
    }
}

impl Ord for DieRangeInfo
{
    fn cmp(&self, other: &Self) -> Ordering
    {
        self.ranges
            .cmp(&other.ranges)
            .then_with(|| self.entry.cmp(&other.entry))
    }
}

impl DieRangeInfo
{
    pub fn new(entry: Option<DieRef>) -> Self
    {
        Self {
            entry,
            ranges: Vec::new(),
            children: BTreeSet::new(),
        }
    }

    pub fn with_ranges(entry: Option<DieRef>, ranges: Vec<AddressRange>) -> Self
    {
        Self {
            entry,
            ranges,
            children: BTreeSet::new(),
        }
    }

    /// Add `range`, keeping the list sorted and non-overlapping
    ///
    /// Returns the lowest range `range` overlapped, as it was before being
    /// widened. Every range the widened union overlaps is folded into it, so
    /// a range bridging two others leaves one range behind. An exact
    /// duplicate is dropped and returns `None`.
    ///
    /// ```rust
    /// use dwarfck_core::types::AddressRange;
    /// use dwarfck_core::verifier::DieRangeInfo;
    ///
    /// let mut info = DieRangeInfo::default();
    /// assert_eq!(info.insert(AddressRange::new(0, 10)), None);
    /// assert_eq!(info.insert(AddressRange::new(5, 15)), Some(AddressRange::new(0, 10)));
    /// assert_eq!(info.ranges, vec![AddressRange::new(0, 15)]);
    /// ```
    pub fn insert(&mut self, range: AddressRange) -> Option<AddressRange>
    {
        let pos = self.ranges.partition_point(|r| *r < range);
        if self.ranges.get(pos) == Some(&range) {
            return None;
        }

        let Some(original) = self.ranges.iter().find(|r| r.intersects(&range)).copied() else {
            self.ranges.insert(pos, range);
            return None;
        };
        // Ranges are sorted by low bound, so the union only grows forward
        let mut merged = range;
        self.ranges.retain(|r| {
            if r.intersects(&merged) {
                merged = merged.union(r);
                false
            } else {
                true
            }
        });
        let pos = self.ranges.partition_point(|r| *r < merged);
        self.ranges.insert(pos, merged);
        Some(original)
    }

    /// Add the range set of a child entry
    ///
    /// A child with no ranges is ignored. When the child overlaps a sibling
    /// already recorded, that sibling is returned and the child is not
    /// added. A child whose range set equals a sibling's is not added twice.
    pub fn insert_child(&mut self, child: DieRangeInfo) -> Option<&DieRangeInfo>
    {
        if child.ranges.is_empty() {
            return None;
        }
        // Look the sibling up again so no borrow is held across the insert
        let overlapping = self
            .children
            .iter()
            .find(|sibling| sibling.intersects(&child))
            .map(|sibling| (sibling.ranges.clone(), sibling.entry));
        if let Some((ranges, entry)) = overlapping {
            let key = DieRangeInfo::with_ranges(entry, ranges);
            return self.children.get(&key);
        }
        if self.children.iter().any(|sibling| sibling.ranges == child.ranges) {
            return None;
        }
        self.children.insert(child);
        None
    }

    /// Is every range of `other` covered by this set's ranges?
    ///
    /// A range may be covered by several adjacent ranges of this set. Empty
    /// ranges, and an empty `other`, are always covered.
    pub fn contains(&self, other: &DieRangeInfo) -> bool
    {
        let mut mine = self.ranges.iter().peekable();
        let mut theirs = other.ranges.iter();
        let Some(first) = theirs.next() else {
            return true;
        };
        let mut current = *first;

        loop {
            if current.is_empty() {
                match theirs.next() {
                    Some(next) => {
                        current = *next;
                        continue;
                    }
                    None => return true,
                }
            }
            let Some(range) = mine.peek() else {
                return false;
            };
            let covered = range.low <= current.low;
            if covered && current.high <= range.high {
                match theirs.next() {
                    Some(next) => {
                        current = *next;
                        continue;
                    }
                    None => return true,
                }
            }
            if !covered {
                return false;
            }
            if current.low < range.high {
                current.low = range.high;
            }
            mine.next();
        }
    }

    /// Does any range of this set overlap any range of `other`?
    ///
    /// Identical ranges are not counted as overlapping.
    pub fn intersects(&self, other: &DieRangeInfo) -> bool
    {
        let mut mine = self.ranges.iter().peekable();
        let mut theirs = other.ranges.iter().peekable();
        while let (Some(a), Some(b)) = (mine.peek(), theirs.peek()) {
            if a != b && a.intersects(b) {
                return true;
            }
            if a.low < b.low {
                mine.next();
            } else {
                theirs.next();
            }
        }
        false
    }
}
