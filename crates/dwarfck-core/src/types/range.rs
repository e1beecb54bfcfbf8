//! Address range type.

use std::fmt;

/// Half-open address interval `[low, high)`
///
/// This is the unit the range checks work with. It is produced by the decoder
/// from `DW_AT_low_pc`/`DW_AT_high_pc` pairs and from `DW_AT_ranges` lists,
/// and compared by the range-set engine in
/// [`DieRangeInfo`](crate::verifier::DieRangeInfo).
///
/// Ordering is lexicographic on `(low, high)`, which is the order the range
/// engine keeps its sorted vectors in.
///
/// ## Validity
///
/// A range is *valid* when `low <= high`. An empty range (`low == high`) is
/// valid but covers no address, so it never overlaps another range.
///
/// ## Example
///
/// ```rust
/// use dwarfck_core::types::AddressRange;
///
/// let a = AddressRange::new(0x10, 0x20);
/// let b = AddressRange::new(0x18, 0x30);
/// assert!(a.intersects(&b));
/// assert_eq!(a.union(&b), AddressRange::new(0x10, 0x30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AddressRange
{
    /// First address covered by the range
    pub low: u64,
    /// One past the last address covered by the range
    pub high: u64,
}

impl AddressRange
{
    /// Create a range from its bounds
    pub const fn new(low: u64, high: u64) -> Self
    {
        Self { low, high }
    }

    /// `low <= high`
    pub const fn is_valid(&self) -> bool
    {
        self.low <= self.high
    }

    /// `low == high`; such a range covers no address
    pub const fn is_empty(&self) -> bool
    {
        self.low == self.high
    }

    /// Number of bytes covered, zero for invalid ranges
    pub const fn size(&self) -> u64
    {
        self.high.saturating_sub(self.low)
    }

    /// Do `self` and `other` share at least one address?
    ///
    /// `[a,b)` and `[c,d)` overlap iff `a < d && c < b`. Empty ranges cover
    /// nothing and never overlap.
    ///
    /// ```rust
    /// use dwarfck_core::types::AddressRange;
    ///
    /// // Touching ranges do not overlap
    /// assert!(!AddressRange::new(0, 10).intersects(&AddressRange::new(10, 20)));
    /// // Empty ranges never overlap
    /// assert!(!AddressRange::new(0, 10).intersects(&AddressRange::new(5, 5)));
    /// ```
    pub const fn intersects(&self, other: &AddressRange) -> bool
    {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.low < other.high && other.low < self.high
    }

    /// Smallest range covering both `self` and `other`
    #[must_use]
    pub fn union(&self, other: &AddressRange) -> AddressRange
    {
        AddressRange {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }

    /// Widen `self` to also cover `other` if the two overlap
    ///
    /// Returns `true` when the ranges overlapped and `self` was widened.
    pub fn merge(&mut self, other: &AddressRange) -> bool
    {
        if !self.intersects(other) {
            return false;
        }
        *self = self.union(other);
        true
    }
}

impl From<(u64, u64)> for AddressRange
{
    fn from((low, high): (u64, u64)) -> Self
    {
        AddressRange { low, high }
    }
}

impl fmt::Display for AddressRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[0x{:016x}, 0x{:016x})", self.low, self.high)
    }
}
