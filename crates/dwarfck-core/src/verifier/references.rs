//! Closing pass over recorded entry references.

use std::collections::{BTreeMap, BTreeSet};

use super::Verifier;
use crate::types::{Unit, UnitSection};

/// Referenced offset to the offsets of the entries that reference it
pub type ReferenceMap = BTreeMap<u64, BTreeSet<u64>>;

/// Fold `other` into `into`
pub(crate) fn merge_references(into: &mut ReferenceMap, other: ReferenceMap)
{
    for (target, sources) in other {
        into.entry(target).or_default().extend(sources);
    }
}

impl Verifier<'_>
{
    /// Check unit-relative references recorded while walking `unit`
    pub(crate) fn verify_unit_references(&self, unit: &Unit, references: &ReferenceMap)
    {
        self.verify_references(references, |target| unit.entry_at(target).is_some());
    }

    /// Check `DW_FORM_ref_addr` references gathered from every unit
    pub(crate) fn verify_cross_unit_references(&self, references: &ReferenceMap)
    {
        self.verify_references(references, |target| {
            self.data.die_for_offset(UnitSection::Info, target).is_some()
        });
    }

    /// Report every source of a target with no entry at exactly that offset
    fn verify_references(&self, references: &ReferenceMap, exists: impl Fn(u64) -> bool)
    {
        for (target, sources) in references {
            if exists(*target) {
                continue;
            }
            for source in sources {
                self.aggregator.report("Invalid DIE reference", || {
                    format!(
                        "invalid DIE reference 0x{target:08x} from DIE at 0x{source:08x}: offset is in between DIEs"
                    )
                });
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn merge_unions_sources()
    {
        let mut a = ReferenceMap::new();
        a.entry(0x40).or_default().insert(0x10);
        let mut b = ReferenceMap::new();
        b.entry(0x40).or_default().insert(0x20);
        b.entry(0x50).or_default().insert(0x10);

        merge_references(&mut a, b);
        assert_eq!(a[&0x40], BTreeSet::from([0x10, 0x20]));
        assert_eq!(a[&0x50], BTreeSet::from([0x10]));
    }
}
