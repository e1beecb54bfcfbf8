//! Per-unit content walk: root entry, attributes, forms, call sites and
//! address ranges.

use gimli::{constants, DwAt, DwTag};
use tracing::trace;

use super::ranges::DieRangeInfo;
use super::references::ReferenceMap;
use super::strings::resolve_string;
use super::tags::{is_type_tag, is_unit_tag, tag_name, unit_type_matches_tag};
use super::Verifier;
use crate::types::{Attribute, AttrValue, Die, Locations, ObjectKind, Unit};

/// Attributes that mark a subprogram as describing its call sites
const CALL_ATTRIBUTES: [DwAt; 6] = [
    constants::DW_AT_call_all_calls,
    constants::DW_AT_call_all_source_calls,
    constants::DW_AT_call_all_tail_calls,
    constants::DW_AT_GNU_all_call_sites,
    constants::DW_AT_GNU_all_source_call_sites,
    constants::DW_AT_GNU_all_tail_call_sites,
];

/// Value as a section offset, the way DWARF 2 and 3 also allowed
/// `DW_FORM_data4`/`DW_FORM_data8` to encode one
fn section_offset(attr: &Attribute, version: u16) -> Option<u64>
{
    match attr.value {
        AttrValue::SecOffset(offset) => Some(offset),
        AttrValue::Constant(offset)
            if version < 4 && matches!(attr.form, constants::DW_FORM_data4 | constants::DW_FORM_data8) =>
        {
            Some(offset)
        }
        _ => None,
    }
}

impl Verifier<'_>
{
    /// Verify one accepted unit
    ///
    /// Unit-relative references are checked before returning. The
    /// `DW_FORM_ref_addr` references found are returned for the cross-unit
    /// pass.
    pub(crate) fn verify_unit(&self, unit: &Unit) -> ReferenceMap
    {
        trace!(section = unit.section.name(), offset = unit.offset, entries = unit.entries.len(), "verifying unit");
        let mut local = ReferenceMap::new();
        let mut cross = ReferenceMap::new();

        for die in &unit.entries {
            for attr in &die.attrs {
                self.verify_attribute_value(unit, die, attr);
                self.verify_form_value(unit, die, attr, &mut local, &mut cross);
            }
            self.verify_call_site(unit, die);
        }

        if self.verify_unit_root(unit) {
            let mut root = DieRangeInfo::default();
            self.verify_die_ranges(unit, 0, &mut root, None);
        }

        self.verify_unit_references(unit, &local);
        cross
    }

    /// Root entry checks; `false` when there is no root to walk
    fn verify_unit_root(&self, unit: &Unit) -> bool
    {
        let Some(root) = unit.root() else {
            self.aggregator.report("Compilation unit missing DIE", || {
                format!("unit at 0x{:08x} has no DIE", unit.offset)
            });
            return false;
        };

        if !is_unit_tag(root.tag) {
            self.aggregator.report("Compilation unit root DIE is not a unit DIE", || {
                format!(
                    "unit at 0x{:08x}: root DIE is not a unit DIE: {}",
                    unit.offset,
                    tag_name(root.tag)
                )
            });
        }
        if !unit_type_matches_tag(unit.unit_type, unit.version, root.tag) {
            self.aggregator.report("Mismatched unit type", || {
                format!(
                    "unit at 0x{:08x}: unit type ({}) and root DIE ({}) do not match",
                    unit.offset,
                    unit.unit_type,
                    tag_name(root.tag)
                )
            });
        }
        if root.tag == constants::DW_TAG_skeleton_unit && root.has_children {
            self.aggregator.report("Skeleton CU has children", || {
                format!("skeleton unit at 0x{:08x} has children", unit.offset)
            });
        }
        true
    }

    /// Check the ranges of entry `index` against `parent`, then recurse
    fn verify_die_ranges(&self, unit: &Unit, index: usize, parent: &mut DieRangeInfo, parent_tag: Option<DwTag>)
    {
        let die = &unit.entries[index];
        let ranges = match &die.ranges {
            Ok(ranges) => ranges,
            Err(err) => {
                self.aggregator.report("Unresolvable DIE address ranges", || {
                    format!("DIE at 0x{:08x}: cannot resolve address ranges: {err}", die.offset)
                });
                return;
            }
        };

        let mut info = DieRangeInfo::new(Some(unit.die_ref(die)));
        let skip_own_ranges =
            self.data.object_kind == ObjectKind::Relocatable && die.tag == constants::DW_TAG_compile_unit;
        if !skip_own_ranges {
            for range in ranges {
                if !range.is_valid() {
                    self.aggregator.report("Invalid address range", || {
                        format!("DIE at 0x{:08x}: invalid address range {range}", die.offset)
                    });
                    continue;
                }
                if let Some(previous) = info.insert(*range) {
                    self.aggregator.report("DIE has overlapping DW_AT_ranges", || {
                        format!(
                            "DIE at 0x{:08x} has overlapping ranges in DW_AT_ranges attribute: {previous} and {range}",
                            die.offset
                        )
                    });
                }
            }
        }

        let placed = DieRangeInfo::with_ranges(info.entry, info.ranges.clone());
        if let Some(sibling) = parent.insert_child(placed) {
            let sibling = sibling.entry;
            self.aggregator.report("DIEs have overlapping address ranges", || {
                let sibling = sibling.map_or_else(|| String::from("<none>"), |s| s.to_string());
                format!("DIEs at 0x{:08x} and {sibling} have overlapping address ranges", die.offset)
            });
        }

        let nested_subprogram = die.is_subprogram() && parent_tag == Some(constants::DW_TAG_subprogram);
        let should_be_contained = !info.ranges.is_empty() && !parent.ranges.is_empty() && !nested_subprogram;
        if should_be_contained && !parent.contains(&info) {
            self.aggregator
                .report("DIE address ranges are not contained by parent ranges", || {
                    let parent = parent.entry.map_or_else(|| String::from("<none>"), |p| p.to_string());
                    format!(
                        "DIE at 0x{:08x}: address ranges are not contained in the ranges of its parent {parent}",
                        die.offset
                    )
                });
        }

        for &child in &die.children {
            self.verify_die_ranges(unit, child, &mut info, Some(die.tag));
        }
    }

    fn report_die(&self, category: &str, die: &Die, detail: impl FnOnce() -> String)
    {
        self.aggregator
            .report(category, || format!("DIE at 0x{:08x}: {}", die.offset, detail()));
    }

    /// Semantic checks for attributes whose meaning the verifier knows
    fn verify_attribute_value(&self, unit: &Unit, die: &Die, attr: &Attribute)
    {
        let name = attr.name;
        let form = attr.form;
        match name {
            constants::DW_AT_ranges => {
                if matches!(attr.value, AttrValue::RangeListIndex(_)) {
                    return;
                }
                let Some(offset) = section_offset(attr, unit.version) else {
                    self.report_die("Invalid DW_AT_ranges encoding", die, || {
                        format!("DW_AT_ranges has invalid encoding {form}")
                    });
                    return;
                };
                let (section, section_name) = if unit.version < 5 {
                    (&self.data.sections.debug_ranges, ".debug_ranges")
                } else {
                    (&self.data.sections.debug_rnglists, ".debug_rnglists")
                };
                if offset >= section.len() as u64 {
                    self.report_die("DW_AT_ranges offset out of bounds", die, || {
                        format!("DW_AT_ranges offset is beyond {section_name} bounds: 0x{offset:08x}")
                    });
                }
            }
            constants::DW_AT_stmt_list => {
                let Some(offset) = section_offset(attr, unit.version) else {
                    self.report_die("Invalid DW_AT_stmt_list encoding", die, || {
                        format!("DW_AT_stmt_list has invalid encoding {form}")
                    });
                    return;
                };
                if offset >= self.data.sections.debug_line.len() as u64 {
                    self.report_die("DW_AT_stmt_list offset out of bounds", die, || {
                        format!("DW_AT_stmt_list offset is beyond .debug_line bounds: 0x{offset:08x}")
                    });
                }
            }
            constants::DW_AT_location => self.verify_location(unit, die),
            constants::DW_AT_specification | constants::DW_AT_abstract_origin => {
                let Some((_, target)) = self.data.resolve_reference(unit, &attr.value) else {
                    return;
                };
                let compatible = die.tag == target.tag
                    || matches!(
                        (die.tag, target.tag),
                        (constants::DW_TAG_inlined_subroutine, constants::DW_TAG_subprogram)
                            | (constants::DW_TAG_variable, constants::DW_TAG_member)
                            | (constants::DW_TAG_GNU_call_site, constants::DW_TAG_subprogram)
                    );
                if !compatible {
                    self.report_die("Incompatible DW_AT_abstract_origin tag reference", die, || {
                        format!(
                            "DIE with tag {} has {name} that points to DIE with incompatible tag {}",
                            tag_name(die.tag),
                            tag_name(target.tag)
                        )
                    });
                }
            }
            constants::DW_AT_type => {
                if let Some((_, target)) = self.data.resolve_reference(unit, &attr.value) {
                    if !is_type_tag(target.tag) {
                        self.report_die("Incompatible DW_AT_type attribute tag", die, || {
                            format!("DW_AT_type references DIE with incompatible tag {}", tag_name(target.tag))
                        });
                    }
                }
            }
            constants::DW_AT_decl_file | constants::DW_AT_call_file => {
                let Some(index) = attr.value.as_unsigned() else {
                    self.report_die(&format!("Invalid encoding in {name}"), die, || {
                        format!("{name} has invalid encoding {form}")
                    });
                    return;
                };
                let Some(table) = self.data.line_table_for_unit(unit) else {
                    self.report_die(&format!("File index in {name} reference CU with no line table"), die, || {
                        format!("{name} references file {index} and the unit has no line table")
                    });
                    return;
                };
                if !table.has_file_at_index(index) {
                    self.report_die(&format!("Invalid file index in {name}"), die, || match table.file_index_bounds() {
                        Some((first, last)) => {
                            format!("{name} has an invalid file index {index} (valid values are [{first}-{last}])")
                        }
                        None => {
                            format!("{name} has an invalid file index {index} (the file table in the prologue is empty)")
                        }
                    });
                }
            }
            constants::DW_AT_decl_line | constants::DW_AT_call_line => {
                if attr.value.as_unsigned().is_none() {
                    self.report_die(&format!("Invalid encoding in {name}"), die, || {
                        format!("{name} has invalid encoding {form}")
                    });
                }
            }
            _ => {}
        }
    }

    fn verify_location(&self, unit: &Unit, die: &Die)
    {
        match &die.locations {
            Some(Locations::Unresolved(err)) => {
                self.aggregator.report("Invalid DW_AT_location", || {
                    format!("DIE at 0x{:08x}: {err}", die.offset)
                });
            }
            Some(locations) => {
                for expr in locations.expressions() {
                    if let Err(err) = self.verify_expression(unit, expr) {
                        self.aggregator.report("Invalid DWARF expressions", || {
                            format!("DIE at 0x{:08x} contains invalid DWARF expression: {err}", die.offset)
                        });
                    }
                }
            }
            None => {}
        }
    }

    /// Encoding checks that depend only on the form
    fn verify_form_value(
        &self,
        unit: &Unit,
        die: &Die,
        attr: &Attribute,
        local: &mut ReferenceMap,
        cross: &mut ReferenceMap,
    )
    {
        match attr.value {
            AttrValue::UnitRef(rel) => {
                let size = unit.size();
                if rel >= size {
                    self.aggregator.report("Invalid CU offset", || {
                        format!(
                            "DIE at 0x{:08x}: {} CU offset 0x{rel:08x} is invalid (must be less than CU size of 0x{size:08x})",
                            die.offset, attr.form
                        )
                    });
                } else {
                    local.entry(unit.offset + rel).or_default().insert(die.offset);
                }
            }
            AttrValue::InfoRef(target) => {
                if target >= self.data.sections.debug_info.len() as u64 {
                    self.aggregator.report("DW_FORM_ref_addr offset out of bounds", || {
                        format!(
                            "DIE at 0x{:08x}: DW_FORM_ref_addr offset 0x{target:08x} is beyond .debug_info bounds",
                            die.offset
                        )
                    });
                } else {
                    cross.entry(target).or_default().insert(die.offset);
                }
            }
            AttrValue::StrOffset(_) | AttrValue::LineStrOffset(_) | AttrValue::StrIndex(_) => {
                if let Err(err) = resolve_string(self.data, unit, &attr.value) {
                    self.aggregator.report("Invalid DW_FORM attribute", || {
                        format!("DIE at 0x{:08x}: {err}", die.offset)
                    });
                }
            }
            _ => {}
        }
    }

    /// Call-site entries must sit in a subprogram that describes its calls
    fn verify_call_site(&self, unit: &Unit, die: &Die)
    {
        if !matches!(die.tag, constants::DW_TAG_call_site | constants::DW_TAG_GNU_call_site) {
            return;
        }

        let mut current = unit.parent_of(die);
        while let Some(ancestor) = current {
            if ancestor.is_subprogram() {
                break;
            }
            if ancestor.tag == constants::DW_TAG_inlined_subroutine {
                self.aggregator.report("Call site nested entry within inlined subroutine", || {
                    format!("call site entry at 0x{:08x} is nested within an inlined subroutine", die.offset)
                });
                return;
            }
            current = unit.parent_of(ancestor);
        }

        let Some(subprogram) = current else {
            self.aggregator.report("Call site entry not nested within valid subprogram", || {
                format!("call site entry at 0x{:08x} is not nested within a subprogram", die.offset)
            });
            return;
        };
        if !CALL_ATTRIBUTES.iter().any(|name| subprogram.has_attr(*name)) {
            self.aggregator
                .report("Subprogram with call site entry has no DW_AT_call attribute", || {
                    format!(
                        "subprogram at 0x{:08x} has call site entry 0x{:08x} but no DW_AT_call_all_calls or equivalent",
                        subprogram.offset, die.offset
                    )
                });
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::BTreeMap;

    use gimli::RunTimeEndian;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::{AddressRange, DebugData, LineFile, LineTable, UnitSection};
    use crate::verifier::references::{merge_references, ReferenceMap};
    use crate::verifier::VerifierOptions;

    const UNIT_LENGTH: u64 = 0x100;

    fn unit(version: u16, unit_type: gimli::DwUt, root_tag: DwTag) -> Unit
    {
        let mut unit = Unit::new(UnitSection::Info, 0, UNIT_LENGTH, version, unit_type, 8);
        unit.push_entry(None, Die::new(0x0c, root_tag));
        unit
    }

    fn compile_unit() -> Unit
    {
        unit(4, constants::DW_UT_compile, constants::DW_TAG_compile_unit)
    }

    fn data(units: Vec<Unit>) -> DebugData
    {
        let mut data = DebugData::new(RunTimeEndian::Little);
        data.sections.debug_info = vec![0; 0x200];
        data.sections.debug_str = b"\0main\0".to_vec();
        data.units = units;
        data
    }

    fn subprogram(offset: u64, low: u64, high: u64) -> Die
    {
        Die::new(offset, constants::DW_TAG_subprogram).with_ranges(vec![AddressRange::new(low, high)])
    }

    /// Walk every unit, then the cross-unit references, the way the
    /// `.debug_info` pass does
    fn categories(data: &DebugData) -> BTreeMap<String, u32>
    {
        let verifier = Verifier::new(data, VerifierOptions::default());
        let mut cross = ReferenceMap::new();
        for unit in &data.units {
            merge_references(&mut cross, verifier.verify_unit(unit));
        }
        verifier.verify_cross_unit_references(&cross);
        verifier
            .aggregator()
            .snapshot()
            .into_iter()
            .map(|(category, counts)| (category, counts.overall_count))
            .collect()
    }

    fn single(category: &str) -> BTreeMap<String, u32>
    {
        BTreeMap::from([(category.to_string(), 1)])
    }

    #[test]
    fn unit_without_entries()
    {
        let unit = Unit::new(UnitSection::Info, 0, UNIT_LENGTH, 4, constants::DW_UT_compile, 8);
        assert_eq!(categories(&data(vec![unit])), single("Compilation unit missing DIE"));
    }

    #[test]
    fn root_is_not_a_unit_entry()
    {
        let unit = unit(5, constants::DW_UT_compile, constants::DW_TAG_subprogram);
        assert_eq!(
            categories(&data(vec![unit])),
            BTreeMap::from([
                (String::from("Compilation unit root DIE is not a unit DIE"), 1),
                (String::from("Mismatched unit type"), 1),
            ])
        );
    }

    #[test]
    fn partial_unit_needs_its_own_type_from_version_5()
    {
        let v4 = unit(4, constants::DW_UT_compile, constants::DW_TAG_partial_unit);
        assert_eq!(categories(&data(vec![v4])), BTreeMap::new());

        let v5 = unit(5, constants::DW_UT_compile, constants::DW_TAG_partial_unit);
        assert_eq!(categories(&data(vec![v5])), single("Mismatched unit type"));

        let partial = unit(5, constants::DW_UT_partial, constants::DW_TAG_partial_unit);
        assert_eq!(categories(&data(vec![partial])), BTreeMap::new());
    }

    #[test]
    fn skeleton_unit_with_children()
    {
        let mut unit = unit(5, constants::DW_UT_skeleton, constants::DW_TAG_skeleton_unit);
        assert_eq!(categories(&data(vec![unit.clone()])), BTreeMap::new());

        unit.push_entry(Some(0), Die::new(0x20, constants::DW_TAG_variable));
        assert_eq!(categories(&data(vec![unit])), single("Skeleton CU has children"));
    }

    #[test]
    fn unresolvable_ranges()
    {
        let mut unit = compile_unit();
        let mut die = Die::new(0x20, constants::DW_TAG_subprogram);
        die.ranges = Err(String::from("range list offset 0x40 is out of bounds"));
        unit.push_entry(Some(0), die);
        assert_eq!(categories(&data(vec![unit])), single("Unresolvable DIE address ranges"));
    }

    #[test]
    fn inverted_range()
    {
        let mut unit = compile_unit();
        unit.push_entry(Some(0), subprogram(0x20, 0x1010, 0x1000));
        assert_eq!(categories(&data(vec![unit])), single("Invalid address range"));
    }

    #[test]
    fn overlapping_ranges_of_one_entry()
    {
        let mut unit = compile_unit();
        unit.push_entry(
            Some(0),
            Die::new(0x20, constants::DW_TAG_subprogram)
                .with_ranges(vec![AddressRange::new(0x1000, 0x1020), AddressRange::new(0x1018, 0x1030)]),
        );
        assert_eq!(categories(&data(vec![unit])), single("DIE has overlapping DW_AT_ranges"));
    }

    #[test]
    fn overlapping_siblings()
    {
        let mut unit = compile_unit();
        unit.push_entry(Some(0), subprogram(0x20, 0x1000, 0x1020));
        unit.push_entry(Some(0), subprogram(0x30, 0x1018, 0x1030));
        assert_eq!(categories(&data(vec![unit])), single("DIEs have overlapping address ranges"));
    }

    #[test]
    fn adjacent_siblings_inside_parent()
    {
        let mut unit = compile_unit();
        unit.entries[0] = Die::new(0x0c, constants::DW_TAG_compile_unit)
            .with_ranges(vec![AddressRange::new(0x1000, 0x1020), AddressRange::new(0x1020, 0x1040)]);
        unit.push_entry(Some(0), subprogram(0x20, 0x1000, 0x1020));
        unit.push_entry(Some(0), subprogram(0x30, 0x1010, 0x1010));
        unit.push_entry(Some(0), subprogram(0x40, 0x1020, 0x1040));
        assert_eq!(categories(&data(vec![unit])), BTreeMap::new());
    }

    fn escaping_child() -> DebugData
    {
        let mut unit = compile_unit();
        unit.entries[0] = Die::new(0x0c, constants::DW_TAG_compile_unit)
            .with_ranges(vec![AddressRange::new(0x1000, 0x1100)]);
        unit.push_entry(Some(0), subprogram(0x20, 0x10f0, 0x1110));
        data(vec![unit])
    }

    #[test]
    fn child_outside_parent()
    {
        assert_eq!(
            categories(&escaping_child()),
            single("DIE address ranges are not contained by parent ranges")
        );
    }

    #[test]
    fn relocatable_objects_skip_compile_unit_ranges()
    {
        let mut data = escaping_child();
        data.object_kind = ObjectKind::Relocatable;
        assert_eq!(categories(&data), BTreeMap::new());

        data.object_kind = ObjectKind::MachORelocatable;
        assert_eq!(
            categories(&data),
            single("DIE address ranges are not contained by parent ranges")
        );
    }

    #[test]
    fn nested_subprogram_may_leave_its_parent()
    {
        let mut unit = compile_unit();
        let outer = unit.push_entry(Some(0), subprogram(0x20, 0x1000, 0x1010));
        unit.push_entry(Some(outer), subprogram(0x30, 0x2000, 0x2010));
        assert_eq!(categories(&data(vec![unit])), BTreeMap::new());

        let mut unit = compile_unit();
        let outer = unit.push_entry(Some(0), subprogram(0x20, 0x1000, 0x1010));
        unit.push_entry(
            Some(outer),
            Die::new(0x30, constants::DW_TAG_lexical_block).with_ranges(vec![AddressRange::new(0x2000, 0x2010)]),
        );
        assert_eq!(
            categories(&data(vec![unit])),
            single("DIE address ranges are not contained by parent ranges")
        );
    }

    fn with_root_attr(version: u16, name: DwAt, form: gimli::DwForm, value: AttrValue) -> Unit
    {
        let unit_type = constants::DW_UT_compile;
        let mut unit = Unit::new(UnitSection::Info, 0, UNIT_LENGTH, version, unit_type, 8);
        unit.push_entry(
            None,
            Die::new(0x0c, constants::DW_TAG_compile_unit).with_attr(name, form, value),
        );
        unit
    }

    #[test]
    fn ranges_attribute_encoding()
    {
        let unit = with_root_attr(4, constants::DW_AT_ranges, constants::DW_FORM_data1, AttrValue::Constant(0));
        assert_eq!(categories(&data(vec![unit])), single("Invalid DW_AT_ranges encoding"));

        // DWARF 4 no longer allows data4 for section offsets
        let unit = with_root_attr(4, constants::DW_AT_ranges, constants::DW_FORM_data4, AttrValue::Constant(0));
        assert_eq!(categories(&data(vec![unit])), single("Invalid DW_AT_ranges encoding"));

        let unit = with_root_attr(5, constants::DW_AT_ranges, constants::DW_FORM_rnglistx, AttrValue::RangeListIndex(9));
        assert_eq!(categories(&data(vec![unit])), BTreeMap::new());
    }

    #[test]
    fn ranges_offset_bounds_follow_the_unit_version()
    {
        let v3 = with_root_attr(3, constants::DW_AT_ranges, constants::DW_FORM_data4, AttrValue::Constant(0x10));
        let mut data3 = data(vec![v3]);
        data3.sections.debug_ranges = vec![0; 0x10];
        assert_eq!(categories(&data3), single("DW_AT_ranges offset out of bounds"));
        data3.sections.debug_ranges = vec![0; 0x20];
        assert_eq!(categories(&data3), BTreeMap::new());

        let v5 = with_root_attr(5, constants::DW_AT_ranges, constants::DW_FORM_sec_offset, AttrValue::SecOffset(0x10));
        let mut data5 = data(vec![v5]);
        data5.sections.debug_ranges = vec![0; 0x20];
        assert_eq!(categories(&data5), single("DW_AT_ranges offset out of bounds"));
        data5.sections.debug_rnglists = vec![0; 0x20];
        assert_eq!(categories(&data5), BTreeMap::new());
    }

    #[test]
    fn stmt_list_checks()
    {
        let unit = with_root_attr(4, constants::DW_AT_stmt_list, constants::DW_FORM_udata, AttrValue::Constant(0));
        assert_eq!(categories(&data(vec![unit])), single("Invalid DW_AT_stmt_list encoding"));

        let unit = with_root_attr(4, constants::DW_AT_stmt_list, constants::DW_FORM_sec_offset, AttrValue::SecOffset(0x40));
        let mut data = data(vec![unit]);
        data.sections.debug_line = vec![0; 0x40];
        assert_eq!(categories(&data), single("DW_AT_stmt_list offset out of bounds"));
        data.sections.debug_line = vec![0; 0x41];
        assert_eq!(categories(&data), BTreeMap::new());
    }

    /// A subprogram at 0x20, a base type at 0x30 and `die` after them
    fn referencing(die: Die) -> DebugData
    {
        let mut unit = compile_unit();
        unit.push_entry(Some(0), Die::new(0x20, constants::DW_TAG_subprogram));
        unit.push_entry(Some(0), Die::new(0x30, constants::DW_TAG_base_type));
        unit.push_entry(Some(0), die);
        data(vec![unit])
    }

    #[test]
    fn abstract_origin_tags()
    {
        let inlined = Die::new(0x40, constants::DW_TAG_inlined_subroutine).with_attr(
            constants::DW_AT_abstract_origin,
            constants::DW_FORM_ref4,
            AttrValue::UnitRef(0x20),
        );
        assert_eq!(categories(&referencing(inlined)), BTreeMap::new());

        let variable = Die::new(0x40, constants::DW_TAG_variable).with_attr(
            constants::DW_AT_abstract_origin,
            constants::DW_FORM_ref4,
            AttrValue::UnitRef(0x20),
        );
        assert_eq!(
            categories(&referencing(variable)),
            single("Incompatible DW_AT_abstract_origin tag reference")
        );

        let specification = Die::new(0x40, constants::DW_TAG_subprogram).with_attr(
            constants::DW_AT_specification,
            constants::DW_FORM_ref_addr,
            AttrValue::InfoRef(0x30),
        );
        assert_eq!(
            categories(&referencing(specification)),
            single("Incompatible DW_AT_abstract_origin tag reference")
        );
    }

    #[test]
    fn type_must_reference_a_type()
    {
        let typed = |target| {
            Die::new(0x40, constants::DW_TAG_variable).with_attr(
                constants::DW_AT_type,
                constants::DW_FORM_ref4,
                AttrValue::UnitRef(target),
            )
        };
        assert_eq!(categories(&referencing(typed(0x30))), BTreeMap::new());
        assert_eq!(
            categories(&referencing(typed(0x20))),
            single("Incompatible DW_AT_type attribute tag")
        );
    }

    /// A unit whose line table lists two files, with `die` under its root
    fn with_line_table(die: Die, line_table: bool) -> DebugData
    {
        let mut unit = with_root_attr(4, constants::DW_AT_stmt_list, constants::DW_FORM_sec_offset, AttrValue::SecOffset(0));
        unit.push_entry(Some(0), die);
        let mut data = data(vec![unit]);
        data.sections.debug_line = vec![0; 0x40];
        if line_table {
            data.line_tables.insert(
                0,
                LineTable {
                    version: 4,
                    file_names: vec![LineFile::new("a.c", 0), LineFile::new("b.h", 0)],
                    ..LineTable::default()
                },
            );
        }
        data
    }

    fn declared(name: DwAt, value: AttrValue) -> Die
    {
        Die::new(0x20, constants::DW_TAG_variable).with_attr(name, constants::DW_FORM_udata, value)
    }

    #[test]
    fn file_indices()
    {
        let valid = declared(constants::DW_AT_decl_file, AttrValue::Constant(2));
        assert_eq!(categories(&with_line_table(valid, true)), BTreeMap::new());

        let past_end = declared(constants::DW_AT_decl_file, AttrValue::Constant(3));
        assert_eq!(
            categories(&with_line_table(past_end, true)),
            single("Invalid file index in DW_AT_decl_file")
        );

        // File indices are 1-based before DWARF 5
        let zero = declared(constants::DW_AT_call_file, AttrValue::Constant(0));
        assert_eq!(
            categories(&with_line_table(zero, true)),
            single("Invalid file index in DW_AT_call_file")
        );

        let no_table = declared(constants::DW_AT_decl_file, AttrValue::Constant(1));
        assert_eq!(
            categories(&with_line_table(no_table, false)),
            single("File index in DW_AT_decl_file reference CU with no line table")
        );
    }

    #[test]
    fn file_and_line_encodings()
    {
        let file = declared(constants::DW_AT_call_file, AttrValue::String(String::from("a.c")));
        assert_eq!(
            categories(&with_line_table(file, true)),
            single("Invalid encoding in DW_AT_call_file")
        );

        let line = declared(constants::DW_AT_decl_line, AttrValue::SignedConstant(-1));
        assert_eq!(
            categories(&with_line_table(line, true)),
            single("Invalid encoding in DW_AT_decl_line")
        );
    }

    fn sibling(value: AttrValue) -> Die
    {
        Die::new(0x40, constants::DW_TAG_variable).with_attr(constants::DW_AT_sibling, constants::DW_FORM_ref4, value)
    }

    #[test]
    fn unit_relative_references()
    {
        assert_eq!(categories(&referencing(sibling(AttrValue::UnitRef(0x30)))), BTreeMap::new());
        assert_eq!(
            categories(&referencing(sibling(AttrValue::UnitRef(UNIT_LENGTH + 4)))),
            single("Invalid CU offset")
        );
        assert_eq!(
            categories(&referencing(sibling(AttrValue::UnitRef(0x31)))),
            single("Invalid DIE reference")
        );
    }

    #[test]
    fn section_relative_references()
    {
        let mut other = Unit::new(UnitSection::Info, 0x104, 0x20, 4, constants::DW_UT_compile, 8);
        let root = other.push_entry(None, Die::new(0x10f, constants::DW_TAG_compile_unit));
        other.push_entry(Some(root), Die::new(0x118, constants::DW_TAG_base_type));

        let with_other = |value| {
            let mut data = referencing(sibling(value));
            data.units.push(other.clone());
            data
        };
        assert_eq!(categories(&with_other(AttrValue::InfoRef(0x118))), BTreeMap::new());
        assert_eq!(
            categories(&with_other(AttrValue::InfoRef(0x119))),
            single("Invalid DIE reference")
        );
        assert_eq!(
            categories(&with_other(AttrValue::InfoRef(0x200))),
            single("DW_FORM_ref_addr offset out of bounds")
        );
    }

    #[test]
    fn string_forms_must_resolve()
    {
        let name = |offset| {
            Die::new(0x20, constants::DW_TAG_variable).with_attr(
                constants::DW_AT_name,
                constants::DW_FORM_strp,
                AttrValue::StrOffset(offset),
            )
        };
        let mut unit = compile_unit();
        unit.push_entry(Some(0), name(1));
        assert_eq!(categories(&data(vec![unit])), BTreeMap::new());

        let mut unit = compile_unit();
        unit.push_entry(Some(0), name(0x40));
        assert_eq!(categories(&data(vec![unit])), single("Invalid DW_FORM attribute"));
    }

    /// A call site under `path`, each tag nested in the one before
    fn call_site_under(path: &[(DwTag, Option<DwAt>)], call_site: DwTag) -> DebugData
    {
        let mut unit = compile_unit();
        let mut parent = 0;
        let mut offset = 0x20;
        for &(tag, attr) in path {
            let mut die = Die::new(offset, tag);
            if let Some(attr) = attr {
                die = die.with_attr(attr, constants::DW_FORM_flag_present, AttrValue::Flag(true));
            }
            parent = unit.push_entry(Some(parent), die);
            offset += 0x10;
        }
        unit.push_entry(Some(parent), Die::new(offset, call_site));
        data(vec![unit])
    }

    #[test]
    fn call_sites()
    {
        let described = (constants::DW_TAG_subprogram, Some(constants::DW_AT_call_all_calls));
        assert_eq!(
            categories(&call_site_under(&[described], constants::DW_TAG_call_site)),
            BTreeMap::new()
        );

        let gnu = (constants::DW_TAG_subprogram, Some(constants::DW_AT_GNU_all_call_sites));
        let block = (constants::DW_TAG_lexical_block, None);
        assert_eq!(
            categories(&call_site_under(&[gnu, block], constants::DW_TAG_GNU_call_site)),
            BTreeMap::new()
        );

        let bare = (constants::DW_TAG_subprogram, None);
        assert_eq!(
            categories(&call_site_under(&[bare], constants::DW_TAG_call_site)),
            single("Subprogram with call site entry has no DW_AT_call attribute")
        );

        let inlined = (constants::DW_TAG_inlined_subroutine, None);
        assert_eq!(
            categories(&call_site_under(&[described, inlined], constants::DW_TAG_call_site)),
            single("Call site nested entry within inlined subroutine")
        );

        assert_eq!(
            categories(&call_site_under(&[block], constants::DW_TAG_call_site)),
            single("Call site entry not nested within valid subprogram")
        );
    }
}
