//! Tests for the decoded debug-information model

use dwarfck_core::types::{
    AddressRange, AttrValue, DebugData, Die, LineFile, LineTable, ReferenceTarget, Unit, UnitSection,
};
use gimli::{constants, RunTimeEndian};
use pretty_assertions::assert_eq;

fn unit_at(offset: u64) -> Unit
{
    let mut unit = Unit::new(UnitSection::Info, offset, 0x20, 4, constants::DW_UT_compile, 8);
    let root = unit.push_entry(None, Die::new(offset + 0x0b, constants::DW_TAG_compile_unit));
    unit.push_entry(Some(root), Die::new(offset + 0x10, constants::DW_TAG_subprogram));
    unit
}

#[test]
fn test_address_range_overlap()
{
    let a = AddressRange::new(0x10, 0x20);
    assert!(a.intersects(&AddressRange::new(0x1f, 0x30)));
    assert!(!a.intersects(&AddressRange::new(0x20, 0x30)));
    assert!(!a.intersects(&AddressRange::new(0x18, 0x18)));
    assert!(!AddressRange::new(0x20, 0x10).is_valid());
    assert_eq!(AddressRange::new(0x20, 0x10).size(), 0);
}

#[test]
fn test_push_entry_links_parent_and_children()
{
    let unit = unit_at(0);
    let root = unit.root().unwrap();
    assert!(root.has_children);
    assert_eq!(root.children, vec![1]);
    assert_eq!(unit.parent_of(&unit.entries[1]), Some(root));
    assert_eq!(unit.next_offset(), 0x24);
}

#[test]
fn test_unit_for_offset()
{
    let mut data = DebugData::new(RunTimeEndian::Little);
    data.units.push(unit_at(0x24));
    data.units.push(unit_at(0));
    data.sort_units();

    assert_eq!(data.unit_for_offset(UnitSection::Info, 0).map(|unit| unit.offset), Some(0));
    assert_eq!(data.unit_for_offset(UnitSection::Info, 0x23).map(|unit| unit.offset), Some(0));
    assert_eq!(data.unit_for_offset(UnitSection::Info, 0x24).map(|unit| unit.offset), Some(0x24));
    assert_eq!(data.unit_for_offset(UnitSection::Info, 0x48), None);
    assert_eq!(data.unit_for_offset(UnitSection::Types, 0), None);

    let (unit, die) = data.die_for_offset(UnitSection::Info, 0x34).unwrap();
    assert_eq!(unit.offset, 0x24);
    assert_eq!(die.tag, constants::DW_TAG_subprogram);
    assert!(data.die_for_offset(UnitSection::Info, 0x35).is_none());
}

#[test]
fn test_reference_targets()
{
    let unit = unit_at(0x24);
    assert_eq!(unit.reference_target(&AttrValue::UnitRef(0x10)), Some(ReferenceTarget::Local(0x34)));
    assert_eq!(unit.reference_target(&AttrValue::InfoRef(0x10)), Some(ReferenceTarget::Info(0x10)));
    assert_eq!(unit.reference_target(&AttrValue::Constant(0x10)), None);
}

#[test]
fn test_find_recursively_follows_abstract_origin()
{
    let mut unit = Unit::new(UnitSection::Info, 0, 0x40, 4, constants::DW_UT_compile, 8);
    let root = unit.push_entry(None, Die::new(0x0b, constants::DW_TAG_compile_unit));
    unit.push_entry(
        Some(root),
        Die::new(0x10, constants::DW_TAG_subprogram).with_attr(
            constants::DW_AT_name,
            constants::DW_FORM_string,
            AttrValue::String(String::from("inlined")),
        ),
    );
    unit.push_entry(
        Some(root),
        Die::new(0x20, constants::DW_TAG_subprogram).with_attr(
            constants::DW_AT_abstract_origin,
            constants::DW_FORM_ref4,
            AttrValue::UnitRef(0x10),
        ),
    );
    let mut data = DebugData::new(RunTimeEndian::Little);
    data.units.push(unit);

    let unit = &data.units[0];
    let (_, owner, attr) = data
        .find_recursively(unit, &unit.entries[2], &[constants::DW_AT_name])
        .unwrap();
    assert_eq!(owner.offset, 0x10);
    assert_eq!(attr.value, AttrValue::String(String::from("inlined")));
    assert!(data
        .find_recursively(unit, &unit.entries[2], &[constants::DW_AT_low_pc])
        .is_none());
}

#[test]
fn test_line_table_file_indices()
{
    let mut table = LineTable {
        version: 4,
        include_directories: vec![String::from("src")],
        file_names: vec![LineFile::new("a.c", 1), LineFile::new("b.c", 0)],
        ..LineTable::default()
    };
    assert!(!table.has_file_at_index(0));
    assert!(table.has_file_at_index(2));
    assert!(!table.has_file_at_index(3));
    assert_eq!(table.file_index_bounds(), Some((1, 2)));
    assert_eq!(table.full_path(&table.file_names[0], Some("/work")), "/work/src/a.c");
    assert_eq!(table.full_path(&table.file_names[1], Some("/work")), "/work/b.c");

    table.version = 5;
    table.include_directories = vec![String::from("/work")];
    table.file_names = vec![LineFile::new("a.c", 0)];
    assert!(table.has_file_at_index(0));
    assert!(!table.has_file_at_index(1));
    assert_eq!(table.file_index_bounds(), Some((0, 0)));
    assert_eq!(table.full_path(&table.file_names[0], Some("/work")), "/work/a.c");
}
