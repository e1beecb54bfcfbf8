//! Raw section bytes and the decoded debug data.

use std::collections::{BTreeMap, BTreeSet};

use gimli::{constants, DwAt, EndianSlice, RunTimeEndian};

use super::{AttrValue, Attribute, Die, LineTable, Unit, UnitSection};

/// Kind of object file the debug information came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectKind
{
    /// Linked executable or shared object
    #[default]
    Executable,
    /// Relocatable ELF/COFF object
    ///
    /// COMDAT sections make compile unit ranges overlap legitimately in
    /// these, so compile unit ranges are not checked.
    Relocatable,
    /// Relocatable Mach-O object; ranges are final and checked
    MachORelocatable,
}

/// Raw bytes of every section the verifier or the decoder reads
///
/// Missing sections are empty. Compressed sections are stored decompressed.
/// `debug_addr`, `debug_loc` and `debug_loclists` are only needed to
/// resolve ranges and locations while decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections
{
    pub debug_info: Vec<u8>,
    pub debug_types: Vec<u8>,
    pub debug_abbrev: Vec<u8>,
    pub debug_line: Vec<u8>,
    pub debug_line_str: Vec<u8>,
    pub debug_str: Vec<u8>,
    pub debug_str_offsets: Vec<u8>,
    pub debug_addr: Vec<u8>,
    pub debug_loc: Vec<u8>,
    pub debug_loclists: Vec<u8>,
    pub debug_ranges: Vec<u8>,
    pub debug_rnglists: Vec<u8>,
    pub debug_names: Vec<u8>,
    pub apple_names: Vec<u8>,
    pub apple_types: Vec<u8>,
    pub apple_namespaces: Vec<u8>,
    pub apple_objc: Vec<u8>,
    pub debug_cu_index: Vec<u8>,
    pub debug_tu_index: Vec<u8>,
}

impl Sections
{
    /// Slot for a section by its ELF name, or `None` for sections not kept
    ///
    /// Mach-O names (`__debug_info`) are accepted as well.
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Vec<u8>>
    {
        let name = name.trim_start_matches("__").trim_start_matches('.');
        let slot = match name {
            "debug_info" => &mut self.debug_info,
            "debug_types" => &mut self.debug_types,
            "debug_abbrev" => &mut self.debug_abbrev,
            "debug_line" => &mut self.debug_line,
            "debug_line_str" => &mut self.debug_line_str,
            "debug_str" => &mut self.debug_str,
            "debug_str_offsets" | "debug_str_offs" => &mut self.debug_str_offsets,
            "debug_addr" => &mut self.debug_addr,
            "debug_loc" => &mut self.debug_loc,
            "debug_loclists" => &mut self.debug_loclists,
            "debug_ranges" => &mut self.debug_ranges,
            "debug_rnglists" => &mut self.debug_rnglists,
            "debug_names" => &mut self.debug_names,
            "apple_names" => &mut self.apple_names,
            "apple_types" => &mut self.apple_types,
            "apple_namespac" | "apple_namespaces" => &mut self.apple_namespaces,
            "apple_objc" => &mut self.apple_objc,
            "debug_cu_index" => &mut self.debug_cu_index,
            "debug_tu_index" => &mut self.debug_tu_index,
            _ => return None,
        };
        Some(slot)
    }

    pub fn unit_section(&self, section: UnitSection) -> &[u8]
    {
        match section {
            UnitSection::Info => &self.debug_info,
            UnitSection::Types => &self.debug_types,
        }
    }
}

/// Everything the verifier inspects for one binary
#[derive(Debug, Clone, Default)]
pub struct DebugData
{
    pub endian: RunTimeEndian,
    pub object_kind: ObjectKind,
    pub sections: Sections,
    /// Decoded units, sorted by section then offset
    pub units: Vec<Unit>,
    /// Decoded line programs keyed by `.debug_line` offset
    pub line_tables: BTreeMap<u64, LineTable>,
}

impl DebugData
{
    /// Empty data with the given byte order
    pub fn new(endian: RunTimeEndian) -> Self
    {
        Self {
            endian,
            ..Self::default()
        }
    }

    /// A gimli reader over a section's bytes
    pub fn reader<'a>(&self, bytes: &'a [u8]) -> EndianSlice<'a, RunTimeEndian>
    {
        EndianSlice::new(bytes, self.endian)
    }

    /// Keep `units` sorted after adding units out of order
    pub fn sort_units(&mut self)
    {
        self.units.sort_by_key(|unit| (unit.section, unit.offset));
    }

    pub fn units_in(&self, section: UnitSection) -> impl Iterator<Item = &Unit>
    {
        self.units.iter().filter(move |unit| unit.section == section)
    }

    /// The unit whose extent covers `offset` in `section`
    pub fn unit_for_offset(&self, section: UnitSection, offset: u64) -> Option<&Unit>
    {
        let idx = self.units.partition_point(|unit| (unit.section, unit.offset) <= (section, offset));
        let unit = self.units.get(idx.checked_sub(1)?)?;
        (unit.section == section && unit.contains_offset(offset)).then_some(unit)
    }

    /// The unit and entry starting exactly at `offset` in `section`
    pub fn die_for_offset(&self, section: UnitSection, offset: u64) -> Option<(&Unit, &Die)>
    {
        let unit = self.unit_for_offset(section, offset)?;
        unit.entry_at(offset).map(|die| (unit, die))
    }

    /// The line program named by the unit entry's `DW_AT_stmt_list`
    pub fn line_table_for_unit(&self, unit: &Unit) -> Option<&LineTable>
    {
        let offset = match unit.root()?.attr_value(constants::DW_AT_stmt_list)? {
            AttrValue::SecOffset(offset) => *offset,
            value => value.as_unsigned()?,
        };
        self.line_tables.get(&offset)
    }

    /// The entry a reference-class attribute of `unit` points at
    ///
    /// Type signatures and supplementary-file references are not followed.
    pub fn resolve_reference<'a>(&'a self, unit: &'a Unit, value: &AttrValue) -> Option<(&'a Unit, &'a Die)>
    {
        match *value {
            AttrValue::UnitRef(rel) => {
                let die = unit.entry_at(unit.offset.checked_add(rel)?)?;
                Some((unit, die))
            }
            AttrValue::InfoRef(offset) => self.die_for_offset(UnitSection::Info, offset),
            _ => None,
        }
    }

    /// First of `names` on `die`, or on the entries its
    /// `DW_AT_specification` and `DW_AT_abstract_origin` chains reach
    ///
    /// Reference cycles are walked once.
    pub fn find_recursively<'a>(&'a self, unit: &'a Unit, die: &'a Die, names: &[DwAt]) -> Option<(&'a Unit, &'a Die, &'a Attribute)>
    {
        let mut seen = BTreeSet::new();
        let mut pending = vec![(unit, die)];
        while let Some((unit, die)) = pending.pop() {
            if !seen.insert(unit.die_ref(die)) {
                continue;
            }
            if let Some(attr) = die.attrs.iter().find(|attr| names.contains(&attr.name)) {
                return Some((unit, die, attr));
            }
            for origin in [constants::DW_AT_abstract_origin, constants::DW_AT_specification] {
                if let Some(next) = die.attr_value(origin).and_then(|value| self.resolve_reference(unit, value)) {
                    pending.push(next);
                }
            }
        }
        None
    }
}
