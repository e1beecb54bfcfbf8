//! # Loader
//!
//! Reads an object file with `object` and decodes its DWARF with `gimli`
//! into the [`DebugData`] model the verifier walks.
//!
//! The loader is forgiving. A unit gimli cannot set up is skipped, a unit
//! whose entry tree breaks off keeps the entries decoded so far, and a
//! header the decoder rejects ends the walk of that section. The verifier
//! re-reads the raw sections and reports those defects itself. Only failures that leave
//! nothing to verify (unreadable file, unknown object format, a compressed
//! section that does not inflate) are returned as errors.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, Dwarf, EndianSlice, RunTimeEndian, SectionId,
    UnitHeader, UnitSectionOffset, UnitType,
};
use object::{Object, ObjectSection};
use tracing::{debug, trace, warn};

use crate::error::{DwarfckError, Result};
use crate::types::{
    AddressRange, AttrValue, DebugData, Die, LineFile, LineRow, LineTable, Locations, ObjectKind, Sections, Unit,
    UnitSection,
};

type SliceReader<'a> = EndianSlice<'a, RunTimeEndian>;
type GimliUnit<'a> = gimli::Unit<SliceReader<'a>>;
type Entry<'abbrev, 'unit, 'a> = DebuggingInformationEntry<'abbrev, 'unit, SliceReader<'a>>;

/// Canonical section name and the names it goes by in ELF and Mach-O files
///
/// Mach-O section names are truncated to 16 bytes.
const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offs"]),
    (".debug_types", &[".debug_types", "__debug_types"]),
    (".debug_names", &[".debug_names", "__debug_names"]),
    (".debug_cu_index", &[".debug_cu_index"]),
    (".debug_tu_index", &[".debug_tu_index"]),
    (".apple_names", &[".apple_names", "__apple_names"]),
    (".apple_types", &[".apple_types", "__apple_types"]),
    (".apple_namespaces", &[".apple_namespaces", "__apple_namespac"]),
    (".apple_objc", &[".apple_objc", "__apple_objc"]),
];

/// Read and decode the object file at `path`
pub fn load_file(path: &Path) -> Result<DebugData>
{
    let bytes = fs::read(path)?;
    let file = object::File::parse(&*bytes).map_err(|source| DwarfckError::Object {
        path: path.to_path_buf(),
        source,
    })?;
    load_object(&file, path)
}

/// Decode the debug information of an already parsed object file
///
/// `path` is only used in error messages.
pub fn load_object(file: &object::File<'_>, path: &Path) -> Result<DebugData>
{
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };
    let object_kind = match (file.kind(), file.format()) {
        (object::ObjectKind::Relocatable, object::BinaryFormat::MachO) => ObjectKind::MachORelocatable,
        (object::ObjectKind::Relocatable, _) => ObjectKind::Relocatable,
        _ => ObjectKind::Executable,
    };

    let mut sections = Sections::default();
    for (canonical, aliases) in DWARF_SECTIONS {
        let bytes = load_section_bytes(file, aliases).map_err(|source| DwarfckError::Object {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(slot) = sections.by_name_mut(canonical) {
            *slot = bytes;
        }
    }
    debug!(
        path = %path.display(),
        ?object_kind,
        info_bytes = sections.debug_info.len(),
        "loaded debug sections"
    );

    from_sections(endian, object_kind, sections)
}

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> object::Result<Vec<u8>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section.uncompressed_data()?;
            return Ok(match data {
                Cow::Borrowed(bytes) => bytes.to_vec(),
                Cow::Owned(vec) => vec,
            });
        }
    }
    Ok(Vec::new())
}

/// Decode units and line tables from raw section bytes
///
/// This is the entry point for callers that already hold the sections, like
/// tests feeding hand-assembled DWARF.
pub fn from_sections(endian: RunTimeEndian, object_kind: ObjectKind, sections: Sections) -> Result<DebugData>
{
    let (units, line_tables) = {
        let dwarf = Dwarf::load(|id| Ok::<_, gimli::Error>(EndianSlice::new(section_bytes(&sections, id), endian)))
            .map_err(|source| DwarfckError::Dwarf {
                context: "DWARF sections",
                source,
            })?;
        decode_units(&dwarf)
    };

    let mut data = DebugData {
        endian,
        object_kind,
        sections,
        units,
        line_tables,
    };
    data.sort_units();
    debug!(units = data.units.len(), line_tables = data.line_tables.len(), "decoded debug information");
    Ok(data)
}

fn section_bytes(sections: &Sections, id: SectionId) -> &[u8]
{
    match id {
        SectionId::DebugAbbrev => &sections.debug_abbrev,
        SectionId::DebugAddr => &sections.debug_addr,
        SectionId::DebugInfo => &sections.debug_info,
        SectionId::DebugLine => &sections.debug_line,
        SectionId::DebugLineStr => &sections.debug_line_str,
        SectionId::DebugLoc => &sections.debug_loc,
        SectionId::DebugLocLists => &sections.debug_loclists,
        SectionId::DebugRanges => &sections.debug_ranges,
        SectionId::DebugRngLists => &sections.debug_rnglists,
        SectionId::DebugStr => &sections.debug_str,
        SectionId::DebugStrOffsets => &sections.debug_str_offsets,
        SectionId::DebugTypes => &sections.debug_types,
        _ => &[],
    }
}

fn decode_units(dwarf: &Dwarf<SliceReader<'_>>) -> (Vec<Unit>, BTreeMap<u64, LineTable>)
{
    let mut units = Vec::new();
    let mut line_tables = BTreeMap::new();

    let mut headers = dwarf.units();
    loop {
        match headers.next() {
            Ok(Some(header)) => units.extend(decode_unit(dwarf, header, &mut line_tables)),
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "stopped decoding .debug_info at an unreadable unit header");
                break;
            }
        }
    }

    let mut type_headers = dwarf.type_units();
    loop {
        match type_headers.next() {
            Ok(Some(header)) => units.extend(decode_unit(dwarf, header, &mut line_tables)),
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "stopped decoding .debug_types at an unreadable unit header");
                break;
            }
        }
    }

    (units, line_tables)
}

fn decode_unit<'a>(
    dwarf: &Dwarf<SliceReader<'a>>,
    header: UnitHeader<SliceReader<'a>>,
    line_tables: &mut BTreeMap<u64, LineTable>,
) -> Option<Unit>
{
    let (section, offset) = match header.offset() {
        UnitSectionOffset::DebugInfoOffset(offset) => (UnitSection::Info, offset.0 as u64),
        UnitSectionOffset::DebugTypesOffset(offset) => (UnitSection::Types, offset.0 as u64),
    };
    let (unit_type, header_dwo_id) = match header.type_() {
        UnitType::Compilation => (constants::DW_UT_compile, None),
        UnitType::Type { .. } => (constants::DW_UT_type, None),
        UnitType::Partial => (constants::DW_UT_partial, None),
        UnitType::Skeleton(dwo_id) => (constants::DW_UT_skeleton, Some(dwo_id.0)),
        UnitType::SplitCompilation(dwo_id) => (constants::DW_UT_split_compile, Some(dwo_id.0)),
        UnitType::SplitType { .. } => (constants::DW_UT_split_type, None),
    };

    let mut unit = Unit::new(
        section,
        offset,
        header.unit_length() as u64,
        header.version(),
        unit_type,
        header.address_size(),
    );
    unit.format = header.format();
    unit.abbrev_offset = header.debug_abbrev_offset().0 as u64;
    unit.dwo_id = header_dwo_id;

    let parsed = match dwarf.unit(header) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(section = section.name(), offset, %err, "skipping unit gimli cannot decode");
            return None;
        }
    };
    if let Err(err) = decode_entries(dwarf, &parsed, &mut unit) {
        warn!(
            section = section.name(),
            offset,
            decoded = unit.entries.len(),
            %err,
            "stopped decoding unit entries"
        );
    }

    unit.comp_dir = parsed
        .comp_dir
        .map(|dir| String::from_utf8_lossy(dir.slice()).into_owned());
    unit.dwo_id = unit.dwo_id.or(parsed.dwo_id.map(|dwo_id| dwo_id.0));
    unit.str_offsets_base = match unit.root().and_then(|root| root.attr_value(constants::DW_AT_str_offsets_base)) {
        Some(value) => match *value {
            AttrValue::SecOffset(base) => Some(base),
            ref other => other.as_unsigned(),
        },
        None if matches!(unit_type, constants::DW_UT_split_compile | constants::DW_UT_split_type) => {
            Some(parsed.str_offsets_base.0 as u64)
        }
        None => None,
    };

    if let Some(program) = parsed.line_program.clone() {
        let table_offset = program.header().offset().0 as u64;
        if !line_tables.contains_key(&table_offset) {
            match decode_line_table(dwarf, &parsed, program) {
                Ok(table) => {
                    line_tables.insert(table_offset, table);
                }
                Err(err) => warn!(offset = table_offset, %err, "line table not decoded"),
            }
        }
    }

    trace!(section = section.name(), offset, entries = unit.entries.len(), "decoded unit");
    Some(unit)
}

fn decode_entries<'a>(dwarf: &Dwarf<SliceReader<'a>>, parsed: &GimliUnit<'a>, unit: &mut Unit) -> gimli::Result<()>
{
    let mut cursor = parsed.entries();
    let mut depth = 0isize;
    let mut parents: Vec<usize> = Vec::new();
    while let Some((delta, entry)) = cursor.next_dfs()? {
        depth += delta;
        parents.truncate(usize::try_from(depth).unwrap_or(0));
        let die = decode_die(dwarf, parsed, unit.offset, entry)?;
        let index = unit.push_entry(parents.last().copied(), die);
        parents.push(index);
    }
    Ok(())
}

fn decode_die<'a>(
    dwarf: &Dwarf<SliceReader<'a>>,
    parsed: &GimliUnit<'a>,
    unit_offset: u64,
    entry: &Entry<'_, '_, 'a>,
) -> gimli::Result<Die>
{
    let mut die = Die::new(unit_offset + entry.offset().0 as u64, entry.tag());
    die.has_children = entry.has_children();

    // Attributes come back in abbreviation order, which is where the forms live
    let specs = parsed
        .abbreviations
        .get(entry.code())
        .map(|abbrev| abbrev.attributes())
        .unwrap_or_default();
    let mut attrs = entry.attrs();
    let mut position = 0;
    while let Some(attr) = attrs.next()? {
        let form = specs
            .get(position)
            .map_or(constants::DW_FORM_indirect, |spec| spec.form());
        position += 1;
        die = die.with_attr(attr.name(), form, classify(attr.raw_value()));
    }

    die.ranges = decode_ranges(dwarf, parsed, entry);
    if let Some(location) = entry.attr_value(constants::DW_AT_location)? {
        die.locations = decode_locations(dwarf, parsed, location);
    }
    Ok(die)
}

/// Map a raw attribute value onto the model's form classes
fn classify(value: AttributeValue<SliceReader<'_>>) -> AttrValue
{
    match value {
        AttributeValue::Addr(address) => AttrValue::Address(address),
        AttributeValue::Block(bytes) => AttrValue::Block(bytes.slice().to_vec()),
        AttributeValue::Exprloc(expr) => AttrValue::Exprloc(expr.0.slice().to_vec()),
        AttributeValue::Data1(value) => AttrValue::Constant(u64::from(value)),
        AttributeValue::Data2(value) => AttrValue::Constant(u64::from(value)),
        AttributeValue::Data4(value) => AttrValue::Constant(u64::from(value)),
        AttributeValue::Data8(value) | AttributeValue::Udata(value) => AttrValue::Constant(value),
        AttributeValue::Sdata(value) => AttrValue::SignedConstant(value),
        AttributeValue::Flag(value) => AttrValue::Flag(value),
        AttributeValue::UnitRef(offset) => AttrValue::UnitRef(offset.0 as u64),
        AttributeValue::DebugInfoRef(offset) => AttrValue::InfoRef(offset.0 as u64),
        AttributeValue::DebugInfoRefSup(offset) => AttrValue::SupRef(offset.0 as u64),
        AttributeValue::DebugTypesRef(signature) => AttrValue::Signature(signature.0),
        AttributeValue::SecOffset(offset) => AttrValue::SecOffset(offset as u64),
        AttributeValue::DebugStrRef(offset) => AttrValue::StrOffset(offset.0 as u64),
        AttributeValue::DebugStrRefSup(offset) => AttrValue::SupStrOffset(offset.0 as u64),
        AttributeValue::DebugLineStrRef(offset) => AttrValue::LineStrOffset(offset.0 as u64),
        AttributeValue::DebugStrOffsetsIndex(index) => AttrValue::StrIndex(index.0 as u64),
        AttributeValue::DebugAddrIndex(index) => AttrValue::AddrIndex(index.0 as u64),
        AttributeValue::DebugRngListsIndex(index) => AttrValue::RangeListIndex(index.0 as u64),
        AttributeValue::DebugLocListsIndex(index) => AttrValue::LocListIndex(index.0 as u64),
        AttributeValue::String(string) => AttrValue::String(String::from_utf8_lossy(string.slice()).into_owned()),
        _ => AttrValue::Unknown,
    }
}

fn decode_ranges<'a>(
    dwarf: &Dwarf<SliceReader<'a>>,
    parsed: &GimliUnit<'a>,
    entry: &Entry<'_, '_, 'a>,
) -> std::result::Result<Vec<AddressRange>, String>
{
    let has_ranges = entry.attr(constants::DW_AT_ranges).map_err(|err| err.to_string())?.is_some();
    if !has_ranges {
        // low/high pairs are resolved here so that an inverted pair reaches
        // the verifier as a range instead of a decoder error
        return low_high_range(dwarf, parsed, entry).map_err(|err| err.to_string());
    }

    let mut ranges = Vec::new();
    let mut iter = dwarf.die_ranges(parsed, entry).map_err(|err| err.to_string())?;
    while let Some(range) = iter.next().map_err(|err| err.to_string())? {
        ranges.push(AddressRange::new(range.begin, range.end));
    }
    Ok(ranges)
}

fn low_high_range<'a>(
    dwarf: &Dwarf<SliceReader<'a>>,
    parsed: &GimliUnit<'a>,
    entry: &Entry<'_, '_, 'a>,
) -> gimli::Result<Vec<AddressRange>>
{
    let (Some(low), Some(high)) = (
        entry.attr_value(constants::DW_AT_low_pc)?,
        entry.attr(constants::DW_AT_high_pc)?,
    ) else {
        return Ok(Vec::new());
    };
    let Some(low) = dwarf.attr_address(parsed, low)? else {
        return Ok(Vec::new());
    };
    let high = match dwarf.attr_address(parsed, high.value())? {
        Some(address) => address,
        None => match high.udata_value() {
            Some(length) => low.checked_add(length).ok_or(gimli::Error::InvalidAddressRange)?,
            None => return Ok(Vec::new()),
        },
    };
    Ok(vec![AddressRange::new(low, high)])
}

fn decode_locations<'a>(
    dwarf: &Dwarf<SliceReader<'a>>,
    parsed: &GimliUnit<'a>,
    value: AttributeValue<SliceReader<'a>>,
) -> Option<Locations>
{
    match value {
        AttributeValue::Exprloc(expr) => Some(Locations::Expression(expr.0.slice().to_vec())),
        AttributeValue::Block(bytes) => Some(Locations::Expression(bytes.slice().to_vec())),
        other => match dwarf.attr_locations_offset(parsed, other) {
            Ok(Some(offset)) => {
                let mut exprs = Vec::new();
                let collected = dwarf.locations(parsed, offset).and_then(|mut iter| {
                    while let Some(entry) = iter.next()? {
                        exprs.push(entry.data.0.slice().to_vec());
                    }
                    Ok(())
                });
                Some(match collected {
                    Ok(()) => Locations::List(exprs),
                    Err(err) => Locations::Unresolved(err.to_string()),
                })
            }
            Ok(None) => None,
            Err(err) => Some(Locations::Unresolved(err.to_string())),
        },
    }
}

fn decode_line_table<'a>(
    dwarf: &Dwarf<SliceReader<'a>>,
    parsed: &GimliUnit<'a>,
    program: gimli::IncompleteLineProgram<SliceReader<'a>>,
) -> gimli::Result<LineTable>
{
    let header = program.header();
    let text = |value: AttributeValue<SliceReader<'a>>| match dwarf.attr_string(parsed, value) {
        Ok(string) => String::from_utf8_lossy(string.slice()).into_owned(),
        Err(err) => {
            trace!(%err, "unresolvable line table string");
            String::new()
        }
    };

    let mut table = LineTable {
        offset: header.offset().0 as u64,
        version: header.version(),
        include_directories: header.include_directories().iter().cloned().map(text).collect(),
        file_names: header
            .file_names()
            .iter()
            .map(|file| LineFile::new(text(file.path_name()), file.directory_index()))
            .collect(),
        rows: Vec::new(),
    };

    let mut rows = program.rows();
    while let Some((_, row)) = rows.next_row()? {
        table.rows.push(if row.end_sequence() {
            LineRow::end_sequence(row.address(), row.file_index())
        } else {
            LineRow::new(row.address(), row.file_index(), row.line().map_or(0, u64::from))
        });
    }
    Ok(table)
}

#[cfg(test)]
mod tests
{
    use pretty_assertions::assert_eq;

    use super::*;

    /// DWARF 4 unit: a compile unit with a subprogram child
    fn sections() -> Sections
    {
        let abbrev = vec![
            // 1: compile_unit, children, name/string, low_pc/addr, high_pc/data4
            0x01, 0x11, 0x01, 0x03, 0x08, 0x11, 0x01, 0x12, 0x06, 0x00, 0x00,
            // 2: subprogram, no children, name/string, low_pc/addr, high_pc/data4
            0x02, 0x2e, 0x00, 0x03, 0x08, 0x11, 0x01, 0x12, 0x06, 0x00, 0x00,
            0x00,
        ];
        let mut body = vec![0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08];
        body.push(0x01);
        body.extend(b"a.c\0");
        body.extend(0x1000u64.to_le_bytes());
        body.extend(0x100u32.to_le_bytes());
        body.push(0x02);
        body.extend(b"main\0");
        body.extend(0x1010u64.to_le_bytes());
        body.extend(0x20u32.to_le_bytes());
        body.push(0x00);

        let mut info = (body.len() as u32).to_le_bytes().to_vec();
        info.extend(body);
        Sections {
            debug_info: info,
            debug_abbrev: abbrev,
            ..Sections::default()
        }
    }

    #[test]
    fn decodes_entry_tree()
    {
        let data = from_sections(RunTimeEndian::Little, ObjectKind::Executable, sections()).unwrap();
        assert_eq!(data.units.len(), 1);

        let unit = &data.units[0];
        assert_eq!(unit.version, 4);
        assert_eq!(unit.unit_type, constants::DW_UT_compile);
        assert_eq!(unit.entries.len(), 2);

        let root = unit.root().unwrap();
        assert_eq!(root.offset, 11);
        assert_eq!(root.children, vec![1]);
        assert_eq!(root.ranges, Ok(vec![AddressRange::new(0x1000, 0x1100)]));
        assert_eq!(root.attr_value(constants::DW_AT_name), Some(&AttrValue::String(String::from("a.c"))));

        let main = &unit.entries[1];
        assert_eq!(main.parent, Some(0));
        assert_eq!(main.attr(constants::DW_AT_high_pc).map(|attr| attr.form), Some(constants::DW_FORM_data4));
        assert_eq!(main.ranges, Ok(vec![AddressRange::new(0x1010, 0x1030)]));
    }

    #[test]
    fn truncated_info_keeps_nothing_but_loads()
    {
        let mut sections = sections();
        sections.debug_info.truncate(6);
        let data = from_sections(RunTimeEndian::Little, ObjectKind::Executable, sections).unwrap();
        assert!(data.units.is_empty());
        assert_eq!(data.sections.debug_info.len(), 6);
    }
}
