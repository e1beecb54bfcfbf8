//! DWARF 5 `.debug_names` name indices.
//!
//! The checks run in three gated phases, the way a consumer would trust the
//! table: structure (unit lists, hash table, abbreviations), then every
//! entry against the entry it names, then completeness of the index against
//! the entries that should be in it. A phase only runs when the previous
//! ones reported nothing.

use std::collections::{BTreeMap, BTreeSet};

use gimli::{constants, DwForm, DwIdx, DwTag, EndianSlice, Format, Operation, Reader, RunTimeEndian};
use tracing::warn;

use super::case_folded_djb_hash;
use crate::types::{DebugData, Die, Unit, UnitSection};
use crate::verifier::header::read_offset;
use crate::verifier::strings::{c_string_at, resolve_string};
use crate::verifier::tags::{is_never_indexed, tag_name};
use crate::verifier::Verifier;

type Slice<'a> = EndianSlice<'a, RunTimeEndian>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexAttribute
{
    index: DwIdx,
    form: DwForm,
    implicit_const: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NamesAbbrev
{
    code: u64,
    tag: DwTag,
    attributes: Vec<IndexAttribute>,
}

/// One decoded name index of `.debug_names`
#[derive(Debug, Clone)]
struct NameIndex<'a>
{
    /// Offset of the index in the section
    offset: u64,
    format: Format,
    cu_offsets: Vec<u64>,
    local_tu_offsets: Vec<u64>,
    foreign_tu_count: u64,
    buckets: Vec<u32>,
    hashes: Vec<u32>,
    string_offsets: Vec<u64>,
    entry_offsets: Vec<u64>,
    /// Declarations in table order
    abbrevs: Vec<NamesAbbrev>,
    entry_pool: Slice<'a>,
}

impl NameIndex<'_>
{
    fn name_count(&self) -> u32
    {
        self.string_offsets.len() as u32
    }

    fn abbrev(&self, code: u64) -> Option<&NamesAbbrev>
    {
        self.abbrevs.iter().find(|abbrev| abbrev.code == code)
    }

    /// Stored hash of 1-based name `index`
    fn hash(&self, index: u32) -> Option<u32>
    {
        self.hashes.get(index.checked_sub(1)? as usize).copied()
    }

    fn name(&self, data: &DebugData, index: usize) -> Option<String>
    {
        let offset = *self.string_offsets.get(index)?;
        c_string_at(&data.sections.debug_str, offset).map(|name| String::from_utf8_lossy(name).into_owned())
    }
}

/// One decoded entry of the entry pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NameEntry
{
    tag: DwTag,
    cu_index: Option<u64>,
    tu_index: Option<u64>,
    die_offset: Option<u64>,
}

fn read_offsets(reader: &mut Slice<'_>, format: Format, count: u32) -> gimli::Result<Vec<u64>>
{
    (0..count).map(|_| read_offset(reader, format)).collect()
}

fn read_u32s(reader: &mut Slice<'_>, count: u32) -> gimli::Result<Vec<u32>>
{
    (0..count).map(|_| reader.read_u32()).collect()
}

fn parse_abbrevs(mut reader: Slice<'_>) -> Result<Vec<NamesAbbrev>, String>
{
    let mut abbrevs: Vec<NamesAbbrev> = Vec::new();
    loop {
        let code = reader
            .read_uleb128()
            .map_err(|err| format!("abbreviation table is not terminated: {err}"))?;
        if code == 0 {
            return Ok(abbrevs);
        }
        if abbrevs.iter().any(|abbrev| abbrev.code == code) {
            return Err(format!("duplicate abbreviation code 0x{code:x}"));
        }
        let truncated = |err: gimli::Error| format!("abbreviation 0x{code:x} is truncated: {err}");
        let tag = DwTag(reader.read_uleb128_u16().map_err(truncated)?);
        let mut attributes = Vec::new();
        loop {
            let index = reader.read_uleb128_u16().map_err(truncated)?;
            let form = reader.read_uleb128_u16().map_err(truncated)?;
            if index == 0 && form == 0 {
                break;
            }
            let form = DwForm(form);
            let implicit_const = if form == constants::DW_FORM_implicit_const {
                Some(reader.read_sleb128().map_err(truncated)?)
            } else {
                None
            };
            attributes.push(IndexAttribute {
                index: DwIdx(index),
                form,
                implicit_const,
            });
        }
        abbrevs.push(NamesAbbrev { code, tag, attributes });
    }
}

/// Decode the name index at `offset`, returning it and the next offset
fn parse_name_index<'a>(section: Slice<'a>, offset: u64) -> Result<(NameIndex<'a>, u64), String>
{
    let mut reader = section;
    reader
        .skip(offset as usize)
        .map_err(|_| format!("offset 0x{offset:x} is past the section end"))?;
    let (length, format) = reader
        .read_initial_length()
        .map_err(|err| format!("cannot read unit length: {err}"))?;
    let end = offset + u64::from(format.initial_length_size()) + length as u64;
    let mut unit = reader
        .split(length)
        .map_err(|_| format!("unit length 0x{length:x} runs past the section end"))?;

    let truncated = |err: gimli::Error| format!("name index at 0x{offset:x} is truncated: {err}");
    let version = unit.read_u16().map_err(truncated)?;
    if version != 5 {
        return Err(format!("unsupported version {version}"));
    }
    let _padding = unit.read_u16().map_err(truncated)?;
    let cu_count = unit.read_u32().map_err(truncated)?;
    let local_tu_count = unit.read_u32().map_err(truncated)?;
    let foreign_tu_count = unit.read_u32().map_err(truncated)?;
    let bucket_count = unit.read_u32().map_err(truncated)?;
    let name_count = unit.read_u32().map_err(truncated)?;
    let abbrev_table_size = unit.read_u32().map_err(truncated)?;
    let augmentation_size = unit.read_u32().map_err(truncated)?;
    let augmentation = u64::from(augmentation_size).next_multiple_of(4);
    unit.skip(usize::try_from(augmentation).unwrap_or(usize::MAX))
        .map_err(truncated)?;

    let cu_offsets = read_offsets(&mut unit, format, cu_count).map_err(truncated)?;
    let local_tu_offsets = read_offsets(&mut unit, format, local_tu_count).map_err(truncated)?;
    let foreign_tu_size = usize::try_from(foreign_tu_count)
        .ok()
        .and_then(|count| count.checked_mul(8))
        .unwrap_or(usize::MAX);
    unit.skip(foreign_tu_size).map_err(truncated)?;
    let buckets = read_u32s(&mut unit, bucket_count).map_err(truncated)?;
    let hashes = if bucket_count > 0 {
        read_u32s(&mut unit, name_count).map_err(truncated)?
    } else {
        Vec::new()
    };
    let string_offsets = read_offsets(&mut unit, format, name_count).map_err(truncated)?;
    let entry_offsets = read_offsets(&mut unit, format, name_count).map_err(truncated)?;
    let abbrev_table = unit.split(abbrev_table_size as usize).map_err(truncated)?;
    let abbrevs = parse_abbrevs(abbrev_table).map_err(|err| format!("name index at 0x{offset:x}: {err}"))?;

    let index = NameIndex {
        offset,
        format,
        cu_offsets,
        local_tu_offsets,
        foreign_tu_count: u64::from(foreign_tu_count),
        buckets,
        hashes,
        string_offsets,
        entry_offsets,
        abbrevs,
        entry_pool: unit,
    };
    Ok((index, end))
}

fn read_index_value(reader: &mut Slice<'_>, attr: &IndexAttribute, format: Format) -> Result<u64, String>
{
    let value = match attr.form {
        constants::DW_FORM_flag_present => Ok(1),
        constants::DW_FORM_implicit_const => return Ok(attr.implicit_const.unwrap_or_default() as u64),
        constants::DW_FORM_data1 | constants::DW_FORM_ref1 | constants::DW_FORM_flag => reader.read_u8().map(u64::from),
        constants::DW_FORM_data2 | constants::DW_FORM_ref2 => reader.read_u16().map(u64::from),
        constants::DW_FORM_data4 | constants::DW_FORM_ref4 => reader.read_u32().map(u64::from),
        constants::DW_FORM_data8 | constants::DW_FORM_ref8 | constants::DW_FORM_ref_sig8 => reader.read_u64(),
        constants::DW_FORM_data16 => reader.skip(16).map(|()| 0),
        constants::DW_FORM_udata | constants::DW_FORM_ref_udata => reader.read_uleb128(),
        constants::DW_FORM_sdata => reader.read_sleb128().map(|value| value as u64),
        constants::DW_FORM_ref_addr | constants::DW_FORM_sec_offset | constants::DW_FORM_strp => {
            read_offset(reader, format)
        }
        form => return Err(format!("unsupported form {form} for {}", attr.index)),
    };
    value.map_err(|err| format!("truncated entry: {err}"))
}

/// Decode the entry at `offset` in the pool
///
/// `Ok(None)` is the terminating zero code of a name's entry list.
fn read_entry(index: &NameIndex<'_>, offset: &mut u64) -> Result<Option<NameEntry>, String>
{
    let at = *offset;
    let mut reader = index.entry_pool;
    reader
        .skip(at as usize)
        .map_err(|_| format!("entry offset 0x{at:x} is past the entry pool"))?;
    let start = reader.len();
    let code = reader
        .read_uleb128()
        .map_err(|err| format!("cannot read abbreviation code at 0x{at:x}: {err}"))?;
    if code == 0 {
        return Ok(None);
    }
    let abbrev = index
        .abbrev(code)
        .ok_or_else(|| format!("entry at 0x{at:x} uses undeclared abbreviation 0x{code:x}"))?;

    let mut entry = NameEntry {
        tag: abbrev.tag,
        cu_index: None,
        tu_index: None,
        die_offset: None,
    };
    for attr in &abbrev.attributes {
        let value = read_index_value(&mut reader, attr, index.format)?;
        match attr.index {
            constants::DW_IDX_compile_unit => entry.cu_index = Some(value),
            constants::DW_IDX_type_unit => entry.tu_index = Some(value),
            constants::DW_IDX_die_offset => entry.die_offset = Some(value),
            _ => {}
        }
    }
    *offset += (start - reader.len()) as u64;
    Ok(Some(entry))
}

/// `name` without its trailing template parameter list, if it has one
fn strip_template_parameters(name: &str) -> Option<&str>
{
    if !name.ends_with('>') || !name.contains('<') || name.ends_with("<=>") {
        return None;
    }
    let spaceships = name.matches("<=>").count();
    let left = name.matches('<').count();
    let right = name.matches('>').count();
    let mut skip = 1 + spaceships + left.saturating_sub(right);

    let mut start = 0;
    while skip > 0 {
        start += name[start..].find('<')? + 1;
        skip -= 1;
    }
    Some(&name[..start - 1])
}

/// Class and selector names of an Objective-C method name like
/// `-[Class(Category) selector:]`
fn objc_selector_names(name: &str) -> Option<Vec<String>>
{
    let bytes = name.as_bytes();
    if bytes.len() < 4 || bytes[1] != b'[' || !matches!(bytes[0], b'+' | b'-') {
        return None;
    }
    let space = name.find(' ')?;
    let selector = name.get(space + 1..name.len() - 1)?;
    let class = name.get(2..space)?;
    let mut names = vec![class.to_string(), selector.to_string()];
    if class.ends_with(')') {
        if let Some(paren) = class.find('(') {
            names.push(class[..paren].to_string());
            names.push(format!("{}{}", &name[..paren + 2], &name[space..]));
        }
    }
    Some(names)
}

/// Alternative names to accept for an entry
#[derive(Debug, Clone, Copy)]
struct NameKinds
{
    stripped_templates: bool,
    objc: bool,
    linkage: bool,
}

/// Does the variable's location use a static address?
fn has_static_location(data: &DebugData, unit: &Unit, die: &Die) -> bool
{
    let Some((owner_unit, owner, _)) = data.find_recursively(unit, die, &[constants::DW_AT_location]) else {
        return false;
    };
    let Some(locations) = &owner.locations else {
        return false;
    };
    locations.expressions().iter().any(|expr| {
        let mut reader = data.reader(expr);
        while !reader.is_empty() {
            match Operation::parse(&mut reader, owner_unit.encoding()) {
                Ok(Operation::Address { .. } | Operation::AddressIndex { .. } | Operation::TLS) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    })
}

impl Verifier<'_>
{
    pub(crate) fn verify_debug_names(&self, bytes: &[u8])
    {
        let section = self.data.reader(bytes);
        let mut indices = Vec::new();
        let mut offset = 0u64;
        while offset < bytes.len() as u64 {
            match parse_name_index(section, offset) {
                Ok((index, next)) => {
                    indices.push(index);
                    offset = next;
                }
                Err(err) => {
                    self.aggregator.report("Accelerator Table Error", || {
                        format!("section is not a valid .debug_names section: {err}")
                    });
                    return;
                }
            }
        }

        let mut errors = self.verify_names_cu_lists(&indices);
        for index in &indices {
            errors += self.verify_names_buckets(index);
        }
        for index in &indices {
            errors += self.verify_names_abbrevs(index);
        }
        if errors > 0 {
            return;
        }

        let mut lookups = Vec::with_capacity(indices.len());
        for index in &indices {
            let mut lookup = BTreeMap::new();
            for name in 0..index.string_offsets.len() {
                errors += self.verify_names_entries(index, name, &mut lookup);
            }
            lookups.push(lookup);
        }
        if errors > 0 {
            return;
        }

        self.verify_names_completeness(&indices, &lookups);
    }

    /// Every index lists at least one existing compile unit, and no unit is
    /// claimed twice
    fn verify_names_cu_lists(&self, indices: &[NameIndex<'_>]) -> u32
    {
        let mut owners: BTreeMap<u64, Option<u64>> =
            self.data.units_in(UnitSection::Info).map(|unit| (unit.offset, None)).collect();
        let mut errors = 0;
        for index in indices {
            if index.cu_offsets.is_empty() {
                self.aggregator.report("Name Index doesn't index any CU", || {
                    format!("name index @ 0x{:x} does not index any CU", index.offset)
                });
                errors += 1;
                continue;
            }
            for (position, &cu) in index.cu_offsets.iter().enumerate() {
                match owners.get_mut(&cu) {
                    None => {
                        self.aggregator.report("Name Index references non-existing CU", || {
                            format!(
                                "name index @ 0x{:x} references a non-existing CU @ 0x{cu:x} (CU index {position})",
                                index.offset
                            )
                        });
                        errors += 1;
                    }
                    Some(Some(owner)) => {
                        let owner = *owner;
                        self.aggregator.report("Duplicate Name Index", || {
                            format!(
                                "name index @ 0x{:x} references a CU @ 0x{cu:x}, which is already indexed by name index @ 0x{owner:x}",
                                index.offset
                            )
                        });
                        errors += 1;
                    }
                    Some(slot) => *slot = Some(index.offset),
                }
            }
        }
        for (cu, owner) in owners {
            if owner.is_none() {
                warn!(cu, "CU not indexed by any name index");
            }
        }
        errors
    }

    fn verify_names_buckets(&self, index: &NameIndex<'_>) -> u32
    {
        let bucket_count = index.buckets.len() as u32;
        if bucket_count == 0 {
            warn!(offset = index.offset, "name index does not contain a hash table");
            return 0;
        }
        let name_count = index.name_count();

        let mut errors = 0;
        let mut starts = Vec::new();
        for (bucket, &start) in index.buckets.iter().enumerate() {
            if start > name_count {
                self.aggregator.report("Name Index Bucket contains invalid value", || {
                    format!(
                        "name index @ 0x{:x}: bucket {bucket} contains invalid value {start}; must be in [0, {name_count}]",
                        index.offset
                    )
                });
                errors += 1;
            } else if start > 0 {
                starts.push((start, bucket as u32));
            }
        }
        if errors > 0 {
            return errors;
        }

        starts.sort_unstable();
        starts.push((name_count + 1, bucket_count));
        let mut next_uncovered = 1;
        for (start, bucket) in starts {
            if start > next_uncovered {
                self.aggregator.report("Name table entries uncovered by hash table", || {
                    format!(
                        "name index @ 0x{:x}: name table entries [{next_uncovered}, {}] are not covered by the hash table",
                        index.offset,
                        start - 1
                    )
                });
                errors += 1;
            }
            if bucket == bucket_count {
                break;
            }

            let first_hash = index.hash(start).unwrap_or_default();
            if first_hash % bucket_count != bucket {
                self.aggregator.report("Name Index point to mismatched hash value", || {
                    format!(
                        "name index @ 0x{:x}: bucket {bucket} starts at name {start} whose hash 0x{first_hash:08x} belongs to another bucket",
                        index.offset
                    )
                });
                errors += 1;
            }

            let mut current = start;
            while current <= name_count {
                let Some(hash) = index.hash(current).filter(|hash| hash % bucket_count == bucket) else {
                    break;
                };
                if let Some(name) = index.name(self.data, current as usize - 1) {
                    let computed = case_folded_djb_hash(&name);
                    if computed != hash {
                        self.aggregator.report("String hash doesn't match Name Index hash", || {
                            format!(
                                "name index @ 0x{:x}: string ({name}) hash 0x{computed:08x} does not match name index hash 0x{hash:08x}",
                                index.offset
                            )
                        });
                        errors += 1;
                    }
                }
                current += 1;
            }
            next_uncovered = next_uncovered.max(current);
        }
        errors
    }

    fn verify_names_abbrevs(&self, index: &NameIndex<'_>) -> u32
    {
        let mut errors = 0;
        for abbrev in &index.abbrevs {
            if abbrev.tag.static_string().is_none() {
                warn!(offset = index.offset, code = abbrev.code, tag = abbrev.tag.0, "abbreviation references unknown tag");
            }
            let mut seen = BTreeSet::new();
            for attr in &abbrev.attributes {
                if !seen.insert(attr.index) {
                    self.aggregator
                        .report("NameIndex Abbreviation contains multiple attributes", || {
                            format!(
                                "name index @ 0x{:x}: abbreviation 0x{:x} contains multiple {} attributes",
                                index.offset, abbrev.code, attr.index
                            )
                        });
                    errors += 1;
                    continue;
                }
                errors += self.verify_names_abbrev_attribute(index, abbrev, attr);
            }

            let names_unit =
                seen.contains(&constants::DW_IDX_compile_unit) || seen.contains(&constants::DW_IDX_type_unit);
            if index.cu_offsets.len() > 1 && !names_unit {
                self.aggregator.report("Abbreviation contains no attribute", || {
                    format!(
                        "name index @ 0x{:x}: indexing multiple CUs and abbreviation 0x{:x} has no DW_IDX_compile_unit or DW_IDX_type_unit attribute",
                        index.offset, abbrev.code
                    )
                });
                errors += 1;
            }
            if !seen.contains(&constants::DW_IDX_die_offset) {
                self.aggregator.report("Abbreviate in NameIndex missing attribute", || {
                    format!(
                        "name index @ 0x{:x}: abbreviation 0x{:x} has no DW_IDX_die_offset attribute",
                        index.offset, abbrev.code
                    )
                });
                errors += 1;
            }
        }
        errors
    }

    fn verify_names_abbrev_attribute(&self, index: &NameIndex<'_>, abbrev: &NamesAbbrev, attr: &IndexAttribute) -> u32
    {
        let form = attr.form;
        if form.static_string().is_none() {
            self.aggregator.report("Unknown NameIndex Abbreviation", || {
                format!(
                    "name index @ 0x{:x}: abbreviation 0x{:x}: {} uses an unknown form: {}",
                    index.offset, abbrev.code, attr.index, form.0
                )
            });
            return 1;
        }

        let (allowed, expected) = match attr.index {
            constants::DW_IDX_parent => (
                matches!(form, constants::DW_FORM_ref4 | constants::DW_FORM_flag_present),
                "DW_FORM_ref4 or DW_FORM_flag_present",
            ),
            constants::DW_IDX_type_hash => (form == constants::DW_FORM_data8, "DW_FORM_data8"),
            constants::DW_IDX_compile_unit | constants::DW_IDX_type_unit => (
                matches!(
                    form,
                    constants::DW_FORM_data1
                        | constants::DW_FORM_data2
                        | constants::DW_FORM_data4
                        | constants::DW_FORM_data8
                        | constants::DW_FORM_data16
                        | constants::DW_FORM_udata
                        | constants::DW_FORM_sdata
                        | constants::DW_FORM_implicit_const
                ),
                "constant",
            ),
            constants::DW_IDX_die_offset => (
                matches!(
                    form,
                    constants::DW_FORM_ref1
                        | constants::DW_FORM_ref2
                        | constants::DW_FORM_ref4
                        | constants::DW_FORM_ref8
                        | constants::DW_FORM_ref_udata
                        | constants::DW_FORM_ref_addr
                        | constants::DW_FORM_ref_sig8
                        | constants::DW_FORM_ref_sup4
                        | constants::DW_FORM_ref_sup8
                        | constants::DW_FORM_GNU_ref_alt
                ),
                "reference",
            ),
            other => {
                if !(constants::DW_IDX_lo_user.0..=constants::DW_IDX_hi_user.0).contains(&other.0) {
                    warn!(
                        offset = index.offset,
                        code = abbrev.code,
                        index = other.0,
                        "abbreviation contains an unknown index attribute"
                    );
                }
                return 0;
            }
        };
        if allowed {
            return 0;
        }
        self.aggregator.report("Unexpected NameIndex Abbreviation", || {
            format!(
                "name index @ 0x{:x}: abbreviation 0x{:x}: {} uses an unexpected form {form} (expected {expected})",
                index.offset, abbrev.code, attr.index
            )
        });
        1
    }

    /// Check every entry of name `position` and record the entries it
    /// names in `lookup` (name to unit-relative DIE offsets)
    fn verify_names_entries(&self, index: &NameIndex<'_>, position: usize, lookup: &mut BTreeMap<String, BTreeSet<u64>>) -> u32
    {
        let Some(name) = index.name(self.data, position) else {
            self.aggregator.report("Unable to get string associated with name", || {
                format!("name index @ 0x{:x}: unable to get string associated with name {}", index.offset, position + 1)
            });
            return 1;
        };

        let mut errors = 0;
        let mut entries = 0u32;
        let mut next = index.entry_offsets.get(position).copied().unwrap_or_default();
        loop {
            let at = next;
            let entry = match read_entry(index, &mut next) {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    if entries == 0 {
                        self.aggregator.report("NameIndex Name is not associated with any entries", || {
                            format!(
                                "name index @ 0x{:x}: name {} ({name}) is not associated with any entries",
                                index.offset,
                                position + 1
                            )
                        });
                        errors += 1;
                    }
                    break;
                }
                Err(err) => {
                    self.aggregator.report("Potentially invalid name index", || {
                        format!("name index @ 0x{:x}: {err}", index.offset)
                    });
                    errors += 1;
                    break;
                }
            };
            entries += 1;
            errors += self.verify_names_entry(index, &name, at, entry, lookup);
        }
        errors
    }

    fn verify_names_entry(
        &self,
        index: &NameIndex<'_>,
        name: &str,
        at: u64,
        entry: NameEntry,
        lookup: &mut BTreeMap<String, BTreeSet<u64>>,
    ) -> u32
    {
        let cu_count = index.cu_offsets.len() as u64;
        let local_tus = index.local_tu_offsets.len() as u64;
        let cu_index = entry.cu_index.or((cu_count == 1).then_some(0));

        if let Some(cu) = cu_index.filter(|&cu| cu >= cu_count) {
            self.aggregator.report("Name Index entry contains invalid CU index", || {
                format!("name index @ 0x{:x}: entry @ 0x{at:x} contains an invalid CU index ({cu})", index.offset)
            });
            return 1;
        }
        if let Some(tu) = entry.tu_index.filter(|&tu| tu >= local_tus + index.foreign_tu_count) {
            self.aggregator.report("Name Index entry contains invalid TU index", || {
                format!("name index @ 0x{:x}: entry @ 0x{at:x} contains an invalid TU index ({tu})", index.offset)
            });
            return 1;
        }

        let unit_offset = match (entry.tu_index, cu_index) {
            (Some(tu), _) if tu >= local_tus => {
                // Foreign type units live in split files that are not loaded
                if cu_index.is_none() {
                    self.aggregator
                        .report("Name Index entry contains foreign TU index with invalid CU index", || {
                            format!(
                                "name index @ 0x{:x}: entry @ 0x{at:x} has foreign TU index {tu} and no valid CU index",
                                index.offset
                            )
                        });
                    return 1;
                }
                return 0;
            }
            (Some(tu), _) => index.local_tu_offsets[tu as usize],
            (None, Some(cu)) => index.cu_offsets[cu as usize],
            (None, None) => return 0,
        };

        let unit = self
            .data
            .unit_for_offset(UnitSection::Info, unit_offset)
            .filter(|unit| unit.offset == unit_offset);
        let Some(unit) = unit else {
            self.aggregator.report("Name Index entry contains invalid CU or TU offset", || {
                format!(
                    "name index @ 0x{:x}: entry @ 0x{at:x} references unit @ 0x{unit_offset:x}, which is not a unit",
                    index.offset
                )
            });
            return 1;
        };
        let Some(die_offset) = entry.die_offset else {
            return 0;
        };
        lookup.entry(name.to_string()).or_default().insert(die_offset);

        let absolute = unit.offset.saturating_add(die_offset);
        let Some(die) = unit.entry_at(absolute) else {
            self.aggregator.report("NameIndex references nonexistent DIE", || {
                format!(
                    "name index @ 0x{:x}: entry @ 0x{at:x} references a non-existing DIE @ 0x{absolute:x}",
                    index.offset
                )
            });
            return 1;
        };

        let mut errors = 0;
        if die.tag != entry.tag {
            self.aggregator.report("Name Index contains mismatched Tag of DIE", || {
                format!(
                    "name index @ 0x{:x}: tag {} of entry @ 0x{at:x} does not match tag {} of DIE @ 0x{absolute:x}",
                    index.offset,
                    tag_name(entry.tag),
                    tag_name(die.tag)
                )
            });
            errors += 1;
        }

        let kinds = NameKinds {
            stripped_templates: matches!(
                die.tag,
                constants::DW_TAG_subprogram | constants::DW_TAG_inlined_subroutine
            ),
            objc: true,
            linkage: true,
        };
        let names = self.die_names(unit, die, kinds);
        if !names.iter().any(|candidate| candidate == name) {
            self.aggregator.report("Name Index contains mismatched Name of DIE", || {
                format!(
                    "name index @ 0x{:x}: name of entry @ 0x{at:x} ({name}) does not match any name of DIE @ 0x{absolute:x}: {names:?}",
                    index.offset
                )
            });
            errors += 1;
        }
        errors
    }

    /// The names an index may list `die` under
    fn die_names(&self, unit: &Unit, die: &Die, kinds: NameKinds) -> Vec<String>
    {
        let mut names = Vec::new();
        let short = self
            .data
            .find_recursively(unit, die, &[constants::DW_AT_name])
            .and_then(|(owner, _, attr)| resolve_string(self.data, owner, &attr.value).ok());
        if let Some(short) = short {
            let short = short.into_owned();
            if kinds.stripped_templates {
                if let Some(stripped) = strip_template_parameters(&short) {
                    names.push(stripped.to_string());
                }
            }
            if kinds.objc {
                names.extend(objc_selector_names(&short).unwrap_or_default());
            }
            names.insert(0, short);
        } else if die.tag == constants::DW_TAG_namespace {
            names.push(String::from("(anonymous namespace)"));
        }

        if kinds.linkage {
            let linkage = self
                .data
                .find_recursively(unit, die, &[constants::DW_AT_MIPS_linkage_name, constants::DW_AT_linkage_name])
                .and_then(|(owner, _, attr)| resolve_string(self.data, owner, &attr.value).ok());
            if let Some(linkage) = linkage {
                names.push(linkage.into_owned());
            }
        }
        names
    }

    /// Every entry that must be indexed appears under each of its names in
    /// the index that lists its compile unit
    fn verify_names_completeness(&self, indices: &[NameIndex<'_>], lookups: &[BTreeMap<String, BTreeSet<u64>>])
    {
        for unit in self.data.units_in(UnitSection::Info) {
            // Split units are indexed through their .dwo files
            if unit.dwo_id.is_some() || matches!(unit.unit_type, constants::DW_UT_type | constants::DW_UT_split_type) {
                continue;
            }
            let Some(position) = indices.iter().position(|index| index.cu_offsets.contains(&unit.offset)) else {
                continue;
            };
            let lookup = &lookups[position];
            for die in &unit.entries {
                self.verify_die_indexed(unit, die, lookup);
            }
        }
    }

    fn verify_die_indexed(&self, unit: &Unit, die: &Die, lookup: &BTreeMap<String, BTreeSet<u64>>)
    {
        if die.has_attr(constants::DW_AT_declaration) {
            return;
        }
        let kinds = NameKinds {
            stripped_templates: false,
            objc: false,
            linkage: matches!(
                die.tag,
                constants::DW_TAG_subprogram | constants::DW_TAG_inlined_subroutine
            ),
        };
        let names = self.die_names(unit, die, kinds);
        if names.is_empty() || is_never_indexed(die.tag) {
            return;
        }
        let must_index = match die.tag {
            constants::DW_TAG_subprogram | constants::DW_TAG_inlined_subroutine | constants::DW_TAG_label => self
                .data
                .find_recursively(
                    unit,
                    die,
                    &[
                        constants::DW_AT_ranges,
                        constants::DW_AT_low_pc,
                        constants::DW_AT_high_pc,
                        constants::DW_AT_entry_pc,
                    ],
                )
                .is_some(),
            constants::DW_TAG_variable => has_static_location(self.data, unit, die),
            _ => true,
        };
        if !must_index {
            return;
        }

        let die_offset = die.offset - unit.offset;
        for name in names {
            let indexed = lookup.get(&name).is_some_and(|offsets| offsets.contains(&die_offset));
            if !indexed {
                self.aggregator
                    .report_sub("Name Index DIE entry missing name", &tag_name(die.tag), || {
                        format!(
                            "name index for unit @ 0x{:x} is missing DIE @ 0x{:x} ({}) under name {name}",
                            unit.offset,
                            die.offset,
                            tag_name(die.tag)
                        )
                    });
            }
        }
    }
}
