//! Apple-style accelerator tables (`.apple_names`, `.apple_types`,
//! `.apple_namespaces`, `.apple_objc`).
//!
//! Layout: a 20 byte fixed header, the header data (DIE offset base and atom
//! descriptors), then the bucket, hash and hash-data offset arrays. Each
//! hash-data chain is a list of `(strp, count, atoms...)` records ended by a
//! zero string offset.

use gimli::{constants, DwForm, DwTag, EndianSlice, Reader, RunTimeEndian};

use super::djb_hash;
use crate::types::UnitSection;
use crate::verifier::strings::c_string_at;
use crate::verifier::Verifier;

const FIXED_HEADER_SIZE: u64 = 20;
const EMPTY_BUCKET: u32 = u32::MAX;
const HASH_FUNCTION_DJB: u16 = 0;

const ATOM_DIE_OFFSET: u16 = 1;
const ATOM_DIE_TAG: u16 = 3;
const ATOM_TYPE_FLAGS: u16 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
struct AppleHeader
{
    hash_function: u16,
    bucket_count: u32,
    hash_count: u32,
    header_data_length: u32,
    atoms: Vec<(u16, DwForm)>,
}

impl AppleHeader
{
    fn buckets_base(&self) -> u64
    {
        FIXED_HEADER_SIZE + u64::from(self.header_data_length)
    }

    fn hashes_base(&self) -> u64
    {
        self.buckets_base() + 4 * u64::from(self.bucket_count)
    }

    fn offsets_base(&self) -> u64
    {
        self.hashes_base() + 4 * u64::from(self.hash_count)
    }

    fn end(&self) -> u64
    {
        self.offsets_base() + 4 * u64::from(self.hash_count)
    }

    /// DIE offset, tag and type-flag atoms must be unsigned constants or flags
    fn forms_are_valid(&self) -> bool
    {
        self.atoms.iter().all(|&(atom, form)| {
            if !matches!(atom, ATOM_DIE_OFFSET | ATOM_DIE_TAG | ATOM_TYPE_FLAGS) {
                return true;
            }
            matches!(
                form,
                constants::DW_FORM_data1
                    | constants::DW_FORM_data2
                    | constants::DW_FORM_data4
                    | constants::DW_FORM_data8
                    | constants::DW_FORM_udata
                    | constants::DW_FORM_flag
                    | constants::DW_FORM_flag_present
            )
        })
    }
}

fn parse_header(reader: &mut EndianSlice<'_, RunTimeEndian>, section_len: u64) -> Result<AppleHeader, String>
{
    let truncated = |err: gimli::Error| format!("truncated header: {err}");
    let _magic = reader.read_u32().map_err(truncated)?;
    let _version = reader.read_u16().map_err(truncated)?;
    let hash_function = reader.read_u16().map_err(truncated)?;
    let bucket_count = reader.read_u32().map_err(truncated)?;
    let hash_count = reader.read_u32().map_err(truncated)?;
    let header_data_length = reader.read_u32().map_err(truncated)?;

    let mut data = reader
        .split(header_data_length as usize)
        .map_err(|_| format!("header data length {header_data_length} runs past the section end"))?;
    let _die_offset_base = data.read_u32().map_err(truncated)?;
    let atom_count = data.read_u32().map_err(truncated)?;
    let mut atoms = Vec::new();
    for _ in 0..atom_count {
        let atom = data.read_u16().map_err(truncated)?;
        let form = data.read_u16().map_err(truncated)?;
        atoms.push((atom, DwForm(form)));
    }

    let header = AppleHeader {
        hash_function,
        bucket_count,
        hash_count,
        header_data_length,
        atoms,
    };
    if header.end() > section_len {
        return Err(format!(
            "section of 0x{section_len:x} bytes is too small for {bucket_count} buckets and {hash_count} hashes"
        ));
    }
    Ok(header)
}

fn u32_at(reader: &EndianSlice<'_, RunTimeEndian>, offset: u64) -> Option<u32>
{
    let mut reader = *reader;
    reader.skip(usize::try_from(offset).ok()?).ok()?;
    reader.read_u32().ok()
}

/// Read one record's atoms, returning its DIE offset and tag
fn read_atoms(reader: &mut EndianSlice<'_, RunTimeEndian>, atoms: &[(u16, DwForm)]) -> Result<(Option<u64>, Option<u64>), String>
{
    let mut die_offset = None;
    let mut tag = None;
    for &(atom, form) in atoms {
        let value = read_form_value(reader, form)?;
        match atom {
            ATOM_DIE_OFFSET => die_offset = Some(value),
            ATOM_DIE_TAG => tag = Some(value),
            _ => {}
        }
    }
    Ok((die_offset, tag))
}

fn read_form_value(reader: &mut EndianSlice<'_, RunTimeEndian>, form: DwForm) -> Result<u64, String>
{
    let value = match form {
        constants::DW_FORM_flag_present => Ok(1),
        constants::DW_FORM_data1 | constants::DW_FORM_flag | constants::DW_FORM_ref1 => reader.read_u8().map(u64::from),
        constants::DW_FORM_data2 | constants::DW_FORM_ref2 => reader.read_u16().map(u64::from),
        constants::DW_FORM_data4 | constants::DW_FORM_ref4 | constants::DW_FORM_strp | constants::DW_FORM_sec_offset => {
            reader.read_u32().map(u64::from)
        }
        constants::DW_FORM_data8 | constants::DW_FORM_ref8 | constants::DW_FORM_ref_sig8 => reader.read_u64(),
        constants::DW_FORM_udata | constants::DW_FORM_ref_udata => reader.read_uleb128(),
        constants::DW_FORM_sdata => reader.read_sleb128().map(|value| value as u64),
        _ => return Err(format!("cannot read atom with form {form}")),
    };
    value.map_err(|err| format!("truncated atom: {err}"))
}

impl Verifier<'_>
{
    pub(crate) fn verify_apple_table(&self, section: &str, bytes: &[u8])
    {
        let table = self.data.reader(bytes);
        let len = bytes.len() as u64;
        if len < FIXED_HEADER_SIZE {
            self.aggregator.report("Section is too small to fit a section header", || {
                format!("{section}: section is too small to fit a section header")
            });
            return;
        }
        let mut reader = table;
        let header = match parse_header(&mut reader, len) {
            Ok(header) => header,
            Err(err) => {
                self.aggregator
                    .report("Section is too small to fit a section header", || format!("{section}: {err}"));
                return;
            }
        };

        for bucket in 0..u64::from(header.bucket_count) {
            let Some(hash_index) = u32_at(&table, header.buckets_base() + 4 * bucket) else {
                break;
            };
            if hash_index >= header.hash_count && hash_index != EMPTY_BUCKET {
                self.aggregator.report("Invalid hash index", || {
                    format!("{section}: bucket[{bucket}] has invalid hash index {hash_index}")
                });
            }
        }

        if header.atoms.is_empty() {
            self.aggregator
                .report("No atoms", || format!("{section}: no atoms; failed to read HashData"));
            return;
        }
        if !header.forms_are_valid() {
            self.aggregator.report("Unsupported form", || {
                format!("{section}: unsupported form; failed to read HashData")
            });
            return;
        }

        for hash_index in 0..u64::from(header.hash_count) {
            let (Some(hash), Some(data_offset)) = (
                u32_at(&table, header.hashes_base() + 4 * hash_index),
                u32_at(&table, header.offsets_base() + 4 * hash_index),
            ) else {
                break;
            };
            if u64::from(data_offset) + 8 > len {
                self.aggregator.report("Invalid HashData offset", || {
                    format!("{section}: hash[{hash_index}] has invalid HashData offset 0x{data_offset:08x}")
                });
                continue;
            }
            self.verify_apple_hash_data(section, &table, &header, hash, data_offset);
        }
    }

    fn verify_apple_hash_data(
        &self,
        section: &str,
        table: &EndianSlice<'_, RunTimeEndian>,
        header: &AppleHeader,
        hash: u32,
        data_offset: u32,
    )
    {
        let mut data = *table;
        if data.skip(data_offset as usize).is_err() {
            return;
        }
        loop {
            let Ok(strp) = data.read_u32() else {
                return;
            };
            if strp == 0 {
                return;
            }
            let Ok(count) = data.read_u32() else {
                return;
            };

            let name = c_string_at(&self.data.sections.debug_str, u64::from(strp));
            match name {
                Some(name) if header.hash_function == HASH_FUNCTION_DJB && djb_hash(name) != hash => {
                    self.aggregator.report("Mismatched hash in accelerator table", || {
                        format!(
                            "{section}: string \"{}\" hashes to 0x{:08x}, table stores 0x{hash:08x}",
                            String::from_utf8_lossy(name),
                            djb_hash(name)
                        )
                    });
                }
                Some(_) => {}
                None => {
                    self.aggregator.report("Invalid string offset in accelerator table", || {
                        format!("{section}: string offset 0x{strp:08x} is not a string in .debug_str")
                    });
                }
            }
            let display_name = || name.map_or_else(|| String::from("<invalid>"), |n| String::from_utf8_lossy(n).into_owned());

            for record in 0..count {
                let before = data.len();
                let (die_offset, tag) = match read_atoms(&mut data, &header.atoms) {
                    Ok(atoms) => atoms,
                    Err(_) => return,
                };
                // Records of zero-sized atoms all repeat the first one
                if record > 0 && data.len() == before {
                    break;
                }
                let Some(die_offset) = die_offset else {
                    continue;
                };
                let Some((_, die)) = self.data.die_for_offset(UnitSection::Info, die_offset) else {
                    self.aggregator.report("Invalid DIE offset", || {
                        format!(
                            "{section}: invalid DIE offset 0x{die_offset:08x} for \"{}\" (string offset 0x{strp:08x})",
                            display_name()
                        )
                    });
                    continue;
                };
                let Some(tag) = tag.filter(|&tag| tag != 0) else {
                    continue;
                };
                let tag = u16::try_from(tag).map(DwTag).ok();
                match tag {
                    Some(tag) if tag.static_string().is_some() => {
                        if die.tag != tag {
                            self.aggregator.report("Mismatched Tag in accelerator table", || {
                                format!(
                                    "{section}: tag {} in accelerator table does not match tag {} of DIE at 0x{die_offset:08x}",
                                    tag,
                                    die.tag
                                )
                            });
                        }
                    }
                    _ => {
                        self.aggregator.report("Unknown tag in accelerator table", || {
                            format!("{section}: \"{}\" has an unknown tag for DIE at 0x{die_offset:08x}", display_name())
                        });
                    }
                }
            }
        }
    }
}
