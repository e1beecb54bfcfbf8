//! Unit header chain of `.debug_info` and `.debug_types`.

use std::collections::BTreeSet;

use gimli::{Format, Reader};
use tracing::{trace, warn};

use super::abbrev::parse_abbrev_set;
use super::tags::is_known_unit_type;
use super::Verifier;
use crate::types::UnitSection;

/// Outcome of the header walk over one section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HeaderChain
{
    /// Offsets of headers that passed every check
    pub accepted: BTreeSet<u64>,
    /// Offsets of headers that failed a check
    pub rejected: BTreeSet<u64>,
}

enum HeaderOutcome
{
    Accepted,
    Rejected,
    /// The walk cannot find the next header
    Stop,
}

impl Verifier<'_>
{
    /// Walk the unit headers of `section` back to back
    pub(crate) fn verify_unit_headers(&self, section: UnitSection) -> HeaderChain
    {
        let bytes = self.data.sections.unit_section(section);
        let mut chain = HeaderChain::default();
        let mut offset = 0u64;
        while offset < bytes.len() as u64 {
            let (outcome, next) = self.verify_unit_header(section, bytes, offset);
            match outcome {
                HeaderOutcome::Accepted => {
                    chain.accepted.insert(offset);
                }
                HeaderOutcome::Rejected => {
                    chain.rejected.insert(offset);
                }
                HeaderOutcome::Stop => {
                    chain.rejected.insert(offset);
                    break;
                }
            }
            match next {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
        }
        if bytes.is_empty() {
            trace!(section = section.name(), "section is empty");
        }
        chain
    }

    fn verify_unit_header(&self, section: UnitSection, bytes: &[u8], offset: u64) -> (HeaderOutcome, Option<u64>)
    {
        let name = section.name();
        let Some(rest) = usize::try_from(offset).ok().and_then(|start| bytes.get(start..)) else {
            return (HeaderOutcome::Stop, None);
        };
        let mut reader = self.data.reader(rest);

        let (length, format) = match reader.read_initial_length() {
            Ok((length, format)) => (length as u64, format),
            Err(err) => {
                self.aggregator.report("Unit Header Length", || {
                    format!("{name} unit at 0x{offset:08x}: cannot read unit length: {err}")
                });
                return (HeaderOutcome::Stop, None);
            }
        };
        let length_size = u64::from(format.initial_length_size());
        let end = offset.checked_add(length_size).and_then(|v| v.checked_add(length));
        let Some(end) = end.filter(|&end| end <= bytes.len() as u64) else {
            self.aggregator.report("Unit Header Length", || {
                format!(
                    "{name} unit at 0x{offset:08x}: unit length 0x{length:x} runs past the section end 0x{:x}",
                    bytes.len()
                )
            });
            return (HeaderOutcome::Stop, None);
        };
        let next = Some(end);

        let Ok(mut unit) = reader.split(length as usize) else {
            return (HeaderOutcome::Stop, None);
        };
        let fields = read_header_fields(&mut unit, format);
        let Ok((version, unit_type, address_size, abbrev_offset)) = fields else {
            self.aggregator.report("Unit Header Length", || {
                format!("{name} unit at 0x{offset:08x}: unit length 0x{length:x} is too small for the unit header")
            });
            let outcome = if format == Format::Dwarf64 { HeaderOutcome::Stop } else { HeaderOutcome::Rejected };
            return (outcome, next);
        };

        let mut valid = true;
        if !(2..=5).contains(&version) {
            valid = false;
            self.aggregator.report("Unit Header Version", || {
                format!("{name} unit at 0x{offset:08x}: 16 bit unit header version {version} is not valid")
            });
        }
        if let Some(unit_type) = unit_type.filter(|&ut| !is_known_unit_type(ut)) {
            valid = false;
            self.aggregator.report("Unit Header Type", || {
                format!("{name} unit at 0x{offset:08x}: unit type encoding 0x{unit_type:02x} is not valid")
            });
        }
        if !matches!(address_size, 2 | 4 | 8) {
            valid = false;
            self.aggregator.report("Unit Header Address Size", || {
                format!("{name} unit at 0x{offset:08x}: address size {address_size} is unsupported")
            });
        }
        let abbrev = self.data.reader(&self.data.sections.debug_abbrev);
        if let Err(err) = parse_abbrev_set(&abbrev, abbrev_offset) {
            valid = false;
            self.aggregator.report("Unit Header Abbreviation Offset", || {
                format!(
                    "{name} unit at 0x{offset:08x}: offset 0x{abbrev_offset:08x} into .debug_abbrev is not valid: {err}"
                )
            });
        }

        if valid {
            (HeaderOutcome::Accepted, next)
        } else if format == Format::Dwarf64 {
            warn!(section = name, offset, "stopping after invalid DWARF64 unit header");
            (HeaderOutcome::Stop, next)
        } else {
            (HeaderOutcome::Rejected, next)
        }
    }
}

/// Version, unit type (DWARF 5 only), address size and abbreviation offset
fn read_header_fields<R: Reader>(unit: &mut R, format: Format) -> gimli::Result<(u16, Option<u8>, u8, u64)>
{
    let version = unit.read_u16()?;
    if version >= 5 {
        let unit_type = unit.read_u8()?;
        let address_size = unit.read_u8()?;
        let abbrev_offset = read_offset(unit, format)?;
        Ok((version, Some(unit_type), address_size, abbrev_offset))
    } else {
        let abbrev_offset = read_offset(unit, format)?;
        let address_size = unit.read_u8()?;
        Ok((version, None, address_size, abbrev_offset))
    }
}

pub(crate) fn read_offset<R: Reader>(reader: &mut R, format: Format) -> gimli::Result<u64>
{
    match format {
        Format::Dwarf32 => reader.read_u32().map(u64::from),
        Format::Dwarf64 => reader.read_u64(),
    }
}
