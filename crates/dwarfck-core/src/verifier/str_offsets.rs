//! `.debug_str_offsets` contributions.

use gimli::Reader;

use super::header::read_offset;
use super::Verifier;

impl Verifier<'_>
{
    /// Walk every contribution and check that each offset names the start
    /// of a string in `.debug_str`
    pub(crate) fn verify_str_offsets(&self)
    {
        let bytes = &self.data.sections.debug_str_offsets;
        let strings = &self.data.sections.debug_str;
        let section_len = bytes.len() as u64;
        let mut next = 0u64;

        while next < section_len {
            let start = next;
            let mut reader = self.data.reader(&bytes[start as usize..]);
            let Ok((length, format)) = reader.read_initial_length() else {
                self.aggregator.report("String offset error", || {
                    format!(".debug_str_offsets: contribution 0x{start:x}: cannot read the initial length")
                });
                return;
            };
            let length = length as u64;
            let header_size = u64::from(format.initial_length_size());
            let end = start.checked_add(header_size).and_then(|v| v.checked_add(length));
            let Some(end) = end.filter(|&end| end <= section_len) else {
                self.aggregator
                    .report("Section contribution length exceeds available space", || {
                        format!(
                            ".debug_str_offsets: contribution 0x{start:x}: length exceeds available space \
                             (contribution offset 0x{start:x} + length field space 0x{header_size:x} + length 0x{length:x} > section size 0x{section_len:x})"
                        )
                    });
                return;
            };
            next = end;

            let Ok(mut contribution) = reader.split(length as usize) else {
                return;
            };
            let version = match contribution.read_u16() {
                Ok(version) => version,
                Err(_) => {
                    self.aggregator.report("String offset error", || {
                        format!(".debug_str_offsets: contribution 0x{start:x}: too short for a version")
                    });
                    continue;
                }
            };
            if version != 5 {
                self.aggregator.report("Invalid Section version", || {
                    format!(".debug_str_offsets: contribution 0x{start:x}: invalid version {version}")
                });
                continue;
            }
            if contribution.read_u16().is_err() {
                self.aggregator.report("String offset error", || {
                    format!(".debug_str_offsets: contribution 0x{start:x}: too short for the header padding")
                });
                continue;
            }

            let entry_size = u64::from(format.word_size());
            if length.saturating_sub(4) % entry_size != 0 {
                self.aggregator.report("Invalid section contribution length", || {
                    format!(
                        ".debug_str_offsets: contribution 0x{start:x}: invalid length ((length (0x{length:x}) - version (0x2) - padding (0x2)) % offset size 0x{entry_size:x} == 0x{:x} != 0)",
                        length.saturating_sub(4) % entry_size
                    )
                });
            }

            let mut index = 0u64;
            while contribution.len() as u64 >= entry_size {
                let Ok(offset) = read_offset(&mut contribution, format) else {
                    break;
                };
                let current = index;
                index += 1;
                if offset == 0 {
                    continue;
                }
                if offset >= strings.len() as u64 {
                    self.aggregator.report("String offset out of bounds of string section", || {
                        format!(
                            ".debug_str_offsets: contribution 0x{start:x}: index 0x{current:x}: invalid string offset 0x{offset:x}"
                        )
                    });
                    continue;
                }
                if strings[offset as usize - 1] != 0 {
                    self.aggregator.report("Section contribution does not start with a string", || {
                        format!(
                            ".debug_str_offsets: contribution 0x{start:x}: index 0x{current:x}: invalid string offset 0x{offset:x}, is neither zero nor immediately following a null character"
                        )
                    });
                }
            }
        }
    }
}
