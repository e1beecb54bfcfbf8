//! String-form attribute resolution.

use std::borrow::Cow;

use gimli::{Format, Reader};

use crate::types::{AttrValue, DebugData, Unit};

/// Bytes of the NUL-terminated string at `offset`, without the terminator
pub(crate) fn c_string_at(section: &[u8], offset: u64) -> Option<&[u8]>
{
    let start = usize::try_from(offset).ok()?;
    let rest = section.get(start..)?;
    let len = rest.iter().position(|&b| b == 0)?;
    Some(&rest[..len])
}

fn string_at<'a>(section: &'a [u8], offset: u64, form: &str, name: &str) -> Result<Cow<'a, str>, String>
{
    if offset >= section.len() as u64 {
        return Err(format!("{form} offset 0x{offset:x} is beyond {name} bounds"));
    }
    c_string_at(section, offset)
        .map(String::from_utf8_lossy)
        .ok_or_else(|| format!("{form} string at 0x{offset:x} in {name} is not NUL-terminated"))
}

/// Offset stored in entry `index` of the unit's string offsets table
pub(crate) fn string_offset_for_index(data: &DebugData, unit: &Unit, index: u64) -> Result<u64, String>
{
    let Some(base) = unit.str_offsets_base else {
        return Err(String::from("DW_FORM_strx used without a DW_AT_str_offsets_base"));
    };
    let entry_size = u64::from(unit.format.word_size());
    let position = index
        .checked_mul(entry_size)
        .and_then(|rel| rel.checked_add(base))
        .ok_or_else(|| format!("string offsets index {index} overflows"))?;
    let section = &data.sections.debug_str_offsets;
    let start = usize::try_from(position).ok().filter(|&start| start < section.len());
    let Some(start) = start else {
        return Err(format!(
            "DW_FORM_strx index {index} (entry at 0x{position:x}) is beyond .debug_str_offsets bounds"
        ));
    };
    let mut reader = data.reader(&section[start..]);
    let value = match unit.format {
        Format::Dwarf32 => reader.read_u32().map(u64::from),
        Format::Dwarf64 => reader.read_u64(),
    };
    value.map_err(|_| format!("DW_FORM_strx index {index} entry at 0x{position:x} is truncated"))
}

/// Resolve a string-class attribute value
///
/// Fails with a diagnostic when the value points outside its string
/// section, at an unterminated string, or is not a string form at all.
pub(crate) fn resolve_string<'a>(data: &'a DebugData, unit: &Unit, value: &'a AttrValue) -> Result<Cow<'a, str>, String>
{
    match value {
        AttrValue::String(string) => Ok(Cow::Borrowed(string.as_str())),
        AttrValue::StrOffset(offset) => string_at(&data.sections.debug_str, *offset, "DW_FORM_strp", ".debug_str"),
        AttrValue::LineStrOffset(offset) => {
            string_at(&data.sections.debug_line_str, *offset, "DW_FORM_line_strp", ".debug_line_str")
        }
        AttrValue::StrIndex(index) => {
            let offset = string_offset_for_index(data, unit, *index)?;
            string_at(&data.sections.debug_str, offset, "DW_FORM_strx", ".debug_str")
        }
        _ => Err(String::from("attribute value is not a string")),
    }
}

#[cfg(test)]
mod tests
{
    use gimli::{constants, RunTimeEndian};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::UnitSection;

    fn data() -> (DebugData, Unit)
    {
        let mut data = DebugData::new(RunTimeEndian::Little);
        data.sections.debug_str = b"\0main\0unterminated".to_vec();
        data.sections.debug_str_offsets = vec![0, 0, 0, 0, 1, 0, 0, 0, 0x40, 0, 0, 0];
        let mut unit = Unit::new(UnitSection::Info, 0, 7, 5, constants::DW_UT_compile, 8);
        unit.str_offsets_base = Some(0);
        (data, unit)
    }

    #[test]
    fn strp_in_bounds()
    {
        let (data, unit) = data();
        let value = AttrValue::StrOffset(1);
        assert_eq!(resolve_string(&data, &unit, &value).as_deref(), Ok("main"));
    }

    #[test]
    fn strp_out_of_bounds_or_unterminated()
    {
        let (data, unit) = data();
        assert!(resolve_string(&data, &unit, &AttrValue::StrOffset(0x100)).is_err());
        assert!(resolve_string(&data, &unit, &AttrValue::StrOffset(7)).is_err());
    }

    #[test]
    fn strx_goes_through_offsets_table()
    {
        let (data, mut unit) = data();
        assert_eq!(resolve_string(&data, &unit, &AttrValue::StrIndex(1)).as_deref(), Ok("main"));
        assert!(resolve_string(&data, &unit, &AttrValue::StrIndex(2)).is_err());
        assert!(resolve_string(&data, &unit, &AttrValue::StrIndex(3)).is_err());

        unit.str_offsets_base = None;
        assert!(resolve_string(&data, &unit, &AttrValue::StrIndex(1)).is_err());
    }
}
