//! Split-DWARF package unit indices (`.debug_cu_index`, `.debug_tu_index`).

use std::collections::BTreeMap;

use gimli::{EndianSlice, Reader, RunTimeEndian};
use tracing::trace;

use super::Verifier;

const DW_SECT_INFO: u32 = 1;
/// `.debug_types` column of a version 2 type unit index
const DW_SECT_EXT_TYPES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexKind
{
    Compile,
    Type,
}

impl IndexKind
{
    fn section(self) -> &'static str
    {
        match self {
            IndexKind::Compile => ".debug_cu_index",
            IndexKind::Type => ".debug_tu_index",
        }
    }

    fn overlap_category(self) -> &'static str
    {
        match self {
            IndexKind::Compile => "Overlapping CU index entries",
            IndexKind::Type => "Overlapping TU index entries",
        }
    }

    fn unit_column(self, version: u32) -> u32
    {
        match (self, version) {
            (IndexKind::Type, 2) => DW_SECT_EXT_TYPES,
            _ => DW_SECT_INFO,
        }
    }
}

/// A decoded unit index
#[derive(Debug, Clone, PartialEq, Eq)]
struct UnitIndex
{
    version: u32,
    unit_count: u32,
    columns: Vec<u32>,
    /// `(signature, row)` per hash slot, `row` 1-based and 0 when empty
    slots: Vec<(u64, u32)>,
    /// Per row, `(offset, size)` per column
    contributions: Vec<Vec<(u32, u32)>>,
}

fn parse_unit_index(mut reader: EndianSlice<'_, RunTimeEndian>) -> Result<UnitIndex, String>
{
    let truncated = |err: gimli::Error| format!("truncated unit index: {err}");
    let mut peek = reader;
    let version = if matches!(peek.read_u32(), Ok(2)) {
        reader = peek;
        2
    } else {
        // Version 5 is a 2-byte version and 2 bytes of padding
        let version = reader.read_u16().map_err(truncated)?;
        if version != 5 {
            return Err(format!("unsupported version {version}"));
        }
        reader.read_u16().map_err(truncated)?;
        u32::from(version)
    };
    let column_count = reader.read_u32().map_err(truncated)?;
    let unit_count = reader.read_u32().map_err(truncated)?;
    let slot_count = reader.read_u32().map_err(truncated)?;

    let signatures = (0..slot_count)
        .map(|_| reader.read_u64())
        .collect::<gimli::Result<Vec<_>>>()
        .map_err(truncated)?;
    let rows = (0..slot_count)
        .map(|_| reader.read_u32())
        .collect::<gimli::Result<Vec<_>>>()
        .map_err(truncated)?;
    let columns = (0..column_count)
        .map(|_| reader.read_u32())
        .collect::<gimli::Result<Vec<_>>>()
        .map_err(truncated)?;

    let table_len = u64::from(unit_count) * u64::from(column_count) * 4;
    if 2 * table_len > reader.len() as u64 {
        return Err(format!(
            "offset and size tables for {unit_count} units and {column_count} columns do not fit"
        ));
    }
    let mut offsets = Vec::with_capacity(unit_count as usize);
    for _ in 0..unit_count {
        let row = (0..column_count)
            .map(|_| reader.read_u32())
            .collect::<gimli::Result<Vec<_>>>()
            .map_err(truncated)?;
        offsets.push(row);
    }
    let mut contributions = Vec::with_capacity(unit_count as usize);
    for offsets in offsets {
        let row = offsets
            .into_iter()
            .map(|offset| reader.read_u32().map(|size| (offset, size)))
            .collect::<gimli::Result<Vec<_>>>()
            .map_err(truncated)?;
        contributions.push(row);
    }

    Ok(UnitIndex {
        version,
        unit_count,
        columns,
        slots: signatures.into_iter().zip(rows).collect(),
        contributions,
    })
}

impl Verifier<'_>
{
    pub(crate) fn verify_unit_index(&self, bytes: &[u8], kind: IndexKind)
    {
        if bytes.is_empty() {
            return;
        }
        let section = kind.section();
        let index = match parse_unit_index(self.data.reader(bytes)) {
            Ok(index) => index,
            Err(err) => {
                self.aggregator
                    .report("Unparsable unit index", || format!("{section}: {err}"));
                return;
            }
        };
        let unit_column = kind.unit_column(index.version);
        if !index.columns.contains(&unit_column) {
            self.aggregator.report("Unparsable unit index", || {
                format!("{section}: no column for the unit section (DW_SECT {unit_column})")
            });
            return;
        }
        trace!(section, units = index.unit_count, slots = index.slots.len(), "decoded unit index");

        // Per column: contribution start to (end, signature)
        let mut seen: Vec<BTreeMap<u64, (u64, u64)>> = vec![BTreeMap::new(); index.columns.len()];
        for (slot, &(signature, row)) in index.slots.iter().enumerate() {
            if row == 0 {
                continue;
            }
            let Some(contributions) = index.contributions.get(row as usize - 1) else {
                self.aggregator.report("Invalid unit index row", || {
                    format!(
                        "{section}: slot {slot} (signature 0x{signature:016x}) has row {row}, but there are only {} units",
                        index.unit_count
                    )
                });
                continue;
            };

            for (column, &(offset, size)) in contributions.iter().enumerate() {
                if size == 0 {
                    continue;
                }
                let start = u64::from(offset);
                let end = start + u64::from(size);
                let ranges = &mut seen[column];
                let before = ranges.range(..=start).next_back().filter(|(_, (prev_end, _))| *prev_end > start);
                let after = ranges.range(start..end).next();
                if let Some((_, &(_, other))) = before.or(after) {
                    let kind_id = index.columns[column];
                    self.aggregator.report(kind.overlap_category(), || {
                        format!(
                            "{section}: overlapping index entries for entries 0x{other:016x} and 0x{signature:016x} for column {kind_id}"
                        )
                    });
                    continue;
                }
                ranges.insert(start, (end, signature));
            }
        }
    }
}
