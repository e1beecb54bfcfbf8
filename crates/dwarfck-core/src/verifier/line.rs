//! Line-table checks: statement-list offsets across units and the rows of
//! each decoded program.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use gimli::constants;
use tracing::warn;

use super::Verifier;
use crate::types::{AttrValue, LineTable, Unit, UnitSection};

fn stmt_list_offset(unit: &Unit) -> Option<u64>
{
    match unit.root()?.attr_value(constants::DW_AT_stmt_list)? {
        AttrValue::SecOffset(offset) => Some(*offset),
        value => value.as_unsigned(),
    }
}

impl Verifier<'_>
{
    pub(crate) fn verify_debug_line(&self)
    {
        let tables = self.verify_stmt_offsets();
        let mut verified = BTreeSet::new();
        for (unit, table) in tables {
            if verified.insert(table.offset) {
                self.verify_line_rows(unit, table);
            }
        }
    }

    /// Each unit's `DW_AT_stmt_list` names its own decodable program
    ///
    /// Returns the units and tables the row pass should look at.
    fn verify_stmt_offsets(&self) -> Vec<(&Unit, &LineTable)>
    {
        let line_len = self.data.sections.debug_line.len() as u64;
        let mut first_user: BTreeMap<u64, u64> = BTreeMap::new();
        let mut tables = Vec::new();

        for unit in self.data.units_in(UnitSection::Info) {
            // Out-of-bounds offsets are reported by the attribute checks
            let Some(offset) = stmt_list_offset(unit).filter(|&offset| offset < line_len) else {
                continue;
            };
            let Some(table) = self.data.line_tables.get(&offset) else {
                self.aggregator.report("Unparsable .debug_line entry", || {
                    format!(
                        ".debug_line[0x{offset:08x}] referenced by unit at 0x{:08x} could not be decoded",
                        unit.offset
                    )
                });
                continue;
            };

            match first_user.entry(offset) {
                Entry::Occupied(first) => {
                    // Units may share an empty default program
                    if !table.rows.is_empty() {
                        let first = *first.get();
                        self.aggregator.report("Identical DW_AT_stmt_list section offset", || {
                            format!(
                                "units at 0x{first:08x} and 0x{:08x} have the same DW_AT_stmt_list section offset 0x{offset:08x}",
                                unit.offset
                            )
                        });
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(unit.offset);
                }
            }
            tables.push((unit, table));
        }
        tables
    }

    fn verify_line_rows(&self, unit: &Unit, table: &LineTable)
    {
        let offset = table.offset;
        let directories = table.include_directories.len() as u64;
        let mut paths: BTreeMap<String, usize> = BTreeMap::new();
        for (index, file) in table.file_names.iter().enumerate() {
            let valid_dir = if table.version >= 5 {
                file.directory_index < directories
            } else {
                file.directory_index <= directories
            };
            if !valid_dir {
                self.aggregator
                    .report("Invalid index in .debug_line->prologue.file_names->dir_idx", || {
                        format!(
                            ".debug_line[0x{offset:08x}].prologue.file_names[{index}].dir_idx contains an invalid index: {}",
                            file.directory_index
                        )
                    });
            }

            let path = table.full_path(file, unit.comp_dir.as_deref());
            if let Some(previous) = paths.insert(path.clone(), index) {
                warn!(
                    offset,
                    previous,
                    index,
                    path = path.as_str(),
                    "duplicate file in .debug_line prologue"
                );
            }
        }

        if let [only] = table.rows.as_slice() {
            if only.end_sequence {
                return;
            }
        }

        let mut previous_address = 0u64;
        for (index, row) in table.rows.iter().enumerate() {
            if row.address < previous_address {
                self.aggregator.report("decreasing address between debug_line rows", || {
                    format!(
                        ".debug_line[0x{offset:08x}] row[{index}] decreases in address from previous row: 0x{:016x} < 0x{previous_address:016x}",
                        row.address
                    )
                });
            }
            if !table.has_file_at_index(row.file) {
                self.aggregator.report("Invalid file index in debug_line", || {
                    format!(
                        ".debug_line[0x{offset:08x}][{index}] has invalid file index {} (valid values are {})",
                        row.file,
                        table
                            .file_index_bounds()
                            .map_or_else(|| String::from("none"), |(first, last)| format!("[{first},{last}]"))
                    )
                });
            }
            previous_address = if row.end_sequence { 0 } else { row.address };
        }
    }
}
