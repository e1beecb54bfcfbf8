//! Location expression byte-code checks.

use std::collections::BTreeSet;

use gimli::{constants, DieReference, Operation, UnitOffset};

use super::Verifier;
use crate::types::Unit;

/// First DWARF version that defines `opcode`, for opcodes added after v2
fn introduced_in(opcode: u8) -> u16
{
    match opcode {
        0x97..=0x9d => 3,
        0x9e..=0x9f => 4,
        0xa0..=0xa9 => 5,
        _ => 2,
    }
}

/// Opcodes whose operand names a base type entry
fn has_base_type_operand(opcode: u8) -> bool
{
    [
        constants::DW_OP_const_type,
        constants::DW_OP_regval_type,
        constants::DW_OP_deref_type,
        constants::DW_OP_xderef_type,
        constants::DW_OP_convert,
        constants::DW_OP_reinterpret,
        constants::DW_OP_GNU_const_type,
        constants::DW_OP_GNU_regval_type,
        constants::DW_OP_GNU_deref_type,
        constants::DW_OP_GNU_convert,
        constants::DW_OP_GNU_reinterpret,
    ]
    .iter()
    .any(|op| op.0 == opcode)
}

/// A zero operand means the generic type for these
fn allows_generic_type(opcode: u8) -> bool
{
    [
        constants::DW_OP_convert,
        constants::DW_OP_reinterpret,
        constants::DW_OP_GNU_convert,
        constants::DW_OP_GNU_reinterpret,
    ]
    .iter()
    .any(|op| op.0 == opcode)
}

impl Verifier<'_>
{
    /// Decode `expr` in the context of `unit` and check every operation
    ///
    /// Returns a description of the first defect found.
    pub(crate) fn verify_expression(&self, unit: &Unit, expr: &[u8]) -> Result<(), String>
    {
        let encoding = unit.encoding();
        let mut reader = self.data.reader(expr);
        let mut starts = BTreeSet::new();
        let mut branches = Vec::new();

        while !reader.is_empty() {
            let start = expr.len() - reader.len();
            let opcode = expr[start];
            starts.insert(start as i64);

            let since = introduced_in(opcode);
            if since > unit.version {
                return Err(format!(
                    "opcode 0x{opcode:02x} at offset {start} requires DWARF {since} (unit is version {})",
                    unit.version
                ));
            }

            let op = Operation::parse(&mut reader, encoding)
                .map_err(|err| format!("cannot decode operation at offset {start}: {err}"))?;
            let end = expr.len() - reader.len();

            match op {
                Operation::Deref { base_type, .. }
                | Operation::RegisterOffset { base_type, .. }
                | Operation::TypedLiteral { base_type, .. }
                | Operation::Convert { base_type }
                | Operation::Reinterpret { base_type }
                    if has_base_type_operand(opcode) =>
                {
                    if !(base_type.0 == 0 && allows_generic_type(opcode)) {
                        self.check_base_type(unit, base_type, opcode, start)?;
                    }
                }
                Operation::Call {
                    offset: DieReference::UnitRef(target),
                }
                | Operation::ParameterRef { offset: target } => {
                    let absolute = unit.offset.saturating_add(target.0 as u64);
                    if unit.entry_at(absolute).is_none() {
                        return Err(format!(
                            "opcode 0x{opcode:02x} at offset {start} references 0x{absolute:08x}, which is not an entry of the unit"
                        ));
                    }
                }
                Operation::Call {
                    offset: DieReference::DebugInfoRef(target),
                } => self.check_info_offset(target.0 as u64, opcode, start)?,
                Operation::ImplicitPointer { value, .. } => self.check_info_offset(value.0 as u64, opcode, start)?,
                Operation::Bra { target } | Operation::Skip { target } => {
                    branches.push((start, end as i64 + i64::from(target)));
                }
                _ => {}
            }
        }

        starts.insert(expr.len() as i64);
        for (start, target) in branches {
            if !starts.contains(&target) {
                return Err(format!(
                    "branch at offset {start} targets {target}, which is not the start of an operation"
                ));
            }
        }
        Ok(())
    }

    fn check_base_type(&self, unit: &Unit, base_type: UnitOffset<usize>, opcode: u8, start: usize) -> Result<(), String>
    {
        let absolute = unit.offset.saturating_add(base_type.0 as u64);
        match unit.entry_at(absolute) {
            Some(die) if die.tag == constants::DW_TAG_base_type => Ok(()),
            _ => Err(format!(
                "opcode 0x{opcode:02x} at offset {start} has operand 0x{absolute:08x}, which is not a DW_TAG_base_type entry"
            )),
        }
    }

    fn check_info_offset(&self, target: u64, opcode: u8, start: usize) -> Result<(), String>
    {
        let len = self.data.sections.debug_info.len() as u64;
        if target >= len {
            return Err(format!(
                "opcode 0x{opcode:02x} at offset {start} references 0x{target:08x}, beyond .debug_info bounds"
            ));
        }
        Ok(())
    }
}
