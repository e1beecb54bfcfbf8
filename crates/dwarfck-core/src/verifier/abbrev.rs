//! `.debug_abbrev` decoding and checks.

use std::collections::{BTreeMap, BTreeSet};

use gimli::{constants, DwAt, DwForm, DwTag, Reader};
use tracing::debug;

use super::Verifier;

/// One abbreviation declaration as encoded in `.debug_abbrev`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AbbrevDecl
{
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<(DwAt, DwForm)>,
}

/// A decoded abbreviation set and the offset just past its terminator
#[derive(Debug, Clone)]
pub(crate) struct AbbrevSet
{
    pub decls: Vec<AbbrevDecl>,
    pub end: u64,
}

/// Decode the abbreviation set starting at `offset`
///
/// Fails when the offset is outside the section, the set runs off the end
/// of the section, or two declarations share a code.
pub(crate) fn parse_abbrev_set<R: Reader<Offset = usize>>(section: &R, offset: u64) -> Result<AbbrevSet, String>
{
    let start = usize::try_from(offset).map_err(|_| format!("offset 0x{offset:x} is too large"))?;
    if start >= section.len() {
        return Err(format!("offset 0x{offset:x} is beyond .debug_abbrev bounds"));
    }
    let mut reader = section.clone();
    reader
        .skip(start)
        .map_err(|err| format!("offset 0x{offset:x}: {err}"))?;

    let mut decls = Vec::new();
    let mut codes = BTreeSet::new();
    loop {
        let code = reader
            .read_uleb128()
            .map_err(|_| format!("abbreviation set at 0x{offset:x} is not terminated"))?;
        if code == 0 {
            break;
        }
        let decl = parse_decl(&mut reader, code)
            .map_err(|err| format!("abbreviation {code} in set at 0x{offset:x}: {err}"))?;
        if !codes.insert(code) {
            return Err(format!("abbreviation set at 0x{offset:x} declares code {code} twice"));
        }
        decls.push(decl);
    }

    let end = (section.len() - reader.len()) as u64;
    Ok(AbbrevSet { decls, end })
}

fn parse_decl<R: Reader>(reader: &mut R, code: u64) -> gimli::Result<AbbrevDecl>
{
    let tag = DwTag(reader.read_uleb128_u16()?);
    let has_children = reader.read_u8()? == constants::DW_CHILDREN_yes.0;
    let mut attributes = Vec::new();
    loop {
        let name = reader.read_uleb128_u16()?;
        let form = reader.read_uleb128_u16()?;
        if name == 0 && form == 0 {
            break;
        }
        if DwForm(form) == constants::DW_FORM_implicit_const {
            reader.read_sleb128()?;
        }
        attributes.push((DwAt(name), DwForm(form)));
    }
    Ok(AbbrevDecl {
        code,
        tag,
        has_children,
        attributes,
    })
}

impl Verifier<'_>
{
    /// Decode every abbreviation set and flag repeated attributes
    ///
    /// Sets are walked back to back from offset 0, then any set a unit header
    /// names that the walk did not reach.
    pub(crate) fn verify_abbrev_section(&self)
    {
        let section = self.data.reader(&self.data.sections.debug_abbrev);
        if section.is_empty() {
            return;
        }

        let mut sets = BTreeMap::new();
        let mut offset = 0u64;
        while offset < section.len() as u64 {
            match parse_abbrev_set(&section, offset) {
                Ok(set) => {
                    let end = set.end;
                    sets.insert(offset, set);
                    offset = end;
                }
                Err(err) => {
                    self.aggregator
                        .report("Abbreviation Declaration error", || err);
                    break;
                }
            }
        }

        let named: BTreeSet<u64> = self.data.units.iter().map(|unit| unit.abbrev_offset).collect();
        for offset in named {
            if sets.contains_key(&offset) {
                continue;
            }
            // Bad unit offsets are reported by the unit header check
            if let Ok(set) = parse_abbrev_set(&section, offset) {
                sets.insert(offset, set);
            }
        }
        debug!(sets = sets.len(), "decoded .debug_abbrev");

        for (offset, set) in &sets {
            for decl in &set.decls {
                let mut seen = BTreeSet::new();
                for (name, _) in &decl.attributes {
                    if !seen.insert(*name) {
                        self.aggregator
                            .report("Abbreviation declaration contains multiple attributes", || {
                                format!(
                                    "abbreviation declaration {} in set at 0x{offset:08x} contains multiple {name} attributes",
                                    decl.code
                                )
                            });
                    }
                }
            }
        }
    }
}
