//! Hand-assembled DWARF 4 fixtures

#![allow(dead_code)]

use dwarfck_core::loader;
use dwarfck_core::types::{DebugData, ObjectKind, Sections};
use gimli::RunTimeEndian;

pub const DW_FORM_ADDR: u16 = 0x01;
pub const DW_FORM_DATA1: u16 = 0x0b;
pub const DW_FORM_DATA4: u16 = 0x06;
pub const DW_FORM_STRING: u16 = 0x08;
pub const DW_FORM_REF4: u16 = 0x13;

pub const DW_AT_NAME: u16 = 0x03;
pub const DW_AT_BYTE_SIZE: u16 = 0x0b;
pub const DW_AT_LOW_PC: u16 = 0x11;
pub const DW_AT_HIGH_PC: u16 = 0x12;
pub const DW_AT_ENCODING: u16 = 0x3e;
pub const DW_AT_TYPE: u16 = 0x49;

pub const DW_TAG_BASE_TYPE: u16 = 0x24;
pub const DW_TAG_COMPILE_UNIT: u16 = 0x11;
pub const DW_TAG_SUBPROGRAM: u16 = 0x2e;
pub const DW_TAG_VARIABLE: u16 = 0x34;

/// Abbreviation codes of [`abbrev_section`]
pub const ABBREV_CU: u8 = 1;
pub const ABBREV_SUBPROGRAM: u8 = 2;
pub const ABBREV_BASE_TYPE: u8 = 3;
pub const ABBREV_VARIABLE: u8 = 4;

pub fn uleb(mut value: u64, out: &mut Vec<u8>)
{
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn declare(out: &mut Vec<u8>, code: u8, tag: u16, children: bool, attrs: &[(u16, u16)])
{
    out.push(code);
    uleb(u64::from(tag), out);
    out.push(u8::from(children));
    for &(name, form) in attrs {
        uleb(u64::from(name), out);
        uleb(u64::from(form), out);
    }
    out.extend([0, 0]);
}

/// One abbreviation set at offset 0 with the codes the builders use
pub fn abbrev_section() -> Vec<u8>
{
    let mut out = Vec::new();
    let pc = [(DW_AT_NAME, DW_FORM_STRING), (DW_AT_LOW_PC, DW_FORM_ADDR), (DW_AT_HIGH_PC, DW_FORM_DATA4)];
    declare(&mut out, ABBREV_CU, DW_TAG_COMPILE_UNIT, true, &pc);
    declare(&mut out, ABBREV_SUBPROGRAM, DW_TAG_SUBPROGRAM, false, &pc);
    declare(
        &mut out,
        ABBREV_BASE_TYPE,
        DW_TAG_BASE_TYPE,
        false,
        &[(DW_AT_NAME, DW_FORM_STRING), (DW_AT_BYTE_SIZE, DW_FORM_DATA1), (DW_AT_ENCODING, DW_FORM_DATA1)],
    );
    declare(
        &mut out,
        ABBREV_VARIABLE,
        DW_TAG_VARIABLE,
        false,
        &[(DW_AT_NAME, DW_FORM_STRING), (DW_AT_TYPE, DW_FORM_REF4)],
    );
    out.push(0);
    out
}

/// Little-endian DWARF 4 compile unit with 8-byte addresses
pub struct UnitBuilder
{
    version: u16,
    body: Vec<u8>,
}

impl UnitBuilder
{
    /// Size of a 32-bit DWARF 4 unit header
    pub const HEADER_SIZE: u64 = 11;

    pub fn new() -> Self
    {
        Self::with_version(4)
    }

    pub fn with_version(version: u16) -> Self
    {
        Self {
            version,
            body: Vec::new(),
        }
    }

    /// Unit-relative offset of the next entry
    pub fn offset(&self) -> u32
    {
        (Self::HEADER_SIZE as usize + self.body.len()) as u32
    }

    fn string(&mut self, value: &str)
    {
        self.body.extend(value.as_bytes());
        self.body.push(0);
    }

    fn pc(&mut self, low: u64, length: u32)
    {
        self.body.extend(low.to_le_bytes());
        self.body.extend(length.to_le_bytes());
    }

    pub fn compile_unit(mut self, name: &str, low: u64, length: u32) -> Self
    {
        self.body.push(ABBREV_CU);
        self.string(name);
        self.pc(low, length);
        self
    }

    pub fn subprogram(mut self, name: &str, low: u64, length: u32) -> Self
    {
        self.body.push(ABBREV_SUBPROGRAM);
        self.string(name);
        self.pc(low, length);
        self
    }

    pub fn base_type(mut self, name: &str, size: u8) -> Self
    {
        self.body.push(ABBREV_BASE_TYPE);
        self.string(name);
        // DW_ATE_signed
        self.body.extend([size, 0x05]);
        self
    }

    pub fn variable(mut self, name: &str, type_offset: u32) -> Self
    {
        self.body.push(ABBREV_VARIABLE);
        self.string(name);
        self.body.extend(type_offset.to_le_bytes());
        self
    }

    /// Close the current children list
    pub fn end_children(mut self) -> Self
    {
        self.body.push(0);
        self
    }

    pub fn finish(self) -> Vec<u8>
    {
        let mut out = Vec::new();
        out.extend((self.body.len() as u32 + 7).to_le_bytes());
        out.extend(self.version.to_le_bytes());
        // Abbreviation offset, address size
        out.extend(0u32.to_le_bytes());
        out.push(8);
        out.extend(self.body);
        out
    }
}

/// Decode `debug_info` against [`abbrev_section`]
pub fn load(debug_info: Vec<u8>) -> DebugData
{
    let sections = Sections {
        debug_info,
        debug_abbrev: abbrev_section(),
        ..Sections::default()
    };
    loader::from_sections(RunTimeEndian::Little, ObjectKind::Executable, sections).unwrap()
}

/// A unit with a function, a base type and a variable of that type
pub fn well_formed_unit() -> Vec<u8>
{
    let unit = UnitBuilder::new()
        .compile_unit("a.c", 0x1000, 0x100)
        .subprogram("main", 0x1010, 0x20);
    let int_offset = unit.offset();
    unit.base_type("int", 4).variable("counter", int_offset).end_children().finish()
}
