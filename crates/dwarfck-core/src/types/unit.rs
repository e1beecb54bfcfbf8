//! Decoded units, entries and attribute values.
//!
//! These are the already-decoded, read-only inputs the verifier walks. The
//! loader fills them from a binary with `gimli`; tests build them by hand.
//! Nothing in the verifier mutates them.

use std::fmt;

use gimli::{constants, DwAt, DwForm, DwTag, DwUt, Encoding, Format};

use super::AddressRange;

/// Section a unit was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitSection
{
    /// `.debug_info`
    Info,
    /// `.debug_types` (DWARF 4 type units)
    Types,
}

impl UnitSection
{
    /// Section name as it appears in diagnostics
    pub fn name(self) -> &'static str
    {
        match self {
            UnitSection::Info => ".debug_info",
            UnitSection::Types => ".debug_types",
        }
    }
}

/// Opaque handle to an entry: the section it lives in and its offset there
///
/// Handles are compared and ordered but never dereferenced by the range
/// engine; only the unit walk looks entries up by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DieRef
{
    pub section: UnitSection,
    pub offset: u64,
}

impl fmt::Display for DieRef
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:08x}", self.offset)
    }
}

/// Attribute value, classified by the *form* it was encoded with
///
/// The classification mirrors gimli's raw attribute values: the verifier
/// checks forms and attribute semantics separately, so the value must not be
/// reinterpreted according to the attribute name first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue
{
    /// `DW_FORM_addr`
    Address(u64),
    /// `DW_FORM_block*`
    Block(Vec<u8>),
    /// `DW_FORM_exprloc`
    Exprloc(Vec<u8>),
    /// `DW_FORM_data1/2/4/8`, `DW_FORM_udata`
    Constant(u64),
    /// `DW_FORM_sdata`, `DW_FORM_implicit_const`
    SignedConstant(i64),
    /// `DW_FORM_flag`, `DW_FORM_flag_present`
    Flag(bool),
    /// `DW_FORM_ref1/2/4/8`, `DW_FORM_ref_udata`: offset relative to the unit
    UnitRef(u64),
    /// `DW_FORM_ref_addr`: offset into `.debug_info`
    InfoRef(u64),
    /// `DW_FORM_ref_sup4/8`, `DW_FORM_GNU_ref_alt`
    SupRef(u64),
    /// `DW_FORM_ref_sig8`
    Signature(u64),
    /// `DW_FORM_sec_offset`
    SecOffset(u64),
    /// `DW_FORM_strp`: offset into `.debug_str`
    StrOffset(u64),
    /// `DW_FORM_strp_sup`, `DW_FORM_GNU_strp_alt`
    SupStrOffset(u64),
    /// `DW_FORM_line_strp`: offset into `.debug_line_str`
    LineStrOffset(u64),
    /// `DW_FORM_strx*`: index into the unit's string offsets table
    StrIndex(u64),
    /// `DW_FORM_addrx*`
    AddrIndex(u64),
    /// `DW_FORM_rnglistx`
    RangeListIndex(u64),
    /// `DW_FORM_loclistx`
    LocListIndex(u64),
    /// `DW_FORM_string`
    String(String),
    /// A value the decoder produced but the model has no class for
    Unknown,
}

impl AttrValue
{
    /// Value as an unsigned constant, if it is one
    ///
    /// Signed constants qualify when they are not negative.
    pub fn as_unsigned(&self) -> Option<u64>
    {
        match *self {
            AttrValue::Constant(value) => Some(value),
            AttrValue::SignedConstant(value) => u64::try_from(value).ok(),
            _ => None,
        }
    }
}

/// One attribute of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute
{
    pub name: DwAt,
    pub form: DwForm,
    pub value: AttrValue,
}

impl Attribute
{
    pub fn new(name: DwAt, form: DwForm, value: AttrValue) -> Self
    {
        Self { name, form, value }
    }
}

/// Location description of an entry as resolved by the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locations
{
    /// A single `DW_FORM_exprloc` expression
    Expression(Vec<u8>),
    /// The expressions of every entry of a location list
    List(Vec<Vec<u8>>),
    /// The decoder could not resolve the location list
    Unresolved(String),
}

impl Locations
{
    /// Raw byte-code of every expression in this description
    pub fn expressions(&self) -> &[Vec<u8>]
    {
        match self {
            Locations::Expression(expr) => std::slice::from_ref(expr),
            Locations::List(exprs) => exprs,
            Locations::Unresolved(_) => &[],
        }
    }
}

/// One decoded debugging information entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Die
{
    /// Offset of the entry in its section
    pub offset: u64,
    pub tag: DwTag,
    /// Index of the parent entry in [`Unit::entries`]
    pub parent: Option<usize>,
    /// Indices of child entries in [`Unit::entries`], in section order
    pub children: Vec<usize>,
    /// The abbreviation's children flag, independent of decoded children
    pub has_children: bool,
    pub attrs: Vec<Attribute>,
    /// Address ranges from `DW_AT_low_pc`/`DW_AT_high_pc` or `DW_AT_ranges`
    pub ranges: Result<Vec<AddressRange>, String>,
    /// Resolved `DW_AT_location`, if the entry has one
    pub locations: Option<Locations>,
}

impl Die
{
    /// An entry with no attributes, ranges or children
    pub fn new(offset: u64, tag: DwTag) -> Self
    {
        Self {
            offset,
            tag,
            parent: None,
            children: Vec::new(),
            has_children: false,
            attrs: Vec::new(),
            ranges: Ok(Vec::new()),
            locations: None,
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: DwAt, form: DwForm, value: AttrValue) -> Self
    {
        self.attrs.push(Attribute::new(name, form, value));
        self
    }

    #[must_use]
    pub fn with_ranges(mut self, ranges: Vec<AddressRange>) -> Self
    {
        self.ranges = Ok(ranges);
        self
    }

    #[must_use]
    pub fn with_locations(mut self, locations: Locations) -> Self
    {
        self.locations = Some(locations);
        self
    }

    /// First attribute with the given name
    pub fn attr(&self, name: DwAt) -> Option<&Attribute>
    {
        self.attrs.iter().find(|attr| attr.name == name)
    }

    pub fn attr_value(&self, name: DwAt) -> Option<&AttrValue>
    {
        self.attr(name).map(|attr| &attr.value)
    }

    pub fn has_attr(&self, name: DwAt) -> bool
    {
        self.attr(name).is_some()
    }

    pub fn is_subprogram(&self) -> bool
    {
        self.tag == constants::DW_TAG_subprogram
    }
}

/// One decoded compile, type, partial or skeleton unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit
{
    pub section: UnitSection,
    /// Offset of the unit header in its section
    pub offset: u64,
    /// The header's length field (bytes after the initial length field)
    pub unit_length: u64,
    pub format: Format,
    pub version: u16,
    pub unit_type: DwUt,
    pub address_size: u8,
    pub abbrev_offset: u64,
    /// `DW_AT_str_offsets_base` (or the implied base for split units)
    pub str_offsets_base: Option<u64>,
    pub comp_dir: Option<String>,
    pub dwo_id: Option<u64>,
    /// Entries in depth-first pre-order, so offsets strictly increase
    pub entries: Vec<Die>,
}

impl Unit
{
    /// A 32-bit DWARF unit with no entries
    pub fn new(section: UnitSection, offset: u64, unit_length: u64, version: u16, unit_type: DwUt, address_size: u8) -> Self
    {
        Self {
            section,
            offset,
            unit_length,
            format: Format::Dwarf32,
            version,
            unit_type,
            address_size,
            abbrev_offset: 0,
            str_offsets_base: None,
            comp_dir: None,
            dwo_id: None,
            entries: Vec::new(),
        }
    }

    /// Append an entry as the last child of `parent` (or as the root)
    ///
    /// Entries must be pushed in section order. Returns the new entry's index.
    pub fn push_entry(&mut self, parent: Option<usize>, mut die: Die) -> usize
    {
        let index = self.entries.len();
        die.parent = parent;
        if let Some(parent) = parent.and_then(|idx| self.entries.get_mut(idx)) {
            parent.children.push(index);
            parent.has_children = true;
        }
        self.entries.push(die);
        index
    }

    /// Total unit size, header included
    pub fn size(&self) -> u64
    {
        u64::from(self.format.initial_length_size()) + self.unit_length
    }

    /// Offset of the next unit in the section
    pub fn next_offset(&self) -> u64
    {
        self.offset.saturating_add(self.size())
    }

    /// Does `offset` fall inside this unit?
    pub fn contains_offset(&self, offset: u64) -> bool
    {
        offset >= self.offset && offset < self.next_offset()
    }

    pub fn encoding(&self) -> Encoding
    {
        Encoding {
            format: self.format,
            version: self.version,
            address_size: self.address_size,
        }
    }

    /// The unit entry, if the unit has any entries
    pub fn root(&self) -> Option<&Die>
    {
        self.entries.first()
    }

    /// Index of the entry starting exactly at `offset`
    pub fn entry_index_at(&self, offset: u64) -> Option<usize>
    {
        self.entries.binary_search_by_key(&offset, |die| die.offset).ok()
    }

    /// The entry starting exactly at `offset`
    pub fn entry_at(&self, offset: u64) -> Option<&Die>
    {
        self.entry_index_at(offset).map(|idx| &self.entries[idx])
    }

    pub fn parent_of(&self, die: &Die) -> Option<&Die>
    {
        die.parent.and_then(|idx| self.entries.get(idx))
    }

    pub fn die_ref(&self, die: &Die) -> DieRef
    {
        DieRef {
            section: self.section,
            offset: die.offset,
        }
    }

    /// Resolve a reference-class attribute value of an entry in this unit
    ///
    /// Unit-relative references resolve inside the unit. Section-absolute
    /// references are returned as-is for the caller to resolve across units.
    pub fn reference_target(&self, value: &AttrValue) -> Option<ReferenceTarget>
    {
        match *value {
            AttrValue::UnitRef(rel) => Some(ReferenceTarget::Local(self.offset.saturating_add(rel))),
            AttrValue::InfoRef(offset) => Some(ReferenceTarget::Info(offset)),
            _ => None,
        }
    }
}

/// Where a reference attribute points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTarget
{
    /// Absolute offset inside the referencing unit's section
    Local(u64),
    /// Absolute offset in `.debug_info`
    Info(u64),
}
