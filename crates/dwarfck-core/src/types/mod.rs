//! # Types
//!
//! The decoded debug information the verifier consumes.
//!
//! Everything here is a plain, read-only description of what a DWARF decoder
//! produced: units with their entry trees, attribute values classified by
//! form, resolved address ranges and locations, and line tables. The
//! [`loader`](crate::loader) builds it from a binary; tests build it by hand.
//! The raw section bytes travel alongside, because some checks (unit
//! headers, abbreviations, accelerator tables) validate the encoding itself.

pub mod line;
pub mod range;
pub mod sections;
pub mod unit;

pub use line::{LineFile, LineRow, LineTable};
pub use range::AddressRange;
pub use sections::{DebugData, ObjectKind, Sections};
pub use unit::{AttrValue, Attribute, Die, DieRef, Locations, ReferenceTarget, Unit, UnitSection};
