//! Tag classes used by several checks.

use gimli::{constants, DwTag, DwUt};

/// Tags that describe a type and may be the target of `DW_AT_type`
pub(crate) fn is_type_tag(tag: DwTag) -> bool
{
    matches!(
        tag,
        constants::DW_TAG_array_type
            | constants::DW_TAG_class_type
            | constants::DW_TAG_enumeration_type
            | constants::DW_TAG_pointer_type
            | constants::DW_TAG_reference_type
            | constants::DW_TAG_string_type
            | constants::DW_TAG_structure_type
            | constants::DW_TAG_subroutine_type
            | constants::DW_TAG_typedef
            | constants::DW_TAG_union_type
            | constants::DW_TAG_ptr_to_member_type
            | constants::DW_TAG_set_type
            | constants::DW_TAG_subrange_type
            | constants::DW_TAG_base_type
            | constants::DW_TAG_const_type
            | constants::DW_TAG_file_type
            | constants::DW_TAG_packed_type
            | constants::DW_TAG_thrown_type
            | constants::DW_TAG_volatile_type
            | constants::DW_TAG_restrict_type
            | constants::DW_TAG_interface_type
            | constants::DW_TAG_unspecified_type
            | constants::DW_TAG_shared_type
            | constants::DW_TAG_rvalue_reference_type
            | constants::DW_TAG_template_alias
            | constants::DW_TAG_coarray_type
            | constants::DW_TAG_generic_subrange
            | constants::DW_TAG_dynamic_type
            | constants::DW_TAG_atomic_type
            | constants::DW_TAG_immutable_type
    )
}

pub(crate) fn is_unit_tag(tag: DwTag) -> bool
{
    matches!(
        tag,
        constants::DW_TAG_compile_unit
            | constants::DW_TAG_type_unit
            | constants::DW_TAG_partial_unit
            | constants::DW_TAG_skeleton_unit
    )
}

/// Does the root tag agree with the unit type from the header?
///
/// Headers before DWARF 5 carry no unit type; `.debug_info` units are
/// treated as compile units there, which also covers partial units.
pub(crate) fn unit_type_matches_tag(unit_type: DwUt, version: u16, tag: DwTag) -> bool
{
    match unit_type {
        constants::DW_UT_compile if version < 5 => {
            matches!(tag, constants::DW_TAG_compile_unit | constants::DW_TAG_partial_unit)
        }
        constants::DW_UT_compile => tag == constants::DW_TAG_compile_unit,
        constants::DW_UT_type => tag == constants::DW_TAG_type_unit,
        constants::DW_UT_partial => tag == constants::DW_TAG_partial_unit,
        constants::DW_UT_skeleton => tag == constants::DW_TAG_skeleton_unit,
        constants::DW_UT_split_compile | constants::DW_UT_split_type => is_unit_tag(tag),
        _ => false,
    }
}

/// Unit types a DWARF 5 header may declare
pub(crate) fn is_known_unit_type(unit_type: u8) -> bool
{
    (constants::DW_UT_compile.0..=constants::DW_UT_split_type.0).contains(&unit_type)
}

/// Tags a name index must not list even when they carry a name
pub(crate) fn is_never_indexed(tag: DwTag) -> bool
{
    matches!(
        tag,
        constants::DW_TAG_compile_unit
            | constants::DW_TAG_module
            | constants::DW_TAG_formal_parameter
            | constants::DW_TAG_template_value_parameter
            | constants::DW_TAG_template_type_parameter
            | constants::DW_TAG_GNU_template_parameter_pack
            | constants::DW_TAG_GNU_template_template_param
            | constants::DW_TAG_member
            | constants::DW_TAG_enumerator
            | constants::DW_TAG_imported_declaration
    )
}

/// `DW_TAG_*` name for diagnostics, or the raw value
pub(crate) fn tag_name(tag: DwTag) -> String
{
    tag.static_string()
        .map_or_else(|| format!("DW_TAG_unknown_{:x}", tag.0), str::to_string)
}
