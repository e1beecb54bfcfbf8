//! End-to-end verification of hand-assembled DWARF

mod common;

use std::collections::BTreeMap;

use common::{load, well_formed_unit, UnitBuilder};
use dwarfck_core::types::DebugData;
use dwarfck_core::verifier::{Verifier, VerifierOptions};
use pretty_assertions::assert_eq;

/// Run every section family in driver order and count errors by category
fn verify(data: &DebugData, options: VerifierOptions) -> BTreeMap<String, u32>
{
    let verifier = Verifier::new(data, options);
    verifier.handle_debug_abbrev();
    verifier.handle_debug_info();
    verifier.handle_debug_cu_index();
    verifier.handle_debug_tu_index();
    verifier.handle_debug_line();
    verifier.handle_accel_tables();
    verifier.handle_debug_str_offsets();
    verifier
        .aggregator()
        .snapshot()
        .into_iter()
        .map(|(category, data)| (category, data.overall_count))
        .collect()
}

fn errors(data: &DebugData) -> BTreeMap<String, u32>
{
    verify(data, VerifierOptions::default())
}

fn expect(category: &str, count: u32) -> BTreeMap<String, u32>
{
    BTreeMap::from([(String::from(category), count)])
}

#[test]
fn test_well_formed_unit_has_no_errors()
{
    let data = load(well_formed_unit());
    assert_eq!(data.units.len(), 1);
    assert_eq!(data.units[0].entries.len(), 4);

    let verifier = Verifier::new(&data, VerifierOptions::default());
    assert!(verifier.handle_debug_abbrev());
    assert!(verifier.handle_debug_info());
    assert!(verifier.handle_debug_line());
    assert!(verifier.handle_accel_tables());
    assert_eq!(verifier.num_errors(), 0);

    let summary = verifier.summarize().unwrap();
    assert!(summary.is_clean());
    assert_eq!(summary.to_string(), "No errors.");
}

#[test]
fn test_reference_between_entries()
{
    let unit = UnitBuilder::new()
        .compile_unit("a.c", 0x1000, 0x100)
        .subprogram("main", 0x1010, 0x20);
    let int_offset = unit.offset();
    let info = unit
        .base_type("int", 4)
        .variable("counter", int_offset + 1)
        .end_children()
        .finish();

    assert_eq!(errors(&load(info)), expect("Invalid DIE reference", 1));
}

#[test]
fn test_reference_past_unit_end()
{
    let info = UnitBuilder::new()
        .compile_unit("a.c", 0x1000, 0x100)
        .variable("counter", 0x400)
        .end_children()
        .finish();

    assert_eq!(errors(&load(info)), expect("Invalid CU offset", 1));
}

#[test]
fn test_child_outside_parent_ranges()
{
    let info = UnitBuilder::new()
        .compile_unit("a.c", 0x1000, 0x100)
        .subprogram("main", 0x2000, 0x10)
        .end_children()
        .finish();

    assert_eq!(
        errors(&load(info)),
        expect("DIE address ranges are not contained by parent ranges", 1)
    );
}

#[test]
fn test_overlapping_siblings()
{
    let info = UnitBuilder::new()
        .compile_unit("a.c", 0x1000, 0x100)
        .subprogram("main", 0x1000, 0x20)
        .subprogram("helper", 0x1010, 0x20)
        .end_children()
        .finish();

    assert_eq!(errors(&load(info)), expect("DIEs have overlapping address ranges", 1));
}

#[test]
fn test_identical_sibling_ranges_are_not_reported()
{
    let info = UnitBuilder::new()
        .compile_unit("a.c", 0x1000, 0x100)
        .subprogram("main", 0x1000, 0x20)
        .subprogram("main_alias", 0x1000, 0x20)
        .end_children()
        .finish();

    assert_eq!(errors(&load(info)), BTreeMap::new());
}

#[test]
fn test_bad_header_is_rejected_and_walk_continues()
{
    let mut info = UnitBuilder::with_version(7)
        .compile_unit("bad.c", 0x1000, 0x100)
        .end_children()
        .finish();
    info.extend(well_formed_unit());

    let data = load(info);
    assert_eq!(errors(&data), expect("Unit Header Version", 1));
}

#[test]
fn test_truncated_unit_length()
{
    let mut info = well_formed_unit();
    info[0] = 0xf0;

    assert_eq!(errors(&load(info)), expect("Unit Header Length", 1));
}

#[test]
fn test_runs_are_idempotent_and_order_independent()
{
    let mut info = UnitBuilder::new()
        .compile_unit("a.c", 0x1000, 0x100)
        .subprogram("main", 0x2000, 0x10)
        .end_children()
        .finish();
    for _ in 0..8 {
        info.extend(
            UnitBuilder::new()
                .compile_unit("b.c", 0x3000, 0x100)
                .subprogram("f", 0x3000, 0x20)
                .subprogram("g", 0x3010, 0x20)
                .end_children()
                .finish(),
        );
    }
    let data = load(info);

    let parallel = errors(&data);
    let again = errors(&data);
    let sequential = verify(
        &data,
        VerifierOptions {
            parallel: false,
            ..VerifierOptions::default()
        },
    );

    assert_eq!(parallel, again);
    assert_eq!(parallel, sequential);
    assert_eq!(
        parallel,
        BTreeMap::from([
            (String::from("DIE address ranges are not contained by parent ranges"), 1),
            (String::from("DIEs have overlapping address ranges"), 8),
        ])
    );
}

#[test]
fn test_json_summary_is_written()
{
    let info = UnitBuilder::new()
        .compile_unit("a.c", 0x1000, 0x100)
        .subprogram("main", 0x2000, 0x10)
        .end_children()
        .finish();
    let data = load(info);

    let path = std::env::temp_dir().join(format!("dwarfck-summary-{}.json", std::process::id()));
    let verifier = Verifier::new(
        &data,
        VerifierOptions {
            json_summary: Some(path.clone()),
            ..VerifierOptions::default()
        },
    );
    verifier.handle_debug_info();
    let summary = verifier.summarize().unwrap();
    assert!(!summary.is_clean());

    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(written["error-count"], 1);
    assert_eq!(
        written["error-categories"]["DIE address ranges are not contained by parent ranges"]["count"],
        1
    );
}
