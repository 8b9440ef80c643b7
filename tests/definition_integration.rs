//! Integration tests for loading definitions and running them end to end
//!
//! Covers the documented scenarios: unique patching, ambiguity, size
//! mismatch, sequential dependency, and in-memory-only runs.

use sigpatch::definition::{load_from_path, load_from_str};
use sigpatch::runner::{run_definition, FailurePolicy, RunError, RunOptions, Silent};
use std::fs;
use tempfile::TempDir;

/// Helper to create a temp dir holding `rom.bin` (20 bytes, DEADBEEF at 10)
fn setup_test_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    let mut rom = vec![0u8; 20];
    rom[10..14].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    fs::write(dir.path().join("rom.bin"), &rom).unwrap();

    dir
}

fn options_for(dir: &TempDir) -> RunOptions {
    RunOptions {
        base_dir: Some(dir.path().to_path_buf()),
        dry_run: false,
    }
}

#[test]
fn test_unique_signature_is_patched_into_output() {
    let workspace = setup_test_workspace();
    let definition = load_from_str(
        r#"[{
            "input-file": "rom.bin",
            "output-file": "rom.out.bin",
            "sequence": [{
                "desc": "swap magic",
                "settings": "",
                "transition": { "signature": "DEADBEEF", "patch": "CAFEBABE" }
            }]
        }]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );

    assert_eq!(results.len(), 1);
    let report = results[0].1.as_ref().unwrap();
    assert_eq!(report.transitions[0].offset, 10);
    assert!(report.persisted);

    let output = fs::read(workspace.path().join("rom.out.bin")).unwrap();
    let mut expected = vec![0u8; 20];
    expected[10..14].copy_from_slice(&[0xca, 0xfe, 0xba, 0xbe]);
    assert_eq!(output, expected);
}

#[test]
fn test_no_output_file_leaves_input_untouched() {
    let workspace = setup_test_workspace();
    let before = fs::read(workspace.path().join("rom.bin")).unwrap();

    let definition = load_from_str(
        r#"[{
            "input-file": "rom.bin",
            "sequence": [{ "transition": { "signature": "DEADBEEF", "patch": "CAFEBABE" } }]
        }]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );

    let report = results[0].1.as_ref().unwrap();
    assert!(!report.persisted);
    assert_eq!(report.output, None);
    assert_eq!(fs::read(workspace.path().join("rom.bin")).unwrap(), before);
    assert_eq!(fs::read_dir(workspace.path()).unwrap().count(), 1);
}

#[test]
fn test_ambiguous_signature_aborts_without_output() {
    let workspace = setup_test_workspace();
    let mut rom = vec![0u8; 12];
    rom[3] = 0xaa;
    rom[7] = 0xaa;
    fs::write(workspace.path().join("twice.bin"), &rom).unwrap();

    let definition = load_from_str(
        r#"[{
            "input-file": "twice.bin",
            "output-file": "twice.out.bin",
            "sequence": [{ "transition": { "signature": "AA", "patch": "BB" } }]
        }]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );

    assert!(matches!(
        results[0].1,
        Err(RunError::AmbiguousSignature { count: 2, .. })
    ));
    assert!(!workspace.path().join("twice.out.bin").exists());
}

#[test]
fn test_size_mismatch_aborts_before_scan() {
    let workspace = setup_test_workspace();
    let definition = load_from_str(
        r#"[{
            "input-file": "rom.bin",
            "output-file": "rom.out.bin",
            "sequence": [{ "transition": { "signature": "DEADBEEF", "patch": "CAFE" } }]
        }]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );

    let Err(err) = &results[0].1 else {
        panic!("expected size mismatch");
    };
    assert!(matches!(
        err,
        RunError::SizeMismatch {
            index: 0,
            signature_len: 4,
            patch_len: 2,
            ..
        }
    ));
    assert!(err.to_string().contains("rom.bin"));
    assert!(!workspace.path().join("rom.out.bin").exists());
}

#[test]
fn test_transitions_apply_to_previous_result() {
    let workspace = setup_test_workspace();
    // "CAFEBABE00" only exists after the first transition
    let definition = load_from_str(
        r#"[{
            "input-file": "rom.bin",
            "output-file": "rom.out.bin",
            "sequence": [
                { "transition": { "signature": "DEADBEEF", "patch": "CAFEBABE" } },
                { "transition": { "signature": "CAFEBABE00", "patch": "0102030405" } }
            ]
        }]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );

    let report = results[0].1.as_ref().unwrap();
    assert_eq!(report.transitions.len(), 2);
    assert_eq!(report.transitions[1].offset, 10);

    let output = fs::read(workspace.path().join("rom.out.bin")).unwrap();
    assert_eq!(&output[10..15], &[0x01, 0x02, 0x03, 0x04, 0x05]);
    assert_eq!(output.len(), 20);
}

#[test]
fn test_abort_policy_stops_after_first_failure() {
    let workspace = setup_test_workspace();
    let definition = load_from_str(
        r#"[
            { "input-file": "missing.bin", "output-file": "a.out", "sequence": [] },
            { "input-file": "rom.bin", "output-file": "b.out",
              "sequence": [{ "transition": { "signature": "DEADBEEF", "patch": "CAFEBABE" } }] }
        ]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].1, Err(RunError::InputRead { .. })));
    assert!(!workspace.path().join("b.out").exists());
}

#[test]
fn test_continue_policy_runs_remaining_sequences() {
    let workspace = setup_test_workspace();
    let definition = load_from_str(
        r#"[
            { "input-file": "missing.bin", "output-file": "a.out", "sequence": [] },
            { "input-file": "rom.bin", "output-file": "b.out",
              "sequence": [{ "transition": { "signature": "DEADBEEF", "patch": "CAFEBABE" } }] }
        ]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Continue,
        &mut Silent,
    );

    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_err());
    assert!(results[1].1.is_ok());
    assert!(workspace.path().join("b.out").exists());
}

#[test]
fn test_earlier_outputs_survive_later_failure() {
    let workspace = setup_test_workspace();
    let definition = load_from_str(
        r#"[
            { "input-file": "rom.bin", "output-file": "first.out",
              "sequence": [{ "transition": { "signature": "DEADBEEF", "patch": "CAFEBABE" } }] },
            { "input-file": "rom.bin", "output-file": "second.out",
              "sequence": [{ "transition": { "signature": "0BADF00D", "patch": "00000000" } }] }
        ]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );

    assert!(results[0].1.is_ok());
    assert!(matches!(
        results[1].1,
        Err(RunError::SignatureNotFound { index: 0, .. })
    ));
    assert!(workspace.path().join("first.out").exists());
    assert!(!workspace.path().join("second.out").exists());
}

#[test]
fn test_output_may_overwrite_input() {
    let workspace = setup_test_workspace();
    let definition = load_from_str(
        r#"[{
            "input-file": "rom.bin",
            "output-file": "rom.bin",
            "sequence": [{ "transition": { "signature": "DEADBEEF", "patch": "CAFEBABE" } }]
        }]"#,
    )
    .unwrap();

    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );
    assert!(results[0].1.is_ok());

    let rom = fs::read(workspace.path().join("rom.bin")).unwrap();
    assert_eq!(&rom[10..14], &[0xca, 0xfe, 0xba, 0xbe]);
}

#[test]
fn test_load_from_path_and_run() {
    let workspace = setup_test_workspace();
    let def_path = workspace.path().join("patch-seq.def");
    fs::write(
        &def_path,
        r#"[{
            "input-file": "rom.bin",
            "output-file": "rom.out.bin",
            "sequence": [{ "desc": "lowercase hex", "settings": "",
                           "transition": { "signature": "deadbeef", "patch": "cafebabe" } }]
        }]"#,
    )
    .unwrap();

    let definition = load_from_path(&def_path).unwrap();
    let results = run_definition(
        &definition,
        &options_for(&workspace),
        FailurePolicy::Abort,
        &mut Silent,
    );

    assert!(results[0].1.is_ok());
    assert!(workspace.path().join("rom.out.bin").exists());
}
