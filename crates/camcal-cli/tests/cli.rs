//! Integration tests for the `camcal` binary: flag surface and the failure
//! paths that do not need a camera or a detectable board.

use assert_cmd::Command;
use image::GrayImage;
use predicates::prelude::*;
use tempfile::tempdir;

fn bin() -> Command {
    Command::cargo_bin("camcal").expect("binary")
}

fn write_blank_frames(dir: &std::path::Path, count: usize) {
    let img = GrayImage::from_pixel(64, 48, image::Luma([127u8]));
    for i in 0..count {
        img.save(dir.join(format!("frame_{i:03}.png"))).expect("write frame");
    }
}

#[test]
fn help_lists_the_run_options() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Interactive ChArUco camera calibration"))
        .stdout(predicate::str::contains("--input-dir"))
        .stdout(predicate::str::contains("--zero-tangential"))
        .stdout(predicate::str::contains("--aspect-ratio"))
        .stdout(predicate::str::contains("--auto-accept"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    bin().arg("--no-such-flag").assert().code(2);
}

#[test]
fn empty_input_dir_fails_with_the_path() {
    let dir = tempdir().expect("tempdir");
    bin()
        .arg("--input-dir")
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no image files found"))
        .stderr(predicate::str::contains(dir.path().to_str().expect("utf8")));
}

#[test]
fn unknown_dictionary_fails_before_capturing() {
    let dir = tempdir().expect("tempdir");
    write_blank_frames(dir.path(), 1);
    bin()
        .arg("--input-dir")
        .arg(dir.path())
        .arg("--dictionary")
        .arg("DICT_BOGUS")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dictionary"))
        .stderr(predicate::str::contains("DICT_BOGUS"));
}

#[test]
fn boardless_frames_yield_no_report() {
    let dir = tempdir().expect("tempdir");
    write_blank_frames(dir.path(), 6);
    let out = dir.path().join("cam.yml");

    bin()
        .arg(&out)
        .arg("--input-dir")
        .arg(dir.path())
        .arg("--auto-accept")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("samples"));

    assert!(!out.exists(), "no report may be written without a solve");
}

#[test]
fn missing_detector_params_file_is_reported() {
    let dir = tempdir().expect("tempdir");
    write_blank_frames(dir.path(), 1);
    bin()
        .arg("--input-dir")
        .arg(dir.path())
        .arg("--detector-params")
        .arg("/does/not/exist.json")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/does/not/exist.json"));
}
