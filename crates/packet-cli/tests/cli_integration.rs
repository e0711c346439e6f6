//! Integration tests for the amdpkt CLI.

use packet_core as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing as _;
use tracing_subscriber as _;

fn binary_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.join("amdpkt")
}

fn write_words(dir: &Path, name: &str, words: &[u32]) -> PathBuf {
    let path = dir.join(name);
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    fs::write(&path, bytes).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .output()
        .expect("failed to run amdpkt")
}

const TRAP: u32 = 6;

#[test]
fn decode_lists_dma_packets() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = write_words(temp_dir.path(), "ib.bin", &[TRAP, 1, TRAP, 2]);

    let output = run(&[
        "decode",
        input.to_str().unwrap(),
        "--kind",
        "sdma",
        "--addr",
        "0x1000",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    assert!(lines[0].starts_with("0:000000001000 [00000006 00000001] TRAP"));
    assert!(lines[1].starts_with("0:000000001008 [00000006 00000002] TRAP"));
}

#[test]
fn decode_limit_reports_remaining_packets() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = write_words(temp_dir.path(), "ib.bin", &[TRAP, 1, TRAP, 2, TRAP, 3]);

    let output = run(&["decode", input.to_str().unwrap(), "-k", "sdma", "-n", "1"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 2);
    assert!(stdout.ends_with("# 2 more packets\n"), "{stdout}");
}

#[test]
fn decode_follows_mapped_indirect_buffers() {
    let temp_dir = tempfile::tempdir().unwrap();
    let ib = [0xC002_3F00, 0x2000, 0, 1];
    let input = write_words(temp_dir.path(), "gfx.bin", &ib);
    let image = write_words(temp_dir.path(), "vram.bin", &[2 << 30]);
    let mapping = format!("0x2000:{}", image.display());

    let followed = run(&["decode", input.to_str().unwrap(), "--kind", "pm4", "--mem", &mapping]);
    assert!(followed.status.success());
    let stdout = String::from_utf8(followed.stdout).unwrap();
    assert!(stdout.contains("\n  0:000000002000 [80000000] TYPE2\n"), "{stdout}");

    let flat = run(&[
        "decode",
        input.to_str().unwrap(),
        "--kind",
        "pm4",
        "--mem",
        &mapping,
        "--no-follow",
    ]);
    assert_eq!(String::from_utf8(flat.stdout).unwrap().lines().count(), 1);
}

#[test]
fn unreadable_reference_is_a_warning() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = write_words(temp_dir.path(), "gfx.bin", &[0xC002_3F00, 0x2000, 0, 1]);

    let output = run(&["decode", input.to_str().unwrap(), "--kind", "pm4"]);

    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("warning: "), "{stderr}");
}

#[test]
fn ring_kind_is_guessed_from_file_name() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = write_words(temp_dir.path(), "sdma0.bin", &[2, 4, 0, 0xFF, 0, TRAP, 7]);

    let output = run(&["ring", input.to_str().unwrap(), "--addr", "0x100"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("0:000000000108 [00000006 00000007] TRAP"), "{stdout}");
}

#[test]
fn ring_with_unknown_name_needs_kind() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = write_words(temp_dir.path(), "capture.bin", &[0, 2, 0, TRAP, 7]);

    let guessed = run(&["ring", input.to_str().unwrap()]);
    assert_eq!(guessed.status.code(), Some(1));

    let explicit = run(&["ring", input.to_str().unwrap(), "--kind", "sdma"]);
    assert!(explicit.status.success());
}

#[test]
fn video_prints_message_records() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut words = vec![40, 56, 1, 0, 0, 0, 1, 40, 16, 1];
    words.extend([2, 0x10, 1920, 1080]);
    let input = write_words(temp_dir.path(), "msg.bin", &words);

    let output = run(&["video", input.to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("create.width_in_samples = 1920"), "{stdout}");
    assert!(stdout.contains("index[0].message_id = 0x1"), "{stdout}");
}

#[test]
fn unknown_kind_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input = write_words(temp_dir.path(), "ib.bin", &[TRAP, 1]);

    let output = run(&["decode", input.to_str().unwrap(), "--kind", "gcn"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("unknown stream kind: gcn"));
}

#[test]
fn help_flag_prints_usage() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().starts_with("Usage: amdpkt"));
}
