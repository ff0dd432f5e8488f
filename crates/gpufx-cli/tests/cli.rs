//! End-to-end runs of the `gpufx` binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn gpufx(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gpufx"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("GPUFX_LOG_CATEGORIES")
        .output()
        .expect("failed to run gpufx")
}

fn write_checker(path: &Path, w: u32, h: u32) {
    let img = image::RgbaImage::from_fn(w, h, |x, y| {
        let v = if (x / 4 + y / 4) % 2 == 0 { 255 } else { 0 };
        image::Rgba([v, v, v, 255])
    });
    img.save(path).unwrap();
}

#[test]
fn blur_png_keeps_size() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_checker(&input, 32, 24);

    let out = gpufx(&[
        "-b", "cpu", "blur",
        input.to_str().unwrap(),
        "-o", output.to_str().unwrap(),
        "-s", "1.5",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let img = image::open(&output).unwrap();
    assert_eq!((img.width(), img.height()), (32, 24));
    // Checker edges get softened.
    let px = img.to_rgba8().get_pixel(4, 4).0;
    assert!(px[0] > 0 && px[0] < 255);
}

#[test]
fn blur_clip_shrinks_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_checker(&input, 32, 24);

    let out = gpufx(&[
        "-b", "cpu", "blur",
        input.to_str().unwrap(),
        "-o", output.to_str().unwrap(),
        "-s", "1.0", "--clip", "--contexts", "3",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let img = image::open(&output).unwrap();
    assert_eq!((img.width(), img.height()), (26, 18));
}

#[test]
fn blur_rejects_bad_std_dev() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    write_checker(&input, 8, 8);
    let output = dir.path().join("out.png");

    let out = gpufx(&[
        "-b", "cpu", "blur",
        input.to_str().unwrap(),
        "-o", output.to_str().unwrap(),
        "-s", "0",
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("standard deviation"));
    assert!(!output.exists());
}

#[test]
fn kernel_prints_taps() {
    let out = gpufx(&["kernel", "-s", "1.0", "--float"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("radius 3"));
    assert!(stdout.contains("taps 7"));
    // Header plus one line per tap.
    assert_eq!(stdout.lines().count(), 8);
}

#[test]
fn unknown_log_category_fails() {
    let out = gpufx(&["--log", "SHADER:BOGUS", "kernel"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--log"));
}

#[test]
fn backends_lists_cpu() {
    let out = gpufx(&["backends"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("[+] CPU"));
}

#[test]
fn blur_rejects_oversized_max_radius() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    write_checker(&input, 8, 8);
    let output = dir.path().join("out.png");

    let out = gpufx(&[
        "-b", "cpu", "blur",
        input.to_str().unwrap(),
        "-o", output.to_str().unwrap(),
        "-s", "4000", "--max-radius", "20000",
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("max_radius"));
    assert!(!output.exists());
}
