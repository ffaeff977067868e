//! End-to-end tests for `seerkit extract-preview`, run against synthetic
//! bundles built with the seerkit-unity testkit.

use std::path::{Path, PathBuf};
use std::process::Command;

use seerkit_unity::testkit::BundleBuilder;

fn seerkit() -> Command {
    Command::new(env!("CARGO_BIN_EXE_seerkit"))
}

/// Lay out `<root>/DefaultPackage/game_ui_activitylistpreview`
fn install_bundle(root: &Path, builder: &BundleBuilder) {
    let package_dir = root.join("DefaultPackage");
    std::fs::create_dir_all(&package_dir).unwrap();
    builder
        .write_to(package_dir.join("game_ui_activitylistpreview"))
        .unwrap();
}

fn preview_path(root: &Path) -> PathBuf {
    root.join("img").join("preview.png")
}

fn run_extract(root: &Path) -> std::process::ExitStatus {
    seerkit()
        .args(["extract-preview", "--root"])
        .arg(root)
        .status()
        .unwrap()
}

/// Solid-color RGBA pixel buffer
fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.iter()
        .copied()
        .cycle()
        .take((width * height * 4) as usize)
        .collect()
}

#[test]
fn exports_matching_sprite_as_preview_png() {
    let dir = tempfile::tempdir().unwrap();
    install_bundle(
        dir.path(),
        &BundleBuilder::new()
            .texture(1, "0001_tex", 2, 2, solid(2, 2, [200, 10, 30, 255]))
            .sprite(2, "0001", 1, 2, 2),
    );

    let status = run_extract(dir.path());
    assert!(status.success());

    let image = image::open(preview_path(dir.path())).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (2, 2));
    assert_eq!(image.get_pixel(0, 0).0, [200, 10, 30, 255]);
}

#[test]
fn no_match_is_a_silent_success() {
    let dir = tempfile::tempdir().unwrap();
    // A sprite without the name prefix and an unrelated texture
    install_bundle(
        dir.path(),
        &BundleBuilder::new()
            .texture(1, "icon_tex", 2, 2, solid(2, 2, [1, 2, 3, 255]))
            .sprite(2, "icon_home", 1, 2, 2),
    );

    let status = run_extract(dir.path());
    assert!(status.success());
    assert!(!preview_path(dir.path()).exists());
}

#[test]
fn last_match_wins_with_multiple_prefixed_sprites() {
    let dir = tempfile::tempdir().unwrap();
    install_bundle(
        dir.path(),
        &BundleBuilder::new()
            .texture(1, "0001_tex", 2, 2, solid(2, 2, [255, 0, 0, 255]))
            .sprite(2, "0001", 1, 2, 2)
            .texture(3, "0002_tex", 2, 2, solid(2, 2, [0, 0, 255, 255]))
            .sprite(4, "0002", 3, 2, 2),
    );

    let status = run_extract(dir.path());
    assert!(status.success());

    // Objects iterate in insertion order, so "0002" overwrites "0001"
    let image = image::open(preview_path(dir.path())).unwrap().to_rgba8();
    assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255, 255]);
}

#[test]
fn repeat_runs_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    install_bundle(
        dir.path(),
        &BundleBuilder::new()
            .texture(1, "0001_tex", 2, 2, solid(2, 2, [9, 9, 9, 255]))
            .sprite(2, "0001", 1, 2, 2),
    );

    assert!(run_extract(dir.path()).success());
    // img/ and preview.png now exist; a second pass must still succeed
    assert!(run_extract(dir.path()).success());
    assert!(preview_path(dir.path()).exists());
}

#[test]
fn missing_bundle_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();

    let status = run_extract(dir.path());
    assert!(!status.success());
    assert!(!preview_path(dir.path()).exists());
}

#[test]
fn non_sprite_objects_are_never_exported() {
    let dir = tempfile::tempdir().unwrap();
    // TextAsset and Texture2D named with the prefix, but no Sprite
    install_bundle(
        dir.path(),
        &BundleBuilder::new()
            .named_object(1, 49, "000fake")
            .texture(2, "000also_not_a_sprite", 2, 2, solid(2, 2, [5, 5, 5, 255])),
    );

    let status = run_extract(dir.path());
    assert!(status.success());
    assert!(!preview_path(dir.path()).exists());
}
