use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use image::{GrayImage, Luma};
use predicates::prelude::*;
use rstest::*;

/// 只使用内容哈希兜底，避免依赖外部服务
macro_rules! cargo_run {
    ($conf_dir:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin("scanmatch")?;
            cmd.arg("-c").arg($conf_dir).arg("--no-remote").arg("--no-native");
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

fn checker(dir: &Path, name: &str, cell: u32) -> Result<PathBuf> {
    let path = dir.join(name);
    GrayImage::from_fn(128, 96, |x, y| Luma([if (x / cell + y / cell) % 2 == 0 { 220 } else { 30 }]))
        .save(&path)?;
    Ok(path)
}

fn gradient(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    GrayImage::from_fn(128, 96, |x, _| Luma([(x * 2) as u8])).save(&path)?;
    Ok(path)
}

#[fixture]
fn conf_dir() -> TempDir {
    TempDir::new().unwrap()
}

#[rstest]
fn hash_prints_hex(conf_dir: TempDir) -> Result<()> {
    let image = checker(conf_dir.path(), "a.png", 8)?;

    cargo_run!(conf_dir.path(), "hash", &image)
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f]{64}\n$")?);

    cargo_run!(conf_dir.path(), "hash", &image, "--size", "8", "--compare", &image)
        .success()
        .stdout(predicate::str::contains("0\tIdentical"));

    cargo_run!(conf_dir.path(), "hash", &image, "--size", "7").failure();

    Ok(())
}

#[rstest]
fn add_same_scan_twice(conf_dir: TempDir) -> Result<()> {
    let image = checker(conf_dir.path(), "poster.png", 8)?;

    cargo_run!(conf_dir.path(), "add", &image, "--title", "Poster")
        .success()
        .stdout(predicate::str::contains("[OK] Add 1"));
    cargo_run!(conf_dir.path(), "add", &image)
        .success()
        .stdout(predicate::str::contains("[DUP]").and(predicate::str::contains("Poster")));

    cargo_run!(conf_dir.path(), "check", &image)
        .success()
        .stdout(predicate::str::starts_with("duplicate"));
    cargo_run!(conf_dir.path(), "match", &image, "--output-format", "json")
        .success()
        .stdout(predicate::str::contains("\"title\": \"Poster\""));

    Ok(())
}

#[rstest]
fn add_directory_then_remove(conf_dir: TempDir) -> Result<()> {
    let scans = conf_dir.path().join("scans");
    std::fs::create_dir(&scans)?;
    let a = checker(&scans, "a.png", 8)?;
    gradient(&scans, "b.png")?;
    std::fs::write(scans.join("notes.txt"), "ignored")?;

    cargo_run!(conf_dir.path(), "add", &scans).success();
    cargo_run!(conf_dir.path(), "info")
        .success()
        .stdout(predicate::str::contains("\"with_descriptors\": 2"))
        .stdout(predicate::str::contains("\"fallback_active\": true"));

    cargo_run!(conf_dir.path(), "remove", "1").success();
    cargo_run!(conf_dir.path(), "remove", "1").failure();
    cargo_run!(conf_dir.path(), "check", &a).success().stdout(predicate::str::starts_with("unique"));

    Ok(())
}

#[rstest]
fn threshold_out_of_range(conf_dir: TempDir) -> Result<()> {
    let image = checker(conf_dir.path(), "a.png", 8)?;
    cargo_run!(conf_dir.path(), "check", &image, "--threshold", "1.5").failure();
    Ok(())
}
