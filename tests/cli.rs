use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn write_game(header: &str, script: &str) -> TempDir {
    let dir = tempfile::tempdir().expect("temp game dir");
    fs::write(dir.path().join("header.json"), header).expect("write header");
    fs::write(dir.path().join("game.lua"), script).expect("write script");
    dir
}

fn host(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pixelbox-host").expect("binary exists");
    cmd.arg(dir).arg("--headless");
    cmd
}

#[test]
fn cli_runs_headless_and_prints_summary() {
    let game = write_game(
        r#"{ "main": "game.lua", "aspectRatio": "16/9", "title": "counter" }"#,
        r#"
local frames = 0
function tick(controllers, dt, render)
  frames = frames + 1
end
function getStateForAgent()
  return { frames = frames }
end
"#,
    );
    host(game.path())
        .arg("--frames")
        .arg("12")
        .assert()
        .success()
        .stdout(contains("resolution: 128x72"))
        .stdout(contains("frames: 12"))
        .stdout(contains("tick faults: none"))
        .stdout(contains(r#"agent state: {"frames":12}"#));
}

#[test]
fn cli_contains_tick_faults() {
    let game = write_game(
        r#"{ "main": "game.lua" }"#,
        "function tick() error('always broken') end",
    );
    host(game.path())
        .arg("--frames")
        .arg("5")
        .assert()
        .success()
        .stdout(contains("frames: 5"))
        .stdout(contains("tick faults: 5"));
}

#[test]
fn cli_reports_boot_failures() {
    let game = write_game(r#"{ "aspectRatio": "16/9" }"#, "");
    host(game.path())
        .assert()
        .failure()
        .stderr(contains("missing main attribute"));

    let game = write_game(r#"{ "main": "game.lua", "aspectRatio": "abc" }"#, "");
    host(game.path())
        .assert()
        .failure()
        .stderr(contains("invalid aspect ratio"));
}

#[test]
fn cli_reads_config_file() {
    let game = write_game(
        r#"{ "main": "game.lua", "aspectRatio": "1/2" }"#,
        "function tick() end",
    );
    let config = game.path().join("host.json");
    fs::write(&config, r#"{ "baseWidth": 64, "baseHeight": 64 }"#).expect("write config");
    host(game.path())
        .arg("--config")
        .arg(&config)
        .arg("--frames")
        .arg("1")
        .assert()
        .success()
        .stdout(contains("resolution: 32x64"))
        .stdout(contains("agent state: {}"));
}

#[test]
fn cli_rejects_unknown_arguments() {
    let game = write_game(r#"{ "main": "game.lua" }"#, "");
    host(game.path())
        .arg("--fullscreen")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --fullscreen"));
}
