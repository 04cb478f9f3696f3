//! Integration tests that lock the scenario runner's timeline output.

use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn run_echotrail(args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_echotrail");
    let isolated = std::env::temp_dir().join("echotrail-main-bin-no-config");
    Command::new(bin)
        .args(args)
        .env("ECHOTRAIL_CONFIG_DIR", isolated)
        .env_remove("ECHOTRAIL_CONFIG")
        .output()
        .expect("run echotrail")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn walk_scenario_prints_ordered_timeline() {
    let path = fixture("walk.yaml");
    let output = run_echotrail(&["--scenario", path.to_str().expect("utf8 path")]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        stdout_lines(&output),
        vec![
            "[t=0] area start: found=4 with_audio=3 queued=3",
            "[t=0] start bench",
            "[t=5000] refresh queued=2",
            "[t=20000] done bench",
            "[t=20000] start fountain",
            "[t=35000] done fountain",
            "[t=35000] start mural",
            "[t=35000] fail mural: unknown clip 'mural.m4a'",
            "[t=60000] refresh queued=0",
            "[t=130000] refresh queued=3",
            "[t=130000] start bench",
            "summary: started=4 finished=2 failed=1 queued=2",
        ]
    );
}

#[test]
fn rapid_replay_lets_memories_return_sooner() {
    let path = fixture("walk.yaml");
    let output = run_echotrail(&[
        "--scenario",
        path.to_str().expect("utf8 path"),
        "--rapid-replay",
    ]);
    assert!(output.status.success());
    let lines = stdout_lines(&output);
    // With a 15 s cooldown bench is eligible again at the 60 s sample.
    assert!(lines.contains(&"[t=60000] refresh queued=3".to_string()));
    assert!(lines.contains(&"[t=60000] start bench".to_string()));
}

#[test]
fn silent_area_reports_no_audio() {
    let path = fixture("silent.yaml");
    let output = run_echotrail(&["--scenario", path.to_str().expect("utf8 path")]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(
        "[t=0] area start failed: No memories with audio found (found=1 with_audio=0)"
    ));
    assert!(stdout.contains("summary: started=0 finished=0 failed=0 queued=0"));
}

#[test]
fn json_flag_appends_snapshot() {
    let path = fixture("walk.yaml");
    let output = run_echotrail(&[
        "--scenario",
        path.to_str().expect("utf8 path"),
        "--drain",
        "--json",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("summary: started=6 finished=4 failed=2 queued=0"));
    assert!(stdout.contains("\"playback_state\""));
    assert!(stdout.contains("\"cooldown_ms\": 90000"));
}

#[test]
fn print_config_reflects_flags() {
    let output = run_echotrail(&["--print-config", "--cooldown-ms", "1234"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"cooldown_ms\": 1234"));
}

#[test]
fn missing_scenario_is_an_error() {
    let output = run_echotrail(&[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no scenario given"));
}
