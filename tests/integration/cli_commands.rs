//! Integration tests for the eventlog binary.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

use crate::integration::test_utils::write_file;

fn run_cli(home: &Path, args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_eventlog");
    Command::new(bin)
        .env_clear()
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command should succeed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

const SCRIPT: &str = r#"
# a short session with one failed upload
{"op":"launch"}
{"op":"log","name":"opened","params":{"screen":"home"}}
{"op":"start_timed","name":"load"}
{"op":"advance","seconds":2}
{"op":"end_timed","name":"load"}
{"op":"sync"}
{"op":"upload_fail","reason":"offline"}
{"op":"log","name":"closed"}
{"op":"sync"}
{"op":"upload_ok"}
"#;

const BUFFERED: &str = "[buffer]\nenabled = true\nsync_buffer_size_threshold = 0\n";

#[test]
fn test_replay_text_report() {
    let temp_dir = TempDir::new().unwrap();
    let script = write_file(&temp_dir, "session.jsonl", SCRIPT).unwrap();
    let config = write_file(&temp_dir, "eventlog.toml", BUFFERED).unwrap();

    let output = run_cli(
        temp_dir.path(),
        &[
            "replay",
            script.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ],
    );
    let text = stdout(&output);
    assert!(text.contains("Events (3):"), "{}", text);
    assert!(text.contains("load timed=2s"), "{}", text);
    assert!(text.contains("batch 0 records=2 failed"), "{}", text);
    assert!(text.contains("batch 1 records=3 ok"), "{}", text);
    assert!(text.contains("Buffered: 0"), "{}", text);
}

#[test]
fn test_replay_json_report() {
    let temp_dir = TempDir::new().unwrap();
    let script = write_file(&temp_dir, "session.jsonl", SCRIPT).unwrap();
    let config = write_file(&temp_dir, "eventlog.toml", BUFFERED).unwrap();

    let output = run_cli(
        temp_dir.path(),
        &[
            "replay",
            script.to_str().unwrap(),
            "--format",
            "json",
            "--config",
            config.to_str().unwrap(),
        ],
    );
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let events = report["events"].as_array().unwrap();
    assert_eq!(events[1]["name"], "load");
    assert_eq!(events[1]["was_timed"], true);
    assert_eq!(report["uploads"].as_array().unwrap().len(), 2);
    assert_eq!(report["stats"]["uploads_failed"], 1);
}

#[test]
fn test_replay_rejects_bad_script() {
    let temp_dir = TempDir::new().unwrap();
    let script = write_file(&temp_dir, "bad.jsonl", "{\"op\":\"teleport\"}\n").unwrap();
    let output = run_cli(temp_dir.path(), &["replay", script.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 1"));
}

#[test]
fn test_stream_uploads_batches_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_file(
        &temp_dir,
        "events.jsonl",
        "{\"name\":\"a\"}\n{\"name\":\"b\",\"params\":{\"n\":2}}\nnot json\n{\"name\":\"c\",\"level\":\"error\"}\n",
    )
    .unwrap();

    let output = run_cli(
        temp_dir.path(),
        &["stream", "--input", input.to_str().unwrap()],
    );
    let text = stdout(&output);
    let mut names = Vec::new();
    for line in text.lines().filter(|l| l.starts_with('[')) {
        let batch: Vec<serde_json::Value> = serde_json::from_str(line).unwrap();
        names.extend(batch.iter().map(|r| r["event"].as_str().unwrap().to_string()));
    }
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(text.contains("Logged 3 events"), "{}", text);
}

#[test]
fn test_config_prints_effective_toml() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(temp_dir.path(), &["config"]);
    let text = stdout(&output);
    let parsed: toml::Value = toml::from_str(&text).unwrap();
    assert_eq!(parsed["log_level"].as_str(), Some("normal"));
    assert_eq!(parsed["buffer"]["max_buffer_size"].as_integer(), Some(500));
}

#[test]
fn test_validate_reports_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_file(&temp_dir, "bad.toml", "[buffer]\nmax_buffer_size = 0\n").unwrap();
    let output = run_cli(
        temp_dir.path(),
        &["validate", "--config", config.to_str().unwrap()],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid configuration"), "{}", stderr);
    assert!(stderr.contains("max_buffer_size"), "{}", stderr);
}
