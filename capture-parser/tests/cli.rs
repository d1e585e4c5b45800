use pretty_assertions::assert_eq;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn capture_parser() -> Command {
    Command::new(env!("CARGO_BIN_EXE_capture-parser"))
}

fn run_with_stdin(args: &[&str], input: &[u8]) -> Output {
    let mut child = capture_parser()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(input).unwrap();
    child.wait_with_output().unwrap()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "capture-parser exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn summarizes_file_argument() {
    let output = capture_parser()
        .arg("tests/fixtures/capture/two-records.warc")
        .output()
        .unwrap();

    assert_success(&output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        include_str!("fixtures/expected/two-records.jsonl")
    );
}

#[test]
fn reads_stdin_by_default() {
    let output = run_with_stdin(&[], include_bytes!("fixtures/capture/latin1-payload.warc"));

    assert_success(&output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        include_str!("fixtures/expected/latin1-payload.jsonl")
    );
}

#[test]
fn payload_flag_includes_text() {
    let output = run_with_stdin(
        &["-", "--payload"],
        b"WARC/1.0\r\nWARC-Target-URI: https://a.example/\r\n\r\nHTTP/1.1 200 OK\r\n\r\n<p>hi</p>\r\n",
    );

    assert_success(&output);
    let line: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(line["payload"], "<p>hi</p>");
    assert_eq!(line["target_uri"], "https://a.example/");
}

#[test]
fn malformed_stream_fails() {
    let output = run_with_stdin(&[], b"not a capture stream\n");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected a capture header"));
}
