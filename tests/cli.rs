use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const MUSEUM: &str = "The museum opened its doors in the spring and the visitors were able to walk \
    through all of the galleries at their own pace, stopping at each of the paintings that had \
    been restored over the course of the last two years by a team of experts who worked with \
    great care on every one of them.";

fn binary() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ccsieve"));
    cmd.env_remove("CCSIEVE_LOG").env_remove("RUST_LOG");
    cmd
}

fn stoplists() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("stoplists")
}

fn capture(uri: &str, body: &str) -> String {
    format!(
        "WARC/1.0\r\nWARC-Type: response\r\nWARC-Target-URI: {uri}\r\n\r\n\
         HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n{body}\r\n\r\n\r\n"
    )
}

#[test]
fn extract_writes_clean_text_per_capture_file() {
    let fetch_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let page = format!(
        "<html><body><div><a href=\"/\">Home</a> | <a href=\"/shop\">Shop</a></div><p>{MUSEUM}</p></body></html>"
    );
    fs::write(
        fetch_dir.path().join("en_CC-MAIN-2024-30.json"),
        [
            capture("https://museum.example/", &page),
            capture("https://empty.example/", "<html><body></body></html>"),
        ]
        .concat(),
    )
    .unwrap();
    fs::write(fetch_dir.path().join("broken.json"), "not a capture\r\n").unwrap();

    let output = binary()
        .arg("--stoplist-dir")
        .arg(stoplists())
        .arg("extract")
        .arg(fetch_dir.path())
        .arg(out_dir.path())
        .arg("2")
        .arg("--stoplist-lang")
        .arg("en")
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("items completed: 2"), "stdout: {stdout}");

    let plain = fs::read_to_string(out_dir.path().join("en_CC-MAIN-2024-30.json.txt")).unwrap();
    assert_eq!(plain, format!("{MUSEUM}\n\n"));
    let annotated = fs::read_to_string(out_dir.path().join("en_CC-MAIN-2024-30.json")).unwrap();
    assert!(annotated.starts_with("WARC/1.0\nWARC-Type: response\nWARC-Target-URI: https://museum.example/\n\n"));
    assert!(!annotated.contains("empty.example"));
    assert_eq!(
        fs::read_to_string(out_dir.path().join("broken.json.txt")).unwrap(),
        ""
    );
}

#[test]
fn extract_rejects_unknown_stoplist() {
    let fetch_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();

    let output = binary()
        .arg("--stoplist-dir")
        .arg(stoplists())
        .arg("extract")
        .arg(fetch_dir.path())
        .arg(out_dir.path())
        .arg("--stoplist-lang")
        .arg("xx")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("xx.txt"));
}

#[test]
fn skip_existing_leaves_previous_artifacts() {
    let fetch_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    fs::write(
        fetch_dir.path().join("done.json"),
        capture("https://museum.example/", &format!("<p>{MUSEUM}</p>")),
    )
    .unwrap();
    fs::write(out_dir.path().join("done.json"), "previous run").unwrap();

    let output = binary()
        .arg("--stoplist-dir")
        .arg(stoplists())
        .arg("extract")
        .arg(fetch_dir.path())
        .arg(out_dir.path())
        .arg("--stoplist-lang")
        .arg("en")
        .arg("--skip-existing")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("items skipped: 1"));
    assert_eq!(
        fs::read_to_string(out_dir.path().join("done.json")).unwrap(),
        "previous run"
    );
}
