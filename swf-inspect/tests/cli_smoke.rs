use std::path::PathBuf;
use std::process::Command;

fn inspect() -> Command {
    Command::new(env!("CARGO_BIN_EXE_swf-inspect"))
}

/// One shape placed on one frame.
fn write_movie(name: &str) -> PathBuf {
    let tag = |code: u16, body: &[u8]| {
        let mut bytes = (code << 6 | body.len() as u16).to_le_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    };
    let mut body = vec![0x00, 0x00, 12, 1, 0];
    body.extend(tag(2, &[1, 0, 0x00, 0, 0, 0x00, 0x00]));
    body.extend(tag(26, &[0x06, 1, 0, 1, 0, 0x00]));
    body.extend(tag(1, &[]));
    body.extend(tag(0, &[]));

    let mut file = b"FWS\x0a".to_vec();
    file.extend_from_slice(&((body.len() + 8) as u32).to_le_bytes());
    file.extend(body);

    let path = std::env::temp_dir().join(format!("swf-inspect-{}-{name}.swf", std::process::id()));
    std::fs::write(&path, file).unwrap();
    path
}

#[test]
fn test_help() {
    let output = inspect().arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("timeline"));
}

#[test]
fn test_info_json() {
    let path = write_movie("info");
    let output = inspect().args(["info", "--json"]).arg(&path).output().unwrap();
    std::fs::remove_file(&path).ok();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["header"]["version"], 10);
    assert_eq!(summary["header"]["frame_count"], 1);
    assert_eq!(summary["symbols"][0]["id"], 1);
}

#[test]
fn test_timeline_in_small_chunks() {
    let path = write_movie("timeline");
    let output = inspect()
        .args(["timeline", "--chunk-size", "3"])
        .arg(&path)
        .output()
        .unwrap();
    std::fs::remove_file(&path).ok();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.starts_with("1 frames, 1 keyframes"));
    assert!(text.contains("add session 0 (symbol 1) at depth 1"));
}

#[test]
fn test_missing_file_fails() {
    let output = inspect().args(["info", "/nonexistent/movie.swf"]).output().unwrap();
    assert!(!output.status.success());
}
