use std::path::{Path, PathBuf};
use std::process::Command;

use pretty_assertions::assert_eq;

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../partitura/tests/fixtures/two_part.musicxml")
}

fn cifrador(config_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cifrador"));
    // keep whatever is in the developer's environment out of the run
    let config = config_dir.join("cifra.toml");
    std::fs::write(&config, "[telemetry]\nlog_level = \"warn\"\n").unwrap();
    cmd.arg("--config").arg(config).env_remove("RUST_LOG");
    cmd
}

#[test]
fn annotate_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    let out_xml = dir.path().join("out.musicxml");

    let output = cifrador(dir.path())
        .args(["annotate", "-i"])
        .arg(fixture())
        .arg("--out-xml")
        .arg(&out_xml)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["key"], "C major");
    assert_eq!(summary["measures"], 4);
    assert_eq!(summary["uncertain_measures"], 0);
    assert_eq!(summary["pdf_written"], false);

    let xml = std::fs::read_to_string(&out_xml).unwrap();
    assert!(xml.contains("<part id=\"Chords\">"));
}

#[test]
fn annotate_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();

    let output = cifrador(dir.path())
        .args(["annotate", "-i"])
        .arg(dir.path().join("missing.musicxml"))
        .arg("--out-xml")
        .arg(dir.path().join("out.musicxml"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input file not found"), "{stderr}");
}

#[test]
fn config_shows_file_source() {
    let dir = tempfile::tempdir().unwrap();

    let output = cifrador(dir.path()).arg("config").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[renderer]"));
    assert!(stdout.contains("cifra.toml"));
}
