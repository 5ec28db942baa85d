use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn ketra_bin() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_ketra"))
}

fn source_file(source: &str) -> NamedTempFile {
    use std::io::Write;
    let mut file = NamedTempFile::new().expect("create temp source file");
    write!(file, "{source}").unwrap();
    file
}

#[test]
fn runs_script_entry_point() {
    let file = source_file("fn main() { return 6 * 7; }");
    Command::new(ketra_bin()).arg(file.path()).assert().success().stdout(predicate::str::contains("42"));
}

#[test]
fn custom_entry_point_flag_overrides_default() {
    let file = source_file("fn start() { return 9; } fn main() { return 1; }");
    Command::new(ketra_bin())
        .arg(file.path())
        .arg("--entry")
        .arg("start")
        .assert()
        .success()
        .stdout(predicate::str::contains("9"));
}
