use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn ketrac_bin() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_ketrac"))
}

fn source_file(source: &str) -> NamedTempFile {
    use std::io::Write;
    let mut file = NamedTempFile::new().expect("create temp source file");
    write!(file, "{source}").unwrap();
    file
}

#[test]
fn runs_entry_point_and_prints_result() {
    let file = source_file("fn main() { return 2 + 3; }");
    Command::new(ketrac_bin()).arg(file.path()).assert().success().stdout(predicate::str::contains("5"));
}

#[test]
fn emits_lir_without_running() {
    let file = source_file("fn main() { return 1; }");
    Command::new(ketrac_bin())
        .arg(file.path())
        .arg("--emit")
        .arg("lir")
        .assert()
        .success()
        .stdout(predicate::str::contains("LirFunction"));
}

#[test]
fn reports_missing_entry_point() {
    let file = source_file("fn not_main() { return 1; }");
    Command::new(ketrac_bin())
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not_main").or(predicate::str::contains("main")));
}
