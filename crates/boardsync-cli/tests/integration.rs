use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
github:
  token: gh-tok
trello:
  key: t-key
  token: t-tok
boards:
  - name: Product
    repos:
      - acme/widgets
    default_repo: acme/widgets
"#;

fn boardsync(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("boardsync").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

fn write_config(dir: &TempDir) {
    std::fs::write(dir.path().join("boardsync.yaml"), CONFIG).unwrap();
}

// ---------------------------------------------------------------------------
// boardsync config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_accepts_minimal_config() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);

    boardsync(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration OK"));
}

#[test]
fn config_validate_fails_without_file() {
    let dir = TempDir::new().unwrap();

    boardsync(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"));
}

#[test]
fn config_validate_fails_without_boards() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("boardsync.yaml"), "boards: []\n").unwrap();

    boardsync(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no boards configured"));
}

#[test]
fn config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);

    boardsync(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("To Schedule"))
        .stdout(predicate::str::contains("acme/widgets"));
}

#[test]
fn config_show_json() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);

    boardsync(&dir)
        .args(["--json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"intake_list\": \"To Schedule\""));
}

#[test]
fn config_flag_overrides_default_path() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("other.yaml"), CONFIG).unwrap();

    boardsync(&dir)
        .args(["--config", "other.yaml", "config", "validate"])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// boardsync sync
// ---------------------------------------------------------------------------

#[test]
fn sync_unknown_board_fails() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);

    boardsync(&dir)
        .args(["sync", "--board", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
}
