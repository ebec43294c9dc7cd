//! End-to-end tests for the querybot binary.

#![allow(clippy::panic)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn querybot(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("querybot").unwrap_or_else(|e| panic!("binary: {e}"));
    cmd.current_dir(dir.path())
        .env_remove("QUERYBOT_DB_PATH")
        .env_remove("OPENAI_API_KEY")
        .env_remove("QUERYBOT_API_KEY")
        .env_remove("QUERYBOT_SECRETS")
        .env_remove("RUST_LOG");
    cmd
}

fn tempdir() -> TempDir {
    tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"))
}

#[test]
fn test_init_and_status() {
    let dir = tempdir();

    querybot(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized querybot database"));
    assert!(dir.path().join(".querybot/querybot.db").exists());

    querybot(&dir)
        .args(["status", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"companies\": 0"));
}

#[test]
fn test_status_requires_init() {
    let dir = tempdir();
    querybot(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn test_load_csv_files() {
    let dir = tempdir();
    std::fs::write(
        dir.path().join("companies.csv"),
        "company_name,cae_primary_label,trade_description_native,website\n\
         Rota Azul,Transportes,Transporte rodoviário,rota.pt\n\
         Frota Sul,Logística,Logística urbana,\n",
    )
    .unwrap_or_else(|e| panic!("write: {e}"));
    std::fs::write(
        dir.path().join("incentives.csv"),
        "title,description,date_publication,total_budget\n\
         Apoio à logística,Frotas,2024-01-10 09:00:00,1500000\n",
    )
    .unwrap_or_else(|e| panic!("write: {e}"));

    querybot(&dir).arg("init").assert().success();
    querybot(&dir)
        .args([
            "load",
            "--companies",
            "companies.csv",
            "--incentives",
            "incentives.csv",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 2 companies"))
        .stdout(predicate::str::contains("Loaded 1 incentives"));

    querybot(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Companies: 2"))
        .stdout(predicate::str::contains("Incentives: 1"));
}

#[test]
fn test_ask_without_api_key_fails() {
    let dir = tempdir();
    querybot(&dir).arg("init").assert().success();
    querybot(&dir)
        .args(["ask", "How many companies are there?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Agent configuration error"));
}

#[test]
fn test_match_without_api_key_fails() {
    let dir = tempdir();
    querybot(&dir).arg("init").assert().success();
    querybot(&dir)
        .arg("match")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Agent configuration error"));
    assert!(!dir.path().join("data").exists());
}

#[test]
fn test_init_prompts() {
    let dir = tempdir();
    querybot(&dir)
        .args(["init-prompts", "--dir", "prompts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 5 prompt template(s)"));
    assert!(dir.path().join("prompts/keywords.md").exists());
    assert!(dir.path().join("prompts/ranking.md").exists());
}
