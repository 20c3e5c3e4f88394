#![allow(deprecated)]
use assert_cmd::Command;
use mockito::{Matcher, Server, ServerGuard};
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

const ENV_OVERRIDES: &[&str] = &[
    "PMSYNC_CONFIG",
    "JIRA_URL",
    "API_USERNAME",
    "API_TOKEN",
    "PROJECT_KEY",
    "GOOGLE_API_KEY",
    "GOOGLE_SPREADSHEET_ID",
    "GOOGLE_SPREADSHEET_NAME",
    "RUST_LOG",
];

fn pmsync(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pmsync").unwrap();
    cmd.current_dir(dir.path());
    for var in ENV_OVERRIDES {
        cmd.env_remove(var);
    }
    cmd
}

fn config_for(tracker_url: &str, sheets_url: &str) -> String {
    format!(
        r#"
version: 1
tracker:
  base_url: {tracker_url}
  username: ops@example.com
  token: secret-token
  default_project: PRJ1
directory:
  spreadsheet_id: sheet-1
  range: Sheet1
  api_key: sheet-key
  base_url: {sheets_url}
prune:
  days_ago: 1
  status: To Do
"#
    )
}

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("pmsync.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

fn roster(server: &mut ServerGuard, body: &str) -> mockito::Mock {
    server
        .mock("GET", Matcher::Regex(r"^/v4/spreadsheets/sheet-1/values/".into()))
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create()
}

const ONE_OWNER: &str =
    r#"{"values":[["Manager","Projects"],["alice@x.com","PRJ1"]]}"#;

// ---------------------------------------------------------------------------
// pmsync --help
// ---------------------------------------------------------------------------

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    pmsync(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reconcile"))
        .stdout(predicate::str::contains("prune"))
        .stdout(predicate::str::contains("directory"));
}

// ---------------------------------------------------------------------------
// pmsync config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_accepts_complete_config() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, &config_for("https://jira.example.com", "https://sheets.example.com"));

    pmsync(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_missing_token() {
    let dir = TempDir::new().unwrap();
    let body = config_for("https://jira.example.com", "https://sheets.example.com")
        .replace("  token: secret-token\n", "");
    write_config(&dir, &body);

    pmsync(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] tracker.token is required"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn environment_fills_missing_token() {
    let dir = TempDir::new().unwrap();
    let body = config_for("https://jira.example.com", "https://sheets.example.com")
        .replace("  token: secret-token\n", "");
    write_config(&dir, &body);

    pmsync(&dir)
        .env("API_TOKEN", "from-env")
        .args(["config", "validate"])
        .assert()
        .success();
}

#[test]
fn explicit_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    pmsync(&dir)
        .args(["--config", "nope.yaml", "config", "validate"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn config_show_masks_secrets() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, &config_for("https://jira.example.com", "https://sheets.example.com"));

    pmsync(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("secret-token").not())
        .stdout(predicate::str::contains("sheet-key").not());
}

// ---------------------------------------------------------------------------
// pmsync reconcile
// ---------------------------------------------------------------------------

#[test]
fn reconcile_refuses_incomplete_config() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "tracker:\n  base_url: https://jira.example.com\n");

    pmsync(&dir)
        .arg("reconcile")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("tracker.username is required"));
}

#[test]
fn reconcile_rejects_malformed_day() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, &config_for("https://jira.example.com", "https://sheets.example.com"));

    pmsync(&dir)
        .args(["reconcile", "--day", "10/01/2024"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid date '10/01/2024'"));
}

#[test]
fn reconcile_fails_on_empty_roster() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _sheet = roster(&mut server, r#"{"values":[]}"#);
    let create = server.mock("POST", "/rest/api/3/issue").expect(0).create();
    write_config(&dir, &config_for(&server.url(), &server.url()));

    pmsync(&dir)
        .args(["reconcile", "--day", "2024-10-01"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no data found"));
    create.assert();
}

#[test]
fn reconcile_dry_run_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _sheet = roster(&mut server, ONE_OWNER);
    let _user = server
        .mock("GET", "/rest/api/3/user/search")
        .match_query(Matcher::UrlEncoded("query".into(), "alice@x.com".into()))
        .with_body(r#"[{"accountId":"acc-1","displayName":"Alice"}]"#)
        .create();
    let _search = server
        .mock("GET", "/rest/api/3/search")
        .match_query(Matcher::Any)
        .with_body(r#"{"startAt":0,"maxResults":50,"total":0,"issues":[]}"#)
        .create();
    let create = server.mock("POST", "/rest/api/3/issue").expect(0).create();
    write_config(&dir, &config_for(&server.url(), &server.url()));

    let output = pmsync(&dir)
        .args(["--json", "reconcile", "--day", "2024-10-01", "--dry-run"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["summary"]["created"], 3);
    assert_eq!(report["summary"]["errors"], 0);
    assert_eq!(report["simulated"].as_array().unwrap().len(), 3);
    let steps = report["results"][0]["steps"].as_array().unwrap();
    assert_eq!(steps[2]["summary"], "PM PRJ1 - Alice - 10.01.2024");
    create.assert();
}

#[test]
fn strict_mode_fails_on_unknown_owner() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _sheet = roster(&mut server, ONE_OWNER);
    let _user = server
        .mock("GET", "/rest/api/3/user/search")
        .match_query(Matcher::Any)
        .with_body("[]")
        .create();
    write_config(&dir, &config_for(&server.url(), &server.url()));

    pmsync(&dir)
        .args(["reconcile", "--day", "2024-10-01", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("owner not found: alice@x.com"));

    pmsync(&dir)
        .args(["reconcile", "--day", "2024-10-01", "--dry-run", "--strict"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("reconcile finished with 1 error(s)"));
}

// ---------------------------------------------------------------------------
// pmsync prune
// ---------------------------------------------------------------------------

#[test]
fn prune_requires_a_target_day() {
    let dir = TempDir::new().unwrap();
    let body = config_for("https://jira.example.com", "https://sheets.example.com")
        .replace("  days_ago: 1\n", "");
    write_config(&dir, &body);

    pmsync(&dir)
        .arg("prune")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("days_ago"));
}

#[test]
fn prune_dry_run_deletes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _search = server
        .mock("GET", "/rest/api/3/search")
        .match_query(Matcher::Any)
        .with_body(
            r#"{"total":1,"issues":[{"key":"PRJ1-7","fields":{
                "summary":"PM PRJ1 - Alice - 10.01.2024",
                "issuetype":{"name":"Subtask"},
                "status":{"name":"To Do"},
                "parent":{"key":"PRJ1-2"}}}]}"#,
        )
        .create();
    let delete = server.mock("DELETE", Matcher::Any).expect(0).create();
    write_config(&dir, &config_for(&server.url(), &server.url()));

    pmsync(&dir)
        .args(["prune", "--date", "2024-10-01", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PRJ1-7"))
        .stdout(predicate::str::contains("1 deleted"))
        .stdout(predicate::str::contains("dry run: 1 issue(s) would be deleted"));
    delete.assert();
}

#[test]
fn prune_refuses_condition_that_escapes_its_scope() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let search = server
        .mock("GET", "/rest/api/3/search")
        .match_query(Matcher::Any)
        .expect(0)
        .create();
    let body = config_for(&server.url(), &server.url()).replace(
        "  status: To Do\n",
        "  status: To Do\n  condition: labels = stale) OR (issuetype = Subtask\n",
    );
    write_config(&dir, &body);

    pmsync(&dir)
        .args(["prune", "--date", "2024-10-01"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("prune.condition has a ')'"));
    search.assert();
}

#[test]
fn prune_date_and_days_ago_conflict() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, &config_for("https://jira.example.com", "https://sheets.example.com"));

    pmsync(&dir)
        .args(["prune", "--date", "2024-10-01", "--days-ago", "2"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// pmsync directory
// ---------------------------------------------------------------------------

#[test]
fn directory_lists_owners() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new();
    let _sheet = roster(
        &mut server,
        r#"{"values":[["Manager","Projects"],["alice@x.com","PRJ1, PRJ2"],["bob@x.com",""]]}"#,
    );
    write_config(&dir, &config_for("https://jira.example.com", &server.url()));

    pmsync(&dir)
        .arg("directory")
        .assert()
        .success()
        .stdout(predicate::str::contains("alice@x.com  PRJ1, PRJ2"))
        .stdout(predicate::str::contains("bob@x.com    PRJ1"));
}
