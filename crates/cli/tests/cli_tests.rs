// End-to-end tests for the `zpk` binary.
// Run with: cargo test -p zoopeek-cli --test cli_tests -- --nocapture
//
// Manual smoke test (needs a real TTY):
//   zpk query --db zoo.sqlite 'SELECT * FROM animals'
//   Verify: pager opens, j/k scroll, 1-5 change page size, q leaves the last
//   render printed, d leaves nothing, terminal state restored.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use rusqlite::Connection;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{}").unwrap();
        let conn = Connection::open(dir.path().join("zoo.sqlite")).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (user_id INTEGER PRIMARY KEY, user_name TEXT);
             INSERT INTO users VALUES (1, 'alice'), (2, 'bob');
             CREATE TABLE animals (id INTEGER PRIMARY KEY, owner TEXT, name TEXT);
             INSERT INTO animals VALUES (1, 'alice', 'bat'), (2, 'alice', 'owl'), (3, 'bob', 'fox');",
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn db(&self) -> String {
        self.path("zoo.sqlite").to_string_lossy().into_owned()
    }

    fn zpk(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_zpk"));
        cmd.env("ZOOPEEK_CONFIG", self.path("settings.json"))
            .env_remove("ZOOPEEK_USER")
            .env_remove("RUST_LOG");
        cmd
    }

    fn query(&self, sql: &str, extra: &[&str]) -> Output {
        self.zpk()
            .args(["query", "--db", &self.db(), "--plain", sql])
            .args(extra)
            .output()
            .expect("zpk query")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "exit code: {:?}\nstderr: {}",
        output.status,
        stderr(output)
    );
}

// ---------------------------------------------------------------------------
// query: rendered table
// ---------------------------------------------------------------------------

#[test]
fn plain_table() {
    let fx = Fixture::new();
    let output = fx.query("SELECT user_name FROM users ORDER BY user_id", &[]);
    assert_success(&output);

    let out = stdout(&output);
    assert!(out.starts_with("```sql\nSELECT user_name FROM users ORDER BY user_id\n```"), "{}", out);
    assert!(out.contains("user_name\n"), "{}", out);
    // Cells are padded to the column width
    assert!(out.contains("alice\nbob  \n"), "{}", out);
    assert!(out.contains("1-2 / 2"), "{}", out);
}

#[test]
fn context_macros_resolve_for_user() {
    let fx = Fixture::new();
    let output = fx.query(
        "SELECT name FROM animals WHERE owner = ME ORDER BY id",
        &["--user", "1", "--name", "alice"],
    );
    assert_success(&output);

    let out = stdout(&output);
    assert!(out.contains("bat\nowl\n"), "{}", out);
    assert!(!out.contains("fox"), "{}", out);
    // The original text is echoed, not the expansion
    assert!(out.contains("owner = ME"), "{}", out);
}

#[test]
fn show_expanded_echoes_expansion() {
    let fx = Fixture::new();
    let output = fx.query("SELECT ME", &["--name", "bob", "--show-expanded"]);
    assert_success(&output);
    assert!(stdout(&output).contains("```sql\nSELECT 'bob'\n```"));
}

#[test]
fn page_size_limits_window() {
    let fx = Fixture::new();
    let output = fx.query("SELECT name FROM animals ORDER BY id", &["--page-size", "2"]);
    assert_success(&output);

    let out = stdout(&output);
    assert!(out.contains("1-2 / 3"), "{}", out);
    assert!(!out.contains("fox"), "{}", out);
}

#[test]
fn empty_result() {
    let fx = Fixture::new();
    let output = fx.query("SELECT name FROM animals WHERE id > 100", &[]);
    assert_success(&output);
    assert!(stdout(&output).contains("```(no results)```"));
}

#[test]
fn json_output() {
    let fx = Fixture::new();
    let output = fx
        .zpk()
        .args(["query", "--db", &fx.db(), "--json", "SELECT id, name FROM animals ORDER BY id"])
        .output()
        .unwrap();
    assert_success(&output);

    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["columns"], serde_json::json!(["id", "name"]));
    assert_eq!(value["rows"][2], serde_json::json!([3, "fox"]));
}

#[test]
fn magic_lines_print_as_text() {
    let fx = Fixture::new();
    let output = fx.query("SELECT 'a' || char(10) || 'b' AS magic_lines", &[]);
    assert_success(&output);
    assert_eq!(stdout(&output), "a\nb\n");
}

#[test]
fn query_from_stdin() {
    let fx = Fixture::new();
    let mut child = fx
        .zpk()
        .args(["query", "--db", &fx.db(), "--plain", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"SELECT name\nFROM animals\nWHERE id = 3")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert_success(&output);
    assert!(stdout(&output).contains("fox"));
}

// ---------------------------------------------------------------------------
// query: per-user snapshots
// ---------------------------------------------------------------------------

#[test]
fn per_user_snapshots() {
    let fx = Fixture::new();
    let users = fx.path("users");
    fs::create_dir(&users).unwrap();
    for (user, n) in [("alice", 1), ("bob", 2)] {
        let conn = Connection::open(users.join(format!("{}.sqlite", user))).unwrap();
        conn.execute_batch(&format!("CREATE TABLE mine (n INTEGER); INSERT INTO mine VALUES ({});", n))
            .unwrap();
    }

    let run = |user: &str| {
        fx.zpk()
            .args(["query", "--per-user-dir", users.to_str().unwrap(), "--plain", "--json"])
            .args(["--user", user, "SELECT n FROM mine"])
            .output()
            .unwrap()
    };
    // --json and --plain conflict
    assert_eq!(run("alice").status.code(), Some(2));

    let run = |user: &str| {
        fx.zpk()
            .args(["query", "--per-user-dir", users.to_str().unwrap(), "--json"])
            .args(["--user", user, "SELECT n FROM mine"])
            .output()
            .unwrap()
    };
    let alice: serde_json::Value = serde_json::from_str(&stdout(&run("alice"))).unwrap();
    let bob: serde_json::Value = serde_json::from_str(&stdout(&run("bob"))).unwrap();
    assert_eq!(alice["rows"], serde_json::json!([[1]]));
    assert_eq!(bob["rows"], serde_json::json!([[2]]));
}

// ---------------------------------------------------------------------------
// query: refusals and errors
// ---------------------------------------------------------------------------

#[test]
fn include_is_refused() {
    let fx = Fixture::new();
    let output = fx.query("#include </etc/passwd>\nSELECT 1", &[]);
    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).contains("#include is forbidden"), "{}", stderr(&output));
    assert!(stdout(&output).is_empty());
}

#[test]
fn pragma_is_refused() {
    let fx = Fixture::new();
    let output = fx.query("#pragma once\nSELECT 1", &[]);
    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).contains("unknown directive #pragma"), "{}", stderr(&output));
    assert!(stderr(&output).contains("hint:"));
}

#[test]
fn malformed_template() {
    let fx = Fixture::new();
    let output = fx.query("#if 1\nSELECT 1", &[]);
    assert_eq!(output.status.code(), Some(11));
    assert!(stderr(&output).starts_with("error: "));
}

#[test]
fn query_error_block() {
    let fx = Fixture::new();
    let output = fx.query("SELECT * FROM nope", &[]);
    assert_eq!(output.status.code(), Some(20));
    assert_eq!(
        stdout(&output),
        "```diff\n-Error (SQLITE_ERROR)-\n``````\nno such table: nope\n``````sql\nSELECT * FROM nope\n```\n"
    );
    // Already reported on stdout
    assert!(!stderr(&output).contains("error:"));
}

#[test]
fn pragma_line_counts_from_query() {
    let fx = Fixture::new();
    let output = fx.query("SELECT 1\n#pragma once", &[]);
    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).starts_with("error: line 2: "), "{}", stderr(&output));
}

#[test]
fn second_statement_is_refused() {
    let fx = Fixture::new();
    let output = fx.query("SELECT 1; DELETE FROM users", &[]);
    assert_eq!(output.status.code(), Some(20));
    assert!(stdout(&output).starts_with("```diff\n-Error-\n"), "{}", stdout(&output));

    let conn = Connection::open(fx.path("zoo.sqlite")).unwrap();
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)).unwrap();
    assert_eq!(n, 2);
}

#[test]
fn directives_only_is_no_statement() {
    let fx = Fixture::new();
    let output = fx.query("#define X 1", &[]);
    assert_eq!(output.status.code(), Some(20));
    assert!(stdout(&output).contains("no statement to execute"), "{}", stdout(&output));
}

#[test]
fn writes_are_rejected() {
    let fx = Fixture::new();
    let output = fx.query("DELETE FROM users", &[]);
    assert_eq!(output.status.code(), Some(20));
    assert!(stdout(&output).contains("-Error (SQLITE_READONLY)-"), "{}", stdout(&output));

    let conn = Connection::open(fx.path("zoo.sqlite")).unwrap();
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)).unwrap();
    assert_eq!(n, 2);
}

#[test]
fn missing_snapshot_writes_trace() {
    let fx = Fixture::new();
    let traces = fx.path("traces");
    fs::write(
        fx.path("settings.json"),
        format!("{{\n  // traces go here\n  \"errors.traceDir\": {:?}\n}}", traces.to_str().unwrap()),
    )
    .unwrap();

    let missing = fx.path("missing.sqlite");
    let output = fx
        .zpk()
        .args(["query", "--db", missing.to_str().unwrap(), "--plain", "SELECT 1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(21));
    assert!(stdout(&output).starts_with("```diff\n-Internal error-\n``````\n"));
    assert!(!missing.exists());

    let files: Vec<_> = fs::read_dir(&traces).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("error_") && name.ends_with(".txt"), "{}", name);
    let body = fs::read_to_string(&files[0]).unwrap();
    assert!(body.contains("caused by: "), "{}", body);
}

#[test]
fn no_snapshot_configured() {
    let fx = Fixture::new();
    let output = fx.zpk().args(["query", "SELECT 1"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("no snapshot configured"));
    assert!(stderr(&output).contains("hint:  pass --db"));
}

#[test]
fn settings_database_is_used() {
    let fx = Fixture::new();
    fs::write(
        fx.path("settings.json"),
        format!("{{ \"storage.database\": {:?} }}", fx.db()),
    )
    .unwrap();
    let output = fx
        .zpk()
        .args(["query", "--plain", "SELECT COUNT(*) AS n FROM animals"])
        .output()
        .unwrap();
    assert_success(&output);
    assert!(stdout(&output).contains("\n3\n"));
}

#[test]
fn context_file_replaces_builtin() {
    let fx = Fixture::new();
    let ctx = fx.path("ctx.h");
    fs::write(&ctx, "#define WHO '{user_name}'\n").unwrap();
    let output = fx.query("SELECT WHO AS who", &["--name", "carol", "--context", ctx.to_str().unwrap()]);
    assert_success(&output);
    assert!(stdout(&output).contains("carol"));

    // ME is no longer defined: it stays an identifier and the engine rejects it
    let output = fx.query("SELECT ME", &["--context", ctx.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(20));
}

// ---------------------------------------------------------------------------
// expand
// ---------------------------------------------------------------------------

#[test]
fn expand_without_context() {
    let fx = Fixture::new();
    let output = fx
        .zpk()
        .args(["expand", "--no-context", "#define TWICE(x) x + x\nSELECT TWICE(3)"])
        .output()
        .unwrap();
    assert_success(&output);
    assert_eq!(stdout(&output), "SELECT 3 + 3\n");
}

#[test]
fn expand_with_builtin_context() {
    let fx = Fixture::new();
    let output = fx.zpk().args(["expand", "--name", "o'hara", "SELECT ME"]).output().unwrap();
    assert_success(&output);
    assert_eq!(stdout(&output).trim_end(), "SELECT 'o''hara'");
}

#[test]
fn expand_refuses_include() {
    let fx = Fixture::new();
    let output = fx
        .zpk()
        .args(["expand", "--no-context", "#import \"x.h\""])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).contains("#import is forbidden"));
}
