// CLI integration tests: JSON output, error envelopes, and on-disk effects.
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{Value, json};

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_fixtab");
    let mut command = Command::new(exe);
    command.env_remove("RUST_LOG");
    command
}

fn parse_json_line(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    serde_json::from_str(line).expect("valid json")
}

fn run(args: &[&str]) -> Output {
    cmd().args(args).output().expect("run fixtab")
}

fn staff_table(dir: &Path) -> PathBuf {
    let path = dir.join("staff.json");
    let fixture = json!({
        "columns": [
            {"name": "NAME", "type": "C", "width": 10},
            {"name": "CITY", "type": "C", "width": 8},
            {"name": "AGE", "type": "N", "width": 3}
        ],
        "rows": [
            {"values": {"NAME": "Smith", "CITY": "Paris", "AGE": 40}},
            {"deleted": true, "values": {"NAME": "Adams", "CITY": "Lyon", "AGE": 31}},
            {"values": {"NAME": "Smithers", "CITY": "Paris", "AGE": 52}},
            {"values": {"NAME": "Baker", "CITY": "Nice", "AGE": 23}}
        ],
        "indexes": [{"name": "NAME", "column": "NAME"}]
    });
    std::fs::write(&path, serde_json::to_vec(&fixture).expect("encode")).expect("write");
    path
}

#[test]
fn info_reports_header_columns_and_tags() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = staff_table(temp.path());

    let info = run(&["info", table.to_str().expect("path")]);
    assert!(info.status.success());
    let value = parse_json_line(&info.stdout);
    assert_eq!(value["records"], 4);
    assert_eq!(value["deleted"], 1);
    assert_eq!(value["codepage"]["ms_codepage"], 1252);
    assert_eq!(value["columns"][0]["name"], "NAME");
    assert_eq!(value["tags"][0]["name"], "NAME");
    assert_eq!(value["has_memo"], false);
}

#[test]
fn rows_follow_the_requested_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = staff_table(temp.path());
    let path = table.to_str().expect("path");

    let physical = parse_json_line(&run(&["rows", path, "--skip-deleted"]).stdout);
    assert_eq!(physical["count"], 3);
    assert_eq!(physical["rows"][1]["values"]["NAME"], "Smithers");

    let indexed = parse_json_line(&run(&["rows", path, "--tag", "name", "--limit", "2"]).stdout);
    let recnos: Vec<_> = indexed["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|row| row["recno"].as_u64().expect("recno"))
        .collect();
    assert_eq!(recnos, vec![2, 4]);

    let reversed = parse_json_line(&run(&["rows", path, "--reverse", "--limit", "1"]).stdout);
    assert_eq!(reversed["rows"][0]["recno"], 4);
}

#[test]
fn seek_reports_classified_outcomes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = staff_table(temp.path());
    let path = table.to_str().expect("path");

    let found = parse_json_line(&run(&["seek", path, "Smith"]).stdout);
    assert_eq!(found["result"], "Success");
    assert_eq!(found["recno"], 1);
    assert_eq!(found["row"]["values"]["CITY"], "Paris");

    let after = parse_json_line(&run(&["seek", path, "Carter"]).stdout);
    assert_eq!(after["result"], "After");
    assert_eq!(after["found"], false);

    let all = parse_json_line(&run(&["seek", path, "Smith", "--all"]).stdout);
    assert_eq!(all["count"], 2);
    assert_eq!(all["tag"], "NAME");

    let missing = run(&["seek", path, "Smith", "--tag", "ZIP"]);
    assert_eq!(missing.status.code(), Some(3));
    let err = parse_json_line(&missing.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");
    assert!(err["error"]["hint"].as_str().expect("hint").contains("NAME"));
}

#[test]
fn where_and_grep_search_rows() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = staff_table(temp.path());
    let path = table.to_str().expect("path");

    let result = parse_json_line(&run(&["where", path, "CITY = 'Paris' .AND. AGE > 45"]).stdout);
    assert_eq!(result["total_matched"], 1);
    assert_eq!(result["matches"][0]["recno"], 3);

    let count = parse_json_line(&run(&["where", path, ".NOT. DELETED()", "--count"]).stdout);
    assert_eq!(count["count"], 3);

    let bad = run(&["where", path, "AGE +"]);
    assert_eq!(bad.status.code(), Some(14));
    assert_eq!(parse_json_line(&bad.stderr)["error"]["kind"], "Parse");

    let grep = parse_json_line(&run(&["grep", path, "NAME", "^smith", "-i"]).stdout);
    assert_eq!(grep["total_matched"], 2);

    let indexed = parse_json_line(&run(&["grep", path, "NAME", "^Smith"]).stdout);
    assert_eq!(indexed["index"], "NAME");
    let scanned = parse_json_line(&run(&["grep", path, "NAME", "^Smith", "--no-index"]).stdout);
    assert_eq!(scanned["index"], Value::Null);
    assert_eq!(indexed["matches"], scanned["matches"]);

    let exists = parse_json_line(&run(&["grep", path, "CITY", "^Rome", "--exists"]).stdout);
    assert_eq!(exists["exists"], false);
}

#[test]
fn delete_recall_and_pack_rewrite_the_table() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = staff_table(temp.path());
    let path = table.to_str().expect("path");

    let delete = run(&["delete", path, "4"]);
    assert!(delete.status.success());
    let listed = parse_json_line(&run(&["deleted", "list", path]).stdout);
    assert_eq!(listed["deleted"], json!([2, 4]));

    assert!(run(&["recall", path, "2"]).status.success());
    let counts = parse_json_line(&run(&["deleted", "count", path]).stdout);
    assert_eq!(counts["deleted"], 1);
    assert_eq!(counts["active"], 3);

    let pack = parse_json_line(&run(&["pack", path]).stdout);
    assert_eq!(pack["removed"], 1);
    assert_eq!(pack["records"], 3);

    let out_of_range = run(&["delete", path, "9"]);
    assert_eq!(out_of_range.status.code(), Some(12));
}

#[test]
fn failed_delete_leaves_the_table_untouched() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = staff_table(temp.path());
    let path = table.to_str().expect("path");
    let before = std::fs::read(&table).expect("read");

    let output = run(&["delete", path, "1", "99"]);
    assert_eq!(output.status.code(), Some(12));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "InvalidArgument");
    assert!(err["error"]["message"].as_str().expect("message").contains("99"));

    assert_eq!(std::fs::read(&table).expect("read"), before);
    let listed = parse_json_line(&run(&["deleted", "list", path]).stdout);
    assert_eq!(listed["deleted"], json!([2]));

    let recall = run(&["recall", path, "2", "0"]);
    assert_eq!(recall.status.code(), Some(12));
    let listed = parse_json_line(&run(&["deleted", "list", path]).stdout);
    assert_eq!(listed["deleted"], json!([2]));
}

#[test]
fn usage_and_missing_tables_map_to_exit_codes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("nope.json");

    let output = run(&["info", missing.to_str().expect("path")]);
    assert_eq!(output.status.code(), Some(3));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");
    assert!(err["error"]["path"].as_str().expect("path").ends_with("nope.json"));

    let bogus = run(&["frobnicate"]);
    assert_eq!(bogus.status.code(), Some(2));
    assert_eq!(parse_json_line(&bogus.stderr)["error"]["kind"], "Usage");

    let completion = run(&["completion", "bash"]);
    assert!(completion.status.success());
    assert!(String::from_utf8_lossy(&completion.stdout).contains("fixtab"));
}
