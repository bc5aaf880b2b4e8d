use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn write_fixture(dir: &Path) -> PathBuf {
    let path = dir.join("task.json");
    let fixture = json!({
        "project": "movies",
        "task": "transform",
        "tree": {
            "type": "root",
            "id": "root",
            "rules": {
                "uriRule": {"type": "uri", "id": "rootUri", "pattern": "ex:person/{id}"},
                "typeRules": [{"type": "type", "typeUri": "ex:Person"}],
                "propertyRules": [
                    {"type": "direct", "id": "city", "sourcePath": "city",
                     "metadata": {"label": "City"},
                     "mappingTarget": {"uri": "ex:city"}},
                    {"type": "object", "id": "address", "sourcePath": "address",
                     "mappingTarget": {"uri": "ex:address"},
                     "rules": {
                        "typeRules": [{"type": "type", "typeUri": "ex:Address"}],
                        "propertyRules": [
                            {"type": "direct", "id": "street", "sourcePath": "street",
                             "mappingTarget": {"uri": "ex:street"}}
                        ]
                     }}
                ]
            }
        },
        "sourcePaths": [
            {"path": "firstName", "pathType": "value", "alreadyMapped": false}
        ]
    });
    fs::write(&path, serde_json::to_vec_pretty(&fixture).unwrap()).unwrap();
    path
}

struct Workspace {
    _dir: TempDir,
    fixture: PathBuf,
    clipboard: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let fixture = write_fixture(dir.path());
        let clipboard = dir.path().join("clipboard.json");
        Self {
            _dir: dir,
            fixture,
            clipboard,
        }
    }

    #[allow(deprecated)]
    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("mapping-editor").expect("binary");
        for key in [
            "MAPPING_EDITOR_BASE_URL",
            "MAPPING_EDITOR_PROJECT",
            "MAPPING_EDITOR_TASK",
            "MAPPING_EDITOR_BATCH_CONCURRENCY",
            "MAPPING_EDITOR_CLIPBOARD",
        ] {
            cmd.env_remove(key);
        }
        cmd.arg("--quiet")
            .arg("--fixture")
            .arg(&self.fixture)
            .arg("--clipboard")
            .arg(&self.clipboard);
        cmd
    }

    fn run(&self, args: &[&str]) -> Value {
        let output = self.command().args(args).output().expect("command run");
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("valid json")
    }

    fn root_rule_ids(&self) -> Vec<String> {
        let fixture: Value = serde_json::from_slice(&fs::read(&self.fixture).unwrap()).unwrap();
        fixture["tree"]["rules"]["propertyRules"]
            .as_array()
            .unwrap()
            .iter()
            .map(|rule| rule["id"].as_str().unwrap().to_string())
            .collect()
    }
}

fn child_ids(node: &Value) -> Vec<String> {
    node["children"]
        .as_array()
        .map(|children| {
            children
                .iter()
                .map(|child| child["id"].as_str().unwrap().to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn tree_hides_value_rules_unless_asked() {
    let ws = Workspace::new();
    let panel = ws.run(&["tree"]);
    assert_eq!(panel["id"], "root");
    assert_eq!(child_ids(&panel), vec!["address".to_string()]);

    let panel = ws.run(&["tree", "--values"]);
    assert!(child_ids(&panel).contains(&"city".to_string()));
}

#[test]
fn tree_rows_list_the_focused_container() {
    let ws = Workspace::new();
    let rows = ws.run(&["tree", "--rows", "--rule", "address"]);
    let ids: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["street"]);
}

#[test]
fn show_reports_label_and_breadcrumbs() {
    let ws = Workspace::new();
    let shown = ws.run(&["show", "city", "--context", "http://host/app/"]);
    assert_eq!(shown["label"], "City");
    assert_eq!(shown["parent"], "root");
    assert_eq!(shown["breadcrumbs"][0]["id"], "root");
    assert_eq!(
        shown["href"],
        "http://host/app/transform/movies/transform/editor/city?inlineView=false"
    );
    assert_eq!(shown["rule"]["sourcePath"], "city");
}

#[test]
fn copy_and_paste_work_across_invocations() {
    let ws = Workspace::new();
    let copied = ws.run(&["copy", "city"]);
    assert_eq!(copied["kind"], "direct");
    assert!(ws.clipboard.exists());

    let pasted = ws.run(&["paste", "--rule", "address"]);
    let new_id = pasted["id"].as_str().unwrap().to_string();
    assert_ne!(new_id, "city");

    let shown = ws.run(&["show", &new_id]);
    assert_eq!(shown["parent"], "address");
    assert_eq!(shown["rule"]["sourcePath"], "city");

    // A plain copy can be pasted again.
    ws.run(&["paste"]);
    assert_eq!(ws.root_rule_ids().len(), 3);
}

#[test]
fn cloning_an_object_places_it_after_the_original() {
    let ws = Workspace::new();
    let cloned = ws.run(&["clone", "address"]);
    assert_eq!(cloned["kind"], "object");
    let ids = ws.root_rule_ids();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[1], "address");
    assert_eq!(ids[2], cloned["id"].as_str().unwrap());

    ws.command()
        .args(["paste"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to paste"));
}

#[test]
fn move_and_delete_are_written_back() {
    let ws = Workspace::new();
    let moved = ws.run(&["move", "0", "1"]);
    assert_eq!(moved["container"], "root");
    assert_eq!(moved["order"], json!(["address", "city"]));
    assert_eq!(ws.root_rule_ids(), vec!["address".to_string(), "city".to_string()]);

    let deleted = ws.run(&["delete", "address"]);
    assert_eq!(deleted["deleted"], "address");
    assert_eq!(ws.root_rule_ids(), vec!["city".to_string()]);

    ws.command()
        .args(["move", "0", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to move rule"));
}

#[test]
fn suggest_lists_unmapped_paths_without_vocabularies() {
    let ws = Workspace::new();
    let set = ws.run(&["suggest"]);
    assert_eq!(set["matchingSkipped"], true);
    assert_eq!(set["rows"][0]["uri"], "firstName");

    let filtered = ws.run(&["suggest", "--filter", "nothing"]);
    assert_eq!(filtered["rows"], json!([]));
}

#[test]
fn generate_creates_rules_from_pairs() {
    let ws = Workspace::new();
    let created = ws.run(&[
        "generate",
        "firstName=ex:givenName",
        "nickname",
        "--uri-prefix",
        "ex:",
    ]);
    assert_eq!(created["created"].as_array().unwrap().len(), 2);
    assert_eq!(ws.root_rule_ids().len(), 4);
}

#[test]
fn schema_describes_mapping_rules() {
    let ws = Workspace::new();
    ws.command()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("MappingRule"));
}

#[test]
#[allow(deprecated)]
fn http_backend_needs_a_project() {
    let ws = Workspace::new();
    let mut cmd = Command::cargo_bin("mapping-editor").expect("binary");
    cmd.env_remove("MAPPING_EDITOR_PROJECT")
        .env_remove("MAPPING_EDITOR_TASK")
        .env_remove("MAPPING_EDITOR_BASE_URL")
        .args(["--base-url", "http://127.0.0.1:9", "tree"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("task.project"));

    ws.command()
        .args(["show", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown rule missing"));
}
