//! Request loop tests over in-memory input and output.

use std::fs;

use serde_json::{json, Value};
use tempfile::TempDir;
use tugimport::command::{serve, ServeExit, ServeOptions};

fn run(requests: &[Value]) -> (ServeExit, Vec<Value>) {
    let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
    let mut output = Vec::new();
    let exit = serve(input.as_bytes(), &mut output, ServeOptions::default()).unwrap();
    let lines = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (exit, lines)
}

/// Responses without progress notifications.
fn replies(lines: &[Value]) -> Vec<&Value> {
    lines.iter().filter(|l| l.get("progress").is_none()).collect()
}

#[test]
fn full_session() {
    let ws = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    fs::create_dir_all(ws.path().join("pkg")).unwrap();
    fs::write(ws.path().join("pkg/__init__.py"), "").unwrap();
    fs::write(ws.path().join("pkg/mod.py"), "def foo():\n    pass\n").unwrap();
    let main = ws.path().join("main.py");
    fs::write(&main, "import sys\n\nfoo()\n").unwrap();

    let (exit, lines) = run(&[
        json!({
            "requestId": 1,
            "action": "configure",
            "paths": [ws.path()],
            "tempPath": data.path(),
            "useRuntimePaths": false,
        }),
        json!({"requestId": 2, "action": "getSymbols", "text": "foo"}),
        json!({"requestId": 3, "action": "importSuggestions", "sourceFile": main, "unresolvedName": "foo"}),
        json!({"requestId": 4, "action": "insertImport", "sourceFile": main, "module": "pkg.mod", "symbol": "foo"}),
        json!({"requestId": 5, "action": "changeFiles", "files": [ws.path().join("pkg/mod.py")]}),
    ]);
    assert_eq!(exit, ServeExit::EndOfInput);

    assert!(lines
        .iter()
        .any(|l| l["progress"].as_str().is_some_and(|p| p.starts_with("Scan files..."))));

    let replies = replies(&lines);
    assert_eq!(replies.len(), 5);

    assert_eq!(replies[0]["id"], "1");
    assert_eq!(replies[0]["success"], true);
    assert_eq!(replies[0]["reused"], false);

    assert_eq!(replies[1]["id"], "2");
    assert_eq!(
        replies[1]["items"],
        json!([{"symbol": "foo", "module": "pkg.mod", "kind": "F"}])
    );

    assert_eq!(replies[2]["items"][0]["module"], "pkg.mod");

    assert_eq!(replies[3]["id"], "4");
    assert_eq!(replies[3]["fromLine"], 1);
    assert_eq!(replies[3]["endLine"], 1);
    assert_eq!(replies[3]["text"], "\nfrom pkg.mod import foo\n");

    assert_eq!(replies[4]["id"], "5");
    assert_eq!(replies[4]["success"], true);
}

#[test]
fn errors_are_tagged_and_the_loop_continues() {
    let (exit, lines) = run(&[
        json!({"action": "getSymbols", "text": "foo"}),
        json!({"requestId": "q", "action": "getSymbols", "text": "foo"}),
        json!({"requestId": "c", "action": "configure", "paths": [], "useRuntimePaths": false}),
        json!({"requestId": "z", "action": "rebuildIndex"}),
    ]);
    assert_eq!(exit, ServeExit::EndOfInput);
    assert_eq!(lines.len(), 4);

    assert!(lines[0].get("id").is_none());
    assert_eq!(lines[0]["kind"], "user_error");

    assert_eq!(lines[1]["id"], "q");
    assert_eq!(lines[1]["error"], true);
    assert!(lines[1]["message"].as_str().unwrap().contains("configure"));

    assert_eq!(lines[2]["id"], "c");
    assert_eq!(lines[2]["code"], 2);

    assert_eq!(lines[3]["id"], "z");
    assert_eq!(lines[3]["kind"], "user_error");
}
