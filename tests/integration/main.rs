//! Integration tests for the grove binary
//!
//! These tests run the built CLI against temporary repositories.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn grove(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_grove"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute grove")
}

fn write_repo(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full_path = temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full_path, content).unwrap();
    }
    temp_dir
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_cli_help() {
    let output = grove(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("parse"));
    assert!(stdout.contains("detect"));
}

#[test]
fn test_parse_typescript_repo() {
    let repo = write_repo(&[
        ("tsconfig.json", "{}"),
        ("a.ts", "export class A {}\n"),
        ("b.ts", "import { A } from './a';\nexport class B extends A {}\n"),
    ]);

    let output = grove(&["parse", path_arg(repo.path())]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let schema = stdout_json(&output);
    assert_eq!(schema["language"], "typescript");
    assert_eq!(schema["nodes"].as_array().unwrap().len(), 4);

    let edges = schema["edges"].as_array().unwrap();
    assert!(edges.iter().any(|e| e["kind"] == "extends" && e["target"] == "a.ts#A" && e["resolved"] == true));
    assert!(schema["parserVersion"].is_string());
    assert!(schema["parsedAt"].is_string());
}

#[test]
fn test_parse_writes_output_file() {
    let repo = write_repo(&[("package.json", "{}"), ("index.js", "function main() {}\n")]);
    let out = repo.path().join("graph.json");

    let output = grove(&["parse", path_arg(repo.path()), "--pretty", "--output", path_arg(&out)]);
    assert!(output.status.success());

    let schema: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(schema["language"], "javascript");
}

#[test]
fn test_config_file_and_flags_merge() {
    let repo = write_repo(&[
        ("tsconfig.json", "{}"),
        ("grove.toml", "excludePatterns = [\"gen/**\"]\n"),
        ("src/a.ts", "export class A {}\n"),
        ("src/a.test.ts", "export class ATest {}\n"),
        ("gen/g.ts", "export class G {}\n"),
    ]);

    let output = grove(&["parse", path_arg(repo.path()), "--include-tests"]);
    assert!(output.status.success());

    let schema = stdout_json(&output);
    let ids: Vec<&str> = schema["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"src/a.test.ts"));
    assert!(!ids.contains(&"gen/g.ts"));
}

#[test]
fn test_safe_parse_reports_missing_runtime() {
    let repo = write_repo(&[("Gemfile", ""), ("lib/a.rb", "class A; end\n")]);

    let output = grove(&[
        "parse",
        path_arg(repo.path()),
        "--safe",
        "--ruby-bin",
        "/nonexistent/grove-ruby",
    ]);
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["success"], false);
    assert!(result["message"].as_str().unwrap().contains("ruby"));
}

#[test]
fn test_parse_fails_on_missing_runtime() {
    let repo = write_repo(&[("composer.json", "{}"), ("a.php", "<?php class A {}\n")]);

    let output = grove(&["parse", path_arg(repo.path()), "--php-bin", "/nonexistent/grove-php"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("php"));
}

#[test]
fn test_detect() {
    let repo = write_repo(&[("Gemfile", ""), ("app.rb", "")]);

    let output = grove(&["detect", path_arg(repo.path())]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ruby");

    let missing = repo.path().join("missing");
    let output = grove(&["detect", path_arg(&missing), "--safe"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["success"], false);
}

#[test]
fn test_probe_reports_all_runtimes() {
    let output = grove(&["probe"]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    for key in ["php", "phpParser", "ruby", "rubyParserGem"] {
        assert!(report[key].is_boolean(), "missing {key}");
    }
}

#[test]
fn test_version() {
    let output = grove(&["version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    assert!(stdout.contains("grove-graph/"));
}
