//! End-to-end tests for grove-indexer

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use grove_core::{CancellationFlag, CodeNode, EdgeKind, GraphBuilder, GraphError, Language, NodeKind, ParseOptions};
use serde::Deserialize;

use crate::test_utils::{create_repo_with_structure, create_ts_inheritance_repo};
use crate::walk::{RUBY_PROFILE, SourceFile, SourceProfile};
use crate::*;

fn node_ids(schema: &grove_core::CodeGraphSchema) -> Vec<&str> {
    schema.nodes.iter().map(|n| n.id.as_str()).collect()
}

#[test]
fn test_ts_inheritance_across_files() {
    let repo = create_ts_inheritance_repo("./a");
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    assert_eq!(schema.language, Language::TypeScript);
    assert_eq!(node_ids(&schema), vec!["a.ts", "a.ts#A", "b.ts", "b.ts#B"]);

    let import = schema.edges_of_kind(EdgeKind::Imports).next().unwrap();
    assert_eq!(import.source, "b.ts");
    assert_eq!(import.target, "a.ts");
    assert!(import.resolved);
    assert_eq!(import.specifier.as_deref(), Some("./a"));

    let extends = schema.edges_of_kind(EdgeKind::Extends).next().unwrap();
    assert_eq!(extends.source, "b.ts#B");
    assert_eq!(extends.target, "a.ts#A");
    assert!(extends.resolved);

    let class = schema.node("b.ts#B").unwrap();
    assert_eq!(class.kind, NodeKind::Class);
    assert!(class.exported);
}

#[test]
fn test_symbol_node_shape() {
    let repo = create_ts_inheritance_repo("./a");
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();
    let symbols: Vec<_> = schema.nodes.iter().filter(|n| n.kind != NodeKind::File).collect();

    insta::assert_json_snapshot!(symbols, @r###"
    [
      {
        "id": "a.ts#A",
        "kind": "class",
        "name": "A",
        "displayName": "A",
        "filePath": "a.ts",
        "line": 1,
        "endLine": 1,
        "language": "typescript",
        "exported": true
      },
      {
        "id": "b.ts#B",
        "kind": "class",
        "name": "B",
        "displayName": "B",
        "filePath": "b.ts",
        "line": 3,
        "endLine": 3,
        "language": "typescript",
        "exported": true
      }
    ]
    "###);
}

#[test]
fn test_external_package_becomes_placeholder() {
    let repo = create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("a.ts", "import { thing } from 'some-external-package/deep/path';\n"),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    let import = schema.edges_from("a.ts").next().unwrap();
    assert_eq!(import.target, "external:some-external-package");
    assert!(!import.resolved);
    assert!(schema.node(&import.target).is_none());
}

#[test]
fn test_unknown_base_class_is_external() {
    let repo = create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("a.ts", "import { Base } from 'framework';\nexport class A extends Base {}\n"),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    let extends = schema.edges_of_kind(EdgeKind::Extends).next().unwrap();
    assert_eq!(extends.source, "a.ts#A");
    assert!(!extends.resolved);
    assert!(extends.target.starts_with("external:"));
}

#[test]
fn test_schema_invariants() {
    let repo = create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("src/index.ts", "export * from './models';\nimport { Service } from './service';\n"),
        ("src/models.ts", "export interface Model { id: string }\nexport class User implements Model { id = '' }\n"),
        (
            "src/service.ts",
            "import { User } from './models';\nimport fs from 'fs';\nexport class Service {}\nexport function helper() {}\n",
        ),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    let ids: HashSet<_> = schema.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids.len(), schema.nodes.len(), "node ids must be unique");

    let edge_ids: HashSet<_> = schema.edges.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(edge_ids.len(), schema.edges.len(), "edge ids must be unique");

    for edge in &schema.edges {
        assert!(ids.contains(edge.source.as_str()), "dangling source {}", edge.source);
        assert_eq!(edge.resolved, ids.contains(edge.target.as_str()), "edge {}", edge.id);
        if !edge.resolved {
            assert!(edge.target.starts_with("external:"));
        }
    }

    for node in &schema.nodes {
        assert!(!node.file_path.starts_with('/'));
        assert!(!node.file_path.contains('\\'));
        assert_ne!(node.language, Language::Mixed);
    }

    assert!(schema.edges.iter().any(|e| e.kind == EdgeKind::Exports && e.target == "src/models.ts"));
    assert!(schema.edges.iter().any(|e| e.kind == EdgeKind::Implements && e.target == "src/models.ts#Model"));
    assert!(schema.edges.iter().any(|e| e.target == "external:fs"));
}

#[test]
fn test_parse_is_idempotent() {
    let repo = create_ts_inheritance_repo("./a");
    let first = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();
    let second = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    assert_eq!(first.nodes, second.nodes);
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.parser_version, second.parser_version);
}

#[test]
fn test_test_files_are_opt_in() {
    let repo = create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("src/a.ts", "export class A {}\n"),
        ("src/a.test.ts", "import { A } from './a';\n"),
        ("__tests__/b.ts", "export const b = () => 1;\n"),
    ]);

    let without = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();
    assert!(without.node("src/a.test.ts").is_none());
    assert!(without.node("__tests__/b.ts").is_none());

    let with = parse_code_graph(repo.path(), &ParseOptions::default().with_tests(true)).unwrap();
    assert!(with.node("src/a.test.ts").is_some());
    assert!(with.node("__tests__/b.ts").is_some());
}

#[test]
fn test_type_imports_are_opt_in() {
    let repo = create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("a.ts", "export interface Shape {}\n"),
        ("b.ts", "import type { Shape } from './a';\n"),
    ]);

    let without = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();
    assert_eq!(without.edges_from("b.ts").count(), 0);

    let with = parse_code_graph(repo.path(), &ParseOptions::default().with_type_imports(true)).unwrap();
    let edge = with.edges_from("b.ts").next().unwrap();
    assert_eq!(edge.target, "a.ts");
}

#[test]
fn test_exclude_patterns_and_dependency_dirs() {
    let repo = create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("src/a.ts", "export class A {}\n"),
        ("src/generated/g.ts", "export class G {}\n"),
        ("node_modules/pkg/index.js", "module.exports = {};\n"),
    ]);

    let options = ParseOptions::default().exclude("src/generated/**");
    let schema = parse_code_graph(repo.path(), &options).unwrap();
    assert_eq!(node_ids(&schema), vec!["src/a.ts", "src/a.ts#A"]);

    let options = ParseOptions::default().with_node_modules(true);
    let schema = parse_code_graph(repo.path(), &options).unwrap();
    assert!(schema.node("node_modules/pkg/index.js").is_some());
}

#[test]
fn test_tsconfig_path_alias() {
    let repo = create_repo_with_structure(&[
        (
            "tsconfig.json",
            r#"{
                // aliases
                "compilerOptions": {
                    "baseUrl": ".",
                    "paths": { "@app/*": ["src/*"] },
                },
            }"#,
        ),
        ("src/core/base.ts", "export abstract class Base {}\n"),
        ("src/feature.ts", "import { Base } from '@app/core/base';\nexport class Feature extends Base {}\n"),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    let import = schema.edges_of_kind(EdgeKind::Imports).next().unwrap();
    assert_eq!(import.target, "src/core/base.ts");
    assert!(import.resolved);

    let extends = schema.edges_of_kind(EdgeKind::Extends).next().unwrap();
    assert_eq!(extends.target, "src/core/base.ts#Base");
}

#[test]
fn test_javascript_repo() {
    let repo = create_repo_with_structure(&[
        ("package.json", "{}"),
        ("lib/base.js", "class Base {}\nmodule.exports = { Base };\n"),
        ("lib/child.js", "const { Base } = require('./base');\nclass Child extends Base {}\n"),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    assert_eq!(schema.language, Language::JavaScript);
    let import = schema.edges_from("lib/child.js").next().unwrap();
    assert_eq!(import.target, "lib/base.js");
    assert!(schema.node("lib/child.js#Child").is_some());
}

#[test]
fn test_invalid_utf8_is_skipped() {
    let repo = create_repo_with_structure(&[("tsconfig.json", "{}"), ("good.ts", "export class Good {}\n")]);
    std::fs::write(repo.path().join("bad.ts"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();
    assert!(schema.node("good.ts#Good").is_some());
    assert!(schema.node("bad.ts").is_none());
    assert_eq!(schema.skipped_files.len(), 1);
    assert_eq!(schema.skipped_files[0].path, "bad.ts");
}

#[test]
fn test_php_without_runtime_is_unavailable() {
    let repo = create_repo_with_structure(&[("composer.json", "{}"), ("src/A.php", "<?php class A {}\n")]);
    let options = ParseOptions {
        php_binary: Some(PathBuf::from("/nonexistent/grove-php")),
        ..Default::default()
    };

    let err = parse_code_graph(repo.path(), &options).unwrap_err();
    match err {
        GraphError::RuntimeUnavailable { runtime, hint, .. } => {
            assert_eq!(runtime, "php");
            assert!(!hint.is_empty());
        }
        other => panic!("expected RuntimeUnavailable, got {other:?}"),
    }

    let safe = parse_code_graph_safe(repo.path(), &options);
    assert!(!safe.success);
    assert!(safe.data.is_none());
    assert!(safe.message.unwrap().contains("php"));
}

#[test]
fn test_ruby_without_runtime_is_unavailable() {
    let repo = create_repo_with_structure(&[("Gemfile", ""), ("lib/a.rb", "class A; end\n")]);
    let options = ParseOptions {
        ruby_binary: Some(PathBuf::from("/nonexistent/grove-ruby")),
        ..Default::default()
    };

    assert!(matches!(
        parse_code_graph(repo.path(), &options),
        Err(GraphError::RuntimeUnavailable { .. })
    ));
}

#[test]
fn test_mixed_is_unsupported() {
    let repo = create_repo_with_structure(&[("a.ts", "export class A {}\n")]);
    let options = ParseOptions::default().with_language(Language::Mixed);

    assert!(matches!(
        parse_code_graph(repo.path(), &options),
        Err(GraphError::LanguageUnsupported(Language::Mixed))
    ));
}

#[test]
fn test_forced_language_skips_detection() {
    let repo = create_repo_with_structure(&[("Gemfile", ""), ("web/app.ts", "export class App {}\n")]);
    let options = ParseOptions::default().with_language(Language::TypeScript);

    let schema = parse_code_graph(repo.path(), &options).unwrap();
    assert_eq!(schema.language, Language::TypeScript);
    assert!(schema.node("web/app.ts#App").is_some());
}

#[test]
fn test_missing_root_is_malformed() {
    let repo = create_repo_with_structure(&[]);
    let missing = repo.path().join("nope");

    assert!(matches!(
        parse_code_graph(&missing, &ParseOptions::default()),
        Err(GraphError::MalformedProject { .. })
    ));
    assert!(!detect_language_safe(&missing).success);
}

#[test]
fn test_cancelled_before_start() {
    let repo = create_ts_inheritance_repo("./a");
    let cancel = CancellationFlag::new();
    cancel.cancel();

    assert!(matches!(
        parse_code_graph_with_cancel(repo.path(), &ParseOptions::default(), &cancel),
        Err(GraphError::Cancelled)
    ));
}

#[tokio::test]
async fn test_async_parse() {
    let repo = create_ts_inheritance_repo("./a");
    let schema = parse_code_graph_async(repo.path().to_path_buf(), ParseOptions::default(), CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(schema.nodes.len(), 4);
    assert_eq!(schema.edges.len(), 2);
}

#[test]
fn test_backend_selection() {
    let repo = create_repo_with_structure(&[]);
    let options = ParseOptions::default();

    let backend = Backend::for_language(Language::JavaScript, &options, repo.path()).unwrap();
    assert_eq!(backend.language(), Language::JavaScript);
    assert!(backend.probe().is_available());
    assert!(backend.ensure_available().is_ok());

    let backend = Backend::for_language(Language::Php, &options, repo.path()).unwrap();
    assert_eq!(backend.language(), Language::Php);
}

/// Runs every `.rb` file as a shell script and reads class names from its stdout.
struct ShellRuntime;

#[derive(Deserialize)]
struct ShellFacts {
    classes: Vec<String>,
}

impl ScriptRuntime for ShellRuntime {
    type Facts = ShellFacts;

    fn name(&self) -> &'static str {
        "sh"
    }

    fn language(&self) -> Language {
        Language::Ruby
    }

    fn profile(&self) -> &'static SourceProfile {
        &RUBY_PROFILE
    }

    fn probe(&self) -> Availability {
        Availability::Available
    }

    fn install_hint(&self) -> &'static str {
        "install a POSIX shell"
    }

    fn invocation(&self, _root: &Path, file: &SourceFile) -> Invocation {
        Invocation::new("sh").arg(&file.absolute)
    }

    fn assemble(&self, builder: &mut GraphBuilder, files: &[(SourceFile, ShellFacts)]) {
        for (file, facts) in files {
            builder.add_node(CodeNode::file(&file.relative, Language::Ruby));
            for class in &facts.classes {
                builder.add_node(CodeNode::symbol(&file.relative, class, class, NodeKind::Class, Language::Ruby));
            }
        }
    }
}

#[cfg(unix)]
#[test]
fn test_subprocess_failures_leave_a_partial_graph() {
    let repo = create_repo_with_structure(&[
        ("good.rb", "echo '{\"classes\": [\"Good\"]}'\n"),
        ("crash.rb", "echo 'boom' >&2\nexit 3\n"),
        ("junk.rb", "echo 'this is not json'\n"),
        ("hang.rb", "exec sleep 10\n"),
    ]);
    let options = ParseOptions {
        timeout_secs: Some(1),
        jobs: Some(4),
        ..Default::default()
    };

    let backend = SubprocessBackend::new(ShellRuntime);
    let schema = backend
        .parse(repo.path(), &options, &CancellationFlag::new())
        .unwrap();

    assert_eq!(node_ids(&schema), vec!["good.rb", "good.rb#Good"]);

    let mut skipped: Vec<(&str, &str)> = schema
        .skipped_files
        .iter()
        .map(|s| (s.path.as_str(), s.reason.as_str()))
        .collect();
    skipped.sort();
    assert_eq!(skipped.len(), 3);

    assert_eq!(skipped[0].0, "crash.rb");
    assert!(skipped[0].1.contains("interpreter exited with"), "{}", skipped[0].1);
    assert!(skipped[0].1.contains("boom"));

    assert_eq!(skipped[1].0, "hang.rb");
    assert!(skipped[1].1.contains("timed out after 1s"), "{}", skipped[1].1);

    assert_eq!(skipped[2].0, "junk.rb");
    assert!(skipped[2].1.contains("unreadable extractor output"), "{}", skipped[2].1);
}

#[cfg(unix)]
#[test]
fn test_subprocess_cancel_returns_no_schema() {
    let repo = create_repo_with_structure(&[("slow.rb", "exec sleep 10\n")]);
    let cancel = CancellationFlag::new();
    let trigger = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(200));
        trigger.cancel();
    });

    let backend = SubprocessBackend::new(ShellRuntime);
    let result = backend.parse(repo.path(), &ParseOptions::default(), &cancel);
    canceller.join().unwrap();

    assert!(matches!(result, Err(GraphError::Cancelled)));
}

#[test]
fn test_commonjs_inheritance_resolves() {
    let repo = create_repo_with_structure(&[
        ("package.json", "{}"),
        ("lib/base.js", "class Base {}\nmodule.exports = { Base };\n"),
        ("lib/shape.js", "class Shape {}\nmodule.exports = Shape;\n"),
        (
            "lib/child.js",
            "const { Base } = require('./base');\nconst Shape = require('./shape');\nclass Child extends Base {}\nclass Square extends Shape {}\nmodule.exports = { Child, Square };\n",
        ),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    assert!(schema.node("lib/base.js#Base").unwrap().exported);

    let extends: Vec<(&str, &str, bool)> = schema
        .edges_of_kind(EdgeKind::Extends)
        .map(|e| (e.source.as_str(), e.target.as_str(), e.resolved))
        .collect();
    assert_eq!(
        extends,
        vec![
            ("lib/child.js#Child", "lib/base.js#Base", true),
            ("lib/child.js#Square", "lib/shape.js#Shape", true),
        ]
    );
}

#[test]
fn test_inheritance_through_barrel_file() {
    let repo = create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("src/models/user.ts", "export class User {}\n"),
        ("src/models/role.ts", "export class Role {}\n"),
        ("src/models/index.ts", "export { User } from './user';\nexport * from './role';\n"),
        (
            "src/admin.ts",
            "import { User, Role } from './models';\nexport class Admin extends User {}\nexport class Owner extends Role {}\n",
        ),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    let import = schema.edges_from("src/admin.ts").next().unwrap();
    assert_eq!(import.target, "src/models/index.ts");

    let admin = schema.edges_from("src/admin.ts#Admin").next().unwrap();
    assert_eq!(admin.target, "src/models/user.ts#User");
    assert!(admin.resolved);

    let owner = schema.edges_from("src/admin.ts#Owner").next().unwrap();
    assert_eq!(owner.target, "src/models/role.ts#Role");
}

#[test]
fn test_unexported_class_is_not_linked() {
    let repo = create_repo_with_structure(&[
        ("tsconfig.json", "{}"),
        ("a.ts", "class Hidden {}\nexport class Shown {}\n"),
        ("b.ts", "import { Hidden } from './a';\nexport class B extends Hidden {}\n"),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    let extends = schema.edges_of_kind(EdgeKind::Extends).next().unwrap();
    assert_eq!(extends.target, "external:Hidden");
    assert!(!extends.resolved);
}

#[test]
fn test_tsconfig_extends_list() {
    let repo = create_repo_with_structure(&[
        ("base.json", r#"{ "compilerOptions": { "strict": true } }"#),
        (
            "tsconfig.json",
            r#"{ "extends": ["./base.json"], "compilerOptions": { "baseUrl": ".", "paths": { "@app/*": ["src/*"] } } }"#,
        ),
        ("src/core.ts", "export class Core {}\n"),
        ("src/feature.ts", "import { Core } from '@app/core';\nexport class F extends Core {}\n"),
    ]);
    let schema = parse_code_graph(repo.path(), &ParseOptions::default()).unwrap();

    let import = schema.edges_of_kind(EdgeKind::Imports).next().unwrap();
    assert_eq!(import.target, "src/core.ts");
    let extends = schema.edges_of_kind(EdgeKind::Extends).next().unwrap();
    assert_eq!(extends.target, "src/core.ts#Core");
}
