//! `tsconfig.json` / `jsconfig.json` path aliases
//!
//! Only `compilerOptions.baseUrl` and `compilerOptions.paths` matter here.
//! Configs may `extends` a parent config and may contain comments and
//! trailing commas.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::paths::{join_normalized, relative_path};

const CONFIG_FILES: &[&str] = &["tsconfig.json", "jsconfig.json"];

/// Nested `extends` chains longer than this are cut off.
const MAX_EXTENDS_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompilerOptions {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    paths: Option<BTreeMap<String, Vec<String>>>,
}

/// `extends` is a single path or, since TypeScript 5.0, a list merged in order.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Extends {
    One(String),
    Many(Vec<String>),
}

impl Extends {
    fn entries(&self) -> &[String] {
        match self {
            Extends::One(path) => std::slice::from_ref(path),
            Extends::Many(paths) => paths,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TsConfig {
    #[serde(default)]
    extends: Option<Extends>,
    #[serde(default)]
    compiler_options: Option<CompilerOptions>,
}

/// Merged alias settings. Directories are repo-relative (`""` is the root).
#[derive(Debug, Clone, Default)]
struct Settings {
    base_url: Option<String>,
    /// Directory `paths` targets are relative to when no `baseUrl` is set.
    paths_base: String,
    paths: BTreeMap<String, Vec<String>>,
}

impl Settings {
    /// Values set in `later` replace the ones already here.
    fn merge(&mut self, later: Settings) {
        if later.base_url.is_some() {
            self.base_url = later.base_url;
        }
        if !later.paths.is_empty() {
            self.paths = later.paths;
            self.paths_base = later.paths_base;
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathAliasResolver {
    base_url: Option<String>,
    /// (pattern, targets resolved against their base), longest prefix first
    patterns: Vec<(String, Vec<String>)>,
}

impl PathAliasResolver {
    /// Load aliases from the root `tsconfig.json` (or `jsconfig.json`).
    /// Returns `None` when there is no config or it defines no aliases.
    pub fn from_project(root: &Path) -> Option<Self> {
        let config = CONFIG_FILES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())?;

        let settings = load_settings(root, &config, 0)?;
        let resolver = Self::from_settings(settings);
        if resolver.is_empty() {
            None
        } else {
            tracing::debug!(
                "Loaded {} path aliases from {}",
                resolver.patterns.len(),
                config.display()
            );
            Some(resolver)
        }
    }

    fn from_settings(settings: Settings) -> Self {
        let target_base = settings
            .base_url
            .clone()
            .unwrap_or_else(|| settings.paths_base.clone());

        let mut patterns: Vec<(String, Vec<String>)> = settings
            .paths
            .into_iter()
            .map(|(pattern, targets)| {
                let targets = targets
                    .iter()
                    .filter_map(|t| join_normalized(&target_base, t))
                    .collect();
                (pattern, targets)
            })
            .collect();
        patterns.sort_by_key(|(pattern, _)| {
            std::cmp::Reverse(pattern.trim_end_matches('*').len())
        });

        PathAliasResolver {
            base_url: settings.base_url,
            patterns,
        }
    }

    fn is_empty(&self) -> bool {
        self.base_url.is_none() && self.patterns.is_empty()
    }

    /// Repo-relative candidate paths (without extension probing) for a
    /// non-relative specifier, in the order they should be tried.
    pub fn candidates(&self, specifier: &str) -> Vec<String> {
        let mut candidates = Vec::new();

        for (pattern, targets) in &self.patterns {
            let Some(matched) = match_pattern(pattern, specifier) else {
                continue;
            };
            for target in targets {
                let candidate = match target.split_once('*') {
                    Some((prefix, suffix)) => format!("{prefix}{matched}{suffix}"),
                    None => target.clone(),
                };
                candidates.push(candidate);
            }
            // The most specific matching pattern decides
            break;
        }

        if let Some(base) = &self.base_url {
            if let Some(candidate) = join_normalized(base, specifier) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    /// Whether any `paths` pattern claims this specifier.
    pub fn is_alias(&self, specifier: &str) -> bool {
        self.patterns
            .iter()
            .any(|(pattern, _)| match_pattern(pattern, specifier).is_some())
    }
}

fn match_pattern<'s>(pattern: &str, specifier: &'s str) -> Option<&'s str> {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => specifier
            .strip_prefix(prefix)?
            .strip_suffix(suffix)
            .filter(|_| specifier.len() >= prefix.len() + suffix.len()),
        None => (pattern == specifier).then_some(""),
    }
}

fn load_settings(root: &Path, config_path: &Path, depth: usize) -> Option<Settings> {
    let content = std::fs::read_to_string(config_path).ok()?;
    let config: TsConfig = match serde_json::from_str(&strip_jsonc(&content)) {
        Ok(config) => config,
        Err(e) => {
            tracing::debug!("Ignoring unreadable {}: {}", config_path.display(), e);
            return None;
        }
    };

    // Directory of this config relative to the root (configs outside the
    // repository, e.g. in node_modules, still resolve against the root)
    let config_dir = config_path
        .parent()
        .and_then(|dir| relative_path(root, dir))
        .unwrap_or_default();

    let mut settings = Settings::default();
    if let Some(extends) = config.extends.as_ref().filter(|_| depth < MAX_EXTENDS_DEPTH) {
        for entry in extends.entries() {
            let parent = resolve_extends(root, config_path, entry)
                .and_then(|parent| load_settings(root, &parent, depth + 1));
            if let Some(parent) = parent {
                settings.merge(parent);
            }
        }
    }

    if let Some(options) = config.compiler_options {
        if let Some(base) = options.base_url {
            settings.base_url = join_normalized(&config_dir, &base);
        }
        if let Some(paths) = options.paths {
            settings.paths = paths;
            settings.paths_base = config_dir;
        }
    }
    Some(settings)
}

fn resolve_extends(root: &Path, config_path: &Path, extends: &str) -> Option<PathBuf> {
    let config_dir = config_path.parent().unwrap_or(root);
    let is_path = extends.starts_with('.') || extends.starts_with('/');
    let base = if is_path {
        config_dir.join(extends)
    } else {
        root.join("node_modules").join(extends)
    };

    let mut candidates = Vec::with_capacity(3);
    if extends.ends_with(".json") {
        candidates.push(base.clone());
    } else {
        candidates.push(PathBuf::from(format!("{}.json", base.display())));
    }
    if !is_path {
        // A bare package name points at the package's own tsconfig.json
        candidates.push(base.join("tsconfig.json"));
    }

    let found = candidates.into_iter().find(|path| path.is_file());
    if found.is_none() {
        tracing::debug!("tsconfig extends target {} not found", base.display());
    }
    found
}

/// Strip `//` and `/* */` comments and trailing commas so the text parses
/// as plain JSON. String contents are left untouched.
pub fn strip_jsonc(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
            }
            '}' | ']' => {
                let trimmed = out.trim_end_matches(char::is_whitespace).len();
                if out[..trimmed].ends_with(',') {
                    out.remove(trimmed - 1);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_repo_with_structure;

    #[test]
    fn test_strip_jsonc() {
        let input = r#"{
  // comment
  "a": "http://x", /* block */
  "b": [1, 2,],
}"#;
        let value: serde_json::Value = serde_json::from_str(&strip_jsonc(input)).unwrap();
        assert_eq!(value["a"], "http://x");
        assert_eq!(value["b"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_paths_and_base_url() {
        let repo = create_repo_with_structure(&[(
            "tsconfig.json",
            r#"{
  "compilerOptions": {
    "baseUrl": "./src",
    "paths": {
      "@/*": ["./*"],
      "@components/*": ["components/*", "legacy/components/*"],
    },
  },
}"#,
        )]);

        let resolver = PathAliasResolver::from_project(repo.path()).unwrap();
        assert_eq!(resolver.candidates("@/lib/logger"), vec!["src/lib/logger", "src/@/lib/logger"]);
        assert_eq!(
            resolver.candidates("@components/Button"),
            vec![
                "src/components/Button",
                "src/legacy/components/Button",
                "src/@components/Button"
            ]
        );
        assert_eq!(resolver.candidates("utils/date"), vec!["src/utils/date"]);
        assert!(resolver.is_alias("@/x"));
        assert!(!resolver.is_alias("lodash"));
    }

    #[test]
    fn test_extends_chain() {
        let repo = create_repo_with_structure(&[
            (
                "config/base.json",
                r#"{ "compilerOptions": { "paths": { "~/*": ["../app/*"] } } }"#,
            ),
            ("tsconfig.json", r#"{ "extends": "./config/base" }"#),
        ]);

        let resolver = PathAliasResolver::from_project(repo.path()).unwrap();
        assert_eq!(resolver.candidates("~/models/user"), vec!["app/models/user"]);
    }

    #[test]
    fn test_extends_list_merges_in_order() {
        let repo = create_repo_with_structure(&[
            ("base.json", r##"{ "compilerOptions": { "baseUrl": "lib", "paths": { "#old/*": ["old/*"] } } }"##),
            ("strict.json", r#"{ "compilerOptions": { "baseUrl": "." } }"#),
            (
                "tsconfig.json",
                r#"{
  "extends": ["./base.json", "./strict.json"],
  "compilerOptions": { "paths": { "@app/*": ["src/*"] } },
}"#,
            ),
        ]);

        let resolver = PathAliasResolver::from_project(repo.path()).unwrap();
        assert_eq!(resolver.candidates("@app/core"), vec!["src/core", "@app/core"]);
        assert!(!resolver.is_alias("#old/x"));
    }

    #[test]
    fn test_extends_package_and_dotted_names() {
        let repo = create_repo_with_structure(&[
            (
                "node_modules/@company/tsconfig/tsconfig.json",
                r#"{ "compilerOptions": { "paths": { "@shared/*": ["shared/*"] } } }"#,
            ),
            ("tsconfig.base.json", r#"{ "extends": "@company/tsconfig" }"#),
            ("tsconfig.json", r#"{ "extends": "./tsconfig.base" }"#),
        ]);

        let resolver = PathAliasResolver::from_project(repo.path()).unwrap();
        assert_eq!(
            resolver.candidates("@shared/ui"),
            vec!["node_modules/@company/tsconfig/shared/ui"]
        );
    }

    #[test]
    fn test_no_aliases() {
        let repo = create_repo_with_structure(&[("tsconfig.json", r#"{ "compilerOptions": { "strict": true } }"#)]);
        assert!(PathAliasResolver::from_project(repo.path()).is_none());
    }
}
