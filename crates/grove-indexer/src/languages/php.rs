//! PHP runtime: `php` plus `nikic/php-parser`
//!
//! The extractor script runs inline through `php -r` with the Composer
//! autoloader and the file to parse as arguments. `NameResolver` makes every
//! class reference fully qualified before the facts are printed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use grove_core::{
    CodeNode, EdgeKind, EdgeTarget, GraphBuilder, Language, NodeKind, ParseOptions, SymbolTable,
};
use serde::Deserialize;

use crate::backend::Availability;
use crate::paths::{join_normalized, parent_dir};
use crate::process_pool::{Invocation, PROBE_TIMEOUT, run_probe};
use crate::subprocess::ScriptRuntime;
use crate::walk::{PHP_PROFILE, SourceFile, SourceProfile};

pub const PHP_BIN_ENV: &str = "GROVE_PHP_BIN";
pub const PHP_PARSER_AUTOLOAD_ENV: &str = "GROVE_PHP_PARSER_AUTOLOAD";

const INSTALL_HINT: &str = "Install PHP 7.4+ and nikic/php-parser (`composer global require nikic/php-parser`), \
     or point GROVE_PHP_PARSER_AUTOLOAD at a Composer autoload.php that provides it";

const PARSER_CHECK: &str = r#"require $argv[1]; exit(class_exists('PhpParser\ParserFactory') ? 0 : 1);"#;

const EXTRACTOR: &str = r#"
error_reporting(E_ALL & ~E_DEPRECATED);
require $argv[1];
$file = $argv[2];
$code = @file_get_contents($file);
if ($code === false) { fwrite(STDERR, "cannot read $file"); exit(2); }

$factory = new PhpParser\ParserFactory();
$parser = method_exists($factory, 'createForNewestSupportedVersion')
    ? $factory->createForNewestSupportedVersion()
    : $factory->create(PhpParser\ParserFactory::PREFER_PHP7);
try {
    $ast = $parser->parse($code);
} catch (PhpParser\Error $e) {
    fwrite(STDERR, $e->getMessage());
    exit(3);
}
$traverser = new PhpParser\NodeTraverser();
$traverser->addVisitor(new PhpParser\NodeVisitor\NameResolver());
$ast = $traverser->traverse($ast ?: []);

$out = ['namespaces' => [], 'declarations' => [], 'uses' => [], 'includes' => []];
$name = function ($n) { return ltrim($n->toString(), '\\'); };

$includePath = function ($expr) {
    if ($expr instanceof PhpParser\Node\Scalar\String_) {
        return [$expr->value, false];
    }
    if ($expr instanceof PhpParser\Node\Expr\BinaryOp\Concat
        && $expr->right instanceof PhpParser\Node\Scalar\String_) {
        $left = $expr->left;
        $isDir = $left instanceof PhpParser\Node\Scalar\MagicConst\Dir
            || ($left instanceof PhpParser\Node\Expr\FuncCall
                && $left->name instanceof PhpParser\Node\Name
                && strtolower($left->name->toString()) === 'dirname'
                && count($left->args) === 1
                && $left->args[0]->value instanceof PhpParser\Node\Scalar\MagicConst\File);
        if ($isDir) {
            return [$expr->right->value, true];
        }
    }
    return null;
};

$walk = function (array $nodes, $ns) use (&$walk, &$out, $name, $includePath) {
    foreach ($nodes as $node) {
        if (!$node instanceof PhpParser\Node) {
            continue;
        }
        if ($node instanceof PhpParser\Node\Stmt\Namespace_) {
            $nsName = $node->name ? $node->name->toString() : '';
            if ($nsName !== '') {
                $out['namespaces'][] = $nsName;
            }
            $walk($node->stmts, $nsName);
            continue;
        }
        if ($node instanceof PhpParser\Node\Stmt\Use_ || $node instanceof PhpParser\Node\Stmt\GroupUse) {
            $prefix = $node instanceof PhpParser\Node\Stmt\GroupUse ? $node->prefix->toString() . '\\' : '';
            foreach ($node->uses as $use) {
                $type = $use->type ?: $node->type;
                if ($type === 1) {
                    $out['uses'][] = ['name' => $prefix . $use->name->toString(), 'line' => $node->getStartLine()];
                }
            }
            continue;
        }
        if ($node instanceof PhpParser\Node\Stmt\ClassLike && $node->name !== null) {
            $kind = 'class';
            if ($node instanceof PhpParser\Node\Stmt\Interface_) { $kind = 'interface'; }
            elseif ($node instanceof PhpParser\Node\Stmt\Trait_) { $kind = 'trait'; }
            elseif ($node instanceof PhpParser\Node\Stmt\Enum_) { $kind = 'enum'; }
            $extends = [];
            if ($node instanceof PhpParser\Node\Stmt\Class_ && $node->extends) {
                $extends[] = $name($node->extends);
            }
            if ($node instanceof PhpParser\Node\Stmt\Interface_) {
                foreach ($node->extends as $parent) { $extends[] = $name($parent); }
            }
            $implements = [];
            if (property_exists($node, 'implements')) {
                foreach ($node->implements as $iface) { $implements[] = $name($iface); }
            }
            $traits = [];
            foreach ($node->stmts as $stmt) {
                if ($stmt instanceof PhpParser\Node\Stmt\TraitUse) {
                    foreach ($stmt->traits as $trait) {
                        $traits[] = ['name' => $name($trait), 'line' => $stmt->getStartLine()];
                    }
                }
            }
            $out['declarations'][] = [
                'name' => $node->name->toString(),
                'fqn' => isset($node->namespacedName) ? $node->namespacedName->toString() : $node->name->toString(),
                'kind' => $kind,
                'namespace' => $ns,
                'line' => $node->getStartLine(),
                'endLine' => $node->getEndLine(),
                'extends' => $extends,
                'implements' => $implements,
                'traits' => $traits,
            ];
        } elseif ($node instanceof PhpParser\Node\Stmt\Function_) {
            $out['declarations'][] = [
                'name' => $node->name->toString(),
                'fqn' => isset($node->namespacedName) ? $node->namespacedName->toString() : $node->name->toString(),
                'kind' => 'function',
                'namespace' => $ns,
                'line' => $node->getStartLine(),
                'endLine' => $node->getEndLine(),
            ];
        } elseif ($node instanceof PhpParser\Node\Expr\Include_) {
            $path = $includePath($node->expr);
            if ($path !== null) {
                $out['includes'][] = ['path' => $path[0], 'line' => $node->getStartLine(), 'dirRelative' => $path[1]];
            }
        }
        foreach ($node->getSubNodeNames() as $sub) {
            $child = $node->$sub;
            if (is_array($child)) {
                $walk($child, $ns);
            } elseif ($child instanceof PhpParser\Node) {
                $walk([$child], $ns);
            }
        }
    }
};
$walk($ast, '');
echo json_encode($out, JSON_UNESCAPED_SLASHES | JSON_UNESCAPED_UNICODE);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhpKind {
    Class,
    Interface,
    Trait,
    Enum,
    Function,
}

impl PhpKind {
    fn node_kind(self) -> NodeKind {
        match self {
            PhpKind::Class => NodeKind::Class,
            PhpKind::Interface => NodeKind::Interface,
            PhpKind::Trait => NodeKind::Trait,
            PhpKind::Enum => NodeKind::Enum,
            PhpKind::Function => NodeKind::Function,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhpReference {
    pub name: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhpDeclaration {
    pub name: String,
    pub fqn: String,
    pub kind: PhpKind,
    #[serde(default)]
    pub namespace: Option<String>,
    pub line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub traits: Vec<PhpReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhpInclude {
    pub path: String,
    pub line: u32,
    #[serde(default)]
    pub dir_relative: bool,
}

/// Output of the extractor script for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PhpFacts {
    pub namespaces: Vec<String>,
    pub declarations: Vec<PhpDeclaration>,
    pub uses: Vec<PhpReference>,
    pub includes: Vec<PhpInclude>,
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn default_binary() -> PathBuf {
    env_path(PHP_BIN_ENV).unwrap_or_else(|| PathBuf::from("php"))
}

/// Locate a Composer autoloader that provides `nikic/php-parser`.
pub fn find_parser_autoload(explicit: Option<&Path>, repo: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path(PHP_PARSER_AUTOLOAD_ENV) {
        return Some(path);
    }

    if let Some(repo) = repo {
        let autoload = repo.join("vendor").join("autoload.php");
        if autoload.is_file() && repo.join("vendor/nikic/php-parser").is_dir() {
            return Some(autoload);
        }
    }

    let mut homes = Vec::new();
    if let Some(composer_home) = env_path("COMPOSER_HOME") {
        homes.push(composer_home);
    }
    if let Some(home) = env_path("HOME") {
        homes.push(home.join(".composer"));
        homes.push(home.join(".config").join("composer"));
    }
    homes
        .into_iter()
        .map(|home| home.join("vendor").join("autoload.php"))
        .find(|autoload| autoload.is_file())
}

fn probe_interpreter(binary: &Path) -> Availability {
    run_probe(binary, &["--version"], PROBE_TIMEOUT)
}

fn probe_parser(binary: &Path, autoload: Option<&Path>) -> Availability {
    let Some(autoload) = autoload else {
        return Availability::unavailable("nikic/php-parser autoloader not found");
    };
    let autoload = autoload.to_string_lossy().into_owned();
    match run_probe(binary, &["-r", PARSER_CHECK, "--", autoload.as_str()], PROBE_TIMEOUT) {
        Availability::Available => Availability::Available,
        Availability::Unavailable { reason } => Availability::unavailable(format!(
            "nikic/php-parser is not loadable from {autoload}: {reason}"
        )),
    }
}

/// Whether a PHP interpreter can be started.
pub fn is_php_available() -> bool {
    probe_interpreter(&default_binary()).is_available()
}

/// Whether `nikic/php-parser` can be loaded from a globally configured autoloader.
pub fn has_php_parser() -> bool {
    let binary = default_binary();
    probe_parser(&binary, find_parser_autoload(None, None).as_deref()).is_available()
}

pub struct PhpRuntime {
    binary: PathBuf,
    autoload: Option<PathBuf>,
}

impl PhpRuntime {
    pub fn new(options: &ParseOptions, repo: &Path) -> Self {
        PhpRuntime {
            binary: options.php_binary.clone().unwrap_or_else(default_binary),
            autoload: find_parser_autoload(options.php_parser_autoload.as_deref(), Some(repo)),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl ScriptRuntime for PhpRuntime {
    type Facts = PhpFacts;

    fn name(&self) -> &'static str {
        "php"
    }

    fn language(&self) -> Language {
        Language::Php
    }

    fn profile(&self) -> &'static SourceProfile {
        &PHP_PROFILE
    }

    fn probe(&self) -> Availability {
        match probe_interpreter(&self.binary) {
            Availability::Available => probe_parser(&self.binary, self.autoload.as_deref()),
            unavailable => unavailable,
        }
    }

    fn install_hint(&self) -> &'static str {
        INSTALL_HINT
    }

    fn invocation(&self, root: &Path, file: &SourceFile) -> Invocation {
        let autoload = self.autoload.clone().unwrap_or_default();
        Invocation::new(&self.binary)
            .arg("-r")
            .arg(EXTRACTOR)
            .arg("--")
            .arg(autoload)
            .arg(&file.absolute)
            .current_dir(root)
    }

    fn assemble(&self, builder: &mut GraphBuilder, files: &[(SourceFile, PhpFacts)]) {
        assemble_php(builder, files);
    }
}

fn include_target(builder: &GraphBuilder, file: &str, include: &PhpInclude) -> EdgeTarget {
    let path = include.path.as_str();
    let candidates = if include.dir_relative {
        vec![join_normalized(parent_dir(file), path.trim_start_matches('/'))]
    } else if path.starts_with('/') {
        Vec::new()
    } else {
        vec![join_normalized(parent_dir(file), path), join_normalized("", path)]
    };
    candidates
        .into_iter()
        .flatten()
        .find(|candidate| builder.has_node(candidate))
        .map(EdgeTarget::Node)
        .unwrap_or_else(|| EdgeTarget::External(path.to_string()))
}

/// Build nodes and edges from the facts of every PHP file in the run.
pub fn assemble_php(builder: &mut GraphBuilder, files: &[(SourceFile, PhpFacts)]) {
    let symbols = SymbolTable::new();
    let mut namespace_files: HashMap<&str, &str> = HashMap::new();

    for (file, facts) in files {
        let path = file.relative.as_str();
        builder.add_node(CodeNode::file(path, Language::Php).with_namespace(facts.namespaces.first().cloned()));
        for namespace in &facts.namespaces {
            namespace_files.entry(namespace.as_str()).or_insert(path);
        }
        for decl in &facts.declarations {
            let node = CodeNode::symbol(path, &decl.name, &decl.name, decl.kind.node_kind(), Language::Php)
                .with_span(decl.line, decl.end_line)
                .with_namespace(decl.namespace.clone())
                .with_display_name(&decl.fqn)
                .exported(true);
            let id = node.id.clone();
            if builder.add_node(node) {
                symbols.insert(&decl.fqn, &id, path);
            }
        }
    }

    let class_target = |name: &str| -> EdgeTarget {
        let name = name.trim_start_matches('\\');
        match symbols.lookup(name) {
            Some(entry) => EdgeTarget::Node(entry.node_id),
            None => EdgeTarget::External(name.to_string()),
        }
    };

    for (file, facts) in files {
        let path = file.relative.as_str();

        for import in &facts.uses {
            let name = import.name.trim_start_matches('\\');
            let target = match symbols.lookup(name) {
                Some(entry) if entry.file_path == path => continue,
                Some(entry) => EdgeTarget::Node(entry.file_path),
                None => match namespace_files.get(name) {
                    Some(&declaring) if declaring != path => EdgeTarget::Node(declaring.to_string()),
                    Some(_) => continue,
                    None => EdgeTarget::External(name.to_string()),
                },
            };
            builder.add_relation(EdgeKind::Imports, path, target, Some(import.line), Some(import.name.clone()));
        }

        for include in &facts.includes {
            let target = include_target(builder, path, include);
            builder.add_relation(
                EdgeKind::Imports,
                path,
                target,
                Some(include.line),
                Some(include.path.clone()),
            );
        }

        for decl in &facts.declarations {
            let source = grove_core::symbol_id(path, &decl.name);
            let heritage = decl
                .extends
                .iter()
                .map(|name| (EdgeKind::Extends, name.as_str(), decl.line))
                .chain(decl.implements.iter().map(|name| (EdgeKind::Implements, name.as_str(), decl.line)))
                .chain(decl.traits.iter().map(|t| (EdgeKind::Includes, t.name.as_str(), t.line)));
            for (kind, name, line) in heritage {
                builder.add_relation(kind, source.clone(), class_target(name), Some(line), Some(name.to_string()));
            }
        }
    }
}
