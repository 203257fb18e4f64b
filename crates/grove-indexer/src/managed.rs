//! In-process TypeScript / JavaScript backend
//!
//! Files are extracted in parallel with one tree-sitter parser per rayon
//! worker. Resolution of imports and heritage clauses starts only once every
//! file has been extracted, since it reads the facts of all files.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use grove_core::{
    CancellationFlag, CodeGraphSchema, CodeNode, EdgeKind, EdgeTarget, FileProcessingError,
    GraphBuilder, GraphError, Language, ParseOptions, Result, SymbolTable, symbol_id,
};
use rayon::prelude::*;
use tree_sitter::Parser;

use crate::backend::{Availability, ParserBackend};
use crate::languages::tsconfig::PathAliasResolver;
use crate::languages::typescript::{DeclaredSymbol, Dialect, ModuleFacts, extract_module};
use crate::paths::{join_normalized, parent_dir};
use crate::walk::{NODE_PROFILE, SourceFile, discover};

/// Extensions tried, in order, after a specifier that names no existing file.
pub const PROBE_EXTENSIONS: &[&str] = &["ts", "tsx", "d.ts", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// ESM imports name the emitted `.js` file; the source is the `.ts` one.
const ESM_SUBSTITUTES: &[(&str, &[&str])] = &[
    (".js", &["ts", "tsx"]),
    (".jsx", &["tsx"]),
    (".mjs", &["mts"]),
    (".cjs", &["cts"]),
];

/// Re-export chains longer than this are left unresolved.
const MAX_REEXPORT_HOPS: usize = 4;

/// A successfully extracted source file.
#[derive(Debug)]
struct ParsedModule {
    path: String,
    dialect: Dialect,
    facts: ModuleFacts,
}

fn extract_file(
    parser: &mut Parser,
    file: &SourceFile,
    cancel: &CancellationFlag,
) -> std::result::Result<ParsedModule, FileProcessingError> {
    let path = file.relative.clone();
    if cancel.is_cancelled() {
        return Err(FileProcessingError::Cancelled { path });
    }

    let Some(dialect) = Dialect::from_path(&path) else {
        return Err(FileProcessingError::Syntax {
            path,
            message: "unsupported file extension".to_string(),
        });
    };

    let bytes = match std::fs::read(&file.absolute) {
        Ok(bytes) => bytes,
        Err(source) => return Err(FileProcessingError::Read { path, source }),
    };
    let Ok(source) = String::from_utf8(bytes) else {
        return Err(FileProcessingError::Encoding { path });
    };

    let facts = match extract_module(parser, dialect, &source) {
        Ok(facts) => facts,
        Err(message) => return Err(FileProcessingError::Syntax { path, message }),
    };
    if facts.has_errors {
        tracing::debug!("{} has syntax errors, keeping the recovered tree", path);
    }

    Ok(ParsedModule { path, dialect, facts })
}

/// Placeholder name for a bare package specifier: deep imports collapse to
/// the package root (`lodash/fp` -> `lodash`, `@scope/pkg/x` -> `@scope/pkg`).
pub fn package_root(specifier: &str) -> &str {
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    match specifier.match_indices('/').nth(segments - 1) {
        Some((index, _)) => &specifier[..index],
        None => specifier,
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Repo-relative path of a file node.
    File(String),
    /// Normalised placeholder name.
    External(String),
}

impl Resolution {
    fn into_target(self) -> EdgeTarget {
        match self {
            Resolution::File(path) => EdgeTarget::Node(path),
            Resolution::External(name) => EdgeTarget::External(name),
        }
    }
}

/// Maps module specifiers to files that became nodes in this run.
pub struct ModuleResolver {
    files: HashSet<String>,
    aliases: Option<PathAliasResolver>,
}

impl ModuleResolver {
    pub fn new(files: impl IntoIterator<Item = String>, aliases: Option<PathAliasResolver>) -> Self {
        ModuleResolver {
            files: files.into_iter().collect(),
            aliases,
        }
    }

    pub fn resolve(&self, importer: &str, specifier: &str) -> Resolution {
        if is_relative(specifier) {
            return join_normalized(parent_dir(importer), specifier)
                .and_then(|base| self.probe(&base))
                .map(Resolution::File)
                .unwrap_or_else(|| Resolution::External(specifier.to_string()));
        }

        if let Some(aliases) = &self.aliases {
            for candidate in aliases.candidates(specifier) {
                if let Some(found) = self.probe(&candidate) {
                    return Resolution::File(found);
                }
            }
            if aliases.is_alias(specifier) {
                return Resolution::External(specifier.to_string());
            }
        }

        if specifier.starts_with('/') {
            Resolution::External(specifier.to_string())
        } else {
            Resolution::External(package_root(specifier).to_string())
        }
    }

    fn probe(&self, base: &str) -> Option<String> {
        if base.is_empty() {
            return PROBE_EXTENSIONS
                .iter()
                .map(|ext| format!("index.{ext}"))
                .find(|c| self.files.contains(c));
        }

        if self.files.contains(base) {
            return Some(base.to_string());
        }
        for ext in PROBE_EXTENSIONS {
            let candidate = format!("{base}.{ext}");
            if self.files.contains(&candidate) {
                return Some(candidate);
            }
        }
        for (emitted, sources) in ESM_SUBSTITUTES {
            let Some(stem) = base.strip_suffix(emitted) else {
                continue;
            };
            for ext in *sources {
                let candidate = format!("{stem}.{ext}");
                if self.files.contains(&candidate) {
                    return Some(candidate);
                }
            }
        }
        PROBE_EXTENSIONS
            .iter()
            .map(|ext| format!("{base}/index.{ext}"))
            .find(|c| self.files.contains(c))
    }
}

/// Backend for TypeScript and JavaScript repositories. Needs no external runtime.
pub struct TypeScriptBackend {
    language: Language,
}

impl TypeScriptBackend {
    pub fn new(language: Language) -> Self {
        TypeScriptBackend { language }
    }
}

impl Default for TypeScriptBackend {
    fn default() -> Self {
        Self::new(Language::TypeScript)
    }
}

impl ParserBackend for TypeScriptBackend {
    fn language(&self) -> Language {
        self.language
    }

    fn probe(&self) -> Availability {
        Availability::Available
    }

    fn parse(&self, root: &Path, options: &ParseOptions, cancel: &CancellationFlag) -> Result<CodeGraphSchema> {
        let files = discover(root, options, &NODE_PROFILE)?;
        tracing::info!("Parsing {} {} files in {}", files.len(), self.language, root.display());

        let extracted: Vec<_> = files
            .par_iter()
            .map_init(Parser::new, |parser, file| extract_file(parser, file, cancel))
            .collect();

        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let mut builder = GraphBuilder::new(self.language, root.display().to_string());
        let mut modules = Vec::with_capacity(extracted.len());
        for result in extracted {
            match result {
                Ok(module) => modules.push(module),
                Err(e) => builder.skip(&e),
            }
        }

        let symbols = SymbolTable::new();
        for module in &modules {
            let language = module.dialect.language();
            builder.add_node(CodeNode::file(&module.path, language));
            for symbol in &module.facts.symbols {
                let node = CodeNode::symbol(&module.path, &symbol.symbol, &symbol.name, symbol.kind, language)
                    .with_span(symbol.line, symbol.end_line)
                    .with_namespace(symbol.namespace.clone())
                    .exported(symbol.exported);
                symbols.insert(&node.id, &node.id, &module.path);
                builder.add_node(node);
            }
        }

        let resolver = ModuleResolver::new(
            modules.iter().map(|m| m.path.clone()),
            PathAliasResolver::from_project(root),
        );
        let linker = Linker {
            modules: modules.iter().map(|m| (m.path.as_str(), m)).collect(),
            resolver: &resolver,
            symbols: &symbols,
        };

        for module in &modules {
            for reference in &module.facts.references {
                if reference.type_only && !options.include_type_imports {
                    continue;
                }
                let target = resolver.resolve(&module.path, &reference.specifier);
                builder.add_relation(
                    reference.kind,
                    module.path.as_str(),
                    target.into_target(),
                    Some(reference.line),
                    Some(reference.specifier.clone()),
                );
            }

            for symbol in &module.facts.symbols {
                let source = symbol_id(&module.path, &symbol.symbol);
                for heritage in &symbol.heritage {
                    let target = linker.resolve_type(module, symbol, &heritage.type_name);
                    builder.add_relation(
                        heritage.kind,
                        source.clone(),
                        target,
                        Some(heritage.line),
                        Some(heritage.type_name.clone()),
                    );
                }
            }
        }

        let schema = builder.finish();
        tracing::info!(
            "Built graph: {} nodes, {} edges, {} skipped",
            schema.nodes.len(),
            schema.edges.len(),
            schema.skipped_files.len()
        );
        Ok(schema)
    }
}

/// Resolves type names in heritage clauses to symbol nodes.
struct Linker<'a> {
    modules: HashMap<&'a str, &'a ParsedModule>,
    resolver: &'a ModuleResolver,
    symbols: &'a SymbolTable,
}

impl Linker<'_> {
    fn declared(&self, file: &str, symbol: &str) -> Option<String> {
        let id = symbol_id(file, symbol);
        self.symbols.lookup(&id).map(|entry| entry.node_id)
    }

    fn resolve_type(&self, module: &ParsedModule, symbol: &DeclaredSymbol, type_name: &str) -> EdgeTarget {
        // Declared in the same file, innermost namespace first
        let mut local = Vec::with_capacity(2);
        if let Some(ns) = &symbol.namespace {
            local.push(format!("{ns}.{type_name}"));
        }
        local.push(type_name.to_string());
        for candidate in &local {
            if let Some(id) = self.declared(&module.path, candidate) {
                return EdgeTarget::Node(id);
            }
        }

        let (head, member) = match type_name.split_once('.') {
            Some((head, member)) => (head, Some(member)),
            None => (type_name, None),
        };

        for reference in &module.facts.references {
            if reference.kind != EdgeKind::Imports {
                continue;
            }
            let Some(binding) = reference.bindings.iter().find(|b| b.local == head) else {
                continue;
            };
            let Resolution::File(target) = self.resolver.resolve(&module.path, &reference.specifier) else {
                break;
            };
            // `ns.Member` on a namespace import or a required module object
            let exported = match (member, binding.imported.as_str()) {
                (Some(member), "*" | "default") => self.exported_from(&target, member, MAX_REEXPORT_HOPS),
                (None, imported) if imported != "*" => self.exported_from(&target, imported, MAX_REEXPORT_HOPS),
                _ => None,
            };
            if let Some(id) = exported {
                return EdgeTarget::Node(id);
            }
            break;
        }

        EdgeTarget::External(type_name.to_string())
    }

    /// Node id of the symbol `file` exports as `name`, following
    /// `export ... from` re-exports through at most `hops` modules.
    fn exported_from(&self, file: &str, name: &str, hops: usize) -> Option<String> {
        let module = self.modules.get(file)?;
        if let Some(symbol) = module.facts.exported_symbol(name) {
            return self.declared(file, &symbol.symbol);
        }
        if hops == 0 {
            return None;
        }

        for reference in &module.facts.references {
            if reference.kind != EdgeKind::Exports {
                continue;
            }
            let forwarded = reference.bindings.iter().find_map(|b| match (b.local.as_str(), b.imported.as_str()) {
                ("*", "*") if name != "default" => Some(name),
                (local, imported) if local == name && imported != "*" => Some(imported),
                _ => None,
            });
            let Some(forwarded) = forwarded else {
                continue;
            };
            let Resolution::File(target) = self.resolver.resolve(file, &reference.specifier) else {
                continue;
            };
            if let Some(id) = self.exported_from(&target, forwarded, hops - 1) {
                return Some(id);
            }
        }
        None
    }
}
