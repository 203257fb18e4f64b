//! TypeScript / JavaScript extractor using tree-sitter
//!
//! Produces per-file [`ModuleFacts`]: declared symbols with their heritage
//! clauses and every module reference (imports, re-exports, `require`,
//! dynamic `import()`). Resolution against other files happens later.

use std::collections::{HashMap, HashSet};

use grove_core::{EdgeKind, Language, NodeKind};
use tree_sitter::{Node, Parser, Point};

/// Grammar used for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Dialect {
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
        match ext.to_ascii_lowercase().as_str() {
            "ts" | "mts" | "cts" => Some(Dialect::TypeScript),
            "tsx" => Some(Dialect::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Dialect::JavaScript),
            _ => None,
        }
    }

    pub fn grammar(&self) -> tree_sitter::Language {
        match self {
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Dialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    /// Language recorded on nodes extracted from this file.
    pub fn language(&self) -> Language {
        match self {
            Dialect::TypeScript | Dialect::Tsx => Language::TypeScript,
            Dialect::JavaScript => Language::JavaScript,
        }
    }
}

/// A named type referenced from an `extends` / `implements` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heritage {
    pub kind: EdgeKind,
    pub type_name: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSymbol {
    pub name: String,
    /// Namespace-qualified name, unique within the file (`Shapes.Circle`).
    pub symbol: String,
    pub kind: NodeKind,
    pub line: u32,
    pub end_line: u32,
    pub exported: bool,
    pub namespace: Option<String>,
    pub heritage: Vec<Heritage>,
}

/// `local` is the name visible in the importing file; `imported` is the
/// exported name, `default` or `*` for a namespace import.
///
/// On a re-export (`export ... from`) `local` is the name this file exports
/// and `imported` the name in the source module. `export *` is `*`/`*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub imported: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub specifier: String,
    pub line: u32,
    /// `Imports` or `Exports` (for `export ... from`).
    pub kind: EdgeKind,
    pub type_only: bool,
    pub bindings: Vec<ImportBinding>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleFacts {
    pub symbols: Vec<DeclaredSymbol>,
    pub references: Vec<ModuleReference>,
    /// Local name bound to `export default`, when it is a named declaration.
    pub default_export: Option<String>,
    /// Exported name -> local name, for `export { A as B }` and `exports.B = A`.
    pub export_aliases: HashMap<String, String>,
    /// The tree contained recovered syntax errors.
    pub has_errors: bool,
}

impl ModuleFacts {
    pub fn symbol(&self, symbol: &str) -> Option<&DeclaredSymbol> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }

    /// Resolve an exported name to the symbol that declares it. Symbols
    /// that are declared but not exported are not visible.
    pub fn exported_symbol(&self, imported: &str) -> Option<&DeclaredSymbol> {
        if imported == "default" {
            return self.symbol(self.default_export.as_deref()?);
        }
        if let Some(local) = self.export_aliases.get(imported) {
            return self.symbol(local);
        }
        self.symbols.iter().find(|s| s.symbol == imported && s.exported)
    }
}

fn line(point: Point) -> u32 {
    (point.row as u32) + 1
}

/// Parse `source` with `dialect` and collect its facts.
pub fn extract_module(parser: &mut Parser, dialect: Dialect, source: &str) -> Result<ModuleFacts, String> {
    parser
        .set_language(&dialect.grammar())
        .map_err(|e| format!("failed to set language: {e}"))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| "parser produced no tree".to_string())?;

    let root = tree.root_node();
    let mut extraction = Extraction {
        source: source.as_bytes(),
        facts: ModuleFacts {
            has_errors: root.has_error(),
            ..ModuleFacts::default()
        },
        exported_names: HashSet::new(),
    };
    extraction.statements(root, None);
    extraction.calls(root);
    Ok(extraction.finish())
}

struct Extraction<'a> {
    source: &'a [u8],
    facts: ModuleFacts,
    /// Names exported through `export { A, B }`.
    exported_names: HashSet<String>,
}

impl<'a> Extraction<'a> {
    fn text(&self, node: Node) -> Option<String> {
        node.utf8_text(self.source).ok().map(str::to_string)
    }

    fn string_value(&self, node: Node) -> Option<String> {
        if node.kind() != "string" {
            return None;
        }
        let raw = node.utf8_text(self.source).ok()?;
        let value = raw
            .strip_prefix(['"', '\''])
            .and_then(|s| s.strip_suffix(['"', '\'']))
            .unwrap_or(raw);
        Some(value.to_string())
    }

    fn finish(mut self) -> ModuleFacts {
        for symbol in &mut self.facts.symbols {
            if symbol.namespace.is_none() && self.exported_names.contains(&symbol.name) {
                symbol.exported = true;
            }
        }
        self.facts
    }

    fn statements(&mut self, node: Node, namespace: Option<&str>) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "import_statement" => self.import_statement(child),
                "export_statement" => self.export_statement(child, namespace),
                "expression_statement" => {
                    // `namespace X {}` at statement level parses as an expression
                    if let Some(inner) = child.named_child(0) {
                        match inner.kind() {
                            "internal_module" => {
                                self.declaration(inner, false, namespace);
                            }
                            "assignment_expression" if namespace.is_none() => self.commonjs_export(inner),
                            _ => {}
                        }
                    }
                }
                _ => {
                    self.declaration(child, false, namespace);
                }
            }
        }
    }

    /// Record a declaration. Returns the local name of the first symbol it declares.
    fn declaration(&mut self, node: Node, exported: bool, namespace: Option<&str>) -> Option<String> {
        match node.kind() {
            "class_declaration" | "abstract_class_declaration" | "class" => {
                let name = self.text(node.child_by_field_name("name")?)?;
                let heritage = self.class_heritage(node);
                self.push_symbol(node, &name, NodeKind::Class, exported, namespace, heritage);
                Some(name)
            }
            "interface_declaration" => {
                let name = self.text(node.child_by_field_name("name")?)?;
                let heritage = self.interface_heritage(node);
                self.push_symbol(node, &name, NodeKind::Interface, exported, namespace, heritage);
                Some(name)
            }
            "function_declaration"
            | "generator_function_declaration"
            | "function_signature"
            | "function_expression"
            | "function"
            | "generator_function" => {
                let name = self.text(node.child_by_field_name("name")?)?;
                self.push_symbol(node, &name, NodeKind::Function, exported, namespace, Vec::new());
                Some(name)
            }
            "enum_declaration" => {
                let name = self.text(node.child_by_field_name("name")?)?;
                self.push_symbol(node, &name, NodeKind::Enum, exported, namespace, Vec::new());
                Some(name)
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut first = None;
                let mut cursor = node.walk();
                let declarators: Vec<Node> = node
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() == "variable_declarator")
                    .collect();
                for declarator in declarators {
                    let Some(name_node) = declarator.child_by_field_name("name") else {
                        continue;
                    };
                    if name_node.kind() != "identifier" {
                        continue;
                    }
                    let is_function = declarator.child_by_field_name("value").is_some_and(|v| {
                        matches!(
                            v.kind(),
                            "arrow_function" | "function_expression" | "function" | "generator_function"
                        )
                    });
                    if !is_function {
                        continue;
                    }
                    let Some(name) = self.text(name_node) else {
                        continue;
                    };
                    self.push_symbol(declarator, &name, NodeKind::Function, exported, namespace, Vec::new());
                    first.get_or_insert(name);
                }
                first
            }
            "internal_module" | "module" => {
                let name_node = node.child_by_field_name("name")?;
                // `declare module 'pkg'` augments another module
                if name_node.kind() == "string" {
                    return None;
                }
                let name = self.text(name_node)?;
                let symbol = self.push_symbol(node, &name, NodeKind::Module, exported, namespace, Vec::new());
                if let Some(body) = node.child_by_field_name("body") {
                    self.statements(body, Some(&symbol));
                }
                Some(name)
            }
            "ambient_declaration" => {
                let mut cursor = node.walk();
                let inner: Vec<Node> = node.named_children(&mut cursor).collect();
                let mut first = None;
                for child in inner {
                    if let Some(name) = self.declaration(child, exported, namespace) {
                        first.get_or_insert(name);
                    }
                }
                first
            }
            _ => None,
        }
    }

    fn push_symbol(
        &mut self,
        node: Node,
        name: &str,
        kind: NodeKind,
        exported: bool,
        namespace: Option<&str>,
        heritage: Vec<Heritage>,
    ) -> String {
        let symbol = match namespace {
            Some(ns) => format!("{ns}.{name}"),
            None => name.to_string(),
        };
        self.facts.symbols.push(DeclaredSymbol {
            name: name.to_string(),
            symbol: symbol.clone(),
            kind,
            line: line(node.start_position()),
            end_line: line(node.end_position()),
            exported,
            namespace: namespace.map(str::to_string),
            heritage,
        });
        symbol
    }

    fn type_name(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" | "type_identifier" | "member_expression" | "nested_type_identifier"
            | "nested_identifier" => self.text(node),
            "generic_type" => self.type_name(node.child_by_field_name("name")?),
            _ => None,
        }
    }

    fn heritage_entry(&self, kind: EdgeKind, node: Node) -> Option<Heritage> {
        Some(Heritage {
            kind,
            type_name: self.type_name(node)?,
            line: line(node.start_position()),
        })
    }

    fn class_heritage(&self, class: Node) -> Vec<Heritage> {
        let mut heritage = Vec::new();
        let mut cursor = class.walk();
        let Some(clause) = class
            .children(&mut cursor)
            .find(|c| c.kind() == "class_heritage")
        else {
            return heritage;
        };

        let mut cursor = clause.walk();
        for child in clause.named_children(&mut cursor) {
            match child.kind() {
                "extends_clause" => {
                    let mut values = child.walk();
                    for value in child.children_by_field_name("value", &mut values) {
                        heritage.extend(self.heritage_entry(EdgeKind::Extends, value));
                    }
                }
                "implements_clause" => {
                    let mut types = child.walk();
                    for ty in child.named_children(&mut types) {
                        heritage.extend(self.heritage_entry(EdgeKind::Implements, ty));
                    }
                }
                // JavaScript: `extends <expression>` directly under the heritage node
                _ => heritage.extend(self.heritage_entry(EdgeKind::Extends, child)),
            }
        }
        heritage
    }

    fn interface_heritage(&self, interface: Node) -> Vec<Heritage> {
        let mut heritage = Vec::new();
        let mut cursor = interface.walk();
        for child in interface.children(&mut cursor) {
            if child.kind() != "extends_type_clause" {
                continue;
            }
            let mut types = child.walk();
            for ty in child.named_children(&mut types) {
                heritage.extend(self.heritage_entry(EdgeKind::Extends, ty));
            }
        }
        heritage
    }

    fn import_statement(&mut self, node: Node) {
        let type_only = has_token(node, "type");
        let mut specifier = node
            .child_by_field_name("source")
            .and_then(|s| self.string_value(s));
        let mut bindings = Vec::new();

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "import_clause" => self.import_clause(child, &mut bindings),
                "import_require_clause" => {
                    if specifier.is_none() {
                        specifier = child
                            .child_by_field_name("source")
                            .and_then(|s| self.string_value(s));
                    }
                    let mut inner = child.walk();
                    let local = child
                        .named_children(&mut inner)
                        .find(|c| c.kind() == "identifier")
                        .and_then(|c| self.text(c));
                    if let Some(local) = local {
                        bindings.push(ImportBinding {
                            local,
                            imported: "*".to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        if let Some(specifier) = specifier {
            self.facts.references.push(ModuleReference {
                specifier,
                line: line(node.start_position()),
                kind: EdgeKind::Imports,
                type_only,
                bindings,
            });
        }
    }

    fn import_clause(&self, clause: Node, bindings: &mut Vec<ImportBinding>) {
        let mut cursor = clause.walk();
        for child in clause.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    if let Some(local) = self.text(child) {
                        bindings.push(ImportBinding {
                            local,
                            imported: "default".to_string(),
                        });
                    }
                }
                "namespace_import" => {
                    let mut inner = child.walk();
                    let local = child
                        .named_children(&mut inner)
                        .find(|c| c.kind() == "identifier")
                        .and_then(|c| self.text(c));
                    if let Some(local) = local {
                        bindings.push(ImportBinding {
                            local,
                            imported: "*".to_string(),
                        });
                    }
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(imported) = spec.child_by_field_name("name").and_then(|n| self.text(n))
                        else {
                            continue;
                        };
                        let local = spec
                            .child_by_field_name("alias")
                            .and_then(|n| self.text(n))
                            .unwrap_or_else(|| imported.clone());
                        bindings.push(ImportBinding { local, imported });
                    }
                }
                _ => {}
            }
        }
    }

    fn export_statement(&mut self, node: Node, namespace: Option<&str>) {
        let is_default = has_token(node, "default");

        if let Some(source) = node.child_by_field_name("source") {
            if let Some(specifier) = self.string_value(source) {
                let bindings = self.reexport_bindings(node);
                self.facts.references.push(ModuleReference {
                    specifier,
                    line: line(node.start_position()),
                    kind: EdgeKind::Exports,
                    type_only: has_token(node, "type"),
                    bindings,
                });
            }
            return;
        }

        if let Some(declaration) = node.child_by_field_name("declaration") {
            let name = self.declaration(declaration, true, namespace);
            if is_default && namespace.is_none() {
                self.facts.default_export = name;
            }
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            if is_default && namespace.is_none() {
                self.facts.default_export = if value.kind() == "identifier" {
                    self.text(value)
                } else {
                    self.declaration(value, true, None)
                };
            }
            return;
        }

        for (name, alias) in self.export_specifiers(node) {
            match alias {
                Some(alias) if alias == "default" => {
                    if namespace.is_none() {
                        self.facts.default_export = Some(name.clone());
                    }
                }
                Some(alias) if namespace.is_none() => {
                    self.facts.export_aliases.insert(alias, name.clone());
                }
                _ => {}
            }
            self.exported_names.insert(name);
        }
    }

    /// `(name, alias)` pairs of every `export { name as alias }` clause.
    fn export_specifiers(&self, node: Node) -> Vec<(String, Option<String>)> {
        let mut specifiers = Vec::new();
        let mut cursor = node.walk();
        let clauses: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "export_clause")
            .collect();
        for clause in clauses {
            let mut inner = clause.walk();
            for spec in clause.named_children(&mut inner) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let Some(name) = spec.child_by_field_name("name").and_then(|n| self.text(n)) else {
                    continue;
                };
                let alias = spec.child_by_field_name("alias").and_then(|n| self.text(n));
                specifiers.push((name, alias));
            }
        }
        specifiers
    }

    fn reexport_bindings(&self, node: Node) -> Vec<ImportBinding> {
        let mut cursor = node.walk();
        let namespace_export = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "namespace_export");
        if let Some(ns) = namespace_export {
            let mut inner = ns.walk();
            let local = ns.named_children(&mut inner).next().and_then(|c| self.text(c));
            return local
                .map(|local| ImportBinding {
                    local,
                    imported: "*".to_string(),
                })
                .into_iter()
                .collect();
        }
        if has_token(node, "*") {
            return vec![ImportBinding {
                local: "*".to_string(),
                imported: "*".to_string(),
            }];
        }
        self.export_specifiers(node)
            .into_iter()
            .map(|(name, alias)| ImportBinding {
                local: alias.unwrap_or_else(|| name.clone()),
                imported: name,
            })
            .collect()
    }

    /// `module.exports = X`, `module.exports = { A, B: C }` and `exports.A = X`.
    fn commonjs_export(&mut self, assignment: Node) {
        let (Some(left), Some(right)) = (
            assignment.child_by_field_name("left"),
            assignment.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() != "member_expression" {
            return;
        }
        let Some(target) = self.text(left) else {
            return;
        };

        if target == "module.exports" {
            match right.kind() {
                "identifier" => {
                    if let Some(name) = self.text(right) {
                        self.exported_names.insert(name.clone());
                        self.facts.default_export = Some(name);
                    }
                }
                "object" => {
                    let mut cursor = right.walk();
                    let members: Vec<Node> = right.named_children(&mut cursor).collect();
                    for member in members {
                        match member.kind() {
                            "shorthand_property_identifier" => {
                                if let Some(name) = self.text(member) {
                                    self.exported_names.insert(name);
                                }
                            }
                            "pair" => {
                                let key = member.child_by_field_name("key").and_then(|k| self.text(k));
                                let value = member
                                    .child_by_field_name("value")
                                    .filter(|v| v.kind() == "identifier")
                                    .and_then(|v| self.text(v));
                                if let (Some(key), Some(value)) = (key, value) {
                                    self.exported_names.insert(value.clone());
                                    self.facts.export_aliases.insert(key, value);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {
                    if let Some(name) = self.declaration(right, true, None) {
                        self.facts.default_export = Some(name);
                    }
                }
            }
            return;
        }

        let property = target
            .strip_prefix("module.exports.")
            .or_else(|| target.strip_prefix("exports."));
        let Some(property) = property.filter(|p| !p.contains('.')) else {
            return;
        };
        let local = match right.kind() {
            "identifier" => self.text(right),
            _ => self.declaration(right, true, None),
        };
        if let Some(local) = local {
            self.exported_names.insert(local.clone());
            self.facts.export_aliases.insert(property.to_string(), local);
        }
    }

    /// `require('x')` and `import('x')` anywhere in the file.
    fn calls(&mut self, root: Node) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.kind() == "call_expression" {
                if let Some(specifier) = self.call_specifier(node) {
                    self.facts.references.push(ModuleReference {
                        specifier,
                        line: line(node.start_position()),
                        kind: EdgeKind::Imports,
                        type_only: false,
                        bindings: self.require_bindings(node),
                    });
                }
            }
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            // Reverse so the walk stays in source order
            stack.extend(children.into_iter().rev());
        }
        self.facts.references.sort_by_key(|r| r.line);
    }

    /// Names bound by `const X = require(..)` or `const { A, B: C } = require(..)`.
    fn require_bindings(&self, call: Node) -> Vec<ImportBinding> {
        let mut bindings = Vec::new();
        let Some(declarator) = call.parent().filter(|p| p.kind() == "variable_declarator") else {
            return bindings;
        };
        if declarator.child_by_field_name("value") != Some(call) {
            return bindings;
        }
        let Some(pattern) = declarator.child_by_field_name("name") else {
            return bindings;
        };

        match pattern.kind() {
            "identifier" => {
                if let Some(local) = self.text(pattern) {
                    bindings.push(ImportBinding {
                        local,
                        imported: "default".to_string(),
                    });
                }
            }
            "object_pattern" => {
                let mut cursor = pattern.walk();
                for property in pattern.named_children(&mut cursor) {
                    match property.kind() {
                        "shorthand_property_identifier_pattern" => {
                            if let Some(name) = self.text(property) {
                                bindings.push(ImportBinding {
                                    local: name.clone(),
                                    imported: name,
                                });
                            }
                        }
                        "pair_pattern" => {
                            let key = property.child_by_field_name("key").and_then(|k| self.text(k));
                            let value = property
                                .child_by_field_name("value")
                                .filter(|v| v.kind() == "identifier")
                                .and_then(|v| self.text(v));
                            if let (Some(imported), Some(local)) = (key, value) {
                                bindings.push(ImportBinding { local, imported });
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        bindings
    }

    fn call_specifier(&self, call: Node) -> Option<String> {
        let function = call.child_by_field_name("function")?;
        let is_loader = match function.kind() {
            "import" => true,
            "identifier" => function.utf8_text(self.source).ok() == Some("require"),
            _ => false,
        };
        if !is_loader {
            return None;
        }
        let arguments = call.child_by_field_name("arguments")?;
        let first = arguments.named_child(0)?;
        self.string_value(first)
    }
}

fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == token);
    found
}
