//! Ruby runtime: `ruby` plus the `parser` gem

use std::path::{Path, PathBuf};

use grove_core::{CodeNode, EdgeKind, EdgeTarget, GraphBuilder, Language, NodeKind, ParseOptions, SymbolTable, symbol_id};
use serde::Deserialize;

use crate::backend::Availability;
use crate::paths::{join_normalized, parent_dir};
use crate::process_pool::{Invocation, PROBE_TIMEOUT, run_probe};
use crate::subprocess::ScriptRuntime;
use crate::walk::{RUBY_PROFILE, SourceFile, SourceProfile};

pub const RUBY_BIN_ENV: &str = "GROVE_RUBY_BIN";

const INSTALL_HINT: &str = "Install Ruby 2.7+ and the parser gem (`gem install parser`)";

/// Load paths tried, in order, for a plain `require`.
const REQUIRE_ROOTS: &[&str] = &["", "lib", "app"];

const EXTRACTOR: &str = r##"
require "json"
begin
  require "parser/current"
rescue LoadError => e
  warn e.message
  exit 4
end

def const_name(node)
  return nil unless node.is_a?(Parser::AST::Node)
  case node.type
  when :const
    scope = node.children[0]
    name = node.children[1].to_s
    return name if scope.nil?
    outer = const_name(scope)
    outer.nil? ? nil : "#{outer}::#{name}"
  when :cbase
    ""
  end
end

def visit(node, scope, decl, out)
  return unless node.is_a?(Parser::AST::Node)
  case node.type
  when :class, :module
    name = const_name(node.children[0])
    if name
      qualified = if name.start_with?("::")
        name.delete_prefix("::")
      else
        scope.empty? ? name : "#{scope}::#{name}"
      end
      parts = qualified.split("::")
      entry = {
        "name" => parts.last,
        "qualifiedName" => qualified,
        "kind" => node.type.to_s,
        "namespace" => parts[0...-1].join("::"),
        "scope" => scope,
        "line" => node.loc.line,
        "endLine" => node.loc.last_line,
        "superclass" => node.type == :class ? const_name(node.children[1]) : nil,
        "mixins" => []
      }
      out["declarations"] << entry
      body = node.type == :class ? node.children[2] : node.children[1]
      visit(body, qualified, entry, out)
      return
    end
  when :send
    receiver, method, *args = *node
    if receiver.nil? && %i[include extend prepend].include?(method)
      args.each do |arg|
        name = const_name(arg)
        next unless name
        mixin = { "name" => name, "kind" => method.to_s, "line" => node.loc.line }
        (decl ? decl["mixins"] : out["fileMixins"]) << mixin
      end
    elsif receiver.nil? && %i[require require_relative load].include?(method) &&
          args[0].is_a?(Parser::AST::Node) && args[0].type == :str
      out["requires"] << {
        "path" => args[0].children[0],
        "relative" => method == :require_relative,
        "line" => node.loc.line
      }
    end
  end
  node.children.each { |child| visit(child, scope, decl, out) }
end

file = ARGV[0]
source = File.binread(file).force_encoding("UTF-8")
unless source.valid_encoding?
  warn "#{file}: not valid UTF-8"
  exit 5
end

buffer = Parser::Source::Buffer.new(file)
buffer.source = source
parser = Parser::CurrentRuby.new
parser.diagnostics.all_errors_are_fatal = true
parser.diagnostics.ignore_warnings = true
begin
  ast = parser.parse(buffer)
rescue Parser::SyntaxError => e
  warn e.message
  exit 3
end

out = { "declarations" => [], "requires" => [], "fileMixins" => [] }
visit(ast, "", nil, out)
puts JSON.generate(out)
"##;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RubyKind {
    Class,
    Module,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RubyMixin {
    pub name: String,
    /// `include`, `extend` or `prepend`
    pub kind: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubyDeclaration {
    pub name: String,
    pub qualified_name: String,
    pub kind: RubyKind,
    #[serde(default)]
    pub namespace: String,
    /// Lexical scope the declaration appears in.
    #[serde(default)]
    pub scope: String,
    pub line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub mixins: Vec<RubyMixin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RubyRequire {
    pub path: String,
    #[serde(default)]
    pub relative: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RubyFacts {
    pub declarations: Vec<RubyDeclaration>,
    pub requires: Vec<RubyRequire>,
    pub file_mixins: Vec<RubyMixin>,
}

fn default_binary() -> PathBuf {
    std::env::var_os(RUBY_BIN_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ruby"))
}

fn probe_interpreter(binary: &Path) -> Availability {
    run_probe(binary, &["--version"], PROBE_TIMEOUT)
}

fn probe_parser_gem(binary: &Path) -> Availability {
    match run_probe(binary, &["-e", "require 'parser/current'"], PROBE_TIMEOUT) {
        Availability::Available => Availability::Available,
        Availability::Unavailable { reason } => {
            Availability::unavailable(format!("the parser gem is not installed: {reason}"))
        }
    }
}

/// Whether a Ruby interpreter can be started.
pub fn is_ruby_available() -> bool {
    probe_interpreter(&default_binary()).is_available()
}

/// Whether the `parser` gem can be required.
pub fn has_parser_gem() -> bool {
    probe_parser_gem(&default_binary()).is_available()
}

pub struct RubyRuntime {
    binary: PathBuf,
}

impl RubyRuntime {
    pub fn new(options: &ParseOptions) -> Self {
        RubyRuntime {
            binary: options.ruby_binary.clone().unwrap_or_else(default_binary),
        }
    }
}

impl ScriptRuntime for RubyRuntime {
    type Facts = RubyFacts;

    fn name(&self) -> &'static str {
        "ruby"
    }

    fn language(&self) -> Language {
        Language::Ruby
    }

    fn profile(&self) -> &'static SourceProfile {
        &RUBY_PROFILE
    }

    fn probe(&self) -> Availability {
        match probe_interpreter(&self.binary) {
            Availability::Available => probe_parser_gem(&self.binary),
            unavailable => unavailable,
        }
    }

    fn install_hint(&self) -> &'static str {
        INSTALL_HINT
    }

    fn invocation(&self, root: &Path, file: &SourceFile) -> Invocation {
        Invocation::new(&self.binary)
            .arg("-e")
            .arg(EXTRACTOR)
            .arg("--")
            .arg(&file.absolute)
            .current_dir(root)
    }

    fn assemble(&self, builder: &mut GraphBuilder, files: &[(SourceFile, RubyFacts)]) {
        assemble_ruby(builder, files);
    }
}

fn with_rb(path: &str) -> String {
    if path.ends_with(".rb") {
        path.to_string()
    } else {
        format!("{path}.rb")
    }
}

fn require_target(builder: &GraphBuilder, file: &str, require: &RubyRequire) -> EdgeTarget {
    let path = with_rb(&require.path);
    let found = if require.relative {
        join_normalized(parent_dir(file), &path).filter(|c| builder.has_node(c))
    } else {
        REQUIRE_ROOTS
            .iter()
            .filter_map(|root| join_normalized(root, &path))
            .find(|c| builder.has_node(c))
    };
    match found {
        Some(target) => EdgeTarget::Node(target),
        None => EdgeTarget::External(require.path.clone()),
    }
}

/// Resolve a constant reference from the innermost lexical scope outward.
fn constant_target(symbols: &SymbolTable, name: &str, scope: &str) -> EdgeTarget {
    if let Some(absolute) = name.strip_prefix("::") {
        return match symbols.lookup(absolute) {
            Some(entry) => EdgeTarget::Node(entry.node_id),
            None => EdgeTarget::External(absolute.to_string()),
        };
    }

    let mut scope = scope;
    loop {
        let candidate = if scope.is_empty() {
            name.to_string()
        } else {
            format!("{scope}::{name}")
        };
        if let Some(entry) = symbols.lookup(&candidate) {
            return EdgeTarget::Node(entry.node_id);
        }
        if scope.is_empty() {
            break;
        }
        scope = scope.rsplit_once("::").map_or("", |(outer, _)| outer);
    }
    EdgeTarget::External(name.to_string())
}

/// Build nodes and edges from the facts of every Ruby file in the run.
/// Reopened classes keep the node of the first file in path order.
pub fn assemble_ruby(builder: &mut GraphBuilder, files: &[(SourceFile, RubyFacts)]) {
    let symbols = SymbolTable::new();

    for (file, facts) in files {
        let path = file.relative.as_str();
        builder.add_node(CodeNode::file(path, Language::Ruby));
        for decl in &facts.declarations {
            let kind = match decl.kind {
                RubyKind::Class => NodeKind::Class,
                RubyKind::Module => NodeKind::Module,
            };
            let node = CodeNode::symbol(path, &decl.qualified_name, &decl.name, kind, Language::Ruby)
                .with_span(decl.line, decl.end_line)
                .with_namespace(Some(decl.namespace.clone()))
                .exported(true);
            let id = node.id.clone();
            builder.add_node(node);
            symbols.insert(&decl.qualified_name, &id, path);
        }
    }

    for (file, facts) in files {
        let path = file.relative.as_str();

        for require in &facts.requires {
            let target = require_target(builder, path, require);
            builder.add_relation(
                EdgeKind::Imports,
                path,
                target,
                Some(require.line),
                Some(require.path.clone()),
            );
        }

        for mixin in &facts.file_mixins {
            let target = constant_target(&symbols, &mixin.name, "");
            builder.add_relation(EdgeKind::Includes, path, target, Some(mixin.line), Some(mixin.name.clone()));
        }

        for decl in &facts.declarations {
            let source = symbol_id(path, &decl.qualified_name);
            if let Some(superclass) = &decl.superclass {
                // The superclass expression is evaluated outside the class body
                let target = constant_target(&symbols, superclass, &decl.scope);
                builder.add_relation(
                    EdgeKind::Extends,
                    source.clone(),
                    target,
                    Some(decl.line),
                    Some(superclass.clone()),
                );
            }
            for mixin in &decl.mixins {
                let target = constant_target(&symbols, &mixin.name, &decl.qualified_name);
                builder.add_relation(
                    EdgeKind::Includes,
                    source.clone(),
                    target,
                    Some(mixin.line),
                    Some(mixin.name.clone()),
                );
            }
        }
    }
}
