//! Grove Indexer: language detection, parser backends and dispatch

pub mod backend;
pub mod detect;
pub mod dispatch;
pub mod languages;
pub mod managed;
pub mod paths;
pub mod process_pool;
pub mod subprocess;
pub mod walk;

#[cfg(test)]
pub mod tests;

#[cfg(test)]
pub mod test_utils;

pub use backend::{Availability, ParserBackend};
pub use detect::DEFAULT_CENSUS_DEPTH;
pub use dispatch::{
    Backend, detect_language, detect_language_safe, parse_code_graph, parse_code_graph_async,
    parse_code_graph_safe, parse_code_graph_with_cancel,
};
pub use languages::php::{has_php_parser, is_php_available};
pub use languages::ruby::{has_parser_gem, is_ruby_available};
pub use managed::TypeScriptBackend;
pub use process_pool::{Invocation, ProcessError, ProcessPool};
pub use subprocess::{ScriptRuntime, SubprocessBackend};
