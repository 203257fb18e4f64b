//! Language front ends: the in-process TypeScript extractor and the
//! interpreter runtimes driven by the subprocess backend

pub mod php;
pub mod ruby;
pub mod tsconfig;
pub mod typescript;

pub use php::PhpRuntime;
pub use ruby::RubyRuntime;
pub use tsconfig::PathAliasResolver;
pub use typescript::{Dialect, ModuleFacts};
