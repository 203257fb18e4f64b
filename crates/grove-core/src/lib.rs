//! Grove Core: graph schema, error taxonomy, options and symbol table

pub mod builder;
pub mod cancel;
pub mod error;
pub mod model;
pub mod options;
pub mod result;
pub mod symbols;


pub use builder::{EdgeTarget, GraphBuilder, Relation};
pub use cancel::CancellationFlag;
pub use error::{FileProcessingError, GraphError, Result};
pub use model::{
    ChangeStatus, CodeEdge, CodeGraphSchema, CodeNode, EdgeKind, Language, NodeKind, Position,
    SkippedFile, EXTERNAL_PREFIX, PARSER_VERSION, edge_id, placeholder_id, symbol_id,
};
pub use options::{CONFIG_FILE, ParseOptions};
pub use result::SafeResult;
pub use symbols::{SymbolEntry, SymbolTable};
