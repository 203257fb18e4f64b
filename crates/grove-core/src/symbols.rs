//! Symbol table for cross-file resolution

use dashmap::DashMap;

/// Where a qualified name was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub node_id: String,
    pub file_path: String,
}

/// Maps qualified names to the node that declares them. Thread-safe for
/// concurrent inserts; the first declaration of a name wins.
pub struct SymbolTable {
    symbols: DashMap<String, SymbolEntry>,
    /// file path -> qualified names declared in that file
    file_symbols: DashMap<String, Vec<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: DashMap::new(),
            file_symbols: DashMap::new(),
        }
    }

    /// Insert a symbol. Returns false when the name was already declared.
    pub fn insert(&self, qualified_name: &str, node_id: &str, file_path: &str) -> bool {
        let mut inserted = false;
        self.symbols
            .entry(qualified_name.to_string())
            .or_insert_with(|| {
                inserted = true;
                SymbolEntry {
                    node_id: node_id.to_string(),
                    file_path: file_path.to_string(),
                }
            });
        self.file_symbols
            .entry(file_path.to_string())
            .or_default()
            .push(qualified_name.to_string());
        inserted
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<SymbolEntry> {
        self.symbols.get(qualified_name).map(|r| r.value().clone())
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.symbols.contains_key(qualified_name)
    }

    /// Qualified names declared in a file, in insertion order.
    pub fn symbols_in_file(&self, file_path: &str) -> Vec<String> {
        self.file_symbols
            .get(file_path)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
