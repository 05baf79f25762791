//! TypeScript parsing via tree-sitter, plus the parsed-AST cache.
//!
//! The parser is the external collaborator here; this module only wraps it
//! behind the shape the indexers need: parse bytes into a [`ParsedFile`]
//! and keep recently parsed files in an LRU keyed by content hash, so the
//! two indexing passes never parse the same content twice.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;

use crate::error::{EngineError, Result};

/// A parsed source file: the tree plus the bytes it was parsed from.
/// Extractors slice the source through tree-sitter byte ranges.
pub struct ParsedFile {
    pub tree: tree_sitter::Tree,
    pub source: Vec<u8>,
}

impl ParsedFile {
    /// UTF-8 text of a node, if the slice is valid.
    pub fn text_of(&self, node: &tree_sitter::Node) -> Option<&str> {
        let bytes = self.source.get(node.start_byte()..node.end_byte())?;
        std::str::from_utf8(bytes).ok()
    }
}

/// Parser for TypeScript sources.
pub struct TsParser {
    parser: tree_sitter::Parser,
}

impl TsParser {
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_typescript::language_typescript())
            .map_err(|e| EngineError::Parse {
                path: PathBuf::new(),
                message: format!("failed to load typescript grammar: {e}"),
            })?;
        Ok(Self { parser })
    }

    /// Parse `source`. Tree-sitter produces a tree even for broken input;
    /// only a wholesale refusal (cancellation, grammar mismatch) maps to a
    /// parse error.
    pub fn parse(&mut self, path: &std::path::Path, source: Vec<u8>) -> Result<ParsedFile> {
        match self.parser.parse(&source, None) {
            Some(tree) => Ok(ParsedFile { tree, source }),
            None => Err(EngineError::Parse {
                path: path.to_path_buf(),
                message: "parser returned no tree".to_string(),
            }),
        }
    }
}

/// LRU cache of parsed files keyed by (file key, content hash). Keying on
/// the hash makes stale entries unreachable rather than invalidated.
pub struct AstCache {
    cache: LruCache<(String, String), Arc<ParsedFile>>,
}

impl AstCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, file_key: &str, content_hash: &str) -> Option<Arc<ParsedFile>> {
        self.cache
            .get(&(file_key.to_string(), content_hash.to_string()))
            .cloned()
    }

    pub fn put(&mut self, file_key: &str, content_hash: &str, parsed: Arc<ParsedFile>) {
        self.cache
            .put((file_key.to_string(), content_hash.to_string()), parsed);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
