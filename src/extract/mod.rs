//! Extractor adapters: parsed ASTs in, flat facts out.
//!
//! Two pure functions live here. [`symbols::extract_symbols`] turns a tree
//! into declared-symbol descriptors; [`relations::extract_relations`] turns
//! it into raw relations whose destinations were picked by an injected
//! resolver. Neither touches the filesystem or the store.

pub mod relations;
pub mod symbols;

use std::path::PathBuf;

/// Kind of a declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Enum,
    TypeAlias,
    Variable,
    Method,
    Property,
    Getter,
    Setter,
    Constructor,
}

impl SymbolKind {
    /// Normalized string key used for storage.
    pub fn as_key(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::TypeAlias => "type",
            SymbolKind::Variable => "variable",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Getter => "getter",
            SymbolKind::Setter => "setter",
            SymbolKind::Constructor => "constructor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(SymbolKind::Function),
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "enum" => Some(SymbolKind::Enum),
            "type" => Some(SymbolKind::TypeAlias),
            "variable" => Some(SymbolKind::Variable),
            "method" => Some(SymbolKind::Method),
            "property" => Some(SymbolKind::Property),
            "getter" => Some(SymbolKind::Getter),
            "setter" => Some(SymbolKind::Setter),
            "constructor" => Some(SymbolKind::Constructor),
            _ => None,
        }
    }

    /// Whether symbols of this kind carry a callable signature.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function
                | SymbolKind::Method
                | SymbolKind::Getter
                | SymbolKind::Setter
                | SymbolKind::Constructor
        )
    }
}

/// Type of a directed relation between files/symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RelationType {
    Imports,
    TypeReferences,
    ReExports,
    Calls,
    Extends,
    Implements,
}

impl RelationType {
    pub fn as_key(&self) -> &'static str {
        match self {
            RelationType::Imports => "imports",
            RelationType::TypeReferences => "type-references",
            RelationType::ReExports => "re-exports",
            RelationType::Calls => "calls",
            RelationType::Extends => "extends",
            RelationType::Implements => "implements",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "imports" => Some(RelationType::Imports),
            "type-references" => Some(RelationType::TypeReferences),
            "re-exports" => Some(RelationType::ReExports),
            "calls" => Some(RelationType::Calls),
            "extends" => Some(RelationType::Extends),
            "implements" => Some(RelationType::Implements),
            _ => None,
        }
    }

    /// The relation types that constitute file-level dependency edges.
    pub fn dependency_kinds() -> [RelationType; 3] {
        [
            RelationType::Imports,
            RelationType::TypeReferences,
            RelationType::ReExports,
        ]
    }
}

/// Declaration modifiers packed into a bitset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const PUBLIC: Modifiers = Modifiers(1 << 0);
    pub const PRIVATE: Modifiers = Modifiers(1 << 1);
    pub const PROTECTED: Modifiers = Modifiers(1 << 2);
    pub const STATIC: Modifiers = Modifiers(1 << 3);
    pub const READONLY: Modifiers = Modifiers(1 << 4);
    pub const ABSTRACT: Modifiers = Modifiers(1 << 5);
    pub const ASYNC: Modifiers = Modifiers(1 << 6);
    pub const DECLARE: Modifiers = Modifiers(1 << 7);

    pub fn insert(&mut self, flag: Modifiers) {
        self.0 |= flag.0;
    }

    pub fn has(&self, flag: Modifiers) -> bool {
        self.0 & flag.0 != 0
    }

    /// Visibility keyword, defaulting to `public` when none is written.
    pub fn visibility(&self) -> &'static str {
        if self.has(Modifiers::PRIVATE) {
            "private"
        } else if self.has(Modifiers::PROTECTED) {
            "protected"
        } else {
            "public"
        }
    }

    /// Modifier names in a stable order, for the detail blob.
    pub fn names(&self) -> Vec<&'static str> {
        const ALL: &[(Modifiers, &str)] = &[
            (Modifiers::PUBLIC, "public"),
            (Modifiers::PRIVATE, "private"),
            (Modifiers::PROTECTED, "protected"),
            (Modifiers::STATIC, "static"),
            (Modifiers::READONLY, "readonly"),
            (Modifiers::ABSTRACT, "abstract"),
            (Modifiers::ASYNC, "async"),
            (Modifiers::DECLARE, "declare"),
        ];
        ALL.iter()
            .filter(|(flag, _)| self.has(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Byte span of a declaration in its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub type_text: Option<String>,
    pub optional: bool,
}

/// Heritage clause kind on a class or interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeritageKind {
    Extends,
    Implements,
}

/// One heritage edge: `class A extends B` yields `(Extends, "B")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heritage {
    pub kind: HeritageKind,
    pub name: String,
}

/// A member of a class, interface, or enum, flattened by the symbol
/// indexer into its own row with a dotted name.
#[derive(Debug, Clone)]
pub struct RawMember {
    pub name: String,
    pub kind: SymbolKind,
    pub modifiers: Modifiers,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub span: Span,
}

/// A declared symbol as extracted from the AST, before persistence.
#[derive(Debug, Clone)]
pub struct RawSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub span: Span,
    pub exported: bool,
    pub modifiers: Modifiers,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub members: Vec<RawMember>,
    pub heritage: Vec<Heritage>,
    pub decorators: Vec<String>,
    pub doc: Option<String>,
}

/// A raw relation with its destination already picked from the injected
/// resolver's first candidate. Destinations are absolute at this stage;
/// the relation indexer rebases them onto the project root.
#[derive(Debug, Clone)]
pub struct RawRelation {
    pub rtype: RelationType,
    pub src_symbol: Option<String>,
    pub dst_file: PathBuf,
    pub dst_symbol: Option<String>,
    pub specifier: String,
}
