//! Symbol extraction from parsed TypeScript trees.

use tree_sitter::Node;

use super::{Heritage, HeritageKind, Modifiers, Param, RawMember, RawSymbol, Span, SymbolKind};
use crate::parser::ParsedFile;

/// Extract all top-level symbol declarations from a parsed file.
///
/// Children of classes, interfaces, and enums come back attached to their
/// parent as [`RawMember`]s; the symbol indexer flattens them into rows.
pub fn extract_symbols(parsed: &ParsedFile) -> Vec<RawSymbol> {
    let root = parsed.tree.root_node();
    let mut symbols = Vec::new();

    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        collect_statement(parsed, &child, false, &mut symbols);
    }

    symbols
}

/// Handle one top-level statement, unwrapping `export` and `declare`.
fn collect_statement(
    parsed: &ParsedFile,
    node: &Node,
    exported: bool,
    out: &mut Vec<RawSymbol>,
) {
    match node.kind() {
        "export_statement" => {
            if let Some(decl) = node.child_by_field_name("declaration") {
                collect_statement(parsed, &decl, true, out);
            }
            // `export default <expr>` and bare export clauses declare no
            // new symbol here.
        }
        "ambient_declaration" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.is_named() && child.kind() != "comment" {
                    collect_statement(parsed, &child, exported, out);
                }
            }
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(symbol) = extract_function(parsed, node, exported) {
                out.push(symbol);
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(symbol) = extract_class(parsed, node, exported) {
                out.push(symbol);
            }
        }
        "interface_declaration" => {
            if let Some(symbol) = extract_interface(parsed, node, exported) {
                out.push(symbol);
            }
        }
        "enum_declaration" => {
            if let Some(symbol) = extract_enum(parsed, node, exported) {
                out.push(symbol);
            }
        }
        "type_alias_declaration" => {
            if let Some(name) = name_of(parsed, node) {
                out.push(RawSymbol {
                    name,
                    kind: SymbolKind::TypeAlias,
                    span: span_of(node),
                    exported,
                    modifiers: Modifiers::default(),
                    params: Vec::new(),
                    return_type: None,
                    members: Vec::new(),
                    heritage: Vec::new(),
                    decorators: Vec::new(),
                    doc: doc_of(parsed, node),
                });
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name_node) = declarator.child_by_field_name("name") else {
                    continue;
                };
                if name_node.kind() != "identifier" {
                    // Destructuring patterns declare bindings we do not track
                    // as standalone symbols.
                    continue;
                }
                let Some(name) = parsed.text_of(&name_node) else {
                    continue;
                };
                out.push(RawSymbol {
                    name: name.to_string(),
                    kind: SymbolKind::Variable,
                    span: span_of(&declarator),
                    exported,
                    modifiers: Modifiers::default(),
                    params: Vec::new(),
                    return_type: None,
                    members: Vec::new(),
                    heritage: Vec::new(),
                    decorators: Vec::new(),
                    doc: doc_of(parsed, node),
                });
            }
        }
        _ => {}
    }
}

fn extract_function(parsed: &ParsedFile, node: &Node, exported: bool) -> Option<RawSymbol> {
    let name = name_of(parsed, node)?;
    let mut modifiers = Modifiers::default();
    if has_keyword(node, "async") {
        modifiers.insert(Modifiers::ASYNC);
    }

    Some(RawSymbol {
        name,
        kind: SymbolKind::Function,
        span: span_of(node),
        exported,
        modifiers,
        params: params_of(parsed, node),
        return_type: return_type_of(parsed, node),
        members: Vec::new(),
        heritage: Vec::new(),
        decorators: Vec::new(),
        doc: doc_of(parsed, node),
    })
}

fn extract_class(parsed: &ParsedFile, node: &Node, exported: bool) -> Option<RawSymbol> {
    let name = name_of(parsed, node)?;
    let mut modifiers = Modifiers::default();
    if node.kind() == "abstract_class_declaration" {
        modifiers.insert(Modifiers::ABSTRACT);
    }

    let mut heritage = Vec::new();
    let mut decorators = Vec::new();
    let mut members = Vec::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "decorator" => {
                if let Some(text) = parsed.text_of(&child) {
                    decorators.push(text.to_string());
                }
            }
            "class_heritage" => collect_class_heritage(parsed, &child, &mut heritage),
            "class_body" => collect_class_members(parsed, &child, &mut members),
            _ => {}
        }
    }

    Some(RawSymbol {
        name,
        kind: SymbolKind::Class,
        span: span_of(node),
        exported,
        modifiers,
        params: Vec::new(),
        return_type: None,
        members,
        heritage,
        decorators,
        doc: doc_of(parsed, node),
    })
}

fn collect_class_heritage(parsed: &ParsedFile, node: &Node, out: &mut Vec<Heritage>) {
    let mut cursor = node.walk();
    for clause in node.children(&mut cursor) {
        match clause.kind() {
            "extends_clause" => {
                let mut inner = clause.walk();
                for value in clause.children(&mut inner) {
                    if matches!(value.kind(), "identifier" | "member_expression") {
                        if let Some(text) = parsed.text_of(&value) {
                            out.push(Heritage {
                                kind: HeritageKind::Extends,
                                name: text.to_string(),
                            });
                        }
                    }
                }
            }
            "implements_clause" => {
                let mut inner = clause.walk();
                for ty in clause.children(&mut inner) {
                    if matches!(ty.kind(), "type_identifier" | "generic_type") {
                        if let Some(name) = base_type_name(parsed, &ty) {
                            out.push(Heritage {
                                kind: HeritageKind::Implements,
                                name,
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn collect_class_members(parsed: &ParsedFile, body: &Node, out: &mut Vec<RawMember>) {
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        match member.kind() {
            "method_definition" | "abstract_method_signature" => {
                let Some(name) = name_of(parsed, &member) else {
                    continue;
                };
                let mut modifiers = member_modifiers(parsed, &member);
                if member.kind() == "abstract_method_signature" {
                    modifiers.insert(Modifiers::ABSTRACT);
                }
                let kind = if name == "constructor" {
                    SymbolKind::Constructor
                } else if has_keyword(&member, "get") {
                    SymbolKind::Getter
                } else if has_keyword(&member, "set") {
                    SymbolKind::Setter
                } else {
                    SymbolKind::Method
                };
                out.push(RawMember {
                    name,
                    kind,
                    modifiers,
                    params: params_of(parsed, &member),
                    return_type: return_type_of(parsed, &member),
                    span: span_of(&member),
                });
            }
            "public_field_definition" => {
                let Some(name) = name_of(parsed, &member) else {
                    continue;
                };
                out.push(RawMember {
                    name,
                    kind: SymbolKind::Property,
                    modifiers: member_modifiers(parsed, &member),
                    params: Vec::new(),
                    return_type: type_annotation_of(parsed, &member),
                    span: span_of(&member),
                });
            }
            _ => {}
        }
    }
}

fn extract_interface(parsed: &ParsedFile, node: &Node, exported: bool) -> Option<RawSymbol> {
    let name = name_of(parsed, node)?;
    let mut heritage = Vec::new();
    let mut members = Vec::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "extends_type_clause" => {
                let mut inner = child.walk();
                for ty in child.children(&mut inner) {
                    if matches!(ty.kind(), "type_identifier" | "generic_type" | "nested_type_identifier") {
                        if let Some(name) = base_type_name(parsed, &ty) {
                            heritage.push(Heritage {
                                kind: HeritageKind::Extends,
                                name,
                            });
                        }
                    }
                }
            }
            "interface_body" | "object_type" => {
                let mut inner = child.walk();
                for member in child.children(&mut inner) {
                    match member.kind() {
                        "property_signature" => {
                            if let Some(name) = name_of(parsed, &member) {
                                members.push(RawMember {
                                    name,
                                    kind: SymbolKind::Property,
                                    modifiers: member_modifiers(parsed, &member),
                                    params: Vec::new(),
                                    return_type: type_annotation_of(parsed, &member),
                                    span: span_of(&member),
                                });
                            }
                        }
                        "method_signature" => {
                            if let Some(name) = name_of(parsed, &member) {
                                members.push(RawMember {
                                    name,
                                    kind: SymbolKind::Method,
                                    modifiers: member_modifiers(parsed, &member),
                                    params: params_of(parsed, &member),
                                    return_type: return_type_of(parsed, &member),
                                    span: span_of(&member),
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    Some(RawSymbol {
        name,
        kind: SymbolKind::Interface,
        span: span_of(node),
        exported,
        modifiers: Modifiers::default(),
        params: Vec::new(),
        return_type: None,
        members,
        heritage,
        decorators: Vec::new(),
        doc: doc_of(parsed, node),
    })
}

fn extract_enum(parsed: &ParsedFile, node: &Node, exported: bool) -> Option<RawSymbol> {
    let name = name_of(parsed, node)?;
    let mut members = Vec::new();

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            let (member_name, span) = match member.kind() {
                "property_identifier" => {
                    (parsed.text_of(&member).map(str::to_string), span_of(&member))
                }
                "enum_assignment" => {
                    let name = member
                        .child_by_field_name("name")
                        .and_then(|n| parsed.text_of(&n))
                        .map(str::to_string);
                    (name, span_of(&member))
                }
                _ => continue,
            };
            if let Some(member_name) = member_name {
                members.push(RawMember {
                    name: member_name,
                    kind: SymbolKind::Property,
                    modifiers: Modifiers::default(),
                    params: Vec::new(),
                    return_type: None,
                    span,
                });
            }
        }
    }

    Some(RawSymbol {
        name,
        kind: SymbolKind::Enum,
        span: span_of(node),
        exported,
        modifiers: Modifiers::default(),
        params: Vec::new(),
        return_type: None,
        members,
        heritage: Vec::new(),
        decorators: Vec::new(),
        doc: doc_of(parsed, node),
    })
}

fn span_of(node: &Node) -> Span {
    Span {
        start: node.start_byte(),
        end: node.end_byte(),
    }
}

fn name_of(parsed: &ParsedFile, node: &Node) -> Option<String> {
    let name_node = node.child_by_field_name("name")?;
    parsed.text_of(&name_node).map(str::to_string)
}

/// Whether the node has an anonymous keyword child (`async`, `get`, `set`).
fn has_keyword(node: &Node, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == keyword);
    result
}

fn member_modifiers(parsed: &ParsedFile, node: &Node) -> Modifiers {
    let mut modifiers = Modifiers::default();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "accessibility_modifier" => match parsed.text_of(&child) {
                Some("private") => modifiers.insert(Modifiers::PRIVATE),
                Some("protected") => modifiers.insert(Modifiers::PROTECTED),
                Some("public") => modifiers.insert(Modifiers::PUBLIC),
                _ => {}
            },
            "static" => modifiers.insert(Modifiers::STATIC),
            "readonly" => modifiers.insert(Modifiers::READONLY),
            "async" => modifiers.insert(Modifiers::ASYNC),
            _ => {}
        }
    }
    modifiers
}

fn params_of(parsed: &ParsedFile, node: &Node) -> Vec<Param> {
    let Some(parameters) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut params = Vec::new();
    let mut cursor = parameters.walk();
    for param in parameters.children(&mut cursor) {
        let optional = match param.kind() {
            "required_parameter" => false,
            "optional_parameter" => true,
            _ => continue,
        };
        let name = param
            .child_by_field_name("pattern")
            .and_then(|p| parsed.text_of(&p))
            .unwrap_or("_")
            .to_string();
        let type_text = param
            .child_by_field_name("type")
            .and_then(|t| t.named_child(0))
            .and_then(|t| parsed.text_of(&t))
            .map(str::to_string);
        params.push(Param {
            name,
            type_text,
            optional,
        });
    }
    params
}

fn return_type_of(parsed: &ParsedFile, node: &Node) -> Option<String> {
    let annotation = node.child_by_field_name("return_type")?;
    let ty = annotation.named_child(0)?;
    parsed.text_of(&ty).map(str::to_string)
}

fn type_annotation_of(parsed: &ParsedFile, node: &Node) -> Option<String> {
    let annotation = node.child_by_field_name("type")?;
    let ty = annotation.named_child(0)?;
    parsed.text_of(&ty).map(str::to_string)
}

/// Base identifier of a heritage type, stripping generic arguments:
/// `Repository<User>` → `Repository`.
fn base_type_name(parsed: &ParsedFile, node: &Node) -> Option<String> {
    match node.kind() {
        "type_identifier" => parsed.text_of(node).map(str::to_string),
        "generic_type" => {
            let name = node.child_by_field_name("name")?;
            parsed.text_of(&name).map(str::to_string)
        }
        _ => parsed.text_of(node).map(str::to_string),
    }
}

/// JSDoc block immediately preceding the declaration, if any.
fn doc_of(parsed: &ParsedFile, node: &Node) -> Option<String> {
    // When the declaration is wrapped in an export statement the comment
    // precedes the wrapper.
    let anchor = match node.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => *node,
    };
    let prev = anchor.prev_named_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let text = parsed.text_of(&prev)?;
    if text.starts_with("/**") {
        Some(text.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TsParser;
    use std::path::Path;

    fn parse(source: &str) -> ParsedFile {
        TsParser::new()
            .unwrap()
            .parse(Path::new("test.ts"), source.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn extracts_exported_const() {
        let parsed = parse("export const A = 1;\nconst hidden = 2;");
        let symbols = extract_symbols(&parsed);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "A");
        assert_eq!(symbols[0].kind, SymbolKind::Variable);
        assert!(symbols[0].exported);
        assert!(!symbols[1].exported);
    }

    #[test]
    fn extracts_async_function_with_params() {
        let parsed = parse("export async function fetchUser(id: string, force?: boolean): Promise<void> {}");
        let symbols = extract_symbols(&parsed);
        assert_eq!(symbols.len(), 1);
        let f = &symbols[0];
        assert_eq!(f.kind, SymbolKind::Function);
        assert!(f.modifiers.has(Modifiers::ASYNC));
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[0].name, "id");
        assert_eq!(f.params[0].type_text.as_deref(), Some("string"));
        assert!(f.params[1].optional);
        assert_eq!(f.return_type.as_deref(), Some("Promise<void>"));
    }

    #[test]
    fn extracts_class_members_and_heritage() {
        let parsed = parse(
            r#"
export class UserStore extends BaseStore implements Disposable {
    private count = 0;
    static readonly LIMIT: number = 10;
    constructor(name: string) {}
    get size(): number { return this.count; }
    async load(id: string) {}
}
"#,
        );
        let symbols = extract_symbols(&parsed);
        assert_eq!(symbols.len(), 1);
        let class = &symbols[0];
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.heritage.len(), 2);
        assert_eq!(class.heritage[0].kind, HeritageKind::Extends);
        assert_eq!(class.heritage[0].name, "BaseStore");
        assert_eq!(class.heritage[1].kind, HeritageKind::Implements);
        assert_eq!(class.heritage[1].name, "Disposable");

        let names: Vec<&str> = class.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["count", "LIMIT", "constructor", "size", "load"]);

        let count = &class.members[0];
        assert_eq!(count.kind, SymbolKind::Property);
        assert!(count.modifiers.has(Modifiers::PRIVATE));

        let limit = &class.members[1];
        assert!(limit.modifiers.has(Modifiers::STATIC));
        assert!(limit.modifiers.has(Modifiers::READONLY));

        assert_eq!(class.members[2].kind, SymbolKind::Constructor);
        assert_eq!(class.members[3].kind, SymbolKind::Getter);
        let load = &class.members[4];
        assert_eq!(load.kind, SymbolKind::Method);
        assert!(load.modifiers.has(Modifiers::ASYNC));
    }

    #[test]
    fn extracts_interface_and_enum_members() {
        let parsed = parse(
            r#"
export interface Shape {
    area: number;
    resize(factor: number): void;
}
export enum Color { Red, Green = 2 }
export type Alias = Shape | null;
"#,
        );
        let symbols = extract_symbols(&parsed);
        assert_eq!(symbols.len(), 3);

        let shape = &symbols[0];
        assert_eq!(shape.kind, SymbolKind::Interface);
        assert_eq!(shape.members.len(), 2);
        assert_eq!(shape.members[0].kind, SymbolKind::Property);
        assert_eq!(shape.members[1].kind, SymbolKind::Method);
        assert_eq!(shape.members[1].params.len(), 1);

        let color = &symbols[1];
        assert_eq!(color.kind, SymbolKind::Enum);
        let names: Vec<&str> = color.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Red", "Green"]);

        assert_eq!(symbols[2].kind, SymbolKind::TypeAlias);
    }

    #[test]
    fn captures_jsdoc() {
        let parsed = parse("/** Adds numbers. */\nexport function add(a: number, b: number) { return a + b; }");
        let symbols = extract_symbols(&parsed);
        assert_eq!(symbols[0].doc.as_deref(), Some("/** Adds numbers. */"));
    }
}
