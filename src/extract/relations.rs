//! Relation extraction from parsed TypeScript trees.
//!
//! Destinations are resolved through the injected [`ImportResolver`]: the
//! first candidate it returns wins. The relation indexer injects a
//! known-file-filtering resolver here, which is what makes dangling
//! destinations impossible downstream.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tree_sitter::Node;

use super::{RawRelation, RelationType};
use crate::parser::ParsedFile;
use crate::resolver::ImportResolver;

/// One resolved import binding: local name → (destination file, exported name).
struct ImportBinding {
    file: PathBuf,
    exported: String,
}

/// Extract all raw relations from a parsed file.
///
/// Import and re-export declarations become `imports`/`re-exports` rows.
/// Calls, heritage clauses, and type references resolve their targets
/// through the per-file import map built from the same resolver.
pub fn extract_relations(
    parsed: &ParsedFile,
    file_path: &Path,
    resolver: &dyn ImportResolver,
) -> Vec<RawRelation> {
    let root = parsed.tree.root_node();
    let mut relations = Vec::new();
    let mut imports: HashMap<String, ImportBinding> = HashMap::new();

    let mut cursor = root.walk();
    for statement in root.children(&mut cursor) {
        match statement.kind() {
            "import_statement" => {
                collect_import(parsed, &statement, file_path, resolver, &mut relations, &mut imports);
            }
            "export_statement" => {
                collect_reexport(parsed, &statement, file_path, resolver, &mut relations);
            }
            _ => {}
        }
    }

    collect_heritage(parsed, &root, &imports, &mut relations);
    collect_calls_and_type_refs(parsed, &root, &imports, &mut relations);

    dedup(relations)
}

fn collect_import(
    parsed: &ParsedFile,
    statement: &Node,
    file_path: &Path,
    resolver: &dyn ImportResolver,
    relations: &mut Vec<RawRelation>,
    imports: &mut HashMap<String, ImportBinding>,
) {
    let Some(specifier) = source_specifier(parsed, statement) else {
        return;
    };
    let Some(dst_file) = resolver.resolve(file_path, &specifier).into_iter().next() else {
        return;
    };

    let mut bound_any = false;
    if let Some(clause) = child_of_kind(statement, "import_clause") {
        let mut cursor = clause.walk();
        for binding in clause.children(&mut cursor) {
            match binding.kind() {
                // `import Default from './x'`
                "identifier" => {
                    if let Some(local) = parsed.text_of(&binding) {
                        push_import(
                            relations,
                            imports,
                            local,
                            "default",
                            &dst_file,
                            &specifier,
                        );
                        bound_any = true;
                    }
                }
                // `import * as ns from './x'`
                "namespace_import" => {
                    if let Some(local) = child_of_kind(&binding, "identifier")
                        .and_then(|n| parsed.text_of(&n))
                    {
                        push_import(relations, imports, local, "*", &dst_file, &specifier);
                        bound_any = true;
                    }
                }
                // `import { A, B as C } from './x'`
                "named_imports" => {
                    let mut inner = binding.walk();
                    for spec in binding.children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(exported) = spec
                            .child_by_field_name("name")
                            .and_then(|n| parsed.text_of(&n))
                        else {
                            continue;
                        };
                        let local = spec
                            .child_by_field_name("alias")
                            .and_then(|n| parsed.text_of(&n))
                            .unwrap_or(exported);
                        push_import(relations, imports, local, exported, &dst_file, &specifier);
                        bound_any = true;
                    }
                }
                _ => {}
            }
        }
    }

    // Side-effect import: `import './x';` — a file edge with no binding.
    if !bound_any {
        relations.push(RawRelation {
            rtype: RelationType::Imports,
            src_symbol: None,
            dst_file,
            dst_symbol: None,
            specifier,
        });
    }
}

fn push_import(
    relations: &mut Vec<RawRelation>,
    imports: &mut HashMap<String, ImportBinding>,
    local: &str,
    exported: &str,
    dst_file: &Path,
    specifier: &str,
) {
    relations.push(RawRelation {
        rtype: RelationType::Imports,
        src_symbol: None,
        dst_file: dst_file.to_path_buf(),
        dst_symbol: Some(exported.to_string()),
        specifier: specifier.to_string(),
    });
    imports.insert(
        local.to_string(),
        ImportBinding {
            file: dst_file.to_path_buf(),
            exported: exported.to_string(),
        },
    );
}

fn collect_reexport(
    parsed: &ParsedFile,
    statement: &Node,
    file_path: &Path,
    resolver: &dyn ImportResolver,
    relations: &mut Vec<RawRelation>,
) {
    // Only `export ... from '...'` forms carry a source.
    let Some(specifier) = source_specifier(parsed, statement) else {
        return;
    };
    let Some(dst_file) = resolver.resolve(file_path, &specifier).into_iter().next() else {
        return;
    };

    let mut named_any = false;
    let mut cursor = statement.walk();
    for child in statement.children(&mut cursor) {
        match child.kind() {
            "export_clause" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() != "export_specifier" {
                        continue;
                    }
                    if let Some(name) = spec
                        .child_by_field_name("name")
                        .and_then(|n| parsed.text_of(&n))
                    {
                        relations.push(RawRelation {
                            rtype: RelationType::ReExports,
                            src_symbol: None,
                            dst_file: dst_file.clone(),
                            dst_symbol: Some(name.to_string()),
                            specifier: specifier.clone(),
                        });
                        named_any = true;
                    }
                }
            }
            // `export * as ns from './x'`
            "namespace_export" => {
                relations.push(RawRelation {
                    rtype: RelationType::ReExports,
                    src_symbol: None,
                    dst_file: dst_file.clone(),
                    dst_symbol: Some("*".to_string()),
                    specifier: specifier.clone(),
                });
                named_any = true;
            }
            _ => {}
        }
    }

    // `export * from './x'`
    if !named_any {
        relations.push(RawRelation {
            rtype: RelationType::ReExports,
            src_symbol: None,
            dst_file,
            dst_symbol: Some("*".to_string()),
            specifier,
        });
    }
}

/// Walk class and interface declarations, emitting `extends`/`implements`
/// edges for heritage names bound by imports.
fn collect_heritage(
    parsed: &ParsedFile,
    root: &Node,
    imports: &HashMap<String, ImportBinding>,
    relations: &mut Vec<RawRelation>,
) {
    walk(root, &mut |node| {
        let (clause_kinds, owner): (&[&str], Option<String>) = match node.kind() {
            "class_declaration" | "abstract_class_declaration" => {
                (&["class_heritage"], declaration_name(parsed, node))
            }
            // Grammar versions disagree on the interface clause name.
            "interface_declaration" => (
                &["extends_type_clause", "extends_clause"],
                declaration_name(parsed, node),
            ),
            _ => return,
        };

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if clause_kinds.contains(&child.kind()) {
                emit_heritage_clause(parsed, &child, owner.as_deref(), imports, relations);
            }
        }
    });
}

fn emit_heritage_clause(
    parsed: &ParsedFile,
    clause: &Node,
    owner: Option<&str>,
    imports: &HashMap<String, ImportBinding>,
    relations: &mut Vec<RawRelation>,
) {
    walk(clause, &mut |node| {
        let rtype = match enclosing_clause_kind(node, clause) {
            Some("extends_clause") | Some("extends_type_clause") => RelationType::Extends,
            Some("implements_clause") => RelationType::Implements,
            _ => {
                // A bare extends_type_clause has no nested clause node.
                if clause.kind() == "extends_type_clause" {
                    RelationType::Extends
                } else {
                    return;
                }
            }
        };
        if !matches!(node.kind(), "identifier" | "type_identifier") {
            return;
        }
        let Some(name) = parsed.text_of(node) else {
            return;
        };
        if let Some(binding) = imports.get(name) {
            relations.push(RawRelation {
                rtype,
                src_symbol: owner.map(str::to_string),
                dst_file: binding.file.clone(),
                dst_symbol: Some(binding.exported.clone()),
                specifier: name.to_string(),
            });
        }
    });
}

/// Nearest ancestor (up to `stop`) that is a heritage clause node.
fn enclosing_clause_kind<'a>(node: &Node<'a>, stop: &Node<'a>) -> Option<&'static str> {
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            "extends_clause" => return Some("extends_clause"),
            "implements_clause" => return Some("implements_clause"),
            "extends_type_clause" => return Some("extends_type_clause"),
            _ => {}
        }
        if n.id() == stop.id() {
            break;
        }
        current = n.parent();
    }
    None
}

/// Walk the whole tree emitting `calls` and `type-references` for
/// identifiers bound by imports.
fn collect_calls_and_type_refs(
    parsed: &ParsedFile,
    root: &Node,
    imports: &HashMap<String, ImportBinding>,
    relations: &mut Vec<RawRelation>,
) {
    walk(root, &mut |node| match node.kind() {
        "call_expression" | "new_expression" => {
            let callee = node
                .child_by_field_name("function")
                .or_else(|| node.child_by_field_name("constructor"));
            let Some(callee) = callee else { return };

            let target = match callee.kind() {
                "identifier" => parsed.text_of(&callee).and_then(|name| {
                    imports.get(name).map(|b| (b.file.clone(), b.exported.clone(), name))
                }),
                // `ns.helper()` through a namespace import targets the
                // member, not the namespace itself.
                "member_expression" => {
                    let object = callee.child_by_field_name("object");
                    let property = callee.child_by_field_name("property");
                    match (object, property) {
                        (Some(object), Some(property)) if object.kind() == "identifier" => {
                            let obj_name = parsed.text_of(&object);
                            let prop_name = parsed.text_of(&property);
                            match (obj_name, prop_name) {
                                (Some(obj), Some(prop)) => imports
                                    .get(obj)
                                    .filter(|b| b.exported == "*")
                                    .map(|b| (b.file.clone(), prop.to_string(), obj)),
                                _ => None,
                            }
                        }
                        _ => None,
                    }
                }
                _ => None,
            };

            if let Some((dst_file, dst_symbol, local)) = target {
                relations.push(RawRelation {
                    rtype: RelationType::Calls,
                    src_symbol: enclosing_symbol(parsed, node),
                    dst_file,
                    dst_symbol: Some(dst_symbol),
                    specifier: local.to_string(),
                });
            }
        }
        "type_identifier" => {
            // Heritage clauses are covered by extends/implements edges.
            if enclosing_clause_kind(node, &parsed.tree.root_node()).is_some() {
                return;
            }
            let Some(name) = parsed.text_of(node) else { return };
            if let Some(binding) = imports.get(name) {
                relations.push(RawRelation {
                    rtype: RelationType::TypeReferences,
                    src_symbol: enclosing_symbol(parsed, node),
                    dst_file: binding.file.clone(),
                    dst_symbol: Some(binding.exported.clone()),
                    specifier: name.to_string(),
                });
            }
        }
        _ => {}
    });
}

/// Name of the nearest enclosing declaration, dotted for class members
/// (`UserStore.load`).
fn enclosing_symbol(parsed: &ParsedFile, node: &Node) -> Option<String> {
    let mut method: Option<String> = None;
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            "function_declaration" | "generator_function_declaration" => {
                let name = declaration_name(parsed, &n)?;
                return Some(name);
            }
            "method_definition" => {
                method = declaration_name(parsed, &n);
            }
            "class_declaration" | "abstract_class_declaration" => {
                let class = declaration_name(parsed, &n)?;
                return Some(match method {
                    Some(m) => format!("{class}.{m}"),
                    None => class,
                });
            }
            "lexical_declaration" | "variable_declaration" => {
                let declarator = child_of_kind(&n, "variable_declarator")?;
                return declaration_name(parsed, &declarator);
            }
            _ => {}
        }
        current = n.parent();
    }
    None
}

fn declaration_name(parsed: &ParsedFile, node: &Node) -> Option<String> {
    let name = node.child_by_field_name("name")?;
    parsed.text_of(&name).map(str::to_string)
}

fn source_specifier(parsed: &ParsedFile, statement: &Node) -> Option<String> {
    let source = statement.child_by_field_name("source")?;
    let text = parsed.text_of(&source)?;
    Some(text.trim_matches(|c| c == '"' || c == '\'').to_string())
}

fn child_of_kind<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).find(|c| c.kind() == kind);
    result
}

fn walk<'a>(node: &Node<'a>, f: &mut impl FnMut(&Node<'a>)) {
    f(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(&child, f);
    }
}

/// Drop exact duplicates while preserving first-seen order.
fn dedup(relations: Vec<RawRelation>) -> Vec<RawRelation> {
    let mut seen = HashSet::new();
    relations
        .into_iter()
        .filter(|r| {
            seen.insert((
                r.rtype,
                r.src_symbol.clone(),
                r.dst_file.clone(),
                r.dst_symbol.clone(),
            ))
        })
        .collect()
}
