//! Symbol indexer: extractor output → persisted symbol rows.
//!
//! Top-level symbols become one row each; container members are flattened
//! into their own rows with dotted names. Every row carries a fingerprint
//! over (name, kind, signature, detail) so semantic-level change can be
//! detected beyond the file hash.

use sha2::{Digest, Sha256};

use crate::extract::symbols::extract_symbols;
use crate::extract::{Modifiers, Param, RawMember, RawSymbol, SymbolKind};
use crate::parser::ParsedFile;
use crate::store::{SymbolRecord, SymbolRepo};
use crate::error::Result;

/// Index the symbols of one parsed file. Returns the number of rows handed
/// to the repository (the repository elides the write when the content
/// hash is unchanged).
pub fn index_file_symbols(
    parsed: &ParsedFile,
    project: &str,
    file_path: &str,
    content_hash: &str,
    repo: &SymbolRepo<'_>,
) -> Result<usize> {
    let rows = build_rows(parsed, project, file_path);
    let count = rows.len();
    repo.replace_file_symbols(project, file_path, content_hash, &rows)?;
    Ok(count)
}

/// Build the full row set for a file: top-level symbols plus flattened
/// members.
pub fn build_rows(parsed: &ParsedFile, project: &str, file_path: &str) -> Vec<SymbolRecord> {
    let mut rows = Vec::new();

    for symbol in extract_symbols(parsed) {
        rows.push(top_level_row(&symbol, project, file_path));

        for member in &symbol.members {
            rows.push(member_row(&symbol, member, project, file_path));
        }
    }

    rows
}

fn top_level_row(symbol: &RawSymbol, project: &str, file_path: &str) -> SymbolRecord {
    let signature = signature_for(symbol.kind, &symbol.params, symbol.modifiers);
    let detail = top_level_detail(symbol);
    let detail_json = serde_json::to_string(&detail).ok();

    SymbolRecord {
        id: 0,
        project: project.to_string(),
        file_path: file_path.to_string(),
        name: symbol.name.clone(),
        kind: symbol.kind.as_key().to_string(),
        span_start: symbol.span.start as i64,
        span_end: symbol.span.end as i64,
        is_exported: symbol.exported,
        fingerprint: fingerprint(
            &symbol.name,
            symbol.kind,
            signature.as_deref(),
            detail_json.as_deref(),
        ),
        signature,
        detail_json,
    }
}

fn member_row(
    parent: &RawSymbol,
    member: &RawMember,
    project: &str,
    file_path: &str,
) -> SymbolRecord {
    let dotted = format!("{}.{}", parent.name, member.name);
    let signature = signature_for(member.kind, &member.params, member.modifiers);
    let detail = member_detail(member);
    let detail_json = serde_json::to_string(&detail).ok();

    SymbolRecord {
        id: 0,
        project: project.to_string(),
        file_path: file_path.to_string(),
        name: dotted.clone(),
        kind: member.kind.as_key().to_string(),
        span_start: member.span.start as i64,
        span_end: member.span.end as i64,
        // Members are reachable iff their container is.
        is_exported: parent.exported,
        fingerprint: fingerprint(&dotted, member.kind, signature.as_deref(), detail_json.as_deref()),
        signature,
        detail_json,
    }
}

/// `params:<n>|async:<0|1>` for callables, nothing otherwise.
pub fn signature_for(kind: SymbolKind, params: &[Param], modifiers: Modifiers) -> Option<String> {
    if !kind.is_callable() {
        return None;
    }
    let is_async = if modifiers.has(Modifiers::ASYNC) { 1 } else { 0 };
    Some(format!("params:{}|async:{}", params.len(), is_async))
}

/// Stable hash over (name, kind, signature, detail); first 32 hex chars.
pub fn fingerprint(
    name: &str,
    kind: SymbolKind,
    signature: Option<&str>,
    detail_json: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_key().as_bytes());
    hasher.update(b"|");
    hasher.update(signature.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(detail_json.unwrap_or("").as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..32].to_string()
}

fn top_level_detail(symbol: &RawSymbol) -> serde_json::Value {
    let mut detail = serde_json::Map::new();

    if !symbol.params.is_empty() {
        detail.insert("parameters".into(), params_json(&symbol.params));
    }
    if let Some(ref rt) = symbol.return_type {
        detail.insert("returnType".into(), rt.clone().into());
    }
    let modifiers = symbol.modifiers.names();
    if !modifiers.is_empty() {
        detail.insert("modifiers".into(), modifiers.into());
    }
    if !symbol.members.is_empty() {
        let members: Vec<String> = symbol.members.iter().map(|m| m.name.clone()).collect();
        detail.insert("members".into(), members.into());
    }
    if !symbol.heritage.is_empty() {
        let heritage: Vec<serde_json::Value> = symbol
            .heritage
            .iter()
            .map(|h| {
                serde_json::json!({
                    "kind": match h.kind {
                        crate::extract::HeritageKind::Extends => "extends",
                        crate::extract::HeritageKind::Implements => "implements",
                    },
                    "name": h.name,
                })
            })
            .collect();
        detail.insert("heritage".into(), heritage.into());
    }
    if !symbol.decorators.is_empty() {
        detail.insert("decorators".into(), symbol.decorators.clone().into());
    }
    if let Some(ref doc) = symbol.doc {
        detail.insert("doc".into(), doc.clone().into());
    }

    serde_json::Value::Object(detail)
}

fn member_detail(member: &RawMember) -> serde_json::Value {
    let mut detail = serde_json::Map::new();

    if !member.params.is_empty() {
        detail.insert("parameters".into(), params_json(&member.params));
    }
    if let Some(ref rt) = member.return_type {
        detail.insert("returnType".into(), rt.clone().into());
    }
    detail.insert("visibility".into(), member.modifiers.visibility().into());
    detail.insert(
        "isStatic".into(),
        member.modifiers.has(Modifiers::STATIC).into(),
    );
    detail.insert(
        "isReadonly".into(),
        member.modifiers.has(Modifiers::READONLY).into(),
    );

    serde_json::Value::Object(detail)
}

fn params_json(params: &[Param]) -> serde_json::Value {
    params
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "type": p.type_text,
                "optional": p.optional,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TsParser;
    use crate::store::{FileRecord, Store};
    use std::path::Path;

    fn parse(source: &str) -> ParsedFile {
        TsParser::new()
            .unwrap()
            .parse(Path::new("a.ts"), source.as_bytes().to_vec())
            .unwrap()
    }

    fn seed_file(store: &Store, path: &str, hash: &str) {
        store
            .files()
            .upsert(&FileRecord {
                project: "app".into(),
                file_path: path.into(),
                mtime_ms: 0,
                size: 0,
                content_hash: hash.into(),
                updated_at: "2026-01-01T00:00:00Z".into(),
                line_count: None,
            })
            .unwrap();
    }

    #[test]
    fn members_flatten_with_dotted_names() {
        let parsed = parse(
            "export class Store { private n = 0; get size(): number { return this.n; } load(a: string) {} }",
        );
        let rows = build_rows(&parsed, "app", "a.ts");
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Store", "Store.n", "Store.size", "Store.load"]);

        let getter = rows.iter().find(|r| r.name == "Store.size").unwrap();
        assert_eq!(getter.kind, "getter");
        assert_eq!(getter.signature.as_deref(), Some("params:0|async:0"));

        let field = rows.iter().find(|r| r.name == "Store.n").unwrap();
        assert_eq!(field.kind, "property");
        assert_eq!(field.signature, None);
        let detail: serde_json::Value =
            serde_json::from_str(field.detail_json.as_deref().unwrap()).unwrap();
        assert_eq!(detail["visibility"], "private");
        assert_eq!(detail["isStatic"], false);
    }

    #[test]
    fn signature_format() {
        let parsed = parse("export async function go(a: number, b?: string) {}");
        let rows = build_rows(&parsed, "app", "a.ts");
        assert_eq!(rows[0].signature.as_deref(), Some("params:2|async:1"));

        let parsed = parse("export const A = 1;");
        let rows = build_rows(&parsed, "app", "a.ts");
        assert_eq!(rows[0].signature, None);
    }

    #[test]
    fn fingerprint_is_stable_and_name_sensitive() {
        let a1 = fingerprint("f", SymbolKind::Function, Some("params:1|async:0"), None);
        let a2 = fingerprint("f", SymbolKind::Function, Some("params:1|async:0"), None);
        let b = fingerprint("g", SymbolKind::Function, Some("params:1|async:0"), None);
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.len(), 32);
    }

    #[test]
    fn repository_elides_unchanged_hash() {
        let store = Store::open_in_memory().unwrap();
        seed_file(&store, "a.ts", "h1");

        let parsed = parse("export const A = 1;");
        let n = index_file_symbols(&parsed, "app", "a.ts", "h1", &store.symbols()).unwrap();
        assert_eq!(n, 1);

        let before = store.symbols().get_file_symbols("app", "a.ts").unwrap();
        index_file_symbols(&parsed, "app", "a.ts", "h1", &store.symbols()).unwrap();
        let after = store.symbols().get_file_symbols("app", "a.ts").unwrap();
        assert_eq!(before, after);
    }
}
