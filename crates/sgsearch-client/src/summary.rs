//! Compact JSON rendering of matches for machine consumers.

use serde_json::{json, Value};

use crate::matches::SearchMatch;

/// Summarize `search_match` as a small JSON object.
pub fn summarize_match(search_match: &SearchMatch) -> Value {
    match search_match {
        SearchMatch::Content(m) => json!({
            "type": "content",
            "repository": m.repository,
            "file": m.path,
            "matches": m.lines.iter().map(|line| json!({
                "line": line.line_number,
                "content": line.text,
                "contentTruncated": line.truncated,
                "ranges": line.ranges.iter().map(|r| json!({
                    "start": {"line": r.start.line, "column": r.start.column},
                    "end": {"line": r.end.line, "column": r.end.column},
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        }),
        SearchMatch::Symbol(m) => json!({
            "type": "symbol",
            "repository": m.repository,
            "file": m.path,
            "symbols": m.symbols.iter().map(|s| json!({
                "name": s.name,
                "kind": s.kind,
                "line": s.line,
                "containerName": s.container_name,
            })).collect::<Vec<_>>(),
        }),
        SearchMatch::Repo(m) => json!({
            "type": "repository",
            "repository": m.repository,
            "description": m.description,
            "stars": m.repo_stars,
        }),
        SearchMatch::Path(m) => json!({
            "type": "path",
            "repository": m.repository,
            "file": m.path,
            "language": m.language,
        }),
        SearchMatch::Commit(m) => json!({
            "type": "commit",
            "repository": m.repository,
            "label": m.label,
            "url": m.url,
            "oid": m.oid,
        }),
        SearchMatch::Unsupported(raw) => json!({
            "type": raw.get("type").cloned().unwrap_or(Value::Null),
            "repository": raw.get("repository").cloned().unwrap_or(Value::Null),
            "raw": raw,
        }),
    }
}

/// [`summarize_match`] over a list.
pub fn summarize_matches(matches: &[SearchMatch]) -> Value {
    Value::Array(matches.iter().map(summarize_match).collect())
}
