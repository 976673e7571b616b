//! Pulls a single SQL statement out of a free-text model response.

use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("model response was empty")]
    Empty,
    #[error("model declined to produce SQL: {0}")]
    Declined(String),
    #[error("no SQL statement found in model response")]
    NoSql,
}

const QUERY_MARKER: &str = "SQLQuery:";
const MARKER_TERMINATORS: &[&str] = &["SQLResult:", "Answer:"];

/// Tries, in order: a JSON `{"query", "error"}` object, a fenced code block
/// (`sql` fences first), a `SQLQuery:` marker, and finally the first line that
/// opens with a statement verb.
pub fn extract_sql(response: &str) -> Result<String, ExtractionError> {
    let response = response.trim();
    if response.is_empty() {
        return Err(ExtractionError::Empty);
    }

    if let Some(object) = json_payload(response) {
        let query = object.get("query").and_then(Value::as_str).map(str::trim).unwrap_or("");
        if !query.is_empty() {
            return finish(query);
        }
        let error = object.get("error").and_then(Value::as_str).map(str::trim).unwrap_or("");
        if !error.is_empty() {
            return Err(ExtractionError::Declined(error.to_string()));
        }
        return Err(ExtractionError::NoSql);
    }

    let blocks = fenced_blocks(response);
    let preferred = blocks
        .iter()
        .find(|(info, _)| info.eq_ignore_ascii_case("sql"))
        .or_else(|| blocks.iter().find(|(info, _)| !info.eq_ignore_ascii_case("json")));
    if let Some((_, body)) = preferred {
        if !body.trim().is_empty() {
            return finish(body);
        }
    }

    if let Some(start) = response.find(QUERY_MARKER) {
        let after_marker = &response[start + QUERY_MARKER.len()..];
        let end = MARKER_TERMINATORS
            .iter()
            .filter_map(|terminator| after_marker.find(terminator))
            .min()
            .unwrap_or(after_marker.len());
        return finish(&after_marker[..end]);
    }

    let mut statement = Vec::new();
    for line in response.lines() {
        if statement.is_empty() {
            if opens_statement(line.trim_start()) {
                statement.push(line);
            }
        } else if line.trim().is_empty() {
            break;
        } else {
            statement.push(line);
        }
    }
    if !statement.is_empty() {
        return finish(&statement.join("\n"));
    }

    Err(ExtractionError::NoSql)
}

fn finish(raw: &str) -> Result<String, ExtractionError> {
    let cleaned = raw.trim().trim_end_matches(|ch: char| ch == ';' || ch.is_whitespace());
    if cleaned.is_empty() {
        return Err(ExtractionError::NoSql);
    }
    Ok(cleaned.to_string())
}

/// Statement verbs that open a bare SQL line. Write verbs are extracted too so
/// the read-only policy, not the parser, decides what gets rejected.
const STATEMENT_VERBS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT",
    "REVOKE", "REPLACE", "MERGE", "PRAGMA", "ATTACH", "DETACH", "VACUUM", "REINDEX",
];

fn opens_statement(line: &str) -> bool {
    STATEMENT_VERBS.iter().any(|keyword| {
        line.get(..keyword.len()).is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
            && line[keyword.len()..].chars().next().map_or(true, |ch| ch.is_whitespace() || ch == '(')
    })
}

/// A JSON object carrying `query` or `error`, either as the whole response,
/// inside a `json` fence, or embedded between the outermost braces.
fn json_payload(response: &str) -> Option<serde_json::Map<String, Value>> {
    let mut attempts = vec![response.to_string()];
    attempts.extend(
        fenced_blocks(response)
            .into_iter()
            .filter(|(info, _)| info.is_empty() || info.eq_ignore_ascii_case("json"))
            .map(|(_, body)| body),
    );
    if let (Some(open), Some(close)) = (response.find('{'), response.rfind('}')) {
        if open < close {
            attempts.push(response[open..=close].to_string());
        }
    }

    attempts.into_iter().find_map(|attempt| match serde_json::from_str::<Value>(attempt.trim()) {
        Ok(Value::Object(object)) if object.contains_key("query") || object.contains_key("error") => {
            Some(object)
        }
        _ => None,
    })
}

/// `(info string, body)` for every complete fenced block.
fn fenced_blocks(response: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut rest = response;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let (info, body_start) = match after_fence.find('\n') {
            Some(newline) => (after_fence[..newline].trim(), &after_fence[newline + 1..]),
            None => break,
        };
        let Some(close) = body_start.find("```") else {
            break;
        };
        blocks.push((info.to_string(), body_start[..close].to_string()));
        rest = &body_start[close + 3..];
    }
    blocks
}
