//! Multi-statement SQL script splitting.
//!
//! The MySQL protocol executes one statement per `COM_QUERY` unless
//! multi-statements are enabled, so schema scripts are split client-side.
//! The splitter understands quoting (`'`, `"`, `` ` ``) and backslash
//! escapes, nothing else: comments are left in place and filtered later
//! with [`is_only_comments`].
//!
//! An unterminated literal swallows the rest of the script into the current
//! statement. That statement is still emitted; malformed input yields
//! best-effort output, not an error.

/// Split `script` into trimmed, non-empty statements.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    for c in script.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q && prev != Some('\\') {
                    quote = None;
                }
            }
            None if matches!(c, '\'' | '"' | '`') => {
                quote = Some(c);
                current.push(c);
            }
            None if c == ';' => {
                push_trimmed(&mut statements, &current);
                current.clear();
            }
            None => current.push(c),
        }
        prev = Some(c);
    }

    push_trimmed(&mut statements, &current);
    statements
}

fn push_trimmed(statements: &mut Vec<String>, stmt: &str) {
    let stmt = stmt.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
}

/// True when every line of `stmt` is blank or a `--` line comment.
///
/// Statements that merely *start* with comments still contain SQL and
/// return false.
pub fn is_only_comments(stmt: &str) -> bool {
    stmt.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Split `script` and drop fragments that are only comments.
pub fn executable_statements(script: &str) -> impl Iterator<Item = String> {
    split_statements(script)
        .into_iter()
        .filter(|stmt| !is_only_comments(stmt))
}

/// Cut `stmt` to 100 characters for inclusion in error messages.
pub fn truncate_for_error(stmt: &str) -> String {
    const LIMIT: usize = 100;
    match stmt.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &stmt[..idx]),
        None => stmt.to_string(),
    }
}
