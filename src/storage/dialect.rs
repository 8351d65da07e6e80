//! Query dialect translation.
//!
//! Query templates are written in the canonical PostgreSQL dialect. When the
//! embedded SQLite backend is active they are rewritten with a fixed set of
//! string substitutions before execution. Pure string-to-string, no I/O.

use std::borrow::Cow;

use crate::storage::backend::BackendKind;

/// Fixed substitutions applied for the embedded backend.
///
/// Ordering matters: the day-interval expression embeds `NOW()` and must be
/// rewritten before the bare timestamp function.
const REWRITES: &[(&str, &str)] = &[
    ("NOW() - INTERVAL '1 day'", "datetime('now', '-1 day')"),
    ("NOW()", "datetime('now')"),
    ("CURRENT_TIMESTAMP", "datetime('now')"),
    ("SERIAL", "INTEGER"),
    ("VARCHAR(20)", "TEXT"),
];

/// Rewrite a canonical query template for the given backend.
///
/// The networked backend's dialect is the template form, so translation is a
/// no-op there. Translation is idempotent: feeding an already-translated
/// query back through produces the same string.
pub fn translate(template: &str, backend: BackendKind) -> Cow<'_, str> {
    match backend {
        BackendKind::Postgres => Cow::Borrowed(template),
        BackendKind::Sqlite => {
            let mut sql = template.to_string();
            for (from, to) in REWRITES {
                sql = sql.replace(from, to);
            }
            Cow::Owned(rewrite_placeholders(&sql))
        }
    }
}

/// `$N` positional placeholders become SQLite's `?N` form.
fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(char::is_ascii_digit) {
            out.push('?');
        } else {
            out.push(c);
        }
    }
    out
}
