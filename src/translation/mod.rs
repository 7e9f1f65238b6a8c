use std::borrow::Cow;
use std::fmt::Write;
use std::ops::Range;

mod parsers;
mod scanner;

use parsers::MARKER;
use scanner::{State, step};

use crate::types::Dialect;

/// Rewrite generic `?` markers into the wire syntax of `dialect`.
///
/// `SQLite` takes `?` natively, so it gets the input back untouched. For Postgres every `?` in
/// executable text becomes `$1`, `$2`, ... in order of appearance. Markers inside single-quoted
/// literals, double-quoted identifiers, `--` line comments and `/* */` block comments are left
/// alone and do not advance the index.
///
/// This is a narrow compatibility shim for placeholder syntax only. It does not understand
/// dialect features such as Postgres dollar-quoted bodies or the jsonb `?` operators; write
/// backend-specific SQL for those.
///
/// ```rust
/// use dual_sql::prelude::*;
///
/// let sql = "SELECT * FROM t WHERE a = ? AND b = '?' -- ?";
/// assert_eq!(
///     translate_placeholders(sql, Dialect::Postgres),
///     "SELECT * FROM t WHERE a = $1 AND b = '?' -- ?"
/// );
/// assert_eq!(translate_placeholders(sql, Dialect::Sqlite), sql);
/// ```
///
/// Returns a borrowed `Cow` when no changes are needed.
#[must_use]
pub fn translate_placeholders(sql: &str, dialect: Dialect) -> Cow<'_, str> {
    match dialect {
        Dialect::Sqlite => Cow::Borrowed(sql),
        Dialect::Postgres => to_indexed(sql),
    }
}

/// Count the markers that [`translate_placeholders`] would replace.
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    scan_markers(sql, |_| count += 1);
    count
}

fn to_indexed(sql: &str) -> Cow<'_, str> {
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut param = 0usize;

    scan_markers(sql, |idx| {
        param += 1;
        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        buf.push_str(&sql[copied..idx]);
        // writing into a String cannot fail
        let _ = write!(buf, "${param}");
        copied = idx + 1;
    });

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Byte ranges of `sql` outside literals, quoted identifiers and comments.
///
/// Ranges are in order and never empty. Every boundary sits on an ASCII delimiter, so each
/// range slices `sql` cleanly.
#[must_use]
pub fn executable_ranges(sql: &str) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let mut ranges = Vec::new();
    let mut state = State::Normal;
    let mut start = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let (next, advance) = step(state, bytes, idx);
        match (state, next) {
            (State::Normal, State::Normal) => {}
            (State::Normal, _) => ranges.push(start..idx),
            (_, State::Normal) => start = advance,
            _ => {}
        }
        state = next;
        idx = advance;
    }
    if state == State::Normal {
        ranges.push(start..bytes.len());
    }
    ranges.retain(|range| !range.is_empty());
    ranges
}

/// Call `on_marker` with the byte offset of every marker in executable text.
fn scan_markers(sql: &str, mut on_marker: impl FnMut(usize)) {
    let bytes = sql.as_bytes();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        if state == State::Normal && bytes[idx] == MARKER {
            on_marker(idx);
            idx += 1;
            continue;
        }
        let (next, advance) = step(state, bytes, idx);
        state = next;
        idx = advance;
    }
}
