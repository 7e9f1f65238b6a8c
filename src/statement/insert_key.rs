use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::translation::executable_ranges;

static LEADING_INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*insert\b").expect("leading INSERT pattern is valid")
});

static RETURNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\breturning\b").expect("RETURNING pattern is valid")
});

/// Whether the statement starts with an `INSERT` token.
#[must_use]
pub fn is_insert(sql: &str) -> bool {
    LEADING_INSERT.is_match(sql)
}

/// Whether a `RETURNING` keyword appears in executable text. Literals, quoted identifiers
/// and comments are ignored.
#[must_use]
pub fn has_returning(sql: &str) -> bool {
    executable_ranges(sql)
        .into_iter()
        .any(|range| RETURNING.is_match(&sql[range]))
}

/// An INSERT with no returning clause of its own.
#[must_use]
pub fn needs_returning_id(sql: &str) -> bool {
    is_insert(sql) && !has_returning(sql)
}

/// Append `RETURNING id` to an INSERT that lacks a returning clause; other statements pass
/// through unchanged.
///
/// A trailing `;` is dropped. When the statement ends in a comment the clause goes on a new
/// line after it.
///
/// ```rust
/// use dual_sql::statement::append_returning_id;
///
/// assert_eq!(
///     append_returning_id("INSERT INTO consultants (name) VALUES ($1);"),
///     "INSERT INTO consultants (name) VALUES ($1) RETURNING id"
/// );
/// assert_eq!(append_returning_id("INSERT INTO t VALUES (1) RETURNING id"), "INSERT INTO t VALUES (1) RETURNING id");
/// ```
#[must_use]
pub fn append_returning_id(sql: &str) -> Cow<'_, str> {
    if !needs_returning_id(sql) {
        return Cow::Borrowed(sql);
    }
    let Some((idx, last)) = last_executable_char(sql) else {
        return Cow::Borrowed(sql);
    };
    let (head, tail) = if last == ';' {
        (&sql[..idx], &sql[idx + 1..])
    } else {
        sql.split_at(idx + last.len_utf8())
    };
    let (head, tail) = (head.trim_end(), tail.trim());
    if tail.is_empty() {
        Cow::Owned(format!("{head} RETURNING id"))
    } else {
        Cow::Owned(format!("{head} {tail}\nRETURNING id"))
    }
}

fn last_executable_char(sql: &str) -> Option<(usize, char)> {
    executable_ranges(sql).into_iter().rev().find_map(|range| {
        sql[range.clone()]
            .char_indices()
            .rev()
            .find(|(_, c)| !c.is_whitespace())
            .map(|(offset, c)| (range.start + offset, c))
    })
}
