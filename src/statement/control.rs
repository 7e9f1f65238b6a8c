/// Transaction control pseudo-statements recognised by [`crate::Database::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStatement {
    Begin,
    Commit,
    Rollback,
}

impl ControlStatement {
    /// Recognise `BEGIN`, `BEGIN TRANSACTION`, `COMMIT` and `ROLLBACK`.
    ///
    /// Matching is exact after trimming whitespace and one trailing semicolon, ignoring case.
    /// Anything else (`BEGIN DEFERRED`, `COMMIT WORK`, `ROLLBACK TO sp`, ...) is not a control
    /// statement and runs as ordinary SQL.
    #[must_use]
    pub fn parse(sql: &str) -> Option<Self> {
        let trimmed = sql.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        let mut words = trimmed.split_ascii_whitespace();
        let first = words.next()?;
        let second = words.next();
        if words.next().is_some() {
            return None;
        }

        match (first.to_ascii_uppercase().as_str(), second) {
            ("BEGIN", None) => Some(Self::Begin),
            ("BEGIN", Some(w)) if w.eq_ignore_ascii_case("TRANSACTION") => Some(Self::Begin),
            ("COMMIT", None) => Some(Self::Commit),
            ("ROLLBACK", None) => Some(Self::Rollback),
            _ => None,
        }
    }

    /// Native command text, identical on both backends.
    #[must_use]
    pub fn native_sql(self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
        }
    }
}
