use crate::config::QuoteMode;
use crate::error::Error;

const PREFIX: u8 = b':';
const ESCAPE: u8 = b'\\';
const PLACEHOLDER: &str = "?";

fn is_quote(c: u8) -> bool {
    matches!(c, b'\'' | b'`' | b'"')
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// One `:name` occurrence found while rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Name without the leading colon.
    pub name: String,
    /// Byte offset of the `?` that replaced it in the rewritten SQL.
    pub offset: usize,
}

/// Output of [`rewrite`]: positional SQL plus placeholders in occurrence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub sql: String,
    pub placeholders: Vec<Placeholder>,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    /// Next byte is taken literally. `quote` is the region to return to.
    Escape { quote: Option<(u8, usize)> },
    Quote { open: u8, at: usize },
    /// Scanning a name that starts at `start`, right after the colon.
    Name { start: usize },
}

/// Query text with a scan cursor, shrunk in place as placeholders are replaced.
struct QueryBuffer {
    text: String,
    cursor: usize,
}

impl QueryBuffer {
    fn new(template: &str) -> Self {
        Self {
            text: template.to_owned(),
            cursor: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.cursor).copied()
    }

    fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Replaces `:name` (prefix at `start - 1`, name ending at `end`) with `?` and
    /// parks the cursor right after the `?`.
    fn replace_name(&mut self, start: usize, end: usize) -> String {
        let name = self.text[start..end].to_owned();
        self.text.replace_range(start - 1..end, PLACEHOLDER);
        self.cursor = start;
        name
    }
}

/// Rewrites `:name` placeholders into `?` in one pass.
///
/// Quoted regions (`'...'`, `"..."`, `` `...` ``) and the byte following a backslash
/// are copied through untouched. A name is `[0-9A-Za-z_]+` and ends at the first
/// other byte or at the end of the template; every occurrence yields its own
/// [`Placeholder`], so repeated names appear once per use.
///
/// # Errors
///
/// [`Error::UnterminatedQuote`] when a quoted region is still open at the end,
/// [`Error::TrailingEscape`] when the template ends with a lone backslash.
///
/// # Examples
///
/// ```
/// use sqlx_named_stmt::builder::rewrite;
/// use sqlx_named_stmt::config::QuoteMode;
///
/// let out = rewrite("SELECT ':skip' FROM t WHERE a = :x OR b = :x", QuoteMode::Strict)?;
/// assert_eq!(out.sql, "SELECT ':skip' FROM t WHERE a = ? OR b = ?");
/// assert_eq!(out.placeholders.len(), 2);
/// assert_eq!(out.placeholders[1].name, "x");
/// # Ok::<(), sqlx_named_stmt::Error>(())
/// ```
pub fn rewrite(template: &str, quoting: QuoteMode) -> crate::Result<Rewritten> {
    let mut buf = QueryBuffer::new(template);
    let mut placeholders = Vec::new();
    let mut state = State::Idle;

    while let Some(c) = buf.peek() {
        state = match state {
            State::Escape { quote } => {
                buf.advance();
                match quote {
                    Some((open, at)) => State::Quote { open, at },
                    None => State::Idle,
                }
            }
            State::Quote { open, at } => {
                buf.advance();
                if c == ESCAPE {
                    State::Escape {
                        quote: Some((open, at)),
                    }
                } else if is_quote(c) && (c == open || quoting == QuoteMode::Loose) {
                    State::Idle
                } else {
                    State::Quote { open, at }
                }
            }
            State::Name { start } => {
                if is_name_char(c) {
                    buf.advance();
                    State::Name { start }
                } else if buf.cursor == start {
                    // a lone colon, e.g. `@a := 1`; rescan this byte as plain text
                    State::Idle
                } else {
                    let offset = start - 1;
                    let name = buf.replace_name(start, buf.cursor);
                    placeholders.push(Placeholder { name, offset });
                    if c == PREFIX {
                        // `:name:` form, the closing colon is kept as text
                        buf.advance();
                    }
                    State::Idle
                }
            }
            State::Idle => {
                let at = buf.cursor;
                buf.advance();
                match c {
                    ESCAPE => State::Escape { quote: None },
                    PREFIX => State::Name { start: buf.cursor },
                    c if is_quote(c) => State::Quote { open: c, at },
                    _ => State::Idle,
                }
            }
        };
    }

    match state {
        State::Name { start } if buf.cursor > start => {
            let offset = start - 1;
            let name = buf.replace_name(start, buf.cursor);
            placeholders.push(Placeholder { name, offset });
        }
        State::Quote { at, .. } | State::Escape { quote: Some((_, at)) } => {
            return Err(Error::UnterminatedQuote { offset: at });
        }
        State::Escape { quote: None } => {
            return Err(Error::TrailingEscape {
                offset: buf.cursor - 1,
            });
        }
        _ => {}
    }

    Ok(Rewritten {
        sql: buf.text,
        placeholders,
    })
}

/// Converts named placeholders (`:name`) to positional placeholders (`?`) for MySQL.
///
/// Shorthand for [`rewrite`] with strict quoting that keeps only the SQL.
///
/// # Examples
///
/// ```
/// use sqlx_named_stmt::builder::build_query;
///
/// let sql = build_query("SELECT * FROM users WHERE id = :id AND name = :name")?;
/// assert_eq!(sql, "SELECT * FROM users WHERE id = ? AND name = ?");
/// # Ok::<(), sqlx_named_stmt::Error>(())
/// ```
pub fn build_query(template: &str) -> crate::Result<String> {
    Ok(rewrite(template, QuoteMode::Strict)?.sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(out: &Rewritten) -> Vec<&str> {
        out.placeholders.iter().map(|p| p.name.as_str()).collect()
    }

    fn strict(template: &str) -> Rewritten {
        rewrite(template, QuoteMode::Strict).unwrap()
    }

    #[test]
    fn test_build_query_single_param() {
        let result = build_query("SELECT * FROM users WHERE id = :id").unwrap();
        assert_eq!(result, "SELECT * FROM users WHERE id = ?");
    }

    #[test]
    fn test_build_query_multiple_params() {
        let result = build_query("SELECT * FROM users WHERE id = :id AND name = :name").unwrap();
        assert_eq!(result, "SELECT * FROM users WHERE id = ? AND name = ?");
    }

    #[test]
    fn test_build_query_repeated_params() {
        let result = build_query("SELECT * FROM users WHERE id = :id OR user_id = :id").unwrap();
        assert_eq!(result, "SELECT * FROM users WHERE id = ? OR user_id = ?");
    }

    #[test]
    fn test_build_query_no_params() {
        let result = build_query("SELECT * FROM users").unwrap();
        assert_eq!(result, "SELECT * FROM users");
    }

    #[test]
    fn test_build_query_with_underscores() {
        let result = build_query("SELECT * FROM users WHERE user_id = :user_id").unwrap();
        assert_eq!(result, "SELECT * FROM users WHERE user_id = ?");
    }

    #[test]
    fn test_rewrite_shrinks_by_name_length() {
        let template = "UPDATE t SET a = :alpha WHERE b = 1";
        let out = strict(template);
        assert_eq!(out.sql.len(), template.len() - "alpha".len());
        assert_eq!(out.sql, "UPDATE t SET a = ? WHERE b = 1");
        assert_eq!(out.placeholders[0].offset, 17);
        assert_eq!(&out.sql[17..18], "?");
    }

    #[test]
    fn test_rewrite_repeated_names_are_separate_entries() {
        let out = strict("SELECT * FROM t WHERE a = :id AND b = :other OR c = :id");
        assert_eq!(names(&out), vec!["id", "other", "id"]);
    }

    #[test]
    fn test_rewrite_name_at_end_of_input() {
        let out = strict("WHERE x = :id");
        assert_eq!(out.sql, "WHERE x = ?");
        assert_eq!(names(&out), vec!["id"]);
    }

    #[test]
    fn test_rewrite_separators() {
        let out = strict("CALL p(:a,:b;:c\t:d )");
        assert_eq!(out.sql, "CALL p(?,?;?\t? )");
        assert_eq!(names(&out), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_rewrite_name_closed_by_paren_and_newline() {
        let out = strict("INSERT INTO t (a, b) VALUES (:a,\n:b)\n");
        assert_eq!(out.sql, "INSERT INTO t (a, b) VALUES (?,\n?)\n");
        assert_eq!(names(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_rewrite_closing_colon_is_kept() {
        let out = strict("SELECT :a:b");
        assert_eq!(out.sql, "SELECT ?:b");
        assert_eq!(names(&out), vec!["a"]);
    }

    #[test]
    fn test_rewrite_quoted_text_is_untouched() {
        for template in ["SELECT ':id' ", "SELECT \":id\" ", "SELECT `:id` "] {
            let out = strict(template);
            assert_eq!(out.sql, template);
            assert!(out.placeholders.is_empty());
        }
    }

    #[test]
    fn test_rewrite_after_quoted_region() {
        let out = strict("SELECT 'a:b' AS `c:d` FROM t WHERE e = :e");
        assert_eq!(out.sql, "SELECT 'a:b' AS `c:d` FROM t WHERE e = ?");
        assert_eq!(names(&out), vec!["e"]);
    }

    #[test]
    fn test_rewrite_escaped_colon() {
        let out = strict(r"SELECT \:id, :id");
        assert_eq!(out.sql, r"SELECT \:id, ?");
        assert_eq!(names(&out), vec!["id"]);
    }

    #[test]
    fn test_rewrite_escaped_quote_inside_quote() {
        let out = strict(r"SELECT 'it\'s :x' WHERE y = :y");
        assert_eq!(out.sql, r"SELECT 'it\'s :x' WHERE y = ?");
        assert_eq!(names(&out), vec!["y"]);
    }

    #[test]
    fn test_rewrite_strict_quote_needs_same_char() {
        let out = strict("SELECT 'a`:x' , :y");
        assert_eq!(out.sql, "SELECT 'a`:x' , ?");
        assert_eq!(names(&out), vec!["y"]);
    }

    #[test]
    fn test_rewrite_loose_quote_closes_on_any_char() {
        let out = rewrite("SELECT 'a` :x", QuoteMode::Loose).unwrap();
        assert_eq!(out.sql, "SELECT 'a` ?");
        assert_eq!(names(&out), vec!["x"]);
    }

    #[test]
    fn test_rewrite_lone_colon_is_not_a_placeholder() {
        let out = strict("SET @a := :v");
        assert_eq!(out.sql, "SET @a := ?");
        assert_eq!(names(&out), vec!["v"]);
    }

    #[test]
    fn test_rewrite_unterminated_quote() {
        let err = rewrite("SELECT 'abc WHERE a = :a", QuoteMode::Strict).unwrap_err();
        assert!(matches!(err, Error::UnterminatedQuote { offset: 7 }));
    }

    #[test]
    fn test_rewrite_trailing_escape() {
        let err = rewrite(r"SELECT 1 \", QuoteMode::Strict).unwrap_err();
        assert!(matches!(err, Error::TrailingEscape { offset: 9 }));
    }

    #[test]
    fn test_rewrite_keeps_utf8_text() {
        let out = strict("SELECT 'héllo' WHERE ñ = :name AND z = 'ü'");
        assert_eq!(out.sql, "SELECT 'héllo' WHERE ñ = ? AND z = 'ü'");
    }
}
