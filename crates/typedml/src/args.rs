//! Placeholder scanning: diagnostic expansion, driver numbering and template
//! splitting.
//!
//! Each function walks the SQL once, tracking whether the cursor is inside a
//! quoted region. Only unquoted `?` characters are placeholders; an unquoted
//! `??` is an escaped literal `?` and consumes no argument.

use crate::query_builder::Arg;

/// An unquoted `?` and what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Placeholder,
    /// `??`: a literal `?`.
    Escaped,
}

/// Walk `sql`, calling `on_mark` with the byte offset of each unquoted `?`.
fn walk(sql: &str, mut on_mark: impl FnMut(usize, Mark)) {
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        match ch {
            '\'' | '"' => match quote {
                None => quote = Some(ch),
                Some(open) if open == ch => quote = None,
                // The other quote character is plain text inside a quoted region.
                Some(_) => {}
            },
            '?' if quote.is_none() => {
                if chars.next_if(|&(_, next)| next == '?').is_some() {
                    on_mark(at, Mark::Escaped);
                } else {
                    on_mark(at, Mark::Placeholder);
                }
            }
            _ => {}
        }
    }
}

/// Copy `sql`, unescaping `??` and calling `on_placeholder` for each placeholder.
fn scan(sql: &str, mut on_placeholder: impl FnMut(&mut String)) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut copied = 0;
    walk(sql, |at, mark| {
        out.push_str(&sql[copied..at]);
        match mark {
            Mark::Placeholder => {
                on_placeholder(&mut out);
                copied = at + 1;
            }
            Mark::Escaped => {
                out.push('?');
                copied = at + 2;
            }
        }
    });
    out.push_str(&sql[copied..]);
    out
}

/// The text between placeholders, verbatim. `n` placeholders give `n + 1`
/// pieces; quoted text and `??` stay as written.
pub(crate) fn split_placeholders(sql: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    walk(sql, |at, mark| {
        if mark == Mark::Placeholder {
            pieces.push(&sql[start..at]);
            start = at + 1;
        }
    });
    pieces.push(&sql[start..]);
    pieces
}

/// Substitute literal values for placeholders. For logs and error messages only.
///
/// Placeholders beyond the end of `args` are left as `?`.
pub fn expand_args(sql: &str, args: &[Arg]) -> String {
    if args.is_empty() && !sql.contains("??") {
        return sql.to_string();
    }
    let mut args = args.iter();
    scan(sql, |out| match args.next() {
        Some(arg) => out.push_str(&arg.literal()),
        None => out.push('?'),
    })
}

/// Rewrite `?` placeholders as `$1, $2, ...` for drivers with numbered parameters.
pub fn number_placeholders(sql: &str) -> String {
    let mut n = 0usize;
    scan(sql, |out| {
        n += 1;
        out.push('$');
        out.push_str(&n.to_string());
    })
}

/// Number of placeholders `sql` expects.
pub fn count_placeholders(sql: &str) -> usize {
    let mut n = 0usize;
    scan(sql, |_| n += 1);
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn args() -> Vec<Arg> {
        vec![
            Arg::new(ColumnType::Integer, 1),
            Arg::new(ColumnType::Text, "it's"),
        ]
    }

    #[test]
    fn test_expand_replaces_in_order() {
        let sql = "UPDATE t SET a = ?, b = ?";
        assert_eq!(expand_args(sql, &args()), "UPDATE t SET a = 1, b = 'it''s'");
    }

    #[test]
    fn test_expand_skips_quoted_regions() {
        let sql = "SELECT '?', \"a?\", ? FROM t WHERE x = ?";
        assert_eq!(
            expand_args(sql, &args()),
            "SELECT '?', \"a?\", 1 FROM t WHERE x = 'it''s'"
        );
    }

    #[test]
    fn test_expand_handles_doubled_quote_escape() {
        let sql = "SELECT 'it''s ?' , ?";
        assert_eq!(expand_args(sql, &args()[..1]), "SELECT 'it''s ?' , 1");
    }

    #[test]
    fn test_double_question_mark_is_literal() {
        let sql = "SELECT data ?? 'k', ?";
        assert_eq!(expand_args(sql, &args()[..1]), "SELECT data ? 'k', 1");
    }

    #[test]
    fn test_missing_args_stay_placeholders() {
        assert_eq!(expand_args("a = ? AND b = ?", &args()[..1]), "a = 1 AND b = ?");
    }

    #[test]
    fn test_mixed_quotes_inside_string() {
        let sql = "SELECT 'say \"hi\" ?', ?";
        assert_eq!(expand_args(sql, &args()[..1]), "SELECT 'say \"hi\" ?', 1");
    }

    #[test]
    fn test_number_placeholders() {
        assert_eq!(
            number_placeholders("INSERT INTO t (a, b) VALUES (?, ?) -- '?'"),
            "INSERT INTO t (a, b) VALUES ($1, $2) -- '?'"
        );
        assert_eq!(number_placeholders("x ?? y AND z = ?"), "x ? y AND z = $1");
        assert_eq!(count_placeholders("? '?' ??"), 1);
    }

    #[test]
    fn test_split_keeps_quoted_and_escaped_text() {
        assert_eq!(
            split_placeholders("'why?' || ? || data ?? 'k' || ?"),
            vec!["'why?' || ", " || data ?? 'k' || ", ""]
        );
        assert_eq!(split_placeholders("no params"), vec!["no params"]);
    }
}
