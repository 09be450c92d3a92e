//! SQL utility functions

/// Null literal as produced by field providers for missing values
pub const NULL_LITERAL: &str = "\\N";

/// Escape special characters in a ClickHouse string literal
///
/// Backslash-escapes control characters, backslashes and single quotes.
/// When `quote` is true the result is wrapped in single quotes.
///
/// # Example
///
/// ```
/// use chorm::utils::sql::escape_string;
///
/// assert_eq!(escape_string("it's", true), "'it\\'s'");
/// assert_eq!(escape_string("a\tb", false), "a\\tb");
/// ```
pub fn escape_string(s: &str, quote: bool) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    if quote {
        out.push('\'');
    }
    for c in s.chars() {
        match c {
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(c),
        }
    }
    if quote {
        out.push('\'');
    }
    out
}

/// Escape LIKE metacharacters (`%`, `_`, `\`) in an already-escaped literal body
///
/// The input is the output of [`escape_string`] without quotes. The pattern
/// ends up inside a quoted string literal, so every LIKE escape backslash is
/// doubled: `%` becomes `\\%` and an escaped backslash becomes `\\\\`.
/// Other escape sequences (`\\'`, `\\n`, ...) are kept as they are.
pub fn escape_like_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => out.push_str("\\\\\\\\"),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push_str("\\\\"),
            },
            '%' => out.push_str("\\\\%"),
            '_' => out.push_str("\\\\_"),
            _ => out.push(c),
        }
    }
    out
}

/// Join SQL fragments with `", "`
pub fn comma_join<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut out = String::new();
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(item.as_ref());
    }
    out
}

/// Wrap an identifier in backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name)
}

/// Escape `?` so the ClickHouse client does not treat it as a bind placeholder
pub fn escape_placeholders(sql: &str) -> String {
    sql.replace('?', "??")
}
