//! Lossless SQL tokenizer.
//!
//! Splits SQL text into borrowed slices such that concatenating them in order
//! yields the input exactly. Quoted literals, quoted identifiers and comments are
//! kept whole so placeholder-looking text inside them is never interpreted.

/// Splits `sql` into tokens.
///
/// # Example
///
/// ```
/// use sqlx_named_sql::tokenizer::tokenize;
///
/// let tokens = tokenize("SELECT * FROM t WHERE id = :id");
/// assert_eq!(tokens.concat(), "SELECT * FROM t WHERE id = :id");
/// assert_eq!(tokens.last(), Some(&":id"));
/// ```
pub fn tokenize(sql: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = sql;

    while !rest.is_empty() {
        let (token, tail) = rest.split_at(next_token_len(rest));
        tokens.push(token);
        rest = tail;
    }

    tokens
}

/// Characters allowed in identifiers, numbers and placeholder names.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte length of the token at the start of `s`. `s` must be non-empty.
fn next_token_len(s: &str) -> usize {
    let first = match s.chars().next() {
        Some(c) => c,
        None => return 0,
    };

    match first {
        c if c.is_whitespace() => span_while(s, char::is_whitespace),
        '\'' | '"' | '`' => quoted_len(s, first),
        '-' if s.starts_with("--") => s.find('\n').unwrap_or(s.len()),
        '/' if s.starts_with("/*") => s[2..].find("*/").map_or(s.len(), |end| end + 4),
        '#' if s.starts_with("#{") => bracket_len(s).unwrap_or(1),
        ':' if s.starts_with("::") => 2,
        ':' | '$' => 1 + span_while(&s[1..], is_word_char),
        c if is_word_char(c) => span_while(s, is_word_char),
        c => c.len_utf8(),
    }
}

fn span_while(s: &str, pred: impl Fn(char) -> bool) -> usize {
    s.char_indices()
        .find(|(_, c)| !pred(*c))
        .map_or(s.len(), |(i, _)| i)
}

/// Quoted section starting at `s[0] == quote`; a doubled quote is an escape.
fn quoted_len(s: &str, quote: char) -> usize {
    let mut chars = s.char_indices().skip(1).peekable();

    while let Some((i, c)) = chars.next() {
        if c == quote {
            match chars.peek() {
                Some((_, next)) if *next == quote => {
                    chars.next();
                }
                _ => return i + c.len_utf8(),
            }
        }
    }

    s.len()
}

/// `#{...}` on a single line with no nested brace.
fn bracket_len(s: &str) -> Option<usize> {
    let body = &s[2..];
    let end = body.find(|c: char| c == '}' || c == '{' || c == '\n')?;
    if body[end..].starts_with('}') {
        Some(2 + end + 1)
    } else {
        None
    }
}
