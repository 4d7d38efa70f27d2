//! Tokenizer for human-typed command lines.
//!
//! Splitting follows the conventions of the redis command line: unquoted
//! whitespace separates arguments and collapses, double quotes group a
//! span that may contain spaces, and `\"` is a literal double quote.  No
//! other escape sequence is special.

/// Splits a command line into its arguments.
///
/// ```rust
/// let tokens = redlink::tokenize(r#"set  foo  "hello \"world\"""#);
/// assert_eq!(tokens, vec!["set", "foo", "hello \"world\""]);
/// ```
///
/// An explicit `""` produces an empty argument; other empty spans are
/// dropped.  A quote left open at the end of input emits whatever was
/// accumulated.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // set once a quoted span opened, so "" still emits a token
    let mut quoted = false;
    let mut in_quotes = false;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '\\' if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => current.push(c),
            }
        } else {
            match c {
                c if c.is_whitespace() => {
                    if !current.is_empty() || quoted {
                        tokens.push(std::mem::take(&mut current));
                        quoted = false;
                    }
                }
                '"' => {
                    in_quotes = true;
                    quoted = true;
                }
                '\\' if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                _ => current.push(c),
            }
        }
    }

    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    tokens
}
