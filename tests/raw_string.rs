use quickcheck::{quickcheck, TestResult};
use redlink::tokenize;

/// Joins tokens back into a line, quoting anything that needs it.
fn requote(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| {
            if t.is_empty() || t.contains('"') || t.chars().any(|c| c.is_whitespace()) {
                format!("\"{}\"", t.replace('"', "\\\""))
            } else {
                t.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn tokenizing_requoted_output_is_stable() {
    // backslashes are excluded: a token ending in `\` requotes into a
    // trailing `\"`, which reads back as an escaped quote
    fn prop(tokens: Vec<String>) -> TestResult {
        if tokens.iter().any(|t| t.contains('\\')) {
            return TestResult::discard();
        }
        let line = requote(&tokens);
        let first = tokenize(&line);
        let second = tokenize(&requote(&first));
        TestResult::from_bool(first == second)
    }
    quickcheck(prop as fn(Vec<String>) -> TestResult);
}

#[test]
fn escaped_quotes_inside_quoted_span() {
    assert_eq!(
        tokenize(r#"set  foo  "hello \"world\"""#),
        vec!["set", "foo", "hello \"world\""]
    );
}
