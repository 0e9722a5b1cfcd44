use regex::Regex;

/// Translate a Redis glob (`*`, `?`, `[abc]`, `[^a-z]`, `\x`) into an
/// anchored regex. Wildcards match any character, newlines included.
pub fn to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(n) => out.push_str(&regex::escape(&n.to_string())),
                None => out.push_str(r"\\"),
            },
            '[' => {
                let mut class = String::from("[");
                if matches!(chars.peek(), Some('^') | Some('!')) {
                    chars.next();
                    class.push('^');
                }
                while let Some(n) = chars.next() {
                    match n {
                        ']' => break,
                        '\\' => {
                            if let Some(e) = chars.next() {
                                if !e.is_alphanumeric() {
                                    class.push('\\');
                                }
                                class.push(e);
                            }
                        }
                        // set operators and nested classes in the regex syntax
                        '[' | '&' | '~' => {
                            class.push('\\');
                            class.push(n);
                        }
                        _ => class.push(n),
                    }
                }
                if class == "[" || class == "[^" {
                    // `[]` and a bare trailing `[` are taken literally
                    out.push_str(&regex::escape(&class));
                } else {
                    // an unterminated class runs to the end of the pattern
                    class.push(']');
                    out.push_str(&class);
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, key: &str) -> bool {
        to_regex(pattern).unwrap().is_match(key)
    }

    #[test]
    fn star_and_question() {
        assert!(matches("cliente:*", "cliente:1"));
        assert!(!matches("cliente:*", "token:1"));
        assert!(matches("*", ""));
        assert!(matches("h?llo", "hello"));
        assert!(!matches("h?llo", "heello"));
    }

    #[test]
    fn wildcards_cross_newlines() {
        assert!(matches("fila:*", "fila:a\nb"));
        assert!(matches("a?b", "a\nb"));
        assert!(!matches("a?b", "a\n\nb"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "axb"));
        assert!(matches("(x)+", "(x)+"));
    }

    #[test]
    fn classes() {
        assert!(matches("h[ae]llo", "hallo"));
        assert!(!matches("h[ae]llo", "hillo"));
        assert!(matches("h[^e]llo", "hallo"));
        assert!(!matches("h[^e]llo", "hello"));
        assert!(matches("key:[0-9]", "key:7"));
        assert!(!matches("key:[0-9]", "key:x"));
    }

    #[test]
    fn escapes() {
        assert!(matches(r"a\*b", "a*b"));
        assert!(!matches(r"a\*b", "axxb"));
    }
}
