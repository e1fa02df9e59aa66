//! A small, hand-rolled JSONC comment stripper.
//!
//! The transform is small enough (strip `//...` and `/*...*/` outside of
//! string literals, plus trailing commas) that pulling in a dedicated
//! crate for it isn't worth the extra dependency.

/// Strip `//` and `/* */` comments, and trailing commas before `}`/`]`,
/// from JSONC source so the result can be handed to a plain JSON parser.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    strip_trailing_commas(&out)
}

fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ',' {
            let mut lookahead = String::new();
            let mut rest = chars.clone();
            let mut closes = false;
            while let Some(&n) = rest.peek() {
                if n.is_whitespace() {
                    lookahead.push(n);
                    rest.next();
                } else {
                    closes = matches!(n, '}' | ']');
                    break;
                }
            }
            if closes {
                out.push_str(&lookahead);
                chars = rest;
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_and_block_comments() {
        let input = "{\n  // comment\n  \"a\": 1, /* inline */ \"b\": 2\n}";
        let stripped = strip_comments(input);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"], 2);
    }

    #[test]
    fn leaves_slashes_inside_strings_alone() {
        let input = r#"{"url": "https://example.com"}"#;
        let stripped = strip_comments(input);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["url"], "https://example.com");
    }

    #[test]
    fn strips_trailing_commas() {
        let input = "{\"a\": 1, \"b\": [1, 2,],}";
        let stripped = strip_comments(input);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["b"][1], 2);
    }
}
