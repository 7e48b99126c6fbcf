//! Translation of PHP (PCRE) style patterns used in configuration.
//!
//! Configuration written for PHP tooling contains delimited patterns such
//! as `~^Foo\\(.*)~i` and replacement templates referring to groups as
//! `$1` or `\1`.  These helpers convert both into the syntax of the
//! `regex` crate.  A string that is not a valid delimited pattern is taken
//! literally, exactly as if it had been quoted.

use regex::Regex;

/// Characters PCRE rejects as delimiters.
fn is_valid_delimiter(c: char) -> bool {
    !(c.is_alphanumeric() || c == '\\' || c.is_whitespace())
}

fn closing_delimiter(open: char) -> char {
    match open {
        '(' => ')',
        '{' => '}',
        '[' => ']',
        '<' => '>',
        other => other,
    }
}

/// Try to read `pattern` as a delimited PCRE pattern, returning the
/// equivalent `regex` crate source.
///
/// Returns `None` when the string has no valid delimiters, carries a
/// modifier we cannot express, or the body does not compile.
pub fn delimited_to_regex(pattern: &str) -> Option<String> {
    let open = pattern.chars().next()?;
    if !is_valid_delimiter(open) {
        return None;
    }
    let close = closing_delimiter(open);
    let end = pattern.rfind(close)?;
    if end == 0 {
        return None;
    }
    let body = &pattern[open.len_utf8()..end];
    let modifiers = &pattern[end + close.len_utf8()..];

    let mut flags = String::new();
    for m in modifiers.chars() {
        match m {
            'i' | 'm' | 's' | 'x' | 'U' => flags.push(m),
            // Unicode and study/anchoring hints have no effect here.
            'u' | 'S' | 'D' | 'X' | 'J' => {}
            _ => return None,
        }
    }

    // An escaped delimiter inside the body is a literal delimiter.
    let body = if open.is_ascii_punctuation() && !regex_syntax_meta(open) {
        body.replace(&format!("\\{}", open), &open.to_string())
    } else {
        body.to_string()
    };

    let source = if flags.is_empty() {
        body
    } else {
        format!("(?{}){}", flags, body)
    };

    Regex::new(&source).ok().map(|_| source)
}

fn regex_syntax_meta(c: char) -> bool {
    matches!(
        c,
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '#'
            | '&' | '-' | '~'
    )
}

/// Convert a configured pattern into `regex` source: delimited patterns are
/// translated, anything else is matched literally.
pub fn pattern_to_regex(pattern: &str) -> String {
    delimited_to_regex(pattern).unwrap_or_else(|| regex::escape(pattern))
}

/// Convert a PHP replacement template (`$1`, `${1}`, `\1`) into the
/// `regex` crate's expansion syntax (`${1}`), escaping other `$` signs.
///
/// As in PHP, a doubled backslash stands for a single literal one.
pub fn template_to_regex(template: &str) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() && chars[i + 1] == '\\' {
            out.push('\\');
            i += 2;
        } else if (c == '$' || c == '\\') && i + 1 < chars.len() && chars[i + 1].is_ascii_digit() {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end].is_ascii_digit() && end - start < 2 {
                end += 1;
            }
            let group: String = chars[start..end].iter().collect();
            out.push_str(&format!("${{{}}}", group));
            i = end;
        } else if c == '$' && i + 1 < chars.len() && chars[i + 1] == '{' {
            // Already `${N}`.
            match chars[i..].iter().position(|&ch| ch == '}') {
                Some(rel) => {
                    out.extend(&chars[i..=i + rel]);
                    i += rel + 1;
                }
                None => {
                    out.push_str("$$");
                    i += 1;
                }
            }
        } else if c == '$' {
            out.push_str("$$");
            i += 1;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}
