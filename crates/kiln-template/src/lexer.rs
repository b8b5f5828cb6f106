//! Template scanning and code tokenization.
//!
//! A template is split into literal text and directives delimited by `<%` and
//! `%>`. Directive bodies that hold code are then tokenized for the parser.

use crate::error::{Result, TemplateError};

pub(crate) const OPEN: &str = "<%";
pub(crate) const CLOSE: &str = "%>";

/// What a directive contributes to the generated function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DirectiveKind {
    /// `<%= expr %>`
    Escaped,
    /// `<%- expr %>`
    Raw,
    /// `<% code %>` and `<%_ code %>`
    Statement,
}

/// Whitespace removal requested by a directive's closing boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeadingTrim {
    /// `-%>`
    Newlines,
    /// `_%>`
    Whitespace,
}

/// A scanned piece of template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Directive { kind: DirectiveKind, code: String },
}

/// Split template source into literal text and directives, applying trim
/// modifiers to the literal spans.
pub(crate) fn scan(source: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut pending: Option<LeadingTrim> = None;

    while let Some(start) = find_open(rest) {
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open.find(CLOSE).ok_or_else(|| {
            let consumed = source.len() - rest.len() + start;
            let line = source[..consumed].matches('\n').count() + 1;
            TemplateError::syntax(format!("unclosed directive starting on line {line}"))
        })?;
        let inner = &after_open[..end];

        let (kind, body, trim_preceding) = match inner.chars().next() {
            Some('=') => (Some(DirectiveKind::Escaped), &inner[1..], false),
            Some('-') => (Some(DirectiveKind::Raw), &inner[1..], false),
            Some('#') => (None, &inner[1..], false),
            Some('_') => (Some(DirectiveKind::Statement), &inner[1..], true),
            _ => (Some(DirectiveKind::Statement), inner, false),
        };
        let (body, closing) = if let Some(stripped) = body.strip_suffix('-') {
            (stripped, Some(LeadingTrim::Newlines))
        } else if let Some(stripped) = body.strip_suffix('_') {
            (stripped, Some(LeadingTrim::Whitespace))
        } else {
            (body, None)
        };

        let mut text = &rest[..start];
        if trim_preceding {
            text = text.trim_end();
        }
        text = apply_leading(text, pending.take());
        if !text.is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }

        if let Some(kind) = kind {
            segments.push(Segment::Directive {
                kind,
                code: body.to_string(),
            });
        }

        pending = closing;
        rest = &after_open[end + CLOSE.len()..];
    }

    let tail = apply_leading(rest, pending);
    if !tail.is_empty() {
        segments.push(Segment::Text(tail.to_string()));
    }

    Ok(segments)
}

fn apply_leading(text: &str, trim: Option<LeadingTrim>) -> &str {
    match trim {
        Some(LeadingTrim::Newlines) => text.trim_start_matches('\n'),
        Some(LeadingTrim::Whitespace) => text.trim_start(),
        None => text,
    }
}

/// Position of the next directive opener. `<%%` is literal text.
fn find_open(text: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = text[offset..].find(OPEN) {
        let start = offset + pos;
        if text[start + OPEN.len()..].starts_with('%') {
            offset = start + OPEN.len() + 1;
            continue;
        }
        return Some(start);
    }
    None
}

/// A token of directive code.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    /// A backtick string with `${…}` substitutions.
    Template(Vec<TemplatePart>),
    Punct(&'static str),
}

/// Piece of a backtick string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplatePart {
    Text(String),
    Substitution(Vec<Token>),
}

const PUNCTUATION: &[&str] = &[
    "===", "!==", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "+=", "-=", "++", "--",
    "?.", "+", "-", "*", "/", "%", "<", ">", "=", "!", "?", ":", ".", ",", ";", "(", ")", "[",
    "]", "{", "}",
];

/// Tokenize a directive body.
pub(crate) fn tokenize(code: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = code.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Line and block comments.
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            if i >= chars.len() {
                return Err(TemplateError::syntax("unterminated comment"));
            }
            i += 2;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit))
        {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let number = literal
                .parse()
                .map_err(|_| TemplateError::syntax(format!("invalid number `{literal}`")))?;
            tokens.push(Token::Number(number));
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        if c == '"' || c == '\'' {
            let (literal, next) = read_string(&chars, i)?;
            tokens.push(Token::Str(literal));
            i = next;
            continue;
        }

        if c == '`' {
            let (parts, next) = read_template_string(&chars, i)?;
            tokens.push(Token::Template(parts));
            i = next;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        let Some(punct) = PUNCTUATION.iter().find(|p| rest.starts_with(**p)) else {
            return Err(TemplateError::syntax(format!("unexpected character `{c}`")));
        };
        tokens.push(Token::Punct(*punct));
        i += punct.chars().count();
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\\' => i = read_escape(chars, i, &mut out)?,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Err(TemplateError::syntax("unterminated string literal"))
}

/// Decode the escape sequence at `chars[i]` (a backslash) into `out`,
/// returning the position after it.
fn read_escape(chars: &[char], i: usize, out: &mut String) -> Result<usize> {
    let escaped = chars
        .get(i + 1)
        .ok_or_else(|| TemplateError::syntax("unterminated string literal"))?;
    match escaped {
        'n' => out.push('\n'),
        't' => out.push('\t'),
        'r' => out.push('\r'),
        '0' => out.push('\0'),
        'u' => {
            let hex: String = chars.iter().skip(i + 2).take(4).collect();
            let code = u32::from_str_radix(&hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| TemplateError::syntax(format!("invalid unicode escape `{hex}`")))?;
            out.push(code);
            return Ok(i + 6);
        }
        other => out.push(*other),
    }
    Ok(i + 2)
}

fn read_template_string(chars: &[char], start: usize) -> Result<(Vec<TemplatePart>, usize)> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '`' => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(text));
                }
                return Ok((parts, i + 1));
            }
            '\\' => i = read_escape(chars, i, &mut text)?,
            '$' if chars.get(i + 1) == Some(&'{') => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                let end = substitution_end(chars, i + 2)?;
                let code: String = chars[i + 2..end].iter().collect();
                parts.push(TemplatePart::Substitution(tokenize(&code)?));
                i = end + 1;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(TemplateError::syntax("unterminated template string"))
}

/// Position of the `}` closing a `${` substitution whose code starts at
/// `start`. Braces inside quoted strings are skipped.
fn substitution_end(chars: &[char], start: usize) -> Result<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(_) if c == '\\' => i += 1,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' | '`' => quote = Some(c),
                '{' => depth += 1,
                '}' if depth == 0 => return Ok(i),
                '}' => depth -= 1,
                _ => {}
            },
        }
        i += 1;
    }

    Err(TemplateError::syntax("unterminated template substitution"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_string())
    }

    fn directive(kind: DirectiveKind, code: &str) -> Segment {
        Segment::Directive {
            kind,
            code: code.to_string(),
        }
    }

    #[test]
    fn test_scan_plain_text() {
        assert_eq!(scan("just text").unwrap(), vec![text("just text")]);
        assert!(scan("").unwrap().is_empty());
    }

    #[test]
    fn test_scan_directive_kinds() {
        let segments = scan("a<%= x %>b<%- y %>c<% z %>d<%# note %>e").unwrap();
        assert_eq!(
            segments,
            vec![
                text("a"),
                directive(DirectiveKind::Escaped, " x "),
                text("b"),
                directive(DirectiveKind::Raw, " y "),
                text("c"),
                directive(DirectiveKind::Statement, " z "),
                text("d"),
                text("e"),
            ]
        );
    }

    #[test]
    fn test_scan_trim_modifiers() {
        let segments = scan("A\n<%_ x=1 -%>\nB").unwrap();
        assert_eq!(
            segments,
            vec![
                text("A"),
                directive(DirectiveKind::Statement, " x=1 "),
                text("B"),
            ]
        );

        let segments = scan("<% a _%>  \n\t B").unwrap();
        assert_eq!(segments[1], text("B"));
    }

    #[test]
    fn test_newline_trim_keeps_spaces() {
        let segments = scan("<% a -%>\n\n  x").unwrap();
        assert_eq!(segments[1], text("  x"));
    }

    #[test]
    fn test_scan_literal_percent() {
        assert_eq!(scan("<%% not code %>").unwrap(), vec![text("<%% not code %>")]);
    }

    #[test]
    fn test_scan_unclosed() {
        let err = scan("line\n<%= oops").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("for (const x of items) { total += x.n * 2; }").unwrap();
        assert_eq!(tokens[0], Token::Ident("for".into()));
        assert!(tokens.contains(&Token::Punct("+=")));
        assert!(tokens.contains(&Token::Number(2.0)));
    }

    #[test]
    fn test_tokenize_strings_and_comments() {
        let tokens = tokenize(r#"'it\'s' + "a\nb" // trailing"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Str("it's".into()),
                Token::Punct("+"),
                Token::Str("a\nb".into()),
            ]
        );
        assert!(tokenize("'open").is_err());
        assert!(tokenize("a # b").is_err());
    }

    #[test]
    fn test_tokenize_template_strings() {
        let tokens = tokenize(r#"`a\`b ${ x + "}" } c${ {k: 1}.k }`"#).unwrap();
        assert_eq!(
            tokens,
            vec![Token::Template(vec![
                TemplatePart::Text("a`b ".into()),
                TemplatePart::Substitution(vec![
                    Token::Ident("x".into()),
                    Token::Punct("+"),
                    Token::Str("}".into()),
                ]),
                TemplatePart::Text(" c".into()),
                TemplatePart::Substitution(vec![
                    Token::Punct("{"),
                    Token::Ident("k".into()),
                    Token::Punct(":"),
                    Token::Number(1.0),
                    Token::Punct("}"),
                    Token::Punct("."),
                    Token::Ident("k".into()),
                ]),
            ])]
        );
        assert_eq!(tokenize("``").unwrap(), vec![Token::Template(vec![])]);
        assert!(tokenize("`open").is_err());
        assert!(tokenize("`${ x `").is_err());
    }
}
