//! Script and stylesheet minification.

/// Shrinks inline scripts and styles.
///
/// Implementations must be deterministic.
pub trait Minifier: Send + Sync {
    fn minify_script(&self, source: &str) -> String;
    fn minify_style(&self, source: &str) -> String;
}

/// Comment and whitespace stripping that leaves literals alone.
///
/// Scripts keep their line structure (blank lines and indentation are
/// dropped) so automatic semicolon insertion still sees the same newlines.
/// String, template and regular expression literals are copied verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightMinifier;

impl Minifier for LightMinifier {
    fn minify_script(&self, source: &str) -> String {
        ScriptScanner::new(source).run()
    }

    fn minify_style(&self, source: &str) -> String {
        let chars: Vec<char> = source.chars().collect();
        let mut out = String::with_capacity(source.len());
        let mut quote: Option<char> = None;
        let mut pending_space = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote {
                out.push(c);
                if c == '\\' {
                    if let Some(&escaped) = chars.get(i + 1) {
                        out.push(escaped);
                        i += 1;
                    }
                } else if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            if c == '/' && chars.get(i + 1) == Some(&'*') {
                i = skip_block_comment(&chars, i);
                pending_space = true;
                continue;
            }
            if c.is_whitespace() {
                pending_space = true;
                i += 1;
                continue;
            }
            if pending_space {
                let prev_tight = out.ends_with(['{', '}', ';', ':', ',', '>']);
                let next_tight = matches!(c, '{' | '}' | ';' | ',' | '>');
                if !out.is_empty() && !prev_tight && !next_tight {
                    out.push(' ');
                }
                pending_space = false;
            }
            if c == '}' && out.ends_with(';') {
                out.pop();
            }
            if c == '"' || c == '\'' {
                quote = Some(c);
            }
            out.push(c);
            i += 1;
        }
        out
    }
}

/// Position just past the `*/` closing the comment opened at `start`, or the
/// end of input.
fn skip_block_comment(chars: &[char], start: usize) -> usize {
    let mut i = start + 2;
    while i < chars.len() {
        if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

/// Whitespace seen since the last emitted code character.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Gap {
    None,
    Space(String),
    Newline,
}

/// Words after which a `/` starts a regular expression, not a division.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

struct ScriptScanner {
    chars: Vec<char>,
    pos: usize,
    out: String,
    gap: Gap,
    /// Brace depth in code.
    depth: usize,
    /// Depths at which open `${` substitutions resume their template.
    templates: Vec<usize>,
}

impl ScriptScanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            out: String::with_capacity(source.len()),
            gap: Gap::None,
            depth: 0,
            templates: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> String {
        while let Some(c) = self.peek(0) {
            match c {
                '/' if self.peek(1) == Some('/') => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '/' if self.peek(1) == Some('*') => {
                    let end = skip_block_comment(&self.chars, self.pos);
                    let newline = self.chars[self.pos..end].contains(&'\n');
                    self.pos = end;
                    self.whitespace(if newline { '\n' } else { ' ' });
                }
                c if c.is_whitespace() => {
                    self.pos += 1;
                    self.whitespace(c);
                }
                '"' | '\'' => {
                    self.flush_gap();
                    self.string(c);
                }
                '`' => {
                    self.flush_gap();
                    self.emit(c);
                    self.template();
                }
                '/' if self.regex_allowed() => {
                    self.flush_gap();
                    self.regex();
                }
                '{' => {
                    self.flush_gap();
                    self.depth += 1;
                    self.emit(c);
                }
                '}' => {
                    self.flush_gap();
                    self.depth = self.depth.saturating_sub(1);
                    self.emit(c);
                    if self.templates.last() == Some(&self.depth) {
                        self.templates.pop();
                        self.template();
                    }
                }
                c => {
                    self.flush_gap();
                    self.emit(c);
                }
            }
        }
        self.out
    }

    fn emit(&mut self, c: char) {
        self.out.push(c);
        self.pos += 1;
    }

    fn whitespace(&mut self, c: char) {
        if c == '\n' {
            self.gap = Gap::Newline;
            return;
        }
        match &mut self.gap {
            Gap::Newline => {}
            Gap::Space(run) => run.push(c),
            Gap::None => self.gap = Gap::Space(c.to_string()),
        }
    }

    fn flush_gap(&mut self) {
        let at_line_start = self.out.is_empty() || self.out.ends_with('\n');
        match std::mem::replace(&mut self.gap, Gap::None) {
            Gap::Newline if !at_line_start => self.out.push('\n'),
            Gap::Space(run) if !at_line_start => self.out.push_str(&run),
            _ => {}
        }
    }

    /// Copy a quoted string, escapes included.
    fn string(&mut self, quote: char) {
        self.emit(quote);
        while let Some(c) = self.peek(0) {
            self.emit(c);
            if c == '\\' {
                if let Some(escaped) = self.peek(0) {
                    self.emit(escaped);
                }
            } else if c == quote || c == '\n' {
                return;
            }
        }
    }

    /// Copy template literal text up to the closing backtick or the next
    /// `${`, which switches back to code.
    fn template(&mut self) {
        while let Some(c) = self.peek(0) {
            self.emit(c);
            match c {
                '`' => return,
                '\\' => {
                    if let Some(escaped) = self.peek(0) {
                        self.emit(escaped);
                    }
                }
                '$' if self.peek(0) == Some('{') => {
                    self.emit('{');
                    self.templates.push(self.depth);
                    self.depth += 1;
                    return;
                }
                _ => {}
            }
        }
    }

    /// Copy a regular expression literal, character classes included.
    fn regex(&mut self) {
        self.emit('/');
        let mut in_class = false;
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                return;
            }
            self.emit(c);
            match c {
                '\\' => {
                    if let Some(escaped) = self.peek(0).filter(|&e| e != '\n') {
                        self.emit(escaped);
                    }
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => return,
                _ => {}
            }
        }
    }

    /// Whether a `/` at the cursor opens a regular expression.
    fn regex_allowed(&self) -> bool {
        let before = self.out.trim_end();
        let word: String = before
            .chars()
            .rev()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if !word.is_empty() {
            return REGEX_KEYWORDS.contains(&word.as_str());
        }
        match before.chars().last() {
            None => true,
            Some(c) => "(,=:[!&|?{};+-*%<>~^".contains(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_style() {
        let css = "/* header */\nbody {\n  margin: 0 ;\n  font-family: \"Open  Sans\", serif;\n}\n\na > b , c { color: red; }\n";
        assert_eq!(
            LightMinifier.minify_style(css),
            "body{margin:0;font-family:\"Open  Sans\",serif}a>b,c{color:red}"
        );
    }

    #[test]
    fn test_minify_style_keeps_descendant_selectors() {
        assert_eq!(
            LightMinifier.minify_style("nav  ul li :hover { x: 1 }"),
            "nav ul li :hover{x:1}"
        );
    }

    #[test]
    fn test_minify_script() {
        let js = "// setup\nconst url = \"http://example.com\"; /* inline */\n\n    let a = 1\n    let b = a + '//not a comment'\n";
        assert_eq!(
            LightMinifier.minify_script(js),
            "const url = \"http://example.com\";\nlet a = 1\nlet b = a + '//not a comment'"
        );
    }

    #[test]
    fn test_minify_script_keeps_regex_literals() {
        let js = "var ok = /^https?:\\/\\//.test(u); done();";
        assert_eq!(LightMinifier.minify_script(js), js);

        let js = "const parts = s.split(/[/]+/g) // split on slashes\nreturn /a\\/b/.test(x)";
        assert_eq!(
            LightMinifier.minify_script(js),
            "const parts = s.split(/[/]+/g)\nreturn /a\\/b/.test(x)"
        );
    }

    #[test]
    fn test_minify_script_division_is_not_a_regex() {
        let js = "const half = total / 2; // half\nconst ratio = (a) / b / c;";
        assert_eq!(
            LightMinifier.minify_script(js),
            "const half = total / 2;\nconst ratio = (a) / b / c;"
        );
    }

    #[test]
    fn test_minify_script_keeps_template_literals() {
        let js = "const s = `line1\n    indented\n\n`;";
        assert_eq!(LightMinifier.minify_script(js), js);

        let js = "  const t = `a ${ items.map(i => `<li>${ i }</li>`).join('') }\n  b // not a comment`;\n  // gone\n  next();";
        assert_eq!(
            LightMinifier.minify_script(js),
            "const t = `a ${ items.map(i => `<li>${ i }</li>`).join('') }\n  b // not a comment`;\nnext();"
        );
    }

    #[test]
    fn test_minify_style_honours_escapes() {
        let css = "a::before { content: \"x\\\"  y\"; }\nb  c { color: red; }";
        assert_eq!(
            LightMinifier.minify_style(css),
            "a::before{content:\"x\\\"  y\"}b c{color:red}"
        );
        assert_eq!(
            LightMinifier.minify_style("q::after { content: '\\'' }  p { x: 1 }"),
            "q::after{content:'\\''}p{x:1}"
        );
    }

    #[test]
    fn test_minify_is_deterministic() {
        let js = "function f() {\n  return `a ${1} /* b */`;\n}\n";
        assert_eq!(LightMinifier.minify_script(js), LightMinifier.minify_script(js));
        assert!(LightMinifier.minify_script(js).contains("/* b */"));
        assert_eq!(LightMinifier.minify_style(""), "");
    }
}
