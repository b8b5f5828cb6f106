//! Recursive-descent parser for template programs.
//!
//! Scanned segments are flattened into a single item stream: literal text and
//! value directives become standalone items, statement directives contribute
//! their code tokens followed by an implicit `;`. This lets a statement opened
//! in one directive (`<% if (x) { %>`) be closed in another (`<% } %>`).

use crate::{
    ast::{AssignOp, BinaryOp, Expr, LogicalOp, Stmt, UnaryOp},
    error::{Result, TemplateError},
    lexer::{DirectiveKind, Segment, TemplatePart, Token, tokenize},
    value::Value,
};

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Code(Token),
    Text(String),
    Output { expr: Expr, escape: bool },
}

/// Parse scanned template segments into a statement list.
pub(crate) fn parse_template(segments: Vec<Segment>) -> Result<Vec<Stmt>> {
    let mut items = Vec::new();

    for segment in segments {
        match segment {
            Segment::Text(text) => items.push(Item::Text(text)),
            Segment::Directive { kind, code } => match kind {
                DirectiveKind::Escaped | DirectiveKind::Raw => {
                    let expr = parse_output_expression(&code)?;
                    items.push(Item::Output {
                        expr,
                        escape: kind == DirectiveKind::Escaped,
                    });
                }
                DirectiveKind::Statement => {
                    items.extend(tokenize(&code)?.into_iter().map(Item::Code));
                    items.push(Item::Code(Token::Punct(";")));
                }
            },
        }
    }

    let mut parser = Parser { items, pos: 0 };
    let mut body = Vec::new();
    while !parser.at_end() {
        if parser.is_punct("}") {
            return Err(TemplateError::syntax("unexpected `}` without matching `{`"));
        }
        body.push(parser.statement()?);
    }
    Ok(body)
}

fn parse_output_expression(code: &str) -> Result<Expr> {
    let items = tokenize(code)?.into_iter().map(Item::Code).collect();
    let mut parser = Parser { items, pos: 0 };
    let expr = parser.expression()?;
    while parser.eat_punct(";") {}
    if !parser.at_end() {
        return Err(TemplateError::syntax(format!(
            "unexpected {} in output directive `{}`",
            parser.describe(),
            code.trim()
        )));
    }
    Ok(expr)
}

/// A backtick string as a left-to-right concatenation starting from `""`,
/// so every substitution is converted like `String(x)`.
fn template_string(parts: Vec<TemplatePart>) -> Result<Expr> {
    let mut expr = Expr::Literal(Value::string(""));
    for part in parts {
        let piece = match part {
            TemplatePart::Text(text) => Expr::Literal(Value::from(text)),
            TemplatePart::Substitution(tokens) => {
                let mut parser = Parser {
                    items: tokens.into_iter().map(Item::Code).collect(),
                    pos: 0,
                };
                let piece = parser.expression()?;
                if !parser.at_end() {
                    return Err(TemplateError::syntax(format!(
                        "unexpected {} in template substitution",
                        parser.describe()
                    )));
                }
                piece
            }
        };
        expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(expr),
            right: Box::new(piece),
        };
    }
    Ok(expr)
}

struct Parser {
    items: Vec<Item>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.items.len()
    }

    fn peek(&self) -> Option<&Item> {
        self.items.get(self.pos)
    }

    fn peek_token(&self, offset: usize) -> Option<&Token> {
        match self.items.get(self.pos + offset) {
            Some(Item::Code(token)) => Some(token),
            _ => None,
        }
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek_token(0), Some(Token::Punct(p)) if *p == punct)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_token(0), Some(Token::Ident(name)) if name == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(TemplateError::syntax(format!(
                "expected `{punct}`, found {}",
                self.describe()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek_token(0) {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(TemplateError::syntax(format!(
                "expected identifier, found {}",
                self.describe()
            ))),
        }
    }

    fn describe(&self) -> String {
        match self.peek() {
            None => "end of template".to_string(),
            Some(Item::Text(_)) => "template text".to_string(),
            Some(Item::Output { .. }) => "output directive".to_string(),
            Some(Item::Code(Token::Ident(name))) => format!("`{name}`"),
            Some(Item::Code(Token::Number(n))) => format!("number {n}"),
            Some(Item::Code(Token::Str(s))) => format!("string {s:?}"),
            Some(Item::Code(Token::Template(_))) => "template string".to_string(),
            Some(Item::Code(Token::Punct(p))) => format!("`{p}`"),
        }
    }

    // ----- statements -----

    fn statement(&mut self) -> Result<Stmt> {
        match self.peek() {
            None => Err(TemplateError::syntax("unexpected end of template")),
            Some(Item::Text(text)) => {
                let stmt = Stmt::Text(text.clone());
                self.pos += 1;
                Ok(stmt)
            }
            Some(Item::Output { expr, escape }) => {
                let stmt = Stmt::Output {
                    expr: expr.clone(),
                    escape: *escape,
                };
                self.pos += 1;
                Ok(stmt)
            }
            Some(Item::Code(Token::Punct(";"))) => {
                self.pos += 1;
                Ok(Stmt::Empty)
            }
            Some(Item::Code(Token::Punct("{"))) => self.block(),
            Some(Item::Code(Token::Ident(keyword))) => match keyword.as_str() {
                "if" => self.if_statement(),
                "for" => self.for_statement(),
                "while" => self.while_statement(),
                "let" | "const" | "var" => {
                    let stmt = self.declaration()?;
                    self.eat_punct(";");
                    Ok(stmt)
                }
                "break" => {
                    self.pos += 1;
                    self.eat_punct(";");
                    Ok(Stmt::Break)
                }
                "continue" => {
                    self.pos += 1;
                    self.eat_punct(";");
                    Ok(Stmt::Continue)
                }
                _ => self.simple_statement_terminated(),
            },
            Some(Item::Code(_)) => self.simple_statement_terminated(),
        }
    }

    fn block(&mut self) -> Result<Stmt> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        loop {
            if self.at_end() {
                return Err(TemplateError::syntax("unclosed `{` block"));
            }
            if self.eat_punct("}") {
                return Ok(Stmt::Block(body));
            }
            body.push(self.statement()?);
        }
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let test = self.expression()?;
        self.expect_punct(")")?;
        let consequent = Box::new(self.statement()?);

        // `<% } %><% else { %>` leaves implicit separators before `else`.
        let checkpoint = self.pos;
        while self.eat_punct(";") {}
        let alternate = if self.is_keyword("else") {
            self.pos += 1;
            Some(Box::new(self.statement()?))
        } else {
            self.pos = checkpoint;
            None
        };

        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;

        let declared = matches!(
            self.peek_token(0),
            Some(Token::Ident(kw)) if matches!(kw.as_str(), "let" | "const" | "var")
        );
        let offset = usize::from(declared);
        let iteration = match (self.peek_token(offset), self.peek_token(offset + 1)) {
            (Some(Token::Ident(_)), Some(Token::Ident(kw))) if kw == "of" || kw == "in" => {
                Some(kw == "of")
            }
            _ => None,
        };

        if let Some(is_of) = iteration {
            self.pos += offset;
            let binding = self.expect_ident()?;
            self.pos += 1;
            let source = self.expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(if is_of {
                Stmt::ForOf {
                    binding,
                    iterable: source,
                    body,
                }
            } else {
                Stmt::ForIn {
                    binding,
                    object: source,
                    body,
                }
            });
        }

        let init = if self.is_punct(";") {
            None
        } else if declared {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(self.simple_statement()?))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(Box::new(self.simple_statement()?))
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let test = self.expression()?;
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { test, body })
    }

    fn declaration(&mut self) -> Result<Stmt> {
        self.pos += 1;
        let mut bindings = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let value = if self.eat_punct("=") {
                Some(self.expression()?)
            } else {
                None
            };
            bindings.push((name, value));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Declare(bindings))
    }

    fn simple_statement_terminated(&mut self) -> Result<Stmt> {
        let stmt = self.simple_statement()?;
        self.eat_punct(";");
        Ok(stmt)
    }

    /// Assignment or expression statement.
    fn simple_statement(&mut self) -> Result<Stmt> {
        if let (Some(Token::Ident(name)), Some(Token::Punct(op))) =
            (self.peek_token(0), self.peek_token(1))
        {
            let op = match *op {
                "=" => Some(AssignOp::Set),
                "+=" => Some(AssignOp::Add),
                "-=" => Some(AssignOp::Sub),
                _ => None,
            };
            if let Some(op) = op {
                let name = name.clone();
                self.pos += 2;
                let value = self.expression()?;
                return Ok(Stmt::Assign { name, op, value });
            }
        }

        let expr = self.expression()?;
        if self.is_punct("=") || self.is_punct("+=") || self.is_punct("-=") {
            return Err(TemplateError::syntax(
                "only plain variables can be assigned to",
            ));
        }
        Ok(Stmt::Expr(expr))
    }

    // ----- expressions -----

    fn expression(&mut self) -> Result<Expr> {
        let test = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect_punct(":")?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut left = self.logical_and()?;
        loop {
            let op = if self.eat_punct("||") {
                LogicalOp::Or
            } else if self.eat_punct("??") {
                LogicalOp::Nullish
            } else {
                return Ok(left);
            };
            let right = self.logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut left = self.equality()?;
        while self.eat_punct("&&") {
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, op) in ops {
                if self.eat_punct(punct) {
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = if self.eat_punct("!") {
            UnaryOp::Not
        } else if self.eat_punct("-") {
            UnaryOp::Neg
        } else if self.eat_punct("+") {
            UnaryOp::Plus
        } else if self.is_keyword("typeof") {
            self.pos += 1;
            UnaryOp::TypeOf
        } else if self.is_punct("++") || self.is_punct("--") {
            let delta = if self.eat_punct("++") {
                1.0
            } else {
                self.pos += 1;
                -1.0
            };
            let name = self.expect_ident()?;
            return Ok(Expr::Update {
                name,
                delta,
                prefix: true,
            });
        } else {
            return self.postfix();
        };
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct(".") {
                let property = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                if self.eat_punct("[") {
                    let index = self.expression()?;
                    self.expect_punct("]")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                    };
                } else {
                    let property = self.expect_ident()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                    };
                }
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                };
            } else if self.eat_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.is_punct("++") || self.is_punct("--") {
                let Expr::Ident(name) = &expr else {
                    return Err(TemplateError::syntax(
                        "increment and decrement need a plain variable",
                    ));
                };
                let delta = if self.is_punct("++") { 1.0 } else { -1.0 };
                self.pos += 1;
                return Ok(Expr::Update {
                    name: name.clone(),
                    delta,
                    prefix: false,
                });
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            args.push(self.expression()?);
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = match self.peek() {
            Some(Item::Code(token)) => token.clone(),
            _ => {
                return Err(TemplateError::syntax(format!(
                    "expected expression, found {}",
                    self.describe()
                )));
            }
        };

        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Number(n)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::from(s)))
            }
            Token::Template(parts) => {
                self.pos += 1;
                template_string(parts)
            }
            Token::Ident(name) => {
                if matches!(self.peek_token(1), Some(Token::Punct("=>"))) {
                    self.pos += 2;
                    return self.arrow_body(vec![name]);
                }
                self.pos += 1;
                Ok(match name.as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" => Expr::Literal(Value::Null),
                    "undefined" => Expr::Literal(Value::Undefined),
                    _ => Expr::Ident(name),
                })
            }
            Token::Punct("(") => {
                if let Some(params) = self.arrow_params() {
                    return self.arrow_body(params);
                }
                self.pos += 1;
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => {
                self.pos += 1;
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.expression()?);
                    if !self.eat_punct(",") {
                        self.expect_punct("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::Punct("{") => {
                self.pos += 1;
                let mut fields = Vec::new();
                while !self.eat_punct("}") {
                    let key = match self.peek_token(0) {
                        Some(Token::Ident(k) | Token::Str(k)) => k.clone(),
                        Some(Token::Number(n)) => crate::value::format_number(*n),
                        _ => {
                            return Err(TemplateError::syntax(format!(
                                "expected object key, found {}",
                                self.describe()
                            )));
                        }
                    };
                    self.pos += 1;
                    let value = if self.eat_punct(":") {
                        self.expression()?
                    } else {
                        Expr::Ident(key.clone())
                    };
                    fields.push((key, value));
                    if !self.eat_punct(",") {
                        self.expect_punct("}")?;
                        break;
                    }
                }
                Ok(Expr::Object(fields))
            }
            _ => Err(TemplateError::syntax(format!(
                "expected expression, found {}",
                self.describe()
            ))),
        }
    }

    /// If the parenthesised group at the cursor is an arrow parameter list,
    /// consume it through the `=>` and return the parameter names.
    fn arrow_params(&mut self) -> Option<Vec<String>> {
        let mut params = Vec::new();
        let mut offset = 1;
        loop {
            match self.peek_token(offset)? {
                Token::Punct(")") => break,
                Token::Ident(name) => params.push(name.clone()),
                _ => return None,
            }
            offset += 1;
            match self.peek_token(offset)? {
                Token::Punct(",") => offset += 1,
                Token::Punct(")") => break,
                _ => return None,
            }
        }
        if !matches!(self.peek_token(offset + 1), Some(Token::Punct("=>"))) {
            return None;
        }
        self.pos += offset + 2;
        Some(params)
    }

    fn arrow_body(&mut self, params: Vec<String>) -> Result<Expr> {
        if self.is_punct("{") {
            return Err(TemplateError::syntax(
                "arrow functions must have an expression body",
            ));
        }
        let body = self.expression()?;
        Ok(Expr::Arrow {
            params,
            body: Box::new(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::scan;

    fn parse(source: &str) -> Result<Vec<Stmt>> {
        parse_template(scan(source)?)
    }

    #[test]
    fn test_parse_text_and_output() {
        let body = parse("Hi <%= name %>!").unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(body[0], Stmt::Text("Hi ".into()));
        assert_eq!(
            body[1],
            Stmt::Output {
                expr: Expr::Ident("name".into()),
                escape: true
            }
        );
    }

    #[test]
    fn test_if_spanning_directives() {
        let body = parse("<% if (a) { %>yes<% } else { %>no<% } %>").unwrap();
        let Stmt::If {
            consequent,
            alternate,
            ..
        } = &body[0]
        else {
            panic!("expected if statement, got {body:?}");
        };
        assert!(matches!(**consequent, Stmt::Block(_)));
        assert!(alternate.is_some());
    }

    #[test]
    fn test_else_in_separate_directive() {
        let body = parse("<% if (a) { %>yes<% } %><% else { %>no<% } %>").unwrap();
        assert!(matches!(&body[0], Stmt::If { alternate: Some(_), .. }));
    }

    #[test]
    fn test_for_loops() {
        let body = parse("<% for (const item of items) { %>x<% } %>").unwrap();
        assert!(matches!(&body[0], Stmt::ForOf { binding, .. } if binding == "item"));

        let body = parse("<% for (let k in obj) { %>x<% } %>").unwrap();
        assert!(matches!(&body[0], Stmt::ForIn { binding, .. } if binding == "k"));

        let body = parse("<% for (let i = 0; i < 3; i++) { %>x<% } %>").unwrap();
        assert!(matches!(
            &body[0],
            Stmt::For {
                init: Some(_),
                test: Some(_),
                update: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_precedence() {
        let body = parse("<%= 1 + 2 * 3 %>").unwrap();
        let Stmt::Output {
            expr: Expr::Binary { op, right, .. },
            ..
        } = &body[0]
        else {
            panic!("expected binary output");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_arrow_arguments() {
        let body = parse("<%= xs.map((x, i) => x + i).join('-') %>").unwrap();
        assert!(matches!(&body[0], Stmt::Output { .. }));
        let body = parse("<%= xs.filter(x => x.draft) %>").unwrap();
        assert!(matches!(&body[0], Stmt::Output { .. }));
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(parse("<% if (a) { %>yes").is_err());
        assert!(parse("<% } %>").is_err());
    }

    #[test]
    fn test_output_must_be_single_expression() {
        assert!(parse("<%= a b %>").is_err());
        assert!(parse("<%= a; %>").is_ok());
    }

    #[test]
    fn test_object_literal() {
        let body = parse("<% const o = { a: 1, 'b': two, c }; %>").unwrap();
        let Stmt::Declare(bindings) = &body[0] else {
            panic!("expected declaration");
        };
        let Some(Expr::Object(fields)) = &bindings[0].1 else {
            panic!("expected object literal");
        };
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2], ("c".to_string(), Expr::Ident("c".into())));
    }
}
