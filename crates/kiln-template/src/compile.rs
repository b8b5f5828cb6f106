//! Lowering of the syntax tree into native closures.
//!
//! Every statement becomes a [`StmtFn`] that appends to the output buffer and
//! every expression an [`ExprFn`]. Nothing is interpreted at render time
//! beyond calling the closures in order.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    ast::{AssignOp, BinaryOp, Expr, LogicalOp, Stmt, UnaryOp},
    builtins::{self, escape_html},
    error::{Result, TemplateError},
    value::Value,
};

pub(crate) type ExprFn = Box<dyn Fn(&mut Scope) -> Result<Value> + Send + Sync>;
pub(crate) type StmtFn = Box<dyn Fn(&mut Scope, &mut String) -> Result<Flow> + Send + Sync>;

/// How control leaves a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
}

/// Variable frames visible to running template code.
///
/// The first frame holds the context bindings and any name assigned without
/// a declaration.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    frames: Vec<HashMap<String, Value>>,
}

impl Scope {
    pub(crate) fn new(globals: HashMap<String, Value>) -> Self {
        Self {
            frames: vec![globals],
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        self.get(name)
            .cloned()
            .ok_or_else(|| TemplateError::Reference(name.to_string()))
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    fn assign(&mut self, name: &str, value: Value) {
        if let Some(slot) = self
            .frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(name))
        {
            *slot = value;
        } else if let Some(base) = self.frames.first_mut() {
            base.insert(name.to_string(), value);
        }
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.frames.push(HashMap::new());
        let result = f(self);
        self.frames.pop();
        result
    }
}

/// An arrow function passed to a builtin.
pub(crate) struct Callback {
    params: Vec<String>,
    body: ExprFn,
}

impl Callback {
    pub(crate) fn call(&self, scope: &mut Scope, args: &[Value]) -> Result<Value> {
        scope.scoped(|scope| {
            for (i, param) in self.params.iter().enumerate() {
                scope.declare(param, args.get(i).cloned().unwrap_or_default());
            }
            (self.body)(scope)
        })
    }
}

/// An evaluated call argument.
pub(crate) enum Arg<'a> {
    Value(Value),
    Callback(&'a Callback),
}

enum CompiledArg {
    Value(ExprFn),
    Callback(Callback),
}

fn eval_args<'a>(scope: &mut Scope, args: &'a [CompiledArg]) -> Result<Vec<Arg<'a>>> {
    args.iter()
        .map(|arg| match arg {
            CompiledArg::Value(f) => f(scope).map(Arg::Value),
            CompiledArg::Callback(callback) => Ok(Arg::Callback(callback)),
        })
        .collect()
}

/// A compiled template body.
pub(crate) struct Program {
    body: Vec<StmtFn>,
    escapes: bool,
}

impl Program {
    pub(crate) fn compile(stmts: Vec<Stmt>) -> Self {
        let escapes = stmts.iter().any(Stmt::escapes_output);
        Self {
            body: stmts.into_iter().map(compile_stmt).collect(),
            escapes,
        }
    }

    /// Whether any directive writes HTML-escaped output.
    pub(crate) fn escapes(&self) -> bool {
        self.escapes
    }

    pub(crate) fn run(&self, scope: &mut Scope) -> Result<String> {
        let mut out = String::new();
        for stmt in &self.body {
            if stmt(scope, &mut out)? != Flow::Normal {
                return Err(TemplateError::syntax(
                    "`break` or `continue` outside of a loop",
                ));
            }
        }
        Ok(out)
    }
}

fn compile_stmt(stmt: Stmt) -> StmtFn {
    match stmt {
        Stmt::Text(text) => Box::new(move |_, out| {
            out.push_str(&text);
            Ok(Flow::Normal)
        }),
        Stmt::Output { expr, escape } => {
            let expr = compile_expr(expr);
            if escape {
                Box::new(move |scope, out| {
                    out.push_str(&escape_html(&expr(scope)?.to_output()));
                    Ok(Flow::Normal)
                })
            } else {
                Box::new(move |scope, out| {
                    out.push_str(&expr(scope)?.to_output());
                    Ok(Flow::Normal)
                })
            }
        }
        Stmt::Declare(bindings) => {
            let bindings: Vec<(String, Option<ExprFn>)> = bindings
                .into_iter()
                .map(|(name, init)| (name, init.map(compile_expr)))
                .collect();
            Box::new(move |scope, _| {
                for (name, init) in &bindings {
                    let value = match init {
                        Some(init) => init(scope)?,
                        None => Value::Undefined,
                    };
                    scope.declare(name, value);
                }
                Ok(Flow::Normal)
            })
        }
        Stmt::Assign { name, op, value } => {
            let value = compile_expr(value);
            Box::new(move |scope, _| {
                let rhs = value(scope)?;
                let result = match op {
                    AssignOp::Set => rhs,
                    AssignOp::Add => add(&scope.lookup(&name)?, &rhs),
                    AssignOp::Sub => {
                        Value::Number(scope.lookup(&name)?.to_number() - rhs.to_number())
                    }
                };
                scope.assign(&name, result);
                Ok(Flow::Normal)
            })
        }
        Stmt::Expr(expr) => {
            let expr = compile_expr(expr);
            Box::new(move |scope, _| {
                expr(scope)?;
                Ok(Flow::Normal)
            })
        }
        Stmt::If {
            test,
            consequent,
            alternate,
        } => {
            let test = compile_expr(test);
            let consequent = compile_stmt(*consequent);
            let alternate = alternate.map(|alt| compile_stmt(*alt));
            Box::new(move |scope, out| {
                if test(scope)?.is_truthy() {
                    consequent(scope, out)
                } else if let Some(alternate) = &alternate {
                    alternate(scope, out)
                } else {
                    Ok(Flow::Normal)
                }
            })
        }
        Stmt::ForOf {
            binding,
            iterable,
            body,
        } => {
            let iterable = compile_expr(iterable);
            let body = compile_stmt(*body);
            Box::new(move |scope, out| {
                let items = match iterable(scope)? {
                    Value::Array(items) => items,
                    Value::String(s) => {
                        Arc::new(s.chars().map(|c| Value::string(c.to_string())).collect())
                    }
                    other => {
                        return Err(TemplateError::type_error(format!(
                            "{} is not iterable",
                            other.type_name()
                        )));
                    }
                };
                for item in items.iter() {
                    let flow = scope.scoped(|scope| {
                        scope.declare(&binding, item.clone());
                        body(scope, out)
                    })?;
                    if flow == Flow::Break {
                        break;
                    }
                }
                Ok(Flow::Normal)
            })
        }
        Stmt::ForIn {
            binding,
            object,
            body,
        } => {
            let object = compile_expr(object);
            let body = compile_stmt(*body);
            Box::new(move |scope, out| {
                let keys = builtins::own_keys(&object(scope)?);
                for key in keys {
                    let flow = scope.scoped(|scope| {
                        scope.declare(&binding, Value::string(key));
                        body(scope, out)
                    })?;
                    if flow == Flow::Break {
                        break;
                    }
                }
                Ok(Flow::Normal)
            })
        }
        Stmt::For {
            init,
            test,
            update,
            body,
        } => {
            let init = init.map(|init| compile_stmt(*init));
            let test = test.map(compile_expr);
            let update = update.map(|update| compile_stmt(*update));
            let body = compile_stmt(*body);
            Box::new(move |scope, out| {
                scope.scoped(|scope| {
                    if let Some(init) = &init {
                        init(scope, out)?;
                    }
                    loop {
                        if let Some(test) = &test
                            && !test(scope)?.is_truthy()
                        {
                            break;
                        }
                        if body(scope, out)? == Flow::Break {
                            break;
                        }
                        if let Some(update) = &update {
                            update(scope, out)?;
                        }
                    }
                    Ok(Flow::Normal)
                })
            })
        }
        Stmt::While { test, body } => {
            let test = compile_expr(test);
            let body = compile_stmt(*body);
            Box::new(move |scope, out| {
                while test(scope)?.is_truthy() {
                    if body(scope, out)? == Flow::Break {
                        break;
                    }
                }
                Ok(Flow::Normal)
            })
        }
        Stmt::Block(stmts) => {
            let body: Vec<StmtFn> = stmts.into_iter().map(compile_stmt).collect();
            Box::new(move |scope, out| {
                scope.scoped(|scope| {
                    for stmt in &body {
                        let flow = stmt(scope, out)?;
                        if flow != Flow::Normal {
                            return Ok(flow);
                        }
                    }
                    Ok(Flow::Normal)
                })
            })
        }
        Stmt::Break => Box::new(|_, _| Ok(Flow::Break)),
        Stmt::Continue => Box::new(|_, _| Ok(Flow::Continue)),
        Stmt::Empty => Box::new(|_, _| Ok(Flow::Normal)),
    }
}

fn compile_expr(expr: Expr) -> ExprFn {
    match expr {
        Expr::Literal(value) => Box::new(move |_| Ok(value.clone())),
        Expr::Ident(name) => Box::new(move |scope| scope.lookup(&name)),
        Expr::Array(items) => {
            let items: Vec<ExprFn> = items.into_iter().map(compile_expr).collect();
            Box::new(move |scope| {
                let values = items
                    .iter()
                    .map(|item| item(scope))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::array(values))
            })
        }
        Expr::Object(fields) => {
            let fields: Vec<(String, ExprFn)> = fields
                .into_iter()
                .map(|(key, value)| (key, compile_expr(value)))
                .collect();
            Box::new(move |scope| {
                let mut map = BTreeMap::new();
                for (key, value) in &fields {
                    map.insert(key.clone(), value(scope)?);
                }
                Ok(Value::object(map))
            })
        }
        Expr::Member {
            object,
            property,
            optional,
        } => {
            let object = compile_expr(*object);
            Box::new(move |scope| {
                let target = object(scope)?;
                if optional && target.is_nullish() {
                    return Ok(Value::Undefined);
                }
                builtins::property(&target, &property)
            })
        }
        Expr::Index {
            object,
            index,
            optional,
        } => {
            let object = compile_expr(*object);
            let index = compile_expr(*index);
            Box::new(move |scope| {
                let target = object(scope)?;
                if optional && target.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let key = index(scope)?;
                builtins::index(&target, &key)
            })
        }
        Expr::Call { callee, args } => compile_call(*callee, args),
        Expr::Arrow { .. } => Box::new(|_| {
            Err(TemplateError::syntax(
                "arrow functions are only supported as call arguments",
            ))
        }),
        Expr::Unary { op, operand } => compile_unary(op, *operand),
        Expr::Binary { op, left, right } => {
            let left = compile_expr(*left);
            let right = compile_expr(*right);
            Box::new(move |scope| {
                let a = left(scope)?;
                let b = right(scope)?;
                Ok(binary(op, &a, &b))
            })
        }
        Expr::Logical { op, left, right } => {
            let left = compile_expr(*left);
            let right = compile_expr(*right);
            Box::new(move |scope| {
                let a = left(scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !a.is_truthy(),
                    LogicalOp::Or => a.is_truthy(),
                    LogicalOp::Nullish => !a.is_nullish(),
                };
                if short_circuit { Ok(a) } else { right(scope) }
            })
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let test = compile_expr(*test);
            let consequent = compile_expr(*consequent);
            let alternate = compile_expr(*alternate);
            Box::new(move |scope| {
                if test(scope)?.is_truthy() {
                    consequent(scope)
                } else {
                    alternate(scope)
                }
            })
        }
        Expr::Update {
            name,
            delta,
            prefix,
        } => Box::new(move |scope| {
            let old = scope.lookup(&name)?.to_number();
            let new = old + delta;
            scope.assign(&name, Value::Number(new));
            Ok(Value::Number(if prefix { new } else { old }))
        }),
    }
}

fn compile_args(args: Vec<Expr>) -> Vec<CompiledArg> {
    args.into_iter()
        .map(|arg| match arg {
            Expr::Arrow { params, body } => CompiledArg::Callback(Callback {
                params,
                body: compile_expr(*body),
            }),
            other => CompiledArg::Value(compile_expr(other)),
        })
        .collect()
}

fn compile_call(callee: Expr, args: Vec<Expr>) -> ExprFn {
    let args = compile_args(args);
    match callee {
        Expr::Member {
            object,
            property,
            optional,
        } => {
            // `Math.max(...)` and friends, unless the template shadows the name.
            let namespace = match &*object {
                Expr::Ident(name) if builtins::NAMESPACES.contains(&name.as_str()) => {
                    Some(name.clone())
                }
                _ => None,
            };
            let object = compile_expr(*object);
            Box::new(move |scope| {
                if let Some(namespace) = &namespace
                    && scope.get(namespace).is_none()
                {
                    let args = eval_args(scope, &args)?;
                    return builtins::call_namespace(namespace, &property, &args);
                }
                let receiver = object(scope)?;
                if optional && receiver.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let args = eval_args(scope, &args)?;
                builtins::call_method(scope, &receiver, &property, &args)
            })
        }
        Expr::Ident(name) => Box::new(move |scope| {
            if scope.get(&name).is_some() {
                return Err(TemplateError::type_error(format!("{name} is not a function")));
            }
            let args = eval_args(scope, &args)?;
            builtins::call_global(&name, &args)
        }),
        _ => Box::new(|_| Err(TemplateError::type_error("expression is not a function"))),
    }
}

fn compile_unary(op: UnaryOp, operand: Expr) -> ExprFn {
    // `typeof missing` is "undefined" rather than a reference error.
    if op == UnaryOp::TypeOf
        && let Expr::Ident(name) = &operand
    {
        let name = name.clone();
        return Box::new(move |scope| {
            Ok(Value::string(
                scope.get(&name).map_or("undefined", type_of),
            ))
        });
    }

    let operand = compile_expr(operand);
    Box::new(move |scope| {
        let value = operand(scope)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.is_truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::TypeOf => Value::string(type_of(&value)),
        })
    })
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Null | Value::Array(_) | Value::Object(_) | Value::Date(_) => "object",
    }
}

/// JavaScript `+`: concatenation as soon as either side is not a primitive
/// number-like value.
pub(crate) fn add(a: &Value, b: &Value) -> Value {
    let concatenates = |v: &Value| {
        matches!(
            v,
            Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Date(_)
        )
    };
    if concatenates(a) || concatenates(b) {
        Value::string(format!("{}{}", a.to_js_string(), b.to_js_string()))
    } else {
        Value::Number(a.to_number() + b.to_number())
    }
}

pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.to_number().partial_cmp(&b.to_number()),
    }
}

fn binary(op: BinaryOp, a: &Value, b: &Value) -> Value {
    match op {
        BinaryOp::Add => add(a, b),
        BinaryOp::Sub => Value::Number(a.to_number() - b.to_number()),
        BinaryOp::Mul => Value::Number(a.to_number() * b.to_number()),
        BinaryOp::Div => Value::Number(a.to_number() / b.to_number()),
        BinaryOp::Rem => Value::Number(a.to_number() % b.to_number()),
        BinaryOp::Lt => Value::Bool(compare(a, b) == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(
            compare(a, b),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(compare(a, b) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(a, b),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Eq => Value::Bool(a.loose_eq(b)),
        BinaryOp::Ne => Value::Bool(!a.loose_eq(b)),
        BinaryOp::StrictEq => Value::Bool(a.strict_eq(b)),
        BinaryOp::StrictNe => Value::Bool(!a.strict_eq(b)),
    }
}
