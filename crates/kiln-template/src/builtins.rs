//! Properties, methods and global functions available to template code.

use std::cmp::Ordering;

use crate::{
    compile::{Arg, Callback, Scope},
    date::JalaliDate,
    error::{Result, TemplateError},
    value::Value,
};

/// Global objects whose members can be called, such as `Math.max`.
pub(crate) const NAMESPACES: &[&str] = &["Object", "JSON", "Math"];

/// Escape the five HTML-significant characters.
///
/// ```
/// assert_eq!(kiln_template::escape_html("<a href=\"x\">"), "&lt;a href=&quot;x&quot;&gt;");
/// ```
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn unreadable(target: &Value, name: &str) -> TemplateError {
    TemplateError::type_error(format!(
        "cannot read properties of {} (reading '{name}')",
        target.type_name()
    ))
}

fn not_a_function(target: &Value, name: &str) -> TemplateError {
    TemplateError::type_error(format!("{}.{name} is not a function", target.type_name()))
}

/// `target.name`
pub(crate) fn property(target: &Value, name: &str) -> Result<Value> {
    Ok(match target {
        Value::Undefined | Value::Null => return Err(unreadable(target, name)),
        Value::String(s) if name == "length" => Value::Number(s.chars().count() as f64),
        Value::Array(items) if name == "length" => Value::Number(items.len() as f64),
        Value::Array(items) => name
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or_default(),
        Value::Object(map) => map.get(name).cloned().unwrap_or_default(),
        Value::Date(date) => date.field(name).cloned().unwrap_or_default(),
        _ => Value::Undefined,
    })
}

/// `target[key]`
pub(crate) fn index(target: &Value, key: &Value) -> Result<Value> {
    let position = match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        _ => None,
    };
    match (target, position) {
        (Value::Array(items), Some(i)) => Ok(items.get(i).cloned().unwrap_or_default()),
        (Value::String(s), Some(i)) => Ok(s
            .chars()
            .nth(i)
            .map(|c| Value::string(c.to_string()))
            .unwrap_or_default()),
        _ => property(target, &key.to_js_string()),
    }
}

/// Keys enumerated by `for…in` and `Object.keys`.
pub(crate) fn own_keys(target: &Value) -> Vec<String> {
    match target {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Date(_) => JalaliDate::FIELDS.iter().map(|f| f.to_string()).collect(),
        Value::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn arg(args: &[Arg<'_>], i: usize) -> Value {
    match args.get(i) {
        Some(Arg::Value(value)) => value.clone(),
        _ => Value::Undefined,
    }
}

fn callback<'a>(args: &[Arg<'a>], method: &str) -> Result<&'a Callback> {
    match args.first() {
        Some(Arg::Callback(callback)) => Ok(callback),
        _ => Err(TemplateError::type_error(format!(
            "{method} expects an arrow function argument"
        ))),
    }
}

/// Resolve JavaScript `slice` bounds against a length.
fn slice_bounds(len: usize, start: &Value, end: &Value) -> (usize, usize) {
    let resolve = |value: &Value, default: usize| {
        if matches!(value, Value::Undefined) {
            return default;
        }
        let n = value.to_number();
        if n.is_nan() {
            0
        } else if n < 0.0 {
            len.saturating_sub((-n) as usize)
        } else {
            (n as usize).min(len)
        }
    };
    let start = resolve(start, 0);
    let end = resolve(end, len);
    (start, end.max(start))
}

/// `receiver.name(args)`
pub(crate) fn call_method(
    scope: &mut Scope,
    receiver: &Value,
    name: &str,
    args: &[Arg<'_>],
) -> Result<Value> {
    match receiver {
        Value::String(s) => string_method(receiver, s, name, args),
        Value::Array(items) => array_method(scope, receiver, items, name, args),
        Value::Number(n) => match name {
            "toFixed" => {
                let digits = arg(args, 0).to_number();
                let digits = if digits.is_nan() { 0 } else { digits as usize };
                Ok(Value::string(format!("{n:.digits$}")))
            }
            "toString" => Ok(Value::string(receiver.to_js_string())),
            _ => Err(not_a_function(receiver, name)),
        },
        Value::Object(map) => match name {
            "hasOwnProperty" => Ok(Value::Bool(
                map.contains_key(arg(args, 0).to_js_string().as_str()),
            )),
            _ => Err(not_a_function(receiver, name)),
        },
        Value::Date(date) => date.call(name, &arg(args, 0)),
        Value::Undefined | Value::Null => Err(unreadable(receiver, name)),
        Value::Bool(_) => match name {
            "toString" => Ok(Value::string(receiver.to_js_string())),
            _ => Err(not_a_function(receiver, name)),
        },
    }
}

fn string_method(receiver: &Value, s: &str, name: &str, args: &[Arg<'_>]) -> Result<Value> {
    let text_arg = |i: usize| arg(args, i).to_js_string();
    Ok(match name {
        "toUpperCase" => Value::string(s.to_uppercase()),
        "toLowerCase" => Value::string(s.to_lowercase()),
        "trim" => Value::string(s.trim()),
        "trimStart" => Value::string(s.trim_start()),
        "trimEnd" => Value::string(s.trim_end()),
        "toString" => receiver.clone(),
        "includes" => Value::Bool(s.contains(text_arg(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text_arg(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text_arg(0).as_str())),
        "indexOf" => Value::Number(
            s.find(text_arg(0).as_str())
                .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
        ),
        "slice" | "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), &arg(args, 0), &arg(args, 1));
            Value::string(chars[start..end].iter().collect::<String>())
        }
        "split" => match arg(args, 0) {
            Value::Undefined => Value::array(vec![receiver.clone()]),
            separator => {
                let separator = separator.to_js_string();
                let parts: Vec<Value> = if separator.is_empty() {
                    s.chars().map(|c| Value::string(c.to_string())).collect()
                } else {
                    s.split(separator.as_str()).map(Value::string).collect()
                };
                Value::array(parts)
            }
        },
        "replace" => Value::string(s.replacen(text_arg(0).as_str(), &text_arg(1), 1)),
        "replaceAll" => Value::string(s.replace(text_arg(0).as_str(), &text_arg(1))),
        "padStart" | "padEnd" => {
            let width = arg(args, 0).to_number();
            let width = if width.is_nan() { 0 } else { width as usize };
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.to_js_string(),
            };
            let missing = width.saturating_sub(s.chars().count());
            if missing == 0 || fill.is_empty() {
                return Ok(receiver.clone());
            }
            let padding: String = fill.chars().cycle().take(missing).collect();
            if name == "padStart" {
                Value::string(padding + s)
            } else {
                Value::string(format!("{s}{padding}"))
            }
        }
        _ => return Err(not_a_function(receiver, name)),
    })
}

fn array_method(
    scope: &mut Scope,
    receiver: &Value,
    items: &[Value],
    name: &str,
    args: &[Arg<'_>],
) -> Result<Value> {
    let indexed = |item: &Value, i: usize| [item.clone(), Value::Number(i as f64)];

    Ok(match name {
        "join" => {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            let parts: Vec<String> = items.iter().map(Value::to_output).collect();
            Value::string(parts.join(&separator))
        }
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(items.iter().any(|item| item.strict_eq(&needle)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Value::Number(
                items
                    .iter()
                    .position(|item| item.strict_eq(&needle))
                    .map_or(-1.0, |i| i as f64),
            )
        }
        "slice" => {
            let (start, end) = slice_bounds(items.len(), &arg(args, 0), &arg(args, 1));
            Value::array(items[start..end].to_vec())
        }
        "concat" => {
            let mut joined = items.to_vec();
            for i in 0..args.len() {
                match arg(args, i) {
                    Value::Array(more) => joined.extend(more.iter().cloned()),
                    other => joined.push(other),
                }
            }
            Value::array(joined)
        }
        "reverse" => Value::array(items.iter().rev().cloned().collect()),
        "map" => {
            let f = callback(args, name)?;
            let mapped = items
                .iter()
                .enumerate()
                .map(|(i, item)| f.call(scope, &indexed(item, i)))
                .collect::<Result<Vec<_>>>()?;
            Value::array(mapped)
        }
        "filter" => {
            let f = callback(args, name)?;
            let mut kept = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if f.call(scope, &indexed(item, i))?.is_truthy() {
                    kept.push(item.clone());
                }
            }
            Value::array(kept)
        }
        "find" | "findIndex" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if f.call(scope, &indexed(item, i))?.is_truthy() {
                    return Ok(if name == "find" {
                        item.clone()
                    } else {
                        Value::Number(i as f64)
                    });
                }
            }
            if name == "find" {
                Value::Undefined
            } else {
                Value::Number(-1.0)
            }
        }
        "some" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if f.call(scope, &indexed(item, i))?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Value::Bool(false)
        }
        "every" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if !f.call(scope, &indexed(item, i))?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Value::Bool(true)
        }
        "sort" => {
            let mut sorted = items.to_vec();
            match args.first() {
                Some(Arg::Callback(compare)) => {
                    let mut failure = None;
                    sorted.sort_by(|a, b| {
                        if failure.is_some() {
                            return Ordering::Equal;
                        }
                        match compare.call(scope, &[a.clone(), b.clone()]) {
                            Ok(order) => order
                                .to_number()
                                .partial_cmp(&0.0)
                                .unwrap_or(Ordering::Equal),
                            Err(err) => {
                                failure = Some(err);
                                Ordering::Equal
                            }
                        }
                    });
                    if let Some(err) = failure {
                        return Err(err);
                    }
                }
                _ => sorted.sort_by_key(Value::to_js_string),
            }
            Value::array(sorted)
        }
        _ => return Err(not_a_function(receiver, name)),
    })
}

/// `Object.keys(x)`, `Math.max(…)` and the other namespaced functions.
pub(crate) fn call_namespace(namespace: &str, name: &str, args: &[Arg<'_>]) -> Result<Value> {
    let numbers = || (0..args.len()).map(|i| arg(args, i).to_number());
    let first = arg(args, 0);

    Ok(match (namespace, name) {
        ("Object", "keys" | "values" | "entries") => {
            if first.is_nullish() {
                return Err(TemplateError::type_error(
                    "cannot convert undefined or null to object",
                ));
            }
            let keys = own_keys(&first);
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                let entry = match name {
                    "keys" => Value::string(&key),
                    "values" => property(&first, &key)?,
                    _ => Value::array(vec![Value::string(&key), property(&first, &key)?]),
                };
                out.push(entry);
            }
            Value::array(out)
        }
        ("JSON", "stringify") => {
            if matches!(first, Value::Undefined) {
                return Ok(Value::Undefined);
            }
            let pretty = arg(args, 2).is_truthy();
            let text = if pretty {
                serde_json::to_string_pretty(&first)
            } else {
                serde_json::to_string(&first)
            }
            .map_err(|err| TemplateError::type_error(err.to_string()))?;
            Value::string(text)
        }
        ("JSON", "parse") => {
            let parsed: serde_json::Value = serde_json::from_str(&first.to_js_string())
                .map_err(|err| TemplateError::syntax(format!("JSON.parse: {err}")))?;
            Value::from(parsed)
        }
        ("Math", "min") => Value::Number(numbers().fold(f64::INFINITY, f64::min)),
        ("Math", "max") => Value::Number(numbers().fold(f64::NEG_INFINITY, f64::max)),
        ("Math", "floor") => Value::Number(first.to_number().floor()),
        ("Math", "ceil") => Value::Number(first.to_number().ceil()),
        ("Math", "round") => Value::Number((first.to_number() + 0.5).floor()),
        ("Math", "abs") => Value::Number(first.to_number().abs()),
        _ => {
            return Err(TemplateError::type_error(format!(
                "{namespace}.{name} is not a function"
            )));
        }
    })
}

/// Free functions such as `escapeForHtml(x)` and `String(x)`.
pub(crate) fn call_global(name: &str, args: &[Arg<'_>]) -> Result<Value> {
    let first = arg(args, 0);
    Ok(match name {
        "escapeForHtml" => Value::string(escape_html(&first.to_output())),
        "String" => Value::string(first.to_js_string()),
        "Number" => Value::Number(first.to_number()),
        "Boolean" => Value::Bool(first.is_truthy()),
        "parseInt" => Value::Number(parse_leading(&first.to_js_string(), false)),
        "parseFloat" => Value::Number(parse_leading(&first.to_js_string(), true)),
        "isNaN" => Value::Bool(first.to_number().is_nan()),
        _ => return Err(TemplateError::Reference(name.to_string())),
    })
}

/// Parse the longest numeric prefix, as `parseInt`/`parseFloat` do.
fn parse_leading(text: &str, fractional: bool) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        let accepted = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (fractional && c == '.' && !seen_dot);
        if !accepted {
            break;
        }
        seen_dot |= c == '.';
        end = i + c.len_utf8();
    }
    let number: f64 = text[..end].parse().unwrap_or(f64::NAN);
    if fractional { number } else { number.trunc() }
}
