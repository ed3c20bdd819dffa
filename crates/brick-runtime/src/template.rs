//! Sandboxed string templates.
//!
//! Grammar:
//! ```text
//! Template  ::= ( Text | '{{' Expr '}}' )*
//! Expr      ::= VarPath ( '|' Filter )*
//! Filter    ::= Name ( '(' Literal ( ',' Literal )* ')' )?
//! Literal   ::= QuotedString | Number | 'true' | 'false' | 'null'
//! ```
//!
//! Templates are parsed once into nodes and rendered by substitution only. The
//! filter set is closed; nothing else can execute.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use brick_types::{BrickError, Result};

use crate::path::VarPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterName {
    Upper,
    Lower,
    Trim,
    Json,
    Length,
    Default,
    Join,
    Truncate,
}

impl FilterName {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "upper" => FilterName::Upper,
            "lower" => FilterName::Lower,
            "trim" => FilterName::Trim,
            "json" => FilterName::Json,
            "length" => FilterName::Length,
            "default" => FilterName::Default,
            "join" => FilterName::Join,
            "truncate" => FilterName::Truncate,
            _ => return None,
        })
    }

    fn arity(self) -> std::ops::RangeInclusive<usize> {
        match self {
            FilterName::Default | FilterName::Truncate => 1..=1,
            FilterName::Join => 0..=1,
            _ => 0..=0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: FilterName,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Interpolation { path: VarPath, filters: Vec<Filter> },
}

/// A parsed template, ready to render against a variable environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

fn template_error(source: &str, message: impl Into<String>) -> BrickError {
    BrickError::Expression {
        expression: source.to_string(),
        message: message.into(),
    }
}

fn filter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-z_]+)\s*(?:\((.*)\))?$").expect("filter pattern is valid")
    })
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                nodes.push(text_node(&rest[..open], source)?);
            }
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or_else(|| template_error(source, "unterminated '{{'"))?;
            nodes.push(parse_interpolation(&after[..close], source)?);
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            nodes.push(text_node(rest, source)?);
        }

        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Every variable path the template references, in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &VarPath> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Interpolation { path, .. } => Some(path),
            Node::Text(_) => None,
        })
    }

    /// Render the template. Missing variables render as empty text.
    pub fn render(&self, vars: &HashMap<String, Value>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Interpolation { path, filters } => {
                    let mut value = path.resolve(vars).cloned().unwrap_or(Value::Null);
                    for filter in filters {
                        value = apply_filter(filter, value);
                    }
                    out.push_str(&to_text(&value));
                }
            }
        }
        out
    }
}

/// Render a value as template text: strings raw, null empty, others as JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_node(text: &str, source: &str) -> Result<Node> {
    if text.contains("}}") {
        return Err(template_error(source, "unmatched '}}'"));
    }
    Ok(Node::Text(text.to_string()))
}

fn parse_interpolation(body: &str, source: &str) -> Result<Node> {
    let parts = split_outside_quotes(body, '|');
    let mut parts = parts.into_iter();
    let head = parts.next().unwrap_or_default();
    let head = head.trim();
    if head.is_empty() {
        return Err(template_error(source, "empty interpolation"));
    }
    let path = VarPath::parse(head).map_err(|e| match e {
        BrickError::Expression { message, .. } => template_error(source, message),
        other => other,
    })?;

    let mut filters = Vec::new();
    for part in parts {
        filters.push(parse_filter(part.trim(), source)?);
    }
    Ok(Node::Interpolation { path, filters })
}

fn parse_filter(input: &str, source: &str) -> Result<Filter> {
    let caps = filter_regex()
        .captures(input)
        .ok_or_else(|| template_error(source, format!("invalid filter '{input}'")))?;
    let raw_name = &caps[1];
    let name = FilterName::parse(raw_name)
        .ok_or_else(|| template_error(source, format!("unknown filter '{raw_name}'")))?;

    let mut args = Vec::new();
    if let Some(raw_args) = caps.get(2) {
        let raw_args = raw_args.as_str().trim();
        if !raw_args.is_empty() {
            for arg in split_outside_quotes(raw_args, ',') {
                args.push(parse_literal(arg.trim(), source)?);
            }
        }
    }
    if !name.arity().contains(&args.len()) {
        return Err(template_error(
            source,
            format!("filter '{raw_name}' takes {:?} arguments, got {}", name.arity(), args.len()),
        ));
    }
    if name == FilterName::Truncate && args[0].as_u64().is_none() {
        return Err(template_error(source, "truncate expects a non-negative integer"));
    }
    Ok(Filter { name, args })
}

fn parse_literal(input: &str, source: &str) -> Result<Value> {
    if input.len() >= 2 && input.starts_with('\'') && input.ends_with('\'') {
        return Ok(Value::String(input[1..input.len() - 1].to_string()));
    }
    match serde_json::from_str::<Value>(input) {
        Ok(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null)) => Ok(v),
        _ => Err(template_error(source, format!("invalid literal '{input}'"))),
    }
}

/// Split on `sep`, ignoring separators inside single or double quotes.
fn split_outside_quotes(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            None if c == sep => parts.push(std::mem::take(&mut current)),
            None => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn apply_filter(filter: &Filter, value: Value) -> Value {
    match filter.name {
        FilterName::Upper => Value::String(to_text(&value).to_uppercase()),
        FilterName::Lower => Value::String(to_text(&value).to_lowercase()),
        FilterName::Trim => Value::String(to_text(&value).trim().to_string()),
        FilterName::Json => Value::String(value.to_string()),
        FilterName::Length => {
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => 0,
            };
            Value::from(len)
        }
        FilterName::Default => {
            if is_blank(&value) {
                filter.args[0].clone()
            } else {
                value
            }
        }
        FilterName::Join => {
            let sep = filter.args.first().map(to_text).unwrap_or_else(|| ",".into());
            match value {
                Value::Array(items) => {
                    Value::String(items.iter().map(to_text).collect::<Vec<_>>().join(&sep))
                }
                other => other,
            }
        }
        FilterName::Truncate => {
            let max = filter.args[0].as_u64().unwrap_or(0) as usize;
            Value::String(to_text(&value).chars().take(max).collect())
        }
    }
}
