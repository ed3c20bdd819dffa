//! Variable references: `@name.key[0]["other key"]?.leaf`.
//!
//! Resolution never fails. A segment that does not exist yields `None`
//! (undefined) so templates can reference optional data.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use brick_types::{BrickError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed variable path rooted at an `@`-prefixed variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarPath {
    raw: String,
    variable: String,
    segments: Vec<Segment>,
}

fn path_error(raw: &str, message: impl Into<String>) -> BrickError {
    BrickError::Expression {
        expression: raw.to_string(),
        message: message.into(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '$'
}

impl VarPath {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let chars: Vec<char> = raw.chars().collect();
        if chars.first() != Some(&'@') {
            return Err(path_error(raw, "variable must start with '@'"));
        }
        let mut i = 1;
        while i < chars.len() && is_ident_char(chars[i]) {
            i += 1;
        }
        if i == 1 {
            return Err(path_error(raw, "missing variable name after '@'"));
        }
        let variable: String = chars[..i].iter().collect();
        let mut segments = Vec::new();

        while i < chars.len() {
            match chars[i] {
                '?' if chars.get(i + 1) == Some(&'.') => {
                    // Optional access behaves like plain access: missing is never an error.
                    i += if chars.get(i + 2) == Some(&'[') { 2 } else { 1 };
                }
                '.' => {
                    i += 1;
                    let start = i;
                    while i < chars.len() && is_ident_char(chars[i]) {
                        i += 1;
                    }
                    if start == i {
                        return Err(path_error(raw, "expected a property name after '.'"));
                    }
                    segments.push(Segment::Key(chars[start..i].iter().collect()));
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .ok_or_else(|| path_error(raw, "unterminated '['"))?;
                    let body: String = chars[i + 1..i + close].iter().collect();
                    let body = body.trim();
                    i += close + 1;
                    if let Some(quoted) = strip_quotes(body) {
                        segments.push(Segment::Key(quoted.to_string()));
                    } else if let Ok(index) = body.parse::<usize>() {
                        segments.push(Segment::Index(index));
                    } else {
                        return Err(path_error(raw, format!("invalid index '{body}'")));
                    }
                }
                other => {
                    return Err(path_error(raw, format!("unexpected character '{other}'")));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            variable,
            segments,
        })
    }

    /// The variable name including its `@` prefix.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the path against a variable environment.
    pub fn resolve<'a>(&self, vars: &'a HashMap<String, Value>) -> Option<&'a Value> {
        let mut current = vars.get(&self.variable)?;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key)?,
                (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
                (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
                (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn strip_quotes(s: &str) -> Option<&str> {
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> HashMap<String, Value> {
        HashMap::from([
            (
                "@input".to_string(),
                json!({"items": [{"name": "a"}, {"name": "b"}], "first name": "Ada"}),
            ),
            ("@element".to_string(), json!(3)),
        ])
    }

    #[test]
    fn parses_keys_and_indexes() {
        let path = VarPath::parse("@input.items[1].name").unwrap();
        assert_eq!(path.variable(), "@input");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("items".into()),
                Segment::Index(1),
                Segment::Key("name".into())
            ]
        );
    }

    #[test]
    fn resolves_nested_values() {
        let v = vars();
        assert_eq!(VarPath::parse("@input.items[1].name").unwrap().resolve(&v), Some(&json!("b")));
        assert_eq!(VarPath::parse("@input.items.0.name").unwrap().resolve(&v), Some(&json!("a")));
        assert_eq!(VarPath::parse(r#"@input["first name"]"#).unwrap().resolve(&v), Some(&json!("Ada")));
        assert_eq!(VarPath::parse("@element").unwrap().resolve(&v), Some(&json!(3)));
    }

    #[test]
    fn missing_paths_are_undefined_not_errors() {
        let v = vars();
        assert_eq!(VarPath::parse("@input.nope.deeper").unwrap().resolve(&v), None);
        assert_eq!(VarPath::parse("@input.items[9]").unwrap().resolve(&v), None);
        assert_eq!(VarPath::parse("@missing").unwrap().resolve(&v), None);
        assert_eq!(VarPath::parse("@element.x").unwrap().resolve(&v), None);
    }

    #[test]
    fn optional_chaining_is_accepted() {
        let v = vars();
        let path = VarPath::parse("@input?.items?.[0]?.name").unwrap();
        assert_eq!(path.resolve(&v), Some(&json!("a")));
        let path = VarPath::parse("@input?.missing?.name").unwrap();
        assert_eq!(path.resolve(&v), None);
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["input", "@", "@input.", "@input[", "@input[x]", "@input name"] {
            assert!(VarPath::parse(bad).is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn display_round_trips_source() {
        let path = VarPath::parse("  @input.items[0] ").unwrap();
        assert_eq!(path.to_string(), "@input.items[0]");
    }
}
