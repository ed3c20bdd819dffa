//! Execution context: the variable environment and scope seen by one invocation.
//!
//! A `Context` is an immutable snapshot. Deriving a new context (binding a
//! variable, changing the root) clones it, so sibling invocations and loop
//! iterations never observe each other's bindings.

use std::collections::HashMap;

use serde_json::Value;

use crate::document::Root;
use crate::path::VarPath;

/// Variable holding the current data threaded between invocations.
pub const INPUT_VAR: &str = "@input";

#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: HashMap<String, Value>,
    root: Root,
}

fn var_name(key: &str) -> String {
    if key.starts_with('@') {
        key.to_string()
    } else {
        format!("@{key}")
    }
}

impl Context {
    /// A fresh context scoped to the whole document with `input` as current data.
    pub fn new(input: Value) -> Self {
        Self::default().with_input(input)
    }

    pub fn with_input(self, input: Value) -> Self {
        self.with_var(INPUT_VAR, input)
    }

    /// Bind a variable. The `@` prefix is added when missing.
    pub fn with_var(mut self, key: &str, value: Value) -> Self {
        self.vars.insert(var_name(key), value);
        self
    }

    pub fn with_root(mut self, root: Root) -> Self {
        self.root = root;
        self
    }

    /// The current data, `null` when none has been bound.
    pub fn input(&self) -> &Value {
        self.vars.get(INPUT_VAR).unwrap_or(&Value::Null)
    }

    pub fn root(&self) -> Root {
        self.root
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(&var_name(key))
    }

    pub fn lookup(&self, path: &VarPath) -> Option<&Value> {
        path.resolve(&self.vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ElementId;
    use serde_json::json;

    #[test]
    fn new_binds_input() {
        let ctx = Context::new(json!({"a": 1}));
        assert_eq!(ctx.input(), &json!({"a": 1}));
        assert_eq!(ctx.root(), Root::Document);
    }

    #[test]
    fn empty_context_has_null_input() {
        assert_eq!(Context::default().input(), &Value::Null);
    }

    #[test]
    fn with_var_normalizes_prefix() {
        let ctx = Context::default().with_var("element", json!(1)).with_var("@index", json!(0));
        assert_eq!(ctx.get("@element"), Some(&json!(1)));
        assert_eq!(ctx.get("index"), Some(&json!(0)));
    }

    #[test]
    fn derived_contexts_do_not_affect_the_original() {
        let base = Context::new(json!("base"));
        let derived = base
            .clone()
            .with_input(json!("derived"))
            .with_root(Root::Element(ElementId(3)));
        assert_eq!(base.input(), &json!("base"));
        assert_eq!(base.root(), Root::Document);
        assert_eq!(derived.input(), &json!("derived"));
        assert_eq!(derived.root(), Root::Element(ElementId(3)));
    }

    #[test]
    fn lookup_resolves_paths() {
        let ctx = Context::new(json!({"items": [10, 20]}));
        let path = VarPath::parse("@input.items[1]").unwrap();
        assert_eq!(ctx.lookup(&path), Some(&json!(20)));
    }
}
