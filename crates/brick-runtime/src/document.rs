//! In-memory document model and selector matching.
//!
//! The document is the platform collaborator that DOM-targeting bricks act on.
//! [`Page`] is a clonable handle to one shared [`Document`]; cloning yields
//! another handle to the **same** tree.
//!
//! Selector grammar:
//! ```text
//! SelectorList  ::= Complex ( ',' Complex )*
//! Complex       ::= Compound ( Combinator Compound )*
//! Combinator    ::= whitespace | '>'
//! Compound      ::= ( Tag | '*' )? ( '#' Name | '.' Name | '[' Name ( '=' Value )? ']' )*
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use brick_types::{BrickError, Result};

/// Index of an element inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

/// The scope an invocation operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Root {
    /// The whole document.
    #[default]
    Document,
    /// A single element of the document.
    Element(ElementId),
}

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<ElementId>,
    pub parent: Option<ElementId>,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn id_attr(&self) -> Option<&str> {
        self.attributes.get("id").map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace())
            .into_iter()
            .flatten()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

/// Declarative element tree used to build documents from YAML/JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// An element tree rooted at an implicit `html` document element.
#[derive(Debug, Clone)]
pub struct Document {
    elements: Vec<Element>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document containing only the document element.
    pub fn new() -> Self {
        Self {
            elements: vec![Element::new("html")],
        }
    }

    /// Build a document whose document element holds the given trees.
    pub fn from_specs(specs: &[ElementSpec]) -> Self {
        let mut doc = Self::new();
        let root = doc.document_element();
        for spec in specs {
            doc.append_spec(root, spec);
        }
        doc
    }

    pub fn document_element(&self) -> ElementId {
        ElementId(0)
    }

    /// The element a root designates; the document maps to its document element.
    pub fn element_for(&self, root: Root) -> ElementId {
        match root {
            Root::Document => self.document_element(),
            Root::Element(id) => id,
        }
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Append a new element under `parent` and return its id.
    pub fn append(&mut self, parent: ElementId, tag: &str) -> ElementId {
        let id = ElementId(self.elements.len());
        let mut element = Element::new(tag);
        element.parent = Some(parent);
        self.elements.push(element);
        self.elements[parent.0].children.push(id);
        id
    }

    pub fn append_spec(&mut self, parent: ElementId, spec: &ElementSpec) -> ElementId {
        let id = self.append(parent, &spec.tag);
        {
            let element = &mut self.elements[id.0];
            element.attributes = spec.attributes.clone();
            if let Some(ref el_id) = spec.id {
                element.attributes.insert("id".into(), el_id.clone());
            }
            if !spec.classes.is_empty() {
                element.attributes.insert("class".into(), spec.classes.join(" "));
            }
            element.text = spec.text.clone();
        }
        for child in &spec.children {
            self.append_spec(id, child);
        }
        id
    }

    pub fn set_attribute(&mut self, id: ElementId, name: &str, value: &str) {
        if let Some(el) = self.elements.get_mut(id.0) {
            el.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn add_class(&mut self, id: ElementId, class: &str) {
        let Some(el) = self.elements.get_mut(id.0) else {
            return;
        };
        if el.has_class(class) {
            return;
        }
        let updated = match el.attributes.get("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        el.attributes.insert("class".into(), updated);
    }

    /// Text of an element and all its descendants, in document order.
    pub fn text_content(&self, id: ElementId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: ElementId, out: &mut String) {
        if let Some(el) = self.get(id) {
            out.push_str(&el.text);
            for child in &el.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.elements[id.0].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.elements[current.0].children.iter().rev().copied());
        }
        out
    }

    /// Find every element under `scope` matching `selector`, in document order.
    ///
    /// Searching the document scope includes the document element; searching an
    /// element scope only considers its descendants.
    pub fn query(&self, scope: Root, selector: &Selector) -> Vec<ElementId> {
        let candidates = match scope {
            Root::Document => {
                let root = self.document_element();
                let mut all = vec![root];
                all.extend(self.descendants(root));
                all
            }
            Root::Element(id) if id.0 < self.elements.len() => self.descendants(id),
            Root::Element(_) => Vec::new(),
        };
        candidates
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
#[error("invalid selector '{selector}': {message}")]
pub struct SelectorError {
    pub selector: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
    }

    fn matches(&self, el: &Element) -> bool {
        if let Some(ref tag) = self.tag {
            if tag != "*" && *tag != el.tag {
                return false;
            }
        }
        if let Some(ref id) = self.id {
            if el.id_attr() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| el.has_class(c)) {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| match el.attributes.get(name) {
            None => false,
            Some(actual) => expected.as_ref().map_or(true, |e| e == actual),
        })
    }
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Vec<(Combinator, Compound)>>,
}

impl Selector {
    pub fn parse(input: &str) -> std::result::Result<Self, SelectorError> {
        let source = input.trim().to_string();
        if source.is_empty() {
            return Err(selector_error(input, "empty selector"));
        }
        let mut alternatives = Vec::new();
        for part in split_selector_list(&source) {
            alternatives.push(parse_complex(part.trim(), input)?);
        }
        Ok(Self {
            source,
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, doc: &Document, id: ElementId) -> bool {
        self.alternatives
            .iter()
            .any(|parts| matches_from(doc, id, parts, parts.len() - 1))
    }
}

/// Split a selector list on commas outside `[...]` and quoted values.
fn split_selector_list(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_brackets = false;
    let mut quote: Option<char> = None;
    for (i, c) in source.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if in_brackets => quote = Some(c),
            (None, '[') => in_brackets = true,
            (None, ']') => in_brackets = false,
            (None, ',') if !in_brackets => {
                parts.push(&source[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

fn selector_error(selector: &str, message: &str) -> SelectorError {
    SelectorError {
        selector: selector.to_string(),
        message: message.to_string(),
    }
}

fn matches_from(doc: &Document, id: ElementId, parts: &[(Combinator, Compound)], idx: usize) -> bool {
    let Some(el) = doc.get(id) else {
        return false;
    };
    if !parts[idx].1.matches(el) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match parts[idx].0 {
        Combinator::Child => el
            .parent
            .map_or(false, |parent| matches_from(doc, parent, parts, idx - 1)),
        Combinator::Descendant => {
            let mut ancestor = el.parent;
            while let Some(a) = ancestor {
                if matches_from(doc, a, parts, idx - 1) {
                    return true;
                }
                ancestor = doc.get(a).and_then(|e| e.parent);
            }
            false
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_complex(input: &str, full: &str) -> std::result::Result<Vec<(Combinator, Compound)>, SelectorError> {
    if input.is_empty() {
        return Err(selector_error(full, "empty selector in list"));
    }
    let chars: Vec<char> = input.chars().collect();
    let mut parts = Vec::new();
    let mut combinator = Combinator::Descendant;
    let mut i = 0;

    while i < chars.len() {
        // Combinators between compounds.
        let mut saw_space = false;
        while i < chars.len() && chars[i].is_whitespace() {
            saw_space = true;
            i += 1;
        }
        if i < chars.len() && chars[i] == '>' {
            if parts.is_empty() {
                return Err(selector_error(full, "selector cannot start with '>'"));
            }
            combinator = Combinator::Child;
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
        } else if saw_space && !parts.is_empty() {
            combinator = Combinator::Descendant;
        }
        if i >= chars.len() {
            if combinator == Combinator::Child {
                return Err(selector_error(full, "dangling '>' combinator"));
            }
            break;
        }

        let mut compound = Compound::default();
        if chars[i] == '*' {
            compound.tag = Some("*".into());
            i += 1;
        } else if is_name_char(chars[i]) {
            let start = i;
            while i < chars.len() && is_name_char(chars[i]) {
                i += 1;
            }
            compound.tag = Some(chars[start..i].iter().collect::<String>().to_ascii_lowercase());
        }
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '>' {
            match chars[i] {
                '#' | '.' => {
                    let marker = chars[i];
                    i += 1;
                    let start = i;
                    while i < chars.len() && is_name_char(chars[i]) {
                        i += 1;
                    }
                    if start == i {
                        return Err(selector_error(full, &format!("expected a name after '{marker}'")));
                    }
                    let name: String = chars[start..i].iter().collect();
                    if marker == '#' {
                        compound.id = Some(name);
                    } else {
                        compound.classes.push(name);
                    }
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .ok_or_else(|| selector_error(full, "unterminated attribute selector"))?;
                    let body: String = chars[i + 1..i + close].iter().collect();
                    i += close + 1;
                    let (name, value) = match body.split_once('=') {
                        Some((n, v)) => {
                            let v = v.trim().trim_matches(|c| c == '"' || c == '\'');
                            (n.trim().to_string(), Some(v.to_string()))
                        }
                        None => (body.trim().to_string(), None),
                    };
                    if name.is_empty() || !name.chars().all(is_name_char) {
                        return Err(selector_error(full, &format!("invalid attribute name '{name}'")));
                    }
                    compound.attributes.push((name, value));
                }
                other => {
                    return Err(selector_error(full, &format!("unexpected character '{other}'")));
                }
            }
        }
        if compound.is_empty() {
            return Err(selector_error(full, "empty compound selector"));
        }
        parts.push((combinator, compound));
        combinator = Combinator::Descendant;
    }

    if parts.is_empty() {
        return Err(selector_error(full, "empty selector"));
    }
    Ok(parts)
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// Clonable handle to a shared document.
#[derive(Clone, Default)]
pub struct Page {
    inner: Arc<tokio::sync::RwLock<Document>>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").finish_non_exhaustive()
    }
}

impl Page {
    pub fn new(document: Document) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(document)),
        }
    }

    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, Document> {
        self.inner.read().await
    }

    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, Document> {
        self.inner.write().await
    }

    /// Deep copy of the current document.
    pub async fn snapshot(&self) -> Document {
        self.inner.read().await.clone()
    }

    /// Load a page from a YAML or JSON element tree (a list or a single element).
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let value: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&source)?,
            _ => serde_json::from_str(&source)?,
        };
        let specs: Vec<ElementSpec> = if value.is_array() {
            serde_json::from_value(value)
        } else {
            serde_json::from_value(value).map(|spec| vec![spec])
        }
        .map_err(|e| BrickError::Definition(format!("page {}: {e}", path.display())))?;
        Ok(Self::new(Document::from_specs(&specs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::from_specs(&[
            ElementSpec::new("div").id("main").class("panel").child(
                ElementSpec::new("ul")
                    .child(ElementSpec::new("li").class("item").text("one"))
                    .child(ElementSpec::new("li").class("item").class("done").text("two")),
            ),
            ElementSpec::new("section").child(ElementSpec::new("li").class("item").text("three")),
        ])
    }

    fn texts(doc: &Document, ids: &[ElementId]) -> Vec<String> {
        ids.iter().map(|id| doc.text_content(*id)).collect()
    }

    #[test]
    fn query_by_class_in_document_order() {
        let doc = sample();
        let sel = Selector::parse(".item").unwrap();
        let found = doc.query(Root::Document, &sel);
        assert_eq!(texts(&doc, &found), vec!["one", "two", "three"]);
    }

    #[test]
    fn query_within_element_scope_only_searches_descendants() {
        let doc = sample();
        let main = doc.query(Root::Document, &Selector::parse("#main").unwrap())[0];
        let found = doc.query(Root::Element(main), &Selector::parse("li").unwrap());
        assert_eq!(texts(&doc, &found), vec!["one", "two"]);
    }

    #[test]
    fn descendant_and_child_combinators() {
        let doc = sample();
        let found = doc.query(Root::Document, &Selector::parse("div li").unwrap());
        assert_eq!(found.len(), 2);
        let found = doc.query(Root::Document, &Selector::parse("div > li").unwrap());
        assert!(found.is_empty());
        let found = doc.query(Root::Document, &Selector::parse("section > li.item").unwrap());
        assert_eq!(texts(&doc, &found), vec!["three"]);
    }

    #[test]
    fn compound_and_attribute_selectors() {
        let doc = sample();
        let found = doc.query(Root::Document, &Selector::parse("li.item.done").unwrap());
        assert_eq!(texts(&doc, &found), vec!["two"]);
        let found = doc.query(Root::Document, &Selector::parse("[id=main]").unwrap());
        assert_eq!(found.len(), 1);
        let found = doc.query(Root::Document, &Selector::parse("[class]").unwrap());
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn selector_list_has_no_duplicates() {
        let doc = sample();
        let found = doc.query(Root::Document, &Selector::parse("li, .item").unwrap());
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn commas_inside_attribute_values_do_not_split_the_list() {
        let mut doc = Document::new();
        let root = doc.document_element();
        let tagged = doc.append(root, "span");
        doc.set_attribute(tagged, "data-x", "a,b");
        doc.append(root, "em");

        let sel = Selector::parse(r#"[data-x="a,b"], em"#).unwrap();
        let found = doc.query(Root::Document, &sel);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], tagged);
        assert!(Selector::parse("[data-x='a,b']").is_ok());
    }

    #[test]
    fn element_tags_match_case_insensitively() {
        let doc = Document::from_specs(&[ElementSpec::new("DIV").child(ElementSpec::new("Span"))]);
        let found = doc.query(Root::Document, &Selector::parse("div > span").unwrap());
        assert_eq!(found.len(), 1);
        assert_eq!(doc.get(found[0]).unwrap().tag, "span");
        assert_eq!(doc.query(Root::Document, &Selector::parse("DIV").unwrap()).len(), 1);
    }

    #[test]
    fn invalid_selectors_are_rejected() {
        for bad in ["", "   ", "> li", "li >", "div[", ".", "a,,b", "li!"] {
            assert!(Selector::parse(bad).is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn add_class_is_idempotent() {
        let mut doc = sample();
        let li = doc.query(Root::Document, &Selector::parse("li.done").unwrap())[0];
        doc.add_class(li, "seen");
        doc.add_class(li, "seen");
        assert_eq!(doc.get(li).unwrap().attributes["class"], "item done seen");
    }

    #[tokio::test]
    async fn page_clones_share_the_document() {
        let page = Page::new(sample());
        let other = page.clone();
        {
            let mut doc = other.write().await;
            let root = doc.document_element();
            doc.set_attribute(root, "lang", "en");
        }
        let doc = page.read().await;
        let root = doc.document_element();
        assert_eq!(doc.get(root).unwrap().attributes["lang"], "en");
    }

    #[test]
    fn page_loads_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.yaml");
        std::fs::write(
            &path,
            "- tag: div\n  id: main\n  children:\n    - tag: p\n      text: hello\n",
        )
        .unwrap();
        let page = Page::load(&path).unwrap();
        let doc = page.inner.try_read().unwrap();
        let found = doc.query(Root::Document, &Selector::parse("#main p").unwrap());
        assert_eq!(texts(&doc, &found), vec!["hello"]);
    }
}
