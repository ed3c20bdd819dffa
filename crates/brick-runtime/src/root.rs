//! Root resolution: decides which part of the document an invocation acts on.
//!
//! Root-awareness is opt-in. A root-aware invocation works relative to the
//! current scope (the scope itself, or a search inside it). A non-root-aware
//! invocation must name a selector and always searches the whole document.

use brick_types::{BrickError, Result};

use crate::document::{Document, Root, Selector};

/// Property name reported when root resolution fails.
pub const ROOT_PROPERTY: &str = "root";

/// Inputs to [`resolve_root`].
#[derive(Debug, Clone, Copy)]
pub struct RootRequest<'a> {
    pub brick_id: &'a str,
    pub selector: Option<&'a str>,
    pub is_root_aware: bool,
    /// The scope the pipeline is currently operating in.
    pub default_root: Root,
}

/// Resolve the target scopes for an invocation.
///
/// Returns the current root itself for a root-aware invocation without a
/// selector; otherwise the elements matching the selector, searched inside the
/// current root (root-aware) or across the document (not root-aware).
pub fn resolve_root(request: &RootRequest<'_>, document: &Document) -> Result<Vec<Root>> {
    let selector = request.selector.map(str::trim).filter(|s| !s.is_empty());

    let (scope, source) = match (request.is_root_aware, selector) {
        (true, None) => return Ok(vec![request.default_root]),
        (true, Some(s)) => (request.default_root, s),
        (false, Some(s)) => (Root::Document, s),
        (false, None) => {
            return Err(BrickError::Configuration {
                brick_id: request.brick_id.to_string(),
                property: ROOT_PROPERTY.to_string(),
                message: "a selector is required when the brick is not root-aware".into(),
            })
        }
    };

    let parsed = Selector::parse(source).map_err(|e| BrickError::Configuration {
        brick_id: request.brick_id.to_string(),
        property: ROOT_PROPERTY.to_string(),
        message: e.to_string(),
    })?;

    Ok(document
        .query(scope, &parsed)
        .into_iter()
        .map(Root::Element)
        .collect())
}
