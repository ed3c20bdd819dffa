//! Brick pipeline runtime: expression evaluation, root resolution, brick
//! dispatch, and the built-in bricks.
//!
//! A [`Pipeline`] is an ordered list of brick invocations. The
//! [`PipelineExecutor`] resolves each invocation's config against the current
//! [`Context`], validates it against the brick's input contract, runs the brick
//! from an explicitly supplied [`BrickRegistry`], and threads the output into
//! the next step.

pub mod brick;
pub mod bricks;
pub mod context;
pub mod document;
pub mod events;
pub mod executor;
pub mod expression;
pub mod lint;
pub mod logger;
pub mod path;
pub mod pipeline;
pub mod root;
pub mod template;

pub use brick::{Brick, BrickArgs, BrickKind, BrickRegistry};
pub use bricks::builtin_registry;
pub use context::{Context, INPUT_VAR};
pub use document::{Document, Element, ElementId, ElementSpec, Page, Root, Selector, SelectorError};
pub use events::{EventEmitter, PipelineEvent};
pub use executor::{BrickOptions, PipelineExecutor, RunOptions, DEFAULT_MAX_DEPTH};
pub use expression::{is_truthy, Expression, Resolved};
pub use lint::{lint, lint_or_raise, Diagnostic, LintRule, Severity};
pub use logger::{LogLevel, Logger};
pub use path::{Segment, VarPath};
pub use pipeline::{Invocation, Pipeline};
pub use root::{resolve_root, RootRequest};
pub use template::Template;
