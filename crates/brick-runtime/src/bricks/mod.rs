//! Built-in bricks.

pub mod control;
pub mod dom;
pub mod effects;
pub mod transformers;

pub use control::{ForEachElementBrick, IfElseBrick, MapBrick};
pub use dom::{AddClassBrick, ReadTextBrick, SetAttributeBrick};
pub use effects::{CancelBrick, ErrorBrick, LogBrick};
pub use transformers::{IdentityBrick, JsonParseBrick, RenderTextBrick, TemplateBrick};

use crate::brick::BrickRegistry;

// ---------------------------------------------------------------------------
// Builtin registry factory
// ---------------------------------------------------------------------------

pub fn builtin_registry() -> BrickRegistry {
    let mut reg = BrickRegistry::new();
    reg.register(IdentityBrick);
    reg.register(CancelBrick);
    reg.register(ErrorBrick);
    reg.register(LogBrick);
    reg.register(JsonParseBrick);
    reg.register(TemplateBrick);
    reg.register(RenderTextBrick);
    reg.register(MapBrick);
    reg.register(IfElseBrick);
    reg.register(ForEachElementBrick);
    reg.register(AddClassBrick);
    reg.register(SetAttributeBrick);
    reg.register(ReadTextBrick);
    reg
}
