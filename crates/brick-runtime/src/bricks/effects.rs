//! Effect bricks that control the run itself: cancel, error, log.

use async_trait::async_trait;
use serde_json::Value;

use brick_types::{BrickError, Result, Schema};

use crate::brick::{Brick, BrickArgs, BrickKind};
use crate::executor::BrickOptions;
use crate::logger::LogLevel;

// ---------------------------------------------------------------------------
// CancelBrick
// ---------------------------------------------------------------------------

/// Stops the pipeline on purpose.
pub struct CancelBrick;

#[async_trait]
impl Brick for CancelBrick {
    fn id(&self) -> &str {
        "@brick/cancel"
    }

    fn name(&self) -> &str {
        "Cancel"
    }

    fn description(&self) -> &str {
        "Stop the pipeline without reporting a failure"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Schema {
        Schema::object([("message", Schema::string())])
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions<'_>) -> Result<Value> {
        let message = args.opt_str("message").unwrap_or("Action cancelled");
        Err(BrickError::cancelled(message))
    }
}

// ---------------------------------------------------------------------------
// ErrorBrick
// ---------------------------------------------------------------------------

/// Fails the pipeline with a user-facing message.
pub struct ErrorBrick;

#[async_trait]
impl Brick for ErrorBrick {
    fn id(&self) -> &str {
        "@brick/error"
    }

    fn name(&self) -> &str {
        "Raise error"
    }

    fn description(&self) -> &str {
        "Fail the pipeline with a business error"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Schema {
        Schema::object([("message", Schema::string())]).require(["message"])
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions<'_>) -> Result<Value> {
        Err(BrickError::business(args.str("message")?))
    }
}

// ---------------------------------------------------------------------------
// LogBrick
// ---------------------------------------------------------------------------

pub struct LogBrick;

#[async_trait]
impl Brick for LogBrick {
    fn id(&self) -> &str {
        "@brick/log"
    }

    fn name(&self) -> &str {
        "Log"
    }

    fn description(&self) -> &str {
        "Write a message to the run log"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Schema {
        Schema::object([
            ("message", Schema::string()),
            ("level", Schema::string_enum(["debug", "info", "warn", "error"])),
        ])
        .require(["message"])
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions<'_>) -> Result<Value> {
        let level = match args.get("level") {
            Some(level) => serde_json::from_value(level.clone())?,
            None => LogLevel::Info,
        };
        options.logger.log(level, args.str("message")?);
        Ok(options.ctx.input().clone())
    }
}
