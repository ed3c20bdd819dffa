//! Run event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, progress displays, test harnesses) can follow
//! a run without coupling to the executor internals.

use serde::{Deserialize, Serialize};

/// Events emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
        step_count: usize,
    },
    RunCompleted {
        run_id: String,
        duration_ms: u64,
    },
    RunCancelled {
        run_id: String,
        message: String,
    },
    RunFailed {
        run_id: String,
        kind: String,
        error: String,
    },
    BrickStarted {
        brick_id: String,
        label: Option<String>,
        depth: usize,
    },
    BrickSkipped {
        brick_id: String,
        depth: usize,
    },
    BrickCompleted {
        brick_id: String,
        depth: usize,
        duration_ms: u64,
    },
    BrickFailed {
        brick_id: String,
        depth: usize,
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(PipelineEvent::RunStarted {
            run_id: "r1".into(),
            step_count: 3,
        });

        match rx.recv().await.unwrap() {
            PipelineEvent::RunStarted { run_id, step_count } => {
                assert_eq!(run_id, "r1");
                assert_eq!(step_count, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(PipelineEvent::BrickSkipped {
            brick_id: "@brick/log".into(),
            depth: 0,
        });

        assert_eq!(rx1.recv().await.unwrap(), rx2.recv().await.unwrap());
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(PipelineEvent::RunFailed {
            run_id: "r1".into(),
            kind: "Unexpected".into(),
            error: "something went wrong".into(),
        });
    }

    #[test]
    fn event_serialization_round_trip() {
        let event = PipelineEvent::BrickCompleted {
            brick_id: "@brick/map".into(),
            depth: 1,
            duration_ms: 12,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
