//! Execution events and their subscribers

use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
    },
    StageStarted {
        stage: String,
        attempt: u32,
    },
    StageRetrying {
        stage: String,
        attempt: u32,
        max_retries: u32,
    },
    StageCompleted {
        stage: String,
        duration_ms: u64,
    },
    StageFailed {
        stage: String,
        error: String,
    },
    StageSkipped {
        stage: String,
    },
    PipelineCompleted {
        run_id: Uuid,
        success: bool,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
///
/// Clones share the same handler list, so the orchestrator and the stage
/// executor can hold one each.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers: Vec<EventHandler> = self.handlers.read().clone();
        for handler in handlers {
            handler(event.clone());
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
