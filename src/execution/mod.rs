//! Pipeline execution: stage dispatch, scheduling and promotion

pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod promotion;
pub mod scheduler;

pub use events::{EventBus, EventHandler, ExecutionEvent};
pub use executor::{ExecutionError, RetryPolicy, StageExecutor};
pub use orchestrator::{HookError, PipelineHook, PipelineOrchestrator};
pub use promotion::{PromotionOutcome, PromotionRequest, Promoter};
pub use scheduler::{execution_levels, find_cycle, StageTracker};
