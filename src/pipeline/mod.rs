//! Pipeline components: execution slots, the per-item worker, and the scheduler.

pub mod context;
pub mod orchestrator;
pub mod worker;

pub use context::{ExecutionSlot, clear_stale_scratch, launch_with_retry};
pub use orchestrator::Scheduler;
pub use worker::run_item;
