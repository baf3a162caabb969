mod classify;
mod context;
mod events;
mod healing;
mod queue;
mod resources;
mod runner;
mod state;

pub use classify::{Classification, classify};
pub use context::ExecutionContext;
pub use events::EngineEvent;
pub use healing::{HealOutcome, HealedStep, heal};
pub use queue::{CleanStatus, JobQueue, QueueCounts, QueueSet};
pub use resources::{JobBoard, PlanStore};
pub use runner::{MANIFEST_FILE, Orchestrator, Submission, runner_env, write_rendered};
pub use state::{FailureKind, Job, JobFailure, JobId, JobStatus, LogTail, QueueName};
