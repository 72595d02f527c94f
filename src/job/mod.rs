pub mod runner;
pub mod status;
pub mod store;

pub use runner::{decide_fallback, FallbackDecision, JobRunner, SynthesisMode};
pub use status::{JobProgress, JobState, JobStatus, JobUpdate, MemoryStatusStore, StatusSink};
pub use store::{LocalResultStore, ResultStore};
