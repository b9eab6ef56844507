pub mod client;

pub use client::deep_research::{
    JobBackend, JobHandle, JobStatus, RecordingSleeper, ResponsesJobClient, Sleeper, TokioSleeper,
};
pub use client::{DomainMapOutcome, LlmBackend, LlmGateway, LlmPurpose, LlmRequest, RigBackend};
