pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod llm;
pub mod search;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{HorizonError, HorizonResult};
pub use generator::workflow::{Pipeline, PipelineOutput, execute_and_save, launch};
