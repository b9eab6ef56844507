pub mod context;
pub mod outlet;
pub mod research;
pub mod scan;
pub mod scenario;
pub mod types;
pub mod workflow;
