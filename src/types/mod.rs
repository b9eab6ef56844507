pub mod category;
pub mod domain_map;
pub mod research;
pub mod scenario;
pub mod signal;
