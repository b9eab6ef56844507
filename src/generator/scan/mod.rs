// STEEPV多智能体扫描
// 每个类别一个DomainAgent：Created → MapBuilt → Scanning → Done | Failed
// 编排器并发运行六个智能体，等待全部结束后按类别顺序汇总

pub mod agent;
pub mod orchestrator;

pub use agent::{AgentReport, AgentState, DomainAgent};
pub use orchestrator::{ScanOrchestrator, ScanOutcome, aggregate};
