//! 错误类型定义

use std::time::Duration;
use thiserror::Error;

use crate::types::category::SteepvCategory;

/// 流水线各阶段共用的错误分类
#[derive(Error, Debug)]
pub enum HorizonError {
    /// 网络/传输层错误，可重试
    #[error("transport error: {0}")]
    Transport(String),

    /// 长任务轮询超过最大周期
    #[error("deep research job timed out after {cycles} poll cycles ({elapsed:?})")]
    Timeout { cycles: u32, elapsed: Duration },

    /// 结构化输出在一次修复后仍未通过校验
    #[error("schema validation failed for {target}: {diagnostic}")]
    Schema { target: String, diagnostic: String },

    /// 单次搜索失败
    #[error("search failed for `{query}`: {reason}")]
    Search { query: String, reason: String },

    /// 认证失败等不可恢复的网关错误
    #[error("unrecoverable gateway error: {0}")]
    Auth(String),

    /// 单个领域智能体的终止性失败
    #[error("{category} agent failed: {reason}")]
    AgentFailure {
        category: SteepvCategory,
        reason: String,
    },

    /// 重试耗尽后的LLM调用失败
    #[error("LLM call `{operation}` failed after {attempts} attempts: {reason}")]
    LlmCall {
        operation: String,
        attempts: u32,
        reason: String,
    },

    /// 文档获取或解析阶段失败，整个运行终止
    #[error("pipeline stage `{stage}` failed: {source}")]
    Pipeline {
        stage: &'static str,
        #[source]
        source: Box<HorizonError>,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HorizonError {
    /// 只有传输层错误允许退避重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, HorizonError::Transport(_))
    }

    /// 是否必须中止所属单元（智能体或整个运行）
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, HorizonError::Auth(_) | HorizonError::Cancelled)
    }

    pub fn pipeline(stage: &'static str, source: HorizonError) -> Self {
        match source {
            HorizonError::Cancelled => HorizonError::Cancelled,
            other => HorizonError::Pipeline {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// 将HTTP状态码映射到错误分类
    pub fn from_status(status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        match status {
            401 | 403 => HorizonError::Auth(format!("HTTP {}: {}", status, snippet)),
            408 | 429 | 500..=599 => HorizonError::Transport(format!("HTTP {}: {}", status, snippet)),
            _ => HorizonError::LlmCall {
                operation: "http".to_string(),
                attempts: 1,
                reason: format!("HTTP {}: {}", status, snippet),
            },
        }
    }
}

impl From<reqwest::Error> for HorizonError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status()
            && matches!(status.as_u16(), 401 | 403)
        {
            return HorizonError::Auth(e.to_string());
        }
        HorizonError::Transport(e.to_string())
    }
}

pub type HorizonResult<T> = std::result::Result<T, HorizonError>;
