use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::fingerprint_text;

/// 深度调研文档，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchDocument {
    pub topic: String,
    pub body: String,
    pub generated_at: DateTime<Utc>,
}

impl ResearchDocument {
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
            generated_at: Utc::now(),
        }
    }

    /// 正文内容的哈希，用作解析阶段缓存键的输入
    pub fn content_hash(&self) -> String {
        fingerprint_text(&self.body)
    }

    /// 渲染为落盘的markdown文档
    pub fn to_markdown(&self) -> String {
        format!(
            "# Deep Research: {}\n\n_Generated at {}_\n\n{}\n",
            self.topic,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.body
        )
    }
}

/// 调研文档的来源
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    /// 本次运行由LLM生成
    Generated,
    /// 命中缓存
    Cache,
    /// 用户提供的已有文档
    File(PathBuf),
}

/// 从调研文档中提取的结构化实体
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExtractedEntities {
    /// 关键主题，按重要性排序
    pub topics: Vec<String>,
    /// 关键概念
    #[serde(default)]
    pub concepts: Vec<String>,
    /// 组织、技术、人物等命名实体
    #[serde(default)]
    pub entities: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.concepts.is_empty() && self.entities.is_empty()
    }
}

/// 解析结果的落盘形式，附带来源文档引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedResearch {
    pub topic: String,
    pub source_document: String,
    pub source_hash: String,
    #[serde(flatten)]
    pub entities: ExtractedEntities,
}
