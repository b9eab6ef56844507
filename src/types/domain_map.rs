use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;

use crate::types::category::SteepvCategory;

/// 领域地图的层级，Core优先扫描
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Core,
    Adjacent,
    Peripheral,
}

impl Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            Tier::Core => "Core",
            Tier::Adjacent => "Adjacent",
            Tier::Peripheral => "Peripheral",
        };
        write!(f, "{}", str)
    }
}

/// LLM返回的领域地图草稿（不含类别，由智能体补齐）
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DomainMapDraft {
    /// 与该类别直接相关的核心子主题
    pub core: Vec<String>,
    /// 相邻领域的子主题
    #[serde(default)]
    pub adjacent: Vec<String>,
    /// 边缘、弱信号所在的子主题
    #[serde(default)]
    pub peripheral: Vec<String>,
}

/// 单个智能体独占的三层领域地图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainMap {
    pub category: SteepvCategory,
    pub core: Vec<String>,
    pub adjacent: Vec<String>,
    pub peripheral: Vec<String>,
}

impl DomainMap {
    pub fn empty(category: SteepvCategory) -> Self {
        Self {
            category,
            core: Vec::new(),
            adjacent: Vec::new(),
            peripheral: Vec::new(),
        }
    }

    /// 规范化草稿：去除空白项，跨层去重（靠前的层级优先）
    pub fn from_draft(category: SteepvCategory, draft: DomainMapDraft) -> Self {
        let mut seen = HashSet::new();
        let mut normalize = |items: Vec<String>| -> Vec<String> {
            items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
                .collect()
        };
        let core = normalize(draft.core);
        let adjacent = normalize(draft.adjacent);
        let peripheral = normalize(draft.peripheral);
        Self {
            category,
            core,
            adjacent,
            peripheral,
        }
    }

    /// 结构化输出失败时的兜底：将主题轮流分配到三个层级，空层级补入首个主题
    pub fn fallback(category: SteepvCategory, topics: &[String]) -> Self {
        let mut map = Self::empty(category);
        let topics: Vec<&String> = topics.iter().filter(|t| !t.trim().is_empty()).collect();
        for (i, topic) in topics.iter().enumerate() {
            let tier = match i % 3 {
                0 => &mut map.core,
                1 => &mut map.adjacent,
                _ => &mut map.peripheral,
            };
            tier.push(topic.trim().to_string());
        }
        if let Some(first) = topics.first() {
            for tier in [&mut map.core, &mut map.adjacent, &mut map.peripheral] {
                if tier.is_empty() {
                    tier.push(first.trim().to_string());
                }
            }
        }
        map
    }

    /// 按扫描顺序返回各层级
    pub fn tiers(&self) -> [(Tier, &[String]); 3] {
        [
            (Tier::Core, self.core.as_slice()),
            (Tier::Adjacent, self.adjacent.as_slice()),
            (Tier::Peripheral, self.peripheral.as_slice()),
        ]
    }

    pub fn sub_topic_count(&self) -> usize {
        self.core.len() + self.adjacent.len() + self.peripheral.len()
    }
}
