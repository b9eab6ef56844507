use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::category::SteepvCategory;
use crate::types::domain_map::DomainMap;
use crate::types::scenario::Scenario;

/// 搜索网关返回的单条结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// LLM对单条搜索结果的相关性判断
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelevanceVerdict {
    /// 该结果是否是此类别下的有效变化信号
    pub relevant: bool,
    /// 一到两句话描述该信号
    #[serde(default)]
    pub description: String,
    /// 为什么与调研领域和类别相关
    #[serde(default)]
    pub relevance: String,
}

/// 被接受的相关性评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceAssessment {
    pub description: String,
    pub relevance: String,
}

/// 单条信号，所属类别等于产生它的智能体的类别
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub title: String,
    pub description: String,
    pub relevance: String,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    pub category: SteepvCategory,
}

impl Signal {
    pub fn new(category: SteepvCategory, hit: SearchHit, assessment: RelevanceAssessment) -> Self {
        Self {
            title: hit.title,
            description: assessment.description,
            relevance: assessment.relevance,
            source_url: hit.url,
            category,
        }
    }
}

/// 汇总统计
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanSummary {
    pub total_signals: usize,
    pub signals_per_category: BTreeMap<SteepvCategory, usize>,
    pub failed_categories: Vec<SteepvCategory>,
    pub empty_categories: Vec<SteepvCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_count: Option<usize>,
}

/// 最终的扫描报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    /// 六个类别固定存在，按类别声明顺序序列化
    #[serde(rename = "signals")]
    pub signals_by_category: BTreeMap<SteepvCategory, Vec<Signal>>,
    pub domain_maps: BTreeMap<SteepvCategory, DomainMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Vec<Scenario>>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub summary: ScanSummary,
}

impl ScanResult {
    pub fn new(
        topic: impl Into<String>,
        signals_by_category: BTreeMap<SteepvCategory, Vec<Signal>>,
        domain_maps: BTreeMap<SteepvCategory, DomainMap>,
        failed_categories: Vec<SteepvCategory>,
        scenarios: Option<Vec<Scenario>>,
        warnings: Vec<String>,
    ) -> Self {
        let signals_per_category: BTreeMap<SteepvCategory, usize> = signals_by_category
            .iter()
            .map(|(category, signals)| (*category, signals.len()))
            .collect();
        let empty_categories = signals_per_category
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(category, _)| *category)
            .collect();
        let summary = ScanSummary {
            total_signals: signals_per_category.values().sum(),
            signals_per_category,
            failed_categories,
            empty_categories,
            scenario_count: scenarios.as_ref().map(|s| s.len()),
        };

        Self {
            topic: topic.into(),
            timestamp: Utc::now(),
            signals_by_category,
            domain_maps,
            scenarios,
            warnings,
            summary,
        }
    }

    pub fn total_signals(&self) -> usize {
        self.summary.total_signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(category: SteepvCategory, url: &str) -> Signal {
        Signal {
            title: "t".into(),
            description: "d".into(),
            relevance: "r".into(),
            source_url: url.into(),
            category,
        }
    }

    #[test]
    fn test_scan_result_serializes_categories_in_fixed_order() {
        let mut signals = BTreeMap::new();
        for category in SteepvCategory::ALL.iter().rev() {
            signals.insert(*category, Vec::new());
        }
        signals.insert(
            SteepvCategory::Economic,
            vec![signal(SteepvCategory::Economic, "https://a")],
        );

        let result = ScanResult::new(
            "Quantum Computing",
            signals,
            BTreeMap::new(),
            vec![],
            None,
            vec![],
        );
        let json = serde_json::to_string(&result).unwrap();
        let positions: Vec<usize> = SteepvCategory::ALL
            .iter()
            .map(|c| json.find(&format!("\"{}\":[", c)).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["signals"].as_object().unwrap().len(), 6);
        assert!(value.get("scenarios").is_none());
        assert_eq!(value["summary"]["total_signals"], 1);
        assert_eq!(
            value["signals"]["Economic"][0]["sourceURL"],
            serde_json::json!("https://a")
        );
    }

    #[test]
    fn test_summary_counts_empty_categories() {
        let mut signals = BTreeMap::new();
        for category in SteepvCategory::ALL {
            signals.insert(category, Vec::new());
        }
        signals.insert(
            SteepvCategory::Social,
            vec![
                signal(SteepvCategory::Social, "https://a"),
                signal(SteepvCategory::Social, "https://b"),
            ],
        );
        let result = ScanResult::new(
            "t",
            signals,
            BTreeMap::new(),
            vec![SteepvCategory::Values],
            Some(vec![]),
            vec!["Values agent failed".into()],
        );
        assert_eq!(result.total_signals(), 2);
        assert_eq!(result.summary.empty_categories.len(), 5);
        assert_eq!(result.summary.failed_categories, vec![SteepvCategory::Values]);
        assert_eq!(result.summary.scenario_count, Some(0));
    }
}
