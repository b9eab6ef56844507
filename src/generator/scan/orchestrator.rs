use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::{HorizonError, HorizonResult};
use crate::generator::context::GeneratorContext;
use crate::generator::scan::agent::{AgentReport, DomainAgent};
use crate::generator::types::Generator;
use crate::search::SearchGateway;
use crate::types::category::SteepvCategory;
use crate::types::domain_map::DomainMap;
use crate::types::research::ExtractedEntities;
use crate::types::signal::Signal;

/// 汇总后的扫描结果
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub signals_by_category: BTreeMap<SteepvCategory, Vec<Signal>>,
    pub domain_maps: BTreeMap<SteepvCategory, DomainMap>,
    pub failed_categories: Vec<SteepvCategory>,
    pub warnings: Vec<String>,
}

/// 多智能体扫描编排器：六个类别并发执行，全部到达终态后汇总
pub struct ScanOrchestrator {
    entities: Arc<ExtractedEntities>,
}

impl ScanOrchestrator {
    pub fn new(entities: ExtractedEntities) -> Self {
        Self {
            entities: Arc::new(entities),
        }
    }
}

impl Generator<ScanOutcome> for ScanOrchestrator {
    async fn execute(&self, context: &GeneratorContext) -> HorizonResult<ScanOutcome> {
        println!("🚀 开始执行STEEPV多智能体扫描...");

        let search: Option<Arc<dyn SearchGateway>> = if context.config.skip_web_search {
            println!("   ⚠️ 已跳过网络搜索，智能体只构建领域地图");
            None
        } else {
            Some(context.search.clone())
        };
        let agent_timeout = Duration::from_secs(context.config.scan.agent_timeout_seconds);

        let handles: Vec<_> = SteepvCategory::ALL
            .iter()
            .map(|&category| {
                let agent = DomainAgent::new(
                    category,
                    context.config.topic.clone(),
                    context.llm_client.clone(),
                    search.clone(),
                );
                let entities = self.entities.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(agent_timeout, agent.run(entities)).await {
                        Ok(report) => report,
                        Err(_) => AgentReport::failed(
                            category,
                            format!("timed out after {}s", agent_timeout.as_secs()),
                        ),
                    }
                })
            })
            .collect();
        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => {
                for handle in &abort_handles {
                    handle.abort();
                }
                return Err(HorizonError::Cancelled);
            }
            joined = join_all(handles) => joined,
        };

        let reports: Vec<AgentReport> = SteepvCategory::ALL
            .iter()
            .zip(joined)
            .map(|(&category, result)| match result {
                Ok(report) => report,
                Err(e) => AgentReport::failed(category, format!("agent task aborted: {}", e)),
            })
            .collect();

        if context.cancel.is_cancelled() || reports.iter().any(|r| r.cancelled) {
            return Err(HorizonError::Cancelled);
        }

        let outcome = aggregate(reports);
        println!(
            "✓ STEEPV扫描完毕: {} 条信号, {} 个类别失败",
            outcome
                .signals_by_category
                .values()
                .map(Vec::len)
                .sum::<usize>(),
            outcome.failed_categories.len()
        );
        Ok(outcome)
    }
}

/// 合并各智能体的结果，保持每个智能体内部的信号顺序；六个类别总是存在
pub fn aggregate(reports: Vec<AgentReport>) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    for category in SteepvCategory::ALL {
        outcome.signals_by_category.insert(category, Vec::new());
        outcome
            .domain_maps
            .insert(category, DomainMap::empty(category));
    }

    for report in reports {
        let category = report.category;
        if report.is_failed() {
            warn!(%category, "category contributes no signals");
            outcome.failed_categories.push(category);
        } else {
            info!(%category, signals = report.signals.len(), "agent finished");
            // 信号类别必须与产生它的智能体一致
            let signals = report
                .signals
                .into_iter()
                .filter(|signal| signal.category == category)
                .collect();
            outcome.signals_by_category.insert(category, signals);
        }
        outcome.domain_maps.insert(category, report.domain_map);
        outcome.warnings.extend(report.warnings);
    }

    outcome.failed_categories.sort();
    outcome
}
