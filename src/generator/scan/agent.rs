use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{HorizonError, HorizonResult};
use crate::llm::client::LlmGateway;
use crate::search::SearchGateway;
use crate::types::category::SteepvCategory;
use crate::types::domain_map::{DomainMap, Tier};
use crate::types::research::ExtractedEntities;
use crate::types::signal::{SearchHit, Signal};

/// 智能体生命周期
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    Created,
    MapBuilt,
    Scanning,
    Done,
    Failed(String),
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Done | AgentState::Failed(_))
    }
}

/// 智能体运行结束后交给编排器的结果
#[derive(Debug, Clone)]
pub struct AgentReport {
    pub category: SteepvCategory,
    pub state: AgentState,
    pub domain_map: DomainMap,
    /// 按评分顺序排列，Core层在前
    pub signals: Vec<Signal>,
    pub warnings: Vec<String>,
    /// 失败原因是否为外部取消
    pub cancelled: bool,
}

impl AgentReport {
    /// 超时或任务异常退出时的失败结果
    pub fn failed(category: SteepvCategory, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            category,
            state: AgentState::Failed(reason.clone()),
            domain_map: DomainMap::empty(category),
            signals: Vec::new(),
            warnings: vec![format!("{} agent failed: {}", category, reason)],
            cancelled: false,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, AgentState::Failed(_))
    }
}

/// 单个STEEPV类别的领域智能体
///
/// 六个类别共用同一实现，只以类别参数区分。智能体独占自己的领域地图和信号列表。
pub struct DomainAgent {
    category: SteepvCategory,
    research_area: String,
    llm: LlmGateway,
    search: Option<Arc<dyn SearchGateway>>,
    state: AgentState,
    domain_map: Option<DomainMap>,
    signals: Vec<Signal>,
    seen_urls: HashSet<String>,
    warnings: Vec<String>,
}

impl DomainAgent {
    /// `search`为None时只构建领域地图
    pub fn new(
        category: SteepvCategory,
        research_area: impl Into<String>,
        llm: LlmGateway,
        search: Option<Arc<dyn SearchGateway>>,
    ) -> Self {
        Self {
            category,
            research_area: research_area.into(),
            llm,
            search,
            state: AgentState::Created,
            domain_map: None,
            signals: Vec::new(),
            seen_urls: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn category(&self) -> SteepvCategory {
        self.category
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// 运行到终态并产出报告，不会返回错误
    pub async fn run(mut self, entities: Arc<ExtractedEntities>) -> AgentReport {
        println!("🤖 执行 {} 智能体分析...", self.category);

        if let Err(e) = self.build_map(&entities).await {
            return self.fail(e);
        }
        if let Err(e) = self.scan().await {
            return self.fail(e);
        }

        self.state = AgentState::Done;
        println!(
            "✓ {} 分析完成: {} 个子主题, {} 条信号",
            self.category,
            self.domain_map
                .as_ref()
                .map(DomainMap::sub_topic_count)
                .unwrap_or_default(),
            self.signals.len()
        );
        self.into_report(false)
    }

    async fn build_map(&mut self, entities: &ExtractedEntities) -> HorizonResult<()> {
        let map = if entities.is_empty() {
            debug!(category = %self.category, "no entities, building empty domain map");
            DomainMap::empty(self.category)
        } else {
            let outcome = self
                .llm
                .generate_domain_map(self.category, entities)
                .await?;
            if let Some(reason) = outcome.fallback_reason {
                self.warnings.push(format!(
                    "{} domain map built from topic fallback: {}",
                    self.category, reason
                ));
            }
            outcome.map
        };

        info!(category = %self.category, sub_topics = map.sub_topic_count(), "domain map built");
        self.domain_map = Some(map);
        self.state = AgentState::MapBuilt;
        Ok(())
    }

    async fn scan(&mut self) -> HorizonResult<()> {
        let Some(search) = self.search.clone() else {
            return Ok(());
        };
        let Some(map) = self.domain_map.clone() else {
            return Ok(());
        };
        self.state = AgentState::Scanning;

        for (tier, sub_topics) in map.tiers() {
            for sub_topic in sub_topics {
                let hits = match search.search(sub_topic).await {
                    Ok(hits) => hits,
                    Err(e) if e.is_unrecoverable() => return Err(e),
                    Err(e) => {
                        warn!(category = %self.category, %tier, sub_topic, error = %e, "search failed, skipping sub-topic");
                        continue;
                    }
                };
                debug!(category = %self.category, %tier, sub_topic, hits = hits.len(), "search returned");

                for hit in hits {
                    self.assess(tier, hit).await?;
                }
            }
        }
        Ok(())
    }

    /// 同一URL只评分一次，保留最先被接受的信号
    async fn assess(&mut self, tier: Tier, hit: SearchHit) -> HorizonResult<()> {
        if self.seen_urls.contains(&hit.url) {
            debug!(category = %self.category, url = %hit.url, "duplicate result skipped");
            return Ok(());
        }

        match self
            .llm
            .score_relevance(&self.research_area, self.category, &hit)
            .await
        {
            Ok(Some(assessment)) => {
                debug!(category = %self.category, %tier, url = %hit.url, "signal accepted");
                self.seen_urls.insert(hit.url.clone());
                self.signals
                    .push(Signal::new(self.category, hit, assessment));
            }
            Ok(None) => {
                self.seen_urls.insert(hit.url);
            }
            Err(e) if e.is_unrecoverable() => return Err(e),
            Err(e) => {
                warn!(category = %self.category, url = %hit.url, error = %e, "relevance scoring failed, dropping result");
            }
        }
        Ok(())
    }

    fn fail(mut self, error: HorizonError) -> AgentReport {
        let cancelled = matches!(error, HorizonError::Cancelled);
        let failure = HorizonError::AgentFailure {
            category: self.category,
            reason: error.to_string(),
        };
        if !cancelled {
            eprintln!("❌ {}", failure);
        }
        warn!(category = %self.category, error = %error, "agent failed");

        self.state = AgentState::Failed(error.to_string());
        self.warnings.push(failure.to_string());
        // 失败的类别不贡献任何信号
        self.signals.clear();
        self.into_report(cancelled)
    }

    fn into_report(self, cancelled: bool) -> AgentReport {
        AgentReport {
            category: self.category,
            domain_map: self
                .domain_map
                .unwrap_or_else(|| DomainMap::empty(self.category)),
            state: self.state,
            signals: self.signals,
            warnings: self.warnings,
            cancelled,
        }
    }
}
