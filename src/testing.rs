//! 离线驱动流水线用的内存网关

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{HorizonError, HorizonResult};
use crate::llm::client::{LlmBackend, LlmPurpose, LlmRequest};
use crate::search::SearchGateway;
use crate::types::category::SteepvCategory;
use crate::types::signal::SearchHit;

type LlmHandler = dyn Fn(&LlmRequest) -> HorizonResult<String> + Send + Sync;
type SearchHandler = dyn Fn(&str) -> HorizonResult<Vec<SearchHit>> + Send + Sync;

/// 按处理函数回复并记录所有请求的LLM后端
pub struct ScriptedLlm {
    handler: Box<LlmHandler>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(
        handler: impl Fn(&LlmRequest) -> HorizonResult<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// 按顺序回放预设回复，耗尽后返回传输错误
    pub fn queued(replies: Vec<HorizonResult<String>>) -> Arc<Self> {
        let replies = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            replies
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front())
                .unwrap_or_else(|| Err(HorizonError::Transport("script exhausted".into())))
        })
    }

    /// 对每种用途给出合法回复
    pub fn canned() -> Arc<Self> {
        Self::new(canned_reply)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn count(&self, purpose: LlmPurpose) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.purpose == purpose)
            .count()
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn complete(&self, request: &LlmRequest) -> HorizonResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        tokio::task::yield_now().await;
        (self.handler)(request)
    }
}

/// 按处理函数返回结果并记录查询的搜索网关
pub struct ScriptedSearch {
    handler: Box<SearchHandler>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn new(
        handler: impl Fn(&str) -> HorizonResult<Vec<SearchHit>> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            queries: Mutex::new(Vec::new()),
        })
    }

    /// 每个查询返回一条专属结果
    pub fn one_hit_per_query() -> Arc<Self> {
        Self::new(|query| Ok(vec![hit_for(query)]))
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchGateway for ScriptedSearch {
    async fn search(&self, query: &str) -> HorizonResult<Vec<SearchHit>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        tokio::task::yield_now().await;
        (self.handler)(query)
    }
}

/// 以查询内容生成确定的搜索结果
pub fn hit_for(query: &str) -> SearchHit {
    let slug = query.to_lowercase().replace(' ', "-");
    SearchHit {
        title: format!("Article about {}", query),
        url: format!("https://example.com/{}", slug),
        snippet: format!("Recent developments in {}", query),
    }
}

/// 从提示词中读出`Category: X`行
pub fn category_of(request: &LlmRequest) -> Option<SteepvCategory> {
    request
        .user
        .lines()
        .find_map(|line| line.strip_prefix("Category: "))
        .and_then(|name| name.trim().parse().ok())
}

pub const CANNED_DOCUMENT: &str = "# Quantum Computing\n\n## Error Correction\nSurface codes are maturing.\n\n## Scenario 1: Quantum Advantage at Scale\nFault-tolerant machines arrive early.\n\n## Scenario 2: Quantum Winter\nFunding collapses after missed milestones.\n\n## References\n- none\n";

pub fn canned_reply(request: &LlmRequest) -> HorizonResult<String> {
    let reply = match request.purpose {
        LlmPurpose::DeepResearch => CANNED_DOCUMENT.to_string(),
        LlmPurpose::ParseEntities => r#"{"topics": ["Error correction", "Qubit scaling"], "concepts": ["Decoherence"], "entities": ["IBM"]}"#.to_string(),
        LlmPurpose::DomainMap => {
            let category = category_of(request).map(|c| c.as_str()).unwrap_or("Unknown");
            format!(
                r#"{{"core": ["{0} core"], "adjacent": ["{0} adjacent"], "peripheral": ["{0} peripheral"]}}"#,
                category
            )
        }
        LlmPurpose::RelevanceScoring => {
            r#"{"relevant": true, "description": "A relevant development.", "relevance": "Signals change."}"#.to_string()
        }
        LlmPurpose::ScenarioDrafting => {
            r#"{"scenarios": [{"title": "Drafted future", "body": "Signals converge."}]}"#.to_string()
        }
        LlmPurpose::ScenarioScoring => r#"{"scores": [
            {"title": "Quantum Advantage at Scale", "novelty": 4, "plausibility": 3, "impact": 5, "clarity": 4, "uncertainty_coverage": 3, "explanation": "High impact."},
            {"title": "Quantum Winter", "novelty": 2, "plausibility": 4, "impact": 3, "clarity": 5, "uncertainty_coverage": 4, "explanation": "Plausible.", "overall_score": 3.45}
        ]}"#
        .to_string(),
    };
    Ok(reply)
}
