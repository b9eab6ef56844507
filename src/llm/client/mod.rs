//! LLM客户端 - 提供统一的LLM服务接口

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::{anthropic, deepseek, ollama, openai};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DeepResearchMode, LLMConfig, LLMProvider};
use crate::error::{HorizonError, HorizonResult};
use crate::types::category::SteepvCategory;
use crate::types::domain_map::{DomainMap, DomainMapDraft};
use crate::types::research::ExtractedEntities;
use crate::types::scenario::{ScenarioDraft, ScenarioDraftSheet, ScenarioScore, ScenarioScoreSheet};
use crate::types::signal::{RelevanceAssessment, RelevanceVerdict, SearchHit};

pub mod deep_research;
mod prompts;
pub mod utils;

use deep_research::{
    JobBackend, JobPoller, PollPolicy, ResponsesJobClient, Sleeper, TokioSleeper, sleep_or_cancel,
};
use utils::parse_json_reply;

/// 调用用途，便于日志与测试脚本区分请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmPurpose {
    DeepResearch,
    ParseEntities,
    DomainMap,
    RelevanceScoring,
    ScenarioDrafting,
    ScenarioScoring,
}

/// 发往LLM后端的单次请求
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub purpose: LlmPurpose,
    pub model: String,
    pub system: String,
    pub user: String,
}

/// 单轮文本补全后端
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> HorizonResult<String>;
}

/// 基于rig provider的后端实现，每次请求按其模型与系统提示词构建Agent
pub struct RigBackend {
    provider: RigProvider,
    config: LLMConfig,
}

enum RigProvider {
    OpenAI(openai::Client),
    DeepSeek(deepseek::Client),
    Anthropic(anthropic::Client),
    Ollama(ollama::Client),
}

impl RigBackend {
    pub fn new(config: &LLMConfig) -> anyhow::Result<Self> {
        let provider = match config.provider {
            LLMProvider::OpenAI => RigProvider::OpenAI(
                openai::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build(),
            ),
            LLMProvider::DeepSeek => RigProvider::DeepSeek(
                deepseek::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build(),
            ),
            LLMProvider::Anthropic => {
                RigProvider::Anthropic(anthropic::ClientBuilder::new(&config.api_key).build()?)
            }
            LLMProvider::Ollama => RigProvider::Ollama(ollama::Client::builder().build()),
        };
        Ok(Self {
            provider,
            config: config.clone(),
        })
    }

    async fn prompt(&self, request: &LlmRequest) -> anyhow::Result<String> {
        let max_tokens = u64::from(self.config.max_tokens);
        let temperature = self.config.temperature;
        let user = request.user.as_str();

        let reply = match &self.provider {
            RigProvider::OpenAI(client) => {
                // Chat Completions接口兼容各类OpenAI协议的服务
                let agent = client
                    .completion_model(&request.model)
                    .completions_api()
                    .into_agent_builder()
                    .preamble(&request.system)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build();
                agent.prompt(user).await?
            }
            RigProvider::DeepSeek(client) => {
                let agent = client
                    .agent(&request.model)
                    .preamble(&request.system)
                    .temperature(temperature)
                    .build();
                agent.prompt(user).await?
            }
            RigProvider::Anthropic(client) => {
                let agent = client
                    .agent(&request.model)
                    .preamble(&request.system)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build();
                agent.prompt(user).await?
            }
            RigProvider::Ollama(client) => {
                let agent = client
                    .agent(&request.model)
                    .preamble(&request.system)
                    .max_tokens(max_tokens)
                    .temperature(temperature)
                    .build();
                agent.prompt(user).await?
            }
        };
        Ok(reply)
    }
}

#[async_trait]
impl LlmBackend for RigBackend {
    async fn complete(&self, request: &LlmRequest) -> HorizonResult<String> {
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        match tokio::time::timeout(timeout, self.prompt(request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(classify_backend_error(&e)),
            Err(_) => Err(HorizonError::Transport(format!(
                "request timed out after {}s",
                self.config.timeout_seconds
            ))),
        }
    }
}

/// provider错误只暴露为文本，按内容区分认证失败与可重试错误
fn classify_backend_error(error: &anyhow::Error) -> HorizonError {
    let message = format!("{:#}", error);
    let lower = message.to_lowercase();
    let auth_markers = ["401", "403", "unauthorized", "invalid api key", "invalid_api_key"];
    if auth_markers.iter().any(|marker| lower.contains(marker)) {
        HorizonError::Auth(message)
    } else {
        HorizonError::Transport(message)
    }
}

/// 领域地图构建结果；结构化输出失败时退回确定性兜底并给出原因
#[derive(Debug, Clone)]
pub struct DomainMapOutcome {
    pub map: DomainMap,
    pub fallback_reason: Option<String>,
}

/// LLM网关：重试、结构化修复、长任务轮询与取消
#[derive(Clone)]
pub struct LlmGateway {
    config: LLMConfig,
    backend: Arc<dyn LlmBackend>,
    jobs: Option<Arc<dyn JobBackend>>,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl LlmGateway {
    /// 根据配置创建网关
    pub fn new(config: &LLMConfig, cancel: CancellationToken) -> anyhow::Result<Self> {
        let backend: Arc<dyn LlmBackend> = Arc::new(RigBackend::new(config)?);
        let jobs: Option<Arc<dyn JobBackend>> = match config.deep_research.mode {
            DeepResearchMode::Background if config.provider == LLMProvider::OpenAI => {
                Some(Arc::new(ResponsesJobClient::new(config)?))
            }
            DeepResearchMode::Background => {
                warn!(provider = %config.provider, "background deep research needs the OpenAI Responses API, using direct mode");
                None
            }
            DeepResearchMode::Direct => None,
        };
        Ok(Self::with_backends(
            config.clone(),
            backend,
            jobs,
            Arc::new(TokioSleeper),
            cancel,
        ))
    }

    pub fn with_backends(
        config: LLMConfig,
        backend: Arc<dyn LlmBackend>,
        jobs: Option<Arc<dyn JobBackend>>,
        sleeper: Arc<dyn Sleeper>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            backend,
            jobs,
            sleeper,
            cancel,
        }
    }

    /// 深度调研文档缓存键中的模型标识
    pub fn deep_research_model_key(&self) -> String {
        format!("{}:{}", self.config.provider, self.config.model_deep_research)
    }

    fn request(&self, purpose: LlmPurpose, model: &str, system: &str, user: String) -> LlmRequest {
        LlmRequest {
            purpose,
            model: model.to_string(),
            system: system.to_string(),
            user,
        }
    }

    /// 通用重试逻辑：只对传输错误做指数退避，耗尽后转为LlmCall错误
    async fn retry_with_backoff<T, F, Fut>(&self, operation: &str, f: F) -> HorizonResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = HorizonResult<T>>,
    {
        let max_attempts = self.config.retry_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => {
                    if attempt >= max_attempts {
                        eprintln!(
                            "❌ 调用模型服务出错，尝试 {} 次均失败 ({}): {}",
                            attempt, operation, e
                        );
                        return Err(HorizonError::LlmCall {
                            operation: operation.to_string(),
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    let delay = Duration::from_millis(self.config.retry_delay_ms)
                        * 2u32.pow((attempt - 1).min(10));
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    sleep_or_cancel(self.sleeper.as_ref(), delay, &self.cancel).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call(&self, request: &LlmRequest) -> HorizonResult<String> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HorizonError::Cancelled),
            result = self.backend.complete(request) => result,
        }
    }

    async fn complete_with_retry(
        &self,
        operation: &str,
        request: &LlmRequest,
    ) -> HorizonResult<String> {
        self.retry_with_backoff(operation, || self.call(request))
            .await
    }

    /// 结构化调用：schema嵌入提示词，校验失败后带诊断信息修复一次
    async fn extract_validated<T, V>(
        &self,
        operation: &str,
        purpose: LlmPurpose,
        system: &str,
        user: &str,
        validate: V,
    ) -> HorizonResult<T>
    where
        T: JsonSchema + DeserializeOwned,
        V: Fn(&T) -> Result<(), String>,
    {
        let schema = serde_json::to_string_pretty(&schemars::schema_for!(T))?;
        let system = prompts::with_schema(system, &schema);
        let request = self.request(purpose, &self.config.model, &system, user.to_string());

        let check = |reply: &str| -> Result<T, String> {
            let value = parse_json_reply::<T>(reply)?;
            validate(&value)?;
            Ok(value)
        };

        let reply = self.complete_with_retry(operation, &request).await?;
        let diagnostic = match check(&reply) {
            Ok(value) => return Ok(value),
            Err(diagnostic) => diagnostic,
        };

        warn!(operation, %diagnostic, "structured reply failed validation, retrying with repair note");
        let repair = LlmRequest {
            user: prompts::with_repair_note(user, &diagnostic),
            ..request
        };
        let reply = self.complete_with_retry(operation, &repair).await?;
        check(&reply).map_err(|diagnostic| HorizonError::Schema {
            target: T::schema_name().to_string(),
            diagnostic,
        })
    }

    /// 生成深度调研长文档：后台任务模式下提交并轮询，否则单次调用
    pub async fn generate_long_document(&self, topic: &str) -> HorizonResult<String> {
        let request = self.request(
            LlmPurpose::DeepResearch,
            &self.config.model_deep_research,
            prompts::DEEP_RESEARCH_SYSTEM,
            prompts::deep_research_user(topic),
        );

        let text = match &self.jobs {
            Some(jobs) => {
                let handle = self
                    .retry_with_backoff("submit_deep_research", || async {
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => Err(HorizonError::Cancelled),
                            result = jobs.submit(&request) => result,
                        }
                    })
                    .await?;
                println!("   📨 深度调研任务已提交: {}", handle.id);

                let policy =
                    PollPolicy::from_config(&self.config.deep_research, self.config.retry_delay_ms);
                let mut poller =
                    JobPoller::new(jobs.as_ref(), self.sleeper.as_ref(), &policy, &self.cancel);
                poller.run(&handle).await?
            }
            None => {
                self.complete_with_retry("generate_long_document", &request)
                    .await?
            }
        };

        if text.trim().is_empty() {
            return Err(HorizonError::LlmCall {
                operation: "generate_long_document".to_string(),
                attempts: 1,
                reason: "backend returned an empty document".to_string(),
            });
        }
        info!(topic, chars = text.len(), "deep research document generated");
        Ok(text)
    }

    /// 将调研文档解析为结构化实体
    pub async fn parse_to_entities(
        &self,
        topic: &str,
        document: &str,
    ) -> HorizonResult<ExtractedEntities> {
        self.extract_validated::<ExtractedEntities, _>(
            "parse_to_entities",
            LlmPurpose::ParseEntities,
            prompts::PARSE_SYSTEM,
            &prompts::parse_user(topic, document),
            |entities| {
                if entities.topics.iter().all(|t| t.trim().is_empty()) {
                    Err("`topics` must contain at least one non-empty entry".to_string())
                } else {
                    Ok(())
                }
            },
        )
        .await
    }

    /// 为单个类别构建三层领域地图
    pub async fn generate_domain_map(
        &self,
        category: SteepvCategory,
        entities: &ExtractedEntities,
    ) -> HorizonResult<DomainMapOutcome> {
        let result = self
            .extract_validated::<DomainMapDraft, _>(
                "generate_domain_map",
                LlmPurpose::DomainMap,
                prompts::DOMAIN_MAP_SYSTEM,
                &prompts::domain_map_user(category, entities),
                |draft| {
                    let has_items = draft
                        .core
                        .iter()
                        .chain(&draft.adjacent)
                        .chain(&draft.peripheral)
                        .any(|item| !item.trim().is_empty());
                    if has_items {
                        Ok(())
                    } else {
                        Err("domain map contains no sub-topics".to_string())
                    }
                },
            )
            .await;

        match result {
            Ok(draft) => Ok(DomainMapOutcome {
                map: DomainMap::from_draft(category, draft),
                fallback_reason: None,
            }),
            Err(HorizonError::Schema { diagnostic, .. }) => {
                warn!(%category, %diagnostic, "domain map reply unusable, using topic fallback");
                Ok(DomainMapOutcome {
                    map: DomainMap::fallback(category, &entities.topics),
                    fallback_reason: Some(diagnostic),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// 对单条搜索结果评分；格式错误、空回复或判定不相关时返回None
    pub async fn score_relevance(
        &self,
        research_area: &str,
        category: SteepvCategory,
        hit: &SearchHit,
    ) -> HorizonResult<Option<RelevanceAssessment>> {
        let request = self.request(
            LlmPurpose::RelevanceScoring,
            &self.config.model,
            prompts::RELEVANCE_SYSTEM,
            prompts::relevance_user(research_area, category, hit),
        );
        let reply = self.complete_with_retry("score_relevance", &request).await?;

        match parse_json_reply::<RelevanceVerdict>(&reply) {
            Ok(verdict) if verdict.relevant && !verdict.description.trim().is_empty() => {
                Ok(Some(RelevanceAssessment {
                    description: verdict.description.trim().to_string(),
                    relevance: verdict.relevance.trim().to_string(),
                }))
            }
            Ok(_) => {
                debug!(%category, url = %hit.url, "search result judged not relevant");
                Ok(None)
            }
            Err(diagnostic) => {
                debug!(%category, url = %hit.url, %diagnostic, "malformed relevance reply, dropping result");
                Ok(None)
            }
        }
    }

    /// 根据信号标题起草候选情景
    pub async fn draft_scenarios(
        &self,
        topic: &str,
        signal_titles: &[String],
    ) -> HorizonResult<Vec<ScenarioDraft>> {
        let sheet = self
            .extract_validated::<ScenarioDraftSheet, _>(
                "draft_scenarios",
                LlmPurpose::ScenarioDrafting,
                prompts::SCENARIO_DRAFT_SYSTEM,
                &prompts::scenario_draft_user(topic, signal_titles),
                |sheet| {
                    if sheet.scenarios.is_empty() {
                        Err("`scenarios` must not be empty".to_string())
                    } else {
                        Ok(())
                    }
                },
            )
            .await?;

        Ok(sheet
            .scenarios
            .into_iter()
            .filter(|draft| !draft.title.trim().is_empty() && !draft.body.trim().is_empty())
            .collect())
    }

    /// 为候选情景打分
    pub async fn score_scenarios(
        &self,
        topic: &str,
        drafts: &[ScenarioDraft],
    ) -> HorizonResult<Vec<ScenarioScore>> {
        let sheet = self
            .extract_validated::<ScenarioScoreSheet, _>(
                "score_scenarios",
                LlmPurpose::ScenarioScoring,
                prompts::SCENARIO_SCORE_SYSTEM,
                &prompts::scenario_score_user(topic, drafts),
                |sheet| {
                    if sheet.scores.is_empty() {
                        Err("`scores` must not be empty".to_string())
                    } else {
                        Ok(())
                    }
                },
            )
            .await?;
        Ok(sheet.scores)
    }
}

#[cfg(test)]
mod tests;
