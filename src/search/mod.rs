//! 网络搜索网关：基于Parallel搜索API
//!
//! 请求使用新版API的`objective + search_queries`结构，主端点不存在时切换到旧版端点。

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FallbackPolicy, SearchConfig};
use crate::error::{HorizonError, HorizonResult};
use crate::llm::client::deep_research::{Sleeper, TokioSleeper, sleep_or_cancel};
use crate::types::signal::SearchHit;

/// 拼接摘要后保留的最大字符数
const MAX_SNIPPET_CHARS: usize = 5000;

/// 每次退避附加的随机抖动上限（毫秒）
const MAX_JITTER_MS: u64 = 200;

/// 每个查询返回有限且有序的结果列表，空列表是合法结果
#[async_trait]
pub trait SearchGateway: Send + Sync {
    async fn search(&self, query: &str) -> HorizonResult<Vec<SearchHit>>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    objective: &'a str,
    search_queries: [&'a str; 1],
    processor: &'static str,
    max_results: usize,
    max_chars_per_result: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// 单次HTTP请求的失败分类
#[derive(Debug)]
enum AttemptError {
    /// 超时、连接失败或5xx
    Transient(String),
    NotFound,
    Unauthorized(u16, String),
    Rejected(u16, String),
}

pub struct ParallelSearchClient {
    client: Client,
    config: SearchConfig,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl ParallelSearchClient {
    pub fn new(config: &SearchConfig, cancel: CancellationToken) -> HorizonResult<Self> {
        Self::with_sleeper(config, Arc::new(TokioSleeper), cancel)
    }

    pub fn with_sleeper(
        config: &SearchConfig,
        sleeper: Arc<dyn Sleeper>,
        cancel: CancellationToken,
    ) -> HorizonResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| HorizonError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config: config.clone(),
            sleeper,
            cancel,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base_ms * 2u64.pow((attempt - 1).min(10));
        let jitter = rand::rng().random_range(0..=MAX_JITTER_MS);
        Duration::from_millis(base + jitter)
    }

    async fn execute_single_request(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<Vec<SearchHit>, AttemptError> {
        let request = SearchRequest {
            objective: query,
            search_queries: [query],
            processor: "base",
            max_results: self.config.max_results,
            max_chars_per_result: self.config.max_chars_per_result,
        };

        let response = self
            .client
            .post(endpoint)
            .header("x-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: SearchResponse = response
                .json()
                .await
                .map_err(|e| AttemptError::Rejected(status.as_u16(), e.to_string()))?;
            return Ok(body.results.iter().filter_map(normalize_result).collect());
        }

        let error_text: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        match status.as_u16() {
            404 => Err(AttemptError::NotFound),
            code @ (401 | 403) => Err(AttemptError::Unauthorized(code, error_text)),
            code @ (408 | 429 | 500..=599) => {
                Err(AttemptError::Transient(format!("HTTP {}: {}", code, error_text)))
            }
            code => Err(AttemptError::Rejected(code, error_text)),
        }
    }
}

#[async_trait]
impl SearchGateway for ParallelSearchClient {
    async fn search(&self, query: &str) -> HorizonResult<Vec<SearchHit>> {
        if self.config.api_key.is_empty() {
            info!(query, "search skipped: no API key configured");
            return Ok(Vec::new());
        }

        let mut endpoint = self.config.endpoint.as_str();
        let mut fell_back = false;
        let mut attempt = 0;

        while attempt < self.config.retry_attempts {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(HorizonError::Cancelled),
                result = self.execute_single_request(endpoint, query) => result,
            };

            match result {
                Ok(hits) => {
                    debug!(query, hits = hits.len(), "search completed");
                    return Ok(hits);
                }
                Err(AttemptError::NotFound)
                    if !fell_back && self.config.fallback_policy == FallbackPolicy::OnNotFound =>
                {
                    // 切换端点不消耗重试次数，且只切换一次
                    warn!(query, legacy = %self.config.legacy_endpoint, "search endpoint not found, switching to legacy endpoint");
                    fell_back = true;
                    endpoint = self.config.legacy_endpoint.as_str();
                }
                Err(AttemptError::Transient(reason)) => {
                    attempt += 1;
                    if attempt >= self.config.retry_attempts {
                        warn!(query, attempt, %reason, "search failed");
                        return Err(HorizonError::Search {
                            query: query.to_string(),
                            reason,
                        });
                    }
                    let delay = self.backoff(attempt);
                    warn!(query, attempt, delay_ms = delay.as_millis() as u64, %reason, "search failed, retrying");
                    sleep_or_cancel(self.sleeper.as_ref(), delay, &self.cancel).await?;
                }
                Err(AttemptError::Unauthorized(code, body)) => {
                    return Err(HorizonError::Auth(format!(
                        "search API rejected credentials (HTTP {}): {}",
                        code, body
                    )));
                }
                Err(AttemptError::NotFound) => {
                    return Err(HorizonError::Search {
                        query: query.to_string(),
                        reason: format!("endpoint {} not found", endpoint),
                    });
                }
                Err(AttemptError::Rejected(code, body)) => {
                    return Err(HorizonError::Search {
                        query: query.to_string(),
                        reason: format!("HTTP {}: {}", code, body),
                    });
                }
            }
        }

        Err(HorizonError::Search {
            query: query.to_string(),
            reason: "no attempts made".to_string(),
        })
    }
}

/// 兼容新版（`url`, `excerpts[]`）与旧版（`link`, `snippet`）结构，没有URL的结果被丢弃
fn normalize_result(raw: &Value) -> Option<SearchHit> {
    let url = ["url", "link", "sourceURL"]
        .iter()
        .filter_map(|key| raw[*key].as_str())
        .map(str::trim)
        .find(|url| !url.is_empty())?;

    let title = raw["title"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("N/A");

    let snippet = match raw["excerpts"].as_array() {
        Some(excerpts) => {
            let joined = excerpts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            joined.chars().take(MAX_SNIPPET_CHARS).collect()
        }
        None => raw["snippet"]
            .as_str()
            .or_else(|| raw["description"].as_str())
            .unwrap_or_default()
            .to_string(),
    };

    Some(SearchHit {
        title: title.to_string(),
        url: url.to_string(),
        snippet,
    })
}
