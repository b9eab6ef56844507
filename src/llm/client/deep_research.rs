//! 深度调研长任务：提交后台任务，按固定间隔轮询直到终态

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DeepResearchConfig, LLMConfig};
use crate::error::{HorizonError, HorizonResult};
use crate::llm::client::LlmRequest;

/// 后台任务句柄
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub id: String,
}

/// 单次轮询观察到的任务状态
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Complete(String),
    Failed(String),
}

/// 支持提交/轮询的长任务后端
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn submit(&self, request: &LlmRequest) -> HorizonResult<JobHandle>;

    async fn poll(&self, handle: &JobHandle) -> HorizonResult<JobStatus>;
}

/// 可注入的休眠实现，测试中替换为不等待的记录器
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 记录每次休眠时长但立即返回
#[derive(Default, Clone)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// 可被取消的休眠
pub async fn sleep_or_cancel(
    sleeper: &dyn Sleeper,
    duration: Duration,
    cancel: &CancellationToken,
) -> HorizonResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HorizonError::Cancelled),
        _ = sleeper.sleep(duration) => Ok(()),
    }
}

/// 轮询策略
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_cycles: u32,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
}

impl PollPolicy {
    pub fn from_config(config: &DeepResearchConfig, retry_delay_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_cycles: config.max_poll_cycles,
            retry_attempts: config.poll_retry_attempts.max(1),
            retry_base_delay: Duration::from_millis(retry_delay_ms),
        }
    }
}

/// 任务状态机的阶段
#[derive(Debug, Clone, PartialEq)]
pub enum JobPhase {
    Submitted,
    Polling { cycle: u32 },
    Completed,
    Failed,
    TimedOut,
}

/// 驱动单个后台任务直到完成、失败或超时
pub struct JobPoller<'a> {
    backend: &'a dyn JobBackend,
    sleeper: &'a dyn Sleeper,
    policy: &'a PollPolicy,
    cancel: &'a CancellationToken,
    phase: JobPhase,
    polls: u32,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        backend: &'a dyn JobBackend,
        sleeper: &'a dyn Sleeper,
        policy: &'a PollPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            backend,
            sleeper,
            policy,
            cancel,
            phase: JobPhase::Submitted,
            polls: 0,
        }
    }

    pub fn phase(&self) -> &JobPhase {
        &self.phase
    }

    /// 实际发出的轮询次数（不含周期内的传输重试）
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub async fn run(&mut self, handle: &JobHandle) -> HorizonResult<String> {
        let started = Instant::now();

        loop {
            let cycle = match self.phase {
                JobPhase::Submitted => 1,
                JobPhase::Polling { cycle } => cycle + 1,
                _ => unreachable_phase(&self.phase)?,
            };

            if cycle > self.policy.max_cycles {
                self.phase = JobPhase::TimedOut;
                warn!(job = %handle.id, cycles = self.polls, "deep research job timed out");
                return Err(HorizonError::Timeout {
                    cycles: self.polls,
                    elapsed: started.elapsed(),
                });
            }

            sleep_or_cancel(self.sleeper, self.policy.interval, self.cancel).await?;
            let status = self.poll_with_retry(handle, cycle).await?;
            self.polls += 1;

            match status {
                JobStatus::Pending => {
                    debug!(job = %handle.id, cycle, "deep research job pending");
                    if cycle % 6 == 0 {
                        println!(
                            "   ⏳ 深度调研进行中... (第 {} / {} 次轮询, 已耗时 {:?})",
                            cycle,
                            self.policy.max_cycles,
                            started.elapsed()
                        );
                    }
                    self.phase = JobPhase::Polling { cycle };
                }
                JobStatus::Complete(text) => {
                    self.phase = JobPhase::Completed;
                    info!(job = %handle.id, cycles = cycle, "deep research job completed");
                    return Ok(text);
                }
                JobStatus::Failed(reason) => {
                    self.phase = JobPhase::Failed;
                    return Err(HorizonError::LlmCall {
                        operation: "generate_long_document".to_string(),
                        attempts: 1,
                        reason,
                    });
                }
            }
        }
    }

    /// 单个周期内的轮询，传输错误按有限次数退避重试
    async fn poll_with_retry(&self, handle: &JobHandle, cycle: u32) -> HorizonResult<JobStatus> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(HorizonError::Cancelled),
                result = self.backend.poll(handle) => result,
            };
            match result {
                Ok(status) => return Ok(status),
                Err(e) if e.is_retryable() && attempt < self.policy.retry_attempts => {
                    warn!(job = %handle.id, cycle, attempt, error = %e, "poll failed, retrying");
                    let delay = self.policy.retry_base_delay * 2u32.pow((attempt - 1).min(10));
                    sleep_or_cancel(self.sleeper, delay, self.cancel).await?;
                }
                Err(HorizonError::Transport(reason)) => {
                    return Err(HorizonError::Transport(format!(
                        "poll of job {} failed after {} attempts: {}",
                        handle.id, attempt, reason
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn unreachable_phase(phase: &JobPhase) -> HorizonResult<u32> {
    Err(HorizonError::LlmCall {
        operation: "generate_long_document".to_string(),
        attempts: 0,
        reason: format!("job poller reused in terminal phase {:?}", phase),
    })
}

/// OpenAI Responses API 的后台模式客户端
pub struct ResponsesJobClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ResponsesJobClient {
    pub fn new(config: &LLMConfig) -> HorizonResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| HorizonError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn read_json(response: reqwest::Response) -> HorizonResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HorizonError::from_status(status.as_u16(), &body));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| HorizonError::Transport(format!("invalid response body: {}", e)))
    }
}

#[async_trait]
impl JobBackend for ResponsesJobClient {
    async fn submit(&self, request: &LlmRequest) -> HorizonResult<JobHandle> {
        let body = json!({
            "model": request.model,
            "instructions": request.system,
            "input": request.user,
            "background": true,
            "reasoning": { "summary": "auto" },
            "tools": [{ "type": "web_search_preview" }],
        });

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let value = Self::read_json(response).await?;

        let id = value["id"].as_str().ok_or_else(|| HorizonError::LlmCall {
            operation: "submit_deep_research".to_string(),
            attempts: 1,
            reason: "response carries no job id".to_string(),
        })?;
        info!(job = id, model = %request.model, "deep research job submitted");
        Ok(JobHandle { id: id.to_string() })
    }

    async fn poll(&self, handle: &JobHandle) -> HorizonResult<JobStatus> {
        let response = self
            .client
            .get(format!("{}/responses/{}", self.base_url, handle.id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let value = Self::read_json(response).await?;
        Ok(status_from_response(&value))
    }
}

/// 将Responses API的任务对象映射为轮询状态
pub fn status_from_response(value: &Value) -> JobStatus {
    match value["status"].as_str().unwrap_or_default() {
        "queued" | "in_progress" => JobStatus::Pending,
        "completed" => JobStatus::Complete(extract_output_text(value)),
        other => {
            let reason = value["error"]["message"]
                .as_str()
                .or_else(|| value["incomplete_details"]["reason"].as_str())
                .unwrap_or("no reason given");
            JobStatus::Failed(format!("job ended with status `{}`: {}", other, reason))
        }
    }
}

/// 依次尝试message正文、reasoning摘要和output_text字段
pub fn extract_output_text(value: &Value) -> String {
    let output = value["output"].as_array().cloned().unwrap_or_default();

    let collect = |block_type: &str, field: &str| -> String {
        output
            .iter()
            .filter(|block| block["type"] == block_type)
            .flat_map(|block| block[field].as_array().cloned().unwrap_or_default())
            .filter_map(|part| part["text"].as_str().map(str::to_string))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let message = collect("message", "content");
    if !message.trim().is_empty() {
        return message;
    }
    let reasoning = collect("reasoning", "summary");
    if !reasoning.trim().is_empty() {
        return reasoning;
    }
    value["output_text"].as_str().unwrap_or_default().to_string()
}
