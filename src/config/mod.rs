use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 深度调研的执行方式
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeepResearchMode {
    /// 提交后台任务并轮询
    #[default]
    Background,
    /// 单次同步调用
    Direct,
}

/// 搜索主端点失败时的回退策略
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// 主端点返回404时切换到旧版端点
    #[default]
    OnNotFound,
    /// 从不回退
    Never,
}

/// 各类重试次数的上限
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 调研主题
    pub topic: String,

    /// 输出路径
    pub output_path: PathBuf,

    /// 已有的深度调研文档，提供时跳过生成
    pub research_document: Option<PathBuf>,

    /// 跳过网络搜索，智能体只构建领域地图
    pub skip_web_search: bool,

    /// 跳过情景提取与评分
    pub no_scenario_scoring: bool,

    /// 强制重新生成（绕过缓存读取，但仍写入缓存）
    pub force_refresh: bool,

    /// 是否启用详细日志
    pub verbose: bool,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 搜索配置
    pub search: SearchConfig,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 扫描阶段配置
    pub scan: ScanConfig,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 常规推理使用的模型（解析、领域地图、相关性评分、情景评分）
    pub model: String,

    /// 深度调研使用的模型
    pub model_deep_research: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 首次重试间隔（毫秒），之后指数增长
    pub retry_delay_ms: u64,

    /// 单次请求超时时间（秒）
    pub timeout_seconds: u64,

    /// 深度调研配置
    pub deep_research: DeepResearchConfig,
}

/// 深度调研任务配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DeepResearchConfig {
    pub mode: DeepResearchMode,

    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,

    /// 最大轮询次数
    pub max_poll_cycles: u32,

    /// 单次轮询遇到传输错误时的重试次数
    pub poll_retry_attempts: u32,
}

/// 搜索配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// 搜索 API KEY
    pub api_key: String,

    /// 主端点
    pub endpoint: String,

    /// 旧版端点
    pub legacy_endpoint: String,

    pub fallback_policy: FallbackPolicy,

    /// 每个查询的最大结果数
    pub max_results: usize,

    /// 每条结果的最大字符数
    pub max_chars_per_result: usize,

    /// 重试次数
    pub retry_attempts: u32,

    /// 退避基数（毫秒）
    pub backoff_base_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,
}

/// 扫描阶段配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ScanConfig {
    /// 单个智能体的超时时间（秒）
    pub agent_timeout_seconds: u64,

    /// 解析失败时是否退回到基于标题的启发式主题提取
    pub heuristic_parse_fallback: bool,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            anyhow::bail!("topic cannot be empty");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!(
                "temperature must be between 0.0 and 2.0, got: {}",
                self.llm.temperature
            );
        }
        if self.llm.retry_attempts == 0 {
            anyhow::bail!("llm.retry_attempts must be at least 1");
        }
        if self.llm.deep_research.max_poll_cycles == 0 {
            anyhow::bail!("llm.deep_research.max_poll_cycles must be at least 1");
        }
        if self.search.retry_attempts == 0 {
            anyhow::bail!("search.retry_attempts must be at least 1");
        }
        for (name, attempts) in [
            ("llm.retry_attempts", self.llm.retry_attempts),
            (
                "llm.deep_research.poll_retry_attempts",
                self.llm.deep_research.poll_retry_attempts,
            ),
            ("search.retry_attempts", self.search.retry_attempts),
        ] {
            if attempts > MAX_RETRY_ATTEMPTS {
                anyhow::bail!(
                    "{} must be at most {}, got: {}",
                    name,
                    MAX_RETRY_ATTEMPTS,
                    attempts
                );
            }
        }
        if self.search.fallback_policy == FallbackPolicy::OnNotFound
            && self.search.legacy_endpoint == self.search.endpoint
        {
            anyhow::bail!("search.legacy_endpoint must differ from search.endpoint when fallback is enabled");
        }
        if self.search.max_results == 0 {
            anyhow::bail!("search.max_results must be at least 1");
        }
        Ok(())
    }

    /// 结果文件目录
    pub fn results_path(&self) -> PathBuf {
        self.output_path.join("results")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic: String::new(),
            output_path: PathBuf::from("."),
            research_document: None,
            skip_web_search: false,
            no_scenario_scoring: false,
            force_refresh: false,
            verbose: false,
            llm: LLMConfig::default(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

fn env_or(primary: &str, fallback: &str) -> String {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .unwrap_or_default()
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: env_or("HORIZON_LLM_API_KEY", "OPENAI_API_KEY"),
            api_base_url: String::from("https://api.openai.com/v1"),
            model: String::from("gpt-4.1-mini"),
            model_deep_research: String::from("o4-mini-deep-research"),
            max_tokens: 16384,
            temperature: 0.2,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 120,
            deep_research: DeepResearchConfig::default(),
        }
    }
}

impl Default for DeepResearchConfig {
    fn default() -> Self {
        Self {
            mode: DeepResearchMode::default(),
            poll_interval_ms: 10_000,
            max_poll_cycles: 180,
            poll_retry_attempts: 3,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: env_or("HORIZON_SEARCH_API_KEY", "PARALLEL_AI_API_KEY"),
            endpoint: String::from("https://api.parallel.ai/v1beta/search"),
            legacy_endpoint: String::from("https://api.parallel.ai/v1/search"),
            fallback_policy: FallbackPolicy::default(),
            max_results: 5,
            max_chars_per_result: 1500,
            retry_attempts: 3,
            backoff_base_ms: 400,
            timeout_seconds: 15,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".horizon/cache"),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            agent_timeout_seconds: 900,
            heuristic_parse_fallback: false,
        }
    }
}
