use crate::config::{Config, DeepResearchMode, LLMProvider};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "horizon.toml";

/// Horizon Scan - 基于LLM深度调研与STEEPV多智能体的地平线扫描工具
#[derive(Parser, Debug)]
#[command(name = "horizon-scan")]
#[command(
    about = "Horizon scanning pipeline: deep research, entity parsing, six concurrent STEEPV agents searching the web for signals of change, and scenario scoring."
)]
#[command(version)]
pub struct Args {
    /// 调研主题
    #[arg(short, long)]
    pub topic: Option<String>,

    /// 输出路径
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 已有的深度调研文档，提供时不再生成
    #[arg(short = 'd', long)]
    pub research_document: Option<PathBuf>,

    /// 跳过网络搜索，只构建领域地图
    #[arg(long)]
    pub skip_web_search: bool,

    /// 跳过情景提取与评分
    #[arg(long)]
    pub no_scenario_scoring: bool,

    /// 强制重新生成（绕过缓存读取）
    #[arg(long)]
    pub force_refresh: bool,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 默认日志级别 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// 以JSON格式输出日志
    #[arg(long)]
    pub log_json: bool,

    /// LLM Provider (openai, deepseek, anthropic, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 常规推理模型
    #[arg(long)]
    pub model: Option<String>,

    /// 深度调研模型
    #[arg(long)]
    pub model_deep_research: Option<String>,

    /// 深度调研执行方式 (background, direct)
    #[arg(long)]
    pub deep_research_mode: Option<String>,

    /// 深度调研轮询间隔（毫秒）
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// 深度调研最大轮询次数
    #[arg(long)]
    pub max_poll_cycles: Option<u32>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 搜索 API KEY
    #[arg(long)]
    pub search_api_key: Option<String>,

    /// 每个查询的最大搜索结果数
    #[arg(long)]
    pub max_results: Option<usize>,

    /// 缓存目录
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// 是否禁用缓存
    #[arg(long)]
    pub no_cache: bool,

    /// 单个智能体的超时时间（秒）
    #[arg(long)]
    pub agent_timeout_seconds: Option<u64>,

    /// 解析失败时退回到基于标题的主题提取
    #[arg(long)]
    pub heuristic_parse_fallback: bool,
}

impl Args {
    /// 将CLI参数转换为配置，命令行优先于配置文件
    pub fn into_config(self) -> Result<Config> {
        let mut config = if let Some(config_path) = &self.config {
            Config::from_file(config_path)
                .with_context(|| format!("无法读取配置文件 {:?}", config_path))?
        } else {
            let default_config_path = std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(DEFAULT_CONFIG_FILE);

            if default_config_path.exists() {
                Config::from_file(&default_config_path).with_context(|| {
                    format!("无法读取默认配置文件 {:?}", default_config_path)
                })?
            } else {
                Config::default()
            }
        };

        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        if let Some(output_path) = self.output_path {
            config.output_path = output_path;
        }
        if let Some(research_document) = self.research_document {
            config.research_document = Some(research_document);
        }

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            config.llm.provider = provider_str
                .parse::<LLMProvider>()
                .map_err(anyhow::Error::msg)?;
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }
        if let Some(model_deep_research) = self.model_deep_research {
            config.llm.model_deep_research = model_deep_research;
        }
        if let Some(mode) = self.deep_research_mode {
            config.llm.deep_research.mode = match mode.to_lowercase().as_str() {
                "background" => DeepResearchMode::Background,
                "direct" => DeepResearchMode::Direct,
                other => anyhow::bail!("Unknown deep research mode: {}", other),
            };
        }
        if let Some(poll_interval_ms) = self.poll_interval_ms {
            config.llm.deep_research.poll_interval_ms = poll_interval_ms;
        }
        if let Some(max_poll_cycles) = self.max_poll_cycles {
            config.llm.deep_research.max_poll_cycles = max_poll_cycles;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        // 搜索配置
        if let Some(search_api_key) = self.search_api_key {
            config.search.api_key = search_api_key;
        }
        if let Some(max_results) = self.max_results {
            config.search.max_results = max_results;
        }

        // 缓存配置
        if let Some(cache_dir) = self.cache_dir {
            config.cache.cache_dir = cache_dir;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }

        // 扫描配置
        if let Some(agent_timeout_seconds) = self.agent_timeout_seconds {
            config.scan.agent_timeout_seconds = agent_timeout_seconds;
        }
        if self.heuristic_parse_fallback {
            config.scan.heuristic_parse_fallback = true;
        }

        // 开关只在命令行显式给出时覆盖配置文件
        config.skip_web_search |= self.skip_web_search;
        config.no_scenario_scoring |= self.no_scenario_scoring;
        config.force_refresh |= self.force_refresh;
        config.verbose |= self.verbose;

        Ok(config)
    }
}
