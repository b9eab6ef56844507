use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::CacheManager,
    config::Config,
    llm::client::LlmGateway,
    search::{ParallelSearchClient, SearchGateway},
};

/// 单次运行共享的只读上下文，创建后不再修改
#[derive(Clone)]
pub struct GeneratorContext {
    /// LLM网关，用于与AI通信。
    pub llm_client: LlmGateway,
    /// 网络搜索网关
    pub search: Arc<dyn SearchGateway>,
    /// 配置
    pub config: Arc<Config>,
    /// 缓存管理器
    pub cache_manager: Arc<CacheManager>,
    /// 外部取消信号
    pub cancel: CancellationToken,
}

impl GeneratorContext {
    /// 根据配置创建真实的网关
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        let llm_client = LlmGateway::new(&config.llm, cancel.clone())?;
        let search: Arc<dyn SearchGateway> =
            Arc::new(ParallelSearchClient::new(&config.search, cancel.clone())?);
        Ok(Self::with_gateways(config, llm_client, search, cancel))
    }

    /// 使用指定网关创建上下文
    pub fn with_gateways(
        config: Config,
        llm_client: LlmGateway,
        search: Arc<dyn SearchGateway>,
        cancel: CancellationToken,
    ) -> Self {
        let cache_manager = Arc::new(CacheManager::new(
            config.cache.clone(),
            config.force_refresh,
        ));
        Self {
            llm_client,
            search,
            config: Arc::new(config),
            cache_manager,
            cancel,
        }
    }
}
