use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// 缓存性能监控器
#[derive(Clone, Default)]
pub struct CachePerformanceMonitor {
    metrics: Arc<CacheMetrics>,
}

/// 缓存指标
#[derive(Default)]
pub struct CacheMetrics {
    /// 缓存命中次数
    pub cache_hits: AtomicUsize,
    /// 缓存未命中次数
    pub cache_misses: AtomicUsize,
    /// 缓存写入次数
    pub cache_writes: AtomicUsize,
    /// 缓存错误次数
    pub cache_errors: AtomicUsize,
    /// 因强制刷新被绕过的读取次数
    pub cache_bypasses: AtomicUsize,
    /// 分类统计数据
    pub category_metrics: RwLock<BTreeMap<String, CategoryMetrics>>,
}

/// 分类指标数据
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryMetrics {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
}

/// 缓存性能报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePerformanceReport {
    /// 缓存命中率
    pub hit_rate: f64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_writes: usize,
    pub cache_errors: usize,
    pub cache_bypasses: usize,
    pub category_stats: BTreeMap<String, CategoryMetrics>,
}

impl CachePerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_category(&self, category: &str, update: impl FnOnce(&mut CategoryMetrics)) {
        if let Ok(mut metrics) = self.metrics.category_metrics.write() {
            update(metrics.entry(category.to_string()).or_default());
        }
    }

    /// 记录缓存命中
    pub fn record_cache_hit(&self, category: &str) {
        self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.update_category(category, |m| m.hits += 1);
    }

    /// 记录缓存未命中
    pub fn record_cache_miss(&self, category: &str) {
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.update_category(category, |m| m.misses += 1);
    }

    /// 记录缓存写入
    pub fn record_cache_write(&self, category: &str) {
        self.metrics.cache_writes.fetch_add(1, Ordering::Relaxed);
        self.update_category(category, |m| m.writes += 1);
    }

    /// 记录强制刷新导致的读取绕过
    pub fn record_cache_bypass(&self, category: &str) {
        self.metrics.cache_bypasses.fetch_add(1, Ordering::Relaxed);
        self.update_category(category, |m| m.misses += 1);
    }

    /// 记录缓存错误
    pub fn record_cache_error(&self, category: &str, error: &str) {
        self.metrics.cache_errors.fetch_add(1, Ordering::Relaxed);
        warn!(category, error, "cache error");
    }

    /// 生成性能报告
    pub fn generate_report(&self) -> CachePerformanceReport {
        let cache_hits = self.metrics.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.metrics.cache_misses.load(Ordering::Relaxed);
        let cache_bypasses = self.metrics.cache_bypasses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses + cache_bypasses;
        let hit_rate = if lookups > 0 {
            cache_hits as f64 / lookups as f64
        } else {
            0.0
        };

        let category_stats = self
            .metrics
            .category_metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();

        CachePerformanceReport {
            hit_rate,
            cache_hits,
            cache_misses,
            cache_writes: self.metrics.cache_writes.load(Ordering::Relaxed),
            cache_errors: self.metrics.cache_errors.load(Ordering::Relaxed),
            cache_bypasses,
            category_stats,
        }
    }
}

impl CachePerformanceReport {
    /// 终端输出用的摘要
    pub fn summary_line(&self) -> String {
        format!(
            "命中 {} / 未命中 {} / 写入 {} / 绕过 {} / 错误 {}，命中率 {:.1}%",
            self.cache_hits,
            self.cache_misses,
            self.cache_writes,
            self.cache_bypasses,
            self.cache_errors,
            self.hit_rate * 100.0
        )
    }
}
