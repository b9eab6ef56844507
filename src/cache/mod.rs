use anyhow::Result;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

use crate::config::CacheConfig;

pub mod performance_monitor;
pub use performance_monitor::{CachePerformanceMonitor, CachePerformanceReport};

/// 缓存分类
pub struct CacheScope;

impl CacheScope {
    pub const DEEP_RESEARCH: &'static str = "deep_research";
    pub const PARSED_ENTITIES: &'static str = "parsed_entities";
}

/// 缓存管理器
///
/// 以输入参数的指纹为键做内容寻址，条目不会自动过期。
pub struct CacheManager {
    config: CacheConfig,
    force_refresh: bool,
    performance_monitor: CachePerformanceMonitor,
}

/// 缓存条目
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// 规范化输入参数的MD5指纹
    pub fingerprint: String,
    pub payload: T,
    pub created_at: DateTime<Utc>,
}

/// 计算文本内容的MD5哈希
pub fn fingerprint_text(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 对一组命名输入做规范化后计算指纹，与传入顺序无关
pub fn fingerprint(inputs: &[(&str, &str)]) -> String {
    let canonical: BTreeMap<&str, &str> = inputs.iter().copied().collect();
    let encoded = canonical
        .iter()
        .map(|(k, v)| format!("{}={}", k, serde_json::Value::from(*v)))
        .collect::<Vec<_>>()
        .join("\n");
    fingerprint_text(&encoded)
}

impl CacheManager {
    pub fn new(config: CacheConfig, force_refresh: bool) -> Self {
        Self {
            config,
            force_refresh,
            performance_monitor: CachePerformanceMonitor::new(),
        }
    }

    /// 获取缓存文件路径
    fn get_cache_path(&self, category: &str, fingerprint: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(category)
            .join(format!("{}.json", fingerprint))
    }

    /// 获取缓存；force_refresh时总是未命中
    pub async fn get<T>(&self, category: &str, fingerprint: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !self.config.enabled {
            return Ok(None);
        }
        if self.force_refresh {
            self.performance_monitor.record_cache_bypass(category);
            return Ok(None);
        }

        let cache_path = self.get_cache_path(category, fingerprint);

        if !cache_path.exists() {
            self.performance_monitor.record_cache_miss(category);
            return Ok(None);
        }

        match fs::read_to_string(&cache_path).await {
            Ok(content) => match serde_json::from_str::<CacheEntry<T>>(&content) {
                Ok(entry) if entry.fingerprint == fingerprint => {
                    debug!(category, fingerprint, "cache hit");
                    self.performance_monitor.record_cache_hit(category);
                    Ok(Some(entry.payload))
                }
                Ok(_) => {
                    self.performance_monitor
                        .record_cache_error(category, "指纹不匹配");
                    Ok(None)
                }
                Err(e) => {
                    warn!(category, fingerprint, error = %e, "cache entry unreadable");
                    self.performance_monitor
                        .record_cache_error(category, &format!("反序列化失败: {}", e));
                    Ok(None)
                }
            },
            Err(e) => {
                self.performance_monitor
                    .record_cache_error(category, &format!("读取文件失败: {}", e));
                Ok(None)
            }
        }
    }

    /// 写入缓存，先写临时文件再重命名，保证条目要么完整要么不存在
    pub async fn put<T>(&self, category: &str, fingerprint: &str, payload: &T) -> Result<()>
    where
        T: Serialize,
    {
        if !self.config.enabled {
            return Ok(());
        }

        let cache_path = self.get_cache_path(category, fingerprint);

        // 确保目录存在
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            payload,
            created_at: Utc::now(),
        };

        let content = match serde_json::to_string_pretty(&entry) {
            Ok(content) => content,
            Err(e) => {
                self.performance_monitor
                    .record_cache_error(category, &format!("序列化失败: {}", e));
                return Err(e.into());
            }
        };

        let tmp_path = cache_path.with_extension("json.tmp");
        let write_result = async {
            fs::write(&tmp_path, content).await?;
            fs::rename(&tmp_path, &cache_path).await
        }
        .await;

        match write_result {
            Ok(_) => {
                self.performance_monitor.record_cache_write(category);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                self.performance_monitor
                    .record_cache_error(category, &format!("写入文件失败: {}", e));
                Err(e.into())
            }
        }
    }

    /// 生成性能报告
    pub fn generate_performance_report(&self) -> CachePerformanceReport {
        self.performance_monitor.generate_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::research::ExtractedEntities;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, force_refresh: bool) -> CacheManager {
        CacheManager::new(
            CacheConfig {
                enabled: true,
                cache_dir: dir.path().to_path_buf(),
            },
            force_refresh,
        )
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = fingerprint(&[("topic", "Quantum"), ("model", "o4")]);
        let b = fingerprint(&[("model", "o4"), ("topic", "Quantum")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        let c = fingerprint(&[("topic", "Quantum"), ("model", "o3")]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_separates_fields() {
        let a = fingerprint(&[("a", "x\nb=y")]);
        let b = fingerprint(&[("a", "x"), ("b", "y")]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, false);
        let entities = ExtractedEntities {
            topics: vec!["A".into()],
            concepts: vec![],
            entities: vec![],
        };

        assert!(
            cache
                .get::<ExtractedEntities>(CacheScope::PARSED_ENTITIES, "fp")
                .await
                .unwrap()
                .is_none()
        );
        cache
            .put(CacheScope::PARSED_ENTITIES, "fp", &entities)
            .await
            .unwrap();
        let loaded: ExtractedEntities = cache
            .get(CacheScope::PARSED_ENTITIES, "fp")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, entities);
        assert!(!dir.path().join("parsed_entities/fp.json.tmp").exists());

        let report = cache.generate_performance_report();
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.cache_misses, 1);
        assert_eq!(report.cache_writes, 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_get_but_still_puts() {
        let dir = TempDir::new().unwrap();
        manager(&dir, false)
            .put(CacheScope::DEEP_RESEARCH, "fp", &"old".to_string())
            .await
            .unwrap();

        let forced = manager(&dir, true);
        assert!(
            forced
                .get::<String>(CacheScope::DEEP_RESEARCH, "fp")
                .await
                .unwrap()
                .is_none()
        );
        forced
            .put(CacheScope::DEEP_RESEARCH, "fp", &"new".to_string())
            .await
            .unwrap();

        let reloaded: String = manager(&dir, false)
            .get(CacheScope::DEEP_RESEARCH, "fp")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded, "new");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CacheScope::PARSED_ENTITIES);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("fp.json"), "{not json").unwrap();

        let cache = manager(&dir, false);
        let loaded = cache
            .get::<ExtractedEntities>(CacheScope::PARSED_ENTITIES, "fp")
            .await
            .unwrap();
        assert!(loaded.is_none());
        assert_eq!(cache.generate_performance_report().cache_errors, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_writes() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(
            CacheConfig {
                enabled: false,
                cache_dir: dir.path().to_path_buf(),
            },
            false,
        );
        cache
            .put(CacheScope::DEEP_RESEARCH, "fp", &"text".to_string())
            .await
            .unwrap();
        assert!(!dir.path().join(CacheScope::DEEP_RESEARCH).exists());
    }
}
