//! 调研阶段：获取深度调研文档并解析为结构化实体，两步都经过内容寻址缓存

use tracing::warn;

use crate::cache::{CacheScope, fingerprint};
use crate::error::{HorizonError, HorizonResult};
use crate::generator::context::GeneratorContext;
use crate::generator::types::Generator;
use crate::llm::client::utils::heuristic_topics;
use crate::types::research::{DocumentSource, ExtractedEntities, ResearchDocument};

/// 获取调研文档：已有文件 > 缓存 > 生成
pub struct DocumentAcquirer;

impl DocumentAcquirer {
    pub fn cache_fingerprint(context: &GeneratorContext) -> String {
        fingerprint(&[
            ("topic", context.config.topic.as_str()),
            ("model", context.llm_client.deep_research_model_key().as_str()),
        ])
    }
}

impl Generator<(ResearchDocument, DocumentSource)> for DocumentAcquirer {
    async fn execute(
        &self,
        context: &GeneratorContext,
    ) -> HorizonResult<(ResearchDocument, DocumentSource)> {
        let topic = context.config.topic.as_str();

        if let Some(path) = &context.config.research_document {
            let body = tokio::fs::read_to_string(path).await?;
            if body.trim().is_empty() {
                return Err(HorizonError::Config(format!(
                    "research document {} is empty",
                    path.display()
                )));
            }
            println!("   📄 使用已有调研文档: {}", path.display());
            return Ok((
                ResearchDocument::new(topic, body),
                DocumentSource::File(path.clone()),
            ));
        }

        let fingerprint = Self::cache_fingerprint(context);
        match context
            .cache_manager
            .get::<ResearchDocument>(CacheScope::DEEP_RESEARCH, &fingerprint)
            .await
        {
            Ok(Some(document)) => {
                println!("   ✅ 使用缓存的调研文档");
                return Ok((document, DocumentSource::Cache));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "deep research cache lookup failed"),
        }

        println!("   🔍 正在生成深度调研文档: {}", topic);
        let body = context.llm_client.generate_long_document(topic).await?;
        let document = ResearchDocument::new(topic, body);

        if let Err(e) = context
            .cache_manager
            .put(CacheScope::DEEP_RESEARCH, &fingerprint, &document)
            .await
        {
            warn!(error = %e, "failed to cache deep research document");
        }

        Ok((document, DocumentSource::Generated))
    }
}

/// 将调研文档解析为结构化实体
pub struct EntityParser<'a> {
    pub document: &'a ResearchDocument,
}

impl EntityParser<'_> {
    pub fn cache_fingerprint(&self) -> String {
        fingerprint(&[
            ("topic", self.document.topic.as_str()),
            ("document_hash", self.document.content_hash().as_str()),
        ])
    }

    /// 解析失败后的启发式兜底，结果不写入缓存
    fn heuristic_fallback(&self, error: HorizonError) -> HorizonResult<ExtractedEntities> {
        let topics = heuristic_topics(&self.document.body);
        if topics.is_empty() {
            return Err(error);
        }
        warn!(error = %error, topics = topics.len(), "entity parsing failed, using heading heuristic");
        println!("   ⚠️ 结构化解析失败，使用标题启发式提取 {} 个主题", topics.len());
        Ok(ExtractedEntities {
            topics,
            concepts: Vec::new(),
            entities: Vec::new(),
        })
    }
}

impl Generator<ExtractedEntities> for EntityParser<'_> {
    async fn execute(&self, context: &GeneratorContext) -> HorizonResult<ExtractedEntities> {
        let fingerprint = self.cache_fingerprint();
        match context
            .cache_manager
            .get::<ExtractedEntities>(CacheScope::PARSED_ENTITIES, &fingerprint)
            .await
        {
            Ok(Some(entities)) => {
                println!("   ✅ 使用缓存的解析结果");
                return Ok(entities);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "parsed entities cache lookup failed"),
        }

        println!("   🧩 正在解析调研文档...");
        let parsed = context
            .llm_client
            .parse_to_entities(&self.document.topic, &self.document.body)
            .await;

        let entities = match parsed {
            Ok(entities) => entities,
            Err(e @ (HorizonError::Schema { .. } | HorizonError::LlmCall { .. }))
                if context.config.scan.heuristic_parse_fallback =>
            {
                return self.heuristic_fallback(e);
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = context
            .cache_manager
            .put(CacheScope::PARSED_ENTITIES, &fingerprint, &entities)
            .await
        {
            warn!(error = %e, "failed to cache parsed entities");
        }

        println!(
            "   ✅ 解析完成: {} 个主题, {} 个概念, {} 个实体",
            entities.topics.len(),
            entities.concepts.len(),
            entities.entities.len()
        );
        Ok(entities)
    }
}
