use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::generator::context::GeneratorContext;
use crate::generator::workflow::PipelineOutput;
use crate::types::research::{DocumentSource, ParsedResearch};

/// 文件名中的时间戳格式
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// 保存本次运行的产物
pub async fn save(context: &GeneratorContext, output: &PipelineOutput) -> Result<SavedArtifacts> {
    let outlet = DiskOutlet::new(
        context.config.output_path.clone(),
        context.config.results_path(),
    );
    outlet.save(output).await
}

#[allow(async_fn_in_trait)]
pub trait Outlet {
    async fn save(&self, output: &PipelineOutput) -> Result<SavedArtifacts>;
}

/// 已写入的产物路径
#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifacts {
    /// 仅当调研文档由本次运行生成或来自缓存时写出
    pub research_document: Option<PathBuf>,
    pub parsed_entities: PathBuf,
    pub scan_results: PathBuf,
}

pub struct DiskOutlet {
    output_dir: PathBuf,
    results_dir: PathBuf,
}

impl DiskOutlet {
    pub fn new(output_dir: PathBuf, results_dir: PathBuf) -> Self {
        Self {
            output_dir,
            results_dir,
        }
    }

    /// 先写临时文件再重命名，产物要么完整要么不存在
    async fn write_atomic(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| format!("Failed to move into {}", path.display()));
        }
        Ok(())
    }
}

impl Outlet for DiskOutlet {
    async fn save(&self, output: &PipelineOutput) -> Result<SavedArtifacts> {
        println!("\n🖊️ 结果存储中...");
        let ts = output.result.timestamp.format(TIMESTAMP_FORMAT).to_string();

        let research_document = match &output.document_source {
            DocumentSource::File(_) => None,
            DocumentSource::Generated | DocumentSource::Cache => {
                let path = self.output_dir.join(format!("dr_{}.md", ts));
                Self::write_atomic(&path, &output.document.to_markdown()).await?;
                println!("💾 已保存调研文档: {}", path.display());
                Some(path)
            }
        };

        let source_document = match (&output.document_source, &research_document) {
            (DocumentSource::File(path), _) => path.display().to_string(),
            (_, Some(path)) => path.display().to_string(),
            (_, None) => String::new(),
        };
        let parsed = ParsedResearch {
            topic: output.document.topic.clone(),
            source_document,
            source_hash: output.document.content_hash(),
            entities: output.entities.clone(),
        };
        let parsed_entities = self.output_dir.join(format!("parsed_{}.json", ts));
        let content = serde_json::to_string_pretty(&parsed)?;
        Self::write_atomic(&parsed_entities, &content).await?;
        println!("💾 已保存解析结果: {}", parsed_entities.display());

        let scan_results = self
            .results_dir
            .join(format!("horizon_scan_results_{}.json", ts));
        let content = serde_json::to_string_pretty(&output.result)?;
        Self::write_atomic(&scan_results, &content).await?;
        println!("💾 已保存扫描结果: {}", scan_results.display());

        Ok(SavedArtifacts {
            research_document,
            parsed_entities,
            scan_results,
        })
    }
}
