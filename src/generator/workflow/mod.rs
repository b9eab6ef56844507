use crate::config::Config;
use crate::error::{HorizonError, HorizonResult};
use crate::generator::context::GeneratorContext;
use crate::generator::outlet::{self, SavedArtifacts};
use crate::generator::research::{DocumentAcquirer, EntityParser};
use crate::generator::scan::ScanOrchestrator;
use crate::generator::scenario::ScenarioStage;
use crate::generator::types::Generator;
use crate::types::research::{DocumentSource, ExtractedEntities, ResearchDocument};
use crate::types::signal::ScanResult;

use anyhow::Result;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// 时间跟踪作用域，阶段按开始顺序报告
pub struct TimingScope {
    start_time: Instant,
    running: Vec<(String, Instant)>,
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            running: Vec::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.running.push((phase_name.to_string(), Instant::now()));
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let index = self.running.iter().position(|(name, _)| name == phase_name)?;
        let (name, started) = self.running.remove(index);
        let duration = started.elapsed();
        self.phase_durations.push((name, duration));
        Some(duration)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const ACQUIRE_DOCUMENT: &'static str = "acquire_document";
    pub const PARSE: &'static str = "parse";
    pub const SCAN: &'static str = "scan";
    pub const SCENARIOS: &'static str = "scenarios";
    pub const OUTPUT: &'static str = "output";
}

/// 一次完整运行的产物，落盘由调用方负责
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub document: ResearchDocument,
    pub document_source: DocumentSource,
    pub entities: ExtractedEntities,
    pub result: ScanResult,
}

/// 五阶段流水线：获取文档 → 解析 → 扇出扫描 → 汇总 → 情景（可选）
pub struct Pipeline {
    context: GeneratorContext,
}

impl Pipeline {
    pub fn new(context: GeneratorContext) -> Self {
        Self { context }
    }

    pub async fn run(&self) -> HorizonResult<PipelineOutput> {
        let mut timing = TimingScope::new();
        self.execute(&mut timing).await
    }

    pub async fn execute(&self, timing: &mut TimingScope) -> HorizonResult<PipelineOutput> {
        let context = &self.context;

        println!("\n📚 阶段1: 获取深度调研文档");
        timing.start_phase(TimingKeys::ACQUIRE_DOCUMENT);
        let (document, document_source) = DocumentAcquirer
            .execute(context)
            .await
            .map_err(|e| HorizonError::pipeline(TimingKeys::ACQUIRE_DOCUMENT, e))?;
        timing.end_phase(TimingKeys::ACQUIRE_DOCUMENT);

        println!("\n🧩 阶段2: 解析结构化实体");
        timing.start_phase(TimingKeys::PARSE);
        let entities = EntityParser {
            document: &document,
        }
        .execute(context)
        .await
        .map_err(|e| HorizonError::pipeline(TimingKeys::PARSE, e))?;
        timing.end_phase(TimingKeys::PARSE);

        println!("\n🛰️ 阶段3-4: STEEPV扫描与汇总");
        timing.start_phase(TimingKeys::SCAN);
        let outcome = ScanOrchestrator::new(entities.clone())
            .execute(context)
            .await?;
        timing.end_phase(TimingKeys::SCAN);

        let mut warnings = outcome.warnings;
        let scenarios = if context.config.no_scenario_scoring {
            None
        } else {
            println!("\n🔮 阶段5: 情景提取与评分");
            timing.start_phase(TimingKeys::SCENARIOS);
            let stage = ScenarioStage {
                document: &document,
                signals: &outcome.signals_by_category,
            };
            let scenarios = match stage.execute(context).await {
                Ok(scenarios) => Some(scenarios),
                Err(HorizonError::Cancelled) => return Err(HorizonError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "scenario stage failed");
                    warnings.push(format!("scenario stage failed: {}", e));
                    None
                }
            };
            timing.end_phase(TimingKeys::SCENARIOS);
            scenarios
        };

        if context.cancel.is_cancelled() {
            return Err(HorizonError::Cancelled);
        }

        let result = ScanResult::new(
            context.config.topic.clone(),
            outcome.signals_by_category,
            outcome.domain_maps,
            outcome.failed_categories,
            scenarios,
            warnings,
        );

        Ok(PipelineOutput {
            document,
            document_source,
            entities,
            result,
        })
    }
}

/// 在给定上下文上执行流水线并保存产物
pub async fn execute_and_save(
    context: &GeneratorContext,
    timing: &mut TimingScope,
) -> Result<(PipelineOutput, SavedArtifacts)> {
    let output = Pipeline::new(context.clone()).execute(timing).await?;

    timing.start_phase(TimingKeys::OUTPUT);
    let saved = outlet::save(context, &output).await?;
    timing.end_phase(TimingKeys::OUTPUT);

    Ok((output, saved))
}

fn print_summary(output: &PipelineOutput) {
    let summary = &output.result.summary;
    println!("\n📊 扫描摘要: 共 {} 条信号", summary.total_signals);
    for (category, count) in &summary.signals_per_category {
        println!("   - {}: {}", category, count);
    }
    if !summary.failed_categories.is_empty() {
        println!("   ⚠️ 失败的类别: {:?}", summary.failed_categories);
    }
    if let Some(count) = summary.scenario_count {
        println!("   🔮 情景: {}", count);
    }
    for warning in &output.result.warnings {
        eprintln!("⚠️ {}", warning);
    }
}

/// 启动地平线扫描工作流
pub async fn launch(config: &Config, cancel: CancellationToken) -> Result<()> {
    config.validate()?;
    let context = GeneratorContext::new(config.clone(), cancel)?;

    println!("🚀 开始地平线扫描: {}", config.topic);
    let mut timing = TimingScope::new();
    let (output, _saved) = execute_and_save(&context, &mut timing).await?;

    print_summary(&output);
    println!(
        "\n📈 缓存统计: {}",
        context
            .cache_manager
            .generate_performance_report()
            .summary_line()
    );
    println!("\n⏱️ {}", timing.generate_timing_report());

    Ok(())
}
