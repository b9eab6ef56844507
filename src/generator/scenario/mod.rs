//! 情景阶段：从调研文档提取候选情景（缺失时由信号起草），再由LLM评分

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::HorizonResult;
use crate::generator::context::GeneratorContext;
use crate::generator::types::Generator;
use crate::types::category::SteepvCategory;
use crate::types::research::ResearchDocument;
use crate::types::scenario::{Scenario, ScenarioDraft, ScenarioScore};
use crate::types::signal::Signal;

static SCENARIO_HEADING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{2,4}\s+Scenario\b(?:\s+\d+)?\s*[:\-.]?\s*(.*)$").ok()
});

static SECTION_HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^#{2,3}\s+").ok());

/// 起草情景时最多参考的信号数
const MAX_SIGNAL_TITLES: usize = 40;

/// 按标题启发式从markdown中提取情景，正文为空的情景被丢弃
pub fn extract_scenarios(document: &str) -> Vec<ScenarioDraft> {
    let (Some(scenario_heading), Some(section_heading)) =
        (SCENARIO_HEADING.as_ref(), SECTION_HEADING.as_ref())
    else {
        return Vec::new();
    };

    let mut scenarios = Vec::new();
    let mut current: Option<ScenarioDraft> = None;

    let mut finish = |draft: Option<ScenarioDraft>, scenarios: &mut Vec<ScenarioDraft>| {
        if let Some(mut draft) = draft {
            draft.body = draft.body.trim().to_string();
            if !draft.body.is_empty() {
                scenarios.push(draft);
            }
        }
    };

    for line in document.lines() {
        if let Some(captures) = scenario_heading.captures(line.trim()) {
            finish(current.take(), &mut scenarios);
            let title = captures
                .get(1)
                .map(|m| m.as_str().trim())
                .filter(|t| !t.is_empty())
                .unwrap_or("Untitled Scenario");
            current = Some(ScenarioDraft {
                title: title.to_string(),
                body: String::new(),
            });
        } else if let Some(draft) = current.as_mut() {
            if section_heading.is_match(line) {
                finish(current.take(), &mut scenarios);
            } else {
                draft.body.push_str(line);
                draft.body.push('\n');
            }
        }
    }
    finish(current.take(), &mut scenarios);
    scenarios
}

/// LLM评分不可用时的统一中性评分
pub fn heuristic_score(draft: &ScenarioDraft) -> ScenarioScore {
    let mut score = ScenarioScore {
        title: draft.title.clone(),
        novelty: 3,
        plausibility: 3,
        impact: 3,
        clarity: 3,
        uncertainty_coverage: 2,
        explanation: "Heuristic fallback scoring due to LLM parse failure.".to_string(),
        overall_score: None,
    };
    score.overall_score = Some(score.weighted_score());
    score
}

/// 按标题（忽略大小写）匹配评分，其次按位置，都没有时使用启发式评分
fn pair_scores(drafts: &[ScenarioDraft], scores: &[ScenarioScore]) -> Vec<Scenario> {
    drafts
        .iter()
        .enumerate()
        .map(|(i, draft)| {
            let by_title = scores
                .iter()
                .find(|s| s.title.trim().eq_ignore_ascii_case(draft.title.trim()));
            match by_title.or_else(|| scores.get(i)) {
                Some(score) => Scenario::from_score(draft, score),
                None => Scenario::from_score(draft, &heuristic_score(draft)),
            }
        })
        .collect()
}

pub struct ScenarioStage<'a> {
    pub document: &'a ResearchDocument,
    pub signals: &'a BTreeMap<SteepvCategory, Vec<Signal>>,
}

impl Generator<Vec<Scenario>> for ScenarioStage<'_> {
    async fn execute(&self, context: &GeneratorContext) -> HorizonResult<Vec<Scenario>> {
        let topic = context.config.topic.as_str();
        let mut drafts = extract_scenarios(&self.document.body);

        if drafts.is_empty() {
            let titles: Vec<String> = self
                .signals
                .values()
                .flatten()
                .map(|signal| signal.title.clone())
                .take(MAX_SIGNAL_TITLES)
                .collect();
            if titles.is_empty() {
                println!("   ⚠️ 文档中没有情景且没有信号，跳过情景评分");
                return Ok(Vec::new());
            }
            println!("   ✍️ 文档中没有情景，根据 {} 条信号起草", titles.len());
            drafts = context.llm_client.draft_scenarios(topic, &titles).await?;
        } else {
            println!("   📑 从调研文档中提取到 {} 个情景", drafts.len());
        }

        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let scores = match context.llm_client.score_scenarios(topic, &drafts).await {
            Ok(scores) => scores,
            Err(e) if e.is_unrecoverable() => return Err(e),
            Err(e) => {
                warn!(error = %e, "scenario scoring failed, using heuristic scores");
                drafts.iter().map(heuristic_score).collect()
            }
        };

        Ok(pair_scores(&drafts, &scores))
    }
}
