use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 候选的未来情景
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ScenarioDraft {
    pub title: String,
    pub body: String,
}

/// LLM给出的情景评分，各项指标为1-5的整数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ScenarioScore {
    pub title: String,
    #[serde(default)]
    pub novelty: u8,
    #[serde(default)]
    pub plausibility: u8,
    #[serde(default)]
    pub impact: u8,
    #[serde(default)]
    pub clarity: u8,
    #[serde(default)]
    pub uncertainty_coverage: u8,
    #[serde(default)]
    pub explanation: String,
    /// 缺失时在本地按权重重新计算
    #[serde(default)]
    pub overall_score: Option<f64>,
}

impl ScenarioScore {
    /// impact*0.3 + plausibility*0.25 + novelty*0.2 + clarity*0.15 + uncertainty_coverage*0.1
    pub fn weighted_score(&self) -> f64 {
        let raw = f64::from(self.impact) * 0.3
            + f64::from(self.plausibility) * 0.25
            + f64::from(self.novelty) * 0.2
            + f64::from(self.clarity) * 0.15
            + f64::from(self.uncertainty_coverage) * 0.1;
        (raw * 100.0).round() / 100.0
    }
}

/// LLM评分的包装结构（JSON对象的顶层必须是对象）
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioScoreSheet {
    pub scores: Vec<ScenarioScore>,
}

/// LLM从信号中起草的情景集合
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioDraftSheet {
    pub scenarios: Vec<ScenarioDraft>,
}

/// 报告中的情景条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub title: String,
    pub body: String,
    pub novelty: u8,
    pub plausibility: u8,
    pub impact: u8,
    pub clarity: u8,
    pub uncertainty_coverage: u8,
    pub explanation: String,
    pub overall_score: f64,
}

impl Scenario {
    pub fn from_score(draft: &ScenarioDraft, score: &ScenarioScore) -> Self {
        Self {
            title: draft.title.clone(),
            body: draft.body.clone(),
            novelty: score.novelty,
            plausibility: score.plausibility,
            impact: score.impact,
            clarity: score.clarity,
            uncertainty_coverage: score.uncertainty_coverage,
            explanation: score.explanation.clone(),
            overall_score: score.overall_score.unwrap_or_else(|| score.weighted_score()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_score_rounding() {
        let score = ScenarioScore {
            title: "T".into(),
            novelty: 5,
            plausibility: 4,
            impact: 3,
            clarity: 2,
            uncertainty_coverage: 1,
            explanation: String::new(),
            overall_score: None,
        };
        // 0.9 + 1.0 + 1.0 + 0.3 + 0.1
        assert_eq!(score.weighted_score(), 3.3);

        let draft = ScenarioDraft {
            title: "T".into(),
            body: "B".into(),
        };
        let scenario = Scenario::from_score(&draft, &score);
        assert_eq!(scenario.overall_score, 3.3);
    }

    #[test]
    fn test_explicit_overall_score_is_kept() {
        let score: ScenarioScore =
            serde_json::from_str(r#"{"title":"T","impact":5,"overall_score":4.75}"#).unwrap();
        let draft = ScenarioDraft {
            title: "T".into(),
            body: "B".into(),
        };
        assert_eq!(Scenario::from_score(&draft, &score).overall_score, 4.75);
        assert_eq!(score.novelty, 0);
    }
}
