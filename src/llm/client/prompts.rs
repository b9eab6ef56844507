use crate::types::category::SteepvCategory;
use crate::types::research::ExtractedEntities;
use crate::types::scenario::ScenarioDraft;
use crate::types::signal::SearchHit;

use super::utils::truncate_chars;

pub const DEEP_RESEARCH_SYSTEM: &str = "You are a horizon-scanning analyst. Produce a long-form, well-structured markdown research report with sections for key themes, emerging developments, actors, uncertainties and plausible future scenarios (use headings of the form `## Scenario 1: <title>`).";

pub const PARSE_SYSTEM: &str = "You extract structured entities from research reports.";

pub const DOMAIN_MAP_SYSTEM: &str = "You build three-tier topic maps for horizon scanning: core sub-topics central to the category, adjacent sub-topics from neighbouring fields, and peripheral sub-topics where weak signals may appear. Each sub-topic must be usable as a web search query.";

pub const RELEVANCE_SYSTEM: &str = "You judge whether a web search result is a signal of change for a research area within one STEEPV category. Reply with a JSON object {\"relevant\": bool, \"description\": string, \"relevance\": string}.";

pub const SCENARIO_DRAFT_SYSTEM: &str =
    "You draft distinct, plausible future scenarios from a set of observed signals of change.";

pub const SCENARIO_SCORE_SYSTEM: &str = "You evaluate future scenarios on novelty, plausibility, impact, clarity and uncertainty_coverage, each an integer from 1 to 5, with a short explanation.";

const MAX_SCENARIO_TITLE_CHARS: usize = 140;
const MAX_SCENARIO_BODY_CHARS: usize = 2000;
const MAX_DOCUMENT_CHARS: usize = 60_000;

pub fn deep_research_user(topic: &str) -> String {
    format!(
        "Conduct deep research on the following topic and write the full report.\n\nTopic: {}",
        topic
    )
}

pub fn parse_user(topic: &str, document: &str) -> String {
    format!(
        "Research topic: {}\n\nExtract the key topics (most important first), concepts and named entities from this report:\n\n{}",
        topic,
        truncate_chars(document, MAX_DOCUMENT_CHARS)
    )
}

pub fn domain_map_user(category: SteepvCategory, entities: &ExtractedEntities) -> String {
    format!(
        "Category: {}\n\nKey topics: {}\nConcepts: {}\nEntities: {}\n\nBuild the {} domain map.",
        category,
        entities.topics.join("; "),
        entities.concepts.join("; "),
        entities.entities.join("; "),
        category
    )
}

pub fn relevance_user(research_area: &str, category: SteepvCategory, hit: &SearchHit) -> String {
    format!(
        "Research area: {}\nCategory: {}\n\nTitle: {}\nURL: {}\nContent: {}",
        research_area, category, hit.title, hit.url, hit.snippet
    )
}

pub fn scenario_draft_user(topic: &str, signal_titles: &[String]) -> String {
    format!(
        "Research topic: {}\n\nObserved signals:\n- {}\n\nDraft three to five future scenarios.",
        topic,
        signal_titles.join("\n- ")
    )
}

pub fn scenario_score_user(topic: &str, drafts: &[ScenarioDraft]) -> String {
    let listing = drafts
        .iter()
        .enumerate()
        .map(|(i, draft)| {
            format!(
                "{}. {}\n{}",
                i + 1,
                truncate_chars(&draft.title, MAX_SCENARIO_TITLE_CHARS),
                truncate_chars(&draft.body, MAX_SCENARIO_BODY_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Research topic: {}\n\nScore each scenario, keeping the titles unchanged:\n\n{}",
        topic, listing
    )
}

/// 结构化调用的系统提示词附加schema约束
pub fn with_schema(system: &str, schema: &str) -> String {
    format!(
        "{}\n\nRespond with a single JSON object that matches this JSON schema. Do not add any prose.\n{}",
        system, schema
    )
}

/// 修复重试时把校验错误追加到用户提示词
pub fn with_repair_note(user: &str, diagnostic: &str) -> String {
    format!(
        "{}\n\n**Note** The previous reply failed validation with the error \"{}\". Avoid this error and return only JSON matching the schema.",
        user, diagnostic
    )
}
