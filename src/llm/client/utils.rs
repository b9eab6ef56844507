use serde::de::DeserializeOwned;
use std::collections::HashSet;

/// 文档中常见但不构成调研主题的标题
const BOILERPLATE_HEADINGS: &[&str] = &[
    "introduction",
    "overview",
    "summary",
    "executive summary",
    "conclusion",
    "conclusions",
    "references",
    "sources",
    "bibliography",
    "appendix",
    "table of contents",
    "methodology",
];

const MAX_HEURISTIC_TOPICS: usize = 20;

/// 从模型回复中截取JSON正文，兼容```json围栏和前后多余的说明文字
pub fn extract_json_block(reply: &str) -> &str {
    let trimmed = reply.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        // 跳过围栏上的语言标记
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
        return body.trim();
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// 解析结构化回复，失败时返回可回传给模型的诊断信息
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T, String> {
    let body = extract_json_block(reply);
    if body.is_empty() {
        return Err("empty response".to_string());
    }
    serde_json::from_str::<T>(body).map_err(|e| e.to_string())
}

/// 基于markdown标题的启发式主题提取
pub fn heuristic_topics(document: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    document
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let level = line.chars().take_while(|c| *c == '#').count();
            if level == 0 || level > 4 {
                return None;
            }
            let heading = line[level..].trim();
            let heading = heading
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim()
                .trim_matches('*')
                .trim();
            if heading.len() < 3
                || BOILERPLATE_HEADINGS.contains(&heading.to_lowercase().as_str())
            {
                return None;
            }
            Some(heading.to_string())
        })
        .filter(|heading| seen.insert(heading.to_lowercase()))
        .take(MAX_HEURISTIC_TOPICS)
        .collect()
}

/// 按字符截断，不会切断多字节字符
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
