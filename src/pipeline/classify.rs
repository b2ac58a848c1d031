//! Visualizability classification.
//!
//! Without a collaborator a fixed rule set decides: any single matching rule is enough.
//! With a collaborator its `YES/NO`, `Chart type:` and `Reason:` lines are parsed.

use super::types::Classification;
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum length (in characters) for "contains numbers" to count as data
const NUMERIC_TEXT_MIN_CHARS: usize = 10;

struct Rule {
    name: &'static str,
    pattern: Regex,
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    let rule = |name: &'static str, pattern: &str| Rule {
        name,
        pattern: Regex::new(pattern).expect("classification patterns are valid"),
    };
    vec![
        rule(
            "math_function",
            r"(?i)\b(?:sin|cos|tan|log|ln|exp|sqrt|pow)\b",
        ),
        rule(
            "chart_keyword",
            r"(?i)histogram|box\s?plot|scatter|line chart|bar chart|pie chart|heatmap|(?:normal|uniform|exponential) distribution|正态分布|均匀分布|指数分布|直方图|箱线图|散点图|折线图|柱状图|饼图|热力图",
        ),
        rule(
            "statistic_keyword",
            r"(?i)\b(?:mean|average|median|variance|standard deviation|probability)\b|平均数|中位数|方差|标准差|概率",
        ),
        rule(
            "data_description",
            r"(?i)\bdata points?\b|\bcoordinates?\b|\bfunction\b|\bequation\b|\bcurve\b|数据点|坐标|函数|方程|曲线|图形",
        ),
        rule("arithmetic", r"\d+\s*[-+*/]\s*\d+"),
        rule("assignment", r"\b[A-Za-z]\w*\s*=\s*[\w(+\-*/.]"),
    ]
});

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d").expect("number pattern is valid"));

/// Deterministic rule-based classification
pub fn classify_with_rules(text: &str) -> Classification {
    if let Some(rule) = RULES.iter().find(|rule| rule.pattern.is_match(text)) {
        return Classification {
            visualizable: true,
            suggested_type: None,
            reason: format!("matched rule: {}", rule.name),
        };
    }

    if NUMBER.is_match(text) && text.chars().count() > NUMERIC_TEXT_MIN_CHARS {
        return Classification {
            visualizable: true,
            suggested_type: None,
            reason: "numeric data detected".to_string(),
        };
    }

    Classification {
        visualizable: false,
        suggested_type: None,
        reason: "no chartable content detected".to_string(),
    }
}

/// Parse the collaborator's `YES/NO` answer
pub fn parse_analysis(response: &str) -> Classification {
    let lines: Vec<&str> = response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let verdict = lines.first().map(|line| {
        line.trim_start_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
    });
    let visualizable = match verdict.as_deref() {
        Some(v) if v.starts_with("yes") || v.starts_with("true") => true,
        Some(v) if v.starts_with("no") || v.starts_with("false") => false,
        _ => {
            let lowered = response.to_lowercase();
            lowered.contains("yes") || lowered.contains("true") || response.contains("可以")
        }
    };

    let field = |prefixes: &[&str]| -> Option<String> {
        lines.iter().find_map(|line| {
            let lowered = line.to_lowercase();
            prefixes.iter().find_map(|prefix| {
                if lowered.starts_with(prefix) {
                    let value = line
                        .get(prefix.len()..)
                        .unwrap_or_default()
                        .trim_start_matches(|c: char| c == ':' || c == '：')
                        .trim();
                    (!value.is_empty()).then(|| value.to_string())
                } else {
                    None
                }
            })
        })
    };

    let suggested_type = field(&["chart type", "图表类型"]);
    let reason = field(&["reason", "原因"])
        .or_else(|| lines.last().map(|line| line.to_string()))
        .unwrap_or_default();

    Classification {
        visualizable,
        suggested_type,
        reason,
    }
}
