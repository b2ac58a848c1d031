//! Deterministic fallback script generator used when no collaborator is available.

use super::extract::describe;
use super::types::{ChartKind, CodeOrigin, GeneratedChart};
use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d*\.?\d+").expect("numeric token pattern is valid"));

const MAX_POINTS: usize = 10;
const DEFAULT_SERIES: [f64; 9] = [1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 2.0, 1.0];
const DEFAULT_DPI: u32 = 200;

#[derive(Debug, Clone)]
pub struct FallbackGenerator {
    dpi: u32,
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self { dpi: DEFAULT_DPI }
    }
}

/// Numeric tokens in `text`, in order of appearance
pub fn numeric_tokens(text: &str) -> Vec<f64> {
    NUMERIC_TOKEN
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

fn python_list(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| format!("{}", v)).collect();
    format!("[{}]", items.join(", "))
}

impl FallbackGenerator {
    pub fn with_dpi(dpi: u32) -> Self {
        Self { dpi }
    }

    /// Up to ten numbers from the input; a default series when fewer than two are present
    pub fn series(text: &str) -> Vec<f64> {
        let numbers = numeric_tokens(text);
        if numbers.len() >= 2 {
            numbers.into_iter().take(MAX_POINTS).collect()
        } else {
            DEFAULT_SERIES.to_vec()
        }
    }

    pub fn generate(&self, text: &str, chart_type: Option<&str>) -> GeneratedChart {
        let data = Self::series(text);
        let kind = match chart_type.and_then(ChartKind::parse) {
            Some(kind @ (ChartKind::Bar | ChartKind::Scatter | ChartKind::Histogram)) => kind,
            _ => ChartKind::Line,
        };

        let draw = match kind {
            ChartKind::Bar => "ax.bar(range(len(data)), data, color='steelblue')",
            ChartKind::Scatter => "ax.scatter(range(len(data)), data, s=60)",
            ChartKind::Histogram => "ax.hist(data, bins='auto', edgecolor='black')",
            _ => "ax.plot(data, marker='o', linewidth=2, markersize=8)",
        };

        let code = format!(
            r#"import matplotlib.pyplot as plt
import numpy as np

data = {data}

fig, ax = plt.subplots(figsize=(10, 8))
{draw}
ax.set_title('Data visualization', fontsize=16, fontweight='bold')
ax.set_xlabel('Index', fontsize=12)
ax.set_ylabel('Value', fontsize=12)
ax.grid(True, linestyle='--', alpha=0.7)

plt.savefig(output_path, dpi={dpi}, bbox_inches='tight', facecolor='white')
print(f"IMAGE_SAVED:{{output_path}}")
"#,
            data = python_list(&data),
            draw = draw,
            dpi = self.dpi,
        );

        GeneratedChart {
            code,
            chart_kind: kind,
            description: describe(text, kind),
            origin: CodeOrigin::Fallback,
        }
    }
}
