//! Request, result and chart-kind types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One chart request: the input text and an optional chart-type hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRequest {
    text: String,
    chart_type: Option<String>,
}

impl ChartRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chart_type: None,
        }
    }

    pub fn with_chart_type(mut self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        self.chart_type = if hint.trim().is_empty() { None } else { Some(hint) };
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chart_type(&self) -> Option<&str> {
        self.chart_type.as_deref()
    }
}

/// Chart kinds the pipeline knows how to name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Scatter,
    Bar,
    Histogram,
    Pie,
    Box,
    Heatmap,
    ThreeD,
    Custom,
}

impl ChartKind {
    pub const ALL: [ChartKind; 9] = [
        ChartKind::Line,
        ChartKind::Scatter,
        ChartKind::Bar,
        ChartKind::Histogram,
        ChartKind::Pie,
        ChartKind::Box,
        ChartKind::Heatmap,
        ChartKind::ThreeD,
        ChartKind::Custom,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Bar => "bar",
            ChartKind::Histogram => "histogram",
            ChartKind::Pie => "pie",
            ChartKind::Box => "box",
            ChartKind::Heatmap => "heatmap",
            ChartKind::ThreeD => "3d",
            ChartKind::Custom => "custom",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChartKind::Line => "line chart",
            ChartKind::Scatter => "scatter plot",
            ChartKind::Bar => "bar chart",
            ChartKind::Histogram => "histogram",
            ChartKind::Pie => "pie chart",
            ChartKind::Box => "box plot",
            ChartKind::Heatmap => "heatmap",
            ChartKind::ThreeD => "3D chart",
            ChartKind::Custom => "custom chart",
        }
    }

    /// Parse a user-facing id or label
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.id() == value || kind.label().to_lowercase() == value)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the script came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeOrigin {
    Collaborator,
    Fallback,
}

/// A script plus what it is expected to draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedChart {
    pub code: String,
    pub chart_kind: ChartKind,
    pub description: String,
    pub origin: CodeOrigin,
}

/// Visualizability judgement for a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub visualizable: bool,
    pub suggested_type: Option<String>,
    pub reason: String,
}

/// Successful pipeline outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartResult {
    pub artifact_path: PathBuf,
    pub chart_kind: ChartKind,
    pub description: String,
    pub code: String,
    pub origin: CodeOrigin,
    pub cached: bool,
}
