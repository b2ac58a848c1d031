//! Pulling runnable code out of free-form collaborator responses, and naming what it draws.

use super::types::ChartKind;
use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```")
        .expect("fence pattern is valid")
});

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("integer pattern is valid"));

/// Characters of input scanned when counting data points for the description
const DESCRIPTION_SCAN_CHARS: usize = 100;

fn references_plotting(code: &str) -> bool {
    code.contains("matplotlib") || code.contains("plt.")
}

fn saves_figure(code: &str) -> bool {
    code.contains("savefig") || code.contains(".save(")
}

fn is_runnable_plot(code: &str) -> bool {
    references_plotting(code) && saves_figure(code)
}

/// Extract the first runnable plotting block.
///
/// Python-tagged fences are preferred over other fences. Without any usable fence, a
/// response that itself references plotting and saves is trimmed to its first code line.
pub fn extract_code(response: &str) -> Option<String> {
    let blocks: Vec<(String, String)> = FENCED_BLOCK
        .captures_iter(response)
        .map(|caps| {
            let lang = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
            let body = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
            (lang, body)
        })
        .collect();

    let python = blocks
        .iter()
        .filter(|(lang, _)| lang == "python" || lang == "py" || lang == "python3");
    let others = blocks
        .iter()
        .filter(|(lang, _)| lang != "python" && lang != "py" && lang != "python3");
    if let Some((_, body)) = python.chain(others).find(|(_, body)| is_runnable_plot(body)) {
        return Some(body.clone());
    }

    if !blocks.is_empty() || !is_runnable_plot(response) {
        return None;
    }

    let code: Vec<&str> = response
        .lines()
        .skip_while(|line| {
            !(line.contains("import")
                || line.contains("plt")
                || line.contains("np.")
                || line.contains("print("))
        })
        .collect();
    let code = code.join("\n").trim().to_string();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

/// Infer the chart kind from the plotting calls a script makes
pub fn infer_kind(code: &str) -> ChartKind {
    let has = |needles: &[&str]| needles.iter().any(|needle| code.contains(needle));

    if has(&["projection='3d'", "projection=\"3d\"", "plot_surface", "Axes3D"]) {
        ChartKind::ThreeD
    } else if has(&[".scatter("]) {
        ChartKind::Scatter
    } else if has(&["boxplot("]) {
        ChartKind::Box
    } else if has(&[".bar(", ".barh("]) {
        ChartKind::Bar
    } else if has(&[".hist("]) {
        ChartKind::Histogram
    } else if has(&[".pie("]) {
        ChartKind::Pie
    } else if has(&["imshow(", "heatmap(", "pcolormesh("]) {
        ChartKind::Heatmap
    } else if has(&[".plot("]) {
        ChartKind::Line
    } else {
        ChartKind::Custom
    }
}

/// "Based on N data points: <kind>", counting integers near the start of the input
pub fn describe(text: &str, kind: ChartKind) -> String {
    let head: String = text.chars().take(DESCRIPTION_SCAN_CHARS).collect();
    let points = INTEGER.find_iter(&head).count();
    format!("Based on {} data points: {}", points, kind.label())
}
