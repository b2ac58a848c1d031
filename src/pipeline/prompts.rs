//! Fixed prompt contract with the collaborator.

use crate::provider::ChatMessage;

/// Characters of input shown to the classifier
const ANALYSIS_EXCERPT_CHARS: usize = 500;

pub const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are a data analysis assistant. Decide whether text content can be visualized as a chart.";

pub const CODE_SYSTEM_PROMPT: &str = r#"You are a data visualization expert. Write Python plotting code for the user's request.

Requirements:
1. Return only executable Python code, with no explanation.
2. Use only matplotlib and numpy.
3. The code must be complete and run as-is.
4. Save the figure to the pre-bound variable output_path. Do not choose your own file name.
5. Do not import os, sys, subprocess or socket, and do not call open, exec or eval.

Chart selection rules:
- 2-dimensional data: a 2D chart (line, scatter, bar, histogram, pie, box plot, heatmap).
- 3-dimensional data: a 3D chart (3D scatter, 3D surface, 3D line).
- 4 or more dimensions: reduce dimensionality before plotting.

Dimensionality reduction (required for 4+ dimensions):
- PCA with numpy (center the data, then np.linalg.svd): project to 3 components for a 3D view.
- Feature selection: keep the 3 most informative features.

3D template:
```python
import matplotlib.pyplot as plt
from mpl_toolkits.mplot3d import Axes3D
fig = plt.figure(figsize=(10, 8))
ax = fig.add_subplot(111, projection='3d')
ax.scatter(x, y, z, c='blue', s=50)
ax.set_xlabel('X')
ax.set_ylabel('Y')
ax.set_zlabel('Z')
ax.set_title('3D scatter')
plt.savefig(output_path, dpi=200, bbox_inches='tight', facecolor='white')
print(f"IMAGE_SAVED:{output_path}")
```

2D template:
```python
import matplotlib.pyplot as plt
import numpy as np
fig, ax = plt.subplots(figsize=(10, 8))
ax.plot(x, y, marker='o')
ax.set_title('Line chart')
plt.savefig(output_path, dpi=200, bbox_inches='tight', facecolor='white')
print(f"IMAGE_SAVED:{output_path}")
```"#;

pub fn analysis_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(ANALYSIS_EXCERPT_CHARS).collect();
    format!(
        "Can the following text be visualized as a chart?\n\n\
         {excerpt}\n\n\
         Answer with:\n\
         1. Whether a chart can be generated (YES/NO)\n\
         2. The suggested chart type\n\
         3. A short reason\n\n\
         Format:\n\
         YES/NO\n\
         Chart type: xxx\n\
         Reason: xxx\n",
        excerpt = excerpt
    )
}

pub fn code_prompt(text: &str, chart_type: Option<&str>) -> String {
    let mut prompt = format!("Write Python plotting code for the following input:\n\n{}\n", text);
    match chart_type {
        Some(hint) => prompt.push_str(&format!("\nChart type: {}\n", hint)),
        None => prompt.push_str("\nChoose the most suitable chart type for the content.\n"),
    }
    prompt.push_str("\nReturn the complete executable code only, without explanation.");
    prompt
}

pub fn analysis_messages(text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user(analysis_prompt(text)),
    ]
}

pub fn code_messages(text: &str, chart_type: Option<&str>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CODE_SYSTEM_PROMPT),
        ChatMessage::user(code_prompt(text, chart_type)),
    ]
}
