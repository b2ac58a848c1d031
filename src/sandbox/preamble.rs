//! Script assembly: the executor-owned preamble and the stdout sentinel.

use crate::error::StorageError;
use crate::safety::VettedCode;
use std::path::{Path, PathBuf};

/// Prefix of the stdout line a script may print to report where it saved the image
pub const SENTINEL: &str = "IMAGE_SAVED:";

/// Prepend the preamble binding `OUTPUT_PATH` / `output_path` to the vetted code.
///
/// The path is embedded as a JSON string literal, which is also a valid Python literal.
pub fn compose(output_path: &Path, code: &VettedCode) -> Result<String, StorageError> {
    let path = output_path.to_str().ok_or_else(|| {
        StorageError::InvalidPath(format!("{} is not valid UTF-8", output_path.display()))
    })?;
    let literal = serde_json::to_string(path)
        .map_err(|e| StorageError::InvalidPath(format!("{}: {}", path, e)))?;

    Ok(format!(
        "import pathlib as _chartgate_pathlib\n\
         OUTPUT_PATH = {literal}\n\
         _chartgate_pathlib.Path(OUTPUT_PATH).parent.mkdir(parents=True, exist_ok=True)\n\
         output_path = OUTPUT_PATH\n\
         del _chartgate_pathlib\n\
         \n\
         {code}\n",
        literal = literal,
        code = code.as_str()
    ))
}

/// First sentinel path printed on stdout, if any
pub fn find_sentinel(stdout: &str) -> Option<PathBuf> {
    stdout.lines().find_map(|line| {
        let start = line.find(SENTINEL)? + SENTINEL.len();
        let path = line[start..].trim();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    })
}
