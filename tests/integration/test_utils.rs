//! Shared test utilities for integration tests
//!
//! Pipeline assembly helpers, interpreter detection, and serialized access to the
//! process environment.

use chartgate::cache::ResultCache;
use chartgate::deps::{DependencyChecker, DependencyConfig, ImportProbe, StaticProbe};
use chartgate::pipeline::ChartPipeline;
use chartgate::provider::ModelProviderClient;
use chartgate::sandbox::{SandboxConfig, SandboxedExecutor};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

static PLOTTING_AVAILABLE: Lazy<bool> = Lazy::new(|| {
    Command::new("python3")
        .args(["-I", "-c", "import matplotlib, numpy"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
});

/// Whether a real `python3` with matplotlib and numpy is installed
pub fn plotting_available() -> bool {
    *PLOTTING_AVAILABLE
}

/// Returns early from the calling test when no plotting interpreter is installed
#[macro_export]
macro_rules! require_plotting {
    () => {
        if !$crate::integration::test_utils::plotting_available() {
            eprintln!("skipping: python3 with matplotlib and numpy is not available");
            return;
        }
    };
}

pub fn sandbox_config(dir: &TempDir) -> SandboxConfig {
    SandboxConfig {
        output_dir: Some(dir.path().join("charts")),
        ..SandboxConfig::default()
    }
}

pub fn executor(dir: &TempDir) -> SandboxedExecutor {
    SandboxedExecutor::new(sandbox_config(dir)).unwrap()
}

pub fn checker(probe: impl ImportProbe + 'static) -> Arc<DependencyChecker> {
    Arc::new(DependencyChecker::new(DependencyConfig::default(), Box::new(probe)))
}

/// Readiness checker: the real interpreter when installed, otherwise a static all-present probe
pub fn ready_checker() -> Arc<DependencyChecker> {
    if plotting_available() {
        Arc::new(DependencyChecker::for_interpreter(DependencyConfig::default(), "python3"))
    } else {
        checker(StaticProbe::all_installed())
    }
}

pub fn pipeline(
    dir: &TempDir,
    deps: Arc<DependencyChecker>,
    collaborator: Option<Arc<dyn ModelProviderClient>>,
    cache: Option<ResultCache>,
) -> ChartPipeline {
    let mut builder = ChartPipeline::builder(deps, executor(dir));
    if let Some(collaborator) = collaborator {
        builder = builder.collaborator(collaborator);
    }
    if let Some(cache) = cache {
        builder = builder.cache(cache);
    }
    builder.build()
}

/// Environment overrides restored on drop; holds the global environment lock
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    pub fn set(vars: &[(&str, Option<&str>)]) -> Self {
        let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let saved = vars
            .iter()
            .map(|(name, _)| (name.to_string(), std::env::var(name).ok()))
            .collect();
        for (name, value) in vars {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
        Self { saved, _lock: lock }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, value) in &self.saved {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// A collaborator reply wrapping `code` in a python fence
pub fn fenced(code: &str) -> String {
    format!("Here is the chart code:\n```python\n{}\n```\n", code)
}

/// Shell stand-in for the plotting interpreter, so sandbox paths run without python.
///
/// Dependency checks (`-I -c <script> <arg>`) report every module installed and echo the
/// requested backend. Chart scripts append a line to `runs.log` in the output directory
/// and obey at most one `# interp:` directive comment:
/// `hang`, `syntax-error`, `no-output`, or `report <path>` (write there and print the
/// sentinel). Without a directive the image goes to the preamble's `OUTPUT_PATH`.
#[cfg(unix)]
const STAND_IN_INTERPRETER: &str = r#"#!/bin/sh
if [ "$1" = "-I" ] && [ "$2" = "-c" ]; then
  case "$3" in
    *get_backend*) echo "$4" ;;
    *) echo "9.9.0" ;;
  esac
  exit 0
fi
script="$2"
out=$(sed -n 's/^OUTPUT_PATH = "\(.*\)"$/\1/p' "$script")
echo run >> "$(dirname "$out")/runs.log"
directive=$(sed -n 's/^# interp: //p' "$script")
case "$directive" in
  hang)
    exec sleep 30
    ;;
  syntax-error)
    echo '  File "chart_script.py", line 8' >&2
    echo 'SyntaxError: invalid syntax' >&2
    exit 1
    ;;
  no-output)
    echo "drew nothing"
    exit 0
    ;;
  report\ *)
    target="${directive#report }"
    printf 'PNG' > "$target"
    echo "IMAGE_SAVED:$target"
    exit 0
    ;;
esac
printf '\211PNG\r\n' > "$out"
echo "IMAGE_SAVED:$out"
"#;

/// Installed once per test process; executing a freshly written file while other
/// threads fork can fail with ETXTBSY.
#[cfg(unix)]
static STAND_IN: Lazy<TempDir> = Lazy::new(|| {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("python-stand-in");
    std::fs::write(&path, STAND_IN_INTERPRETER).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    dir
});

/// Path of the stand-in interpreter
#[cfg(unix)]
pub fn stand_in_interpreter() -> PathBuf {
    STAND_IN.path().join("python-stand-in")
}

/// Chart scripts the stand-in has run for artifacts under `output_dir`
#[cfg(unix)]
pub fn interpreter_runs(output_dir: &Path) -> usize {
    std::fs::read_to_string(output_dir.join("runs.log"))
        .map_or(0, |log| log.lines().count())
}
