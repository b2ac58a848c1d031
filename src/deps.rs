//! Dependency Readiness
//!
//! Verifies that the plotting and numeric libraries required by generated scripts are
//! importable by the sandbox interpreter before any generation attempt. Never installs
//! anything; a failed check yields an actionable message with the install command.
//!
//! Probing goes through the [`ImportProbe`] seam. Results are memoized for the life of the
//! checker, so the interpreter is launched at most once per library.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Required and optional library registries: identifier -> minimum version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    #[serde(default = "default_required")]
    pub required: BTreeMap<String, String>,

    #[serde(default = "default_optional")]
    pub optional: BTreeMap<String, String>,

    /// Seconds allowed for each interpreter probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_required() -> BTreeMap<String, String> {
    [("matplotlib", "3.8.0"), ("numpy", "1.24.0")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_optional() -> BTreeMap<String, String> {
    [("scipy", "1.11.0"), ("seaborn", "0.12.0"), ("plotly", "5.18.0")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_probe_timeout_secs() -> u64 {
    15
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            required: default_required(),
            optional: default_optional(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl DependencyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.required.is_empty() {
            return Err("At least one required dependency must be listed".to_string());
        }
        for name in self.required.keys().chain(self.optional.keys()) {
            if !is_module_name(name) {
                return Err(format!("Invalid module name: {}", name));
            }
        }
        if self.probe_timeout_secs == 0 {
            return Err("probe_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Status of one tracked library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub installed: bool,
    pub version: Option<String>,
    pub minimum_version: String,
    pub optional: bool,
    /// `None` when not installed or the version could not be determined
    pub meets_minimum: Option<bool>,
}

/// Outcome of the pre-flight gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ok: bool,
    pub message: String,
}

/// Full installation report over both registries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub ready: bool,
    pub dependencies: Vec<DependencyStatus>,
    pub missing_required: Vec<String>,
    pub optional_available: Vec<String>,
    pub optional_missing: Vec<String>,
    pub backend: String,
    pub display_available: bool,
}

/// Seam for asking the sandbox interpreter about its libraries
pub trait ImportProbe: Send + Sync {
    /// `Ok(version)` when the module imports (version may be unknown), `Err(reason)` otherwise
    fn probe(&self, module: &str) -> Result<Option<String>, String>;

    /// Confirm the plotting library accepts `backend`; returns the active backend name
    fn verify_backend(&self, backend: &str) -> Result<String, String>;
}

const PROBE_MODULE_SCRIPT: &str = "import importlib, sys\n\
m = importlib.import_module(sys.argv[1])\n\
print(getattr(m, '__version__', ''))\n";

const PROBE_BACKEND_SCRIPT: &str = "import sys\n\
import matplotlib\n\
matplotlib.use(sys.argv[1])\n\
import matplotlib.pyplot\n\
print(matplotlib.get_backend())\n";

/// Probe that runs the configured interpreter as a child process
pub struct PythonImportProbe {
    interpreter: String,
    timeout: Duration,
}

impl PythonImportProbe {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    /// Run `script` with a single argument; returns trimmed stdout on exit status 0
    fn run(&self, script: &str, arg: &str, backend: Option<&str>) -> Result<String, String> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-I")
            .arg("-c")
            .arg(script)
            .arg(arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(backend) = backend {
            command.env("MPLBACKEND", backend);
        }

        let mut child = command
            .spawn()
            .map_err(|e| format!("failed to launch {}: {}", self.interpreter, e))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("probe timed out after {:?}", self.timeout));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                Err(e) => return Err(format!("failed to wait for probe: {}", e)),
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout);
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }

        if status.success() {
            Ok(stdout.trim().to_string())
        } else {
            let last = stderr.lines().last().unwrap_or("import failed").trim();
            Err(last.to_string())
        }
    }
}

impl ImportProbe for PythonImportProbe {
    fn probe(&self, module: &str) -> Result<Option<String>, String> {
        if !is_module_name(module) {
            return Err(format!("invalid module name: {}", module));
        }
        let version = self.run(PROBE_MODULE_SCRIPT, module, None)?;
        Ok(if version.is_empty() { None } else { Some(version) })
    }

    fn verify_backend(&self, backend: &str) -> Result<String, String> {
        if !is_module_name(backend) {
            return Err(format!("invalid backend name: {}", backend));
        }
        self.run(PROBE_BACKEND_SCRIPT, backend, Some(backend))
    }
}

/// Fixed answers for tests and offline use
#[derive(Debug, Default)]
pub struct StaticProbe {
    installed: HashMap<String, Option<String>>,
    backend_error: Option<String>,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<S>)>,
        S: Into<String>,
    {
        Self {
            installed: modules
                .into_iter()
                .map(|(name, version)| (name.into(), version.map(Into::into)))
                .collect(),
            backend_error: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every default required library installed at a recent version
    pub fn all_installed() -> Self {
        Self::new([
            ("matplotlib", Some("3.9.0")),
            ("numpy", Some("1.26.4")),
        ])
    }

    pub fn without(mut self, module: &str) -> Self {
        self.installed.remove(module);
        self
    }

    pub fn with_backend_error(mut self, reason: impl Into<String>) -> Self {
        self.backend_error = Some(reason.into());
        self
    }

    /// Number of module probes answered
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImportProbe for StaticProbe {
    fn probe(&self, module: &str) -> Result<Option<String>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.installed
            .get(module)
            .cloned()
            .ok_or_else(|| format!("No module named '{}'", module))
    }

    fn verify_backend(&self, backend: &str) -> Result<String, String> {
        match &self.backend_error {
            Some(reason) => Err(reason.clone()),
            None => Ok(backend.to_string()),
        }
    }
}

/// Whether an interactive display surface is reachable from this process
pub fn display_available() -> bool {
    if cfg!(any(windows, target_os = "macos")) {
        return true;
    }
    let set = |name: &str| std::env::var_os(name).map_or(false, |v| !v.is_empty());
    set("DISPLAY") || set("WAYLAND_DISPLAY")
}

/// Pre-flight readiness checker
pub struct DependencyChecker {
    config: DependencyConfig,
    probe: Box<dyn ImportProbe>,
    backend: String,
    memo: Mutex<HashMap<String, (bool, Option<String>)>>,
    backend_verdict: Mutex<Option<Result<String, String>>>,
}

impl DependencyChecker {
    pub fn new(config: DependencyConfig, probe: Box<dyn ImportProbe>) -> Self {
        Self {
            config,
            probe,
            backend: "Agg".to_string(),
            memo: Mutex::new(HashMap::new()),
            backend_verdict: Mutex::new(None),
        }
    }

    /// Checker backed by the real interpreter
    pub fn for_interpreter(config: DependencyConfig, interpreter: &str) -> Self {
        let timeout = Duration::from_secs(config.probe_timeout_secs);
        Self::new(config, Box::new(PythonImportProbe::new(interpreter, timeout)))
    }

    /// Rendering backend exported to sandbox children
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn config(&self) -> &DependencyConfig {
        &self.config
    }

    /// Check one library: `(installed, version)`. Memoized; probe failures mean "not installed".
    pub fn check(&self, name: &str) -> (bool, Option<String>) {
        if let Some(hit) = self.memo.lock().get(name) {
            return hit.clone();
        }

        let outcome = match self.probe.probe(name) {
            Ok(version) => {
                debug!(dependency = name, version = ?version, "Dependency importable");
                (true, version)
            }
            Err(reason) => {
                debug!(dependency = name, reason = %reason, "Dependency not importable");
                (false, None)
            }
        };

        // A concurrent check may have raced us; keep whichever landed first.
        self.memo
            .lock()
            .entry(name.to_string())
            .or_insert(outcome)
            .clone()
    }

    /// Required identifiers that are not importable
    pub fn missing_required(&self) -> BTreeSet<String> {
        self.config
            .required
            .keys()
            .filter(|name| !self.check(name).0)
            .cloned()
            .collect()
    }

    pub fn is_ready(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// The single pre-flight gate run before any generation attempt
    pub fn ensure_imports(&self) -> Readiness {
        let missing = self.missing_required();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(String::as_str).collect();
            let specs: Vec<String> = missing
                .iter()
                .map(|name| match self.config.required.get(name) {
                    Some(min) => format!("{}>={}", name, min),
                    None => name.clone(),
                })
                .collect();
            let message = format!(
                "Missing required dependencies: {}\nInstall manually: pip install {}",
                names.join(", "),
                specs.join(" ")
            );
            warn!(missing = ?names, "Dependency check failed");
            return Readiness { ok: false, message };
        }

        for status in self.statuses() {
            if status.meets_minimum == Some(false) {
                warn!(
                    dependency = %status.name,
                    version = ?status.version,
                    minimum = %status.minimum_version,
                    "Installed version is below the supported minimum"
                );
            }
        }

        if !display_available() {
            match self.verified_backend() {
                Ok(active) => {
                    debug!(backend = %active, "Non-interactive rendering backend confirmed");
                }
                Err(reason) => {
                    return Readiness {
                        ok: false,
                        message: format!(
                            "matplotlib backend '{}' is not usable: {}",
                            self.backend, reason
                        ),
                    };
                }
            }
        }

        info!("All chart dependencies ready");
        Readiness {
            ok: true,
            message: "All dependencies ready".to_string(),
        }
    }

    /// Backend verdict, probed once per checker
    fn verified_backend(&self) -> Result<String, String> {
        if let Some(verdict) = self.backend_verdict.lock().as_ref() {
            return verdict.clone();
        }
        let verdict = self.probe.verify_backend(&self.backend);
        self.backend_verdict
            .lock()
            .get_or_insert(verdict)
            .clone()
    }

    /// Status of every tracked library, required first
    pub fn statuses(&self) -> Vec<DependencyStatus> {
        let required = self.config.required.iter().map(|entry| (entry, false));
        let optional = self.config.optional.iter().map(|entry| (entry, true));

        required
            .chain(optional)
            .map(|((name, minimum), optional)| {
                let (installed, version) = self.check(name);
                let meets_minimum = version
                    .as_deref()
                    .and_then(|found| version_at_least(found, minimum));
                DependencyStatus {
                    name: name.clone(),
                    installed,
                    version,
                    minimum_version: minimum.clone(),
                    optional,
                    meets_minimum,
                }
            })
            .collect()
    }

    pub fn report(&self) -> DependencyReport {
        let dependencies = self.statuses();
        let pick = |optional: bool, installed: bool| -> Vec<String> {
            dependencies
                .iter()
                .filter(|s| s.optional == optional && s.installed == installed)
                .map(|s| s.name.clone())
                .collect()
        };
        let missing_required = pick(false, false);
        let optional_available = pick(true, true);
        let optional_missing = pick(true, false);

        DependencyReport {
            ready: missing_required.is_empty(),
            missing_required,
            optional_available,
            optional_missing,
            backend: self.backend.clone(),
            display_available: display_available(),
            dependencies,
        }
    }
}

fn is_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Compare dotted versions numerically; `None` when either side has no leading number
fn version_at_least(found: &str, minimum: &str) -> Option<bool> {
    fn parts(v: &str) -> Option<Vec<u64>> {
        let parsed: Vec<u64> = v
            .split('.')
            .map_while(|part| {
                let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().ok()
            })
            .collect();
        if parsed.is_empty() {
            None
        } else {
            Some(parsed)
        }
    }

    let mut found = parts(found)?;
    let mut minimum = parts(minimum)?;
    let len = found.len().max(minimum.len());
    found.resize(len, 0);
    minimum.resize(len, 0);
    Some(found >= minimum)
}
