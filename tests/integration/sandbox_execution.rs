//! Child-process execution against a real interpreter

use super::test_utils::{executor, sandbox_config, EnvGuard};
use chartgate::safety::{CodeSafetyValidator, VettedCode};
use chartgate::sandbox::{ExecutionFailure, SandboxConfig, SandboxedExecutor};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn vet(code: &str) -> VettedCode {
    CodeSafetyValidator::new().vet(code).unwrap()
}

#[tokio::test]
async fn runaway_script_is_killed_at_the_limit() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let executor = executor(&dir);
    let code = vet("import matplotlib.pyplot as plt\n\
while True:\n    pass\n\
plt.savefig(output_path)");

    let started = Instant::now();
    let result = executor
        .execute_with_limit(&code, Duration::from_secs(1))
        .await;
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert_eq!(result.failure, Some(ExecutionFailure::Timeout { limit_ms: 1000 }));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(6), "took {:?}", elapsed);
    assert!(executor.list_artifacts().unwrap().is_empty());
}

#[tokio::test]
async fn syntax_errors_are_reported_as_syntax() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let result = executor(&dir)
        .execute(&vet("import matplotlib.pyplot as plt\nplt.plot([1, 2]\nplt.savefig(output_path)"))
        .await;
    assert!(matches!(result.failure, Some(ExecutionFailure::Syntax { .. })));
}

#[tokio::test]
async fn script_that_never_saves_yields_no_artifact() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let result = executor(&dir)
        .execute(&vet("import matplotlib.pyplot as plt\n\
fig, ax = plt.subplots()\n\
ax.plot([1, 2, 3])\n\
print('skipped plt.savefig on purpose')"))
        .await;
    assert_eq!(result.failure, Some(ExecutionFailure::ArtifactMissing));
    assert!(result.stdout.contains("skipped"));
}

#[tokio::test]
async fn artifact_lands_in_managed_directory() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let executor = executor(&dir);
    let result = executor
        .execute(&vet("import matplotlib.pyplot as plt\n\
plt.bar(['a', 'b'], [3, 5])\n\
plt.savefig(output_path)\n\
print(f\"IMAGE_SAVED:{output_path}\")"))
        .await;

    assert!(result.success, "stderr: {}", result.stderr);
    let path = result.artifact_path.unwrap();
    assert!(path.starts_with(executor.output_dir()));
    let listed = executor.list_artifacts().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, path);
}

#[tokio::test]
async fn environment_is_not_inherited() {
    crate::require_plotting!();
    let dir = TempDir::new().unwrap();
    let env = EnvGuard::set(&[("CHARTGATE_TEST_SECRET", Some("hunter2"))]);
    // The denylist is bypassable; the child must still start from an empty environment.
    let result = executor(&dir)
        .execute(&vet("import matplotlib.pyplot as plt\n\
import importlib\n\
env = importlib.import_module('o' + 's').environ\n\
print('secret=' + env.get('CHARTGATE_TEST_SECRET', 'absent'))\n\
plt.plot([1])\n\
plt.savefig(output_path)"))
        .await;
    drop(env);

    assert!(result.success, "stderr: {}", result.stderr);
    assert!(result.stdout.contains("secret=absent"));
}

#[tokio::test]
async fn missing_interpreter_is_a_runtime_failure() {
    let dir = TempDir::new().unwrap();
    let executor = SandboxedExecutor::new(SandboxConfig {
        interpreter: "chartgate-no-such-python".to_string(),
        ..sandbox_config(&dir)
    })
    .unwrap();
    let result = executor
        .execute(&vet("import matplotlib.pyplot as plt\nplt.savefig(output_path)"))
        .await;
    assert!(matches!(result.failure, Some(ExecutionFailure::Runtime { .. })));
}
