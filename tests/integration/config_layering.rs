//! Configuration layering through files and environment

use super::test_utils::EnvGuard;
use chartgate::cli::RunContext;
use chartgate::config::ConfigLoader;
use tempfile::TempDir;

#[test]
fn environment_overrides_workspace_file() {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("ws");
    std::fs::create_dir_all(workspace.join("config")).unwrap();
    std::fs::write(
        workspace.join("config").join("config.toml"),
        "[sandbox]\ntimeout_secs = 12\n\n[cache]\nenabled = false\n",
    )
    .unwrap();

    let xdg = dir.path().join("xdg").to_string_lossy().to_string();
    let _env = EnvGuard::set(&[
        ("XDG_CONFIG_HOME", Some(xdg.as_str())),
        ("CHARTGATE_ENV", None),
        ("CHARTGATE__SANDBOX__TIMEOUT_SECS", Some("90")),
    ]);

    let config = ConfigLoader::load(&workspace).unwrap();
    assert_eq!(config.sandbox.timeout_secs, 90);
    assert!(!config.cache.enabled);
}

#[test]
fn invalid_configuration_is_rejected_with_every_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("bad.toml");
    std::fs::write(
        &file,
        "[sandbox]\ntimeout_secs = 0\n\n[dispatch]\nworkers = 0\n",
    )
    .unwrap();

    let _env = EnvGuard::set(&[("CHARTGATE__SANDBOX__TIMEOUT_SECS", None)]);
    let err = RunContext::new(dir.path().to_path_buf(), Some(file))
        .err()
        .unwrap()
        .to_string();
    assert!(err.contains("Sandbox:"));
    assert!(err.contains("Dispatch:"));
}

#[test]
fn provider_section_builds_a_collaborator() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("chartgate.toml");
    std::fs::write(
        &file,
        format!(
            "[provider]\nprovider_type = \"ollama\"\nmodel = \"llama3\"\nendpoint = \"http://localhost:11434\"\n\n\
             [sandbox]\noutput_dir = {:?}\n\n[cache]\npath = {:?}\n",
            dir.path().join("charts"),
            dir.path().join("cache"),
        ),
    )
    .unwrap();

    let _env = EnvGuard::set(&[("CHARTGATE__SANDBOX__TIMEOUT_SECS", None)]);
    let context = RunContext::new(dir.path().to_path_buf(), Some(file)).unwrap();
    let pipeline = context.build_pipeline().unwrap();
    assert!(pipeline.has_collaborator());
    assert!(pipeline.cache().is_some());
}
