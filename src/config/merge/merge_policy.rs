//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only scalar defaults live here; table defaults (dependency registries, logging) come
/// from the serde defaults on the config structs so partial tables merge cleanly.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("sandbox.interpreter", "python3")?
        .set_default("sandbox.timeout_secs", 30)?
        .set_default("cache.enabled", true)?
        .set_default("dispatch.workers", 4)
}
