// Configuration source loading.
//
// Priority order:
// 1. Environment variables (ECSDEPLOY_* prefix)
// 2. Explicit file path (CLI --config), else ECSDEPLOY_CONFIG
// 3. Inline config content from ECSDEPLOY_CONFIG_CONTENT
// 4. Default config file (./ecsdeploy.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::StackConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "./ecsdeploy.toml";

/// Load configuration using native environment/file access.
pub fn load_config() -> Result<StackConfig> {
    load_with(&StdEnvSource, None)
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<StackConfig> {
    load_with(&StdEnvSource, Some(path.as_ref()))
}

pub(crate) fn load_with<E: EnvSource>(env: &E, explicit: Option<&Path>) -> Result<StackConfig> {
    let mut config = match explicit {
        Some(path) => read_file(path)?,
        None => load_from_file(env)?.unwrap_or_default(),
    };

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file<E: EnvSource>(env: &E) -> Result<Option<StackConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config: StackConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse inline config from {}CONFIG_CONTENT", ENV_PREFIX)
        })?;
        return Ok(Some(config));
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        return read_file(default_path).map(Some);
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<StackConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_inline_content_is_used() {
        let env: HashMap<String, String> = [(
            "ECSDEPLOY_CONFIG_CONTENT".to_string(),
            "[compute]\ndesired_count = 2\n".to_string(),
        )]
        .into_iter()
        .collect();

        let config = load_with(&env, None).unwrap();
        assert_eq!(config.compute.desired_count, 2);
    }

    #[test]
    fn test_env_beats_file() {
        let env: HashMap<String, String> = [
            (
                "ECSDEPLOY_CONFIG_CONTENT".to_string(),
                "[compute]\ndesired_count = 2\nimage_tag = \"v1\"\n".to_string(),
            ),
            ("ECSDEPLOY_DESIRED_COUNT".to_string(), "4".to_string()),
        ]
        .into_iter()
        .collect();

        let config = load_with(&env, None).unwrap();
        assert_eq!(config.compute.desired_count, 4);
        assert_eq!(config.compute.image_tag.as_str(), "v1");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let env = HashMap::new();
        let err = load_with(&env, Some(Path::new("/nonexistent/ecsdeploy.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_result_fails_validation() {
        let env: HashMap<String, String> = [(
            "ECSDEPLOY_CONFIG_CONTENT".to_string(),
            "[compute.size]\ncpu = 256\nmemory = 8192\n".to_string(),
        )]
        .into_iter()
        .collect();

        assert!(load_with(&env, None).is_err());
    }
}
