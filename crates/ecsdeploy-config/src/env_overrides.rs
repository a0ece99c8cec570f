use crate::{ImageTag, LogFormat, LoggingConfig, StackConfig, TaskSize};
use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "ECSDEPLOY_";

/// Abstraction over environment-variable lookups so tests (and the Lambda
/// handler config) can supply their own source of values.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the ECSDEPLOY_ prefix
    /// Used for AWS standard variables (AWS_REGION, etc.) and the handler env
    fn get_raw(&self, key: &str) -> Option<String>;
}

impl EnvSource for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        std::collections::HashMap::get(self, &format!("{}{}", ENV_PREFIX, key)).cloned()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        std::collections::HashMap::get(self, key).cloned()
    }
}

/// Apply environment-variable overrides (highest priority) to the stack config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut StackConfig, env: &E) -> Result<()> {
    // Project
    if let Some(region) = env.get("REGION") {
        config.project.region = region;
    } else if let Some(region) = env.get_raw("AWS_REGION") {
        config.project.region = region;
    }

    apply_logging_overrides(&mut config.logging, env)?;

    // Network
    if let Some(val) = get_env_parsed::<_, bool>(env, "NAT_GATEWAY")? {
        config.network.nat_gateway = val;
    }

    // Compute
    if let Some(tag) = env.get("IMAGE_TAG") {
        config.compute.image_tag = tag
            .parse::<ImageTag>()
            .context("Invalid ECSDEPLOY_IMAGE_TAG value")?;
    }
    if let Some(val) = get_env_parsed(env, "DESIRED_COUNT")? {
        config.compute.desired_count = val;
    }
    if let Some(val) = get_env_parsed(env, "CONTAINER_PORT")? {
        config.compute.container_port = val;
    }
    let cpu = get_env_parsed(env, "TASK_CPU")?;
    let memory = get_env_parsed(env, "TASK_MEMORY")?;
    if cpu.is_some() || memory.is_some() {
        let current = config.compute.size;
        config.compute.size = TaskSize {
            cpu: cpu.unwrap_or(current.cpu),
            memory: memory.unwrap_or(current.memory),
        };
    }
    if let Some(val) = get_env_parsed::<_, bool>(env, "SCAN_ON_PUSH")? {
        config.compute.scan_on_push = val;
    }

    // Storage
    if let Some(bucket) = env.get("BUCKET") {
        config.storage.bucket = bucket;
    }

    // Observability; "none" (or 0) disables retention
    if let Some(val) = env.get("LOG_RETENTION_DAYS") {
        config.observability.log_retention_days = match val.trim() {
            "" | "0" | "none" => None,
            days => Some(days.parse::<u32>().map_err(|e| {
                anyhow!("Failed to parse {}LOG_RETENTION_DAYS: {}", ENV_PREFIX, e)
            })?),
        };
    }

    Ok(())
}

/// `ECSDEPLOY_LOG_LEVEL` and `ECSDEPLOY_LOG_FORMAT`
pub(crate) fn apply_logging_overrides<E: EnvSource>(
    logging: &mut LoggingConfig,
    env: &E,
) -> Result<()> {
    if let Some(level) = env.get("LOG_LEVEL") {
        logging.level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        logging.format = format
            .parse::<LogFormat>()
            .context("Invalid ECSDEPLOY_LOG_FORMAT value")?;
    }
    Ok(())
}

fn get_env_parsed<E, T>(env: &E, key: &str) -> Result<Option<T>>
where
    E: EnvSource,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = StackConfig::default();
        let env = env(&[
            ("ECSDEPLOY_REGION", "eu-west-1"),
            ("ECSDEPLOY_IMAGE_TAG", "v123"),
            ("ECSDEPLOY_DESIRED_COUNT", "3"),
            ("ECSDEPLOY_TASK_CPU", "1024"),
            ("ECSDEPLOY_LOG_FORMAT", "json"),
            ("ECSDEPLOY_LOG_RETENTION_DAYS", "none"),
        ]);
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.project.region, "eu-west-1");
        assert_eq!(config.compute.image_tag.as_str(), "v123");
        assert_eq!(config.compute.desired_count, 3);
        assert_eq!(config.compute.size.cpu, 1024);
        assert_eq!(config.compute.size.memory, 1024);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.observability.log_retention_days, None);
    }

    #[test]
    fn test_prefixed_region_beats_aws_region() {
        let mut config = StackConfig::default();
        let env = env(&[("AWS_REGION", "us-east-1"), ("ECSDEPLOY_REGION", "eu-west-1")]);
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.project.region, "eu-west-1");

        let mut config = StackConfig::default();
        apply_env_overrides(&mut config, &self::env(&[("AWS_REGION", "us-east-1")])).unwrap();
        assert_eq!(config.project.region, "us-east-1");
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let mut config = StackConfig::default();
        assert!(apply_env_overrides(&mut config, &env(&[("ECSDEPLOY_DESIRED_COUNT", "many")])).is_err());
        assert!(apply_env_overrides(&mut config, &env(&[("ECSDEPLOY_IMAGE_TAG", "bad tag")])).is_err());
        assert!(apply_env_overrides(&mut config, &env(&[("ECSDEPLOY_NAT_GATEWAY", "yes")])).is_err());
    }

    #[test]
    fn test_logging_from_env_before_config_load() {
        let logging = LoggingConfig::from_env(&env(&[
            ("ECSDEPLOY_LOG_LEVEL", "warn"),
            ("ECSDEPLOY_LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(logging.level, "warn");
        assert_eq!(logging.format, LogFormat::Json);

        assert!(LoggingConfig::from_env(&env(&[("ECSDEPLOY_LOG_FORMAT", "xml")])).is_err());
    }
}
