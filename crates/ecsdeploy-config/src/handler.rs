// Runtime configuration for the two Lambda functions
//
// Unlike StackConfig there is no file layer: everything comes from the
// function environment the stack wires up, read without the ECSDEPLOY_ prefix.

use crate::env_overrides::EnvSource;
use crate::{ImageTag, LogFormat, LoggingConfig, Platform, ServiceNames, TaskSize};
use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::time::Duration;

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REGISTER_MAX_ATTEMPTS: u32 = 2;

/// Slack credentials shared by both functions
#[derive(Clone)]
pub struct SlackSettings {
    pub api_token: String,
    /// Fallback channel when the interaction payload carries none
    pub channel: Option<String>,
    /// Request signing is verified only when this is set
    pub signing_secret: Option<String>,
}

impl fmt::Debug for SlackSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackSettings")
            .field("api_token", &"<redacted>")
            .field("channel", &self.channel)
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl SlackSettings {
    fn from_env<E: EnvSource>(env: &E) -> Result<Self> {
        Ok(Self {
            api_token: required(env, "SLACK_API_TOKEN")?,
            channel: optional(env, "SLACK_CHANNEL"),
            signing_secret: optional(env, "SLACK_SIGNING_SECRET"),
        })
    }
}

/// Configuration of the deploy webhook function
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub slack: SlackSettings,
    pub names: ServiceNames,
    /// Registry URL without tag, e.g. `<acct>.dkr.ecr.<region>.amazonaws.com/project/repo`
    pub docker_image_path: String,
    pub subnets: Vec<String>,
    pub security_group: String,
    /// Mirrors the service the stack declared
    pub assign_public_ip: bool,
    pub task_role_arn: String,
    pub execution_role_arn: String,
    pub size: TaskSize,
    pub container_port: u16,
    pub desired_count: i32,
    pub log_group: String,
    pub log_stream_prefix: String,
    pub region: Option<String>,
    /// Upper bound on each orchestration call
    pub call_timeout: Duration,
    pub register_max_attempts: u32,
    /// Legacy behavior: update the service even when registration failed
    pub update_on_registration_failure: bool,
    pub logging: LoggingConfig,
}

impl HandlerConfig {
    pub fn from_env<E: EnvSource>(env: &E) -> Result<Self> {
        let names = ServiceNames {
            cluster: required(env, "CLUSTER_NAME")?,
            task_family: required(env, "TASK_FAMILY")?,
            container: required(env, "CONTAINER_NAME")?,
            service: required(env, "SERVICE_NAME")?,
        };

        let subnets = match optional(env, "SUBNETS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => ["SUBNET_1", "SUBNET_2"]
                .iter()
                .filter_map(|key| optional(env, key))
                .collect::<Vec<_>>(),
        };
        if subnets.is_empty() {
            bail!("SUBNETS (or SUBNET_1/SUBNET_2) must name at least one subnet");
        }

        let defaults = TaskSize::default();
        let size = TaskSize {
            cpu: parsed(env, "CPU")?.unwrap_or(defaults.cpu),
            memory: parsed(env, "MEMORY")?.unwrap_or(defaults.memory),
        };
        size.validate()?;

        let log_group = optional(env, "LOG_GROUP").unwrap_or_else(|| names.task_log_group());

        let register_max_attempts =
            parsed(env, "REGISTER_MAX_ATTEMPTS")?.unwrap_or(DEFAULT_REGISTER_MAX_ATTEMPTS);
        if register_max_attempts == 0 {
            bail!("REGISTER_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            slack: SlackSettings::from_env(env)?,
            docker_image_path: required(env, "DOCKER_IMAGE_PATH")?,
            subnets,
            security_group: required(env, "SECURITY")?,
            assign_public_ip: parsed(env, "ASSIGN_PUBLIC_IP")?.unwrap_or(true),
            task_role_arn: required(env, "TASK_ROLE_ARN")?,
            execution_role_arn: required(env, "EXECUTION_ROLE_ARN")?,
            size,
            container_port: parsed(env, "CONTAINER_PORT")?.unwrap_or(9000),
            desired_count: parsed(env, "DESIRED_COUNT")?.unwrap_or(1),
            log_group,
            log_stream_prefix: optional(env, "LOG_STREAM_PREFIX")
                .unwrap_or_else(|| "ecs".to_string()),
            region: optional(env, "AWS_REGION"),
            call_timeout: Duration::from_secs(
                parsed(env, "CALL_TIMEOUT_SECS")?.unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
            ),
            register_max_attempts,
            update_on_registration_failure: parsed(env, "UPDATE_ON_REGISTRATION_FAILURE")?
                .unwrap_or(false),
            logging: logging_from_env(env)?,
            names,
        })
    }

    /// `<DOCKER_IMAGE_PATH>:<tag>`
    pub fn image_for(&self, tag: &ImageTag) -> String {
        format!("{}:{}", self.docker_image_path, tag)
    }
}

/// Configuration of the registry push notifier function
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub slack: SlackSettings,
    pub channel: String,
    pub logging: LoggingConfig,
}

impl NotifierConfig {
    pub fn from_env<E: EnvSource>(env: &E) -> Result<Self> {
        let slack = SlackSettings::from_env(env)?;
        let channel = slack
            .channel
            .clone()
            .ok_or_else(|| anyhow!("missing required environment variable SLACK_CHANNEL"))?;
        Ok(Self {
            slack,
            channel,
            logging: logging_from_env(env)?,
        })
    }
}

fn logging_from_env<E: EnvSource>(env: &E) -> Result<LoggingConfig> {
    let mut logging = LoggingConfig::for_platform(Platform::detect());
    if let Some(level) = optional(env, "LOG_LEVEL") {
        logging.level = level;
    }
    if let Some(format) = optional(env, "LOG_FORMAT") {
        logging.format = format.parse::<LogFormat>()?;
    }
    Ok(logging)
}

/// Empty values count as unset; Terraform renders unset optional variables as ""
fn optional<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get_raw(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<E: EnvSource>(env: &E, key: &str) -> Result<String> {
    optional(env, key).ok_or_else(|| anyhow!("missing required environment variable {}", key))
}

fn parsed<E, T>(env: &E, key: &str) -> Result<Option<T>>
where
    E: EnvSource,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional(env, key)
        .map(|v| v.parse::<T>().with_context(|| format!("Failed to parse {}", key)))
        .transpose()
}
