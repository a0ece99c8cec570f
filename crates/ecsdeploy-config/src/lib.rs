// ecsdeploy-config - Configuration for the stack synthesizer and the Lambda handlers
//
// Stack configuration is resolved from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from ECSDEPLOY_CONFIG env var
// 3. Config file contents from ECSDEPLOY_CONFIG_CONTENT env var
// 4. Default config file location (./ecsdeploy.toml)
// 5. Built-in defaults (lowest priority)
//
// Handler configuration is read from the Lambda environment only.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod env_overrides;
mod handler;
mod names;
mod platform;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use handler::{HandlerConfig, NotifierConfig, SlackSettings};
pub use names::{Cidr, CidrSource, ImageTag, NameError, ServiceNames, TaskSize};
pub use platform::Platform;
pub use sources::StdEnvSource;

/// Main stack configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StackConfig {
    pub project: ProjectConfig,
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    pub load_balancer: LoadBalancerConfig,
    pub compute: ComputeConfig,
    pub storage: StorageConfig,
    pub functions: FunctionsConfig,
    pub notification: NotificationConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
    pub logging: LoggingConfig,
}

/// Provider-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub region: String,
    /// Applied to every resource through the provider's default_tags
    pub default_tags: std::collections::BTreeMap<String, String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            region: "ap-northeast-1".to_string(),
            default_tags: [("ManagedBy".to_string(), "ecsdeploy".to_string())]
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetTier {
    Public,
    Private,
}

impl std::fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubnetTier::Public => write!(f, "public"),
            SubnetTier::Private => write!(f, "private"),
        }
    }
}

/// VPC and subnet layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub vpc_id: String,
    pub vpc_name: String,
    pub cidr_block: Cidr,
    pub enable_dns_hostnames: bool,
    pub subnets: Vec<SubnetConfig>,
    /// Give private subnets an egress path through a NAT gateway
    pub nat_gateway: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetConfig {
    pub id: String,
    pub name: String,
    pub availability_zone: String,
    pub cidr_block: Cidr,
    pub tier: SubnetTier,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let subnet = |id: &str, name: &str, az: &str, cidr_block, tier| SubnetConfig {
            id: id.to_string(),
            name: name.to_string(),
            availability_zone: az.to_string(),
            cidr_block,
            tier,
        };
        Self {
            vpc_id: "cdktf-production".to_string(),
            vpc_name: "cdktf production".to_string(),
            cidr_block: Cidr::v4([10, 0, 0, 0], 16),
            enable_dns_hostnames: true,
            subnets: vec![
                subnet(
                    "public-subnet1-az1a-cdktf",
                    "Public1 AZ1a cdktf",
                    "ap-northeast-1a",
                    Cidr::v4([10, 0, 0, 0], 20),
                    SubnetTier::Public,
                ),
                subnet(
                    "public-subnet1-az1c-cdktf",
                    "Public2 AZ1c cdktf",
                    "ap-northeast-1c",
                    Cidr::v4([10, 0, 16, 0], 20),
                    SubnetTier::Public,
                ),
                subnet(
                    "private-subnet1-az1a-cdktf",
                    "Private1 AZ1a cdktf",
                    "ap-northeast-1a",
                    Cidr::v4([10, 0, 128, 0], 20),
                    SubnetTier::Private,
                ),
                subnet(
                    "private-subnet1-az1c-cdktf",
                    "Private2 AZ1c cdktf",
                    "ap-northeast-1c",
                    Cidr::v4([10, 0, 144, 0], 20),
                    SubnetTier::Private,
                ),
            ],
            nat_gateway: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleProtocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

/// Security group and its rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub group_id: String,
    pub group_name: String,
    pub ingress: Vec<RuleConfig>,
    pub egress: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub protocol: RuleProtocol,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr_blocks: Vec<CidrSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            group_id: "security-for-cdktf".to_string(),
            group_name: "security-for-cdktf".to_string(),
            ingress: vec![RuleConfig {
                id: "security-ingress-for-cdktf".to_string(),
                protocol: RuleProtocol::Tcp,
                from_port: 9000,
                to_port: 9000,
                cidr_blocks: vec![CidrSource::Vpc],
                description: None,
            }],
            egress: vec![RuleConfig {
                id: "security-egress-for-cdktf".to_string(),
                protocol: RuleProtocol::All,
                from_port: 0,
                to_port: 0,
                cidr_blocks: vec![CidrSource::Block(Cidr::any())],
                description: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    Http,
    Https,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Http => "HTTP",
            ListenerProtocol::Https => "HTTPS",
        }
    }
}

/// Application load balancer, target group, listeners and routing rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub id: String,
    pub name: String,
    pub internal: bool,
    pub target_group: TargetGroupConfig,
    pub listeners: Vec<ListenerConfig>,
    pub rules: Vec<RoutingRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetGroupConfig {
    pub id: String,
    pub name: String,
    pub port: u16,
    pub protocol: ListenerProtocol,
    pub health_check: HealthCheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval_secs: u32,
    pub path: String,
    pub timeout_secs: u32,
    pub unhealthy_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub id: String,
    pub port: u16,
    pub protocol: ListenerProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRuleConfig {
    pub id: String,
    /// Id of the listener the rule is attached to
    pub listener: String,
    /// Lower values are evaluated first
    pub priority: u32,
    pub path_patterns: Vec<String>,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            id: "cdktf_for_alb".to_string(),
            name: "cdktf-for-alb".to_string(),
            internal: false,
            target_group: TargetGroupConfig::default(),
            listeners: vec![ListenerConfig {
                id: "cdktf_for_alb_listener".to_string(),
                port: 9000,
                protocol: ListenerProtocol::Http,
                certificate_arn: None,
            }],
            rules: vec![RoutingRuleConfig {
                id: "cdktf_for_alb_listener_rule".to_string(),
                listener: "cdktf_for_alb_listener".to_string(),
                priority: 100,
                path_patterns: vec!["*".to_string()],
            }],
        }
    }
}

impl Default for TargetGroupConfig {
    fn default() -> Self {
        Self {
            id: "cdktf_for_alb_target_group".to_string(),
            name: "cdktf-for-alb-target-group".to_string(),
            port: 9000,
            protocol: ListenerProtocol::Http,
            health_check: HealthCheckConfig::default(),
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            path: "/".to_string(),
            timeout_secs: 5,
            unhealthy_threshold: 2,
        }
    }
}

/// Cluster, registry, task definition and service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub names: ServiceNames,
    pub repository_id: String,
    pub repository_name: String,
    pub scan_on_push: bool,
    pub image_tag: ImageTag,
    pub container_port: u16,
    pub size: TaskSize,
    pub desired_count: u32,
    pub deployment_minimum_healthy_percent: u32,
    pub deployment_maximum_percent: u32,
    pub platform_version: String,
    pub subnet_tier: SubnetTier,
    pub assign_public_ip: bool,
    pub log_stream_prefix: String,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            names: ServiceNames::default(),
            repository_id: "repository-for-cdktf".to_string(),
            repository_name: "project/repository_for_cdktf".to_string(),
            scan_on_push: false,
            image_tag: ImageTag::latest(),
            container_port: 9000,
            size: TaskSize::default(),
            desired_count: 1,
            deployment_minimum_healthy_percent: 100,
            deployment_maximum_percent: 200,
            platform_version: "LATEST".to_string(),
            subnet_tier: SubnetTier::Public,
            assign_public_ip: true,
            log_stream_prefix: "ecs".to_string(),
        }
    }
}

/// Artifact bucket and the objects uploaded into it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket_id: String,
    pub bucket: String,
    pub force_destroy: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_id: "s3-for-cdktf".to_string(),
            bucket: "s3-for-cdktf".to_string(),
            force_destroy: false,
        }
    }
}

/// Lambda functions shared settings plus one entry per function
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionsConfig {
    pub runtime: String,
    pub handler: String,
    pub architecture: String,
    pub timeout_secs: u32,
    pub notifier: FunctionConfig,
    pub webhook: FunctionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub id: String,
    pub name: String,
    /// Object key of the deployment bundle inside the artifact bucket
    pub artifact_key: String,
    /// Local path of the bundle, uploaded at apply time
    pub artifact_source: String,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            runtime: "provided.al2023".to_string(),
            handler: "bootstrap".to_string(),
            architecture: "x86_64".to_string(),
            timeout_secs: 30,
            notifier: FunctionConfig {
                id: "cdktf_for_slack_sns".to_string(),
                name: "cdktf_for_slack_sns".to_string(),
                artifact_key: "ecr-push-notify.zip".to_string(),
                artifact_source: "target/lambda/ecr-push-notify/bootstrap.zip".to_string(),
            },
            webhook: FunctionConfig {
                id: "cdktf_for_slack_api".to_string(),
                name: "cdktf_for_slack_api".to_string(),
                artifact_key: "deploy-webhook.zip".to_string(),
                artifact_source: "target/lambda/deploy-webhook/bootstrap.zip".to_string(),
            },
        }
    }
}

/// SNS topic receiving registry push events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub topic_id: String,
    pub topic_name: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic_id: "cdktf_for_sns".to_string(),
            topic_name: "cdktf_for_sns".to_string(),
        }
    }
}

/// REST front door for the webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub id: String,
    pub name: String,
    pub path_part: String,
    pub stage_name: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            id: "cdktf_for_api_rest".to_string(),
            name: "cdktf_for_apigateway".to_string(),
            path_part: "ecs-deploy".to_string(),
            stage_name: "cdktf_for_apistage".to_string(),
        }
    }
}

/// Log groups and the registry-push event rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_retention_days: Option<u32>,
    pub event_rule_id: String,
    pub event_rule_name: String,
    pub event_rule_description: String,
    pub event_target_id: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_retention_days: Some(14),
            event_rule_id: "cdktf_for_event_rule".to_string(),
            event_rule_name: "capture_aws_ecr_update".to_string(),
            event_rule_description: "Capture each AWS ECR Update".to_string(),
            event_target_id: "SendToSNS".to_string(),
        }
    }
}

/// Logging setup shared by the CLI and the Lambda functions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            format: platform.default_log_format(),
            ..Self::default()
        }
    }

    /// Defaults for the detected platform plus the `ECSDEPLOY_LOG_*`
    /// overrides. Lets logging start before the stack config is read.
    pub fn from_env<E: EnvSource>(env: &E) -> Result<Self> {
        let mut logging = Self::for_platform(Platform::detect());
        env_overrides::apply_logging_overrides(&mut logging, env)?;
        Ok(logging)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

impl StackConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration starting from an explicit file (CLI --config)
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Parse a TOML document on top of the defaults, without env overrides
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: StackConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Subnets of one tier, in declaration order
    pub fn subnets(&self, tier: SubnetTier) -> impl Iterator<Item = &SubnetConfig> {
        self.network.subnets.iter().filter(move |s| s.tier == tier)
    }
}
