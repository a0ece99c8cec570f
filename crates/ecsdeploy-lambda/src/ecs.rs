//! ECS task-definition registration and service updates
//!
//! The webhook talks to ECS through [`TaskOrchestrator`] so the deploy
//! state machine can be exercised without AWS.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecs::error::ProvideErrorMetadata;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, Compatibility, ContainerDefinition, LogConfiguration,
    LogDriver, NetworkConfiguration, NetworkMode, PortMapping, TransportProtocol,
};
use ecsdeploy_config::{HandlerConfig, ImageTag};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// ECS error categories for retry and reporting
#[derive(Debug, Clone, Error)]
pub enum EcsError {
    /// Rate limit exceeded (retryable)
    #[error("request throttled")]
    Throttled,

    /// The call did not finish within the configured bound (retryable)
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// ECS refused the request as invalid; retrying will not help
    #[error("request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The request could not be built locally
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Service-side or transport failure
    #[error("ECS error: {message}")]
    Service {
        code: Option<String>,
        message: String,
    },
}

impl EcsError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EcsError::Throttled | EcsError::Timeout { .. } | EcsError::Service { .. }
        )
    }
}

const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];
const ACCESS_DENIED_CODES: &[&str] = &["AccessDeniedException", "AccessDenied"];
const REJECTED_CODES: &[&str] = &[
    "ClientException",
    "InvalidParameterException",
    "ClusterNotFoundException",
    "ServiceNotFoundException",
    "ServiceNotActiveException",
    "PlatformUnknownException",
    "PlatformTaskDefinitionIncompatibilityException",
];

/// Classify an ECS error by its AWS error code
pub fn classify_ecs_error(code: Option<&str>, message: Option<&str>) -> EcsError {
    let message = message.unwrap_or("Unknown error").to_string();
    match code {
        Some(c) if THROTTLING_CODES.contains(&c) => EcsError::Throttled,
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => EcsError::AccessDenied(message),
        Some(c) if REJECTED_CODES.contains(&c) => EcsError::Rejected {
            code: c.to_string(),
            message,
        },
        _ => EcsError::Service {
            code: code.map(String::from),
            message,
        },
    }
}

fn from_sdk<E: ProvideErrorMetadata>(err: &E) -> EcsError {
    classify_ecs_error(err.code(), err.message())
}

/// Everything needed to register one task-definition revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRegistration {
    pub family: String,
    pub container_name: String,
    pub image: String,
    pub container_port: u16,
    pub log_group: String,
    pub log_region: Option<String>,
    pub log_stream_prefix: String,
    pub task_role_arn: String,
    pub execution_role_arn: String,
    pub cpu: String,
    pub memory: String,
}

impl TaskRegistration {
    /// The configured task definition, running `tag`
    pub fn for_tag(config: &HandlerConfig, tag: &ImageTag) -> Self {
        Self {
            family: config.names.task_family.clone(),
            container_name: config.names.container.clone(),
            image: config.image_for(tag),
            container_port: config.container_port,
            log_group: config.log_group.clone(),
            log_region: config.region.clone(),
            log_stream_prefix: config.log_stream_prefix.clone(),
            task_role_arn: config.task_role_arn.clone(),
            execution_role_arn: config.execution_role_arn.clone(),
            cpu: config.size.cpu.to_string(),
            memory: config.size.memory.to_string(),
        }
    }
}

/// A service update pointing at the latest revision of a family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUpdate {
    pub cluster: String,
    pub service: String,
    /// Family name, so ECS resolves the newest ACTIVE revision
    pub task_definition: String,
    pub desired_count: i32,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

impl ServiceUpdate {
    pub fn from_config(config: &HandlerConfig) -> Self {
        Self {
            cluster: config.names.cluster.clone(),
            service: config.names.service.clone(),
            task_definition: config.names.task_family.clone(),
            desired_count: config.desired_count,
            subnets: config.subnets.clone(),
            security_groups: vec![config.security_group.clone()],
            assign_public_ip: config.assign_public_ip,
        }
    }
}

#[async_trait]
pub trait TaskOrchestrator: Send + Sync {
    /// Returns the ARN of the new revision
    async fn register_task_definition(&self, request: &TaskRegistration) -> Result<String, EcsError>;

    async fn update_service(&self, request: &ServiceUpdate) -> Result<(), EcsError>;
}

/// [`TaskOrchestrator`] backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct EcsClient {
    client: aws_sdk_ecs::Client,
}

impl EcsClient {
    /// Credentials and region come from the Lambda environment
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self {
            client: aws_sdk_ecs::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl TaskOrchestrator for EcsClient {
    async fn register_task_definition(&self, request: &TaskRegistration) -> Result<String, EcsError> {
        let mut log_configuration = LogConfiguration::builder()
            .log_driver(LogDriver::Awslogs)
            .options("awslogs-group", &request.log_group)
            .options("awslogs-stream-prefix", &request.log_stream_prefix);
        if let Some(region) = &request.log_region {
            log_configuration = log_configuration.options("awslogs-region", region);
        }
        let log_configuration = log_configuration
            .build()
            .map_err(|e| EcsError::InvalidRequest(e.to_string()))?;

        let port = i32::from(request.container_port);
        let container = ContainerDefinition::builder()
            .name(&request.container_name)
            .image(&request.image)
            .essential(true)
            .port_mappings(
                PortMapping::builder()
                    .container_port(port)
                    .host_port(port)
                    .protocol(TransportProtocol::Tcp)
                    .build(),
            )
            .log_configuration(log_configuration)
            .build();

        let output = self
            .client
            .register_task_definition()
            .family(&request.family)
            .task_role_arn(&request.task_role_arn)
            .execution_role_arn(&request.execution_role_arn)
            .network_mode(NetworkMode::Awsvpc)
            .container_definitions(container)
            .requires_compatibilities(Compatibility::Fargate)
            .cpu(&request.cpu)
            .memory(&request.memory)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;

        let arn = output
            .task_definition()
            .and_then(|td| td.task_definition_arn())
            .unwrap_or_default()
            .to_string();
        debug!(task_definition = %arn, "registered task definition");
        Ok(arn)
    }

    async fn update_service(&self, request: &ServiceUpdate) -> Result<(), EcsError> {
        let assign_public_ip = if request.assign_public_ip {
            AssignPublicIp::Enabled
        } else {
            AssignPublicIp::Disabled
        };
        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(request.subnets.clone()))
            .set_security_groups(Some(request.security_groups.clone()))
            .assign_public_ip(assign_public_ip)
            .build()
            .map_err(|e| EcsError::InvalidRequest(e.to_string()))?;

        self.client
            .update_service()
            .cluster(&request.cluster)
            .service(&request.service)
            .desired_count(request.desired_count)
            .task_definition(&request.task_definition)
            .network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(vpc)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        Ok(())
    }
}
