//! ECS cluster, ECR repository, task definition and service

use crate::error::{Result, StackError};
use crate::graph::{HasArn, Handle, Reference, Resource, Stack};
use crate::identity::Identity;
use crate::load_balancer::LoadBalancing;
use crate::network::Network;
use crate::observability::CloudwatchLogGroup;
use crate::security::Security;
use ecsdeploy_config::{ComputeConfig, ImageTag};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LaunchType {
    Fargate,
}

impl LaunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchType::Fargate => "FARGATE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EcsCluster {
    pub name: String,
}

impl Resource for EcsCluster {
    const TYPE: &'static str = "aws_ecs_cluster";
}
impl HasArn for EcsCluster {}

#[derive(Debug, Clone, Serialize)]
pub struct ImageScanningConfiguration {
    pub scan_on_push: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EcrRepository {
    pub name: String,
    pub image_tag_mutability: &'static str,
    pub image_scanning_configuration: ImageScanningConfiguration,
}

impl Resource for EcrRepository {
    const TYPE: &'static str = "aws_ecr_repository";
}
impl HasArn for EcrRepository {}

impl Handle<EcrRepository> {
    pub fn repository_url(&self) -> Reference {
        self.attr("repository_url")
    }
}

/// `<registry-url>:<tag>`
#[derive(Debug, Clone)]
pub struct ImageReference {
    pub repository_url: Reference,
    pub tag: ImageTag,
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository_url, self.tag)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfiguration {
    pub log_driver: &'static str,
    pub options: BTreeMap<String, String>,
}

impl LogConfiguration {
    pub fn awslogs(group: &str, region: &str, stream_prefix: &str) -> Self {
        Self {
            log_driver: "awslogs",
            options: [
                ("awslogs-group", group),
                ("awslogs-region", region),
                ("awslogs-stream-prefix", stream_prefix),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        }
    }
}

/// One entry of a task definition's `container_definitions`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    pub essential: bool,
    pub port_mappings: Vec<PortMapping>,
    pub log_configuration: LogConfiguration,
}

#[derive(Debug, Clone, Serialize)]
pub struct EcsTaskDefinition {
    pub family: String,
    /// JSON array of [`ContainerDefinition`]
    pub container_definitions: String,
    pub network_mode: &'static str,
    pub execution_role_arn: Reference,
    pub task_role_arn: Reference,
    pub cpu: String,
    pub memory: String,
    pub requires_compatibilities: Vec<LaunchType>,
}

impl Resource for EcsTaskDefinition {
    const TYPE: &'static str = "aws_ecs_task_definition";
}
impl HasArn for EcsTaskDefinition {}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceNetworkConfiguration {
    pub subnets: Vec<Reference>,
    pub security_groups: Vec<Reference>,
    pub assign_public_ip: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceLoadBalancer {
    pub target_group_arn: Reference,
    pub container_name: String,
    pub container_port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lifecycle {
    pub ignore_changes: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EcsService {
    pub name: String,
    pub cluster: Reference,
    pub task_definition: Reference,
    pub desired_count: u32,
    pub launch_type: LaunchType,
    pub platform_version: String,
    pub deployment_maximum_percent: u32,
    pub deployment_minimum_healthy_percent: u32,
    pub network_configuration: ServiceNetworkConfiguration,
    pub load_balancer: ServiceLoadBalancer,
    /// The redeploy webhook moves the service to new revisions outside Terraform
    pub lifecycle: Lifecycle,
}

impl Resource for EcsService {
    const TYPE: &'static str = "aws_ecs_service";
}

#[derive(Debug, Clone)]
pub struct Compute {
    pub cluster: Handle<EcsCluster>,
    pub repository: Handle<EcrRepository>,
    pub task_definition: Handle<EcsTaskDefinition>,
    pub service: Handle<EcsService>,
    pub image: ImageReference,
    pub log_group: Handle<CloudwatchLogGroup>,
    pub desired_count: u32,
    pub launch_type: LaunchType,
}

pub fn build(
    stack: &mut Stack,
    config: &ComputeConfig,
    network: &Network,
    security: &Security,
    identity: &Identity,
    load_balancing: &LoadBalancing,
    log_group: &Handle<CloudwatchLogGroup>,
) -> Result<Compute> {
    config.size.validate()?;
    let subnets = network.subnet_ids(config.subnet_tier);
    if subnets.is_empty() {
        return Err(StackError::NoSubnets {
            tier: config.subnet_tier.to_string(),
        });
    }
    let zones = network.availability_zones(config.subnet_tier);
    if zones < 2 {
        return Err(StackError::InsufficientAvailabilityZones {
            tier: config.subnet_tier.to_string(),
            found: zones,
        });
    }

    let names = &config.names;
    let launch_type = LaunchType::Fargate;

    let cluster = stack.declare(
        &names.cluster,
        EcsCluster {
            name: names.cluster.clone(),
        },
    )?;

    let repository = stack.declare(
        &config.repository_id,
        EcrRepository {
            name: config.repository_name.clone(),
            image_tag_mutability: "MUTABLE",
            image_scanning_configuration: ImageScanningConfiguration {
                scan_on_push: config.scan_on_push,
            },
        },
    )?;

    let image = ImageReference {
        repository_url: repository.repository_url(),
        tag: config.image_tag.clone(),
    };
    let container = ContainerDefinition {
        name: names.container.clone(),
        image: image.to_string(),
        essential: true,
        port_mappings: vec![PortMapping {
            container_port: config.container_port,
            host_port: config.container_port,
            protocol: "tcp",
        }],
        log_configuration: LogConfiguration::awslogs(
            &log_group.attr("name").to_string(),
            stack.region(),
            &config.log_stream_prefix,
        ),
    };

    let task_definition = stack.declare(
        &names.task_family,
        EcsTaskDefinition {
            family: names.task_family.clone(),
            container_definitions: serde_json::to_string(&[container])?,
            network_mode: "awsvpc",
            execution_role_arn: identity.execution_role.arn(),
            task_role_arn: identity.task_role.arn(),
            cpu: config.size.cpu.to_string(),
            memory: config.size.memory.to_string(),
            requires_compatibilities: vec![launch_type],
        },
    )?;

    let service = stack.declare_after(
        &names.service,
        EcsService {
            name: names.service.clone(),
            cluster: cluster.id(),
            task_definition: task_definition.arn(),
            desired_count: config.desired_count,
            launch_type,
            platform_version: config.platform_version.clone(),
            deployment_maximum_percent: config.deployment_maximum_percent,
            deployment_minimum_healthy_percent: config.deployment_minimum_healthy_percent,
            network_configuration: ServiceNetworkConfiguration {
                subnets,
                security_groups: vec![security.group.id()],
                assign_public_ip: config.assign_public_ip,
            },
            load_balancer: ServiceLoadBalancer {
                target_group_arn: load_balancing.target_group.handle.arn(),
                container_name: names.container.clone(),
                container_port: config.container_port,
            },
            lifecycle: Lifecycle {
                ignore_changes: vec!["task_definition"],
            },
        },
        &load_balancing.listener_addresses(),
    )?;

    Ok(Compute {
        cluster,
        repository,
        task_definition,
        service,
        image,
        log_group: log_group.clone(),
        desired_count: config.desired_count,
        launch_type,
    })
}
