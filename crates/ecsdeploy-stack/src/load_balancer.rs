//! Application load balancer, target group, listeners and path routing

use crate::error::{Result, StackError};
use crate::graph::{Address, HasArn, Handle, Reference, Resource, Stack};
use crate::network::Network;
use crate::security::Security;
use ecsdeploy_config::{
    ListenerConfig, ListenerProtocol, LoadBalancerConfig, RoutingRuleConfig, SubnetTier,
    TargetGroupConfig,
};
use serde::Serialize;

const TLS_POLICY: &str = "ELBSecurityPolicy-TLS13-1-2-2021-06";

#[derive(Debug, Clone, Serialize)]
pub struct Lb {
    pub name: String,
    pub internal: bool,
    pub load_balancer_type: &'static str,
    pub security_groups: Vec<Reference>,
    pub subnets: Vec<Reference>,
    pub ip_address_type: &'static str,
    pub enable_http2: bool,
}

impl Resource for Lb {
    const TYPE: &'static str = "aws_lb";
}
impl HasArn for Lb {}

impl Handle<Lb> {
    pub fn dns_name(&self) -> Reference {
        self.attr("dns_name")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub interval: u32,
    pub path: String,
    pub port: &'static str,
    pub protocol: &'static str,
    pub timeout: u32,
    pub unhealthy_threshold: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LbTargetGroup {
    pub name: String,
    pub port: u16,
    pub protocol: &'static str,
    pub target_type: &'static str,
    pub vpc_id: Reference,
    pub health_check: HealthCheck,
}

impl Resource for LbTargetGroup {
    const TYPE: &'static str = "aws_lb_target_group";
}
impl HasArn for LbTargetGroup {}

#[derive(Debug, Clone, Serialize)]
pub struct ForwardAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub target_group_arn: Reference,
}

impl ForwardAction {
    fn to(target_group: &TargetGroup) -> Self {
        Self {
            kind: "forward",
            target_group_arn: target_group.handle.arn(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LbListener {
    pub load_balancer_arn: Reference,
    pub port: u16,
    pub protocol: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_policy: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
    pub default_action: ForwardAction,
}

impl Resource for LbListener {
    const TYPE: &'static str = "aws_lb_listener";
}
impl HasArn for LbListener {}

#[derive(Debug, Clone, Serialize)]
pub struct PathPattern {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleCondition {
    pub path_pattern: PathPattern,
}

#[derive(Debug, Clone, Serialize)]
pub struct LbListenerRule {
    pub listener_arn: Reference,
    pub priority: u32,
    pub action: ForwardAction,
    pub condition: RuleCondition,
}

impl Resource for LbListenerRule {
    const TYPE: &'static str = "aws_lb_listener_rule";
}

/// A load balancer and the VPC its subnets belong to
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub handle: Handle<Lb>,
    vpc: Address,
}

/// A target group and the VPC it was bound to
#[derive(Debug, Clone)]
pub struct TargetGroup {
    pub handle: Handle<LbTargetGroup>,
    vpc: Address,
}

#[derive(Debug, Clone)]
pub struct Listener {
    pub id: String,
    pub handle: Handle<LbListener>,
}

#[derive(Debug, Clone)]
pub struct LoadBalancing {
    pub load_balancer: LoadBalancer,
    pub target_group: TargetGroup,
    pub listeners: Vec<Listener>,
    pub rules: Vec<Handle<LbListenerRule>>,
}

impl LoadBalancing {
    pub fn listener_addresses(&self) -> Vec<&Address> {
        self.listeners.iter().map(|l| l.handle.address()).collect()
    }
}

/// One internet-facing (or internal) ALB on the public subnets
pub fn declare_load_balancer(
    stack: &mut Stack,
    config: &LoadBalancerConfig,
    network: &Network,
    security: &Security,
) -> Result<LoadBalancer> {
    if security.vpc() != network.vpc.address() {
        return Err(StackError::ForeignSecurityGroup {
            group_vpc: security.vpc().to_string(),
            network_vpc: network.vpc.address().to_string(),
        });
    }
    let handle = stack.declare(
        &config.id,
        Lb {
            name: config.name.clone(),
            internal: config.internal,
            load_balancer_type: "application",
            security_groups: vec![security.group.id()],
            subnets: network.subnet_ids(SubnetTier::Public),
            ip_address_type: "ipv4",
            enable_http2: true,
        },
    )?;
    Ok(LoadBalancer {
        handle,
        vpc: network.vpc.address().clone(),
    })
}

pub fn declare_target_group(
    stack: &mut Stack,
    config: &TargetGroupConfig,
    network: &Network,
) -> Result<TargetGroup> {
    let hc = &config.health_check;
    let handle = stack.declare(
        &config.id,
        LbTargetGroup {
            name: config.name.clone(),
            port: config.port,
            protocol: config.protocol.as_str(),
            target_type: "ip",
            vpc_id: network.vpc.id(),
            health_check: HealthCheck {
                interval: hc.interval_secs,
                path: hc.path.clone(),
                port: "traffic-port",
                protocol: config.protocol.as_str(),
                timeout: hc.timeout_secs,
                unhealthy_threshold: hc.unhealthy_threshold,
            },
        },
    )?;
    Ok(TargetGroup {
        handle,
        vpc: network.vpc.address().clone(),
    })
}

/// Fails with [`StackError::VpcMismatch`] unless both sides share a VPC
pub fn declare_listener(
    stack: &mut Stack,
    config: &ListenerConfig,
    load_balancer: &LoadBalancer,
    target_group: &TargetGroup,
) -> Result<Listener> {
    if target_group.vpc != load_balancer.vpc {
        return Err(StackError::VpcMismatch {
            listener: config.id.clone(),
            target_group_vpc: target_group.vpc.to_string(),
            load_balancer_vpc: load_balancer.vpc.to_string(),
        });
    }
    let https = config.protocol == ListenerProtocol::Https;
    let handle = stack.declare(
        &config.id,
        LbListener {
            load_balancer_arn: load_balancer.handle.arn(),
            port: config.port,
            protocol: config.protocol.as_str(),
            ssl_policy: https.then_some(TLS_POLICY),
            certificate_arn: config.certificate_arn.clone(),
            default_action: ForwardAction::to(target_group),
        },
    )?;
    Ok(Listener {
        id: config.id.clone(),
        handle,
    })
}

pub fn declare_rule(
    stack: &mut Stack,
    config: &RoutingRuleConfig,
    listener: &Listener,
    target_group: &TargetGroup,
) -> Result<Handle<LbListenerRule>> {
    stack.declare(
        &config.id,
        LbListenerRule {
            listener_arn: listener.handle.arn(),
            priority: config.priority,
            action: ForwardAction::to(target_group),
            condition: RuleCondition {
                path_pattern: PathPattern {
                    values: config.path_patterns.clone(),
                },
            },
        },
    )
}

pub fn build(
    stack: &mut Stack,
    config: &LoadBalancerConfig,
    network: &Network,
    security: &Security,
) -> Result<LoadBalancing> {
    let load_balancer = declare_load_balancer(stack, config, network, security)?;
    let target_group = declare_target_group(stack, &config.target_group, network)?;

    let listeners = config
        .listeners
        .iter()
        .map(|l| declare_listener(stack, l, &load_balancer, &target_group))
        .collect::<Result<Vec<_>>>()?;

    let mut rules = Vec::with_capacity(config.rules.len());
    for rule in &config.rules {
        let listener = listeners
            .iter()
            .find(|l| l.id == rule.listener)
            .ok_or_else(|| StackError::UnknownListener {
                rule: rule.id.clone(),
                listener: rule.listener.clone(),
            })?;
        rules.push(declare_rule(stack, rule, listener, &target_group)?);
    }

    Ok(LoadBalancing {
        load_balancer,
        target_group,
        listeners,
        rules,
    })
}
