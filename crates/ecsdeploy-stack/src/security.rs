//! Security group and its ingress/egress rules

use crate::error::{Result, StackError};
use crate::graph::{Address, Handle, Reference, Resource, Stack};
use crate::name_tag;
use crate::network::Network;
use ecsdeploy_config::{CidrSource, RuleConfig, RuleProtocol, SecurityConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroup {
    pub name: String,
    pub vpc_id: Reference,
    pub tags: BTreeMap<String, String>,
}

impl Resource for SecurityGroup {
    const TYPE: &'static str = "aws_security_group";
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroupRule {
    #[serde(rename = "type")]
    pub direction: Direction,
    pub security_group_id: Reference,
    pub protocol: &'static str,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr_blocks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Resource for SecurityGroupRule {
    const TYPE: &'static str = "aws_security_group_rule";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

/// A validated rule, ready to be bound to a group
#[derive(Debug, Clone)]
pub struct SecurityRule {
    direction: Direction,
    protocol: RuleProtocol,
    ports: RangeInclusive<u16>,
    cidrs: Vec<CidrSource>,
    description: Option<String>,
}

impl SecurityRule {
    pub fn new(
        direction: Direction,
        protocol: RuleProtocol,
        ports: RangeInclusive<u16>,
        cidrs: Vec<CidrSource>,
    ) -> Result<Self> {
        if cidrs.is_empty() {
            return Err(StackError::EmptyCidrSet);
        }
        if ports.start() > ports.end() {
            return Err(StackError::InvalidRule(format!(
                "port range {}-{} is inverted",
                ports.start(),
                ports.end()
            )));
        }
        if protocol == RuleProtocol::All && (*ports.start() != 0 || *ports.end() != 0) {
            return Err(StackError::InvalidRule(
                "protocol 'all' requires ports 0-0".to_string(),
            ));
        }
        Ok(Self {
            direction,
            protocol,
            ports,
            cidrs,
            description: None,
        })
    }

    pub fn from_config(direction: Direction, rule: &RuleConfig) -> Result<Self> {
        let mut built = Self::new(
            direction,
            rule.protocol,
            rule.from_port..=rule.to_port,
            rule.cidr_blocks.clone(),
        )?;
        built.description = rule.description.clone();
        Ok(built)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

fn protocol_name(protocol: RuleProtocol) -> &'static str {
    match protocol {
        RuleProtocol::Tcp => "tcp",
        RuleProtocol::Udp => "udp",
        RuleProtocol::Icmp => "icmp",
        RuleProtocol::All => "-1",
    }
}

/// The security group, bound to the VPC it was declared in
#[derive(Debug, Clone)]
pub struct Security {
    pub group: Handle<SecurityGroup>,
    vpc: Address,
}

impl Security {
    /// Declare the group alone; rules follow through [`Security::add_rule`]
    pub fn declare(stack: &mut Stack, id: &str, name: &str, network: &Network) -> Result<Self> {
        let group = stack.declare(
            id,
            SecurityGroup {
                name: name.to_string(),
                vpc_id: network.vpc.id(),
                tags: name_tag(&format!("ECS {}", name)),
            },
        )?;
        Ok(Self {
            group,
            vpc: network.vpc.address().clone(),
        })
    }

    pub fn vpc(&self) -> &Address {
        &self.vpc
    }

    pub fn add_rule(
        &self,
        stack: &mut Stack,
        id: &str,
        network: &Network,
        rule: &SecurityRule,
    ) -> Result<Handle<SecurityGroupRule>> {
        if network.vpc.address() != &self.vpc {
            return Err(StackError::ForeignSecurityGroup {
                group_vpc: self.vpc.to_string(),
                network_vpc: network.vpc.address().to_string(),
            });
        }
        let cidr_blocks = rule
            .cidrs
            .iter()
            .map(|source| match source {
                CidrSource::Vpc => network.vpc_cidr().to_string(),
                CidrSource::Block(cidr) => cidr.to_string(),
            })
            .collect();
        stack.declare(
            id,
            SecurityGroupRule {
                direction: rule.direction,
                security_group_id: self.group.id(),
                protocol: protocol_name(rule.protocol),
                from_port: *rule.ports.start(),
                to_port: *rule.ports.end(),
                cidr_blocks,
                description: rule.description.clone(),
            },
        )
    }
}

pub fn build(stack: &mut Stack, config: &SecurityConfig, network: &Network) -> Result<Security> {
    // Validate every rule before declaring anything
    let rules = config
        .ingress
        .iter()
        .map(|r| (Direction::Ingress, r))
        .chain(config.egress.iter().map(|r| (Direction::Egress, r)))
        .map(|(direction, r)| Ok((r.id.as_str(), SecurityRule::from_config(direction, r)?)))
        .collect::<Result<Vec<_>>>()?;

    let security = Security::declare(stack, &config.group_id, &config.group_name, network)?;
    for (id, rule) in &rules {
        security.add_rule(stack, id, network, rule)?;
    }
    Ok(security)
}
