//! VPC, subnets, gateways and routing

use crate::error::{Result, StackError};
use crate::graph::{Handle, Reference, Resource, Stack};
use crate::name_tag;
use ecsdeploy_config::{NetworkConfig, SubnetTier};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

const ANYWHERE: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Serialize)]
pub struct Vpc {
    pub cidr_block: String,
    pub enable_dns_hostnames: bool,
    pub tags: BTreeMap<String, String>,
}

impl Resource for Vpc {
    const TYPE: &'static str = "aws_vpc";
}

impl Handle<Vpc> {
    pub fn cidr_block(&self) -> Reference {
        self.attr("cidr_block")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Subnet {
    pub vpc_id: Reference,
    pub availability_zone: String,
    pub cidr_block: String,
    pub map_public_ip_on_launch: bool,
    pub tags: BTreeMap<String, String>,
}

impl Resource for Subnet {
    const TYPE: &'static str = "aws_subnet";
}

#[derive(Debug, Clone, Serialize)]
pub struct InternetGateway {
    pub vpc_id: Reference,
    pub tags: BTreeMap<String, String>,
}

impl Resource for InternetGateway {
    const TYPE: &'static str = "aws_internet_gateway";
}

#[derive(Debug, Clone, Serialize)]
pub struct Eip {
    pub domain: &'static str,
    pub tags: BTreeMap<String, String>,
}

impl Resource for Eip {
    const TYPE: &'static str = "aws_eip";
}

#[derive(Debug, Clone, Serialize)]
pub struct NatGateway {
    pub allocation_id: Reference,
    pub subnet_id: Reference,
    pub tags: BTreeMap<String, String>,
}

impl Resource for NatGateway {
    const TYPE: &'static str = "aws_nat_gateway";
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteTable {
    pub vpc_id: Reference,
    pub tags: BTreeMap<String, String>,
}

impl Resource for RouteTable {
    const TYPE: &'static str = "aws_route_table";
}

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub route_table_id: Reference,
    pub destination_cidr_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_gateway_id: Option<Reference>,
}

impl Resource for Route {
    const TYPE: &'static str = "aws_route";
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteTableAssociation {
    pub route_table_id: Reference,
    pub subnet_id: Reference,
}

impl Resource for RouteTableAssociation {
    const TYPE: &'static str = "aws_route_table_association";
}

/// A declared subnet and the zone it lives in
#[derive(Debug, Clone)]
pub struct SubnetRef {
    pub handle: Handle<Subnet>,
    pub availability_zone: String,
}

/// Everything later layers need from the network
#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: Handle<Vpc>,
    pub public_subnets: Vec<SubnetRef>,
    pub private_subnets: Vec<SubnetRef>,
    pub internet_gateway: Handle<InternetGateway>,
    pub nat_gateway: Option<Handle<NatGateway>>,
    pub public_route_table: Handle<RouteTable>,
    pub private_route_table: Handle<RouteTable>,
}

impl Network {
    pub fn vpc_cidr(&self) -> Reference {
        self.vpc.cidr_block()
    }

    pub fn subnets(&self, tier: SubnetTier) -> &[SubnetRef] {
        match tier {
            SubnetTier::Public => &self.public_subnets,
            SubnetTier::Private => &self.private_subnets,
        }
    }

    pub fn subnet_ids(&self, tier: SubnetTier) -> Vec<Reference> {
        self.subnets(tier).iter().map(|s| s.handle.id()).collect()
    }

    /// Distinct zones covered by one tier
    pub fn availability_zones(&self, tier: SubnetTier) -> usize {
        self.subnets(tier)
            .iter()
            .map(|s| s.availability_zone.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

pub fn build(stack: &mut Stack, config: &NetworkConfig) -> Result<Network> {
    let public_azs: HashSet<&str> = config
        .subnets
        .iter()
        .filter(|s| s.tier == SubnetTier::Public)
        .map(|s| s.availability_zone.as_str())
        .collect();
    if public_azs.len() < 2 {
        return Err(StackError::InsufficientAvailabilityZones {
            tier: SubnetTier::Public.to_string(),
            found: public_azs.len(),
        });
    }

    let vpc = stack.declare(
        &config.vpc_id,
        Vpc {
            cidr_block: config.cidr_block.to_string(),
            enable_dns_hostnames: config.enable_dns_hostnames,
            tags: name_tag(&config.vpc_name),
        },
    )?;

    let internet_gateway = stack.declare(
        "gateway-for-cdktf",
        InternetGateway {
            vpc_id: vpc.id(),
            tags: name_tag(&format!("{} - InternetGateway", config.vpc_name)),
        },
    )?;

    let mut public_subnets = Vec::new();
    let mut private_subnets = Vec::new();
    for subnet in &config.subnets {
        let handle = stack.declare(
            &subnet.id,
            Subnet {
                vpc_id: vpc.id(),
                availability_zone: subnet.availability_zone.clone(),
                cidr_block: subnet.cidr_block.to_string(),
                map_public_ip_on_launch: subnet.tier == SubnetTier::Public,
                tags: name_tag(&subnet.name),
            },
        )?;
        let subnet_ref = SubnetRef {
            handle,
            availability_zone: subnet.availability_zone.clone(),
        };
        match subnet.tier {
            SubnetTier::Public => public_subnets.push(subnet_ref),
            SubnetTier::Private => private_subnets.push(subnet_ref),
        }
    }

    let public_route_table = stack.declare(
        "rtb-public",
        RouteTable {
            vpc_id: vpc.id(),
            tags: name_tag("rtb-public"),
        },
    )?;
    stack.declare(
        "rtb-public-default",
        Route {
            route_table_id: public_route_table.id(),
            destination_cidr_block: ANYWHERE.to_string(),
            gateway_id: Some(internet_gateway.id()),
            nat_gateway_id: None,
        },
    )?;
    associate(stack, &public_route_table, &public_subnets)?;

    // The NAT gateway sits in the first public subnet
    let nat_gateway = match (config.nat_gateway, public_subnets.first()) {
        (true, Some(first)) => {
            let eip = stack.declare(
                "eip-for-nat-gateway",
                Eip {
                    domain: "vpc",
                    tags: name_tag("cdktf nat-gateway eip"),
                },
            )?;
            let nat = stack.declare_after(
                "cdktf-nat-gateway",
                NatGateway {
                    allocation_id: eip.id(),
                    subnet_id: first.handle.id(),
                    tags: name_tag("cdktf nat-gateway"),
                },
                &[internet_gateway.address()],
            )?;
            Some(nat)
        }
        _ => None,
    };

    let private_route_table = stack.declare(
        "rtb-private",
        RouteTable {
            vpc_id: vpc.id(),
            tags: name_tag("rtb-private"),
        },
    )?;
    if let Some(nat) = &nat_gateway {
        stack.declare(
            "rtb-private-default",
            Route {
                route_table_id: private_route_table.id(),
                destination_cidr_block: ANYWHERE.to_string(),
                gateway_id: None,
                nat_gateway_id: Some(nat.id()),
            },
        )?;
    }
    associate(stack, &private_route_table, &private_subnets)?;

    debug!(
        public = public_subnets.len(),
        private = private_subnets.len(),
        nat = nat_gateway.is_some(),
        "network declared"
    );

    Ok(Network {
        vpc,
        public_subnets,
        private_subnets,
        internet_gateway,
        nat_gateway,
        public_route_table,
        private_route_table,
    })
}

fn associate(stack: &mut Stack, table: &Handle<RouteTable>, subnets: &[SubnetRef]) -> Result<()> {
    for subnet in subnets {
        stack.declare(
            &format!("{}-{}", table.address().logical_id(), subnet.handle.address().logical_id()),
            RouteTableAssociation {
                route_table_id: table.id(),
                subnet_id: subnet.handle.id(),
            },
        )?;
    }
    Ok(())
}
