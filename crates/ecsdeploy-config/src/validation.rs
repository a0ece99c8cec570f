// Configuration validation
//
// Rejects values Terraform or AWS would refuse at apply time, and warns
// about legal but suspicious combinations.

use crate::*;
use anyhow::{bail, Result};
use std::collections::HashSet;
use tracing::warn;

/// Retention values CloudWatch Logs accepts
pub const LOG_RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

pub fn validate_config(config: &StackConfig) -> Result<()> {
    if config.project.region.is_empty() {
        bail!("project.region must not be empty");
    }

    validate_network_config(&config.network)?;
    validate_security_config(&config.security)?;
    validate_load_balancer_config(&config.load_balancer)?;
    validate_compute_config(&config.compute, &config.network)?;
    validate_functions_config(&config.functions)?;
    validate_observability_config(&config.observability)?;

    if config.storage.bucket.is_empty() {
        bail!("storage.bucket must not be empty");
    }

    Ok(())
}

fn validate_network_config(config: &NetworkConfig) -> Result<()> {
    let mut ids = HashSet::new();
    for subnet in &config.subnets {
        if !ids.insert(subnet.id.as_str()) {
            bail!("network.subnets: duplicate subnet id '{}'", subnet.id);
        }
        if !config.cidr_block.contains(&subnet.cidr_block) {
            bail!(
                "network.subnets: {} ({}) lies outside the VPC block {}",
                subnet.id,
                subnet.cidr_block,
                config.cidr_block
            );
        }
    }

    for (i, a) in config.subnets.iter().enumerate() {
        for b in &config.subnets[i + 1..] {
            if a.cidr_block.overlaps(&b.cidr_block) {
                bail!(
                    "network.subnets: {} ({}) overlaps {} ({})",
                    a.id,
                    a.cidr_block,
                    b.id,
                    b.cidr_block
                );
            }
        }
    }

    let public_azs: HashSet<&str> = config
        .subnets
        .iter()
        .filter(|s| s.tier == SubnetTier::Public)
        .map(|s| s.availability_zone.as_str())
        .collect();
    if public_azs.len() < 2 {
        bail!(
            "network.subnets: public subnets must span at least two availability zones (found {})",
            public_azs.len()
        );
    }

    Ok(())
}

fn validate_security_config(config: &SecurityConfig) -> Result<()> {
    for rule in config.ingress.iter().chain(&config.egress) {
        if rule.cidr_blocks.is_empty() {
            bail!("security rule '{}' has no CIDR blocks", rule.id);
        }
        if rule.from_port > rule.to_port {
            bail!(
                "security rule '{}': from_port {} is above to_port {}",
                rule.id,
                rule.from_port,
                rule.to_port
            );
        }
        if rule.protocol == RuleProtocol::All && (rule.from_port != 0 || rule.to_port != 0) {
            bail!(
                "security rule '{}': protocol 'all' requires ports 0-0",
                rule.id
            );
        }
    }
    Ok(())
}

fn validate_load_balancer_config(config: &LoadBalancerConfig) -> Result<()> {
    if config.listeners.is_empty() {
        bail!("load_balancer.listeners must not be empty");
    }

    let mut ports = HashSet::new();
    for listener in &config.listeners {
        if listener.port == 0 {
            bail!("load_balancer listener '{}': port must be non-zero", listener.id);
        }
        if !ports.insert(listener.port) {
            bail!("load_balancer: port {} has two listeners", listener.port);
        }
        if listener.protocol == ListenerProtocol::Https && listener.certificate_arn.is_none() {
            bail!(
                "load_balancer listener '{}': HTTPS requires certificate_arn",
                listener.id
            );
        }
    }

    let mut priorities = HashSet::new();
    for rule in &config.rules {
        if !(1..=50_000).contains(&rule.priority) {
            bail!(
                "load_balancer rule '{}': priority {} outside 1..=50000",
                rule.id,
                rule.priority
            );
        }
        if !priorities.insert(rule.priority) {
            bail!("load_balancer: duplicate rule priority {}", rule.priority);
        }
        if !config.listeners.iter().any(|l| l.id == rule.listener) {
            bail!(
                "load_balancer rule '{}': unknown listener '{}'",
                rule.id,
                rule.listener
            );
        }
        if rule.path_patterns.is_empty() {
            bail!("load_balancer rule '{}': path_patterns must not be empty", rule.id);
        }
    }

    let tg = &config.target_group;
    if tg.port == 0 {
        bail!("load_balancer.target_group.port must be non-zero");
    }
    let hc = &tg.health_check;
    if hc.timeout_secs >= hc.interval_secs {
        bail!(
            "health check timeout ({}s) must be shorter than interval ({}s)",
            hc.timeout_secs,
            hc.interval_secs
        );
    }
    if !hc.path.starts_with('/') {
        bail!("health check path must start with '/': {}", hc.path);
    }
    if !(2..=10).contains(&hc.unhealthy_threshold) {
        bail!(
            "health check unhealthy_threshold {} outside 2..=10",
            hc.unhealthy_threshold
        );
    }

    Ok(())
}

fn validate_compute_config(config: &ComputeConfig, network: &NetworkConfig) -> Result<()> {
    let names = &config.names;
    for (field, value) in [
        ("cluster", &names.cluster),
        ("task_family", &names.task_family),
        ("container", &names.container),
        ("service", &names.service),
    ] {
        if value.is_empty() {
            bail!("compute.names.{} must not be empty", field);
        }
    }

    if config.container_port == 0 {
        bail!("compute.container_port must be non-zero");
    }

    config.size.validate()?;

    if config.deployment_minimum_healthy_percent > config.deployment_maximum_percent {
        bail!(
            "compute: minimum healthy percent {} exceeds maximum percent {}",
            config.deployment_minimum_healthy_percent,
            config.deployment_maximum_percent
        );
    }
    if config.deployment_maximum_percent < 100 {
        bail!(
            "compute.deployment_maximum_percent must be at least 100 (got {})",
            config.deployment_maximum_percent
        );
    }

    if !network.subnets.iter().any(|s| s.tier == config.subnet_tier) {
        bail!("compute.subnet_tier '{}' has no subnets", config.subnet_tier);
    }

    if config.desired_count == 0 {
        warn!("compute.desired_count is 0; the service will run no tasks");
    }

    if config.subnet_tier == SubnetTier::Private && !network.nat_gateway {
        warn!(
            "compute.subnet_tier is private without network.nat_gateway; tasks cannot pull images"
        );
    }

    Ok(())
}

fn validate_functions_config(config: &FunctionsConfig) -> Result<()> {
    if !(1..=900).contains(&config.timeout_secs) {
        bail!(
            "functions.timeout_secs {} outside 1..=900",
            config.timeout_secs
        );
    }
    if config.notifier.id == config.webhook.id || config.notifier.name == config.webhook.name {
        bail!("functions: notifier and webhook must have distinct ids and names");
    }
    if config.notifier.artifact_key == config.webhook.artifact_key {
        bail!("functions: notifier and webhook must use distinct artifact keys");
    }
    Ok(())
}

fn validate_observability_config(config: &ObservabilityConfig) -> Result<()> {
    if let Some(days) = config.log_retention_days {
        if !LOG_RETENTION_DAYS.contains(&days) {
            bail!(
                "observability.log_retention_days {} is not a CloudWatch retention value",
                days
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_subnets_need_two_azs() {
        let mut config = StackConfig::default();
        for subnet in &mut config.network.subnets {
            subnet.availability_zone = "ap-northeast-1a".to_string();
        }
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("two availability zones"));
    }

    #[test]
    fn test_subnet_outside_vpc_rejected() {
        let mut config = StackConfig::default();
        config.network.subnets[0].cidr_block = "10.1.0.0/20".parse().unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_overlapping_subnets_rejected() {
        let mut config = StackConfig::default();
        config.network.subnets[1].cidr_block = "10.0.0.0/21".parse().unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_deployment_percents() {
        let mut config = StackConfig::default();
        config.compute.deployment_minimum_healthy_percent = 250;
        assert!(validate_config(&config).is_err());

        let mut config = StackConfig::default();
        config.compute.deployment_minimum_healthy_percent = 0;
        config.compute.deployment_maximum_percent = 50;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_security_rule_checks() {
        let mut config = StackConfig::default();
        config.security.ingress[0].cidr_blocks.clear();
        assert!(validate_config(&config).is_err());

        let mut config = StackConfig::default();
        config.security.ingress[0].from_port = 9001;
        assert!(validate_config(&config).is_err());

        let mut config = StackConfig::default();
        config.security.egress[0].to_port = 443;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_listener_and_rule_checks() {
        let mut config = StackConfig::default();
        config.load_balancer.listeners[0].protocol = ListenerProtocol::Https;
        assert!(validate_config(&config).is_err());
        config.load_balancer.listeners[0].certificate_arn =
            Some("arn:aws:acm:ap-northeast-1:123456789012:certificate/x".to_string());
        assert!(validate_config(&config).is_ok());

        let mut config = StackConfig::default();
        config.load_balancer.rules[0].priority = 0;
        assert!(validate_config(&config).is_err());

        let mut config = StackConfig::default();
        let dup = config.load_balancer.rules[0].clone();
        config.load_balancer.rules.push(RoutingRuleConfig {
            id: "second".to_string(),
            ..dup
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_health_check_checks() {
        let mut config = StackConfig::default();
        config.load_balancer.target_group.health_check.timeout_secs = 30;
        assert!(validate_config(&config).is_err());

        let mut config = StackConfig::default();
        config.load_balancer.target_group.health_check.path = "health".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_retention_values() {
        let mut config = StackConfig::default();
        config.observability.log_retention_days = Some(10);
        assert!(validate_config(&config).is_err());
        config.observability.log_retention_days = Some(30);
        assert!(validate_config(&config).is_ok());
        config.observability.log_retention_days = None;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_private_tier_without_nat_is_legal() {
        let mut config = StackConfig::default();
        config.compute.subnet_tier = SubnetTier::Private;
        config.compute.assign_public_ip = false;
        assert!(validate_config(&config).is_ok());
    }
}
