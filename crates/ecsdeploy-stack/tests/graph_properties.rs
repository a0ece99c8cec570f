// Integration tests for ecsdeploy-stack
//
// Whole-graph properties of an assembled stack: ordering, determinism and
// what must never end up in the synthesized document.

use ecsdeploy_config::{CidrSource, StackConfig, SubnetTier};
use ecsdeploy_stack::{assemble, StackError, SYNTH_FILE};
use std::collections::HashSet;

#[test]
fn every_reference_points_backwards() {
    let assembly = assemble(&StackConfig::default()).unwrap();
    let mut seen = HashSet::new();
    for decl in assembly.stack.declarations() {
        for reference in decl.references() {
            if reference.starts_with("var.") {
                continue;
            }
            assert!(
                seen.contains(reference),
                "{} refers forward to {}",
                decl.address(),
                reference
            );
        }
        seen.insert(decl.address().to_string());
    }
}

#[test]
fn equal_configs_render_identically() {
    let a = assemble(&StackConfig::default()).unwrap();
    let b = assemble(&StackConfig::default()).unwrap();
    assert_eq!(
        a.stack.to_string_pretty().unwrap(),
        b.stack.to_string_pretty().unwrap()
    );
}

#[test]
fn empty_cidr_set_aborts_assembly() {
    let mut config = StackConfig::default();
    config.security.ingress[0].cidr_blocks = Vec::<CidrSource>::new();
    assert!(matches!(assemble(&config), Err(StackError::EmptyCidrSet)));
}

#[test]
fn single_availability_zone_rejected() {
    let mut config = StackConfig::default();
    for subnet in &mut config.network.subnets {
        subnet.availability_zone = "ap-northeast-1a".to_string();
    }
    assert!(matches!(
        assemble(&config),
        Err(StackError::InsufficientAvailabilityZones { found: 1, .. })
    ));
}

#[test]
fn secrets_stay_out_of_the_document() {
    let assembly = assemble(&StackConfig::default()).unwrap();
    let rendered = assembly.stack.to_string_pretty().unwrap();
    assert!(!rendered.contains("xoxb-"));

    let doc = assembly.stack.to_json();
    assert_eq!(doc["variable"]["slack_api_token"]["sensitive"], true);
    assert_eq!(doc["variable"]["slack_signing_secret"]["sensitive"], true);
    assert!(doc["variable"]["slack_channel"].get("sensitive").is_none());
}

#[test]
fn nat_gateway_only_when_requested() {
    let doc = assemble(&StackConfig::default()).unwrap().stack.to_json();
    assert!(doc["resource"].get("aws_nat_gateway").is_none());

    let mut config = StackConfig::default();
    config.network.nat_gateway = true;
    config.compute.subnet_tier = SubnetTier::Private;
    config.compute.assign_public_ip = false;
    let doc = assemble(&config).unwrap().stack.to_json();
    let nat = &doc["resource"]["aws_nat_gateway"]["cdktf-nat-gateway"];
    assert_eq!(nat["subnet_id"], "${aws_subnet.public-subnet1-az1a-cdktf.id}");
    assert_eq!(
        doc["resource"]["aws_lambda_function"]["cdktf_for_slack_api"]["environment"]
            ["variables"]["SUBNETS"],
        "${aws_subnet.private-subnet1-az1a-cdktf.id},${aws_subnet.private-subnet1-az1c-cdktf.id}"
    );
    assert_eq!(
        doc["resource"]["aws_lambda_function"]["cdktf_for_slack_api"]["environment"]
            ["variables"]["ASSIGN_PUBLIC_IP"],
        "false"
    );
}

#[test]
fn provider_block_carries_region_and_tags() {
    let mut config = StackConfig::default();
    config.project.region = "eu-west-1".to_string();
    config
        .project
        .default_tags
        .insert("team".to_string(), "platform".to_string());
    let doc = assemble(&config).unwrap().stack.to_json();
    assert_eq!(doc["provider"]["aws"]["region"], "eu-west-1");
    assert_eq!(doc["provider"]["aws"]["default_tags"]["tags"]["team"], "platform");
    assert_eq!(
        doc["terraform"]["required_providers"]["aws"]["source"],
        "hashicorp/aws"
    );
}

#[test]
fn synth_writes_main_tf_json() {
    let dir = tempfile::tempdir().unwrap();
    let assembly = assemble(&StackConfig::default()).unwrap();
    let path = assembly.stack.synth_to(dir.path()).unwrap();
    assert_eq!(path, dir.path().join(SYNTH_FILE));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written, assembly.stack.to_json());
}
