//! CloudWatch log groups and the EventBridge rule feeding the push topic

use crate::document::EventPattern;
use crate::error::Result;
use crate::function::Functions;
use crate::graph::{HasArn, Handle, Reference, Resource, Stack};
use crate::notification::Notification;
use ecsdeploy_config::{ObservabilityConfig, ServiceNames};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CloudwatchLogGroup {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_in_days: Option<u32>,
}

impl Resource for CloudwatchLogGroup {
    const TYPE: &'static str = "aws_cloudwatch_log_group";
}
impl HasArn for CloudwatchLogGroup {}

#[derive(Debug, Clone, Serialize)]
pub struct CloudwatchEventRule {
    pub name: String,
    pub description: String,
    pub event_pattern: String,
}

impl Resource for CloudwatchEventRule {
    const TYPE: &'static str = "aws_cloudwatch_event_rule";
}
impl HasArn for CloudwatchEventRule {}

#[derive(Debug, Clone, Serialize)]
pub struct CloudwatchEventTarget {
    pub rule: Reference,
    pub arn: Reference,
    pub target_id: String,
}

impl Resource for CloudwatchEventTarget {
    const TYPE: &'static str = "aws_cloudwatch_event_target";
}

#[derive(Debug, Clone)]
pub struct Observability {
    pub log_groups: Vec<Handle<CloudwatchLogGroup>>,
    pub event_rule: Handle<CloudwatchEventRule>,
    pub event_target: Handle<CloudwatchEventTarget>,
}

/// The group the container's awslogs driver writes to. Declared ahead of
/// the task definition, which references it by name.
pub fn task_log_group(
    stack: &mut Stack,
    config: &ObservabilityConfig,
    names: &ServiceNames,
) -> Result<Handle<CloudwatchLogGroup>> {
    stack.declare(
        &format!("{}_logs", names.task_family),
        CloudwatchLogGroup {
            name: names.task_log_group(),
            retention_in_days: config.log_retention_days,
        },
    )
}

pub fn build(
    stack: &mut Stack,
    config: &ObservabilityConfig,
    task_logs: &Handle<CloudwatchLogGroup>,
    functions: &Functions,
    notification: &Notification,
) -> Result<Observability> {
    let retention = config.log_retention_days;
    let mut log_groups = vec![task_logs.clone()];
    for function in [&functions.notifier, &functions.webhook] {
        log_groups.push(stack.declare(
            &format!("{}_logs", function.handle.address().logical_id()),
            CloudwatchLogGroup {
                name: format!("/aws/lambda/{}", function.name),
                retention_in_days: retention,
            },
        )?);
    }

    let event_rule = stack.declare(
        &config.event_rule_id,
        CloudwatchEventRule {
            name: config.event_rule_name.clone(),
            description: config.event_rule_description.clone(),
            event_pattern: EventPattern::ecr_push_success().to_json()?,
        },
    )?;
    let event_target = stack.declare(
        &format!("{}_target", config.event_rule_id),
        CloudwatchEventTarget {
            rule: event_rule.attr("name"),
            arn: notification.topic.arn(),
            target_id: config.event_target_id.clone(),
        },
    )?;

    Ok(Observability {
        log_groups,
        event_rule,
        event_target,
    })
}
