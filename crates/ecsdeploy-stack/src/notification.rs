//! SNS topic fed by EventBridge, with the notifier subscribed to it

use crate::document::{PolicyDocument, Statement};
use crate::error::Result;
use crate::function::{grant_invoke, Function, InvokeGrant, InvokePrincipal};
use crate::graph::{HasArn, Handle, Reference, Resource, Stack};
use ecsdeploy_config::NotificationConfig;
use serde::Serialize;

const EVENTS: &str = "events.amazonaws.com";

#[derive(Debug, Clone, Serialize)]
pub struct SnsTopic {
    pub name: String,
}

impl Resource for SnsTopic {
    const TYPE: &'static str = "aws_sns_topic";
}
impl HasArn for SnsTopic {}

#[derive(Debug, Clone, Serialize)]
pub struct SnsTopicPolicy {
    pub arn: Reference,
    pub policy: String,
}

impl Resource for SnsTopicPolicy {
    const TYPE: &'static str = "aws_sns_topic_policy";
}

#[derive(Debug, Clone, Serialize)]
pub struct SnsTopicSubscription {
    pub topic_arn: Reference,
    pub protocol: &'static str,
    pub endpoint: Reference,
}

impl Resource for SnsTopicSubscription {
    const TYPE: &'static str = "aws_sns_topic_subscription";
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub topic: Handle<SnsTopic>,
    pub grants: Vec<InvokeGrant>,
    pub subscriptions: Vec<Handle<SnsTopicSubscription>>,
}

/// Subscribe `function` to `topic`. The grant must be an SNS grant for that function.
pub fn subscribe(
    stack: &mut Stack,
    id: &str,
    topic: &Handle<SnsTopic>,
    function: &Function,
    grant: &InvokeGrant,
) -> Result<Handle<SnsTopicSubscription>> {
    grant.check(function, InvokePrincipal::Sns)?;
    stack.declare_after(
        id,
        SnsTopicSubscription {
            topic_arn: topic.arn(),
            protocol: "lambda",
            endpoint: function.handle.arn(),
        },
        &[grant.permission.address()],
    )
}

pub fn build(
    stack: &mut Stack,
    config: &NotificationConfig,
    notifier: &Function,
) -> Result<Notification> {
    let topic = stack.declare(
        &config.topic_id,
        SnsTopic {
            name: config.topic_name.clone(),
        },
    )?;

    let policy = PolicyDocument::new(vec![Statement::allow(&["SNS:Publish"])
        .sid("AllowEventBridgePublish")
        .principal(EVENTS)
        .on([topic.arn()])]);
    stack.declare(
        &format!("{}_policy", config.topic_id),
        SnsTopicPolicy {
            arn: topic.arn(),
            policy: policy.to_json()?,
        },
    )?;

    let grant = grant_invoke(
        stack,
        &format!("{}_from_sns", notifier.handle.address().logical_id()),
        notifier,
        InvokePrincipal::Sns,
        topic.arn(),
    )?;
    let subscription = subscribe(
        stack,
        &format!("{}_subscription", config.topic_id),
        &topic,
        notifier,
        &grant,
    )?;

    Ok(Notification {
        topic,
        grants: vec![grant],
        subscriptions: vec![subscription],
    })
}
