//! Lambda functions, their environment, and invoke grants

use crate::compute::Compute;
use crate::error::{Result, StackError};
use crate::graph::{Address, HasArn, Handle, Reference, Resource, Stack, Variable};
use crate::identity::Identity;
use crate::network::Network;
use crate::security::Security;
use crate::storage::{Artifact, Storage};
use ecsdeploy_config::{ComputeConfig, FunctionConfig, FunctionsConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct Environment {
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LambdaFunction {
    pub function_name: String,
    pub role: Reference,
    pub handler: String,
    pub runtime: String,
    pub architectures: Vec<String>,
    pub s3_bucket: Reference,
    pub s3_key: String,
    pub timeout: u32,
    pub environment: Environment,
}

impl Resource for LambdaFunction {
    const TYPE: &'static str = "aws_lambda_function";
}
impl HasArn for LambdaFunction {}

impl Handle<LambdaFunction> {
    pub fn invoke_arn(&self) -> Reference {
        self.attr("invoke_arn")
    }

    pub fn function_name(&self) -> Reference {
        self.attr("function_name")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LambdaPermission {
    /// Unique per function, so derived from the grant's logical id
    pub statement_id: String,
    pub action: &'static str,
    pub function_name: Reference,
    pub principal: &'static str,
    pub source_arn: String,
}

impl Resource for LambdaPermission {
    const TYPE: &'static str = "aws_lambda_permission";
}

/// Who may invoke a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokePrincipal {
    Sns,
    ApiGateway,
}

impl InvokePrincipal {
    pub fn service(&self) -> &'static str {
        match self {
            InvokePrincipal::Sns => "sns.amazonaws.com",
            InvokePrincipal::ApiGateway => "apigateway.amazonaws.com",
        }
    }

    fn statement_prefix(&self) -> &'static str {
        match self {
            InvokePrincipal::Sns => "AllowExecutionFromSNS",
            InvokePrincipal::ApiGateway => "AllowAPIGatewayInvoke",
        }
    }
}

impl fmt::Display for InvokePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service())
    }
}

/// A declared function
#[derive(Debug, Clone)]
pub struct Function {
    pub handle: Handle<LambdaFunction>,
    pub name: String,
}

/// Proof that `function` carries an invoke permission for `principal`.
/// Subscriptions and API integrations demand one before they reference the function.
#[derive(Debug, Clone)]
pub struct InvokeGrant {
    pub permission: Handle<LambdaPermission>,
    function: Address,
    principal: InvokePrincipal,
}

impl InvokeGrant {
    pub fn principal(&self) -> InvokePrincipal {
        self.principal
    }

    /// Fails unless this grant covers `function` for `principal`
    pub fn check(&self, function: &Function, principal: InvokePrincipal) -> Result<()> {
        if self.function != *function.handle.address() || self.principal != principal {
            return Err(StackError::GrantMismatch {
                expected: format!("{} for {}", principal, function.handle.address()),
                actual: format!("{} for {}", self.principal, self.function),
            });
        }
        Ok(())
    }
}

pub fn grant_invoke(
    stack: &mut Stack,
    id: &str,
    function: &Function,
    principal: InvokePrincipal,
    source_arn: impl fmt::Display,
) -> Result<InvokeGrant> {
    let permission = stack.declare(
        id,
        LambdaPermission {
            statement_id: format!("{}-{}", principal.statement_prefix(), id),
            action: "lambda:InvokeFunction",
            function_name: function.handle.function_name(),
            principal: principal.service(),
            source_arn: source_arn.to_string(),
        },
    )?;
    Ok(InvokeGrant {
        permission,
        function: function.handle.address().clone(),
        principal,
    })
}

/// Terraform input variables carrying the Slack credentials
#[derive(Debug, Clone)]
pub struct SlackVariables {
    pub api_token: Reference,
    pub signing_secret: Reference,
    pub channel: Reference,
}

impl SlackVariables {
    pub fn declare(stack: &mut Stack) -> Result<Self> {
        Ok(Self {
            api_token: stack.variable(
                "slack_api_token",
                Variable::string("Slack bot token used to post and edit messages").sensitive(),
            )?,
            signing_secret: stack.variable(
                "slack_signing_secret",
                Variable::string("Slack signing secret; empty disables request verification")
                    .sensitive()
                    .with_default(""),
            )?,
            channel: stack.variable(
                "slack_channel",
                Variable::string("Slack channel id receiving push notifications"),
            )?,
        })
    }
}

/// Everything the functions' environment is wired from
#[derive(Debug, Clone, Copy)]
pub struct Upstream<'a> {
    pub identity: &'a Identity,
    pub network: &'a Network,
    pub security: &'a Security,
    pub compute: &'a Compute,
    pub storage: &'a Storage,
    pub slack: &'a SlackVariables,
}

#[derive(Debug, Clone)]
pub struct Functions {
    pub notifier: Function,
    pub webhook: Function,
}

pub fn build(
    stack: &mut Stack,
    config: &FunctionsConfig,
    compute_config: &ComputeConfig,
    upstream: Upstream<'_>,
) -> Result<Functions> {
    let notifier_env = env([
        ("SLACK_API_TOKEN", upstream.slack.api_token.to_string()),
        ("SLACK_CHANNEL", upstream.slack.channel.to_string()),
    ]);
    let notifier = declare_function(
        stack,
        config,
        &config.notifier,
        &upstream,
        &upstream.storage.notifier_artifact,
        notifier_env,
    )?;

    let webhook_env = webhook_environment(compute_config, &upstream);
    let webhook = declare_function(
        stack,
        config,
        &config.webhook,
        &upstream,
        &upstream.storage.webhook_artifact,
        webhook_env,
    )?;

    Ok(Functions { notifier, webhook })
}

fn webhook_environment(config: &ComputeConfig, upstream: &Upstream<'_>) -> BTreeMap<String, String> {
    let names = &config.names;
    let subnets = upstream
        .network
        .subnet_ids(config.subnet_tier)
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",");
    env([
        ("SLACK_API_TOKEN", upstream.slack.api_token.to_string()),
        ("SLACK_SIGNING_SECRET", upstream.slack.signing_secret.to_string()),
        ("SLACK_CHANNEL", upstream.slack.channel.to_string()),
        ("CLUSTER_NAME", upstream.compute.cluster.attr("name").to_string()),
        (
            "DOCKER_IMAGE_PATH",
            upstream.compute.repository.repository_url().to_string(),
        ),
        ("SUBNETS", subnets),
        ("SECURITY", upstream.security.group.id().to_string()),
        ("ASSIGN_PUBLIC_IP", config.assign_public_ip.to_string()),
        (
            "TASK_FAMILY",
            upstream.compute.task_definition.attr("family").to_string(),
        ),
        ("CONTAINER_NAME", names.container.clone()),
        ("SERVICE_NAME", upstream.compute.service.attr("name").to_string()),
        ("TASK_ROLE_ARN", upstream.identity.task_role.arn().to_string()),
        (
            "EXECUTION_ROLE_ARN",
            upstream.identity.execution_role.arn().to_string(),
        ),
        ("CPU", config.size.cpu.to_string()),
        ("MEMORY", config.size.memory.to_string()),
        ("CONTAINER_PORT", config.container_port.to_string()),
        ("DESIRED_COUNT", config.desired_count.to_string()),
        ("LOG_GROUP", upstream.compute.log_group.attr("name").to_string()),
        ("LOG_STREAM_PREFIX", config.log_stream_prefix.clone()),
    ])
}

fn declare_function(
    stack: &mut Stack,
    shared: &FunctionsConfig,
    config: &FunctionConfig,
    upstream: &Upstream<'_>,
    artifact: &Artifact,
    variables: BTreeMap<String, String>,
) -> Result<Function> {
    let handle = stack.declare_after(
        &config.id,
        LambdaFunction {
            function_name: config.name.clone(),
            role: upstream.identity.lambda_role.arn(),
            handler: shared.handler.clone(),
            runtime: shared.runtime.clone(),
            architectures: vec![shared.architecture.clone()],
            s3_bucket: upstream.storage.bucket.id(),
            s3_key: artifact.key.clone(),
            timeout: shared.timeout_secs,
            environment: Environment { variables },
        },
        &[artifact.object.address()],
    )?;
    Ok(Function {
        handle,
        name: config.name.clone(),
    })
}

fn env<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble;
    use ecsdeploy_config::{HandlerConfig, NotifierConfig, StackConfig, SubnetTier, TaskSize};
    use std::collections::HashMap;

    fn variables(config: &StackConfig, id: &str) -> HashMap<String, String> {
        let doc = assemble(config).unwrap().stack.to_json();
        doc["resource"]["aws_lambda_function"][id]["environment"]["variables"]
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
            .collect()
    }

    #[test]
    fn test_webhook_environment_parses_as_handler_config() {
        let config = StackConfig::default();
        let env = variables(&config, &config.functions.webhook.id);
        let handler = HandlerConfig::from_env(&env).unwrap();

        assert_eq!(handler.slack.api_token, "${var.slack_api_token}");
        assert_eq!(handler.slack.channel.as_deref(), Some("${var.slack_channel}"));
        assert_eq!(
            handler.slack.signing_secret.as_deref(),
            Some("${var.slack_signing_secret}")
        );
        assert_eq!(handler.names.cluster, "${aws_ecs_cluster.cluster-for-cdktf.name}");
        assert_eq!(
            handler.names.task_family,
            "${aws_ecs_task_definition.task-for-cdktf.family}"
        );
        assert_eq!(handler.names.container, config.compute.names.container);
        assert_eq!(
            handler.names.service,
            "${aws_ecs_service.container-for-cdktf-service.name}"
        );
        assert_eq!(
            handler.docker_image_path,
            "${aws_ecr_repository.repository-for-cdktf.repository_url}"
        );
        assert_eq!(
            handler.subnets,
            vec![
                "${aws_subnet.public-subnet1-az1a-cdktf.id}",
                "${aws_subnet.public-subnet1-az1c-cdktf.id}",
            ]
        );
        assert_eq!(
            handler.security_group,
            "${aws_security_group.security-for-cdktf.id}"
        );
        assert!(handler.assign_public_ip);
        assert_eq!(handler.task_role_arn, "${aws_iam_role.ecsTaskRole.arn}");
        assert_eq!(
            handler.execution_role_arn,
            "${aws_iam_role.ecsTaskExecutionRole.arn}"
        );
        assert_eq!(handler.size, TaskSize::default());
        assert_eq!(handler.container_port, config.compute.container_port);
        assert_eq!(handler.desired_count, 1);
        assert_eq!(
            handler.log_group,
            "${aws_cloudwatch_log_group.task-for-cdktf_logs.name}"
        );
        assert_eq!(handler.log_stream_prefix, config.compute.log_stream_prefix);
    }

    #[test]
    fn test_private_service_stays_private_after_redeploy() {
        let mut config = StackConfig::default();
        config.network.nat_gateway = true;
        config.compute.subnet_tier = SubnetTier::Private;
        config.compute.assign_public_ip = false;
        config.compute.desired_count = 2;
        let env = variables(&config, &config.functions.webhook.id);
        let handler = HandlerConfig::from_env(&env).unwrap();

        assert!(!handler.assign_public_ip);
        assert_eq!(handler.desired_count, 2);
        assert!(handler.subnets.iter().all(|s| s.contains("private-subnet")));
    }

    #[test]
    fn test_notifier_environment_parses_as_notifier_config() {
        let config = StackConfig::default();
        let env = variables(&config, &config.functions.notifier.id);
        let notifier = NotifierConfig::from_env(&env).unwrap();
        assert_eq!(notifier.channel, "${var.slack_channel}");
        assert_eq!(notifier.slack.api_token, "${var.slack_api_token}");
    }

    #[test]
    fn test_statement_ids_unique_per_grant() {
        let mut assembly = assemble(&StackConfig::default()).unwrap();
        let notifier = assembly.functions.notifier.clone();
        let topic = assembly.notification.topic.clone();
        grant_invoke(
            &mut assembly.stack,
            "second_topic_grant",
            &notifier,
            InvokePrincipal::Sns,
            topic.arn(),
        )
        .unwrap();

        let doc = assembly.stack.to_json();
        let permissions = doc["resource"]["aws_lambda_permission"].as_object().unwrap();
        let ids: Vec<&str> = permissions
            .values()
            .map(|p| p["statement_id"].as_str().unwrap())
            .collect();
        assert!(ids.contains(&"AllowExecutionFromSNS-second_topic_grant"));
        let distinct: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(distinct.len(), ids.len());
    }
}
