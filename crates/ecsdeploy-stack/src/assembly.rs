//! Wires every builder into one stack, in dependency order

use crate::api::{self, Api};
use crate::compute::{self, Compute};
use crate::error::Result;
use crate::function::{self, Functions, SlackVariables, Upstream};
use crate::graph::Stack;
use crate::identity::{self, Identity};
use crate::load_balancer::{self, LoadBalancing};
use crate::network::{self, Network};
use crate::notification::{self, Notification};
use crate::observability::{self, Observability};
use crate::security::{self, Security};
use crate::storage::{self, Storage};
use ecsdeploy_config::StackConfig;
use tracing::{debug, info};

/// The assembled stack and the contexts each step produced
#[derive(Debug)]
pub struct Assembly {
    pub stack: Stack,
    pub slack: SlackVariables,
    pub identity: Identity,
    pub network: Network,
    pub security: Security,
    pub load_balancing: LoadBalancing,
    pub compute: Compute,
    pub storage: Storage,
    pub functions: Functions,
    pub notification: Notification,
    pub api: Api,
    pub observability: Observability,
}

/// Build the whole estate described by `config`.
///
/// Each step only receives the contexts of the steps before it, so a
/// reference to something not yet declared cannot be written.
pub fn assemble(config: &StackConfig) -> Result<Assembly> {
    let mut stack = Stack::new(
        config.project.region.clone(),
        config.project.default_tags.clone(),
    );

    let slack = SlackVariables::declare(&mut stack)?;
    let identity = identity::build(&mut stack)?;
    debug!(declared = stack.len(), "identity ready");

    let network = network::build(&mut stack, &config.network)?;
    let security = security::build(&mut stack, &config.security, &network)?;
    let load_balancing =
        load_balancer::build(&mut stack, &config.load_balancer, &network, &security)?;
    let task_logs =
        observability::task_log_group(&mut stack, &config.observability, &config.compute.names)?;
    let compute = compute::build(
        &mut stack,
        &config.compute,
        &network,
        &security,
        &identity,
        &load_balancing,
        &task_logs,
    )?;
    debug!(declared = stack.len(), "service ready");

    let storage = storage::build(
        &mut stack,
        &config.storage,
        &config.functions.notifier,
        &config.functions.webhook,
    )?;
    let functions = function::build(
        &mut stack,
        &config.functions,
        &config.compute,
        Upstream {
            identity: &identity,
            network: &network,
            security: &security,
            compute: &compute,
            storage: &storage,
            slack: &slack,
        },
    )?;
    let notification = notification::build(&mut stack, &config.notification, &functions.notifier)?;
    let api = api::build(&mut stack, &config.api, &functions.webhook)?;
    let observability = observability::build(
        &mut stack,
        &config.observability,
        &compute.log_group,
        &functions,
        &notification,
    )?;

    stack.output(
        "load_balancer_dns_name",
        load_balancing.load_balancer.handle.dns_name(),
        "Public DNS name of the application load balancer",
    )?;
    stack.output(
        "repository_url",
        compute.repository.repository_url(),
        "Push images here to trigger a deploy prompt",
    )?;
    stack.output(
        "webhook_url",
        api.webhook_url(),
        "Slack interactivity request URL",
    )?;

    info!(
        region = stack.region(),
        resources = stack.len(),
        "stack assembled"
    );

    Ok(Assembly {
        stack,
        slack,
        identity,
        network,
        security,
        load_balancing,
        compute,
        storage,
        functions,
        notification,
        api,
        observability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use crate::function::{grant_invoke, InvokePrincipal};
    use crate::notification::subscribe;
    use serde_json::Value;

    fn assembled() -> Assembly {
        assemble(&StackConfig::default()).unwrap()
    }

    fn resource<'a>(doc: &'a Value, kind: &str, id: &str) -> &'a Value {
        &doc["resource"][kind][id]
    }

    #[test]
    fn test_webhook_environment_wiring() {
        let assembly = assembled();
        let doc = assembly.stack.to_json();
        let env = &resource(&doc, "aws_lambda_function", "cdktf_for_slack_api")["environment"]
            ["variables"];

        assert_eq!(env["SLACK_API_TOKEN"], "${var.slack_api_token}");
        assert_eq!(env["SLACK_SIGNING_SECRET"], "${var.slack_signing_secret}");
        assert_eq!(env["SLACK_CHANNEL"], "${var.slack_channel}");
        assert_eq!(env["CLUSTER_NAME"], "${aws_ecs_cluster.cluster-for-cdktf.name}");
        assert_eq!(
            env["DOCKER_IMAGE_PATH"],
            "${aws_ecr_repository.repository-for-cdktf.repository_url}"
        );
        assert_eq!(
            env["SUBNETS"],
            "${aws_subnet.public-subnet1-az1a-cdktf.id},${aws_subnet.public-subnet1-az1c-cdktf.id}"
        );
        assert_eq!(env["SECURITY"], "${aws_security_group.security-for-cdktf.id}");
        assert_eq!(env["TASK_ROLE_ARN"], "${aws_iam_role.ecsTaskRole.arn}");
        assert_eq!(
            env["EXECUTION_ROLE_ARN"],
            "${aws_iam_role.ecsTaskExecutionRole.arn}"
        );
        assert_eq!(env["CPU"], "512");
        assert_eq!(env["MEMORY"], "1024");
        assert_eq!(env["CONTAINER_PORT"], "9000");
        assert_eq!(env["DESIRED_COUNT"], "1");
        assert_eq!(
            env["LOG_GROUP"],
            "${aws_cloudwatch_log_group.task-for-cdktf_logs.name}"
        );
        assert_eq!(env["ASSIGN_PUBLIC_IP"], "true");
        assert_eq!(env.as_object().unwrap().len(), 19);
    }

    #[test]
    fn test_functions_wait_for_their_artifacts() {
        let doc = assembled().stack.to_json();
        let notifier = resource(&doc, "aws_lambda_function", "cdktf_for_slack_sns");
        assert_eq!(
            notifier["depends_on"],
            serde_json::json!(["aws_s3_object.cdktf_for_slack_sns_artifact"])
        );
        assert_eq!(notifier["s3_key"], "ecr-push-notify.zip");
        assert_eq!(notifier["runtime"], "provided.al2023");
        assert_eq!(notifier["environment"]["variables"].as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_api_front_door() {
        let assembly = assembled();
        let doc = assembly.stack.to_json();

        let permission = resource(
            &doc,
            "aws_lambda_permission",
            "cdktf_for_slack_api_from_apigateway",
        );
        assert_eq!(permission["principal"], "apigateway.amazonaws.com");
        assert_eq!(
            permission["source_arn"],
            "${aws_api_gateway_rest_api.cdktf_for_api_rest.execution_arn}/*/POST/ecs-deploy"
        );

        let integration = resource(
            &doc,
            "aws_api_gateway_integration",
            "cdktf_for_api_rest_integration",
        );
        assert_eq!(integration["type"], "AWS_PROXY");
        assert_eq!(
            integration["uri"],
            "${aws_lambda_function.cdktf_for_slack_api.invoke_arn}"
        );

        let deployment = resource(
            &doc,
            "aws_api_gateway_deployment",
            "cdktf_for_api_rest_deployment",
        );
        assert_eq!(
            deployment["depends_on"],
            serde_json::json!(["aws_api_gateway_integration.cdktf_for_api_rest_integration"])
        );

        let response = resource(
            &doc,
            "aws_api_gateway_method_response",
            "cdktf_for_api_rest_method_response",
        );
        assert_eq!(response["status_code"], "200");
        assert_eq!(response["response_models"]["application/json"], "Empty");

        assert_eq!(
            doc["output"]["webhook_url"]["value"],
            "${aws_api_gateway_stage.cdktf_for_apistage.invoke_url}/ecs-deploy"
        );
    }

    #[test]
    fn test_notification_chain() {
        let doc = assembled().stack.to_json();
        let policy: Value = serde_json::from_str(
            resource(&doc, "aws_sns_topic_policy", "cdktf_for_sns_policy")["policy"]
                .as_str()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            policy["Statement"][0]["Principal"]["Service"],
            "events.amazonaws.com"
        );
        assert_eq!(policy["Statement"][0]["Action"][0], "SNS:Publish");

        let subscription = resource(
            &doc,
            "aws_sns_topic_subscription",
            "cdktf_for_sns_subscription",
        );
        assert_eq!(subscription["protocol"], "lambda");
        assert_eq!(
            subscription["endpoint"],
            "${aws_lambda_function.cdktf_for_slack_sns.arn}"
        );

        let target = resource(
            &doc,
            "aws_cloudwatch_event_target",
            "cdktf_for_event_rule_target",
        );
        assert_eq!(target["arn"], "${aws_sns_topic.cdktf_for_sns.arn}");
        assert_eq!(target["target_id"], "SendToSNS");
    }

    #[test]
    fn test_log_groups() {
        let doc = assembled().stack.to_json();
        let groups = doc["resource"]["aws_cloudwatch_log_group"].as_object().unwrap();
        let names: Vec<_> = groups.values().map(|g| g["name"].clone()).collect();
        assert!(names.contains(&Value::from("/aws/lambda/cdktf_for_slack_api")));
        assert!(names.contains(&Value::from("/aws/lambda/cdktf_for_slack_sns")));
        assert!(names.contains(&Value::from("/aws/ecs/task-for-cdktf")));
        assert!(groups.values().all(|g| g["retention_in_days"] == 14));

        let mut config = StackConfig::default();
        config.observability.log_retention_days = None;
        let doc = assemble(&config).unwrap().stack.to_json();
        assert!(doc["resource"]["aws_cloudwatch_log_group"]
            .as_object()
            .unwrap()
            .values()
            .all(|g| g.get("retention_in_days").is_none()));
    }

    #[test]
    fn test_grant_for_wrong_principal_rejected() {
        let mut assembly = assembled();
        let webhook = assembly.functions.webhook.clone();
        let notifier = assembly.functions.notifier.clone();
        let topic = assembly.notification.topic.clone();

        // An API Gateway grant does not let SNS invoke the function
        let api_grant = assembly.api.grant.clone();
        assert!(matches!(
            subscribe(&mut assembly.stack, "bad_sub", &topic, &webhook, &api_grant),
            Err(StackError::GrantMismatch { .. })
        ));

        // Nor does an SNS grant for one function cover another
        let sns_grant = grant_invoke(
            &mut assembly.stack,
            "extra_grant",
            &notifier,
            InvokePrincipal::Sns,
            topic.arn(),
        )
        .unwrap();
        assert!(matches!(
            subscribe(&mut assembly.stack, "bad_sub", &topic, &webhook, &sns_grant),
            Err(StackError::GrantMismatch { .. })
        ));
    }
}
