//! IAM roles for the ECS task, the task execution agent and the Lambda functions

use crate::document::{PolicyDocument, Statement};
use crate::error::Result;
use crate::graph::{HasArn, Handle, Reference, Resource, Stack};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct IamRole {
    pub name: String,
    pub assume_role_policy: String,
}

impl Resource for IamRole {
    const TYPE: &'static str = "aws_iam_role";
}
impl HasArn for IamRole {}

impl Handle<IamRole> {
    pub fn name(&self) -> Reference {
        self.attr("name")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IamPolicy {
    pub name: String,
    pub description: String,
    pub policy: String,
}

impl Resource for IamPolicy {
    const TYPE: &'static str = "aws_iam_policy";
}
impl HasArn for IamPolicy {}

#[derive(Debug, Clone, Serialize)]
pub struct IamRolePolicyAttachment {
    pub role: Reference,
    pub policy_arn: Reference,
}

impl Resource for IamRolePolicyAttachment {
    const TYPE: &'static str = "aws_iam_role_policy_attachment";
}

/// The three roles the rest of the stack runs under
#[derive(Debug, Clone)]
pub struct Identity {
    pub task_role: Handle<IamRole>,
    pub execution_role: Handle<IamRole>,
    pub lambda_role: Handle<IamRole>,
}

const ECS_TASKS: &str = "ecs-tasks.amazonaws.com";
const LAMBDA: &str = "lambda.amazonaws.com";

pub fn build(stack: &mut Stack) -> Result<Identity> {
    let task_role = stack.declare(
        "ecsTaskRole",
        IamRole {
            name: "ecsTaskRole_for_cdktf".to_string(),
            assume_role_policy: PolicyDocument::assume_role(ECS_TASKS).to_json()?,
        },
    )?;
    let task_policy = PolicyDocument::new(vec![Statement::allow(&[
        "ecs:DescribeServices",
        "ecs:CreateTaskSet",
        "ecs:UpdateServicePrimaryTaskSet",
        "ecs:DeleteTaskSet",
        "elasticloadbalancing:DescribeTargetGroups",
        "elasticloadbalancing:DescribeListeners",
        "elasticloadbalancing:ModifyListener",
        "elasticloadbalancing:DescribeRules",
        "elasticloadbalancing:ModifyRule",
        "lambda:InvokeFunction",
        "cloudwatch:DescribeAlarms",
        "sns:Publish",
        "s3:GetObject",
        "s3:GetObjectVersion",
    ])
    .on(["*"])]);
    attach(
        stack,
        "ecs_task_policy",
        "Permissions for the running ECS task",
        &task_policy,
        &task_role,
    )?;

    let execution_role = stack.declare(
        "ecsTaskExecutionRole",
        IamRole {
            name: "ecsTaskExecutionRole_for_cdktf".to_string(),
            assume_role_policy: PolicyDocument::assume_role(ECS_TASKS).to_json()?,
        },
    )?;
    let execution_policy = PolicyDocument::new(vec![Statement::allow(&[
        "ecr:GetAuthorizationToken",
        "ecr:BatchCheckLayerAvailability",
        "ecr:GetDownloadUrlForLayer",
        "ecr:BatchGetImage",
        "logs:CreateLogStream",
        "logs:PutLogEvents",
    ])
    .on(["*"])]);
    attach(
        stack,
        "ecs_task_execution_policy",
        "Image pull and log delivery for the ECS agent",
        &execution_policy,
        &execution_role,
    )?;

    let lambda_role = stack.declare(
        "lambdaExecutionRole",
        IamRole {
            name: "lambdaExecutionRole_for_cdktf".to_string(),
            assume_role_policy: PolicyDocument::assume_role(LAMBDA).to_json()?,
        },
    )?;
    let lambda_policy = PolicyDocument::new(vec![
        Statement::allow(&["ecs:RegisterTaskDefinition", "ecs:UpdateService"])
            .sid("Redeploy")
            .on(["*"]),
        Statement::allow(&["iam:PassRole"])
            .sid("PassTaskRoles")
            .on([task_role.arn(), execution_role.arn()]),
        Statement::allow(&[
            "logs:CreateLogGroup",
            "logs:CreateLogStream",
            "logs:PutLogEvents",
        ])
        .sid("Logging")
        .on(["arn:aws:logs:*:*:*"]),
    ]);
    attach(
        stack,
        "lambda_logging",
        "Redeploy and logging permissions for the Lambda functions",
        &lambda_policy,
        &lambda_role,
    )?;

    Ok(Identity {
        task_role,
        execution_role,
        lambda_role,
    })
}

/// Declare `id` as a managed policy and attach it to `role`
fn attach(
    stack: &mut Stack,
    id: &str,
    description: &str,
    document: &PolicyDocument,
    role: &Handle<IamRole>,
) -> Result<Handle<IamRolePolicyAttachment>> {
    let policy = stack.declare(
        id,
        IamPolicy {
            name: id.to_string(),
            description: description.to_string(),
            policy: document.to_json()?,
        },
    )?;
    stack.declare(
        &format!("{}_attach", id),
        IamRolePolicyAttachment {
            role: role.name(),
            policy_arn: policy.arn(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn policy_of(stack: &Stack, id: &str) -> Value {
        let doc = stack.to_json();
        let raw = doc["resource"]["aws_iam_policy"][id]["policy"]
            .as_str()
            .unwrap()
            .to_string();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_execution_policy_attached_to_execution_role() {
        let mut stack = Stack::new("ap-northeast-1", BTreeMap::new());
        build(&mut stack).unwrap();
        let doc = stack.to_json();
        let attach = &doc["resource"]["aws_iam_role_policy_attachment"];
        assert_eq!(
            attach["ecs_task_execution_policy_attach"]["role"],
            "${aws_iam_role.ecsTaskExecutionRole.name}"
        );
        assert_eq!(
            attach["ecs_task_policy_attach"]["role"],
            "${aws_iam_role.ecsTaskRole.name}"
        );
    }

    #[test]
    fn test_pass_role_names_declared_roles() {
        let mut stack = Stack::new("ap-northeast-1", BTreeMap::new());
        let identity = build(&mut stack).unwrap();
        let policy = policy_of(&stack, "lambda_logging");
        let pass = policy["Statement"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["Sid"] == "PassTaskRoles")
            .unwrap();
        assert_eq!(
            pass["Resource"],
            serde_json::json!([
                identity.task_role.arn().to_string(),
                identity.execution_role.arn().to_string()
            ])
        );
        // No account ids baked into any policy
        assert!(!stack.to_string_pretty().unwrap().contains("arn:aws:iam::"));
    }

    #[test]
    fn test_lambda_role_trusts_lambda_only() {
        let mut stack = Stack::new("ap-northeast-1", BTreeMap::new());
        build(&mut stack).unwrap();
        let doc = stack.to_json();
        let trust: Value = serde_json::from_str(
            doc["resource"]["aws_iam_role"]["lambdaExecutionRole"]["assume_role_policy"]
                .as_str()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            trust["Statement"][0]["Principal"]["Service"],
            "lambda.amazonaws.com"
        );
    }
}
