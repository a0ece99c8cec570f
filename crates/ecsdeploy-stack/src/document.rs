//! Typed IAM policy documents and EventBridge patterns, rendered to JSON
//! strings only when handed to a resource.

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    version: &'static str,
    statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION,
            statement,
        }
    }

    /// Trust policy letting `service` assume the role
    pub fn assume_role(service: &str) -> Self {
        Self::new(vec![Statement::allow(&["sts:AssumeRole"]).principal(service)])
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePrincipal {
    #[serde(rename = "Service")]
    pub service: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    sid: Option<String>,
    effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    principal: Option<ServicePrincipal>,
    action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    resource: Vec<String>,
}

impl Statement {
    pub fn allow(actions: &[&str]) -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource: Vec::new(),
        }
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn principal(mut self, service: &str) -> Self {
        self.principal = Some(ServicePrincipal {
            service: service.to_string(),
        });
        self
    }

    /// Resources may be literals or rendered references
    pub fn on<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.resource
            .extend(resources.into_iter().map(|r| r.to_string()));
        self
    }

    pub fn resources(&self) -> &[String] {
        &self.resource
    }
}

/// EventBridge event pattern
#[derive(Debug, Clone, Serialize)]
pub struct EventPattern {
    source: Vec<String>,
    #[serde(rename = "detail-type")]
    detail_type: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    detail: BTreeMap<String, Vec<String>>,
}

impl EventPattern {
    /// Successful image pushes to any ECR repository
    pub fn ecr_push_success() -> Self {
        Self {
            source: vec!["aws.ecr".to_string()],
            detail_type: vec!["ECR Image Action".to_string()],
            detail: [
                ("action-type".to_string(), vec!["PUSH".to_string()]),
                ("result".to_string(), vec!["SUCCESS".to_string()]),
            ]
            .into_iter()
            .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_assume_role_document() {
        let doc = PolicyDocument::assume_role("ecs-tasks.amazonaws.com");
        let value: Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "ecs-tasks.amazonaws.com" },
                    "Action": ["sts:AssumeRole"]
                }]
            })
        );
    }

    #[test]
    fn test_statement_resources() {
        let stmt = Statement::allow(&["iam:PassRole"])
            .sid("PassTaskRoles")
            .on(["arn:a", "arn:b"]);
        assert_eq!(stmt.resources(), ["arn:a", "arn:b"]);
        let value = serde_json::to_value(&stmt).unwrap();
        assert_eq!(value["Sid"], "PassTaskRoles");
        assert_eq!(value["Resource"], json!(["arn:a", "arn:b"]));
    }

    #[test]
    fn test_ecr_push_pattern() {
        let value: Value =
            serde_json::from_str(&EventPattern::ecr_push_success().to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "source": ["aws.ecr"],
                "detail-type": ["ECR Image Action"],
                "detail": { "action-type": ["PUSH"], "result": ["SUCCESS"] }
            })
        );
    }
}
