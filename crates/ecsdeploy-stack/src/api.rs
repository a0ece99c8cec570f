//! API Gateway REST front door in front of the webhook function

use crate::error::Result;
use crate::function::{grant_invoke, Function, InvokeGrant, InvokePrincipal};
use crate::graph::{Handle, Reference, Resource, Stack};
use ecsdeploy_config::ApiConfig;
use serde::Serialize;
use std::collections::BTreeMap;

const HTTP_METHOD: &str = "POST";

#[derive(Debug, Clone, Serialize)]
pub struct RestApi {
    pub name: String,
}

impl Resource for RestApi {
    const TYPE: &'static str = "aws_api_gateway_rest_api";
}

impl Handle<RestApi> {
    pub fn root_resource_id(&self) -> Reference {
        self.attr("root_resource_id")
    }

    pub fn execution_arn(&self) -> Reference {
        self.attr("execution_arn")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResource {
    pub rest_api_id: Reference,
    pub parent_id: Reference,
    pub path_part: String,
}

impl Resource for ApiResource {
    const TYPE: &'static str = "aws_api_gateway_resource";
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiMethod {
    pub rest_api_id: Reference,
    pub resource_id: Reference,
    pub http_method: &'static str,
    pub authorization: &'static str,
}

impl Resource for ApiMethod {
    const TYPE: &'static str = "aws_api_gateway_method";
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiMethodResponse {
    pub rest_api_id: Reference,
    pub resource_id: Reference,
    pub http_method: Reference,
    pub status_code: &'static str,
    pub response_models: BTreeMap<String, String>,
}

impl Resource for ApiMethodResponse {
    const TYPE: &'static str = "aws_api_gateway_method_response";
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiIntegration {
    pub rest_api_id: Reference,
    pub resource_id: Reference,
    pub http_method: Reference,
    /// Lambda proxy integrations are always invoked with POST
    pub integration_http_method: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub uri: Reference,
}

impl Resource for ApiIntegration {
    const TYPE: &'static str = "aws_api_gateway_integration";
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiDeployment {
    pub rest_api_id: Reference,
}

impl Resource for ApiDeployment {
    const TYPE: &'static str = "aws_api_gateway_deployment";
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiStage {
    pub rest_api_id: Reference,
    pub deployment_id: Reference,
    pub stage_name: String,
}

impl Resource for ApiStage {
    const TYPE: &'static str = "aws_api_gateway_stage";
}

impl Handle<ApiStage> {
    pub fn invoke_url(&self) -> Reference {
        self.attr("invoke_url")
    }
}

#[derive(Debug, Clone)]
pub struct Api {
    pub rest_api: Handle<RestApi>,
    pub stage: Handle<ApiStage>,
    pub grant: InvokeGrant,
    pub path_part: String,
}

impl Api {
    /// Where Slack should post interactive payloads
    pub fn webhook_url(&self) -> String {
        format!("{}/{}", self.stage.invoke_url(), self.path_part)
    }
}

/// Proxy `method` to `function`; the grant must cover API Gateway invoking it
pub fn integrate(
    stack: &mut Stack,
    id: &str,
    method: &Handle<ApiMethod>,
    rest_api: &Handle<RestApi>,
    resource: &Handle<ApiResource>,
    function: &Function,
    grant: &InvokeGrant,
) -> Result<Handle<ApiIntegration>> {
    grant.check(function, InvokePrincipal::ApiGateway)?;
    stack.declare_after(
        id,
        ApiIntegration {
            rest_api_id: rest_api.id(),
            resource_id: resource.id(),
            http_method: method.attr("http_method"),
            integration_http_method: "POST",
            kind: "AWS_PROXY",
            uri: function.handle.invoke_arn(),
        },
        &[grant.permission.address()],
    )
}

pub fn build(stack: &mut Stack, config: &ApiConfig, webhook: &Function) -> Result<Api> {
    let id = &config.id;
    let rest_api = stack.declare(
        id,
        RestApi {
            name: config.name.clone(),
        },
    )?;
    let resource = stack.declare(
        &format!("{}_resource", id),
        ApiResource {
            rest_api_id: rest_api.id(),
            parent_id: rest_api.root_resource_id(),
            path_part: config.path_part.clone(),
        },
    )?;
    let method = stack.declare(
        &format!("{}_method", id),
        ApiMethod {
            rest_api_id: rest_api.id(),
            resource_id: resource.id(),
            http_method: HTTP_METHOD,
            authorization: "NONE",
        },
    )?;
    stack.declare(
        &format!("{}_method_response", id),
        ApiMethodResponse {
            rest_api_id: rest_api.id(),
            resource_id: resource.id(),
            http_method: method.attr("http_method"),
            status_code: "200",
            response_models: [("application/json".to_string(), "Empty".to_string())]
                .into_iter()
                .collect(),
        },
    )?;

    let grant = grant_invoke(
        stack,
        &format!("{}_from_apigateway", webhook.handle.address().logical_id()),
        webhook,
        InvokePrincipal::ApiGateway,
        format!(
            "{}/*/{}/{}",
            rest_api.execution_arn(),
            HTTP_METHOD,
            config.path_part
        ),
    )?;
    let integration = integrate(
        stack,
        &format!("{}_integration", id),
        &method,
        &rest_api,
        &resource,
        webhook,
        &grant,
    )?;

    let deployment = stack.declare_after(
        &format!("{}_deployment", id),
        ApiDeployment {
            rest_api_id: rest_api.id(),
        },
        &[integration.address()],
    )?;
    let stage = stack.declare(
        &config.stage_name,
        ApiStage {
            rest_api_id: rest_api.id(),
            deployment_id: deployment.id(),
            stage_name: config.stage_name.clone(),
        },
    )?;

    Ok(Api {
        rest_api,
        stage,
        grant,
        path_part: config.path_part.clone(),
    })
}
