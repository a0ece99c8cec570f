// Slack interactive-message webhook
//
// Received -> Parsed -> {Deploying | Cancelled} -> Acknowledged.
// Nothing reaches ECS until the request has been verified and parsed.

use aws_lambda_events::apigw::ApiGatewayProxyRequest;
use aws_lambda_events::http::Method;
use base64::Engine;
use ecsdeploy_config::HandlerConfig;
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{info, warn};

use crate::deploy::{deploy, DeployOutcome};
use crate::ecs::TaskOrchestrator;
use crate::error::HandlerError;
use crate::payload::{parse_request, Action, DeployRequest};
use crate::response::HttpResponseData;
use crate::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::slack::{Attachment, MessageUpdate, SlackApi};

pub const CANCELLED_TEXT: &str = "Deploy cancelled";

/// Clients built once per cold start
pub struct WebhookState {
    pub config: HandlerConfig,
    pub orchestrator: Arc<dyn TaskOrchestrator>,
    pub slack: Arc<dyn SlackApi>,
}

/// Handle one API Gateway proxy event. `now` is the unix time in seconds.
pub async fn handle_webhook(
    request: &ApiGatewayProxyRequest,
    state: &WebhookState,
    now: i64,
) -> HttpResponseData {
    match receive(request, &state.config, now) {
        Ok(parsed) => respond(parsed, state).await,
        Err(err) => {
            warn!(error = %err, status = err.status_code(), "rejected webhook request");
            HttpResponseData::error(&err)
        }
    }
}

/// Received -> Parsed
fn receive(
    request: &ApiGatewayProxyRequest,
    config: &HandlerConfig,
    now: i64,
) -> Result<DeployRequest, HandlerError> {
    if request.http_method != Method::POST {
        return Err(HandlerError::MethodNotAllowed(
            request.http_method.to_string(),
        ));
    }

    let body = decode_body(request.body.as_deref(), request.is_base64_encoded)?;

    if let Some(secret) = &config.slack.signing_secret {
        signature::verify(
            secret,
            header(request, TIMESTAMP_HEADER),
            header(request, SIGNATURE_HEADER),
            &body,
            now,
        )?;
    }

    let body = std::str::from_utf8(&body)
        .map_err(|_| HandlerError::InvalidBody("body is not valid UTF-8".to_string()))?;
    parse_request(body, config.slack.channel.as_deref())
}

/// Deploying | Cancelled -> Acknowledged
async fn respond(request: DeployRequest, state: &WebhookState) -> HttpResponseData {
    info!(
        action = %request.action,
        user = request.user.as_deref().unwrap_or("unknown"),
        message_ts = %request.message_ts,
        "interaction received"
    );

    let (text, outcome, tag) = match &request.action {
        Action::Deploy { tag } => {
            let outcome = deploy(state.orchestrator.as_ref(), &state.config, tag).await;
            (outcome.message_text(tag), Some(outcome), Some(tag.to_string()))
        }
        Action::Dismiss { name } => {
            info!(button = %name, "deploy cancelled");
            (CANCELLED_TEXT.to_string(), None, None)
        }
    };

    let update = MessageUpdate {
        channel: request.channel.clone(),
        ts: request.message_ts.clone(),
        text: String::new(),
        attachments: vec![Attachment {
            text,
            ..Default::default()
        }],
    };
    let acknowledged = match state.slack.update_message(&update).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, channel = %update.channel, ts = %update.ts, "failed to update Slack message");
            false
        }
    };

    response_for(outcome.as_ref(), &request, tag, acknowledged)
}

fn response_for(
    outcome: Option<&DeployOutcome>,
    request: &DeployRequest,
    tag: Option<String>,
    acknowledged: bool,
) -> HttpResponseData {
    let (status_code, status, outcome_name) = match outcome {
        None => (200, "cancelled", "cancelled"),
        Some(o) if o.is_success() => (200, "deployed", o.as_str()),
        Some(o) => (502, "failed", o.as_str()),
    };

    let mut body = json!({
        "status": status,
        "outcome": outcome_name,
        "message_ts": request.message_ts,
        "channel": request.channel,
        "acknowledged": acknowledged,
    });
    if let Some(tag) = tag {
        body["tag"] = Value::String(tag);
    }
    if let Some(task_definition) = outcome.and_then(DeployOutcome::task_definition) {
        body["task_definition"] = Value::String(task_definition.to_string());
    }
    if let Some(o) = outcome.filter(|o| !o.is_success()) {
        let errors: Map<String, Value> = o
            .errors()
            .into_iter()
            .map(|(step, message)| (step.to_string(), Value::String(message)))
            .collect();
        body["errors"] = Value::Object(errors);
    }
    HttpResponseData::json(status_code, body.to_string())
}

fn header<'a>(request: &'a ApiGatewayProxyRequest, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Decode request body, handling base64 encoding. A missing body is empty.
fn decode_body(body: Option<&str>, is_base64_encoded: bool) -> Result<Cow<'_, [u8]>, HandlerError> {
    let body = body.unwrap_or_default();
    if is_base64_encoded {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(body.as_bytes())
            .map_err(|_| HandlerError::InvalidBody("invalid base64 body".to_string()))?;
        Ok(Cow::Owned(decoded))
    } else {
        Ok(Cow::Borrowed(body.as_bytes()))
    }
}
