// AWS Lambda functions for Slack-driven redeploys
//
// deploy-webhook:  API Gateway -> verify/parse -> ECS register + update -> chat.update
// ecr-push-notify: SNS (EventBridge ECR events) -> chat.postMessage with Deploy/Cancel
//
// Clients are built once per cold start; lambda_runtime provides the tokio runtime.

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use aws_lambda_events::sns::SnsEvent;
use ecsdeploy_config::{
    HandlerConfig, LogFormat, LoggingConfig, NotifierConfig, StdEnvSource,
};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use std::sync::Arc;
use tracing::info;

pub mod deploy;
pub mod ecs;
pub mod error;
pub mod notify;
pub mod payload;
pub mod response;
pub mod signature;
pub mod slack;
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use deploy::{deploy, DeployOutcome};
pub use ecs::{EcsClient, EcsError, ServiceUpdate, TaskOrchestrator, TaskRegistration};
pub use error::HandlerError;
pub use notify::NotifyError;
pub use slack::{SlackApi, SlackClient, SlackError};
pub use webhook::{handle_webhook, WebhookState};

const GIT_HASH: &str = env!("GIT_HASH");
const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");

/// Initialize tracing from the function's logging config
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    // Ignore the error if a subscriber is already set
    let _ = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().without_time()),
        ),
        LogFormat::Text => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().without_time()))
        }
    };
}

fn config_error(err: anyhow::Error) -> Error {
    Error::from(format!("Failed to load configuration: {:#}", err))
}

fn log_cold_start(function: &'static str) {
    info!(
        function,
        git_hash = GIT_HASH,
        build_timestamp = BUILD_TIMESTAMP,
        "cold start"
    );
}

async fn handle_webhook_event(
    event: LambdaEvent<ApiGatewayProxyRequest>,
    state: Arc<WebhookState>,
) -> Result<ApiGatewayProxyResponse, Error> {
    let (request, _context) = event.into_parts();
    let now = chrono::Utc::now().timestamp();
    let response = handle_webhook(&request, &state, now).await;
    Ok(response::build_api_gateway_response(response))
}

/// Entry point of the deploy-webhook function
pub async fn run_webhook() -> Result<(), Error> {
    let config = HandlerConfig::from_env(&StdEnvSource).map_err(config_error)?;
    init_tracing(&config.logging);
    log_cold_start("deploy-webhook");
    info!(
        cluster = %config.names.cluster,
        service = %config.names.service,
        family = %config.names.task_family,
        signature_check = config.slack.signing_secret.is_some(),
        "webhook configured"
    );

    let orchestrator = EcsClient::from_env(config.region.clone()).await;
    let slack = SlackClient::new(config.slack.api_token.clone())?;
    let state = Arc::new(WebhookState {
        config,
        orchestrator: Arc::new(orchestrator),
        slack: Arc::new(slack),
    });

    lambda_runtime::run(service_fn(move |event: LambdaEvent<ApiGatewayProxyRequest>| {
        let state = state.clone();
        async move { handle_webhook_event(event, state).await }
    }))
    .await
}

/// Entry point of the ecr-push-notify function
pub async fn run_notifier() -> Result<(), Error> {
    let config = NotifierConfig::from_env(&StdEnvSource).map_err(config_error)?;
    init_tracing(&config.logging);
    log_cold_start("ecr-push-notify");

    let slack: Arc<dyn SlackApi> = Arc::new(SlackClient::new(config.slack.api_token.clone())?);
    let config = Arc::new(config);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<SnsEvent>| {
        let slack = slack.clone();
        let config = config.clone();
        async move {
            let (event, _context) = event.into_parts();
            let messages = event.records.iter().map(|r| r.sns.message.as_str());
            let posted = notify::notify(slack.as_ref(), &config, messages).await?;
            info!(records = event.records.len(), posted, "processed SNS event");
            Ok::<(), Error>(())
        }
    }))
    .await
}
