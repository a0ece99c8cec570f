// Redeploy state machine: register a task-definition revision, then point
// the service at the family.
//
// Each remote call is bounded by HandlerConfig::call_timeout. The update only
// runs after a successful registration unless the legacy
// UPDATE_ON_REGISTRATION_FAILURE flag is set.

use ecsdeploy_config::{HandlerConfig, ImageTag};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::ecs::{EcsError, ServiceUpdate, TaskOrchestrator, TaskRegistration};

const REGISTER_BACKOFF: Duration = Duration::from_millis(250);

/// Aggregated result of one redeploy
#[derive(Debug, Clone)]
pub enum DeployOutcome {
    Deployed {
        task_definition: String,
    },
    /// `service_updated` is only ever true under the legacy flag
    RegistrationFailed {
        error: EcsError,
        service_updated: bool,
    },
    UpdateFailed {
        task_definition: String,
        error: EcsError,
    },
    BothFailed {
        registration: EcsError,
        update: EcsError,
    },
}

impl DeployOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployOutcome::Deployed { .. } => "deployed",
            DeployOutcome::RegistrationFailed { .. } => "registration_failed",
            DeployOutcome::UpdateFailed { .. } => "update_failed",
            DeployOutcome::BothFailed { .. } => "both_failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Deployed { .. })
    }

    /// Steps that failed, in call order
    pub fn failed_steps(&self) -> Vec<&'static str> {
        match self {
            DeployOutcome::Deployed { .. } => Vec::new(),
            DeployOutcome::RegistrationFailed { .. } => vec!["task definition registration"],
            DeployOutcome::UpdateFailed { .. } => vec!["service update"],
            DeployOutcome::BothFailed { .. } => {
                vec!["task definition registration", "service update"]
            }
        }
    }

    /// Errors keyed by step, for the response body
    pub fn errors(&self) -> Vec<(&'static str, String)> {
        match self {
            DeployOutcome::Deployed { .. } => Vec::new(),
            DeployOutcome::RegistrationFailed { error, .. } => {
                vec![("registration", error.to_string())]
            }
            DeployOutcome::UpdateFailed { error, .. } => vec![("update", error.to_string())],
            DeployOutcome::BothFailed {
                registration,
                update,
            } => vec![
                ("registration", registration.to_string()),
                ("update", update.to_string()),
            ],
        }
    }

    pub fn task_definition(&self) -> Option<&str> {
        match self {
            DeployOutcome::Deployed { task_definition }
            | DeployOutcome::UpdateFailed {
                task_definition, ..
            } => Some(task_definition),
            _ => None,
        }
    }

    /// Text the interactive message is replaced with
    pub fn message_text(&self, tag: &ImageTag) -> String {
        if self.is_success() {
            format!("Image {} deployed", tag)
        } else {
            format!(
                "Deploy of image {} failed: {}",
                tag,
                self.failed_steps().join(" and ")
            )
        }
    }
}

/// Run one redeploy of `tag` against the configured service
pub async fn deploy(
    orchestrator: &dyn TaskOrchestrator,
    config: &HandlerConfig,
    tag: &ImageTag,
) -> DeployOutcome {
    let registration = TaskRegistration::for_tag(config, tag);
    let registered = register(orchestrator, config, &registration).await;

    if registered.is_err() && !config.update_on_registration_failure {
        warn!(family = %registration.family, "registration failed, skipping service update");
    }
    let update = if registered.is_ok() || config.update_on_registration_failure {
        let request = ServiceUpdate::from_config(config);
        Some(
            bounded(
                "UpdateService",
                config.call_timeout,
                orchestrator.update_service(&request),
            )
            .await,
        )
    } else {
        None
    };

    let outcome = match (registered, update) {
        (Ok(task_definition), Some(Ok(()))) => DeployOutcome::Deployed { task_definition },
        (Ok(task_definition), Some(Err(error))) => DeployOutcome::UpdateFailed {
            task_definition,
            error,
        },
        (Err(error), None) => DeployOutcome::RegistrationFailed {
            error,
            service_updated: false,
        },
        (Err(error), Some(Ok(()))) => DeployOutcome::RegistrationFailed {
            error,
            service_updated: true,
        },
        (Err(registration), Some(Err(update))) => DeployOutcome::BothFailed {
            registration,
            update,
        },
        // Registration succeeded, so the update always ran
        (Ok(task_definition), None) => DeployOutcome::Deployed { task_definition },
    };

    match &outcome {
        DeployOutcome::Deployed { task_definition } => {
            info!(tag = %tag, task_definition = %task_definition, "deployed");
        }
        other => {
            warn!(tag = %tag, outcome = other.as_str(), errors = ?other.errors(), "deploy failed");
        }
    }
    outcome
}

async fn register(
    orchestrator: &dyn TaskOrchestrator,
    config: &HandlerConfig,
    request: &TaskRegistration,
) -> Result<String, EcsError> {
    let mut attempt = 1;
    loop {
        let result = bounded(
            "RegisterTaskDefinition",
            config.call_timeout,
            orchestrator.register_task_definition(request),
        )
        .await;
        match result {
            Err(error) if error.is_retryable() && attempt < config.register_max_attempts => {
                warn!(attempt, error = %error, "task definition registration failed, retrying");
                attempt += 1;
                tokio::time::sleep(REGISTER_BACKOFF).await;
            }
            other => return other,
        }
    }
}

async fn bounded<T, F>(operation: &'static str, after: Duration, call: F) -> Result<T, EcsError>
where
    F: Future<Output = Result<T, EcsError>>,
{
    tokio::time::timeout(after, call)
        .await
        .unwrap_or(Err(EcsError::Timeout { operation, after }))
}
