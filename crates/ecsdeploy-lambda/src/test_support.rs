// In-memory fakes for the remote collaborators

use async_trait::async_trait;
use ecsdeploy_config::HandlerConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::ecs::{EcsError, ServiceUpdate, TaskOrchestrator, TaskRegistration};
use crate::slack::{MessageUpdate, PostMessage, SlackApi, SlackError};

pub(crate) const IMAGE_PATH: &str =
    "123456789012.dkr.ecr.ap-northeast-1.amazonaws.com/project/repository_for_cdktf";

pub(crate) fn handler_env() -> HashMap<String, String> {
    [
        ("SLACK_API_TOKEN", "test-token"),
        ("SLACK_CHANNEL", "C0123"),
        ("CLUSTER_NAME", "cluster-for-cdktf"),
        ("TASK_FAMILY", "task-for-cdktf"),
        ("CONTAINER_NAME", "container-for-cdktf"),
        ("SERVICE_NAME", "container-for-cdktf-service"),
        ("DOCKER_IMAGE_PATH", IMAGE_PATH),
        ("SUBNETS", "subnet-a,subnet-b"),
        ("SECURITY", "sg-1"),
        ("TASK_ROLE_ARN", "arn:aws:iam::123456789012:role/task"),
        ("EXECUTION_ROLE_ARN", "arn:aws:iam::123456789012:role/exec"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub(crate) fn handler_config() -> HandlerConfig {
    HandlerConfig::from_env(&handler_env()).unwrap()
}

#[derive(Default)]
pub(crate) struct RecordingOrchestrator {
    registrations: Mutex<Vec<TaskRegistration>>,
    updates: Mutex<Vec<ServiceUpdate>>,
    registration_failures: Mutex<VecDeque<EcsError>>,
    update_failure: Option<EcsError>,
    delay: Option<Duration>,
}

impl RecordingOrchestrator {
    /// Fail the next registrations with these errors, in order
    pub(crate) fn failing_registrations(self, errors: Vec<EcsError>) -> Self {
        Self {
            registration_failures: Mutex::new(errors.into()),
            ..self
        }
    }

    pub(crate) fn failing_update(self, error: EcsError) -> Self {
        Self {
            update_failure: Some(error),
            ..self
        }
    }

    pub(crate) fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    pub(crate) fn registrations(&self) -> Vec<TaskRegistration> {
        self.registrations.lock().unwrap().clone()
    }

    pub(crate) fn updates(&self) -> Vec<ServiceUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.registrations().len() + self.updates().len()
    }
}

#[async_trait]
impl TaskOrchestrator for RecordingOrchestrator {
    async fn register_task_definition(&self, request: &TaskRegistration) -> Result<String, EcsError> {
        self.registrations.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.registration_failures.lock().unwrap().pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(format!(
                "arn:aws:ecs:ap-northeast-1:123456789012:task-definition/{}:{}",
                request.family,
                self.registrations.lock().unwrap().len()
            )),
        }
    }

    async fn update_service(&self, request: &ServiceUpdate) -> Result<(), EcsError> {
        self.updates.lock().unwrap().push(request.clone());
        match &self.update_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingSlack {
    posts: Mutex<Vec<PostMessage>>,
    updates: Mutex<Vec<MessageUpdate>>,
    fail: bool,
    /// Fail only posts whose text contains this
    fail_matching: Option<String>,
}

impl RecordingSlack {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_posts_containing(text: &str) -> Self {
        Self {
            fail_matching: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn posts(&self) -> Vec<PostMessage> {
        self.posts.lock().unwrap().clone()
    }

    pub(crate) fn updates(&self) -> Vec<MessageUpdate> {
        self.updates.lock().unwrap().clone()
    }

    fn result(&self, method: &'static str, text: &str) -> Result<(), SlackError> {
        let matched = self
            .fail_matching
            .as_deref()
            .is_some_and(|needle| text.contains(needle));
        if self.fail || matched {
            Err(SlackError::Api {
                method,
                error: "channel_not_found".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SlackApi for RecordingSlack {
    async fn post_message(&self, message: &PostMessage) -> Result<String, SlackError> {
        self.posts.lock().unwrap().push(message.clone());
        self.result("chat.postMessage", &message.text)?;
        Ok(format!("{}.000100", self.posts.lock().unwrap().len()))
    }

    async fn update_message(&self, update: &MessageUpdate) -> Result<(), SlackError> {
        self.updates.lock().unwrap().push(update.clone());
        self.result("chat.update", &update.text)
    }
}
