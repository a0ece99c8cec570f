// ECR push notifier
//
// EventBridge forwards registry events to SNS; each SNS record carries one
// event as JSON. Successful pushes get an interactive Slack prompt whose
// buttons the webhook later answers.

use ecsdeploy_config::{ImageTag, NotifierConfig};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::payload::DEPLOY_ACTION;
use crate::slack::{Attachment, Button, PostMessage, SlackApi, SlackError};

pub const CALLBACK_ID: &str = "ecs-deploy";
const ECR_DETAIL_TYPE: &str = "ECR Image Action";

#[derive(Debug, Deserialize)]
struct EcrEvent {
    #[serde(rename = "detail-type")]
    detail_type: Option<String>,
    detail: Option<EcrDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct EcrDetail {
    action_type: Option<String>,
    result: Option<String>,
    repository_name: Option<String>,
    image_tag: Option<String>,
}

/// A successfully pushed, tagged image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedImage {
    pub repository: String,
    pub tag: ImageTag,
}

/// Extract a successful tagged push from one SNS message, if it is one
pub fn pushed_image(message: &str) -> Option<PushedImage> {
    let event: EcrEvent = match serde_json::from_str(message) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "SNS message is not an EventBridge event, skipping");
            return None;
        }
    };
    if event.detail_type.as_deref() != Some(ECR_DETAIL_TYPE) {
        debug!(detail_type = ?event.detail_type, "not an ECR image action, skipping");
        return None;
    }
    let detail = event.detail?;
    if detail.action_type.as_deref() != Some("PUSH") || detail.result.as_deref() != Some("SUCCESS") {
        debug!(action_type = ?detail.action_type, result = ?detail.result, "not a successful push, skipping");
        return None;
    }
    let Some(raw_tag) = detail.image_tag else {
        debug!("untagged push, skipping");
        return None;
    };
    match raw_tag.parse::<ImageTag>() {
        Ok(tag) => Some(PushedImage {
            repository: detail.repository_name.unwrap_or_default(),
            tag,
        }),
        Err(e) => {
            warn!(error = %e, "pushed tag cannot be deployed, skipping");
            None
        }
    }
}

/// The interactive message offering to deploy `image`
pub fn deploy_prompt(channel: &str, image: &PushedImage) -> PostMessage {
    PostMessage {
        channel: channel.to_string(),
        text: format!("Image {}:{} was pushed", image.repository, image.tag),
        attachments: vec![Attachment {
            text: format!("Deploy {} to the service?", image.tag),
            fallback: Some(format!("Image {} is ready to deploy", image.tag)),
            callback_id: Some(CALLBACK_ID.to_string()),
            color: Some("#3AA3E3"),
            attachment_type: Some("default"),
            actions: vec![
                Button::new(DEPLOY_ACTION, image.tag.as_str()).primary(),
                Button::new("Cancel", image.tag.as_str()),
            ],
        }],
    }
}

/// Some prompts of one event could not be posted
#[derive(Debug, Error)]
#[error("{failed} of {attempted} deploy prompts failed; first error: {first}")]
pub struct NotifyError {
    pub posted: usize,
    pub failed: usize,
    pub attempted: usize,
    #[source]
    pub first: SlackError,
}

/// Post one prompt per qualifying message; returns how many were posted.
/// Every record is attempted. Any Slack failure fails the invocation after
/// the rest have been posted.
pub async fn notify<'a>(
    slack: &dyn SlackApi,
    config: &NotifierConfig,
    messages: impl IntoIterator<Item = &'a str>,
) -> Result<usize, NotifyError> {
    let mut posted = 0;
    let mut errors = Vec::new();
    for image in messages.into_iter().filter_map(pushed_image) {
        match slack.post_message(&deploy_prompt(&config.channel, &image)).await {
            Ok(ts) => {
                info!(repository = %image.repository, tag = %image.tag, ts = %ts, "posted deploy prompt");
                posted += 1;
            }
            Err(e) => {
                warn!(repository = %image.repository, tag = %image.tag, error = %e, "failed to post deploy prompt");
                errors.push(e);
            }
        }
    }

    let failed = errors.len();
    match errors.into_iter().next() {
        None => Ok(posted),
        Some(first) => Err(NotifyError {
            posted,
            failed,
            attempted: posted + failed,
            first,
        }),
    }
}
