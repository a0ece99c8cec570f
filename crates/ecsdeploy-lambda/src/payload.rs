//! Slack interactive-message payloads
//!
//! Slack posts `application/x-www-form-urlencoded` bodies with a single
//! `payload` field holding the interaction as JSON.

use ecsdeploy_config::ImageTag;
use serde::Deserialize;
use std::fmt;

use crate::error::HandlerError;

/// Button name that triggers a redeploy; anything else cancels
pub const DEPLOY_ACTION: &str = "Deploy";

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    #[serde(default)]
    actions: Vec<ActionPayload>,
    message_ts: Option<String>,
    channel: Option<Named>,
    user: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct ActionPayload {
    name: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    id: Option<String>,
    name: Option<String>,
}

/// What the clicked button asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Deploy { tag: ImageTag },
    Dismiss { name: String },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Deploy { tag } => write!(f, "deploy {}", tag),
            Action::Dismiss { name } => write!(f, "dismiss ({})", name),
        }
    }
}

/// A parsed button click
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub action: Action,
    /// Timestamp of the message carrying the buttons, used to edit it in place
    pub message_ts: String,
    pub channel: String,
    pub user: Option<String>,
}

/// Parse a form-encoded interaction body.
/// The channel falls back to `default_channel` when the payload carries none.
pub fn parse_request(body: &str, default_channel: Option<&str>) -> Result<DeployRequest, HandlerError> {
    let payload = url::form_urlencoded::parse(body.as_bytes())
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| HandlerError::InvalidPayload("missing payload field".to_string()))?;

    let payload: InteractionPayload = serde_json::from_str(&payload)
        .map_err(|e| HandlerError::InvalidPayload(format!("payload is not valid JSON: {}", e)))?;

    let first = payload
        .actions
        .into_iter()
        .next()
        .ok_or_else(|| HandlerError::InvalidPayload("missing actions[0]".to_string()))?;
    let message_ts = payload
        .message_ts
        .filter(|ts| !ts.is_empty())
        .ok_or_else(|| HandlerError::InvalidPayload("missing message_ts".to_string()))?;

    let name = first.name.unwrap_or_default();
    let action = if name == DEPLOY_ACTION {
        let value = first
            .value
            .ok_or_else(|| HandlerError::InvalidPayload("Deploy action without a value".to_string()))?;
        Action::Deploy {
            tag: value.parse()?,
        }
    } else {
        Action::Dismiss { name }
    };

    let channel = payload
        .channel
        .and_then(|c| c.id)
        .or_else(|| default_channel.map(String::from))
        .ok_or_else(|| HandlerError::InvalidPayload("no channel to acknowledge in".to_string()))?;

    Ok(DeployRequest {
        action,
        message_ts,
        channel,
        user: payload.user.and_then(|u| u.name.or(u.id)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(json: &str) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", json)
            .finish()
    }

    #[test]
    fn test_deploy_click() {
        let body = form(
            r#"{"actions":[{"name":"Deploy","value":"v123","type":"button"}],
                "message_ts":"100.1","channel":{"id":"C024BE91L","name":"deploys"},
                "user":{"id":"U045VRZFT","name":"brautigan"}}"#,
        );
        let request = parse_request(&body, Some("CFALLBACK")).unwrap();
        assert_eq!(
            request.action,
            Action::Deploy {
                tag: "v123".parse().unwrap()
            }
        );
        assert_eq!(request.message_ts, "100.1");
        assert_eq!(request.channel, "C024BE91L");
        assert_eq!(request.user.as_deref(), Some("brautigan"));
    }

    #[test]
    fn test_plus_and_percent_decoding() {
        // Spaces arrive as '+', and the JSON's own '+' as %2B
        let body = "payload=%7B%22actions%22%3A%5B%7B%22name%22%3A%22Cancel%22%2C%22value%22%3A%22a%2Bb%22%7D%5D%2C%22message_ts%22%3A%221.2%22%2C%22user%22%3A%7B%22name%22%3A%22jane+doe%22%7D%7D";
        let request = parse_request(body, Some("C1")).unwrap();
        assert_eq!(
            request.action,
            Action::Dismiss {
                name: "Cancel".to_string()
            }
        );
        assert_eq!(request.user.as_deref(), Some("jane doe"));
        assert_eq!(request.channel, "C1");
    }

    #[test]
    fn test_malformed_payloads() {
        let cases = [
            "token=abc".to_string(),
            "payload=not-json".to_string(),
            form(r#"{"actions":[],"message_ts":"1.0"}"#),
            form(r#"{"actions":[{"name":"Deploy","value":"v1"}]}"#),
            form(r#"{"actions":[{"name":"Deploy"}],"message_ts":"1.0"}"#),
        ];
        for body in &cases {
            let err = parse_request(body, Some("C1")).unwrap_err();
            assert!(
                matches!(err, HandlerError::InvalidPayload(_)),
                "{} gave {:?}",
                body,
                err
            );
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn test_bad_tag_is_rejected() {
        let body = form(r#"{"actions":[{"name":"Deploy","value":"v1; rm -rf"}],"message_ts":"1.0"}"#);
        assert!(matches!(
            parse_request(&body, Some("C1")),
            Err(HandlerError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_channel_required_somewhere() {
        let body = form(r#"{"actions":[{"name":"Cancel","value":"v1"}],"message_ts":"1.0"}"#);
        assert!(parse_request(&body, None).is_err());
    }
}
