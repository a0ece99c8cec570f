use ecsdeploy_config::NameError;
use thiserror::Error;

/// Why a webhook request was refused before any orchestration call
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("request signature rejected: {0}")]
    Unauthorized(String),

    #[error("invalid interaction payload: {0}")]
    InvalidPayload(String),

    #[error("invalid image tag: {0}")]
    InvalidTag(#[from] NameError),
}

impl HandlerError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MethodNotAllowed(_) => 405,
            Self::InvalidBody(_) | Self::InvalidPayload(_) | Self::InvalidTag(_) => 400,
            Self::Unauthorized(_) => 401,
        }
    }

    /// Error type string for responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed(_) => "MethodNotAllowed",
            Self::InvalidBody(_) => "InvalidBody",
            Self::Unauthorized(_) => "Unauthorized",
            Self::InvalidPayload(_) => "InvalidPayload",
            Self::InvalidTag(_) => "InvalidTag",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HandlerError::MethodNotAllowed("GET".into()).status_code(), 405);
        assert_eq!(HandlerError::InvalidBody("x".into()).status_code(), 400);
        assert_eq!(HandlerError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(HandlerError::InvalidPayload("x".into()).status_code(), 400);

        let tag_err = "bad tag!".parse::<ecsdeploy_config::ImageTag>().unwrap_err();
        let err = HandlerError::from(tag_err);
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_type(), "InvalidTag");
    }
}
