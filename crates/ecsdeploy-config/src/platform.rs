// Platform detection based on environment variables
//
// - AWS Lambda: AWS_LAMBDA_FUNCTION_NAME env var present
// - CLI: otherwise (default)

use crate::LogFormat;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Cli,
    Lambda,
}

impl Platform {
    /// Auto-detect the current platform based on environment variables
    pub fn detect() -> Self {
        if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
            Platform::Lambda
        } else {
            Platform::Cli
        }
    }

    /// CloudWatch ingests one JSON object per line; a terminal wants text
    pub fn default_log_format(&self) -> LogFormat {
        match self {
            Platform::Cli => LogFormat::Text,
            Platform::Lambda => LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoggingConfig;

    #[test]
    fn test_platform_log_defaults() {
        assert_eq!(Platform::Cli.default_log_format(), LogFormat::Text);
        assert_eq!(
            LoggingConfig::for_platform(Platform::Lambda).format,
            LogFormat::Json
        );
    }
}
