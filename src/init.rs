// Logging setup for the CLI
//
// Logs go to stderr so `graph` output on stdout stays pipeable. The
// subscriber is installed before the stack config is read, so the filter
// sits behind a reload layer and the config's level is applied afterwards.

use ecsdeploy_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Changes the level filter of the installed subscriber
pub struct TracingHandle(reload::Handle<EnvFilter, Registry>);

impl TracingHandle {
    pub fn set_level(&self, level: &str) {
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(e) = self.0.reload(filter) {
                    tracing::debug!(error = %e, "log level not reloaded");
                }
            }
            Err(e) => tracing::warn!(level, error = %e, "ignoring invalid log level"),
        }
    }
}

/// Initialize tracing from the logging config
pub fn init_tracing(config: &LoggingConfig) -> TracingHandle {
    use tracing_subscriber::{fmt, prelude::*};

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(env_filter);

    let registry = tracing_subscriber::registry().with(filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    TracingHandle(handle)
}
