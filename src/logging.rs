// 📝 Logging - tracing subscriber setup
//
// RUST_LOG overrides the configured filter.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{PipelineError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber; `verbose` bumps the default filter
pub fn init_tracing(config: &LoggingConfig, verbose: u8) -> Result<()> {
    let filter = match verbose {
        0 => config.filter.clone(),
        1 => "debt_rates=debug".to_string(),
        _ => "debt_rates=trace".to_string(),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let installed = match config.format {
        LogFormat::Text => fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    installed.map_err(|e| PipelineError::config(format!("tracing init failed: {e}")))
}
