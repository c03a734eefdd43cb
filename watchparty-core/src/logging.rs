use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::{Error, Result};

/// Install the global tracing subscriber from [`LoggingConfig`].
///
/// `RUST_LOG` overrides the configured level. Returns an error if the
/// level is unknown or a subscriber is already installed, so callers
/// can decide whether a second init matters.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&config.level)?;
    let writer = match &config.file_path {
        Some(path) => Some(open_log_file(Path::new(path))?),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.format == "json" {
        let layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true);
        match writer {
            Some(file) => registry.with(layer.with_writer(file)).try_init(),
            None => registry.with(layer).try_init(),
        }
    } else {
        let layer = fmt::layer().pretty().with_span_events(FmtSpan::CLOSE);
        match writer {
            Some(file) => registry.with(layer.with_writer(file)).try_init(),
            None => registry.with(layer).try_init(),
        }
    };
    installed.map_err(|e| Error::Internal(format!("logging already initialized: {e}")))
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "warning" | "error" => {}
        other => return Err(Error::InvalidInput(format!("unknown log level: {other}"))),
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::InvalidInput(format!("bad log filter: {e}")))
}

fn open_log_file(path: &Path) -> Result<Arc<File>> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Arc::new)
        .map_err(|e| Error::Internal(format!("cannot open log file {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_level_rejected() {
        assert!(matches!(
            env_filter("verbose"),
            Err(Error::InvalidInput(_))
        ));
        assert!(env_filter("warn").is_ok());
    }

    #[test]
    fn test_json_file_logging_smoke() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
            file_path: Some(path.to_string_lossy().into_owned()),
        };

        // First install wins; a second install must fail, not panic.
        let first = init_logging(&config);
        let second = init_logging(&config);
        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::Internal(_))));

        tracing::info!(component = "logging", "smoke entry");
        assert!(path.exists());
    }
}
