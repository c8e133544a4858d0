//! Engine configuration loader.
//!
//! Reads a `flowline.toml` file into [`EngineConfig`]. A missing file yields
//! the defaults; a file that exists but does not parse is an error.

use std::path::Path;

use flowline_types::config::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load configuration from `path`, or the defaults when it does not exist.
pub async fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return Ok(EngineConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::config::ExecutionMode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(&tmp.path().join("flowline.toml"))
            .await
            .unwrap();
        assert_eq!(config.execution.queue, "workflows");
        assert_eq!(config.execution.default_mode, ExecutionMode::Sync);
    }

    #[tokio::test]
    async fn valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("flowline.toml");
        tokio::fs::write(
            &path,
            r#"
[execution]
default_mode = "async"
max_loops = 5

[values]
support_email = "help@example.com"
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(&path).await.unwrap();
        assert_eq!(config.execution.default_mode, ExecutionMode::Async);
        assert_eq!(config.execution.max_loops, 5);
        assert_eq!(config.execution.max_retries, 3);
        assert_eq!(
            config.value("support_email").and_then(|v| v.as_str()),
            Some("help@example.com")
        );
    }

    #[tokio::test]
    async fn malformed_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("flowline.toml");
        tokio::fs::write(&path, "[execution\nmax_loops = ").await.unwrap();

        let err = load_engine_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
