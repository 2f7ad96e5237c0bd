//! Configuration loading for the `subpub-server` binary.
//!
//! Mirrors the original service's `cleanenv`-backed `Config` struct: a YAML
//! file supplies the base values, a `SUBPUB_` prefixed environment variable
//! can override any field, and a handful of fields carry defaults so only
//! `grpc.port` is strictly required.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// One of `"local"` or `"prod"`; selects the logging format (see
    /// [`crate::logging::init`]).
    #[serde(default = "default_env")]
    pub env: String,

    /// Deadline given to [`crate::engine::Engine::close`] (via
    /// [`crate::app::App::stop`]) during graceful shutdown.
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// gRPC façade settings; required because the server cannot run without
    /// a bind port.
    pub grpc: GrpcConfig,
}

/// gRPC façade bind address and per-request timeout.
#[derive(Debug, Clone, Deserialize)]
pub struct GrpcConfig {
    /// TCP port the façade listens on.
    pub port: u16,

    /// Per-request timeout applied by the façade's timeout interceptor.
    #[serde(default = "default_grpc_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_env() -> String {
    "local".to_string()
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_grpc_timeout() -> Duration {
    Duration::from_secs(5)
}

impl AppConfig {
    /// Loads configuration from `path`, with environment variables prefixed
    /// `SUBPUB_` (double-underscore separated for nested fields, e.g.
    /// `SUBPUB_GRPC__PORT`) overriding whatever the file specifies.
    pub fn load_path(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .add_source(config::Environment::with_prefix("SUBPUB").separator("__"))
            .build()?;
        let cfg: AppConfig = settings.try_deserialize()?;
        Ok(cfg)
    }

    /// Resolves the config file path in the same priority order as the
    /// original's `getConfigPath`: an explicit `path` argument (typically
    /// from a CLI flag) first, then the `SUBPUB_CONFIG` environment
    /// variable.
    pub fn resolve_path(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
        if let Some(path) = path {
            return Ok(path);
        }
        std::env::var("SUBPUB_CONFIG")
            .map(PathBuf::from)
            .map_err(|_| anyhow::anyhow!("no config path given: pass --config or set SUBPUB_CONFIG"))
    }

    /// Resolves the config path, then loads it.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = Self::resolve_path(path)?;
        Self::load_path(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_yaml_takes_documented_defaults() {
        let mut file = tempfile_with("grpc:\n  port: 50051\n");
        let cfg = AppConfig::load_path(file.path()).unwrap();
        assert_eq!(cfg.env, "local");
        assert_eq!(cfg.stop_timeout, Duration::from_secs(10));
        assert_eq!(cfg.grpc.port, 50051);
        assert_eq!(cfg.grpc.timeout, Duration::from_secs(5));
        file.flush().unwrap();
    }

    #[test]
    fn full_yaml_overrides_defaults() {
        let file = tempfile_with(
            "env: prod\nstop_timeout: 30s\ngrpc:\n  port: 9000\n  timeout: 2s\n",
        );
        let cfg = AppConfig::load_path(file.path()).unwrap();
        assert_eq!(cfg.env, "prod");
        assert_eq!(cfg.stop_timeout, Duration::from_secs(30));
        assert_eq!(cfg.grpc.port, 9000);
        assert_eq!(cfg.grpc.timeout, Duration::from_secs(2));
    }

    #[test]
    fn resolve_path_prefers_explicit_over_env() {
        let explicit = PathBuf::from("/tmp/explicit.yaml");
        assert_eq!(AppConfig::resolve_path(Some(explicit.clone())).unwrap(), explicit);
    }

    fn tempfile_with(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
