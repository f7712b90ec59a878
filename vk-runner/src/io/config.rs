//! Runner configuration loaded from an optional TOML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Upper bound for every timeout setting (one day).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Runner configuration (TOML).
///
/// Every field has a default, so an absent file or an empty table yields a
/// working setup that launches the published Vibe Kanban MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RunnerConfig {
    pub service: ServiceConfig,
}

/// How to launch and talk to the service process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Executable to spawn (resolved through `PATH`).
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment variables for the service process.
    pub env: BTreeMap<String, String>,

    /// MCP protocol version announced in `initialize`.
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,

    /// Budget for spawn + `initialize` handshake. `npx` may download the
    /// server on first use, so this is generous.
    pub startup_timeout_secs: u64,
    /// Budget for each remote call after the handshake.
    pub call_timeout_secs: u64,
    /// How long to wait for the service to exit after stdin closes before killing it.
    pub shutdown_timeout_secs: u64,
    /// Bytes of service stderr kept for error messages.
    pub stderr_limit_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            command: "npx".to_string(),
            args: vec![
                "-y".to_string(),
                "vibe-kanban@latest".to_string(),
                "--mcp".to_string(),
            ],
            env: BTreeMap::new(),
            protocol_version: "2024-11-05".to_string(),
            client_name: "vk-runner".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            startup_timeout_secs: 120,
            call_timeout_secs: 60,
            shutdown_timeout_secs: 5,
            stderr_limit_bytes: 16_384,
        }
    }
}

impl ServiceConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Command line for logs and error messages.
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        let service = &self.service;
        if service.command.trim().is_empty() {
            return Err(anyhow!("service.command must be non-empty"));
        }
        if service.startup_timeout_secs == 0 {
            return Err(anyhow!("service.startup_timeout_secs must be > 0"));
        }
        if service.call_timeout_secs == 0 {
            return Err(anyhow!("service.call_timeout_secs must be > 0"));
        }
        for (name, secs) in [
            ("startup_timeout_secs", service.startup_timeout_secs),
            ("call_timeout_secs", service.call_timeout_secs),
            ("shutdown_timeout_secs", service.shutdown_timeout_secs),
        ] {
            if secs > MAX_TIMEOUT_SECS {
                return Err(anyhow!("service.{name} must be <= {MAX_TIMEOUT_SECS}"));
            }
        }
        if service.protocol_version.trim().is_empty() {
            return Err(anyhow!("service.protocol_version must be non-empty"));
        }
        if service.client_name.trim().is_empty() {
            return Err(anyhow!("service.client_name must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
        assert_eq!(
            cfg.service.display_command(),
            "npx -y vibe-kanban@latest --mcp"
        );
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[service]\ncommand = \"vibe-kanban-mcp\"\nargs = []\ncall_timeout_secs = 5\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.service.command, "vibe-kanban-mcp");
        assert!(cfg.service.args.is_empty());
        assert_eq!(cfg.service.call_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.service.protocol_version, "2024-11-05");
    }

    #[test]
    fn rejects_zero_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[service]\nstartup_timeout_secs = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("startup_timeout_secs"));
    }

    #[test]
    fn rejects_timeouts_beyond_one_day() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[service]\nstartup_timeout_secs = 9223372036854775807\n",
        )
        .expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("startup_timeout_secs"));

        let cfg = RunnerConfig {
            service: ServiceConfig {
                call_timeout_secs: MAX_TIMEOUT_SECS,
                shutdown_timeout_secs: MAX_TIMEOUT_SECS + 1,
                ..ServiceConfig::default()
            },
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("shutdown_timeout_secs"));
    }

    #[test]
    fn rejects_empty_command() {
        let cfg = RunnerConfig {
            service: ServiceConfig {
                command: " ".to_string(),
                ..ServiceConfig::default()
            },
        };
        assert!(cfg.validate().is_err());
    }
}
