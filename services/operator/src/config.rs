//! Configuration for the operator.
//!
//! Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file named by `STRATUS_CONFIG`
//! 3. environment variables, e.g. `STRATUS__ROUTE53_ENABLED=false` or
//!    `STRATUS__INSTALLATION__DEFAULT_TENANT_PRINCIPAL=default`

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File};
use serde::Deserialize;
use stratus_reconcile::{retry, ReconcileError, Result};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "STRATUS_CONFIG";

/// Operator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG` is
    /// not set.
    pub log_level: String,

    /// When false, DNS delegation is skipped entirely.
    pub route53_enabled: bool,

    /// TTL of the NS delegation record written into the intermediate zone.
    pub delegation_ttl_secs: u64,

    /// Deadline for a single reconciliation pass.
    pub pass_timeout_secs: u64,

    /// Interval between passes for a healthy object.
    pub resync_interval_secs: u64,

    /// Failed passes tolerated inside the retry window before an object is
    /// reported degraded.
    pub max_retries: u32,

    pub retry_window_secs: u64,

    /// JSON file with the tenant clusters to reconcile in simulation mode.
    pub clusters_file: Option<PathBuf>,

    pub installation: InstallationConfig,
}

/// Installation-wide accounts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstallationConfig {
    /// Account the control-plane clients act in.
    pub control_plane_account_id: String,

    /// Principal whose account owns the intermediate `k8s.<base domain>`
    /// zones.
    pub default_tenant_principal: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            route53_enabled: true,
            delegation_ttl_secs: 900,
            pass_timeout_secs: 120,
            resync_interval_secs: retry::DEFAULT_RESYNC_INTERVAL.as_secs(),
            max_retries: retry::DEFAULT_MAX_RETRIES,
            retry_window_secs: retry::DEFAULT_RETRY_WINDOW.as_secs(),
            clusters_file: None,
            installation: InstallationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `STRATUS_CONFIG` and the environment.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration from an optional file and the environment.
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("STRATUS")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no pass could run with.
    pub fn validate(&self) -> Result<()> {
        if self.delegation_ttl_secs == 0 {
            return Err(ReconcileError::invalid_config(
                "delegation_ttl_secs must be positive",
            ));
        }
        if self.pass_timeout_secs == 0 {
            return Err(ReconcileError::invalid_config(
                "pass_timeout_secs must be positive",
            ));
        }
        if self.resync_interval_secs == 0 {
            return Err(ReconcileError::invalid_config(
                "resync_interval_secs must be positive",
            ));
        }
        if self.installation.control_plane_account_id.len() != 12
            || !self
                .installation
                .control_plane_account_id
                .bytes()
                .all(|b| b.is_ascii_digit())
        {
            return Err(ReconcileError::invalid_config(format!(
                "installation.control_plane_account_id {:?} is not a 12-digit account ID",
                self.installation.control_plane_account_id
            )));
        }
        if self.installation.default_tenant_principal.trim().is_empty() {
            return Err(ReconcileError::invalid_config(
                "installation.default_tenant_principal must not be empty",
            ));
        }
        Ok(())
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;

    use super::*;

    fn valid() -> Config {
        Config {
            installation: InstallationConfig {
                control_plane_account_id: "000000000001".to_string(),
                default_tenant_principal: "default".to_string(),
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.route53_enabled);
        assert_eq!(config.delegation_ttl_secs, 900);
        assert_eq!(config.pass_timeout(), Duration::from_secs(120));
        assert_eq!(config.resync_interval(), Duration::from_secs(300));
        assert!(valid().validate().is_ok());
    }

    #[rstest]
    #[case::zero_ttl(Config { delegation_ttl_secs: 0, ..valid() })]
    #[case::zero_timeout(Config { pass_timeout_secs: 0, ..valid() })]
    #[case::zero_resync(Config { resync_interval_secs: 0, ..valid() })]
    #[case::no_principal(Config {
        installation: InstallationConfig {
            default_tenant_principal: " ".to_string(),
            ..valid().installation
        },
        ..valid()
    })]
    #[case::bad_account(Config {
        installation: InstallationConfig {
            control_plane_account_id: "12345".to_string(),
            ..valid().installation
        },
        ..valid()
    })]
    fn test_validate_rejects(#[case] config: Config) {
        assert!(config.validate().unwrap_err().is_invalid_config());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
route53_enabled = false
delegation_ttl_secs = 600
clusters_file = "/etc/stratus/clusters.json"

[installation]
control_plane_account_id = "000000000001"
default_tenant_principal = "default"
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert!(!config.route53_enabled);
        assert_eq!(config.delegation_ttl_secs, 600);
        assert_eq!(config.pass_timeout_secs, 120);
        assert_eq!(
            config.clusters_file.as_deref(),
            Some(Path::new("/etc/stratus/clusters.json"))
        );
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "delegation_ttl_secs = 600").unwrap();

        // No installation accounts.
        assert!(Config::load_from(Some(file.path())).is_err());
    }
}
