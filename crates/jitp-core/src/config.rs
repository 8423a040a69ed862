//! Process configuration.
//!
//! Loaded once at start-up: TOML file, then `JITP_*` environment overrides,
//! then validation. The resulting value is read-only and passed to the
//! components that need it.

use crate::errors::{JitpError, JitpResult};
use crate::types::{AccountContext, BootstrapScope};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How the device record is provisioned once the policy is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningMode {
    /// Call the record provisioner in-process
    #[default]
    Inline,
    /// Send the request to a separately deployed function
    Invoke,
}

impl FromStr for ProvisioningMode {
    type Err = JitpError;

    fn from_str(value: &str) -> JitpResult<Self> {
        match value {
            "inline" => Ok(Self::Inline),
            "invoke" => Ok(Self::Invoke),
            other => Err(JitpError::configuration(format!(
                "unknown provisioning mode '{other}', expected 'inline' or 'invoke'"
            ))),
        }
    }
}

/// Archive sink settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Bucket name
    pub bucket: String,
    /// Root directory of the filesystem sink
    pub root: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bucket: "jitp-archive".to_string(),
            root: PathBuf::from("./.jitp/archive"),
        }
    }
}

/// Local control-plane settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Root directory of the local control-plane state
    pub root: PathBuf,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./.jitp/state"),
        }
    }
}

/// Record provisioning settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Inline or invoke
    pub mode: ProvisioningMode,
    /// Function to invoke in `invoke` mode
    pub function_name: Option<String>,
}

/// Issuance settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Breadth of the policy attached at issuance
    pub scope: BootstrapScope,
}

/// Bounds applied to every remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Per-call timeout
    pub call_timeout_ms: u64,
    /// Extra attempts for throttled, timed out or unavailable calls
    pub transient_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 5_000,
            transient_retries: 0,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitpConfig {
    /// Control-plane region
    pub region: String,
    /// Account used in ARNs when a trigger does not name one
    pub account_id: Option<String>,
    /// Archive sink
    pub archive: ArchiveConfig,
    /// Local control plane
    pub control_plane: ControlPlaneConfig,
    /// Record provisioning
    pub provisioning: ProvisioningConfig,
    /// Issuance
    pub bootstrap: BootstrapConfig,
    /// Remote call bounds
    pub remote: RemoteConfig,
}

impl Default for JitpConfig {
    fn default() -> Self {
        Self {
            region: "us-east-2".to_string(),
            account_id: None,
            archive: ArchiveConfig::default(),
            control_plane: ControlPlaneConfig::default(),
            provisioning: ProvisioningConfig::default(),
            bootstrap: BootstrapConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

const MAX_CALL_TIMEOUT_MS: u64 = 300_000;
const MAX_TRANSIENT_RETRIES: u32 = 5;

fn parse_number<T: FromStr>(key: &str, value: &str) -> JitpResult<T> {
    value
        .parse()
        .map_err(|_| JitpError::configuration(format!("{key} must be a number, got '{value}'")))
}

impl JitpConfig {
    /// Read a TOML file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> JitpResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file absent, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            JitpError::configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        toml::from_str(&contents).map_err(|e| {
            JitpError::configuration(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Apply `JITP_*` variables from the process environment
    pub fn merge_with_env(&mut self) -> JitpResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `JITP_*` overrides from an explicit variable list
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> JitpResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "JITP_REGION" => self.region = value.to_string(),
                "JITP_ACCOUNT_ID" => self.account_id = Some(value.to_string()),
                "JITP_BUCKET_NAME" => self.archive.bucket = value.to_string(),
                "JITP_ARCHIVE_ROOT" => self.archive.root = PathBuf::from(value),
                "JITP_STATE_ROOT" => self.control_plane.root = PathBuf::from(value),
                "JITP_PROVISIONING_MODE" => self.provisioning.mode = value.parse()?,
                "JITP_THING_CREATION_FUNCTION" => {
                    self.provisioning.function_name = Some(value.to_string());
                }
                "JITP_BOOTSTRAP_SCOPE" => self.bootstrap.scope = value.parse()?,
                "JITP_CALL_TIMEOUT_MS" => self.remote.call_timeout_ms = parse_number(key, value)?,
                "JITP_TRANSIENT_RETRIES" => {
                    self.remote.transient_retries = parse_number(key, value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> JitpResult<()> {
        if self.region.trim().is_empty() {
            return Err(JitpError::configuration("region must not be empty"));
        }

        match self.account_id.as_deref() {
            None => return Err(JitpError::configuration("account_id is required")),
            Some(id) if id.len() != 12 || !id.chars().all(|c| c.is_ascii_digit()) => {
                return Err(JitpError::configuration(format!(
                    "account_id must be 12 digits, got '{id}'"
                )));
            }
            Some(_) => {}
        }

        if self.provisioning.mode == ProvisioningMode::Invoke
            && self
                .provisioning
                .function_name
                .as_deref()
                .map_or(true, |f| f.trim().is_empty())
        {
            return Err(JitpError::configuration(
                "provisioning.function_name is required in invoke mode",
            ));
        }

        if self.remote.call_timeout_ms == 0 || self.remote.call_timeout_ms > MAX_CALL_TIMEOUT_MS {
            return Err(JitpError::configuration(format!(
                "remote.call_timeout_ms must be between 1 and {MAX_CALL_TIMEOUT_MS}"
            )));
        }

        if self.remote.transient_retries > MAX_TRANSIENT_RETRIES {
            return Err(JitpError::configuration(format!(
                "remote.transient_retries must be at most {MAX_TRANSIENT_RETRIES}"
            )));
        }

        Ok(())
    }

    /// File, then environment, then validation
    pub fn load(path: &Path) -> JitpResult<Self> {
        let mut config = Self::load_from_file(path)?;
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Region and account for ARNs
    pub fn account(&self) -> JitpResult<AccountContext> {
        let account_id = self
            .account_id
            .clone()
            .ok_or_else(|| JitpError::configuration("account_id is required"))?;
        Ok(AccountContext::new(self.region.clone(), account_id))
    }

    /// Per-call timeout as a `Duration`
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.call_timeout_ms)
    }
}
