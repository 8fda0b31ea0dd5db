//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::Utf8Path;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poll::Poller;
use crate::startup_script::{DEFAULT_STARTUP_SCRIPT_LABEL, ScriptTemplate};

/// Orchestrator tunables derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PELICAN",
    discovery(
        app_name = "pelican",
        env_var = "PELICAN_CONFIG_PATH",
        config_file_name = "pelican.toml",
        dotfile_name = ".pelican.toml",
        project_file_name = "pelican.toml"
    )
)]
pub struct ProvisionerConfig {
    /// Seconds between instance status observations. Defaults to 5.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Upper bound in seconds on each status wait. Defaults to 300.
    #[ortho_config(default = 300)]
    pub wait_timeout_secs: u64,
    /// Provider name used for catalog lookups.
    #[ortho_config(default = "linode".to_owned())]
    pub catalog_provider: String,
    /// Account-unique label of the startup script.
    #[ortho_config(default = DEFAULT_STARTUP_SCRIPT_LABEL.to_owned())]
    pub startup_script_label: String,
    /// Path to a startup script template. Unset uses the built-in bootstrap
    /// script.
    pub startup_script_file: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProvisionerConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to pelican.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{} must be greater than zero: set {} or {} in pelican.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    fn require_path(value: Option<&str>, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.is_some_and(|path| path.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(format!(
                "{} must not be blank: unset {} or fix {} in pelican.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("pelican")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] when a duration is zero or the
    /// script path is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_positive(
            self.poll_interval_secs,
            &FieldMetadata::new(
                "poll interval",
                "PELICAN_POLL_INTERVAL_SECS",
                "poll_interval_secs",
            ),
        )?;
        Self::require_positive(
            self.wait_timeout_secs,
            &FieldMetadata::new(
                "wait timeout",
                "PELICAN_WAIT_TIMEOUT_SECS",
                "wait_timeout_secs",
            ),
        )?;
        Self::require_field(
            &self.catalog_provider,
            &FieldMetadata::new(
                "catalog provider",
                "PELICAN_CATALOG_PROVIDER",
                "catalog_provider",
            ),
        )?;
        Self::require_field(
            &self.startup_script_label,
            &FieldMetadata::new(
                "startup script label",
                "PELICAN_STARTUP_SCRIPT_LABEL",
                "startup_script_label",
            ),
        )?;
        Self::require_path(
            self.startup_script_file.as_deref(),
            &FieldMetadata::new(
                "startup script file",
                "PELICAN_STARTUP_SCRIPT_FILE",
                "startup_script_file",
            ),
        )?;
        Ok(())
    }
}

/// Runtime settings threaded into the orchestrator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionerSettings {
    /// Poller used for both status waits.
    pub poller: Poller,
    /// Provider name used for catalog lookups.
    pub catalog_provider: String,
    /// Label of the startup script to upsert.
    pub startup_script_label: String,
    /// Template rendered into the startup script body for each run.
    pub startup_script: ScriptTemplate,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            poller: Poller::default(),
            catalog_provider: String::from("linode"),
            startup_script_label: DEFAULT_STARTUP_SCRIPT_LABEL.to_owned(),
            startup_script: ScriptTemplate::builtin(),
        }
    }
}

impl ProvisionerSettings {
    /// Validates `config` and loads its startup script template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the template file
    /// cannot be read or lacks an interpreter line.
    pub fn from_config(config: &ProvisionerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let startup_script = config
            .startup_script_file
            .as_deref()
            .map(str::trim)
            .map_or_else(
                || Ok(ScriptTemplate::builtin()),
                |path| ScriptTemplate::read(Utf8Path::new(path)),
            )
            .map_err(|err| ConfigError::InvalidValue(err.to_string()))?;
        Ok(Self {
            poller: Poller::new(
                Duration::from_secs(config.poll_interval_secs),
                Duration::from_secs(config.wait_timeout_secs),
            ),
            catalog_provider: config.catalog_provider.trim().to_owned(),
            startup_script_label: config.startup_script_label.trim().to_owned(),
            startup_script,
        })
    }

    /// Replaces the poller.
    #[must_use]
    pub const fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
