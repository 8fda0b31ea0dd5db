//! Immutable description of the instance to provision.

use std::fmt;

use thiserror::Error;

use crate::types::{ImageId, KernelId, PlanId, ZoneId};

/// Errors raised while building an [`InstanceSpec`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// Raised when a required field is empty.
    #[error("missing or empty field: {0}")]
    Missing(String),
    /// Raised when a numeric identifier cannot be parsed.
    #[error("field {field} is not a numeric identifier: '{value}'")]
    InvalidNumber {
        /// Field being parsed.
        field: String,
        /// Offending value.
        value: String,
    },
    /// Raised when a name would break out of a label or script line.
    #[error("field {field} must not contain control characters")]
    ControlCharacter {
        /// Field being checked.
        field: String,
    },
}

/// Everything the orchestrator needs to bring one instance up.
#[derive(Clone, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Cluster the instance belongs to; prefixes the derived instance name.
    pub cluster_name: String,
    /// Datacenter the instance is created in.
    pub zone: ZoneId,
    /// SKU used for catalog lookups.
    pub sku: String,
    /// Plan identifier derived from the SKU.
    pub plan: PlanId,
    /// Boot kernel.
    pub kernel_id: KernelId,
    /// Operating system image for the root disk.
    pub image_id: ImageId,
    /// Root password set on the installed image.
    pub root_password: String,
    /// Optional label for the root disk and boot configuration. Falls back to
    /// the derived instance name.
    pub display_name: Option<String>,
}

impl fmt::Debug for InstanceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSpec")
            .field("cluster_name", &self.cluster_name)
            .field("zone", &self.zone)
            .field("sku", &self.sku)
            .field("plan", &self.plan)
            .field("kernel_id", &self.kernel_id)
            .field("image_id", &self.image_id)
            .field("root_password", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl InstanceSpec {
    /// Starts a builder for an [`InstanceSpec`].
    #[must_use]
    pub fn builder() -> InstanceSpecBuilder {
        InstanceSpecBuilder::new()
    }
}

/// Builder for [`InstanceSpec`] that accepts textual identifiers and parses
/// them on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceSpecBuilder {
    cluster_name: String,
    zone: String,
    sku: String,
    kernel_id: String,
    image_id: String,
    root_password: String,
    display_name: Option<String>,
}

impl InstanceSpecBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cluster name.
    #[must_use]
    pub fn cluster_name(mut self, value: impl Into<String>) -> Self {
        self.cluster_name = value.into();
        self
    }

    /// Sets the zone identifier.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.zone = value.into();
        self
    }

    /// Sets the SKU, which doubles as the plan identifier.
    #[must_use]
    pub fn sku(mut self, value: impl Into<String>) -> Self {
        self.sku = value.into();
        self
    }

    /// Sets the boot kernel identifier.
    #[must_use]
    pub fn kernel_id(mut self, value: impl Into<String>) -> Self {
        self.kernel_id = value.into();
        self
    }

    /// Sets the OS image identifier.
    #[must_use]
    pub fn image_id(mut self, value: impl Into<String>) -> Self {
        self.image_id = value.into();
        self
    }

    /// Sets the root password.
    #[must_use]
    pub fn root_password(mut self, value: impl Into<String>) -> Self {
        self.root_password = value.into();
        self
    }

    /// Sets the optional disk and boot configuration label.
    #[must_use]
    pub fn display_name(mut self, value: Option<String>) -> Self {
        self.display_name = value;
        self
    }

    /// Builds and validates the [`InstanceSpec`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::Missing`] when a required field is empty,
    /// [`SpecError::InvalidNumber`] when an identifier is not numeric and
    /// [`SpecError::ControlCharacter`] when a name contains a
    /// control character.
    pub fn build(self) -> Result<InstanceSpec, SpecError> {
        let cluster_name = require("cluster_name", &self.cluster_name)
            .and_then(|value| printable("cluster_name", value))?;
        let sku = require("sku", &self.sku)?;
        let root_password = require("root_password", &self.root_password)?;
        Ok(InstanceSpec {
            zone: parse_id("zone", &self.zone)?.into(),
            plan: parse_id("sku", &sku)?.into(),
            kernel_id: parse_id("kernel_id", &self.kernel_id)?.into(),
            image_id: parse_id("image_id", &self.image_id)?.into(),
            cluster_name,
            sku,
            root_password,
            display_name: self
                .display_name
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(|value| printable("display_name", value))
                .transpose()?,
        })
    }
}

fn require(field: &str, value: &str) -> Result<String, SpecError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SpecError::Missing(field.to_owned()));
    }
    Ok(trimmed.to_owned())
}

fn printable(field: &str, value: String) -> Result<String, SpecError> {
    if value.chars().any(char::is_control) {
        return Err(SpecError::ControlCharacter {
            field: field.to_owned(),
        });
    }
    Ok(value)
}

fn parse_id(field: &str, value: &str) -> Result<u64, SpecError> {
    let trimmed = require(field, value)?;
    trimmed.parse().map_err(|_| SpecError::InvalidNumber {
        field: field.to_owned(),
        value: trimmed,
    })
}
