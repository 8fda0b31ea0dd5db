//! Machine-type catalog lookups.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// Sizing of a machine type (SKU).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct MachineType {
    /// Provider SKU the entry describes.
    pub sku: String,
    /// Virtual CPU count.
    #[serde(default)]
    pub cpus: u32,
    /// Memory in MB.
    pub memory_mb: u64,
    /// Disk allocation in GB.
    pub disk_gb: u64,
}

/// Errors raised by catalog lookups.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CatalogError {
    /// Raised when the catalog has no entry for the SKU.
    #[error("unknown machine type '{sku}' for provider {provider}")]
    UnknownMachineType {
        /// Provider name used for the lookup.
        provider: String,
        /// SKU that was requested.
        sku: String,
    },
    /// Raised when a catalog document cannot be parsed.
    #[error("failed to parse catalog: {0}")]
    Parse(String),
}

/// Resolves SKUs to machine sizing.
pub trait Catalog: Send + Sync {
    /// Looks up the machine type for `sku` on `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownMachineType`] when the SKU is not listed.
    fn machine_type(&self, provider: &str, sku: &str) -> Result<MachineType, CatalogError>;
}

/// In-memory catalog keyed by provider and SKU.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StaticCatalog {
    providers: BTreeMap<String, BTreeMap<String, MachineType>>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry for `provider`.
    #[must_use]
    pub fn with_machine_type(mut self, provider: impl Into<String>, machine: MachineType) -> Self {
        self.providers
            .entry(provider.into())
            .or_default()
            .insert(machine.sku.clone(), machine);
        self
    }

    /// Parses a catalog from JSON of the form
    /// `{"linode": [{"sku": "1", "memory_mb": 2048, "disk_gb": 20}]}`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] when the document is malformed.
    pub fn from_json(document: &str) -> Result<Self, CatalogError> {
        let parsed: BTreeMap<String, Vec<MachineType>> =
            serde_json::from_str(document).map_err(|err| CatalogError::Parse(err.to_string()))?;
        Ok(parsed
            .into_iter()
            .flat_map(|(provider, machines)| {
                machines
                    .into_iter()
                    .map(move |machine| (provider.clone(), machine))
            })
            .fold(Self::new(), |catalog, (provider, machine)| {
                catalog.with_machine_type(provider, machine)
            }))
    }
}

impl Catalog for StaticCatalog {
    fn machine_type(&self, provider: &str, sku: &str) -> Result<MachineType, CatalogError> {
        self.providers
            .get(provider)
            .and_then(|machines| machines.get(sku))
            .cloned()
            .ok_or_else(|| CatalogError::UnknownMachineType {
                provider: provider.to_owned(),
                sku: sku.to_owned(),
            })
    }
}
