//! Instance catalog.
//!
//! Static lookup of `(provider, instance type)` to hardware specification and
//! monthly price. The catalog is immutable after construction and can be
//! shared freely between tasks.

use std::collections::BTreeMap;

use crate::domain::{InstanceSpec, Provider};
use crate::{Error, Result};

/// Built-in price list.
const BUILTIN_ENTRIES: &[(Provider, &str, InstanceSpec)] = &[
    (Provider::Aws, "t3.micro", InstanceSpec::new(2, 1, 8, 1.0, 7.59)),
    (Provider::Aws, "t3.small", InstanceSpec::new(2, 2, 20, 2.0, 15.18)),
    (Provider::Aws, "t3.medium", InstanceSpec::new(2, 4, 40, 3.0, 30.37)),
    (Provider::Aws, "t3.large", InstanceSpec::new(2, 8, 80, 4.0, 60.74)),
    (Provider::Aws, "m5.xlarge", InstanceSpec::new(4, 16, 160, 5.0, 140.16)),
    (Provider::Gcp, "e2-micro", InstanceSpec::new(2, 1, 10, 1.0, 6.11)),
    (Provider::Gcp, "e2-small", InstanceSpec::new(2, 2, 20, 2.0, 12.23)),
    (Provider::Gcp, "e2-medium", InstanceSpec::new(2, 4, 40, 3.0, 24.46)),
    (Provider::Gcp, "e2-standard-4", InstanceSpec::new(4, 16, 100, 5.0, 97.84)),
    (Provider::Azure, "B1s", InstanceSpec::new(1, 1, 4, 1.0, 7.59)),
    (Provider::Azure, "B2s", InstanceSpec::new(2, 4, 8, 2.0, 30.37)),
    (Provider::Azure, "D2s_v3", InstanceSpec::new(2, 8, 16, 3.0, 70.08)),
    (Provider::DigitalOcean, "s-1vcpu-1gb", InstanceSpec::new(1, 1, 25, 1.0, 6.0)),
    (Provider::DigitalOcean, "s-2vcpu-2gb", InstanceSpec::new(2, 2, 60, 3.0, 18.0)),
    (Provider::DigitalOcean, "s-4vcpu-8gb", InstanceSpec::new(4, 8, 160, 5.0, 48.0)),
];

/// A single catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub provider: Provider,
    pub instance_type: String,
    pub spec: InstanceSpec,
}

/// Lookup table of instance types.
#[derive(Debug, Clone)]
pub struct InstanceCatalog {
    entries: BTreeMap<(Provider, String), InstanceSpec>,
}

impl InstanceCatalog {
    /// Catalog with the built-in price list.
    pub fn builtin() -> Self {
        Self::from_entries(
            BUILTIN_ENTRIES
                .iter()
                .map(|(provider, instance_type, spec)| (*provider, instance_type.to_string(), *spec)),
        )
    }

    /// Catalog with custom entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (Provider, String, InstanceSpec)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(provider, instance_type, spec)| ((provider, instance_type), spec))
                .collect(),
        }
    }

    /// Resolve a provider name and instance type to its specification.
    pub fn resolve(&self, provider: &str, instance_type: &str) -> Result<InstanceSpec> {
        let unknown = || Error::UnknownInstanceType {
            provider: provider.to_string(),
            instance_type: instance_type.to_string(),
        };
        let provider = Provider::parse(provider).ok_or_else(unknown)?;
        self.resolve_for(provider, instance_type).map_err(|_| unknown())
    }

    /// Resolve an already parsed provider.
    pub fn resolve_for(&self, provider: Provider, instance_type: &str) -> Result<InstanceSpec> {
        self.entries
            .get(&(provider, instance_type.to_string()))
            .copied()
            .ok_or_else(|| Error::UnknownInstanceType {
                provider: provider.to_string(),
                instance_type: instance_type.to_string(),
            })
    }

    /// Instance types offered by a provider, in name order.
    pub fn instance_types(&self, provider: Provider) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|(p, _)| *p == provider)
            .map(|(_, instance_type)| instance_type.as_str())
            .collect()
    }

    /// All catalog rows.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.entries
            .iter()
            .map(|((provider, instance_type), spec)| CatalogEntry {
                provider: *provider,
                instance_type: instance_type.clone(),
                spec: *spec,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InstanceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
