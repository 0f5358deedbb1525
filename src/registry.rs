// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! File-backed inventory of tenants and everything created for them.
//!
//! One JSON document per tenant under `<state>/registry/`. Teardown is driven
//! from these records, never from names derived at deletion time.

use crate::error::{Result, TenantError};
use crate::storage;
use crate::types::resource::ResourceRef;
use crate::types::tenant::{RoleClass, Tenant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantPhase {
    /// Provisioning started but has not completed
    Provisioning,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub username: String,
    pub namespace: String,
    pub domain: String,
    pub role: RoleClass,
    pub subdomain: String,
    /// Name of the TLS secret the ingress uses
    pub cert_secret: String,
    pub validity_days: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub cert_expiry: Option<DateTime<Utc>>,
    pub phase: TenantPhase,
    /// Whether teardown may delete the namespace
    #[serde(default)]
    pub namespace_owned: bool,
    /// Everything created for the tenant, in creation order
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
}

impl TenantRecord {
    pub fn new(tenant: &Tenant) -> Self {
        Self {
            username: tenant.username.clone(),
            namespace: tenant.namespace.clone(),
            domain: tenant.domain.clone(),
            role: tenant.role,
            subdomain: tenant.subdomain(),
            cert_secret: tenant.cert_secret.clone(),
            validity_days: tenant.validity_days,
            created_at: Utc::now(),
            cert_expiry: None,
            phase: TenantPhase::Provisioning,
            namespace_owned: false,
            resources: Vec::new(),
        }
    }

    /// The tenant as it was last provisioned
    pub fn tenant(&self) -> Tenant {
        Tenant {
            username: self.username.clone(),
            domain: self.domain.clone(),
            namespace: self.namespace.clone(),
            role: self.role,
            cert_secret: self.cert_secret.clone(),
            validity_days: self.validity_days,
        }
    }

    /// Take over the parameters of a new provisioning request for the same tenant
    pub fn update_from(&mut self, tenant: &Tenant) {
        self.role = tenant.role;
        self.cert_secret = tenant.cert_secret.clone();
        self.validity_days = tenant.validity_days;
    }

    /// Add resources not yet listed, keeping order
    pub fn add_resources(&mut self, resources: impl IntoIterator<Item = ResourceRef>) {
        for resource in resources {
            if !self.resources.contains(&resource) {
                self.resources.push(resource);
            }
        }
    }
}

pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("registry"),
        }
    }

    fn path(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{}.json", username))
    }

    pub fn lookup(&self, username: &str) -> Result<Option<TenantRecord>> {
        let path = self.path(username);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TenantError::storage(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| TenantError::storage(format!("corrupt record {}: {}", path.display(), e)))
    }

    /// Like `lookup`, but a missing tenant is `NotFound`
    pub fn get(&self, username: &str) -> Result<TenantRecord> {
        self.lookup(username)?
            .ok_or_else(|| TenantError::NotFound(format!("tenant {} is not registered", username)))
    }

    /// Write the whole record atomically
    pub fn save(&self, record: &TenantRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| TenantError::storage(format!("cannot serialize record: {}", e)))?;
        storage::write_atomic(&self.path(&record.username), &json)?;
        debug!("Saved registry record for {}", record.username);
        Ok(())
    }

    /// Merge resources into a tenant's record and persist it
    pub fn record(&self, username: &str, resources: Vec<ResourceRef>) -> Result<TenantRecord> {
        let mut record = self.get(username)?;
        record.add_resources(resources);
        self.save(&record)?;
        Ok(record)
    }

    pub fn remove(&self, username: &str) -> Result<bool> {
        storage::remove_if_exists(&self.path(username))
    }

    /// All records, sorted by username. Unreadable records are skipped with a warning.
    pub fn list(&self) -> Result<Vec<TenantRecord>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TenantError::storage(format!(
                    "cannot list {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(username) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.lookup(username) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!("Skipping registry entry {}: {}", path.display(), e),
            }
        }
        records.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(records)
    }

    /// Refuse a tenant that clashes with what is already registered.
    ///
    /// The same username must keep its namespace and domain, and no two tenants share
    /// a namespace. Subdomains are `<username>.<domain>`, so they only clash with
    /// hosts outside the registry; `check_subdomain_free` looks for those in the cluster.
    pub fn check_conflicts(&self, tenant: &Tenant) -> Result<()> {
        if let Some(existing) = self.lookup(&tenant.username)? {
            if existing.namespace != tenant.namespace || existing.domain != tenant.domain {
                return Err(TenantError::conflict(format!(
                    "tenant {} is registered with namespace {} and domain {}",
                    existing.username, existing.namespace, existing.domain
                )));
            }
        }

        for other in self.list()? {
            if other.username == tenant.username {
                continue;
            }
            if other.namespace == tenant.namespace {
                return Err(TenantError::conflict(format!(
                    "namespace {} belongs to tenant {}",
                    other.namespace, other.username
                )));
            }
        }
        Ok(())
    }
}
