// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-tenant credential files under `<state>/tenants/<username>/`

use crate::error::{Result, TenantError};
use crate::pki::{CertificateInfo, Credential};
use crate::storage;
use crate::types::resource::ResourceRef;
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

pub struct CredentialFiles {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub csr: PathBuf,
    pub cert: PathBuf,
    pub kubeconfig: PathBuf,
}

impl CredentialFiles {
    pub fn new(state_dir: &Path, username: &str) -> Self {
        let dir = state_dir.join("tenants").join(username);
        Self {
            key: dir.join(format!("{}.key", username)),
            csr: dir.join(format!("{}.csr", username)),
            cert: dir.join(format!("{}.crt", username)),
            kubeconfig: dir.join("kubeconfig"),
            dir,
        }
    }

    /// Write key, request and certificate. Returns the files for the registry.
    pub fn write_credential(&self, credential: &Credential) -> Result<Vec<ResourceRef>> {
        storage::write_atomic(&self.key, credential.key_pem.as_bytes())?;
        storage::write_atomic(&self.csr, credential.csr_pem.as_bytes())?;
        storage::write_atomic(&self.cert, credential.cert_pem.as_bytes())?;
        Ok(vec![
            ResourceRef::file(&self.key),
            ResourceRef::file(&self.csr),
            ResourceRef::file(&self.cert),
        ])
    }

    pub fn write_kubeconfig(&self, kubeconfig: &str) -> Result<ResourceRef> {
        storage::write_atomic(&self.kubeconfig, kubeconfig.as_bytes())?;
        Ok(ResourceRef::file(&self.kubeconfig))
    }

    /// A previously written credential whose certificate has not expired yet
    pub fn load_valid(&self) -> Result<Option<Credential>> {
        let (Some(key_pem), Some(csr_pem), Some(cert_pem)) = (
            read_optional(&self.key)?,
            read_optional(&self.csr)?,
            read_optional(&self.cert)?,
        ) else {
            return Ok(None);
        };

        let info = CertificateInfo::from_pem(&cert_pem)?;
        if !info.is_valid_at(Utc::now()) {
            debug!("Certificate {} expired at {}", self.cert.display(), info.not_after);
            return Ok(None);
        }

        Ok(Some(Credential {
            key_pem: Zeroizing::new(key_pem),
            csr_pem,
            cert_pem,
            expires_at: info.not_after,
        }))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TenantError::storage(format!(
            "cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}
