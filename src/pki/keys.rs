// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Local key generation and certificate inspection. Private keys never leave this process
//! except through the tenant's own credential files.

use crate::error::{Result, TenantError};
use chrono::{DateTime, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};
use x509_parser::prelude::*;
use zeroize::Zeroizing;

/// A freshly generated key pair and the CSR it signed
pub struct KeyAndCsr {
    pub key_pem: Zeroizing<String>,
    pub csr_pem: String,
}

/// Generate an ECDSA P-256 key and a CSR with subject `CN=<username>, O=<group>`.
///
/// The API server maps CN to the user name and O to a group.
pub fn generate_csr(username: &str, group: &str) -> Result<KeyAndCsr> {
    let key_pair = KeyPair::generate()
        .map_err(|e| TenantError::pki(format!("failed to generate key for {}: {}", username, e)))?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(username.to_string()));
    dn.push(DnType::OrganizationName, DnValue::Utf8String(group.to_string()));
    params.distinguished_name = dn;

    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| TenantError::pki(format!("failed to create CSR: {}", e)))?;
    let csr_pem = csr
        .pem()
        .map_err(|e| TenantError::pki(format!("failed to serialize CSR: {}", e)))?;

    Ok(KeyAndCsr {
        key_pem: Zeroizing::new(key_pair.serialize_pem()),
        csr_pem,
    })
}

/// The parts of an issued certificate tenantctl cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub common_name: String,
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    pub fn from_pem(cert_pem: &str) -> Result<Self> {
        let parsed = ::pem::parse(cert_pem.as_bytes())
            .map_err(|e| TenantError::pki(format!("failed to parse PEM: {}", e)))?;
        let (_, cert) = X509Certificate::from_der(parsed.contents())
            .map_err(|e| TenantError::pki(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| TenantError::pki("certificate expiry out of range"))?;

        Ok(Self {
            common_name,
            not_after,
        })
    }

    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_after > at
    }
}
