// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Client certificates for tenants, signed by the cluster through the certificates API

pub mod issuer;
pub mod keys;

use chrono::{DateTime, Utc};
use std::fmt;
use zeroize::Zeroizing;

pub use issuer::CertificateIssuer;
pub use keys::CertificateInfo;

/// Key, request and signed certificate for one tenant
#[derive(Clone)]
pub struct Credential {
    pub key_pem: Zeroizing<String>,
    pub csr_pem: String,
    pub cert_pem: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key_pem", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
