// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::config::Config;
use crate::constants::{labels, FIELD_MANAGER};
use crate::error::{Result, TenantError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const MAX_VALIDITY_DAYS: u32 = 3650;

/// Longest derived suffix is `-binding`; every derived name must stay a 63 char label
const MAX_USERNAME_LEN: usize = 63 - "-binding".len();

/// Permission class granted to a tenant inside its namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleClass {
    Admin,
    Edit,
    View,
    Developer,
}

impl RoleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleClass::Admin => "admin",
            RoleClass::Edit => "edit",
            RoleClass::View => "view",
            RoleClass::Developer => "developer",
        }
    }
}

impl FromStr for RoleClass {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(RoleClass::Admin),
            "edit" => Ok(RoleClass::Edit),
            "view" => Ok(RoleClass::View),
            "developer" => Ok(RoleClass::Developer),
            other => Err(TenantError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for RoleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated provisioning parameters as given on the command line
#[derive(Debug, Clone, Default)]
pub struct TenantRequest {
    pub username: String,
    pub domain: String,
    pub namespace: Option<String>,
    pub role: String,
    pub cert_secret: Option<String>,
    pub validity_days: Option<u32>,
}

impl TenantRequest {
    /// Validate the request, filling unset fields from the configuration
    pub fn validate(self, config: &Config) -> Result<Tenant> {
        validate_username(&self.username)?;
        validate_dns_subdomain("domain", &self.domain)?;

        let namespace = self.namespace.unwrap_or_else(|| self.username.clone());
        validate_dns_label("namespace", &namespace)?;

        let role: RoleClass = self.role.parse()?;

        let cert_secret = self
            .cert_secret
            .unwrap_or_else(|| config.ingress.cert_secret.clone());
        validate_dns_subdomain("cert secret", &cert_secret)?;

        let validity_days = self.validity_days.unwrap_or(config.issuer.validity_days);
        if validity_days == 0 || validity_days > MAX_VALIDITY_DAYS {
            return Err(TenantError::invalid_input(format!(
                "validity must be between 1 and {} days, got {}",
                MAX_VALIDITY_DAYS, validity_days
            )));
        }

        let tenant = Tenant {
            username: self.username,
            domain: self.domain,
            namespace,
            role,
            cert_secret,
            validity_days,
        };
        validate_dns_subdomain("subdomain", &tenant.subdomain())?;
        Ok(tenant)
    }
}

/// A validated tenant: one user, one namespace, one subdomain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub username: String,
    pub domain: String,
    pub namespace: String,
    pub role: RoleClass,
    pub cert_secret: String,
    pub validity_days: u32,
}

impl Tenant {
    /// Host the tenant's ingress is served on
    pub fn subdomain(&self) -> String {
        format!("{}.{}", self.username, self.domain)
    }

    pub fn binding_name(&self) -> String {
        format!("{}-binding", self.username)
    }

    pub fn csr_name(&self) -> String {
        format!("{}-csr", self.username)
    }

    /// Name shared by the tenant's deployment, service and ingress
    pub fn workload_name(&self) -> String {
        format!("{}-app", self.username)
    }

    /// Labels stamped on every object created for this tenant
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (labels::MANAGED_BY.to_string(), FIELD_MANAGER.to_string()),
            (labels::TENANT.to_string(), self.username.clone()),
        ])
    }
}

/// The username names the Service `<username>-app`, so it has to be a DNS-1035 label
/// (leading letter) short enough for every derived name
fn validate_username(username: &str) -> Result<()> {
    validate_dns_label("username", username)?;
    if !username.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(TenantError::invalid_input(format!(
            "username '{}' must start with a lowercase letter",
            username
        )));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(TenantError::invalid_input(format!(
            "username '{}' is longer than {} characters",
            username, MAX_USERNAME_LEN
        )));
    }
    Ok(())
}

/// RFC 1123 label: lowercase alphanumerics and '-', alphanumeric at both ends, at most 63 chars
pub fn validate_dns_label(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(TenantError::invalid_input(format!("{} must not be empty", what)));
    }
    if value.len() > 63 {
        return Err(TenantError::invalid_input(format!(
            "{} '{}' is longer than 63 characters",
            what, value
        )));
    }
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_ends = !value.starts_with('-') && !value.ends_with('-');
    if !valid_chars || !valid_ends {
        return Err(TenantError::invalid_input(format!(
            "{} '{}' must consist of lowercase alphanumerics or '-' and start and end with an alphanumeric",
            what, value
        )));
    }
    Ok(())
}

/// RFC 1123 subdomain: dot-separated labels, at most 253 chars
pub fn validate_dns_subdomain(what: &str, value: &str) -> Result<()> {
    if value.len() > 253 {
        return Err(TenantError::invalid_input(format!(
            "{} '{}' is longer than 253 characters",
            what, value
        )));
    }
    value
        .split('.')
        .try_for_each(|label| validate_dns_label(what, label))
        .map_err(|_| {
            TenantError::invalid_input(format!("{} '{}' is not a valid DNS name", what, value))
        })
}
