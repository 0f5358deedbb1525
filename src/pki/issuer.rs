// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Certificate issuance through `certificates.k8s.io/v1` CertificateSigningRequests

use crate::config::IssuerSettings;
use crate::constants::csr;
use crate::error::{Result, TenantError};
use crate::kubernetes::objects::{self, CreateOutcome};
use crate::kubernetes::retry::{call, RetryPolicy};
use crate::pki::keys::{generate_csr, CertificateInfo};
use crate::pki::Credential;
use crate::types::tenant::Tenant;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestSpec,
};
use k8s_openapi::ByteString;
use kube::api::{ObjectMeta, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

const SECONDS_PER_DAY: i64 = 86_400;

pub struct CertificateIssuer {
    api: Api<CertificateSigningRequest>,
    settings: IssuerSettings,
    policy: RetryPolicy,
}

impl CertificateIssuer {
    pub fn new(client: Client, settings: IssuerSettings, policy: RetryPolicy) -> Self {
        Self {
            api: Api::all(client),
            settings,
            policy,
        }
    }

    /// Generate a key, have the cluster sign a client certificate for it and return both.
    ///
    /// Leaves the CSR object `<username>-csr` behind whatever the outcome;
    /// callers record it for teardown before calling.
    #[instrument(skip(self, tenant), fields(tenant = %tenant.username, role = %tenant.role))]
    pub async fn issue(&self, tenant: &Tenant) -> Result<Credential> {
        let generated = generate_csr(&tenant.username, tenant.role.as_str())?;
        let name = tenant.csr_name();

        // A submitted CSR cannot be changed, so a leftover request is replaced
        if objects::delete_if_exists(&self.api, &self.policy, &name).await? {
            debug!("Removed previous signing request {}", name);
        }

        let request = self.build_request(tenant, &generated.csr_pem);
        match objects::create(&self.api, &self.policy, &request).await? {
            CreateOutcome::Created(_) => info!("Submitted signing request {}", name),
            CreateOutcome::AlreadyExists => {
                return Err(TenantError::conflict(format!(
                    "signing request {} was recreated concurrently",
                    name
                )))
            }
        }

        self.approve(&name).await?;
        let cert_pem = self.wait_for_certificate(&name).await?;

        let info = CertificateInfo::from_pem(&cert_pem)?;
        if info.common_name != tenant.username {
            return Err(TenantError::pki(format!(
                "issued certificate is for '{}', expected '{}'",
                info.common_name, tenant.username
            )));
        }
        info!("Certificate for {} issued, valid until {}", tenant.username, info.not_after);

        Ok(Credential {
            key_pem: generated.key_pem,
            csr_pem: generated.csr_pem,
            cert_pem,
            expires_at: info.not_after,
        })
    }

    fn build_request(&self, tenant: &Tenant, csr_pem: &str) -> CertificateSigningRequest {
        let seconds = i64::from(tenant.validity_days) * SECONDS_PER_DAY;
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some(tenant.csr_name()),
                labels: Some(tenant.labels()),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                request: ByteString(csr_pem.as_bytes().to_vec()),
                signer_name: self.settings.signer_name.clone(),
                usages: Some(vec![csr::CLIENT_AUTH_USAGE.to_string()]),
                expiration_seconds: Some(i32::try_from(seconds).unwrap_or(i32::MAX)),
                ..Default::default()
            },
            status: None,
        }
    }

    async fn approve(&self, name: &str) -> Result<()> {
        let approval = json!({
            "status": {
                "conditions": [{
                    "type": "Approved",
                    "status": "True",
                    "reason": csr::APPROVAL_REASON,
                    "message": "Approved by tenantctl"
                }]
            }
        });
        let patch = Patch::Merge(&approval);
        let pp = PatchParams::default();
        let operation = format!("approve CertificateSigningRequest {}", name);

        match call(&self.policy, &operation, || {
            self.api.patch_subresource("approval", name, &pp, &patch)
        })
        .await
        {
            Ok(_) => {
                debug!("Approved signing request {}", name);
                Ok(())
            }
            Err(TenantError::KubeError(kube::Error::Api(resp))) if resp.code == 403 => {
                Err(TenantError::ApprovalDenied {
                    csr: name.to_string(),
                    reason: resp.message,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Poll with exponential backoff until the certificate shows up, the request is
    /// rejected, or the issuance deadline passes. Dropping the future stops polling.
    async fn wait_for_certificate(&self, name: &str) -> Result<String> {
        let deadline = self.settings.issuance_timeout;
        match timeout(deadline, self.poll_certificate(name)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No certificate for {} after {:?}", name, deadline);
                Err(TenantError::IssuanceTimeout {
                    csr: name.to_string(),
                    waited: deadline,
                })
            }
        }
    }

    async fn poll_certificate(&self, name: &str) -> Result<String> {
        let mut delay = self.settings.poll_initial;

        loop {
            let current = objects::get_opt(&self.api, &self.policy, name)
                .await?
                .ok_or_else(|| TenantError::NotFound(format!("signing request {}", name)))?;

            if let Some(status) = &current.status {
                let rejected = status
                    .conditions
                    .iter()
                    .flatten()
                    .find(|c| (c.type_ == "Denied" || c.type_ == "Failed") && c.status == "True");
                if let Some(condition) = rejected {
                    return Err(TenantError::ApprovalDenied {
                        csr: name.to_string(),
                        reason: condition
                            .message
                            .clone()
                            .or_else(|| condition.reason.clone())
                            .unwrap_or_else(|| condition.type_.clone()),
                    });
                }

                if let Some(cert) = status.certificate.as_ref().filter(|c| !c.0.is_empty()) {
                    return String::from_utf8(cert.0.clone()).map_err(|e| {
                        TenantError::pki(format!("issued certificate is not PEM text: {}", e))
                    });
                }
            }

            debug!("Certificate for {} not issued yet, checking again in {:?}", name, delay);
            sleep(delay).await;
            // Exponential backoff with max cap
            delay = (delay * 2).min(self.settings.poll_max);
        }
    }
}
