// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tenant lifecycle: provisioning, credential rotation and teardown.
//!
//! Provisioning is not transactional. Every object or file is recorded in the
//! registry as soon as it exists, so a failed run leaves an exact inventory
//! for teardown or a retry.

pub mod credentials;
mod teardown;

use crate::config::Config;
use crate::constants::lock;
use crate::error::{Result, TenantError};
use crate::ingress::IngressConfigurator;
use crate::kubeconfig;
use crate::kubernetes::client::ClusterInfo;
use crate::kubernetes::namespaces::ensure_tenant_namespace;
use crate::pki::{CertificateIssuer, Credential};
use crate::rbac::apply_rbac;
use crate::registry::{Registry, TenantPhase, TenantRecord};
use crate::types::resource::{ResourceKind, ResourceRef};
use crate::types::tenant::{Tenant, TenantRequest};
use crate::storage::FileLock;
use credentials::CredentialFiles;
use kube::Client;
use std::time::Duration;
use tracing::{info, instrument};

pub struct Provisioner {
    client: Client,
    config: Config,
    cluster: ClusterInfo,
    registry: Registry,
}

impl Provisioner {
    pub fn new(client: Client, config: Config, cluster: ClusterInfo) -> Self {
        let registry = Registry::new(&config.state_dir);
        Self {
            client,
            config,
            cluster,
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn files(&self, username: &str) -> CredentialFiles {
        CredentialFiles::new(&self.config.state_dir, username)
    }

    /// Serialize runs on the same tenant, also across processes sharing the state directory
    async fn lock(&self, username: &str) -> Result<FileLock> {
        let path = self
            .config
            .state_dir
            .join("locks")
            .join(format!("{}.lock", username));
        FileLock::acquire(&path, Duration::from_secs(lock::WAIT_SECS)).await
    }

    fn track(&self, username: &str, resources: Vec<ResourceRef>) -> Result<()> {
        self.registry.record(username, resources).map(|_| ())
    }

    /// Create or converge everything a tenant needs and return its registry record.
    ///
    /// Safe to repeat: existing objects are reused or re-applied, and a Ready tenant
    /// with an unexpired certificate keeps it.
    #[instrument(skip(self, request), fields(tenant = %request.username, domain = %request.domain))]
    pub async fn provision(&self, request: TenantRequest) -> Result<TenantRecord> {
        let username = request.username.clone();
        let tenant = request
            .validate(&self.config)
            .map_err(|e| e.in_step("validate", &username))?;
        let step = |name: &'static str| {
            let username = username.clone();
            move |e: TenantError| e.in_step(name, &username)
        };

        // A run waiting here finds the other run's result and converges on it
        let _lock = self.lock(&tenant.username).await.map_err(step("lock"))?;
        self.registry
            .check_conflicts(&tenant)
            .map_err(step("check-registry"))?;

        let previous = self.registry.lookup(&tenant.username).map_err(step("check-registry"))?;
        let reusable_credential = previous
            .as_ref()
            .is_some_and(|r| r.phase == TenantPhase::Ready && r.role == tenant.role);
        let mut record = previous.unwrap_or_else(|| TenantRecord::new(&tenant));
        record.update_from(&tenant);
        self.registry.save(&record).map_err(step("record-tenant"))?;
        info!("Provisioning tenant {} in namespace {}", tenant.username, tenant.namespace);

        // Namespace
        let namespace = ensure_tenant_namespace(&self.client, &self.config.api, &tenant)
            .await
            .map_err(step("create-namespace"))?;
        let mut record = self.registry.get(&tenant.username).map_err(step("record-tenant"))?;
        record.namespace_owned = namespace.owned;
        if namespace.owned {
            record.add_resources([ResourceRef::cluster(ResourceKind::Namespace, &namespace.name)]);
        }
        self.registry.save(&record).map_err(step("create-namespace"))?;

        // RBAC
        let rbac = apply_rbac(&self.client, &self.config.api, &tenant, namespace.uid.as_deref())
            .await
            .map_err(step("apply-rbac"))?;
        self.track(&tenant.username, rbac).map_err(step("apply-rbac"))?;

        // Credentials
        let files = self.files(&tenant.username);
        let existing = if reusable_credential {
            files.load_valid().map_err(step("issue-certificate"))?
        } else {
            None
        };
        let credential = match existing {
            Some(credential) => {
                info!("Keeping certificate valid until {}", credential.expires_at);
                credential
            }
            None => self.issue_and_store(&tenant, &files).await?,
        };

        // Ingress
        IngressConfigurator::new(
            self.client.clone(),
            self.config.ingress.clone(),
            self.config.api.clone(),
        )
        .configure(&tenant, |refs| self.track(&tenant.username, refs))
        .await
        .map_err(step("configure-ingress"))?;

        // Kubeconfig
        self.write_kubeconfig(&tenant, &credential, &files)?;

        let mut record = self.registry.get(&tenant.username).map_err(step("record-tenant"))?;
        record.cert_expiry = Some(credential.expires_at);
        record.phase = TenantPhase::Ready;
        self.registry.save(&record).map_err(step("record-tenant"))?;

        info!(
            "Tenant {} ready at https://{}, kubeconfig in {}",
            tenant.username,
            tenant.subdomain(),
            files.kubeconfig.display()
        );
        Ok(record)
    }

    /// Issue a fresh certificate and re-package the kubeconfig. Namespace, RBAC and
    /// ingress are left alone.
    #[instrument(skip(self))]
    pub async fn rotate_credentials(
        &self,
        username: &str,
        validity_days: Option<u32>,
    ) -> Result<TenantRecord> {
        let _lock = self
            .lock(username)
            .await
            .map_err(|e| e.in_step("lock", username))?;
        let mut record = self
            .registry
            .get(username)
            .map_err(|e| e.in_step("lookup", username))?;
        if record.phase != TenantPhase::Ready {
            return Err(TenantError::conflict(format!(
                "tenant {} has not finished provisioning, run provision again first",
                username
            ))
            .in_step("lookup", username));
        }

        let mut tenant = record.tenant();
        if let Some(days) = validity_days {
            tenant = TenantRequest {
                username: tenant.username.clone(),
                domain: tenant.domain.clone(),
                namespace: Some(tenant.namespace.clone()),
                role: tenant.role.to_string(),
                cert_secret: Some(tenant.cert_secret.clone()),
                validity_days: Some(days),
            }
            .validate(&self.config)
            .map_err(|e| e.in_step("validate", username))?;
        }

        let files = self.files(username);
        let credential = self.issue_and_store(&tenant, &files).await?;
        self.write_kubeconfig(&tenant, &credential, &files)?;

        record = self
            .registry
            .get(username)
            .map_err(|e| e.in_step("record-tenant", username))?;
        record.validity_days = tenant.validity_days;
        record.cert_expiry = Some(credential.expires_at);
        self.registry
            .save(&record)
            .map_err(|e| e.in_step("record-tenant", username))?;

        info!("Rotated credentials for {}, valid until {}", username, credential.expires_at);
        Ok(record)
    }

    async fn issue_and_store(&self, tenant: &Tenant, files: &CredentialFiles) -> Result<Credential> {
        let username = tenant.username.as_str();

        // Recorded before submission so a failed issuance still gets cleaned up
        self.track(
            username,
            vec![ResourceRef::cluster(
                ResourceKind::CertificateSigningRequest,
                &tenant.csr_name(),
            )],
        )
        .map_err(|e| e.in_step("issue-certificate", username))?;

        let issuer = CertificateIssuer::new(
            self.client.clone(),
            self.config.issuer.clone(),
            self.config.api.clone(),
        );
        let credential = issuer
            .issue(tenant)
            .await
            .map_err(|e| e.in_step("issue-certificate", username))?;

        let written = files
            .write_credential(&credential)
            .map_err(|e| e.in_step("write-credentials", username))?;
        self.track(username, written)
            .map_err(|e| e.in_step("write-credentials", username))?;
        Ok(credential)
    }

    fn write_kubeconfig(
        &self,
        tenant: &Tenant,
        credential: &Credential,
        files: &CredentialFiles,
    ) -> Result<()> {
        let username = tenant.username.as_str();
        let rendered = kubeconfig::package(tenant, credential, &self.cluster)
            .map_err(|e| e.in_step("package-kubeconfig", username))?;
        let written = files
            .write_kubeconfig(&rendered)
            .map_err(|e| e.in_step("package-kubeconfig", username))?;
        self.track(username, vec![written])
            .map_err(|e| e.in_step("package-kubeconfig", username))
    }
}
