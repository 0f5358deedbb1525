// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry-driven teardown

use super::Provisioner;
use crate::error::{Result, TenantError};
use crate::kubernetes::namespaces::delete_namespace;
use crate::kubernetes::objects;
use crate::storage;
use crate::types::resource::{teardown_sorted, ResourceKind, ResourceRef};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

impl Provisioner {
    /// Delete everything recorded for a tenant, then its record.
    ///
    /// Objects already gone count as deleted. When a deletion fails, the resources
    /// not yet deleted stay in the record and the error is returned. Returns false
    /// when the tenant was not registered at all.
    #[instrument(skip(self))]
    pub async fn deprovision(&self, username: &str) -> Result<bool> {
        let _lock = self
            .lock(username)
            .await
            .map_err(|e| e.in_step("lock", username))?;
        let Some(mut record) = self
            .registry
            .lookup(username)
            .map_err(|e| e.in_step("lookup", username))?
        else {
            warn!("Tenant {} is not registered, nothing to delete", username);
            return Ok(false);
        };

        info!(
            "Deprovisioning tenant {} ({} resources)",
            username,
            record.resources.len()
        );

        for resource in teardown_sorted(&record.resources) {
            let outcome = if resource.kind == ResourceKind::Namespace && !record.namespace_owned {
                debug!("Leaving namespace {} in place, tenantctl did not create it", resource.name);
                Ok(false)
            } else {
                self.delete_resource(&resource).await
            };

            match outcome {
                Ok(deleted) => {
                    if deleted {
                        info!("Deleted {}", resource);
                    }
                    record.resources.retain(|r| *r != resource);
                }
                Err(e) => {
                    self.registry
                        .save(&record)
                        .map_err(|e| e.in_step("deprovision", username))?;
                    return Err(e.in_step("deprovision", username));
                }
            }
        }

        let files = self.files(username);
        storage::remove_dir_if_empty(&files.dir);
        self.registry
            .remove(username)
            .map_err(|e| e.in_step("deprovision", username))?;

        info!("Tenant {} deprovisioned", username);
        Ok(true)
    }

    async fn delete_resource(&self, resource: &ResourceRef) -> Result<bool> {
        let policy = &self.config.api;
        match resource.kind {
            ResourceKind::Ingress => self.delete_namespaced::<Ingress>(resource).await,
            ResourceKind::Service => self.delete_namespaced::<Service>(resource).await,
            ResourceKind::Deployment => self.delete_namespaced::<Deployment>(resource).await,
            ResourceKind::Secret => self.delete_namespaced::<Secret>(resource).await,
            ResourceKind::RoleBinding => self.delete_namespaced::<RoleBinding>(resource).await,
            ResourceKind::Role => self.delete_namespaced::<Role>(resource).await,
            ResourceKind::Namespace => delete_namespace(&self.client, policy, &resource.name).await,
            ResourceKind::CertificateSigningRequest => {
                let api: Api<CertificateSigningRequest> = Api::all(self.client.clone());
                objects::delete_if_exists(&api, policy, &resource.name).await
            }
            ResourceKind::File => storage::remove_if_exists(Path::new(&resource.name)),
        }
    }

    async fn delete_namespaced<K>(&self, resource: &ResourceRef) -> Result<bool>
    where
        K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let namespace = resource.namespace.as_deref().ok_or_else(|| {
            TenantError::storage(format!("registry entry {} has no namespace", resource))
        })?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        objects::delete_if_exists(&api, &self.config.api, &resource.name).await
    }
}
