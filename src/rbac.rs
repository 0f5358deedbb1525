// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Role resolution and the tenant's RoleBinding

use crate::constants::{DEVELOPER_ROLE_NAME, RBAC_API_GROUP};
use crate::error::Result;
use crate::kubernetes::objects;
use crate::kubernetes::retry::RetryPolicy;
use crate::types::resource::{ResourceKind, ResourceRef};
use crate::types::tenant::{RoleClass, Tenant};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Api, Client, Resource};
use tracing::{info, instrument};

const DEVELOPER_VERBS: [&str; 7] = ["get", "list", "watch", "create", "update", "patch", "delete"];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// What a RoleBinding for the given role class points at
pub fn role_ref(role: RoleClass) -> RoleRef {
    match role {
        RoleClass::Developer => RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: DEVELOPER_ROLE_NAME.to_string(),
        },
        builtin => RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: builtin.as_str().to_string(),
        },
    }
}

/// Namespace as controlling owner, so the drift reconciler sees changes to owned objects
fn namespace_owner(namespace: &str, uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: Namespace::api_version(&()).to_string(),
        kind: Namespace::kind(&()).to_string(),
        name: namespace.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: None,
    }
}

fn metadata(tenant: &Tenant, name: &str, namespace_uid: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(tenant.namespace.clone()),
        labels: Some(tenant.labels()),
        owner_references: namespace_uid.map(|uid| vec![namespace_owner(&tenant.namespace, uid)]),
        ..Default::default()
    }
}

/// Namespaced Role for the developer class: workloads and their logs, no cluster-scoped access
pub fn developer_role(tenant: &Tenant, namespace_uid: Option<&str>) -> Role {
    let verbs = strings(&DEVELOPER_VERBS);
    let rule = |group: &str, resources: &[&str]| PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(strings(resources)),
        verbs: verbs.clone(),
        ..Default::default()
    };

    Role {
        metadata: metadata(tenant, DEVELOPER_ROLE_NAME, namespace_uid),
        rules: Some(vec![
            rule("", &["pods", "pods/log"]),
            rule("apps", &["deployments"]),
            rule("batch", &["jobs"]),
            rule("networking.k8s.io", &["ingresses"]),
        ]),
    }
}

/// Binds the tenant's certificate identity to its role inside the tenant namespace
pub fn role_binding(tenant: &Tenant, namespace_uid: Option<&str>) -> RoleBinding {
    RoleBinding {
        metadata: metadata(tenant, &tenant.binding_name(), namespace_uid),
        role_ref: role_ref(tenant.role),
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "User".to_string(),
            name: tenant.username.clone(),
            namespace: None,
        }]),
    }
}

/// Apply the tenant's Role (developer only) and RoleBinding, returning what now exists.
///
/// A binding whose roleRef points elsewhere is deleted first, as roleRef cannot be changed in place.
#[instrument(skip(client, policy, tenant), fields(tenant = %tenant.username, role = %tenant.role))]
pub async fn apply_rbac(
    client: &Client,
    policy: &RetryPolicy,
    tenant: &Tenant,
    namespace_uid: Option<&str>,
) -> Result<Vec<ResourceRef>> {
    let mut applied = Vec::new();

    if tenant.role == RoleClass::Developer {
        let roles: Api<Role> = Api::namespaced(client.clone(), &tenant.namespace);
        objects::apply(&roles, policy, &developer_role(tenant, namespace_uid)).await?;
        applied.push(ResourceRef::namespaced(
            ResourceKind::Role,
            &tenant.namespace,
            DEVELOPER_ROLE_NAME,
        ));
    }

    let bindings: Api<RoleBinding> = Api::namespaced(client.clone(), &tenant.namespace);
    let desired = role_binding(tenant, namespace_uid);
    let name = tenant.binding_name();

    if let Some(existing) = objects::get_opt(&bindings, policy, &name).await? {
        if existing.role_ref != desired.role_ref {
            info!(
                "RoleBinding {} points at {} {}, recreating",
                name, existing.role_ref.kind, existing.role_ref.name
            );
            objects::delete_if_exists(&bindings, policy, &name).await?;
        }
    }
    objects::apply(&bindings, policy, &desired).await?;
    applied.push(ResourceRef::namespaced(
        ResourceKind::RoleBinding,
        &tenant.namespace,
        &name,
    ));

    info!(
        "RoleBinding {} grants {} {} to {}",
        name, desired.role_ref.kind, desired.role_ref.name, tenant.username
    );
    Ok(applied)
}
