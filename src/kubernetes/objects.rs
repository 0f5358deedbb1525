// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Get/create/apply/delete wrappers with retry, conflict and not-found handling

use crate::constants::FIELD_MANAGER;
use crate::error::{Result, TenantError};
use crate::kubernetes::retry::{call, RetryPolicy};
use kube::{
    api::{DeleteParams, Patch, PatchParams, PostParams},
    Api, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::debug;

/// Outcome of a create that tolerates an existing object
#[derive(Debug)]
pub enum CreateOutcome<K> {
    Created(K),
    AlreadyExists,
}

fn kind<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).to_string()
}

pub async fn get_opt<K>(api: &Api<K>, policy: &RetryPolicy, name: &str) -> Result<Option<K>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let operation = format!("get {} {}", kind::<K>(), name);
    call(policy, &operation, || api.get_opt(name)).await
}

/// Create an object; an HTTP 409 is reported as `AlreadyExists` instead of an error
pub async fn create<K>(api: &Api<K>, policy: &RetryPolicy, object: &K) -> Result<CreateOutcome<K>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = object.meta().name.clone().unwrap_or_default();
    let operation = format!("create {} {}", kind::<K>(), name);
    let pp = PostParams::default();

    match call(policy, &operation, || api.create(&pp, object)).await {
        Ok(created) => Ok(CreateOutcome::Created(created)),
        Err(TenantError::KubeError(kube::Error::Api(resp))) if resp.code == 409 => {
            debug!("{} {} already exists", kind::<K>(), name);
            Ok(CreateOutcome::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}

/// Server-side apply with force: the desired state always wins
pub async fn apply<K>(api: &Api<K>, policy: &RetryPolicy, object: &K) -> Result<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = object.meta().name.clone().ok_or_else(|| {
        TenantError::invalid_input(format!("{} to apply has no name", kind::<K>()))
    })?;
    let operation = format!("apply {} {}", kind::<K>(), name);
    let pp = PatchParams::apply(FIELD_MANAGER).force();
    let patch = Patch::Apply(object);

    call(policy, &operation, || api.patch(&name, &pp, &patch)).await
}

/// Delete an object, treating "not found" as success. Returns whether something was deleted.
pub async fn delete_if_exists<K>(api: &Api<K>, policy: &RetryPolicy, name: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let operation = format!("delete {} {}", kind::<K>(), name);
    let dp = DeleteParams::default();

    match call(policy, &operation, || api.delete(name, &dp)).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!("{} {} already gone", kind::<K>(), name);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
