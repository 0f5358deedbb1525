// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod resource;
pub mod tenant;

pub use resource::{ResourceKind, ResourceRef};
pub use tenant::{RoleClass, Tenant, TenantRequest};
