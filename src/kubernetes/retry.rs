// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry with exponential backoff for cluster API calls

use crate::error::{Result, TenantError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

/// Per-request timeout and retry bounds for transient API failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one; 0 is treated as 1
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

/// Whether a failed request is worth repeating
fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(resp) => resp.code == 429 || resp.code >= 500,
        kube::Error::HyperError(_) | kube::Error::Service(_) => true,
        _ => false,
    }
}

/// Run a cluster API call under the policy's timeout, retrying transient failures.
///
/// Permanent API errors are returned as-is; exhausting the attempts on transient
/// failures yields `ClusterUnavailable`.
pub async fn call<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut request: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, kube::Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let reason = match timeout(policy.request_timeout, request()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !is_transient(&e) => return Err(TenantError::KubeError(e)),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("request timed out after {:?}", policy.request_timeout),
        };

        if attempt >= max_attempts {
            error!(operation, attempt, "Giving up on cluster API call: {}", reason);
            return Err(TenantError::ClusterUnavailable {
                operation: operation.to_string(),
                reason,
            });
        }

        warn!(
            operation,
            attempt,
            "Cluster API call failed: {}, retrying in {:?}",
            reason,
            delay
        );
        sleep(delay).await;

        // Exponential backoff with max cap
        delay = (delay * 2).min(policy.max_delay);
    }
}
