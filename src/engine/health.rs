//! Health checks reported by `herdux doctor`

use std::fmt;

use futures::future::BoxFuture;
use serde::Serialize;

use super::ConnectionOptions;
use crate::process::{binary_exists, binary_version, CommandRunner};

/// Severity of one check's outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
}

impl HealthCheckResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self { status: HealthStatus::Success, message: message.into() }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self { status: HealthStatus::Warn, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: HealthStatus::Error, message: message.into() }
    }
}

type CheckFn = Box<dyn Fn(ConnectionOptions) -> BoxFuture<'static, HealthCheckResult> + Send + Sync>;

/// A named diagnostic, evaluated lazily against the resolved connection
pub struct HealthCheck {
    pub name: String,
    /// Shown while the check runs
    pub pending_message: String,
    run: CheckFn,
}

impl HealthCheck {
    pub fn new<F>(name: impl Into<String>, pending_message: impl Into<String>, run: F) -> Self
    where
        F: Fn(ConnectionOptions) -> BoxFuture<'static, HealthCheckResult> + Send + Sync + 'static,
    {
        Self { name: name.into(), pending_message: pending_message.into(), run: Box::new(run) }
    }

    pub async fn run(&self, opts: &ConnectionOptions) -> HealthCheckResult {
        (self.run)(opts.clone()).await
    }
}

impl fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheck").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Worst status across a set of results, `Success` when empty
#[must_use]
pub fn overall_status(results: &[HealthCheckResult]) -> HealthStatus {
    results.iter().map(|r| r.status).max().unwrap_or(HealthStatus::Success)
}

/// Check that `binary` is installed
///
/// A missing binary reports `missing_status` followed by `guidance`.
pub(crate) fn binary_check(
    runner: std::sync::Arc<dyn CommandRunner>,
    label: &str,
    binary: &'static str,
    missing_status: HealthStatus,
    guidance: &'static str,
) -> HealthCheck {
    HealthCheck::new(label, format!("Checking {binary}..."), move |_opts| {
        let runner = runner.clone();
        Box::pin(async move {
            if !binary_exists(runner.as_ref(), binary).await {
                let message = format!("{binary} is missing. {guidance}");
                return HealthCheckResult { status: missing_status, message };
            }
            match binary_version(runner.as_ref(), binary).await {
                Some(version) => HealthCheckResult::success(format!("{binary} is installed: {version}")),
                None => HealthCheckResult::success(format!("{binary} is installed")),
            }
        })
    })
}
