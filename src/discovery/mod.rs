//! Instance Discovery
//!
//! Finds live servers when no port is configured. Every candidate port is
//! probed concurrently; each probe carries its own short timeout, so the scan
//! takes as long as the slowest probe rather than the sum of all of them.
//!
//! The engine-specific part (which binary to run, how to read a version) is
//! the `probe` closure handed to [`scan`].

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::debug;

use crate::engine::DatabaseInstance;

/// Ceiling for the readiness check on each port
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Ceiling for the version query sent to a port that answered
pub const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Conventional `PostgreSQL` ports
pub const POSTGRES_PORTS: [u16; 9] = [5432, 5433, 5434, 5435, 5416, 5417, 5418, 5419, 5420];

/// Conventional `MySQL` ports
pub const MYSQL_PORTS: [u16; 5] = [3306, 3307, 3308, 3309, 3310];

/// Ports to scan: the configured list wins, the built-in list is the fallback
#[must_use]
pub fn candidate_ports(custom: &[u16], builtin: &[u16]) -> Vec<u16> {
    if custom.is_empty() {
        builtin.to_vec()
    } else {
        custom.to_vec()
    }
}

/// Probe every port concurrently and collect the answers
///
/// `probe` returns `None` for a port with nothing listening. The result is
/// sorted ascending by port, with duplicate ports removed.
pub async fn scan<F, Fut>(ports: &[u16], probe: F) -> Vec<DatabaseInstance>
where
    F: Fn(u16) -> Fut,
    Fut: Future<Output = Option<DatabaseInstance>>,
{
    let mut ports = ports.to_vec();
    ports.sort_unstable();
    ports.dedup();

    let answers = join_all(ports.into_iter().map(&probe)).await;

    let mut instances: Vec<DatabaseInstance> = answers.into_iter().flatten().collect();
    instances.sort_by_key(|i| i.port);
    instances.dedup_by_key(|i| i.port);

    for instance in &instances {
        debug!(port = instance.port, version = instance.version_label(), "server answered");
    }

    instances
}

/// Version guessed from the `54NN` convention (`PostgreSQL` 17 on 5417, ...)
#[must_use]
pub fn infer_postgres_version(port: u16) -> Option<String> {
    (5410..=5420)
        .contains(&port)
        .then(|| format!("PostgreSQL {} (inferred from port)", port - 5400))
}
