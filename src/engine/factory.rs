//! Engine construction from a type tag

use std::sync::Arc;

use super::{DatabaseType, Engine, MySqlEngine, PostgresEngine, RestoreExitPolicy};
use crate::process::{CommandRunner, SystemRunner};

/// Everything an engine needs besides its type
#[derive(Clone)]
pub struct EngineContext {
    pub runner: Arc<dyn CommandRunner>,
    /// Ports probed instead of the engine's built-in list when non-empty
    pub scan_ports: Vec<u16>,
    /// Overrides the default fatal exit codes of the restore tool
    pub restore_fatal_exit_codes: Option<Vec<i32>>,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self { runner: Arc::new(SystemRunner), scan_ports: Vec::new(), restore_fatal_exit_codes: None }
    }
}

impl EngineContext {
    #[must_use]
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, ..Self::default() }
    }
}

/// Engine for `kind`, defaulting to `PostgreSQL`, backed by real subprocesses
#[must_use]
pub fn create_engine(kind: Option<DatabaseType>) -> Engine {
    create_engine_with(kind, &EngineContext::default())
}

/// Engine for `kind` with an explicit runner and scan/restore settings
#[must_use]
pub fn create_engine_with(kind: Option<DatabaseType>, ctx: &EngineContext) -> Engine {
    match kind.unwrap_or_default() {
        DatabaseType::Postgres => {
            let mut policy = RestoreExitPolicy::pg_restore();
            if let Some(codes) = &ctx.restore_fatal_exit_codes {
                policy = policy.with_fatal_codes(codes.clone());
            }
            Engine::Postgres(
                PostgresEngine::new(ctx.runner.clone())
                    .with_scan_ports(ctx.scan_ports.clone())
                    .with_restore_policy(policy),
            )
        }
        DatabaseType::MySQL => {
            Engine::MySql(MySqlEngine::new(ctx.runner.clone()).with_scan_ports(ctx.scan_ports.clone()))
        }
    }
}
