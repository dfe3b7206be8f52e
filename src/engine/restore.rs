//! Steps shared by every engine's restore
//!
//! Restore always targets a database that exists: the target is probe-created
//! first, and "already exists" is the expected answer on a repeat restore.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{ConnectionOptions, DatabaseEngine, RestoreOutcome, RestoreStatus};
use crate::error::{HerduxError, Result};

/// Absolute path of an existing backup file
pub(crate) fn locate_backup_file(file: &Path) -> Result<PathBuf> {
    if !file.is_file() {
        return Err(HerduxError::BackupFileNotFound(file.to_path_buf()));
    }
    file.canonicalize().map_err(|_| HerduxError::BackupFileNotFound(file.to_path_buf()))
}

/// Create `db_name` unless it already exists
///
/// Returns whether the database was created. Any failure other than
/// "already exists" aborts the restore.
pub(crate) async fn ensure_database<E>(engine: &E, db_name: &str, opts: &ConnectionOptions) -> Result<bool>
where
    E: DatabaseEngine,
{
    match engine.create_database(db_name, opts).await {
        Ok(()) => {
            info!(database = db_name, "created restore target");
            Ok(true)
        }
        Err(HerduxError::DatabaseExists(_)) => {
            debug!(database = db_name, "restore target already exists");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Turn a classified exit status into the restore result
pub(crate) fn finish_restore(status: RestoreStatus) -> Result<RestoreOutcome> {
    match status {
        RestoreStatus::Success => Ok(RestoreOutcome::Restored),
        RestoreStatus::SuccessWithWarnings(warnings) => {
            warn!("restore completed with warnings");
            Ok(RestoreOutcome::RestoredWithWarnings { warnings })
        }
        RestoreStatus::Failure(detail) => Err(HerduxError::restore_failed(detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_backup_file() {
        let err = locate_backup_file(Path::new("/nonexistent/herdux/shop.dump")).unwrap_err();
        assert!(matches!(err, HerduxError::BackupFileNotFound(_)));
    }

    #[test]
    fn test_directory_is_not_a_backup_file() {
        let err = locate_backup_file(&std::env::temp_dir()).unwrap_err();
        assert!(matches!(err, HerduxError::BackupFileNotFound(_)));
    }

    #[test]
    fn test_finish_restore() {
        assert_eq!(finish_restore(RestoreStatus::Success).unwrap(), RestoreOutcome::Restored);
        assert_eq!(
            finish_restore(RestoreStatus::SuccessWithWarnings("skipped ACL".into())).unwrap(),
            RestoreOutcome::RestoredWithWarnings { warnings: "skipped ACL".into() }
        );
        assert!(matches!(
            finish_restore(RestoreStatus::Failure("boom".into())),
            Err(HerduxError::RestoreFailed(m)) if m == "boom"
        ));
    }
}
