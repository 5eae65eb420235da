//! Owner-only scratch directories.

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::HarnessError;

/// Creates `path` and any missing parents with mode `0700` on unix.
///
/// An existing directory is left as-is.
pub async fn create_scratch_dir(path: &Path) -> Result<(), HarnessError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);

    builder
        .create(path)
        .await
        .map_err(|e| HarnessError::Filesystem {
            op: "create",
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    debug!(path = %path.display(), "scratch directory created");
    Ok(())
}

/// Recursively removes `path`. A directory that is already gone counts as removed.
pub async fn remove_scratch_dir(path: &Path) -> Result<(), HarnessError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "scratch directory removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HarnessError::Filesystem {
            op: "remove",
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_remove() {
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("scratch");

        create_scratch_dir(&scratch).await.unwrap();
        assert!(scratch.is_dir());

        tokio::fs::write(scratch.join("job.hcl"), "job {}").await.unwrap();
        tokio::fs::create_dir(scratch.join("nested")).await.unwrap();

        remove_scratch_dir(&scratch).await.unwrap();
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn create_is_recursive_and_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("a").join("b");

        create_scratch_dir(&scratch).await.unwrap();
        create_scratch_dir(&scratch).await.unwrap();
        assert!(scratch.is_dir());
    }

    #[tokio::test]
    async fn remove_missing_directory_is_ok() {
        let root = tempfile::tempdir().unwrap();
        remove_scratch_dir(&root.path().join("never-created"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_under_a_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("plain-file");
        tokio::fs::write(&file, "x").await.unwrap();

        let err = create_scratch_dir(&file.join("scratch")).await.unwrap_err();
        assert!(matches!(err, HarnessError::Filesystem { op: "create", .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scratch_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("scratch");
        create_scratch_dir(&scratch).await.unwrap();

        let mode = std::fs::metadata(&scratch).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "group/other bits must be clear");
    }
}
