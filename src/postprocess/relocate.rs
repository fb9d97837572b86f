//! Moving artifacts into the output directory

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("{} is missing and was not found in the output directory", .0.display())]
    Missing(PathBuf),

    #[error("{} has no file name", .0.display())]
    NoFileName(PathBuf),

    #[error("{} already exists, leaving {} in place", .destination.display(), .artifact.display())]
    Collision {
        artifact: PathBuf,
        destination: PathBuf,
    },

    #[error("{op} failed for {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RelocateError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        RelocateError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    Moved(PathBuf),
    /// The source is gone and its destination already exists: an earlier run moved it
    AlreadyRelocated(PathBuf),
}

impl Relocation {
    pub fn destination(&self) -> &Path {
        match self {
            Relocation::Moved(path) | Relocation::AlreadyRelocated(path) => path,
        }
    }
}

/// Move `source` into `output_dir`, keeping its file name.
///
/// Safe to repeat: a second call for an already moved file reports
/// [`Relocation::AlreadyRelocated`] instead of failing. An existing file at the destination is
/// never overwritten; the source stays where it is and [`RelocateError::Collision`] is returned.
pub async fn relocate(source: &Path, output_dir: &Path) -> Result<Relocation, RelocateError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| RelocateError::NoFileName(source.to_path_buf()))?;
    let destination = output_dir.join(file_name);

    if !exists(source).await {
        if exists(&destination).await {
            debug!(path = %destination.display(), "Already relocated");
            return Ok(Relocation::AlreadyRelocated(destination));
        }
        return Err(RelocateError::Missing(source.to_path_buf()));
    }
    if exists(&destination).await {
        return Err(RelocateError::Collision {
            artifact: source.to_path_buf(),
            destination,
        });
    }

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| RelocateError::io("relocate.create_dir", output_dir, e))?;

    if tokio::fs::rename(source, &destination).await.is_err() {
        // Cross-device moves cannot rename
        tokio::fs::copy(source, &destination)
            .await
            .map_err(|e| RelocateError::io("relocate.copy", &destination, e))?;
        tokio::fs::remove_file(source)
            .await
            .map_err(|e| RelocateError::io("relocate.cleanup", source, e))?;
    }

    debug!(from = %source.display(), to = %destination.display(), "Relocated");
    Ok(Relocation::Moved(destination))
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_moves_file() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = staging.path().join("show").join("ep1.mkv");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"video").unwrap();

        let relocation = relocate(&source, output.path()).await.unwrap();

        let expected = output.path().join("ep1.mkv");
        assert_eq!(relocation, Relocation::Moved(expected.clone()));
        assert!(!source.exists());
        assert_eq!(std::fs::read(&expected).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_second_relocation_is_noop() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = staging.path().join("ep1.mkv");
        std::fs::write(&source, b"video").unwrap();

        relocate(&source, output.path()).await.unwrap();
        let again = relocate(&source, output.path()).await.unwrap();

        assert_eq!(
            again,
            Relocation::AlreadyRelocated(output.path().join("ep1.mkv"))
        );
        assert_eq!(again.destination(), output.path().join("ep1.mkv"));
    }

    #[tokio::test]
    async fn test_creates_output_dir() {
        let staging = TempDir::new().unwrap();
        let output = staging.path().join("nested").join("completed");
        let source = staging.path().join("ep1.srt");
        std::fs::write(&source, b"1\n00:00:01,000 --> 00:00:02,000\nhi\n").unwrap();

        relocate(&source, &output).await.unwrap();
        assert!(output.join("ep1.srt").exists());
    }

    #[tokio::test]
    async fn test_same_name_from_another_folder_is_not_overwritten() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let first = staging.path().join("cd1").join("sample.mkv");
        let second = staging.path().join("cd2").join("sample.mkv");
        for (path, body) in [(&first, "FIRST-ARTIFACT"), (&second, "SECOND-ARTIFACT")] {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }

        relocate(&first, output.path()).await.unwrap();
        let err = relocate(&second, output.path()).await.unwrap_err();

        let destination = output.path().join("sample.mkv");
        assert!(matches!(
            err,
            RelocateError::Collision { ref artifact, destination: ref taken }
                if *artifact == second && *taken == destination
        ));
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "FIRST-ARTIFACT");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "SECOND-ARTIFACT");
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_error() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();

        let err = relocate(&staging.path().join("ghost.mkv"), output.path())
            .await
            .unwrap_err();
        assert!(matches!(err, RelocateError::Missing(_)));
    }
}
