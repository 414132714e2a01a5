use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{check_name, Sink, SinkFuture};

/// Writes artifacts into a directory.
///
/// Each artifact is written to a temporary file in the same directory,
/// synced, then renamed into place.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    /// Create a sink rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        check_name(name)?;
        Ok(self.root.join(name))
    }

    async fn write_atomic(&self, name: &str, bytes: Vec<u8>) -> io::Result<()> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root).await?;

        // the temp name must not grow with the artifact name
        let temp_path = self
            .root
            .join(format!(".{}.part", uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        result?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "Wrote artifact");
        Ok(())
    }

    async fn append_existing(&self, name: &str, bytes: Vec<u8>) -> io::Result<u64> {
        let path = self.path_for(name)?;
        let mut file = fs::OpenOptions::new().append(true).open(&path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        let size = file.metadata().await?.len();

        tracing::debug!(path = %path.display(), appended = bytes.len(), size, "Appended to artifact");
        Ok(size)
    }
}

impl Sink for FsSink {
    fn write<'a>(&'a self, name: &'a str, bytes: Vec<u8>) -> SinkFuture<'a, ()> {
        Box::pin(self.write_atomic(name, bytes))
    }

    fn read<'a>(&'a self, name: &'a str) -> SinkFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = self.path_for(name)?;
            fs::read(path).await
        })
    }

    fn append<'a>(&'a self, name: &'a str, bytes: Vec<u8>) -> SinkFuture<'a, u64> {
        Box::pin(self.append_existing(name, bytes))
    }

    fn remove<'a>(&'a self, name: &'a str) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            let path = self.path_for(name)?;
            fs::remove_file(&path).await?;
            tracing::debug!(path = %path.display(), "Removed artifact");
            Ok(())
        })
    }
}
