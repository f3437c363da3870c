use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// A download target that only appears under its final name once complete.
///
/// Bytes go to `<dest>.part`; `commit` renames it over `dest`. An interrupted
/// transfer leaves at most the `.part` file behind, never a truncated `dest`.
pub struct PartialFile {
    dest: PathBuf,
    partial: PathBuf,
    file: File,
    written: u64,
}

pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl PartialFile {
    pub async fn create(dest: &Path) -> Result<Self> {
        let partial = partial_path(dest);
        let file = File::create(&partial)
            .await
            .with_context(|| format!("creating {}", partial.display()))?;
        Ok(Self {
            dest: dest.to_path_buf(),
            partial,
            file,
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .with_context(|| format!("writing {}", self.partial.display()))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and move into place; returns bytes written.
    pub async fn commit(mut self) -> Result<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        let Self {
            dest,
            partial,
            file,
            written,
        } = self;
        drop(file);
        tokio::fs::rename(&partial, &dest)
            .await
            .with_context(|| format!("moving {} into place", dest.display()))?;
        Ok(written)
    }
}

/// Stream a response body into `dest` through a [`PartialFile`].
pub async fn download_to_file(mut response: reqwest::Response, dest: &Path) -> Result<u64> {
    let mut out = PartialFile::create(dest).await?;
    while let Some(chunk) = response.chunk().await? {
        out.write_chunk(&chunk).await?;
    }
    out.commit().await
}
