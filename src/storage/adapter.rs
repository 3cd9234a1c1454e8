use std::{
    fs::{self, File},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs4::fs_std::FileExt;
use tracing::debug;

/// Minimal file surface the engine is built on. There is no append operation:
/// appends are done by reading the whole file and writing it back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileAdapter: Send + Sync + 'static {
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Creates a directory together with missing parents.
    async fn mkdir(&self, path: &Path) -> Result<()>;

    /// Reads the whole file. Fails if the file is missing.
    async fn read(&self, path: &Path) -> Result<String>;

    /// Creates or overwrites the file with `content`.
    async fn write(&self, path: &Path, content: &str) -> Result<()>;

    /// Names of the files inside `path`. A missing directory has no files.
    async fn list(&self, path: &Path) -> Result<Vec<String>>;
}

/// [FileAdapter] over the local file system. Reads hold a shared lock and writes an exclusive
/// one, so a reader never sees a half written file. Locks block, which is why all work runs on
/// the blocking pool.
pub struct LocalFileAdapter;

impl LocalFileAdapter {
    /// Invalid utf-8 (a write torn inside a multi-byte character) is replaced instead of failing
    /// the whole file, so only the affected line is lost.
    fn read_locked(path: &Path) -> std::io::Result<String> {
        let mut file = File::open(path)?;
        file.lock_shared()?;
        let mut content = Vec::new();
        let result = file.read_to_end(&mut content);
        FileExt::unlock(&file)?;
        result.map(|_| String::from_utf8_lossy(&content).into_owned())
    }

    fn write_locked(path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        let result = file
            .set_len(0)
            .and_then(|_| file.write_all(content.as_bytes()))
            .and_then(|_| file.flush());
        FileExt::unlock(&file)?;
        result
    }

    fn list_files(path: &Path) -> std::io::Result<Vec<String>> {
        let entries = match fs::read_dir(path) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e),
        };
        let mut names = vec![];
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names)
    }
}

async fn blocking<T: Send + 'static>(
    path: &Path,
    operation: fn(&Path) -> std::io::Result<T>,
) -> std::io::Result<T> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || operation(&path)).await?
}

#[async_trait]
impl FileAdapter for LocalFileAdapter {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        debug!("Creating directory {path:?}");
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory {path:?}"))
    }

    async fn read(&self, path: &Path) -> Result<String> {
        Ok(blocking(path, Self::read_locked).await?)
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        let path: PathBuf = path.to_path_buf();
        let content = content.to_string();
        tokio::task::spawn_blocking(move || Self::write_locked(&path, &content))
            .await?
            .context("Failed to write file")
    }

    async fn list(&self, path: &Path) -> Result<Vec<String>> {
        Ok(blocking(path, Self::list_files).await?)
    }
}
