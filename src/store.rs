//! Temporary file store: on-disk lifetime of uploads and artifacts.
//!
//! Uploads get a fresh UUID v4 name in the uploads area, so any number of
//! concurrent jobs can share the directory without locking. The converter
//! names its artifact after the input's base name, which makes the output
//! path derivable from the upload alone ([`FileStore::output_path_for`]).
//!
//! Removal is best-effort by contract: [`FileStore::remove`] logs and
//! swallows failures instead of returning them.

use crate::error::ConvertError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// An upload persisted in the uploads area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Unique id; also the file name.
    pub id: Uuid,
    /// Full path of the stored bytes.
    pub path: PathBuf,
    /// Number of bytes written.
    pub len: u64,
}

impl StoredFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The two directories a job writes into.
#[derive(Debug, Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl FileStore {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persist `bytes` under a unique name in the uploads area.
    pub async fn store(&self, bytes: &[u8]) -> Result<StoredFile, ConvertError> {
        let (id, path) = self.fresh_upload_path().await?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ConvertError::Storage {
                path: path.clone(),
                source,
            })?;
        debug!(upload = %id, bytes = bytes.len(), "stored upload");
        Ok(StoredFile {
            id,
            path,
            len: bytes.len() as u64,
        })
    }

    /// Persist a chunk stream under a unique name without buffering it.
    ///
    /// A stream error or exceeding `max_bytes` removes the partial file and
    /// returns [`ConvertError::Validation`].
    pub async fn store_stream<S, E>(
        &self,
        stream: S,
        max_bytes: Option<usize>,
    ) -> Result<StoredFile, ConvertError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let (id, path) = self.fresh_upload_path().await?;
        let result = write_stream(&path, stream, max_bytes).await;
        match result {
            Ok(len) => {
                debug!(upload = %id, bytes = len, "stored upload");
                Ok(StoredFile { id, path, len })
            }
            Err(e) => {
                self.remove(&path).await;
                Err(e)
            }
        }
    }

    /// Where the converter will write the artifact for `input`.
    ///
    /// Same base name as the upload, extension `extension`, inside the
    /// converted-files area. The area is created if absent.
    pub async fn output_path_for(
        &self,
        input: &StoredFile,
        extension: &str,
    ) -> Result<PathBuf, ConvertError> {
        ensure_dir(&self.output_dir).await?;
        let stem = input
            .path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| input.id.to_string().into());
        let mut name = stem;
        name.push(".");
        name.push(extension);
        Ok(self.output_dir.join(name))
    }

    /// Best-effort delete. A missing file is not an error; anything else is
    /// logged and swallowed.
    pub async fn remove(&self, path: &Path) {
        remove_file_logged(path).await;
    }

    async fn fresh_upload_path(&self) -> Result<(Uuid, PathBuf), ConvertError> {
        ensure_dir(&self.upload_dir).await?;
        let id = Uuid::new_v4();
        Ok((id, self.upload_dir.join(id.to_string())))
    }
}

pub(crate) async fn remove_file_logged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "cleanup failed"),
    }
}

/// Synchronous twin of [`remove_file_logged`] for `Drop` paths.
pub(crate) fn remove_file_logged_blocking(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "cleanup failed"),
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), ConvertError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ConvertError::Storage {
            path: dir.to_path_buf(),
            source,
        })
}

async fn write_stream<S, E>(
    path: &Path,
    stream: S,
    max_bytes: Option<usize>,
) -> Result<u64, ConvertError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let storage_err = |source| ConvertError::Storage {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(storage_err)?;
    let mut written: usize = 0;

    futures::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| ConvertError::Validation(format!("Failed to read file chunk: {e}")))?;
        written += chunk.len();
        if let Some(max) = max_bytes {
            if written > max {
                return Err(ConvertError::Validation(format!(
                    "File too large: exceeds maximum of {max} bytes"
                )));
            }
        }
        file.write_all(&chunk).await.map_err(storage_err)?;
    }
    file.flush().await.map_err(storage_err)?;

    Ok(written as u64)
}
