use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Folder holding signed lease PDFs
pub const LEASE_FOLDER: &str = "leases";
/// Folder holding rendered payment receipts
pub const RECEIPT_FOLDER: &str = "payments";

/// DocumentStore keeps uploaded and generated files on local disk under
/// `<root>/<folder>/<name>`. Names are generated server-side; user-supplied
/// file names are only kept as metadata.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, folder: &str, name: &str) -> Result<PathBuf> {
        let safe = |s: &str| {
            !s.is_empty()
                && !s.starts_with('.')
                && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !safe(folder) || !safe(name) {
            bail!("invalid document path {}/{}", folder, name);
        }
        Ok(self.root.join(folder).join(name))
    }

    /// Stored file name for a document uuid
    pub fn file_name(uuid: &str, extension: &str) -> String {
        format!("{}.{}", uuid, extension.trim_start_matches('.'))
    }

    /// Store bytes under a fresh uuid and return that uuid
    pub async fn put(&self, folder: &str, extension: &str, bytes: &[u8]) -> Result<String> {
        let uuid = uuid::Uuid::new_v4().to_string();
        self.write(folder, &Self::file_name(&uuid, extension), bytes).await?;
        Ok(uuid)
    }

    pub async fn write(&self, folder: &str, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(folder, name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Open a stored file for streaming; `None` when it is missing
    pub async fn open(&self, folder: &str, name: &str) -> Result<Option<tokio::fs::File>> {
        let path = self.path(folder, name)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to open {}", path.display())),
        }
    }

    pub async fn read(&self, folder: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(folder, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Delete a stored file; a missing file is not an error
    pub async fn remove(&self, folder: &str, name: &str) -> Result<()> {
        let path = self.path(folder, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}
