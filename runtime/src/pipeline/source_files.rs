use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

use super::types::Document;

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Clone)]
pub struct FsFileRepository;

#[async_trait]
impl FileRepository for FsFileRepository {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read file {}", path.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Where the raw bytes of an uploaded document come from.
#[async_trait]
pub trait SourceFiles: Send + Sync {
    async fn fetch(&self, document: &Document) -> Result<Vec<u8>>;

    /// Documents with equal keys share one fetch within a run.
    fn cache_key(&self, document: &Document) -> String {
        document
            .source_handle
            .clone()
            .unwrap_or_else(|| format!("{}/{}", document.project_id, document.filename))
    }
}

/// Uploaded PDFs stored as `<uploads_dir>/<projectId>/<filename>`.
#[derive(Clone)]
pub struct UploadsDirectory {
    base_dir: PathBuf,
    file_repo: Arc<dyn FileRepository>,
}

impl UploadsDirectory {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self::with_repository(base_dir, Arc::new(FsFileRepository))
    }

    pub fn with_repository<P: AsRef<Path>>(base_dir: P, file_repo: Arc<dyn FileRepository>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            file_repo,
        }
    }

    /// Only the final path component of the stored filename is used.
    pub fn path_for(&self, document: &Document) -> Result<PathBuf> {
        let filename = Path::new(&document.filename)
            .file_name()
            .ok_or_else(|| anyhow!("invalid filename \"{}\"", document.filename))?;
        Ok(self.base_dir.join(&document.project_id).join(filename))
    }
}

#[async_trait]
impl SourceFiles for UploadsDirectory {
    async fn fetch(&self, document: &Document) -> Result<Vec<u8>> {
        let path = self.path_for(document)?;
        if !self.file_repo.exists(&path) {
            return Err(anyhow!("Missing local file for {}", document.filename));
        }
        let bytes = self.file_repo.read(&path).await?;
        if bytes.is_empty() {
            return Err(anyhow!("file {} is empty", document.filename));
        }
        Ok(bytes)
    }

    fn cache_key(&self, document: &Document) -> String {
        self.path_for(document)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|_| document.filename.clone())
    }
}
