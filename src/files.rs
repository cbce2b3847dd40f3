//! Ownership-checked operations over file records and their artifacts.
//!
//! Rename and delete mutate the filesystem first and only touch the metadata
//! store once that succeeded. Nothing locks a record across both steps, so
//! concurrent rename/delete calls on the same id may interleave.

use crate::auth::Identity;
use crate::error::AppError;
use crate::storage::ArtifactStore;
use crate::user_models::StoredFile;
use crate::user_storage::MetadataStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tracing::{error, info};

/// An artifact already written to disk by the upload receiver.
#[derive(Debug, Clone)]
pub struct ReceivedArtifact {
    pub original_name: String,
    pub mimetype: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

pub struct Download {
    pub record: StoredFile,
    pub file: File,
}

pub struct FileManager {
    store: Arc<MetadataStore>,
    artifacts: Arc<ArtifactStore>,
}

impl FileManager {
    pub fn new(store: Arc<MetadataStore>, artifacts: Arc<ArtifactStore>) -> Self {
        Self { store, artifacts }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub async fn list(&self, user: &Identity) -> Result<Vec<StoredFile>, AppError> {
        Ok(self.store.get_user_files(&user.user_id).await?)
    }

    pub async fn upload(
        &self,
        user: &Identity,
        artifact: Option<ReceivedArtifact>,
    ) -> Result<StoredFile, AppError> {
        let artifact = artifact.ok_or(AppError::NoFileProvided)?;

        let record = StoredFile::new(
            user.user_id.clone(),
            artifact.original_name,
            artifact.mimetype,
            artifact.path,
            artifact.size_bytes,
        );
        let record = self.store.add_file(record).await?;

        info!(user_id = %user.user_id, file_id = %record.id, filename = %record.filename, "file uploaded");
        Ok(record)
    }

    /// Renames the display filename to `new_base` plus the current
    /// extension, moving the artifact on disk before the record changes.
    pub async fn rename(
        &self,
        user: &Identity,
        file_id: &str,
        new_base: &str,
    ) -> Result<StoredFile, AppError> {
        let file = self.owned(user, file_id).await?;
        let new_base = validate_base_name(new_base)?;
        let new_filename = format!("{}{}", new_base, file.extension());

        let new_path = self
            .artifacts
            .rename(&file.path, &new_filename)
            .await
            .map_err(AppError::Filesystem)?;

        match self
            .store
            .update_file_location(&file.id, new_filename, new_path.clone())
            .await
        {
            Ok(Some(updated)) => {
                info!(user_id = %user.user_id, file_id = %file.id, filename = %updated.filename, "file renamed");
                Ok(updated)
            }
            Ok(None) => {
                self.roll_back_move(&new_path, &file.path).await;
                Err(AppError::NotFound)
            }
            Err(e) => {
                self.roll_back_move(&new_path, &file.path).await;
                Err(AppError::Storage(e))
            }
        }
    }

    /// Deletes the artifact, then the record. A failed unlink leaves the
    /// record in place.
    pub async fn delete(&self, user: &Identity, file_id: &str) -> Result<(), AppError> {
        let file = self.owned(user, file_id).await?;

        self.artifacts
            .remove(&file.path)
            .await
            .map_err(AppError::Filesystem)?;
        self.store.remove_file(&file.id).await?;

        info!(user_id = %user.user_id, file_id = %file.id, "file deleted");
        Ok(())
    }

    pub async fn download(&self, user: &Identity, file_id: &str) -> Result<Download, AppError> {
        let record = self.owned(user, file_id).await?;
        let file = self
            .artifacts
            .open(&record.path)
            .await
            .map_err(AppError::Filesystem)?;
        Ok(Download { record, file })
    }

    async fn owned(&self, user: &Identity, file_id: &str) -> Result<StoredFile, AppError> {
        let file = self.store.get_file(file_id).await?.ok_or(AppError::NotFound)?;
        if file.user_id != user.user_id {
            return Err(AppError::Forbidden);
        }
        Ok(file)
    }

    async fn roll_back_move(&self, current: &Path, original: &Path) {
        if let Err(e) = self.artifacts.restore(current, original).await {
            error!(
                error = %e,
                current = %current.display(),
                original = %original.display(),
                "failed to move artifact back after metadata update failure"
            );
        }
    }
}

fn validate_base_name(raw: &str) -> Result<&str, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("new name cannot be empty".to_string()));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(AppError::InvalidInput(
            "new name must not contain path separators".to_string(),
        ));
    }
    Ok(name)
}
