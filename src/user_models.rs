use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

/// Metadata for one uploaded artifact. `filename` is the display name,
/// `path` the on-disk location under the upload directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub mimetype: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl StoredFile {
    pub fn new(
        user_id: String,
        filename: String,
        mimetype: String,
        path: PathBuf,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            filename,
            mimetype,
            path,
            size_bytes,
            uploaded_at: Utc::now(),
        }
    }

    /// Extension of the display filename including the leading dot, or an
    /// empty string for names without one (`notes`, `.bashrc`).
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(filename: &str) -> StoredFile {
        StoredFile::new(
            "u1".to_string(),
            filename.to_string(),
            "text/plain".to_string(),
            PathBuf::from("uploads/x"),
            0,
        )
    }

    #[test]
    fn extension_uses_last_dot() {
        assert_eq!(named("notes.txt").extension(), ".txt");
        assert_eq!(named("archive.tar.gz").extension(), ".gz");
    }

    #[test]
    fn extension_empty_without_dot_or_for_dotfiles() {
        assert_eq!(named("README").extension(), "");
        assert_eq!(named(".bashrc").extension(), "");
    }
}
