use crate::user_models::StoredFile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenameForm {
    #[serde(rename = "newName")]
    pub new_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
}

/// Public view of a file record; the on-disk path and owner stay server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: String,
    pub filename: String,
    pub mimetype: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl From<StoredFile> for FileSummary {
    fn from(f: StoredFile) -> Self {
        Self {
            id: f.id,
            filename: f.filename,
            mimetype: f.mimetype,
            size_bytes: f.size_bytes,
            uploaded_at: f.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub user: Option<String>,
    pub files: Vec<FileSummary>,
    pub message: Option<String>,
}
