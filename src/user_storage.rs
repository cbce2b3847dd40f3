use crate::user_models::{StoredFile, User};
use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const USERS_FILE: &str = "users.json";
const FILES_FILE: &str = "files.json";

/// JSON-file backed user and file tables. Every mutation rewrites the
/// affected table while its write lock is held, and the in-memory table only
/// changes once that write succeeded.
pub struct MetadataStore {
    users_path: PathBuf,
    files_path: PathBuf,
    users: RwLock<Vec<User>>,
    files: RwLock<Vec<StoredFile>>,
}

impl MetadataStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let users_path = data_dir.join(USERS_FILE);
        let files_path = data_dir.join(FILES_FILE);
        let users = load_table(&users_path).context("Failed to load users table")?;
        let files = load_table(&files_path).context("Failed to load files table")?;

        Ok(Self {
            users_path,
            files_path,
            users: RwLock::new(users),
            files: RwLock::new(files),
        })
    }

    /// Inserts the user unless the email is already registered, in which
    /// case `None` is returned and nothing is written.
    pub async fn create_user(&self, user: User) -> Result<Option<User>> {
        let mut users = self.users.write().await;

        if users.iter().any(|u| u.email == user.email) {
            return Ok(None);
        }

        commit(&self.users_path, &mut *users, |rows| rows.push(user.clone()))
            .context("Failed to write users table")?;
        Ok(Some(user))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == user_id).cloned())
    }

    pub async fn add_file(&self, file: StoredFile) -> Result<StoredFile> {
        let mut files = self.files.write().await;
        commit(&self.files_path, &mut *files, |rows| rows.push(file.clone()))
            .context("Failed to write files table")?;
        Ok(file)
    }

    /// Files owned by `user_id`, in insertion order.
    pub async fn get_user_files(&self, user_id: &str) -> Result<Vec<StoredFile>> {
        let files = self.files.read().await;
        Ok(files.iter().filter(|f| f.user_id == user_id).cloned().collect())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<Option<StoredFile>> {
        let files = self.files.read().await;
        Ok(files.iter().find(|f| f.id == file_id).cloned())
    }

    pub async fn update_file_location(
        &self,
        file_id: &str,
        filename: String,
        path: PathBuf,
    ) -> Result<Option<StoredFile>> {
        let mut files = self.files.write().await;

        let Some(index) = files.iter().position(|f| f.id == file_id) else {
            return Ok(None);
        };
        let mut updated = files[index].clone();
        updated.filename = filename;
        updated.path = path;

        commit(&self.files_path, &mut *files, |rows| rows[index] = updated.clone())
            .context("Failed to write files table")?;
        Ok(Some(updated))
    }

    /// Returns whether a record was removed.
    pub async fn remove_file(&self, file_id: &str) -> Result<bool> {
        let mut files = self.files.write().await;
        if !files.iter().any(|f| f.id == file_id) {
            return Ok(false);
        }

        commit(&self.files_path, &mut *files, |rows| rows.retain(|f| f.id != file_id))
            .context("Failed to write files table")?;
        Ok(true)
    }
}

fn load_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Applies `change` to a copy of `rows`, persists the copy and only then
/// swaps it in.
fn commit<T: Serialize + Clone>(
    path: &Path,
    rows: &mut Vec<T>,
    change: impl FnOnce(&mut Vec<T>),
) -> Result<()> {
    let mut next = rows.clone();
    change(&mut next);
    save_table(path, &next)?;
    *rows = next;
    Ok(())
}

fn save_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let json = serde_json::to_string_pretty(rows).context("Failed to serialize table")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
