use anyhow::{Context, Result};
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};

const MAX_NAME_ATTEMPTS: i64 = 64;

/// Flat directory of uploaded artifacts, each named
/// `<unix-millis>-<display filename>`.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    /// Creates a new empty artifact for `filename`, bumping the timestamp
    /// prefix until an unused name is found.
    pub async fn create(&self, filename: &str) -> io::Result<(PathBuf, File)> {
        let now = Utc::now().timestamp_millis();
        for bump in 0..MAX_NAME_ATTEMPTS {
            let path = self.root.join(stored_name(now + bump, filename));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(no_free_name(filename))
    }

    /// Moves the artifact at `from` to a fresh storage name derived from
    /// `new_filename` and returns the new path. The target is claimed with a
    /// hard link, which fails instead of replacing an existing artifact.
    pub async fn rename(&self, from: &Path, new_filename: &str) -> io::Result<PathBuf> {
        let now = Utc::now().timestamp_millis();
        for bump in 0..MAX_NAME_ATTEMPTS {
            let target = self.root.join(stored_name(now + bump, new_filename));
            match fs::hard_link(from, &target).await {
                Ok(()) => {
                    unlink_source(from, &target).await?;
                    return Ok(target);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(no_free_name(new_filename))
    }

    /// Moves an artifact back to a path it previously occupied. Fails if
    /// something else took that path in the meantime.
    pub async fn restore(&self, current: &Path, original: &Path) -> io::Result<()> {
        fs::hard_link(current, original).await?;
        unlink_source(current, original).await
    }

    pub async fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    pub async fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path).await
    }
}

/// Drops the old name of a linked artifact. If that fails the new link is
/// removed again so the artifact keeps exactly one name.
async fn unlink_source(source: &Path, link: &Path) -> io::Result<()> {
    if let Err(e) = fs::remove_file(source).await {
        let _ = fs::remove_file(link).await;
        return Err(e);
    }
    Ok(())
}

fn no_free_name(filename: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free storage name for {}", filename),
    )
}

fn stored_name(millis: i64, filename: &str) -> String {
    format!("{}-{}", millis, filename)
}

/// Reduces a client-supplied filename to its last path component.
pub fn display_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("").trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn display_name_strips_directories() {
        assert_eq!(display_name("notes.txt").as_deref(), Some("notes.txt"));
        assert_eq!(display_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(display_name("C:\\docs\\a.pdf").as_deref(), Some("a.pdf"));
        assert_eq!(display_name(""), None);
        assert_eq!(display_name("dir/"), None);
        assert_eq!(display_name(".."), None);
    }

    #[tokio::test]
    async fn create_never_reuses_a_name() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path()).expect("store");

        let (a, _) = store.create("same.txt").await.expect("first");
        let (b, _) = store.create("same.txt").await.expect("second");
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_str().unwrap().ends_with("-same.txt"));
        assert_eq!(a.parent(), Some(dir.path()));
    }

    #[tokio::test]
    async fn rename_moves_content() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path()).expect("store");

        let (path, mut file) = store.create("a.txt").await.expect("create");
        file.write_all(b"hello").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let moved = store.rename(&path, "b.txt").await.expect("rename");
        assert!(!path.exists());
        assert!(moved.to_str().unwrap().ends_with("-b.txt"));
        assert_eq!(std::fs::read(&moved).unwrap(), b"hello");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_renames_to_one_name_never_collide() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(ArtifactStore::new(dir.path()).expect("store"));

        let mut sources = Vec::new();
        for i in 0..16 {
            let (path, mut file) = store.create("x.txt").await.expect("create");
            file.write_all(format!("owner {}", i).as_bytes()).await.unwrap();
            file.flush().await.unwrap();
            sources.push((i, path));
        }

        let tasks: Vec<_> = sources
            .into_iter()
            .map(|(i, path)| {
                let store = store.clone();
                tokio::spawn(async move { (i, store.rename(&path, "same.txt").await) })
            })
            .collect();

        let mut targets = HashSet::new();
        for task in tasks {
            let (i, moved) = task.await.expect("join");
            let moved = moved.expect("rename");
            assert_eq!(
                std::fs::read_to_string(&moved).unwrap(),
                format!("owner {}", i)
            );
            assert!(targets.insert(moved));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 16);
    }

    #[tokio::test]
    async fn restore_refuses_to_replace_an_existing_artifact() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path()).expect("store");

        let (original, _) = store.create("a.txt").await.expect("create");
        let moved = store.rename(&original, "b.txt").await.expect("rename");
        std::fs::write(&original, b"someone else").unwrap();

        let err = store.restore(&moved, &original).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(moved.exists());
        assert_eq!(std::fs::read(&original).unwrap(), b"someone else");
    }

    #[tokio::test]
    async fn rename_of_missing_artifact_fails() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path()).expect("store");

        let err = store
            .rename(&dir.path().join("ghost.txt"), "b.txt")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
