use std::io;
use std::path::{Path, PathBuf};

/// Root under which every user owns one content directory named after the handle.
#[derive(Debug, Clone)]
pub struct ContentRoot {
    root: PathBuf,
}

impl ContentRoot {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, handle: &str) -> PathBuf {
        self.root.join(handle)
    }

    /// Recursive size of the user's directory; 0 if it does not exist.
    pub async fn usage_bytes(&self, handle: &str) -> io::Result<u64> {
        let dir = self.dir_for(handle);
        tokio::task::spawn_blocking(move || directory_size(&dir))
            .await
            .map_err(io::Error::other)?
    }

    /// Removes the user's directory tree. Returns `false` if it was already gone.
    pub async fn remove(&self, handle: &str) -> io::Result<bool> {
        match tokio::fs::remove_dir_all(self.dir_for(handle)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

fn directory_size(path: &Path) -> io::Result<u64> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += directory_size(&entry?.path())?;
    }
    Ok(total)
}
