use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Named blobs inside one backing directory.
pub trait StorageManager: Send + Sync {
    /// Replace `ident` atomically. With `durable`, returns only after the
    /// data and the rename have reached stable storage.
    fn write(&self, ident: &str, data: &[u8], durable: bool) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
}

#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(storage_dir)?;
        Ok(BackendLocal {
            base_dir: storage_dir.to_path_buf(),
        })
    }

    fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> std::io::Result<()> {
        File::open(&self.base_dir)?.sync_all()
    }

    // directories cannot be opened for syncing on Windows
    #[cfg(not(unix))]
    fn sync_dir(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    fn write(&self, ident: &str, data: &[u8], durable: bool) -> std::io::Result<()> {
        let path = self.path(ident);
        let temp_path = self
            .base_dir
            .join(format!(".{}-{ident}.tmp", rusty_ulid::generate_ulid_string()));

        let result = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            if durable {
                file.sync_all()?;
            }
            std::fs::rename(&temp_path, &path)
        })();

        if let Err(err) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err);
        }

        if durable {
            self.sync_dir()?;
        }
        Ok(())
    }
}
