use log::{error, trace};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use vm::Store;

/// Store which keeps each key in a file within a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store in the given directory, creating it if needed
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_owned(),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("no stored value at {path:?}");
                None
            }
            Err(e) => {
                error!("could not read {path:?}: {e}");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: String) {
        let path = self.path(key);
        if let Err(e) = std::fs::write(&path, value) {
            error!("could not write {path:?}: {e}");
        }
    }
}
