//! File-backed key-value store.
//!
//! Each key is one JSON file under the data directory. Writes go to a
//! sibling temp file first and are renamed into place, so a crash mid-write
//! leaves the previous value intact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tally_engine::{error::Result, Error, KeyValueStore};

/// Persists each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "Opened file store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    fn write_atomic(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, path)
    }
}

fn storage_error(key: &str, e: io::Error) -> Error {
    Error::Storage(format!("{key}: {e}"))
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.write_atomic(&self.path_for(key), value)
            .map_err(|e| storage_error(key, e))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(key, e)),
        }
    }
}
