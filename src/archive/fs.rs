//! Plain directory backend: one file per entry, keys are relative paths.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::{TilesetSource, TilesetTarget, key_to_path, normalize_key};
use crate::error::{Error, Result};

/// Serves entries from the files below a directory
#[derive(Debug, Default)]
pub struct FsSource {
    root: Option<PathBuf>,
}

impl FsSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn root(&self, operation: &'static str) -> Result<&Path> {
        self.root.as_deref().ok_or_else(|| Error::not_open(operation))
    }
}

impl TilesetSource for FsSource {
    fn open(&mut self, path: &str) -> Result<()> {
        if self.root.is_some() {
            return Err(Error::not_closed("open"));
        }
        let root = PathBuf::from(path);
        if !root.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            )));
        }
        self.root = Some(root);
        Ok(())
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String>> + '_>> {
        let root = self.root("list keys")?;
        let keys = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |item| match item {
                Ok(entry) if entry.file_type().is_file() => {
                    let relative = entry.path().strip_prefix(root).ok()?;
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    Some(Ok(key))
                }
                Ok(_) => None,
                Err(e) => Some(Err(Error::Io(e.into()))),
            });
        Ok(Box::new(keys))
    }

    fn entry(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let root = self.root("read entry")?;
        let path = match key_to_path(root, &normalize_key(key)) {
            Ok(path) => path,
            Err(Error::InvalidKey { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    fn close(&mut self) -> Result<()> {
        self.root
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::not_open("close"))
    }
}

/// Writes every entry as a file below a directory
#[derive(Debug, Default)]
pub struct FsTarget {
    root: Option<PathBuf>,
}

impl FsTarget {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TilesetTarget for FsTarget {
    fn begin(&mut self, path: &str, overwrite: bool) -> Result<()> {
        if self.root.is_some() {
            return Err(Error::not_closed("begin"));
        }
        let root = PathBuf::from(path);
        if root.exists() && !overwrite {
            return Err(Error::AlreadyExists { path: root });
        }
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "writing tileset directory");
        self.root = Some(root);
        Ok(())
    }

    fn add_entry(&mut self, key: &str, content: &[u8]) -> Result<()> {
        let root = self.root.as_deref().ok_or_else(|| Error::not_open("add entry"))?;
        let path = key_to_path(root, key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.root
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::not_open("end"))
    }
}
