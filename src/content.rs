use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use log::debug;
use thiserror::Error;

/// Raw bytes returned by a content provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl Content {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    /// Interprets the payload as script text.
    pub fn into_text(self) -> Result<String, FetchError> {
        let Content { path, bytes } = self;
        String::from_utf8(bytes).map_err(|_| FetchError::NotText { path })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{path} not found")]
    NotFound { path: String },
    #[error("{path} escapes the content root")]
    OutsideRoot { path: String },
    #[error("{path} is not valid UTF-8 text")]
    NotText { path: String },
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fetches game scripts and binary assets by path.
pub trait ContentProvider {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'_, Result<Content, FetchError>>;

    /// Resolves a game-relative path to the location the provider serves it from.
    fn href(&self, path: &str) -> String;
}

/// Serves files from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
        if escapes {
            return Err(FetchError::OutsideRoot {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn read(&self, path: &str) -> Result<Content, FetchError> {
        let full = self.resolve(path)?;
        debug!("fetching {}", full.display());
        match fs::read(&full) {
            Ok(bytes) => Ok(Content::new(path, bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound {
                path: path.to_string(),
            }),
            Err(source) => Err(FetchError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

impl ContentProvider for DirectoryProvider {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'_, Result<Content, FetchError>> {
        future::ready(self.read(path)).boxed_local()
    }

    fn href(&self, path: &str) -> String {
        self.root
            .join(path.trim_start_matches('/'))
            .to_string_lossy()
            .into_owned()
    }
}

/// Keeps content in memory; useful for embedding games in a binary.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    files: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.borrow_mut().insert(path.into(), bytes.into());
    }
}

impl ContentProvider for MemoryProvider {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'_, Result<Content, FetchError>> {
        let result = self
            .files
            .borrow()
            .get(path)
            .cloned()
            .map(|bytes| Content::new(path, bytes))
            .ok_or_else(|| FetchError::NotFound {
                path: path.to_string(),
            });
        future::ready(result).boxed_local()
    }

    fn href(&self, path: &str) -> String {
        format!("memory:{path}")
    }
}
