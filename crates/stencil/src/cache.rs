/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Storage for compiled templates.
//!
//! A cache maps template identifiers to the serialized form of a compiled
//! unit. Backends only store text; deciding whether an entry is still valid
//! is the compiler's job.

use crate::error::CacheError;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

pub trait TemplateCache: Send + Sync {
    fn get(&self, identifier: &str) -> Result<Option<String>, CacheError>;

    fn set(&self, identifier: &str, content: &str) -> Result<(), CacheError>;

    /// Remove one entry, or every entry when `identifier` is `None`.
    fn flush(&self, identifier: Option<&str>) -> Result<(), CacheError>;
}

/// Stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl TemplateCache for NullCache {
    fn get(&self, _identifier: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn set(&self, _identifier: &str, _content: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn flush(&self, _identifier: Option<&str>) -> Result<(), CacheError> {
        Ok(())
    }
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identifier)
    }
}

impl TemplateCache for MemoryCache {
    fn get(&self, identifier: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identifier)
            .cloned())
    }

    fn set(&self, identifier: &str, content: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identifier.to_string(), content.to_string());
        Ok(())
    }

    fn flush(&self, identifier: Option<&str>) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match identifier {
            Some(identifier) => {
                entries.remove(identifier);
            }
            None => entries.clear(),
        }
        Ok(())
    }
}

const ENTRY_EXTENSION: &str = "json";

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One `<identifier>.json` file per compiled template in an existing
/// directory.
#[derive(Debug, Clone)]
pub struct FileSystemCache {
    directory: PathBuf,
}

impl FileSystemCache {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(CacheError::MissingDirectory { path: directory });
        }
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, identifier: &str) -> Result<PathBuf, CacheError> {
        let valid = !identifier.is_empty()
            && !identifier.starts_with('.')
            && identifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(CacheError::InvalidIdentifier {
                identifier: identifier.to_string(),
            });
        }
        Ok(self
            .directory
            .join(format!("{identifier}.{ENTRY_EXTENSION}")))
    }

    fn io_error(path: &Path, source: io::Error) -> CacheError {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl TemplateCache for FileSystemCache {
    fn get(&self, identifier: &str) -> Result<Option<String>, CacheError> {
        let path = self.entry_path(identifier)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Self::io_error(&path, error)),
        }
    }

    fn set(&self, identifier: &str, content: &str) -> Result<(), CacheError> {
        let path = self.entry_path(identifier)?;
        // Readers never see a partially written entry.
        let staging = path.with_extension(format!(
            "{ENTRY_EXTENSION}.{}-{}.tmp",
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&staging, content).map_err(|e| Self::io_error(&staging, e))?;
        fs::rename(&staging, &path).map_err(|e| Self::io_error(&path, e))
    }

    fn flush(&self, identifier: Option<&str>) -> Result<(), CacheError> {
        if let Some(identifier) = identifier {
            let path = self.entry_path(identifier)?;
            return match fs::remove_file(&path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => {
                    Err(Self::io_error(&path, error))
                }
                _ => Ok(()),
            };
        }
        let entries =
            fs::read_dir(&self.directory).map_err(|e| Self::io_error(&self.directory, e))?;
        for entry in entries {
            let path = entry.map_err(|e| Self::io_error(&self.directory, e))?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                fs::remove_file(&path).map_err(|e| Self::io_error(&path, e))?;
            }
        }
        tracing::debug!(directory = %self.directory.display(), "Flushed template cache");
        Ok(())
    }
}
