//! Whole-document JSON persistence.
//!
//! Every persisted document is read and written as a unit. Writes go to a
//! sibling temp file first and are then renamed into place, so a reader
//! never sees a half-written document.

use crate::error::{Result, VigilError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A typed JSON document at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonDocument<T> {
    path: PathBuf,
    label: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonDocument<T> {
    /// Bind a document type to `path`. `label` names it in errors and logs.
    pub fn new(path: impl Into<PathBuf>, label: &'static str) -> Self {
        Self {
            path: path.into(),
            label,
            _marker: PhantomData,
        }
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Human-readable document name.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Read the document. A missing file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::State`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(&self) -> Result<Option<T>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VigilError::State(format!(
                    "cannot read {} at {}: {e}",
                    self.label,
                    self.path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            VigilError::State(format!(
                "cannot parse {} at {}: {e}",
                self.label,
                self.path.display()
            ))
        })
    }

    /// Replace the document with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::State`] if serialization or any filesystem step fails.
    pub fn save(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VigilError::State(format!("cannot create directory for {}: {e}", self.label))
            })?;
        }

        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| VigilError::State(format!("cannot serialize {}: {e}", self.label)))?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            VigilError::State(format!("cannot write {} temp file: {e}", self.label))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            VigilError::State(format!("cannot finalize {} file: {e}", self.label))
        })?;
        Ok(())
    }

    /// Delete the document. Deleting a missing document is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::State`] if the file exists but cannot be removed.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VigilError::State(format!(
                "cannot remove {}: {e}",
                self.label
            ))),
        }
    }
}
