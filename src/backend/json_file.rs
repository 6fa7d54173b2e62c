//! A backend that keeps the whole collection in one JSON file.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{Error, backend::UserBackend, record::UserCollection};

/// Persists users as a single JSON object mapping positions to records.
///
/// Every persist rewrites the file in full. There is no locking and no
/// temp-file-and-rename, so two processes persisting to the same file race
/// and the last write wins.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Use the file at `path`. The file is not created.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use the file at `path`, creating it with an empty collection if it
    /// does not exist yet. An existing file is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an [Error::Io] if the file could not be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let backend = Self::new(path);

        if !backend.path.exists() {
            let parent = backend.path.parent();
            if let Some(parent) = parent.filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }

            fs::write(&backend.path, "{}")?;
            tracing::info!("Created empty user repository at {:?}", backend.path);
        }

        Ok(backend)
    }

    /// The path of the JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UserBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<UserCollection>, Error> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|error| Error::Deserialization(error.to_string()))
    }

    fn persist(&self, users: &UserCollection) -> Result<(), Error> {
        if !self.path.is_file() {
            return Err(Error::PersistTargetMissing(self.path.display().to_string()));
        }

        let text = serde_json::to_string_pretty(users)
            .map_err(|error| Error::Serialization(error.to_string()))?;
        fs::write(&self.path, text)?;

        tracing::debug!("Wrote {} user(s) to {:?}", users.len(), self.path);

        Ok(())
    }
}
