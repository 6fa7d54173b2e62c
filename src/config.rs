//! Where the users are persisted and how to open a store on them.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use rusqlite::Connection;

use crate::{
    Error,
    backend::{JsonFileBackend, SqliteBackend, UserBackend, create_user_record_table},
    schema::Schema,
    store::UserStore,
};

/// The repository path used when none is configured.
pub const DEFAULT_REPOSITORY_PATH: &str = "repositories/users.json";

/// The kinds of persisted source a store can use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// A single JSON file, rewritten in full on every change.
    #[default]
    Json,
    /// A SQLite database file, rewritten inside one transaction.
    Sqlite,
}

/// The settings needed to open a [UserStore].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// File path of the persisted source.
    pub repository_path: PathBuf,

    /// How the file at `repository_path` is laid out.
    pub backend: BackendKind,
}

impl StoreConfig {
    /// Create a new config.
    pub fn new(repository_path: impl Into<PathBuf>, backend: BackendKind) -> Self {
        Self {
            repository_path: repository_path.into(),
            backend,
        }
    }

    /// Make sure the persisted source exists, creating an empty one if needed.
    ///
    /// Existing users are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or table could not be created.
    pub fn initialize_repository(&self) -> Result<(), Error> {
        match self.backend {
            BackendKind::Json => {
                JsonFileBackend::create(&self.repository_path)?;
            }
            BackendKind::Sqlite => {
                let connection = Connection::open(&self.repository_path)?;
                create_user_record_table(&connection)?;
            }
        }

        Ok(())
    }

    /// Open a store with `schema` on the configured persisted source.
    ///
    /// The JSON file is not created here, persisting fails until it exists
    /// (see [StoreConfig::initialize_repository]). For SQLite the database
    /// file and table are created on open.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite database could not be opened.
    pub fn open(&self, schema: Schema) -> Result<UserStore<Box<dyn UserBackend>>, Error> {
        let backend: Box<dyn UserBackend> = match self.backend {
            BackendKind::Json => Box::new(JsonFileBackend::new(&self.repository_path)),
            BackendKind::Sqlite => {
                let connection = Connection::open(&self.repository_path)?;
                create_user_record_table(&connection)?;
                Box::new(SqliteBackend::new(Arc::new(Mutex::new(connection))))
            }
        };

        tracing::debug!(
            "Opening {:?} user store at {:?}",
            self.backend,
            self.repository_path
        );

        Ok(UserStore::new(schema, backend))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REPOSITORY_PATH, BackendKind::default())
    }
}
