//! Userbase is a small record store for user identity data.
//!
//! The whole user collection is loaded into memory the first time it is
//! needed, looked up and changed there, and written back in full after every
//! change. Records are shaped by a [Schema] that separates descriptive profile
//! fields from credential fields and says which fields may be shown.
//!
//! ```no_run
//! use userbase_rs::{JsonFileBackend, Schema, UserData, UserStore};
//!
//! # fn main() -> Result<(), userbase_rs::Error> {
//! let backend = JsonFileBackend::create("repositories/users.json")?;
//! let mut store = UserStore::new(Schema::default(), backend);
//!
//! let data = UserData::from([("username".to_owned(), "alice".to_owned())]);
//! store.add(&data)?;
//!
//! if let Some(alice) = store.get("username", "alice") {
//!     println!("{:?}", alice.visible(store.schema()));
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod record;
pub mod schema;
pub mod store;

pub use backend::{JsonFileBackend, SqliteBackend, UserBackend};
pub use config::{BackendKind, DEFAULT_REPOSITORY_PATH, StoreConfig};
pub use record::{UserCollection, UserData, UserPosition, UserRecord};
pub use schema::{KeyRole, KeyRoles, Schema};
pub use store::UserStore;

/// The errors that may occur in the store.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// There was nothing to persist the collection to.
    ///
    /// Holds the path of the missing file, or the name of the missing table.
    /// The in-memory change that triggered the persist is not rolled back.
    #[error("the persisted user source \"{0}\" could not be found")]
    PersistTargetMissing(String),

    /// The collection already holds the largest possible position, so there is
    /// no position left for a new record.
    #[error("no user position is left after the largest one in use")]
    PositionsExhausted,

    /// A position was 0, or could not be represented by the backend.
    ///
    /// Holds the offending position as text.
    #[error("the user position {0} is out of range")]
    PositionOutOfRange(String),

    /// The schema given to [Schema::new] was inconsistent.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Reading or writing a file failed.
    #[error("an I/O error occurred: {0}")]
    Io(String),

    /// The user collection could not be serialized.
    #[error("could not serialize the users: {0}")]
    Serialization(String),

    /// The persisted source did not hold a user collection.
    #[error("could not deserialize the users: {0}")]
    Deserialization(String),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        tracing::error!("an unhandled SQL error occurred: {}", value);
        Error::SqlError(value)
    }
}
