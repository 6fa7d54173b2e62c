//! Places the user collection can be persisted to.
//!
//! A backend only ever loads or persists the whole collection at once. The
//! [store](crate::store) owns the in-memory copy and decides when to do either.

mod json_file;
mod sqlite;

pub use json_file::JsonFileBackend;
pub use sqlite::{SqliteBackend, USER_RECORD_TABLE, create_user_record_table};

use crate::{Error, record::UserCollection};

/// Loads and persists the full user collection.
pub trait UserBackend {
    /// Read the persisted collection.
    ///
    /// Returns `Ok(None)` if nothing has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted source exists but could not be read
    /// or does not hold a user collection.
    fn load(&self) -> Result<Option<UserCollection>, Error>;

    /// Replace the persisted collection with `users`.
    ///
    /// # Errors
    ///
    /// Returns [Error::PersistTargetMissing] if there is nothing to write to,
    /// or another error if the write itself failed.
    fn persist(&self, users: &UserCollection) -> Result<(), Error>;
}

impl<B: UserBackend + ?Sized> UserBackend for Box<B> {
    fn load(&self) -> Result<Option<UserCollection>, Error> {
        (**self).load()
    }

    fn persist(&self, users: &UserCollection) -> Result<(), Error> {
        (**self).persist(users)
    }
}
