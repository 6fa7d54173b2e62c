//! A backend that keeps the collection in a SQLite table.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use rusqlite::{Connection, OptionalExtension};

use crate::{
    Error,
    backend::UserBackend,
    record::{UserCollection, UserPosition, UserRecord},
};

/// The name of the table holding one row per record field.
pub const USER_RECORD_TABLE: &str = "user_record";

/// Create the user record table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_record_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user_record (
                position INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (position, field)
                )",
        (),
    )?;

    Ok(())
}

/// Persists users as rows of `(position, ordinal, field, value)`.
///
/// A persist replaces the whole table inside one SQL transaction, so
/// concurrent readers see either the old or the new collection.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Create a backend on a shared connection.
    ///
    /// The table is not created, call [create_user_record_table] first.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }
}

fn table_exists(connection: &Connection) -> Result<bool, rusqlite::Error> {
    connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            (USER_RECORD_TABLE,),
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
}

impl UserBackend for SqliteBackend {
    fn load(&self) -> Result<Option<UserCollection>, Error> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        if !table_exists(&connection)? {
            return Ok(None);
        }

        let mut statement = connection.prepare(
            "SELECT position, field, value FROM user_record ORDER BY position, ordinal",
        )?;
        let rows = statement.query_map((), |row| {
            let raw_position: i64 = row.get(0)?;
            let field: String = row.get(1)?;
            let value: String = row.get(2)?;

            Ok((raw_position, field, value))
        })?;

        let mut users: BTreeMap<UserPosition, UserRecord> = BTreeMap::new();
        for row in rows {
            let (raw_position, field, value) = row?;
            let position = u64::try_from(raw_position)
                .ok()
                .and_then(|position| UserPosition::try_from(position).ok())
                .ok_or_else(|| {
                    Error::Deserialization(format!("invalid user position {raw_position}"))
                })?;

            users
                .entry(position)
                .or_default()
                .push_field(field, value);
        }

        Ok(Some(users.into_iter().collect()))
    }

    fn persist(&self, users: &UserCollection) -> Result<(), Error> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        if !table_exists(&connection)? {
            return Err(Error::PersistTargetMissing(USER_RECORD_TABLE.to_owned()));
        }

        let transaction = connection.transaction()?;
        transaction.execute("DELETE FROM user_record", ())?;

        {
            let mut statement = transaction.prepare(
                "INSERT INTO user_record (position, ordinal, field, value) VALUES (?1, ?2, ?3, ?4)",
            )?;

            for (position, record) in users.iter() {
                let position = i64::try_from(position.as_u64())
                    .map_err(|_| Error::PositionOutOfRange(position.to_string()))?;
                for (ordinal, (field, value)) in record.fields().enumerate() {
                    statement.execute((position, ordinal as i64, field, value))?;
                }
            }
        }

        transaction.commit()?;

        tracing::debug!("Wrote {} user(s) to the {USER_RECORD_TABLE} table", users.len());

        Ok(())
    }
}
