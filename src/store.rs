//! The user store: an in-memory user collection backed by a [UserBackend].

use crate::{
    Error,
    backend::UserBackend,
    record::{UserCollection, UserData, UserRecord},
    schema::Schema,
};

/// Handles the lookup, creation and update of user records.
///
/// The collection is loaded from the backend the first time it is needed and
/// then kept in memory for the life of the store; changes made to the
/// persisted source by anyone else after that are not seen. Every mutation
/// rewrites the whole persisted source.
///
/// There is no locking. Mutations take `&mut self`, so within a process the
/// store has a single writer. Separate processes sharing one persisted source
/// are not coordinated and the last persist wins.
#[derive(Debug)]
pub struct UserStore<B> {
    schema: Schema,
    backend: B,
    users: Option<UserCollection>,
}

impl<B: UserBackend> UserStore<B> {
    /// Create a store for records shaped by `schema`, persisted to `backend`.
    ///
    /// Nothing is loaded until the first operation or [UserStore::initialize].
    pub fn new(schema: Schema, backend: B) -> Self {
        Self {
            schema,
            backend,
            users: None,
        }
    }

    /// The schema records are normalised to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The backend the collection is persisted to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the collection has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.users.is_some()
    }

    /// Load the collection from the backend, unless already loaded.
    ///
    /// A missing persisted source gives an empty collection. So does one that
    /// cannot be read or parsed: the failure is logged as a warning and the
    /// store starts empty, which means the next mutation overwrites whatever
    /// was there. Loaded records are used as-is, they are not checked
    /// against the schema.
    pub fn initialize(&mut self) {
        self.loaded();
    }

    /// Find the first user that has `value` in any of its fields.
    ///
    /// `field` names the field the caller is interested in, but matching is
    /// done against every field of each record, in position order. An empty
    /// `value` never matches anything.
    ///
    /// The returned record includes the key role fields, use
    /// [UserRecord::visible] before showing it to anyone.
    pub fn get(&mut self, field: &str, value: &str) -> Option<UserRecord> {
        if value.is_empty() {
            return None;
        }

        let found = self
            .loaded()
            .find_by_value(value)
            .map(|(_, record)| record.clone());

        if found.is_none() {
            tracing::debug!("No user matched the value looked up for field \"{field}\"");
        }

        found
    }

    /// Every user record, in position order.
    pub fn all(&mut self) -> &UserCollection {
        self.loaded()
    }

    /// Add a new user and persist the collection.
    ///
    /// The record gets exactly the schema's fields: values from `data` where
    /// given, the empty string otherwise. Keys of `data` that are not fields
    /// of the schema are dropped. Nothing is checked for uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [Error::PositionsExhausted] without changing anything if the
    /// largest possible position is already in use. Returns another error if
    /// the collection could not be persisted, the new record stays in memory
    /// regardless.
    pub fn add(&mut self, data: &UserData) -> Result<UserRecord, Error> {
        let record = UserRecord::from_data(&self.schema, data);

        let users = self
            .users
            .get_or_insert_with(|| load_users(&self.backend));
        let position = users.push(record.clone())?;
        tracing::info!("Added user at position {position}");

        self.backend.persist(users)?;

        Ok(record)
    }

    /// Overwrite fields of every user that has `value` in any of its fields,
    /// then persist the collection.
    ///
    /// Only keys of `data` that are fields of the schema are applied. Unlike
    /// [UserStore::get], all matching users are changed, not just the first.
    /// The collection is persisted even if nothing matched. An empty `value`
    /// makes this a no-op that does not persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection could not be persisted. The changes
    /// stay in memory regardless.
    pub fn update(&mut self, field: &str, value: &str, data: &UserData) -> Result<(), Error> {
        if value.is_empty() {
            return Ok(());
        }

        let users = self
            .users
            .get_or_insert_with(|| load_users(&self.backend));

        let mut updated = 0;
        for record in users.records_mut().filter(|record| record.contains_value(value)) {
            for (key, new_value) in data {
                if self.schema.is_field(key) {
                    record.set(key, new_value);
                }
            }
            updated += 1;
        }
        tracing::info!("Updated {updated} user(s) matched by field \"{field}\"");

        self.backend.persist(users)
    }

    /// Remove every user and persist the empty collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection could not be persisted. The
    /// in-memory collection is empty regardless.
    pub fn clear(&mut self) -> Result<(), Error> {
        let users = self
            .users
            .get_or_insert_with(|| load_users(&self.backend));
        users.clear();
        tracing::info!("Removed all users");

        self.backend.persist(users)
    }

    fn loaded(&mut self) -> &mut UserCollection {
        self.users.get_or_insert_with(|| load_users(&self.backend))
    }
}

fn load_users<B: UserBackend>(backend: &B) -> UserCollection {
    match backend.load() {
        Ok(Some(users)) => {
            tracing::debug!("Loaded {} user(s)", users.len());
            users
        }
        Ok(None) => {
            tracing::debug!("No persisted users found, starting with an empty collection");
            UserCollection::new()
        }
        Err(error) => {
            tracing::warn!(
                "Could not load the persisted users, starting with an empty collection: {error}"
            );
            UserCollection::new()
        }
    }
}

#[cfg(test)]
mod user_store_tests {
    use std::{cell::RefCell, fs, path::Path};

    use tempfile::TempDir;

    use crate::{
        Error,
        backend::{JsonFileBackend, UserBackend},
        record::{UserCollection, UserData, UserPosition},
        schema::Schema,
    };

    use super::UserStore;

    /// Keeps the persisted collection in memory and counts persists.
    #[derive(Default)]
    struct MemoryBackend {
        persisted: RefCell<Option<UserCollection>>,
        persist_count: RefCell<usize>,
    }

    impl UserBackend for MemoryBackend {
        fn load(&self) -> Result<Option<UserCollection>, Error> {
            Ok(self.persisted.borrow().clone())
        }

        fn persist(&self, users: &UserCollection) -> Result<(), Error> {
            *self.persisted.borrow_mut() = Some(users.clone());
            *self.persist_count.borrow_mut() += 1;
            Ok(())
        }
    }

    fn data(pairs: &[(&str, &str)]) -> UserData {
        pairs
            .iter()
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect()
    }

    fn get_store() -> UserStore<MemoryBackend> {
        UserStore::new(Schema::default(), MemoryBackend::default())
    }

    fn get_store_with_alice_and_bob() -> UserStore<MemoryBackend> {
        let mut store = get_store();
        store
            .add(&data(&[("username", "alice"), ("role", "editor")]))
            .unwrap();
        store
            .add(&data(&[("username", "bob"), ("role", "admin")]))
            .unwrap();

        store
    }

    fn json_store(path: &Path) -> UserStore<JsonFileBackend> {
        UserStore::new(Schema::default(), JsonFileBackend::new(path))
    }

    #[test]
    fn initialize_twice_ignores_later_changes_to_the_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, r#"{"1":{"username":"alice"}}"#).unwrap();
        let mut store = json_store(&path);

        store.initialize();
        fs::write(&path, r#"{"1":{"username":"mallory"}}"#).unwrap();
        store.initialize();

        assert!(store.get("username", "alice").is_some());
        assert!(store.get("username", "mallory").is_none());
    }

    #[test]
    fn operations_initialize_lazily() {
        let mut store = get_store();
        assert!(!store.is_initialized());

        store.get("username", "alice");

        assert!(store.is_initialized());
    }

    #[test]
    fn unparsable_source_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "not json").unwrap();
        let mut store = json_store(&path);

        store.initialize();

        assert!(store.all().is_empty());
    }

    #[test]
    fn add_gives_record_exactly_the_schema_fields() {
        let mut store = get_store();

        let record = store
            .add(&data(&[
                ("username", "alice"),
                ("password", "hunter2"),
                ("is_admin", "yes"),
            ]))
            .unwrap();

        let field_names: Vec<&str> = record.field_names().collect();
        assert_eq!(field_names, store.schema().all_fields());
        assert_eq!(record.get("password"), Some("hunter2"));
        assert_eq!(record.get("firstname"), Some(""));
        assert_eq!(record.get("is_admin"), None);
    }

    #[test]
    fn add_persists_the_new_record() {
        let mut store = get_store();

        store.add(&data(&[("username", "alice")])).unwrap();

        let persisted = store.backend().persisted.borrow().clone().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(
            persisted.get(UserPosition::FIRST).unwrap().get("username"),
            Some("alice")
        );
    }

    #[test]
    fn add_allows_duplicate_usernames() {
        let mut store = get_store();

        store.add(&data(&[("username", "alice")])).unwrap();
        store.add(&data(&[("username", "alice")])).unwrap();

        assert_eq!(store.all().len(), 2);
    }

    #[test]
    fn get_matches_by_value() {
        let mut store = get_store_with_alice_and_bob();

        let bob = store.get("username", "bob").unwrap();

        assert_eq!(bob.get("role"), Some("admin"));
    }

    #[test]
    fn get_with_empty_value_finds_nothing() {
        let mut store = get_store_with_alice_and_bob();

        assert_eq!(store.get("username", ""), None);
    }

    #[test]
    fn get_matches_any_field_of_the_record() {
        let mut store = get_store_with_alice_and_bob();

        let alice = store.get("username", "editor").unwrap();

        assert_eq!(alice.get("username"), Some("alice"));
    }

    #[test]
    fn get_returns_first_of_several_matches() {
        let mut store = get_store_with_alice_and_bob();
        store
            .add(&data(&[("username", "carol"), ("role", "admin")]))
            .unwrap();

        let admin = store.get("role", "admin").unwrap();

        assert_eq!(admin.get("username"), Some("bob"));
    }

    #[test]
    fn get_missing_value_returns_none() {
        let mut store = get_store_with_alice_and_bob();

        assert_eq!(store.get("username", "mallory"), None);
    }

    #[test]
    fn update_changes_every_matching_record() {
        let mut store = get_store();
        store
            .add(&data(&[("username", "shared@example.com"), ("role", "editor")]))
            .unwrap();
        store
            .add(&data(&[("firstname", "shared@example.com"), ("role", "editor")]))
            .unwrap();
        store
            .add(&data(&[("username", "carol"), ("role", "editor")]))
            .unwrap();

        store
            .update("username", "shared@example.com", &data(&[("role", "admin")]))
            .unwrap();

        let roles: Vec<&str> = store
            .all()
            .iter()
            .map(|(_, record)| record.get("role").unwrap())
            .collect();
        assert_eq!(roles, ["admin", "admin", "editor"]);
    }

    #[test]
    fn update_ignores_unknown_fields() {
        let mut store = get_store_with_alice_and_bob();

        store
            .update("username", "alice", &data(&[("is_admin", "yes")]))
            .unwrap();

        let alice = store.get("username", "alice").unwrap();
        assert_eq!(alice.get("is_admin"), None);
        assert_eq!(alice.len(), store.schema().all_fields().len());
    }

    #[test]
    fn update_persists_once_even_without_a_match() {
        let mut store = get_store_with_alice_and_bob();
        let persists_before = *store.backend().persist_count.borrow();

        store
            .update("username", "mallory", &data(&[("role", "admin")]))
            .unwrap();

        assert_eq!(*store.backend().persist_count.borrow(), persists_before + 1);
    }

    #[test]
    fn update_with_empty_value_does_nothing() {
        let mut store = get_store_with_alice_and_bob();
        let before = store.all().clone();
        let persists_before = *store.backend().persist_count.borrow();

        store
            .update("password", "", &data(&[("role", "admin")]))
            .unwrap();

        assert_eq!(store.all(), &before);
        assert_eq!(*store.backend().persist_count.borrow(), persists_before);
    }

    #[test]
    fn clear_persists_an_empty_collection() {
        let mut store = get_store_with_alice_and_bob();

        store.clear().unwrap();

        assert!(store.all().is_empty());
        assert_eq!(
            store.backend().persisted.borrow().clone(),
            Some(UserCollection::new())
        );
    }

    #[test]
    fn persisted_collection_reloads_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        let mut store = UserStore::new(
            Schema::default(),
            JsonFileBackend::create(&path).unwrap(),
        );
        for username in ["carol", "alice", "bob"] {
            store.add(&data(&[("username", username)])).unwrap();
        }

        let mut reloaded = json_store(&path);

        assert_eq!(reloaded.all(), store.all());
        let usernames: Vec<&str> = reloaded
            .all()
            .iter()
            .map(|(_, record)| record.get("username").unwrap())
            .collect();
        assert_eq!(usernames, ["carol", "alice", "bob"]);
    }

    #[test]
    fn add_after_largest_possible_position_fails_without_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        let contents = r#"{"18446744073709551615":{"username":"alice"}}"#;
        fs::write(&path, contents).unwrap();
        let mut store = json_store(&path);
        store.initialize();

        let result = store.add(&data(&[("username", "bob")]));

        assert_eq!(result, Err(Error::PositionsExhausted));
        assert_eq!(store.all().len(), 1);
        assert!(store.get("username", "bob").is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), contents);
    }

    #[test]
    fn failed_persist_keeps_the_added_record_in_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        let mut store = json_store(&path);

        let result = store.add(&data(&[("username", "alice")]));

        assert_eq!(
            result,
            Err(Error::PersistTargetMissing(path.display().to_string()))
        );
        assert!(store.get("username", "alice").is_some());
        assert!(!path.exists());
    }
}
