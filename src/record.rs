//! The user records held by the store and the collection that orders them.

use std::{collections::BTreeMap, fmt::Display};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};

use crate::{Error, schema::Schema};

/// Proposed field values for a new or updated user, keyed by field name.
pub type UserData = BTreeMap<String, String>;

/// A newtype wrapper for the 1-based position of a record in the collection.
///
/// Positions are handed out in increasing order and are never reused, so they
/// also record the order in which users were added.
///
/// Deserializing rejects position 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
pub struct UserPosition(u64);

impl UserPosition {
    /// The position given to the first record of an empty collection.
    pub const FIRST: UserPosition = UserPosition(1);

    /// Create a new user position.
    ///
    /// The caller should ensure that `position` is not 0, use
    /// [UserPosition::try_from] for untrusted input.
    pub fn new(position: u64) -> Self {
        Self(position)
    }

    /// Cast the position to a 64 bit integer.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl TryFrom<u64> for UserPosition {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(Error::PositionOutOfRange(value.to_string()));
        }

        Ok(Self(value))
    }
}

impl From<UserPosition> for u64 {
    fn from(value: UserPosition) -> Self {
        value.0
    }
}

impl Display for UserPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One user's field values, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    fields: Vec<(String, String)>,
}

impl UserRecord {
    /// Build a record with exactly the fields of `schema`.
    ///
    /// Values are taken from `data` where present and default to the empty
    /// string otherwise. Keys of `data` that are not schema fields are dropped.
    pub fn from_data(schema: &Schema, data: &UserData) -> Self {
        let fields = schema
            .all_fields()
            .iter()
            .map(|field| {
                let value = data.get(field).cloned().unwrap_or_default();
                (field.clone(), value)
            })
            .collect();

        Self { fields }
    }

    /// The value of `field`, if the record has that field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Whether `value` is the value of any field of the record.
    pub fn contains_value(&self, value: &str) -> bool {
        self.fields.iter().any(|(_, field_value)| field_value == value)
    }

    /// Iterate over the field names and values in field order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Iterate over the field names in field order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// The number of fields in the record.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A copy of the record holding only the fields that `schema` marks as
    /// visible, in the order of [Schema::visible_fields].
    ///
    /// Use this before handing a record to anything outside the store, the
    /// full record carries passwords and tokens.
    pub fn visible(&self, schema: &Schema) -> UserRecord {
        let fields = schema
            .visible_fields()
            .iter()
            .filter_map(|field| {
                self.get(field)
                    .map(|value| (field.clone(), value.to_owned()))
            })
            .collect();

        Self { fields }
    }

    /// Overwrite `field` with `value`, adding the field if the record lacks it.
    pub(crate) fn set(&mut self, field: &str, value: &str) {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, existing)) => value.clone_into(existing),
            None => self.fields.push((field.to_owned(), value.to_owned())),
        }
    }

    pub(crate) fn push_field(&mut self, field: String, value: String) {
        self.fields.push((field, value));
    }
}

impl Serialize for UserRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for UserRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(UserRecordVisitor)
    }
}

struct UserRecordVisitor;

impl<'de> Visitor<'de> for UserRecordVisitor {
    type Value = UserRecord;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a map of field names to string values")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut record = UserRecord {
            fields: Vec::with_capacity(access.size_hint().unwrap_or(0)),
        };

        while let Some((name, value)) = access.next_entry::<String, String>()? {
            record.set(&name, &value);
        }

        Ok(record)
    }
}

/// Every user record, ordered by [UserPosition].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserCollection {
    users: BTreeMap<UserPosition, UserRecord>,
}

impl UserCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// The record at `position`.
    pub fn get(&self, position: UserPosition) -> Option<&UserRecord> {
        self.users.get(&position)
    }

    /// Iterate over the records in position order.
    pub fn iter(&self) -> impl Iterator<Item = (UserPosition, &UserRecord)> {
        self.users.iter().map(|(position, record)| (*position, record))
    }

    /// The position the next pushed record will get.
    ///
    /// This is one past the largest position in use, so gaps left in a
    /// persisted collection are never filled in.
    ///
    /// # Errors
    ///
    /// Returns [Error::PositionsExhausted] if the largest position in use is
    /// the largest possible position.
    pub fn next_position(&self) -> Result<UserPosition, Error> {
        match self.users.last_key_value() {
            Some((position, _)) => position.next().ok_or(Error::PositionsExhausted),
            None => Ok(UserPosition::FIRST),
        }
    }

    /// The first record, in position order, that has `value` in any field.
    pub fn find_by_value(&self, value: &str) -> Option<(UserPosition, &UserRecord)> {
        self.iter().find(|(_, record)| record.contains_value(value))
    }

    pub(crate) fn push(&mut self, record: UserRecord) -> Result<UserPosition, Error> {
        let position = self.next_position()?;
        self.users.insert(position, record);
        Ok(position)
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut UserRecord> {
        self.users.values_mut()
    }

    pub(crate) fn clear(&mut self) {
        self.users.clear();
    }
}

impl FromIterator<(UserPosition, UserRecord)> for UserCollection {
    fn from_iter<T: IntoIterator<Item = (UserPosition, UserRecord)>>(iter: T) -> Self {
        Self {
            users: iter.into_iter().collect(),
        }
    }
}
