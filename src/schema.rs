//! Describes which fields exist on a user record.
//!
//! A [Schema] splits the fields of a record into descriptive profile fields
//! and credential "key fields". Each key field is addressed through a logical
//! [KeyRole] so the physical field name can change without touching the code
//! that reads or writes it.

use std::fmt::Display;

use crate::Error;

/// A logical credential or token slot on a user record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyRole {
    /// The name the user logs in with.
    Username,
    /// The user's password (or password hash).
    Password,
    /// The token for "remember me" sessions.
    RememberToken,
    /// The token sent out for password resets.
    ResetToken,
    /// The short lived API access token.
    AccessToken,
    /// The token used to issue new access tokens.
    RefreshToken,
}

impl KeyRole {
    /// Every key role, in the order their fields appear on a record.
    pub const ALL: [KeyRole; 6] = [
        KeyRole::Username,
        KeyRole::Password,
        KeyRole::RememberToken,
        KeyRole::ResetToken,
        KeyRole::AccessToken,
        KeyRole::RefreshToken,
    ];

    /// The logical name of the role, e.g. `"passwordKey"`.
    pub fn name(self) -> &'static str {
        match self {
            KeyRole::Username => "usernameKey",
            KeyRole::Password => "passwordKey",
            KeyRole::RememberToken => "rememberTokenKey",
            KeyRole::ResetToken => "resetTokenKey",
            KeyRole::AccessToken => "accessTokenKey",
            KeyRole::RefreshToken => "refreshTokenKey",
        }
    }

    /// Whether the value stored for this role is a secret.
    ///
    /// Only the username is not secret, its field doubles as a profile field.
    pub fn is_secret(self) -> bool {
        self != KeyRole::Username
    }

    fn default_field(self) -> &'static str {
        match self {
            KeyRole::Username => "username",
            KeyRole::Password => "password",
            KeyRole::RememberToken => "remember_token",
            KeyRole::ResetToken => "reset_token",
            KeyRole::AccessToken => "access_token",
            KeyRole::RefreshToken => "refresh_token",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The table mapping each [KeyRole] to the physical field that stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRoles {
    fields: [String; 6],
}

impl KeyRoles {
    /// Store the value for `role` in the field `field` instead of the default.
    pub fn with(mut self, role: KeyRole, field: impl Into<String>) -> Self {
        self.fields[role.index()] = field.into();
        self
    }

    /// The physical field name for `role`.
    pub fn field(&self, role: KeyRole) -> &str {
        &self.fields[role.index()]
    }

    /// Iterate over the roles and their field names in [KeyRole::ALL] order.
    pub fn iter(&self) -> impl Iterator<Item = (KeyRole, &str)> {
        KeyRole::ALL
            .into_iter()
            .map(|role| (role, self.field(role)))
    }

    /// Whether `field` stores the value of a secret role.
    pub fn is_secret_field(&self, field: &str) -> bool {
        self.iter()
            .any(|(role, role_field)| role.is_secret() && role_field == field)
    }
}

impl Default for KeyRoles {
    fn default() -> Self {
        Self {
            fields: KeyRole::ALL.map(|role| role.default_field().to_owned()),
        }
    }
}

/// The fields every user record has, and which of them may be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    profile_fields: Vec<String>,
    key_roles: KeyRoles,
    visible_fields: Vec<String>,
    all_fields: Vec<String>,
}

impl Schema {
    /// Create a schema from its profile fields, key roles and visible fields.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidSchema] if:
    /// - a profile field is empty or listed twice,
    /// - a key role maps to an empty field name,
    /// - a visible field is not a field of the schema,
    /// - a visible field stores the value of a secret key role.
    pub fn new(
        profile_fields: Vec<String>,
        key_roles: KeyRoles,
        visible_fields: Vec<String>,
    ) -> Result<Self, Error> {
        for (index, field) in profile_fields.iter().enumerate() {
            if field.is_empty() {
                return Err(Error::InvalidSchema(
                    "profile field names cannot be empty".to_owned(),
                ));
            }

            if profile_fields[..index].contains(field) {
                return Err(Error::InvalidSchema(format!(
                    "the profile field \"{field}\" is listed more than once"
                )));
            }
        }

        if let Some((role, _)) = key_roles.iter().find(|(_, field)| field.is_empty()) {
            return Err(Error::InvalidSchema(format!(
                "the key role {role} must map to a field name"
            )));
        }

        let all_fields = merge_fields(&profile_fields, &key_roles);

        for field in &visible_fields {
            if !all_fields.contains(field) {
                return Err(Error::InvalidSchema(format!(
                    "the visible field \"{field}\" is not a field of the schema"
                )));
            }

            if key_roles.is_secret_field(field) {
                return Err(Error::InvalidSchema(format!(
                    "the field \"{field}\" holds a credential and cannot be visible"
                )));
            }
        }

        Ok(Self {
            profile_fields,
            key_roles,
            visible_fields,
            all_fields,
        })
    }

    /// The descriptive, non-secret fields.
    pub fn profile_fields(&self) -> &[String] {
        &self.profile_fields
    }

    /// The table of key roles to field names.
    pub fn key_roles(&self) -> &KeyRoles {
        &self.key_roles
    }

    /// The fields that are safe to show outside the store.
    pub fn visible_fields(&self) -> &[String] {
        &self.visible_fields
    }

    /// Every field a persisted record has: the profile fields followed by the
    /// key role fields that are not already profile fields.
    pub fn all_fields(&self) -> &[String] {
        &self.all_fields
    }

    /// The physical field name for `role`.
    pub fn field_for(&self, role: KeyRole) -> &str {
        self.key_roles.field(role)
    }

    /// Whether `field` is one of [Schema::all_fields].
    pub fn is_field(&self, field: &str) -> bool {
        self.all_fields.iter().any(|known| known == field)
    }

    /// Whether `field` is one of [Schema::visible_fields].
    pub fn is_visible(&self, field: &str) -> bool {
        self.visible_fields.iter().any(|visible| visible == field)
    }
}

impl Default for Schema {
    fn default() -> Self {
        let profile_fields: Vec<String> = ["username", "firstname", "lastname", "role"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        let key_roles = KeyRoles::default();
        let all_fields = merge_fields(&profile_fields, &key_roles);

        Self {
            visible_fields: profile_fields.clone(),
            profile_fields,
            key_roles,
            all_fields,
        }
    }
}

fn merge_fields(profile_fields: &[String], key_roles: &KeyRoles) -> Vec<String> {
    let mut all_fields = profile_fields.to_vec();

    for (_, field) in key_roles.iter() {
        if !all_fields.iter().any(|known| known == field) {
            all_fields.push(field.to_owned());
        }
    }

    all_fields
}

#[cfg(test)]
mod schema_tests {
    use crate::Error;

    use super::{KeyRole, KeyRoles, Schema};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn default_schema_lists_profile_then_key_fields() {
        let schema = Schema::default();

        assert_eq!(
            schema.all_fields(),
            strings(&[
                "username",
                "firstname",
                "lastname",
                "role",
                "password",
                "remember_token",
                "reset_token",
                "access_token",
                "refresh_token",
            ])
        );
    }

    #[test]
    fn visible_fields_never_include_secret_key_fields() {
        let schema = Schema::default();

        for (role, field) in schema.key_roles().iter() {
            if role.is_secret() {
                assert!(
                    !schema.is_visible(field),
                    "{role} field \"{field}\" should not be visible"
                );
            }
        }
    }

    #[test]
    fn renamed_key_field_replaces_default_name() {
        let key_roles = KeyRoles::default().with(KeyRole::Password, "password_hash");

        let schema = Schema::new(
            strings(&["username", "role"]),
            key_roles,
            strings(&["username", "role"]),
        )
        .unwrap();

        assert_eq!(schema.field_for(KeyRole::Password), "password_hash");
        assert!(schema.is_field("password_hash"));
        assert!(!schema.is_field("password"));
    }

    #[test]
    fn new_rejects_visible_credential_field() {
        let result = Schema::new(
            strings(&["username"]),
            KeyRoles::default(),
            strings(&["username", "access_token"]),
        );

        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn new_rejects_unknown_visible_field() {
        let result = Schema::new(
            strings(&["username"]),
            KeyRoles::default(),
            strings(&["email"]),
        );

        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn new_rejects_duplicate_profile_field() {
        let result = Schema::new(
            strings(&["username", "role", "role"]),
            KeyRoles::default(),
            Vec::new(),
        );

        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn new_rejects_empty_key_field() {
        let result = Schema::new(
            strings(&["username"]),
            KeyRoles::default().with(KeyRole::ResetToken, ""),
            Vec::new(),
        );

        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }
}
