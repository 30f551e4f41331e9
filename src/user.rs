//! Code for creating the user table and fetching users from the database.

use std::fmt::Display;

use email_address::EmailAddress;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, db::truncate_to_seconds, password::PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better
/// compile time errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A case-normalized email address.
///
/// The inner string is trimmed and lowercased on construction so that email
/// uniqueness is case-insensitive: two addresses that differ only by letter
/// case normalize to the same string and collide on the database's UNIQUE
/// constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Normalize and validate an email address string.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidEmail] if the string is not a valid email
    /// address.
    pub fn new(raw_email: &str) -> Result<Self, Error> {
        let normalized = raw_email.trim().to_lowercase();

        if !EmailAddress::is_valid(&normalized) {
            return Err(Error::InvalidEmail);
        }

        Ok(Self(normalized))
    }

    /// The normalized email address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The user's normalized email address.
    pub email: Email,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// When the user registered.
    pub created_at: OffsetDateTime,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                created_at INTEGER NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Create and insert a new user into the database.
///
/// # Errors
///
/// Returns an [Error::EmailTaken] if `email` already exists in the database,
/// or an [Error::SqlError] if some other SQL related error occurred.
pub fn create_user(
    email: Email,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<User, Error> {
    let created_at = truncate_to_seconds(OffsetDateTime::now_utc());

    connection.execute(
        "INSERT INTO user (email, password, created_at) VALUES (?1, ?2, ?3)",
        (
            email.as_str(),
            password_hash.as_str(),
            created_at.unix_timestamp(),
        ),
    )?;

    let id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        id,
        email,
        password_hash,
        created_at,
    })
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] if `user_id` does not belong to a registered
/// user, or an [Error::SqlError] if there was an error trying to access the
/// database.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare("SELECT id, email, password, created_at FROM user WHERE id = :id")?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(|error| error.into())
}

/// Get the user from the database whose email matches `email`.
///
/// `email` should already be normalized (trimmed and lowercased); stored
/// emails always are.
///
/// # Errors
///
/// Returns an [Error::NotFound] if no user has the given email, or an
/// [Error::SqlError] if there was an error trying to access the database.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare("SELECT id, email, password, created_at FROM user WHERE email = :email")?
        .query_row(&[(":email", &email)], map_user_row)
        .map_err(|error| error.into())
}

fn map_user_row(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let raw_timestamp: i64 = row.get(3)?;
    let created_at = OffsetDateTime::from_unix_timestamp(raw_timestamp).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Integer,
            Box::new(error),
        )
    })?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        email: Email(row.get(1)?),
        password_hash: PasswordHash::new_unchecked(&row.get::<_, String>(2)?),
        created_at,
    })
}

#[cfg(test)]
mod email_tests {
    use crate::Error;

    use super::Email;

    #[test]
    fn new_normalizes_case_and_whitespace() {
        let email = Email::new("  Foo@Example.COM ").unwrap();

        assert_eq!(email.as_str(), "foo@example.com");
    }

    #[test]
    fn new_fails_on_invalid_address() {
        assert_eq!(Email::new("not an email"), Err(Error::InvalidEmail));
        assert_eq!(Email::new(""), Err(Error::InvalidEmail));
    }
}
