//! Defines the app level error type and its conversion to JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::password::MIN_PASSWORD_LENGTH;

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The request body was missing the email or the password.
    #[error("email and password are required")]
    MissingCredentials,

    /// The string used to register a user could not be parsed as an email
    /// address.
    #[error("invalid email address")]
    InvalidEmail,

    /// The password used to register a user was below the minimum length.
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,

    /// The email used to register a user already exists in the database.
    ///
    /// Emails are normalized to lowercase before they are stored, so this
    /// covers emails that differ only by letter case.
    #[error("the email already exists in the database")]
    EmailTaken,

    /// The user provided an invalid combination of email and password.
    ///
    /// This error is deliberately the same for an unknown email and a wrong
    /// password so that clients cannot probe which emails are registered.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The request did not carry a bearer token.
    #[error("no token provided")]
    MissingToken,

    /// The bearer token was malformed, expired, tampered with, or refers to a
    /// user that no longer exists. No distinction is surfaced to the caller.
    #[error("invalid token")]
    InvalidToken,

    /// An unexpected error occurred while signing a token.
    #[error("could not create an auth token")]
    TokenCreation,

    /// A transaction was created without its type, amount, or description.
    #[error("type, amount, and description are required")]
    MissingTransactionFields,

    /// A string other than "income" or "expense" was used as a transaction
    /// type.
    #[error("transaction type must be income or expense")]
    InvalidTransactionType,

    /// A negative or non-finite amount was used to create or update a
    /// transaction.
    #[error("transaction amounts must be zero or greater")]
    InvalidAmount,

    /// An empty string was used as a transaction description.
    #[error("transaction descriptions must not be empty")]
    EmptyDescription,

    /// A date string could not be parsed as an RFC 3339 date-time or a
    /// calendar date.
    #[error("could not parse \"{0}\" as a date")]
    InvalidDate(String),

    /// A page number below one was requested.
    #[error("page must be a positive integer")]
    InvalidPageNumber,

    /// A page size below one was requested.
    #[error("limit must be a positive integer")]
    InvalidPageSize,

    /// The requested resource was not found.
    ///
    /// This error is also returned when the resource exists but belongs to
    /// another user, so that ownership is never revealed. Internally it may
    /// occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server,
    /// never sent to the client.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLock,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("user.email") =>
            {
                Error::EmailTaken
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status_code, message) = match self {
            Error::MissingCredentials => {
                (StatusCode::BAD_REQUEST, "Email and password are required")
            }
            Error::InvalidEmail => (StatusCode::BAD_REQUEST, "Invalid email address"),
            Error::PasswordTooShort => (
                StatusCode::BAD_REQUEST,
                "Password must be at least 6 characters",
            ),
            Error::EmailTaken => (StatusCode::BAD_REQUEST, "Email already registered"),
            Error::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
            Error::MissingToken => (StatusCode::UNAUTHORIZED, "No token provided"),
            Error::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            Error::MissingTransactionFields => (
                StatusCode::BAD_REQUEST,
                "Type, amount, and description are required",
            ),
            Error::InvalidTransactionType => (
                StatusCode::BAD_REQUEST,
                "Type must be income or expense",
            ),
            Error::InvalidAmount => (StatusCode::BAD_REQUEST, "Amount must be positive"),
            Error::EmptyDescription => (StatusCode::BAD_REQUEST, "Description is required"),
            Error::InvalidDate(ref date_string) => {
                let body = Json(json!({
                    "message": format!("Could not parse \"{date_string}\" as a date"),
                }));

                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            Error::InvalidPageNumber => {
                (StatusCode::BAD_REQUEST, "Page must be a positive integer")
            }
            Error::InvalidPageSize => {
                (StatusCode::BAD_REQUEST, "Limit must be a positive integer")
            }
            Error::NotFound => (StatusCode::NOT_FOUND, "Transaction not found"),
            // Any errors that are not handled above are not intended to be
            // shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error")
            }
        };

        let body = Json(json!({
            "message": message,
        }));

        (status_code, body).into_response()
    }
}
