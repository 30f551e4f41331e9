//! The transaction table, model, and the handlers for creating, updating, and
//! deleting transactions.
//!
//! Every database operation in this module is scoped to the owning user: a
//! transaction that belongs to someone else produces the same [Error::NotFound]
//! as a transaction that does not exist.

use std::{fmt::Display, str::FromStr};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rusqlite::{
    Connection,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{
    Date, OffsetDateTime, Time,
    format_description::well_known::{Iso8601, Rfc3339},
    macros::time,
};

use crate::{
    Error,
    auth::AuthenticatedUser,
    db::{DatabaseID, truncate_to_seconds},
    state::AppState,
    user::UserID,
};

/// Whether a transaction adds money to or removes money from the books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money coming in.
    Income,
    /// Money going out.
    Expense,
}

impl TransactionType {
    /// The lowercase name used on the wire and in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(Error::InvalidTransactionType),
        }
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// An amount of money that came into or went out of a user's books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The transaction's ID in the application database.
    pub id: DatabaseID,
    /// Whether this is income or an expense.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// The amount of money.
    pub amount: f64,
    /// What the money was for.
    pub description: String,
    /// Where the money came from or went to. May be empty.
    pub from_where: String,
    /// Free-form notes. May be empty.
    pub notes: String,
    /// When the transaction happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// The ID of the user who owns this transaction.
    pub user_id: UserID,
}

/// Create the transaction table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                amount REAL NOT NULL,
                description TEXT NOT NULL,
                from_where TEXT NOT NULL,
                notes TEXT NOT NULL,
                date INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    Ok(())
}

/// Parse a date or date-time string from a request.
///
/// Accepts an RFC 3339 date-time, or a bare `YYYY-MM-DD` date which is widened
/// to the start of that day in UTC, or to the end of the day when `end_of_day`
/// is set so that date ranges are inclusive of their end date.
pub(crate) fn parse_date_time(raw: &str, end_of_day: bool) -> Result<OffsetDateTime, Error> {
    if let Ok(datetime) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(truncate_to_seconds(datetime));
    }

    if let Ok(date) = Date::parse(raw, &Iso8601::DEFAULT) {
        let time = if end_of_day {
            time!(23:59:59)
        } else {
            Time::MIDNIGHT
        };

        return Ok(date.with_time(time).assume_utc());
    }

    Err(Error::InvalidDate(raw.to_owned()))
}

/// The validated data for a transaction that has not been saved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Whether this is income or an expense.
    pub kind: TransactionType,
    /// The amount of money.
    pub amount: f64,
    /// What the money was for.
    pub description: String,
    /// Where the money came from or went to.
    pub from_where: String,
    /// Free-form notes.
    pub notes: String,
    /// When the transaction happened.
    pub date: OffsetDateTime,
}

/// The body of a request to create a transaction.
///
/// All fields are optional at the serde boundary so that missing fields
/// produce the store's own validation errors rather than a deserialization
/// failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    /// "income" or "expense".
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// The amount of money.
    pub amount: Option<f64>,
    /// What the money was for.
    pub description: Option<String>,
    /// Where the money came from or went to.
    pub from_where: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the transaction happened. Defaults to now.
    pub date: Option<String>,
}

impl CreateTransactionRequest {
    /// Validate the request into a [NewTransaction].
    ///
    /// # Errors
    /// Returns an [Error::MissingTransactionFields] if the type, amount, or
    /// description is absent, or the matching validation error if a present
    /// field is invalid.
    pub fn try_into_new_transaction(self) -> Result<NewTransaction, Error> {
        let (Some(raw_kind), Some(amount), Some(description)) =
            (self.kind, self.amount, self.description)
        else {
            return Err(Error::MissingTransactionFields);
        };

        let kind = raw_kind.parse()?;
        let amount = validate_amount(amount)?;
        let description = validate_description(&description)?;

        let date = match self.date {
            Some(raw_date) => parse_date_time(&raw_date, false)?,
            None => truncate_to_seconds(OffsetDateTime::now_utc()),
        };

        Ok(NewTransaction {
            kind,
            amount,
            description,
            from_where: self.from_where.as_deref().unwrap_or("").trim().to_owned(),
            notes: self.notes.as_deref().unwrap_or("").trim().to_owned(),
            date,
        })
    }
}

/// The validated changes from a request to update a transaction.
///
/// Absent fields keep their stored values.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransactionUpdate {
    /// The new transaction type, if given.
    pub kind: Option<TransactionType>,
    /// The new amount, if given.
    pub amount: Option<f64>,
    /// The new description, if given.
    pub description: Option<String>,
    /// The new origin, if given. May be set to the empty string.
    pub from_where: Option<String>,
    /// The new notes, if given. May be set to the empty string.
    pub notes: Option<String>,
    /// The new date, if given.
    pub date: Option<OffsetDateTime>,
}

/// The body of a request to update a transaction. All fields are optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionRequest {
    /// "income" or "expense".
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// The amount of money.
    pub amount: Option<f64>,
    /// What the money was for.
    pub description: Option<String>,
    /// Where the money came from or went to.
    pub from_where: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the transaction happened.
    pub date: Option<String>,
}

impl UpdateTransactionRequest {
    /// Validate the present fields into a [TransactionUpdate].
    ///
    /// # Errors
    /// Returns the matching validation error if a present field is invalid.
    pub fn try_into_update(self) -> Result<TransactionUpdate, Error> {
        let kind = self.kind.map(|raw_kind| raw_kind.parse()).transpose()?;
        let amount = self.amount.map(validate_amount).transpose()?;
        let description = self
            .description
            .map(|description| validate_description(&description))
            .transpose()?;
        let date = self
            .date
            .map(|raw_date| parse_date_time(&raw_date, false))
            .transpose()?;

        Ok(TransactionUpdate {
            kind,
            amount,
            description,
            from_where: self.from_where.map(|text| text.trim().to_owned()),
            notes: self.notes.map(|text| text.trim().to_owned()),
            date,
        })
    }
}

fn validate_amount(amount: f64) -> Result<f64, Error> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(Error::InvalidAmount)
    }
}

fn validate_description(description: &str) -> Result<String, Error> {
    let trimmed = description.trim();

    if trimmed.is_empty() {
        return Err(Error::EmptyDescription);
    }

    Ok(trimmed.to_owned())
}

/// Insert a new transaction into the database owned by `user_id`.
///
/// # Errors
///
/// Returns an [Error::SqlError] if there was an error trying to access the
/// database.
pub fn insert_transaction(
    new_transaction: NewTransaction,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let date = truncate_to_seconds(new_transaction.date);

    connection.execute(
        "INSERT INTO \"transaction\" (kind, amount, description, from_where, notes, date, user_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            new_transaction.kind,
            new_transaction.amount,
            &new_transaction.description,
            &new_transaction.from_where,
            &new_transaction.notes,
            date.unix_timestamp(),
            user_id.as_i64(),
        ),
    )?;

    Ok(Transaction {
        id: connection.last_insert_rowid(),
        kind: new_transaction.kind,
        amount: new_transaction.amount,
        description: new_transaction.description,
        from_where: new_transaction.from_where,
        notes: new_transaction.notes,
        date,
        user_id,
    })
}

/// Get the transaction with `transaction_id` owned by `user_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the transaction does not exist or belongs
/// to another user, or an [Error::SqlError] if there was an error trying to
/// access the database.
pub fn get_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(
            "SELECT id, kind, amount, description, from_where, notes, date, user_id
                FROM \"transaction\"
                WHERE id = :id AND user_id = :user_id",
        )?
        .query_row(
            &[(":id", &transaction_id), (":user_id", &user_id.as_i64())],
            map_transaction_row,
        )
        .map_err(|error| error.into())
}

/// Apply `update` to the transaction with `transaction_id` owned by `user_id`
/// and return the updated transaction.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the transaction does not exist or belongs
/// to another user, or an [Error::SqlError] if there was an error trying to
/// access the database.
pub fn apply_transaction_update(
    transaction_id: DatabaseID,
    user_id: UserID,
    update: TransactionUpdate,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let mut transaction = get_transaction(transaction_id, user_id, connection)?;

    if let Some(kind) = update.kind {
        transaction.kind = kind;
    }
    if let Some(amount) = update.amount {
        transaction.amount = amount;
    }
    if let Some(description) = update.description {
        transaction.description = description;
    }
    if let Some(from_where) = update.from_where {
        transaction.from_where = from_where;
    }
    if let Some(notes) = update.notes {
        transaction.notes = notes;
    }
    if let Some(date) = update.date {
        transaction.date = truncate_to_seconds(date);
    }

    connection.execute(
        "UPDATE \"transaction\"
            SET kind = ?1, amount = ?2, description = ?3, from_where = ?4, notes = ?5, date = ?6
            WHERE id = ?7 AND user_id = ?8",
        (
            transaction.kind,
            transaction.amount,
            &transaction.description,
            &transaction.from_where,
            &transaction.notes,
            transaction.date.unix_timestamp(),
            transaction.id,
            user_id.as_i64(),
        ),
    )?;

    Ok(transaction)
}

/// Delete the transaction with `transaction_id` owned by `user_id`.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the transaction does not exist or belongs
/// to another user, or an [Error::SqlError] if there was an error trying to
/// access the database.
pub fn remove_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_deleted = connection.execute(
        "DELETE FROM \"transaction\" WHERE id = :id AND user_id = :user_id",
        &[(":id", &transaction_id), (":user_id", &user_id.as_i64())][..],
    )?;

    if rows_deleted == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

pub(crate) fn map_transaction_row(row: &rusqlite::Row) -> Result<Transaction, rusqlite::Error> {
    let raw_timestamp: i64 = row.get(6)?;
    let date = OffsetDateTime::from_unix_timestamp(raw_timestamp).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Integer,
            Box::new(error),
        )
    })?;

    Ok(Transaction {
        id: row.get(0)?,
        kind: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        from_where: row.get(4)?,
        notes: row.get(5)?,
        date,
        user_id: UserID::new(row.get(7)?),
    })
}

/// The response body for a successful transaction mutation.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// A human readable description of the outcome.
    pub message: &'static str,
    /// The created or updated transaction.
    pub transaction: Transaction,
}

/// A route handler for creating a new transaction owned by the caller.
pub async fn create_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, Error> {
    let new_transaction = request.try_into_new_transaction()?;

    let connection = state.lock_connection()?;
    let transaction = insert_transaction(new_transaction, user.id, &connection)?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse {
            message: "Transaction created",
            transaction,
        }),
    ))
}

/// A route handler for updating a transaction owned by the caller.
pub async fn update_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(transaction_id): Path<DatabaseID>,
    Json(request): Json<UpdateTransactionRequest>,
) -> Result<impl IntoResponse, Error> {
    let update = request.try_into_update()?;

    let connection = state.lock_connection()?;
    let transaction = apply_transaction_update(transaction_id, user.id, update, &connection)?;

    Ok(Json(TransactionResponse {
        message: "Transaction updated",
        transaction,
    }))
}

/// A route handler for deleting a transaction owned by the caller.
pub async fn delete_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(transaction_id): Path<DatabaseID>,
) -> Result<impl IntoResponse, Error> {
    let connection = state.lock_connection()?;
    remove_transaction(transaction_id, user.id, &connection)?;

    Ok(Json(serde_json::json!({ "message": "Transaction deleted" })))
}
