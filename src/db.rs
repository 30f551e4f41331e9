//! Functions for initializing the application's SQLite database.

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{Error, transaction::create_transaction_table, user::create_user_table};

/// An alias for the integer row IDs used by the application database.
pub type DatabaseID = i64;

/// Truncate a date-time to whole seconds.
///
/// Timestamps are stored as unix seconds, so values must be truncated before
/// insertion for a round trip through the database to compare equal.
pub(crate) fn truncate_to_seconds(datetime: OffsetDateTime) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(datetime.unix_timestamp())
        .expect("whole-second timestamps are always in range")
}

/// Create the tables and indexes for the application's domain models.
///
/// This function is idempotent and is called once at start-up; the connection
/// it initializes is shared and reused for the lifetime of the process.
///
/// # Errors
/// Returns an [Error::SqlError] if a table or index could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    create_user_table(connection)?;
    create_transaction_table(connection)?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date
            ON \"transaction\" (user_id, date)",
        (),
    )?;

    Ok(())
}
