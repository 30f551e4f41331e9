//! Aggregate views over a user's transactions: all-time totals, a monthly
//! income/expense series, and a breakdown of where money is being spent.
//!
//! All three views are computed in SQL so that summarizing a large history
//! never materializes the individual rows in memory.

use axum::{Json, extract::State, response::IntoResponse};
use rusqlite::Connection;
use serde::Serialize;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime};

use crate::{
    Error, auth::AuthenticatedUser, state::AppState, transaction::TransactionType, user::UserID,
};

/// How many trailing calendar months the monthly series covers.
const MONTHLY_STATS_MONTHS: u32 = 6;

/// How many groups the expense breakdown returns.
const EXPENSE_BREAKDOWN_LIMIT: i64 = 10;

/// The income and expense totals for one calendar month.
#[derive(Debug, PartialEq, Serialize)]
pub struct MonthlyTotal {
    /// The calendar year.
    pub year: i32,
    /// The calendar month, 1 through 12.
    pub month: u8,
    /// Whether this total covers income or expenses.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// The summed amount for the month.
    pub total: f64,
}

/// The total spent against one origin or description.
#[derive(Debug, PartialEq, Serialize)]
pub struct ExpenseGroup {
    /// The transactions' origin, or their description when no origin was
    /// recorded.
    pub label: String,
    /// The summed amount spent.
    pub total: f64,
}

/// The aggregate view of a user's transaction history.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    /// All-time income.
    pub income: f64,
    /// All-time expenses.
    pub expense: f64,
    /// Income less expenses.
    pub balance: f64,
    /// Month-by-month totals over the trailing six calendar months, earliest
    /// first.
    pub monthly_stats: Vec<MonthlyTotal>,
    /// The ten largest expense groups, largest first.
    pub expense_breakdown: Vec<ExpenseGroup>,
}

/// The date-time `months` calendar months before `datetime`.
///
/// The day of the month is clamped to the length of the target month, so
/// stepping back from the 31st lands on the last day of a shorter month.
fn months_back(datetime: OffsetDateTime, months: u32) -> OffsetDateTime {
    let mut year = datetime.year();
    let mut month = datetime.month();

    for _ in 0..months {
        if month == Month::January {
            year -= 1;
        }
        month = month.previous();
    }

    let day = datetime.day().min(month.length(year));
    let date = Date::from_calendar_date(year, month, day)
        .expect("a day clamped to the month length is always valid");

    PrimitiveDateTime::new(date, datetime.time()).assume_offset(datetime.offset())
}

/// Summarize `user_id`'s transaction history as of `now`.
///
/// # Errors
///
/// Returns an [Error::SqlError] if there was an error trying to access the
/// database.
pub fn summarize_transactions(
    user_id: UserID,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<TransactionSummary, Error> {
    let mut income = 0.0;
    let mut expense = 0.0;

    let totals = connection
        .prepare(
            "SELECT kind, SUM(amount) FROM \"transaction\"
                WHERE user_id = :user_id
                GROUP BY kind",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], |row| {
            Ok((row.get::<_, TransactionType>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (kind, total) in totals {
        match kind {
            TransactionType::Income => income = total,
            TransactionType::Expense => expense = total,
        }
    }

    let window_start = months_back(now, MONTHLY_STATS_MONTHS);

    let monthly_stats = connection
        .prepare(
            "SELECT CAST(strftime('%Y', date, 'unixepoch') AS INTEGER) AS year,
                    CAST(strftime('%m', date, 'unixepoch') AS INTEGER) AS month,
                    kind,
                    SUM(amount)
                FROM \"transaction\"
                WHERE user_id = :user_id AND date >= :window_start
                GROUP BY year, month, kind
                ORDER BY year ASC, month ASC, kind ASC",
        )?
        .query_map(
            &[
                (":user_id", &user_id.as_i64()),
                (":window_start", &window_start.unix_timestamp()),
            ],
            |row| {
                Ok(MonthlyTotal {
                    year: row.get(0)?,
                    month: row.get(1)?,
                    kind: row.get(2)?,
                    total: row.get(3)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    // Expenses with no recorded origin are grouped under their description.
    let expense_breakdown = connection
        .prepare(
            "SELECT CASE WHEN from_where <> '' THEN from_where ELSE description END AS label,
                    SUM(amount) AS total
                FROM \"transaction\"
                WHERE user_id = :user_id AND kind = 'expense'
                GROUP BY label
                ORDER BY total DESC, label ASC
                LIMIT :limit",
        )?
        .query_map(
            &[
                (":user_id", &user_id.as_i64()),
                (":limit", &EXPENSE_BREAKDOWN_LIMIT),
            ],
            |row| {
                Ok(ExpenseGroup {
                    label: row.get(0)?,
                    total: row.get(1)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TransactionSummary {
        income,
        expense,
        balance: income - expense,
        monthly_stats,
        expense_breakdown,
    })
}

/// A route handler that summarizes the caller's transaction history.
pub async fn get_transaction_stats(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, Error> {
    let connection = state.lock_connection()?;
    let summary = summarize_transactions(user.id, OffsetDateTime::now_utc(), &connection)?;

    Ok(Json(summary))
}
