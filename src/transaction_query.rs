//! Filtered, sorted, and paginated queries over a user's transactions, and
//! the handlers for the list, recent, and export routes.
//!
//! Filters are composed into a single SQL query from the parameters that are
//! present, so the database only ever sees one statement per request. The sort
//! column is chosen from a whitelist, never interpolated from user input, and
//! every ordering is given the row id as a tiebreak so that paging through
//! results never repeats or skips a row.

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use rusqlite::{Connection, types::ToSql};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    auth::AuthenticatedUser,
    pagination::{PageParams, total_pages},
    state::AppState,
    transaction::{Transaction, TransactionType, map_transaction_row, parse_date_time},
    user::UserID,
};

/// How many transactions the recent-transactions route returns.
const RECENT_TRANSACTION_COUNT: i64 = 10;

/// The query string parameters accepted by the transaction list route.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// The 1-based page number.
    pub page: Option<i64>,
    /// The number of transactions per page.
    pub limit: Option<i64>,
    /// Only return transactions of this type.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Only return transactions containing this text.
    pub search: Option<String>,
    /// Only return transactions on or after this date.
    pub start_date: Option<String>,
    /// Only return transactions on or before this date.
    pub end_date: Option<String>,
    /// The field to sort by.
    pub sort_by: Option<String>,
    /// "asc" or "desc".
    pub sort_order: Option<String>,
}

/// The filter criteria for a transaction query. Absent fields do not
/// constrain the results.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransactionFilter {
    /// Only match transactions of this type.
    pub kind: Option<TransactionType>,
    /// Only match transactions whose description, origin, or notes contain
    /// this text, case-insensitively.
    pub search: Option<String>,
    /// Only match transactions on or after this time.
    pub start_date: Option<OffsetDateTime>,
    /// Only match transactions on or before this time.
    pub end_date: Option<OffsetDateTime>,
}

impl TransactionFilter {
    /// Build a filter from the list route's query parameters.
    ///
    /// An unrecognized type is ignored rather than rejected. A blank search
    /// term is treated as absent.
    ///
    /// # Errors
    /// Returns an [Error::InvalidDate] if a date bound cannot be parsed.
    pub fn from_params(params: &ListParams) -> Result<Self, Error> {
        let kind = params
            .kind
            .as_deref()
            .and_then(|raw_kind| raw_kind.parse().ok());

        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_owned);

        let start_date = params
            .start_date
            .as_deref()
            .map(|raw_date| parse_date_time(raw_date, false))
            .transpose()?;

        let end_date = params
            .end_date
            .as_deref()
            .map(|raw_date| parse_date_time(raw_date, true))
            .transpose()?;

        Ok(Self {
            kind,
            search,
            start_date,
            end_date,
        })
    }

    /// Render the filter as a SQL WHERE clause and its parameters.
    ///
    /// The clause always constrains on `user_id` so a query can never leak
    /// another user's transactions.
    fn to_sql(&self, user_id: UserID) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses = vec!["user_id = ?".to_owned()];
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.as_i64())];

        if let Some(kind) = self.kind {
            clauses.push("kind = ?".to_owned());
            params.push(Box::new(kind));
        }

        if let Some(term) = &self.search {
            let pattern = format!("%{}%", escape_like(term));
            clauses.push(
                "(description LIKE ? ESCAPE '\\'
                    OR from_where LIKE ? ESCAPE '\\'
                    OR notes LIKE ? ESCAPE '\\')"
                    .to_owned(),
            );
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }

        if let Some(start_date) = self.start_date {
            clauses.push("date >= ?".to_owned());
            params.push(Box::new(start_date.unix_timestamp()));
        }

        if let Some(end_date) = self.end_date {
            clauses.push("date <= ?".to_owned());
            params.push(Box::new(end_date.unix_timestamp()));
        }

        (clauses.join(" AND "), params)
    }
}

/// Escape the LIKE wildcards in a search term so it matches as a literal
/// substring.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// The whitelisted columns a transaction query may be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Sort by the transaction date.
    #[default]
    Date,
    /// Sort by the amount of money.
    Amount,
    /// Sort by the description text.
    Description,
    /// Sort by the transaction type.
    Kind,
}

impl SortBy {
    /// Parse the `sortBy` query parameter, falling back to the default for
    /// absent or unrecognized values.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("date") => Self::Date,
            Some("amount") => Self::Amount,
            Some("description") => Self::Description,
            Some("type") => Self::Kind,
            _ => Self::default(),
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Amount => "amount",
            Self::Description => "description",
            Self::Kind => "kind",
        }
    }
}

/// The direction a transaction query is sorted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest or earliest first.
    Ascending,
    /// Largest or latest first.
    #[default]
    Descending,
}

impl SortOrder {
    /// Parse the `sortOrder` query parameter, falling back to the default for
    /// absent or unrecognized values.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("asc") => Self::Ascending,
            Some("desc") => Self::Descending,
            _ => Self::default(),
        }
    }

    fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One page of a filtered transaction query.
#[derive(Debug, PartialEq)]
pub struct TransactionPage {
    /// The transactions on this page.
    pub transactions: Vec<Transaction>,
    /// How many transactions matched the filter across all pages.
    pub total: u64,
}

/// Query one page of `user_id`'s transactions matching `filter`, ordered by
/// `sort_by` in `sort_order`.
///
/// # Errors
///
/// Returns an [Error::SqlError] if there was an error trying to access the
/// database.
pub fn query_transaction_page(
    user_id: UserID,
    filter: &TransactionFilter,
    sort_by: SortBy,
    sort_order: SortOrder,
    page_params: PageParams,
    connection: &Connection,
) -> Result<TransactionPage, Error> {
    let (where_clause, params) = filter.to_sql(user_id);
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|param| param.as_ref()).collect();

    let total = connection
        .prepare(&format!(
            "SELECT COUNT(*) FROM \"transaction\" WHERE {where_clause}"
        ))?
        .query_row(&param_refs[..], |row| row.get::<_, i64>(0))? as u64;

    // The id tiebreak keeps the ordering total, so concatenating pages
    // reproduces the full sorted result.
    let query = format!(
        "SELECT id, kind, amount, description, from_where, notes, date, user_id
            FROM \"transaction\"
            WHERE {where_clause}
            ORDER BY {column} {order}, id {order}
            LIMIT ? OFFSET ?",
        column = sort_by.column(),
        order = sort_order.as_sql(),
    );

    let limit = page_params.limit as i64;
    let offset = page_params.offset() as i64;
    let mut page_param_refs = param_refs;
    page_param_refs.push(&limit);
    page_param_refs.push(&offset);

    let transactions = connection
        .prepare(&query)?
        .query_map(&page_param_refs[..], map_transaction_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TransactionPage {
        transactions,
        total,
    })
}

/// Query the 10 most recent transactions owned by `user_id`.
///
/// # Errors
///
/// Returns an [Error::SqlError] if there was an error trying to access the
/// database.
pub fn query_recent_transactions(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, kind, amount, description, from_where, notes, date, user_id
                FROM \"transaction\"
                WHERE user_id = :user_id
                ORDER BY date DESC, id DESC
                LIMIT :limit",
        )?
        .query_map(
            &[
                (":user_id", &user_id.as_i64()),
                (":limit", &RECENT_TRANSACTION_COUNT),
            ],
            map_transaction_row,
        )?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| error.into())
}

/// Query every transaction owned by `user_id`, most recent first.
///
/// # Errors
///
/// Returns an [Error::SqlError] if there was an error trying to access the
/// database.
pub fn query_all_transactions(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, kind, amount, description, from_where, notes, date, user_id
                FROM \"transaction\"
                WHERE user_id = :user_id
                ORDER BY date DESC, id DESC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_transaction_row)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| error.into())
}

/// The pagination metadata returned alongside a page of transactions.
#[derive(Debug, Serialize)]
pub struct PaginationSummary {
    /// The 1-based page number served.
    pub page: u64,
    /// The maximum number of transactions in a page.
    pub limit: u64,
    /// How many transactions matched across all pages.
    pub total: u64,
    /// How many pages there are in total.
    pub pages: u64,
}

/// The response body for the paginated transaction list route.
#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    /// The transactions on the requested page.
    pub transactions: Vec<Transaction>,
    /// The pagination metadata for the query.
    pub pagination: PaginationSummary,
}

/// The response body for the unpaginated transaction routes.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    /// The matching transactions.
    pub transactions: Vec<Transaction>,
}

/// A route handler for listing the caller's transactions with optional
/// filters, sorting, and pagination.
pub async fn get_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, Error> {
    let page_params = PageParams::new(params.page, params.limit, &state.pagination_config)?;
    let filter = TransactionFilter::from_params(&params)?;
    let sort_by = SortBy::from_param(params.sort_by.as_deref());
    let sort_order = SortOrder::from_param(params.sort_order.as_deref());

    let page = {
        let connection = state.lock_connection()?;
        query_transaction_page(user.id, &filter, sort_by, sort_order, page_params, &connection)?
    };

    Ok(Json(TransactionListResponse {
        pagination: PaginationSummary {
            page: page_params.page,
            limit: page_params.limit,
            total: page.total,
            pages: total_pages(page.total, page_params.limit),
        },
        transactions: page.transactions,
    }))
}

/// A route handler for the caller's 10 most recent transactions.
pub async fn get_recent_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, Error> {
    let connection = state.lock_connection()?;
    let transactions = query_recent_transactions(user.id, &connection)?;

    Ok(Json(TransactionsResponse { transactions }))
}

/// A route handler that returns every transaction the caller owns, for
/// export.
pub async fn get_all_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, Error> {
    let connection = state.lock_connection()?;
    let transactions = query_all_transactions(user.id, &connection)?;

    Ok(Json(TransactionsResponse { transactions }))
}


#[cfg(test)]
mod query_tests {
    use rusqlite::Connection;
    use time::macros::datetime;

    use crate::{
        db::initialize,
        pagination::PageParams,
        password::PasswordHash,
        transaction::{NewTransaction, Transaction, TransactionType, insert_transaction},
        user::{Email, UserID, create_user},
    };

    use super::{
        SortBy, SortOrder, TransactionFilter, query_all_transactions, query_recent_transactions,
        query_transaction_page,
    };

    fn get_test_db_and_user() -> (Connection, UserID) {
        let connection =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        initialize(&connection).expect("Could not initialize database");

        let user = create_user(
            Email::new("test@test.com").unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            &connection,
        )
        .unwrap();

        (connection, user.id)
    }

    fn insert(
        connection: &Connection,
        user_id: UserID,
        kind: TransactionType,
        amount: f64,
        description: &str,
        from_where: &str,
        date: time::OffsetDateTime,
    ) -> Transaction {
        insert_transaction(
            NewTransaction {
                kind,
                amount,
                description: description.to_owned(),
                from_where: from_where.to_owned(),
                notes: String::new(),
                date,
            },
            user_id,
            connection,
        )
        .unwrap()
    }

    fn seed_transactions(connection: &Connection, user_id: UserID) -> Vec<Transaction> {
        vec![
            insert(
                connection,
                user_id,
                TransactionType::Income,
                1000.0,
                "Salary",
                "Acme Corp",
                datetime!(2024-01-01 09:00:00 UTC),
            ),
            insert(
                connection,
                user_id,
                TransactionType::Expense,
                50.0,
                "Groceries",
                "Walmart",
                datetime!(2024-01-10 12:00:00 UTC),
            ),
            insert(
                connection,
                user_id,
                TransactionType::Expense,
                20.0,
                "Fuel",
                "Shell",
                datetime!(2024-02-01 08:00:00 UTC),
            ),
        ]
    }

    fn page_of(size: u64, page: u64) -> PageParams {
        PageParams { page, limit: size }
    }

    #[test]
    fn query_filters_by_type() {
        let (connection, user_id) = get_test_db_and_user();
        seed_transactions(&connection, user_id);

        let page = query_transaction_page(
            user_id,
            &TransactionFilter {
                kind: Some(TransactionType::Expense),
                ..TransactionFilter::default()
            },
            SortBy::default(),
            SortOrder::default(),
            page_of(20, 1),
            &connection,
        )
        .unwrap();

        assert_eq!(page.total, 2);
        assert!(
            page.transactions
                .iter()
                .all(|transaction| transaction.kind == TransactionType::Expense)
        );
    }

    #[test]
    fn query_search_matches_origin_case_insensitively() {
        let (connection, user_id) = get_test_db_and_user();
        seed_transactions(&connection, user_id);

        let page = query_transaction_page(
            user_id,
            &TransactionFilter {
                search: Some("wal".to_owned()),
                ..TransactionFilter::default()
            },
            SortBy::default(),
            SortOrder::default(),
            page_of(20, 1),
            &connection,
        )
        .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.transactions[0].description, "Groceries");
    }

    #[test]
    fn query_search_treats_wildcards_as_literals() {
        let (connection, user_id) = get_test_db_and_user();
        insert(
            &connection,
            user_id,
            TransactionType::Expense,
            10.0,
            "50% off sale",
            "",
            datetime!(2024-01-05 00:00:00 UTC),
        );
        insert(
            &connection,
            user_id,
            TransactionType::Expense,
            10.0,
            "500 widgets",
            "",
            datetime!(2024-01-06 00:00:00 UTC),
        );

        let page = query_transaction_page(
            user_id,
            &TransactionFilter {
                search: Some("50%".to_owned()),
                ..TransactionFilter::default()
            },
            SortBy::default(),
            SortOrder::default(),
            page_of(20, 1),
            &connection,
        )
        .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.transactions[0].description, "50% off sale");
    }

    #[test]
    fn query_date_range_is_inclusive() {
        let (connection, user_id) = get_test_db_and_user();
        seed_transactions(&connection, user_id);

        let page = query_transaction_page(
            user_id,
            &TransactionFilter {
                start_date: Some(datetime!(2024-01-01 00:00:00 UTC)),
                end_date: Some(datetime!(2024-01-31 23:59:59 UTC)),
                ..TransactionFilter::default()
            },
            SortBy::default(),
            SortOrder::default(),
            page_of(20, 1),
            &connection,
        )
        .unwrap();

        assert_eq!(page.total, 2);
    }

    #[test]
    fn query_sorts_by_amount_ascending() {
        let (connection, user_id) = get_test_db_and_user();
        seed_transactions(&connection, user_id);

        let page = query_transaction_page(
            user_id,
            &TransactionFilter::default(),
            SortBy::Amount,
            SortOrder::Ascending,
            page_of(20, 1),
            &connection,
        )
        .unwrap();

        let amounts: Vec<f64> = page
            .transactions
            .iter()
            .map(|transaction| transaction.amount)
            .collect();

        assert_eq!(amounts, vec![20.0, 50.0, 1000.0]);
    }

    #[test]
    fn query_defaults_to_most_recent_first() {
        let (connection, user_id) = get_test_db_and_user();
        seed_transactions(&connection, user_id);

        let page = query_transaction_page(
            user_id,
            &TransactionFilter::default(),
            SortBy::default(),
            SortOrder::default(),
            page_of(20, 1),
            &connection,
        )
        .unwrap();

        let descriptions: Vec<&str> = page
            .transactions
            .iter()
            .map(|transaction| transaction.description.as_str())
            .collect();

        assert_eq!(descriptions, vec!["Fuel", "Groceries", "Salary"]);
    }

    #[test]
    fn query_pages_concatenate_to_full_result() {
        let (connection, user_id) = get_test_db_and_user();
        // Same date on every row so only the id tiebreak orders them.
        for i in 0..5 {
            insert(
                &connection,
                user_id,
                TransactionType::Expense,
                10.0 + i as f64,
                &format!("Item {i}"),
                "",
                datetime!(2024-01-15 12:00:00 UTC),
            );
        }

        let full_page = query_transaction_page(
            user_id,
            &TransactionFilter::default(),
            SortBy::default(),
            SortOrder::default(),
            page_of(20, 1),
            &connection,
        )
        .unwrap();

        let mut concatenated = Vec::new();
        for page_number in 1..=3 {
            let page = query_transaction_page(
                user_id,
                &TransactionFilter::default(),
                SortBy::default(),
                SortOrder::default(),
                page_of(2, page_number),
                &connection,
            )
            .unwrap();

            assert_eq!(page.total, 5);
            concatenated.extend(page.transactions);
        }

        assert_eq!(concatenated, full_page.transactions);
    }

    #[test]
    fn query_excludes_other_users_transactions() {
        let (connection, user_id) = get_test_db_and_user();
        seed_transactions(&connection, user_id);

        let other_user = create_user(
            Email::new("other@test.com").unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            &connection,
        )
        .unwrap();

        let page = query_transaction_page(
            other_user.id,
            &TransactionFilter::default(),
            SortBy::default(),
            SortOrder::default(),
            page_of(20, 1),
            &connection,
        )
        .unwrap();

        assert_eq!(page.total, 0);
        assert!(page.transactions.is_empty());
    }

    #[test]
    fn recent_returns_at_most_ten_most_recent() {
        let (connection, user_id) = get_test_db_and_user();
        for i in 0..12 {
            insert(
                &connection,
                user_id,
                TransactionType::Expense,
                1.0,
                &format!("Item {i}"),
                "",
                datetime!(2024-01-01 00:00:00 UTC) + time::Duration::days(i),
            );
        }

        let transactions = query_recent_transactions(user_id, &connection).unwrap();

        assert_eq!(transactions.len(), 10);
        assert_eq!(transactions[0].description, "Item 11");
        assert_eq!(transactions[9].description, "Item 2");
    }

    #[test]
    fn all_returns_everything_most_recent_first() {
        let (connection, user_id) = get_test_db_and_user();
        seed_transactions(&connection, user_id);

        let transactions = query_all_transactions(user_id, &connection).unwrap();

        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0].description, "Fuel");
        assert_eq!(transactions[2].description, "Salary");
    }
}
