//! The API endpoint URIs.

/// The route for checking that the server is up.
pub const HEALTH: &str = "/health";
/// The route for registering a new user.
pub const REGISTER: &str = "/auth/register";
/// The route for logging in a registered user.
pub const LOG_IN: &str = "/auth/login";
/// The route for the caller's identity.
pub const ME: &str = "/auth/me";
/// The route for listing and creating transactions.
pub const TRANSACTIONS: &str = "/transactions";
/// The route for updating or deleting a single transaction.
pub const TRANSACTION: &str = "/transactions/{transaction_id}";
/// The route for the caller's transaction summary.
pub const TRANSACTION_STATS: &str = "/transactions/stats";
/// The route for the caller's most recent transactions.
pub const TRANSACTIONS_RECENT: &str = "/transactions/recent";
/// The route for exporting all of the caller's transactions.
pub const TRANSACTIONS_ALL: &str = "/transactions/all";
