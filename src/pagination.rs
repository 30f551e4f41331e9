//! This module defines the common functionality for paging data.

use crate::Error;

/// The config for pagination.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The page number to default to when not specified in a request.
    pub default_page: u64,
    /// The number of transactions per page when not specified in a request.
    pub default_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_page_size: 20,
        }
    }
}

/// A validated page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    /// The 1-based page number.
    pub page: u64,
    /// The maximum number of records in a page.
    pub limit: u64,
}

impl PageParams {
    /// Validate the raw `page` and `limit` request parameters, falling back to
    /// the defaults in `config` for absent parameters.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidPageNumber] or [Error::InvalidPageSize] if the
    /// corresponding parameter is present but below one.
    pub fn new(
        page: Option<i64>,
        limit: Option<i64>,
        config: &PaginationConfig,
    ) -> Result<Self, Error> {
        let page = match page {
            None => config.default_page,
            Some(page) if page >= 1 => page as u64,
            Some(_) => return Err(Error::InvalidPageNumber),
        };

        let limit = match limit {
            None => config.default_page_size,
            Some(limit) if limit >= 1 => limit as u64,
            Some(_) => return Err(Error::InvalidPageSize),
        };

        Ok(Self { page, limit })
    }

    /// The number of records to skip to reach this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.limit
    }
}

/// The number of pages needed to display `total` records, `page_size` records
/// at a time.
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    total.div_ceil(page_size)
}

#[cfg(test)]
mod pagination_tests {
    use crate::Error;

    use super::{PageParams, PaginationConfig, total_pages};

    #[test]
    fn new_uses_defaults_for_absent_params() {
        let params = PageParams::new(None, None, &PaginationConfig::default()).unwrap();

        assert_eq!(params, PageParams { page: 1, limit: 20 });
    }

    #[test]
    fn new_accepts_valid_params() {
        let params = PageParams::new(Some(3), Some(5), &PaginationConfig::default()).unwrap();

        assert_eq!(params, PageParams { page: 3, limit: 5 });
        assert_eq!(params.offset(), 10);
    }

    #[test]
    fn new_rejects_zero_page() {
        let result = PageParams::new(Some(0), None, &PaginationConfig::default());

        assert_eq!(result, Err(Error::InvalidPageNumber));
    }

    #[test]
    fn new_rejects_negative_limit() {
        let result = PageParams::new(None, Some(-1), &PaginationConfig::default());

        assert_eq!(result, Err(Error::InvalidPageSize));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(21, 10), 3);
    }
}
