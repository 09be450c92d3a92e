//! Pagination result

use serde::Serialize;

use crate::data::QueryError;

/// Page number meaning "the last page"
pub const LAST_PAGE: i64 = -1;

/// One page of query results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub objects: Vec<T>,
    /// Total rows matched by the query
    pub number_of_objects: u64,
    pub pages_total: u64,
    /// 1-based page number
    pub number: u64,
    pub page_size: u64,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.number >= self.pages_total
    }
}

/// Page geometry computed before fetching rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageWindow {
    pub number: u64,
    pub pages_total: u64,
    pub offset: u64,
}

impl PageWindow {
    /// Resolve a requested page number against the total row count
    ///
    /// `-1` selects the last page (page 1 for an empty result). Pages past the
    /// end are allowed and yield no rows.
    pub fn resolve(page_num: i64, page_size: u64, count: u64) -> Result<Self, QueryError> {
        if page_size == 0 {
            return Err(QueryError::invalid_argument("page size must be positive"));
        }
        let pages_total = count.div_ceil(page_size);
        let number = if page_num == LAST_PAGE {
            pages_total.max(1)
        } else if page_num < 1 {
            return Err(QueryError::invalid_argument(format!(
                "invalid page number: {}",
                page_num
            )));
        } else {
            page_num as u64
        };
        Ok(Self {
            number,
            pages_total,
            offset: (number - 1).saturating_mul(page_size),
        })
    }

    pub fn into_page<T>(self, objects: Vec<T>, count: u64, page_size: u64) -> Page<T> {
        Page {
            objects,
            number_of_objects: count,
            pages_total: self.pages_total,
            number: self.number,
            page_size,
        }
    }
}
