//! Paging for list endpoints and the filter-clause helper the Postgres store
//! uses to build its dynamic WHERE conditions.

use serde::{Deserialize, Serialize};

use crate::store::Page;

pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;

pub(crate) fn default_page() -> i64 {
    1
}

pub(crate) fn default_per_page() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// `page` is 1-based; out-of-range values are clamped rather than rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    page: i64,
    per_page: i64,
}

impl PaginationParams {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> Page {
        Page {
            limit: self.per_page,
            offset: (self.page - 1).saturating_mul(self.per_page),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// List body: `{ "data": [...], "meta": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        let PaginationParams { page, per_page } = *params;
        let total_pages = total.div_euclid(per_page) + i64::from(total.rem_euclid(per_page) > 0);
        Self {
            data,
            meta: PaginationMeta {
                page,
                per_page,
                total,
                total_pages,
                has_next: page < total_pages,
                has_prev: page > 1,
            },
        }
    }
}

/// AND-joined SQL conditions with `$n` placeholders numbered after the
/// parameters already bound by the caller. `{}` in a condition marks where
/// the placeholder goes.
#[derive(Debug)]
pub struct FilterClause {
    conditions: Vec<String>,
    last_param: usize,
}

impl FilterClause {
    pub fn after(bound: usize) -> Self {
        Self {
            conditions: Vec::new(),
            last_param: bound,
        }
    }

    /// Adds the condition only when the filter value is present
    pub fn push_if<T>(&mut self, condition: &str, value: &Option<T>) -> &mut Self {
        if value.is_some() {
            self.last_param += 1;
            self.conditions
                .push(condition.replace("{}", &format!("${}", self.last_param)));
        }
        self
    }

    /// Suffix for an existing WHERE, empty when no filter applied
    pub fn sql(&self) -> String {
        self.conditions
            .iter()
            .map(|c| format!(" AND {}", c))
            .collect()
    }

    /// Placeholder numbers for LIMIT and OFFSET
    pub fn limit_offset(&self) -> (usize, usize) {
        (self.last_param + 1, self.last_param + 2)
    }
}
