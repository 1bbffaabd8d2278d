//! Paged query results and the query parameter set.
//!
//! Every `/query` endpoint takes the same five parameters and answers with
//! the same page envelope. `filter` and `order` are opaque strings in the
//! server's query language and are passed through untouched.

use serde::{Deserialize, Serialize};

use crate::client::RequestOptions;

/// Page size the server applies when `pageSize` is omitted.
pub const DEFAULT_PAGE_SIZE: u32 = 200;
/// Largest page size some resources accept. Not enforced client-side.
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// One page of records returned by a query endpoint.
///
/// Records keep the order the server sent them in. A page claiming more
/// records than its own `pageSize` is rejected while decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    try_from = "RawPage<T>",
    bound(deserialize = "T: Deserialize<'de>")
)]
pub struct Page<T> {
    records: Vec<T>,
    total_records: u64,
    page_number: u32,
    page_size: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage<T> {
    #[serde(default = "Vec::new")]
    records: Vec<T>,
    #[serde(default)]
    total_records: u64,
    #[serde(default)]
    page_number: u32,
    page_size: u32,
}

impl<T> TryFrom<RawPage<T>> for Page<T> {
    type Error = String;

    fn try_from(raw: RawPage<T>) -> Result<Self, Self::Error> {
        Page::new(raw.records, raw.total_records, raw.page_number, raw.page_size)
    }
}

impl<T> Page<T> {
    pub fn new(
        records: Vec<T>,
        total_records: u64,
        page_number: u32,
        page_size: u32,
    ) -> Result<Self, String> {
        if records.len() as u64 > u64::from(page_size) {
            return Err(format!(
                "page holds {} records but pageSize is {page_size}",
                records.len()
            ));
        }
        Ok(Self {
            records,
            total_records,
            page_number,
            page_size,
        })
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    /// Number of pages at this page size, or 0 when the page size is 0.
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_records.div_ceil(u64::from(self.page_size))
    }

    /// Page numbers are zero-based.
    pub fn has_next_page(&self) -> bool {
        u64::from(self.page_number) + 1 < self.total_pages()
    }

    pub fn next_page_number(&self) -> Option<u32> {
        if self.has_next_page() {
            self.page_number.checked_add(1)
        } else {
            None
        }
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Parameters for a `/query` endpoint. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: Option<String>,
    pub include: Option<String>,
    pub order: Option<String>,
    pub page_size: Option<u32>,
    pub page_number: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn include(mut self, include: impl Into<String>) -> Self {
        self.include = Some(include.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn page_number(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }

    /// The same query, pointed at another page.
    pub fn at_page(&self, page_number: u32) -> Self {
        Self {
            page_number: Some(page_number),
            ..self.clone()
        }
    }

    pub fn to_options(&self) -> RequestOptions {
        RequestOptions::new()
            .param("filter", self.filter.as_deref())
            .param("include", self.include.as_deref())
            .param("order", self.order.as_deref())
            .param("pageSize", self.page_size)
            .param("pageNumber", self.page_number)
    }
}
