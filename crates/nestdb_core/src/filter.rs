//! Filters, queries and query responses.

use crate::error::Result;
use crate::selector::{Selector, SelectorHash};
use nestdb_codec::Value;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default number of records a query returns when no limit is set.
const DEFAULT_LIMIT: usize = 100;

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Exactly the compared value.
    Equal,
    /// Values after the compared value in index order.
    Greater,
    /// Values before the compared value in index order.
    Less,
    /// Values between two compared values.
    Between,
}

/// One per-index predicate of a query.
///
/// ```rust,ignore
/// let f = Filter::new(FilterOperator::Between, Selector::new(["Address", "ZipCode"])?)
///     .compare_to(65u64)
///     .compare_to(68u64)
///     .equal_wanted();
/// ```
#[derive(Debug, Clone)]
pub struct Filter {
    operator: FilterOperator,
    selector: Selector,
    hash: SelectorHash,
    equal: bool,
    values: Vec<Value>,
}

impl Filter {
    /// Creates a filter on the given selector.
    #[must_use]
    pub fn new(operator: FilterOperator, selector: Selector) -> Self {
        let hash = selector.hash();
        Self {
            operator,
            selector,
            hash,
            equal: false,
            values: Vec::new(),
        }
    }

    /// Sets the value to compare to.
    ///
    /// `Between` filters keep two values (the second call sets the
    /// upper bound; further calls replace it). Every other operator
    /// keeps exactly one.
    #[must_use]
    pub fn compare_to(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        if self.operator != FilterOperator::Between {
            self.values = vec![value];
        } else if self.values.len() < 2 {
            self.values.push(value);
        } else {
            self.values[1] = value;
        }
        self
    }

    /// Makes the endpoint itself part of the result (`>=`, `<=`, or an
    /// inclusive between).
    #[must_use]
    pub fn equal_wanted(mut self) -> Self {
        self.equal = true;
        self
    }

    pub(crate) fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub(crate) fn selector(&self) -> &Selector {
        &self.selector
    }

    pub(crate) fn selector_hash(&self) -> SelectorHash {
        self.hash
    }

    pub(crate) fn equal(&self) -> bool {
        self.equal
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }
}

/// A query over one collection: filters combined with AND semantics,
/// optional ordering, and a paging window.
#[derive(Debug, Clone)]
pub struct Query {
    filters: Vec<Filter>,
    order: Option<Selector>,
    ascending: bool,
    limit: usize,
    offset: usize,
    timeout: Option<Duration>,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    /// Creates an empty query (limit 100, ascending, no timeout of its
    /// own). A query needs at least one filter to return records.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order: None,
            ascending: true,
            limit: DEFAULT_LIMIT,
            offset: 0,
            timeout: None,
        }
    }

    /// Adds a filter. All filters must hold for a record to match.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Orders the result by the value at `selector`.
    ///
    /// When no index on the order selector participates in the query,
    /// the engine runs one additional bounded scan over an index with
    /// that selector to fetch ordering values; if no such index exists
    /// at all, ordering is left unenforced.
    #[must_use]
    pub fn order_by(mut self, selector: Selector, ascending: bool) -> Self {
        self.order = Some(selector);
        self.ascending = ascending;
        self
    }

    /// Sets the maximum number of records returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Skips the first `offset` matching records.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets this query's deadline, overriding the database default.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub(crate) fn order(&self) -> Option<&Selector> {
        self.order.as_ref()
    }

    pub(crate) fn ascending(&self) -> bool {
        self.ascending
    }

    pub(crate) fn limit_value(&self) -> usize {
        self.limit
    }

    pub(crate) fn offset_value(&self) -> usize {
        self.offset
    }

    pub(crate) fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Materialized query results, in result order.
#[derive(Debug)]
pub struct QueryResponse {
    entries: Vec<(String, Vec<u8>)>,
    truncated: bool,
    pos: usize,
}

impl QueryResponse {
    pub(crate) fn new(entries: Vec<(String, Vec<u8>)>, truncated: bool) -> Self {
        Self {
            entries,
            truncated,
            pos: 0,
        }
    }

    /// Number of records in the response.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the response holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a contributing scan hit the internal query limit; a
    /// truncated response may be missing matches.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Iterates the record ids in result order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// Iterates (id, payload) pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(id, payload)| (id.as_str(), payload.as_slice()))
    }

    /// Deserializes and returns the next record, advancing an internal
    /// position. Returns `None` once the response is exhausted.
    pub fn one<T: DeserializeOwned>(&mut self) -> Result<Option<(String, T)>> {
        let Some((id, payload)) = self.entries.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        let record = serde_json::from_slice(payload)?;
        Ok(Some((id.clone(), record)))
    }

    /// Deserializes every record in result order.
    pub fn all<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>> {
        self.entries
            .iter()
            .map(|(id, payload)| Ok((id.clone(), serde_json::from_slice(payload)?)))
            .collect()
    }
}
