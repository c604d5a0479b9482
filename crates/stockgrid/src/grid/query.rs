//! Query state and the query parameter builder.
//!
//! [`QueryState`] holds everything that decides which rows the grid shows.
//! [`build_query`] flattens it into the parameter bag handed to the fetch
//! capability. Building is deterministic: identical state and overrides give
//! identical parameters.
//!
//! # Parameter keys
//!
//! | Key | Source |
//! |---|---|
//! | `tableName` | [`QueryState::table_name`] |
//! | `page`, `limit` | 1-based page and page size |
//! | `sortBy`, `sortOrder` | sort field and `"asc"` / `"desc"` |
//! | `search` | trimmed free text |
//! | `field` | equality and set-membership filters |
//! | `field[op]` | other filter operators, e.g. `price[gte]` |
//!
//! Absent values (`null`, empty strings, empty sets) are omitted entirely.

use std::collections::BTreeMap;

use serde_json::Value;

/// Flat parameter bag passed to the fetch capability.
pub type QueryParams = BTreeMap<String, Value>;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
    /// Server default order.
    #[default]
    None,
}

impl SortOrder {
    /// Map the numeric order used by table widgets (`1`, `-1`, `0`).
    pub fn from_numeric(order: i8) -> Self {
        match order {
            1 => Self::Ascending,
            -1 => Self::Descending,
            _ => Self::None,
        }
    }

    /// The `sortOrder` parameter value.
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            Self::Ascending => Some("asc"),
            Self::Descending => Some("desc"),
            Self::None => None,
        }
    }

    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "asc" | "1" => Self::Ascending,
            "desc" | "-1" => Self::Descending,
            _ => Self::None,
        }
    }
}

/// Comparison applied by a structured filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Field equals the value.
    Equals,
    /// Field differs from the value.
    NotEquals,
    /// Field is one of the listed values.
    In,
    /// Field contains the text.
    Contains,
    /// Field starts with the text.
    StartsWith,
    /// Field is greater than the value.
    Gt,
    /// Field is greater than or equal to the value.
    Gte,
    /// Field is less than the value.
    Lt,
    /// Field is less than or equal to the value.
    Lte,
}

impl FilterOperator {
    /// The bracketed key suffix, or `None` when the bare field name is used.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Self::Equals | Self::In => None,
            Self::NotEquals => Some("ne"),
            Self::Contains => Some("contains"),
            Self::StartsWith => Some("startsWith"),
            Self::Gt => Some("gt"),
            Self::Gte => Some("gte"),
            Self::Lt => Some("lt"),
            Self::Lte => Some("lte"),
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        [
            Self::NotEquals,
            Self::Contains,
            Self::StartsWith,
            Self::Gt,
            Self::Gte,
            Self::Lt,
            Self::Lte,
        ]
        .into_iter()
        .find(|op| op.suffix() == Some(suffix))
    }
}

/// One structured filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Comparison.
    pub operator: FilterOperator,
    /// Operand; an array for [`FilterOperator::In`].
    pub value: Value,
}

impl Filter {
    /// Create a filter.
    pub fn new(operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            operator,
            value: value.into(),
        }
    }

    /// Equality filter.
    pub fn equals(value: impl Into<Value>) -> Self {
        Self::new(FilterOperator::Equals, value)
    }

    /// Set-membership filter.
    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(
            FilterOperator::In,
            Value::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Whether the filter constrains nothing and should be dropped.
    pub fn is_empty(&self) -> bool {
        is_absent(&self.value)
    }

    /// Parameter key of this filter for `field`.
    pub fn param_key(&self, field: &str) -> String {
        match self.operator.suffix() {
            Some(op) => format!("{field}[{op}]"),
            None => field.to_string(),
        }
    }
}

/// Whether a parameter value counts as absent.
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_absent),
        _ => false,
    }
}

/// Everything that decides which rows are fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    /// Table the grid is bound to.
    pub table_name: Option<String>,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub page_size: u32,
    /// Field to sort by.
    pub sort_field: Option<String>,
    /// Sort direction.
    pub sort_order: SortOrder,
    /// Free-text search.
    pub search: Option<String>,
    /// Structured filters by field.
    pub filters: BTreeMap<String, Filter>,
}

impl QueryState {
    /// Create a state on the first page.
    pub fn new(table_name: Option<String>, page_size: u32) -> Self {
        Self {
            table_name,
            page: 1,
            page_size: page_size.max(1),
            sort_field: None,
            sort_order: SortOrder::None,
            search: None,
            filters: BTreeMap::new(),
        }
    }

    /// Change the page size, returning to the first page.
    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = page_size.max(1);
        self.page = 1;
    }

    /// Set or remove the filter on `field`. Empty filters are removed.
    ///
    /// Returns `true` if the state changed.
    pub fn set_filter(&mut self, field: impl Into<String>, filter: Filter) -> bool {
        let field = field.into();
        if filter.is_empty() {
            return self.filters.remove(&field).is_some();
        }
        self.filters.insert(field, filter.clone()) != Some(filter)
    }

    /// Replace every filter from a parameter bag.
    ///
    /// Keys of the form `field[op]` map to the matching operator, arrays to
    /// set membership and everything else to equality. Absent values are
    /// skipped. Paging, sort, search and table keys are not filters and are
    /// ignored.
    pub fn replace_filters(&mut self, params: &QueryParams) {
        self.filters.clear();
        for (key, value) in params {
            if RESERVED_KEYS.contains(&key.as_str()) || is_absent(value) {
                continue;
            }
            let (field, filter) = match parse_filter_key(key) {
                Some((field, operator)) => (field, Filter::new(operator, value.clone())),
                None if value.is_array() => (key.as_str(), Filter::new(FilterOperator::In, value.clone())),
                None => (key.as_str(), Filter::equals(value.clone())),
            };
            self.filters.insert(field.to_string(), filter);
        }
    }

    /// Set the search text; blank text clears it. Returns `true` on change.
    pub fn set_search(&mut self, search: Option<&str>) -> bool {
        let search = search
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        if self.search == search {
            return false;
        }
        self.search = search;
        true
    }

    /// Zero-based offset of the first row on the current page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

const RESERVED_KEYS: [&str; 6] = ["tableName", "page", "limit", "sortBy", "sortOrder", "search"];

fn parse_filter_key(key: &str) -> Option<(&str, FilterOperator)> {
    let (field, rest) = key.split_once('[')?;
    let op = rest.strip_suffix(']')?;
    Some((field, FilterOperator::from_suffix(op)?))
}

/// Flatten `state` into fetch parameters, then merge `overrides` on top.
///
/// An override whose value is null removes the key.
pub fn build_query(state: &QueryState, overrides: &QueryParams) -> QueryParams {
    let mut params = QueryParams::new();

    if let Some(table) = state.table_name.as_deref().filter(|t| !t.is_empty()) {
        params.insert("tableName".into(), Value::from(table));
    }
    params.insert("page".into(), Value::from(state.page));
    params.insert("limit".into(), Value::from(state.page_size));

    if let (Some(field), Some(order)) = (state.sort_field.as_deref(), state.sort_order.as_param()) {
        params.insert("sortBy".into(), Value::from(field));
        params.insert("sortOrder".into(), Value::from(order));
    }
    if let Some(search) = state.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        params.insert("search".into(), Value::from(search));
    }
    for (field, filter) in &state.filters {
        if !filter.is_empty() {
            params.insert(filter.param_key(field), filter.value.clone());
        }
    }

    merge_params(params, overrides)
}

/// Merge `top` over `base`. Null values in `top` remove keys; other absent
/// values are skipped.
pub fn merge_params(mut base: QueryParams, top: &QueryParams) -> QueryParams {
    for (key, value) in top {
        if value.is_null() {
            base.remove(key);
        } else if !is_absent(value) {
            base.insert(key.clone(), value.clone());
        }
    }
    base
}

/// Read the sort order out of a parameter bag, e.g. from an external
/// `ApplyFilters` event carrying `sortBy` / `sortOrder`.
pub fn sort_from_params(params: &QueryParams) -> Option<(String, SortOrder)> {
    let field = params.get("sortBy")?.as_str()?.to_string();
    let order = match params.get("sortOrder") {
        Some(Value::String(order)) => SortOrder::parse(order),
        Some(Value::Number(order)) => order
            .as_i64()
            .and_then(|order| i8::try_from(order).ok())
            .map_or(SortOrder::None, SortOrder::from_numeric),
        _ => SortOrder::Ascending,
    };
    Some((field, order))
}

/// Render parameters as URL query pairs. Arrays become repeated keys.
pub fn query_pairs(params: &QueryParams) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Array(items) => {
                for item in items.iter().filter(|item| !is_absent(item)) {
                    pairs.push((key.clone(), scalar_text(item)));
                }
            }
            other if !is_absent(other) => pairs.push((key.clone(), scalar_text(other))),
            _ => {}
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn products() -> QueryState {
        QueryState::new(Some("products".into()), 20)
    }

    #[test]
    fn test_default_state_params() {
        let params = build_query(&products(), &QueryParams::new());
        assert_eq!(
            params,
            QueryParams::from([
                ("limit".into(), json!(20)),
                ("page".into(), json!(1)),
                ("tableName".into(), json!("products")),
            ])
        );
    }

    #[test]
    fn test_empty_filter_is_omitted() {
        let mut state = products();
        assert!(!state.set_filter("brand", Filter::one_of(Vec::<i64>::new())));
        assert!(state.set_filter("category", Filter::one_of([1, 2])));
        assert!(state.set_filter("price", Filter::new(FilterOperator::Gte, 100)));

        let params = build_query(&state, &QueryParams::new());
        assert!(!params.contains_key("brand"));
        assert_eq!(params["category"], json!([1, 2]));
        assert_eq!(params["price[gte]"], json!(100));

        // Clearing an existing filter with an empty set removes it.
        assert!(state.set_filter("category", Filter::one_of(Vec::<i64>::new())));
        assert!(!build_query(&state, &QueryParams::new()).contains_key("category"));
    }

    #[test]
    fn test_sort_and_search() {
        let mut state = products();
        state.sort_field = Some("name".into());
        state.sort_order = SortOrder::Descending;
        assert!(state.set_search(Some("  cement ")));
        let params = build_query(&state, &QueryParams::new());
        assert_eq!(params["sortBy"], json!("name"));
        assert_eq!(params["sortOrder"], json!("desc"));
        assert_eq!(params["search"], json!("cement"));

        state.sort_order = SortOrder::None;
        assert!(state.set_search(Some("   ")));
        let params = build_query(&state, &QueryParams::new());
        assert!(!params.contains_key("sortBy"));
        assert!(!params.contains_key("search"));
    }

    #[test]
    fn test_overrides_merge_last() {
        let state = products();
        let overrides = QueryParams::from([
            ("page".into(), json!(1)),
            ("limit".into(), json!(57)),
            ("tableName".into(), Value::Null),
            ("warehouse".into(), json!("")),
        ]);
        let params = build_query(&state, &overrides);
        assert_eq!(params["limit"], json!(57));
        assert!(!params.contains_key("tableName"));
        assert!(!params.contains_key("warehouse"));
    }

    #[test]
    fn test_page_size_resets_page() {
        let mut state = products();
        state.page = 4;
        state.set_page_size(50);
        assert_eq!(state.page, 1);
        assert_eq!(state.offset(), 0);
    }

    #[test]
    fn test_replace_filters_from_params() {
        let mut state = products();
        state.set_filter("stale", Filter::equals(1));
        state.replace_filters(&QueryParams::from([
            ("brand".into(), json!([3, 4])),
            ("createdAt[gte]".into(), json!("2024-01-01")),
            ("status".into(), json!("active")),
            ("unit".into(), json!("")),
            ("page".into(), json!(9)),
        ]));

        assert_eq!(state.filters.len(), 3);
        assert_eq!(state.filters["brand"].operator, FilterOperator::In);
        assert_eq!(state.filters["createdAt"].operator, FilterOperator::Gte);
        assert_eq!(state.filters["status"], Filter::equals("active"));
        assert_eq!(state.page, 1);
    }

    #[test]
    fn test_query_pairs_repeat_arrays() {
        let params = QueryParams::from([
            ("category".into(), json!([1, 2])),
            ("search".into(), json!("bolt")),
            ("page".into(), json!(2)),
        ]);
        assert_eq!(
            query_pairs(&params),
            vec![
                ("category".to_string(), "1".to_string()),
                ("category".to_string(), "2".to_string()),
                ("page".to_string(), "2".to_string()),
                ("search".to_string(), "bolt".to_string()),
            ]
        );
    }

    #[test]
    fn test_sort_from_params() {
        let params = QueryParams::from([
            ("sortBy".into(), json!("price")),
            ("sortOrder".into(), json!(-1)),
        ]);
        assert_eq!(
            sort_from_params(&params),
            Some(("price".to_string(), SortOrder::Descending))
        );
        assert_eq!(sort_from_params(&QueryParams::new()), None);
    }

    #[test]
    fn test_out_of_range_sort_order_is_unsorted() {
        for order in [json!(257), json!(-255), json!(1.5)] {
            let params = QueryParams::from([("sortBy".into(), json!("price")), ("sortOrder".into(), order)]);
            assert_eq!(
                sort_from_params(&params),
                Some(("price".to_string(), SortOrder::None))
            );
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut state = products();
        state.set_filter("b", Filter::equals(2));
        state.set_filter("a", Filter::equals(1));
        let first = build_query(&state, &QueryParams::new());
        let second = build_query(&state.clone(), &QueryParams::new());
        assert_eq!(first, second);
    }
}
