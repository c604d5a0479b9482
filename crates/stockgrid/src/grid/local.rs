//! Client-side paging, sorting and filtering.
//!
//! Used when the grid holds the full data set itself: non-lazy grids and
//! imported records. The semantics mirror what the server applies to lazy
//! grids.

use std::cmp::Ordering;

use serde_json::Value;

use super::query::{Filter, FilterOperator, QueryState, SortOrder};
use crate::model::{Row, display_value};

/// Every row matching the search and filters of `query`, sorted.
pub fn matching_rows(rows: &[Row], query: &QueryState) -> Vec<Row> {
    let needle = query.search.as_deref().map(str::to_lowercase);
    let mut matched: Vec<Row> = rows
        .iter()
        .filter(|row| {
            needle
                .as_deref()
                .is_none_or(|needle| row_contains(row, needle))
        })
        .filter(|row| {
            query
                .filters
                .iter()
                .all(|(field, filter)| filter_matches(row.lookup(field), filter))
        })
        .cloned()
        .collect();

    if let Some(field) = query.sort_field.as_deref()
        && query.sort_order != SortOrder::None
    {
        matched.sort_by(|a, b| {
            let ordering = compare_values(a.lookup(field), b.lookup(field));
            match query.sort_order {
                SortOrder::Descending => ordering.reverse(),
                _ => ordering,
            }
        });
    }
    matched
}

/// The current page of `rows` under `query`, with the matching total.
pub fn local_page(rows: &[Row], query: &QueryState) -> (Vec<Row>, u64) {
    let matched = matching_rows(rows, query);
    let total = matched.len() as u64;
    let start = usize::try_from(query.offset()).unwrap_or(usize::MAX);
    let page = matched
        .into_iter()
        .skip(start)
        .take(query.page_size as usize)
        .collect();
    (page, total)
}

fn row_contains(row: &Row, needle: &str) -> bool {
    row.fields()
        .values()
        .any(|value| display_value(value).to_lowercase().contains(needle))
}

fn filter_matches(value: Option<&Value>, filter: &Filter) -> bool {
    let value = value.unwrap_or(&Value::Null);
    match filter.operator {
        FilterOperator::Equals => loosely_equal(value, &filter.value),
        FilterOperator::NotEquals => !loosely_equal(value, &filter.value),
        FilterOperator::In => match &filter.value {
            Value::Array(options) => options.iter().any(|option| loosely_equal(value, option)),
            single => loosely_equal(value, single),
        },
        FilterOperator::Contains => display_value(value)
            .to_lowercase()
            .contains(&display_value(&filter.value).to_lowercase()),
        FilterOperator::StartsWith => display_value(value)
            .to_lowercase()
            .starts_with(&display_value(&filter.value).to_lowercase()),
        FilterOperator::Gt => range(value, filter).is_some_and(Ordering::is_gt),
        FilterOperator::Gte => range(value, filter).is_some_and(Ordering::is_ge),
        FilterOperator::Lt => range(value, filter).is_some_and(Ordering::is_lt),
        FilterOperator::Lte => range(value, filter).is_some_and(Ordering::is_le),
    }
}

/// Missing values never satisfy a range bound.
fn range(value: &Value, filter: &Filter) -> Option<Ordering> {
    (!value.is_null()).then(|| compare_values(Some(value), Some(&filter.value)))
}

/// Numbers and their textual forms compare equal (`3 == "3"`).
fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || (!a.is_null() && display_value(a) == display_value(b))
}

/// Numeric when both sides are numeric, textual otherwise. Missing and null
/// values sort last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => display_value(a).cmp(&display_value(b)),
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn inventory() -> Vec<Row> {
        [
            json!({"id": 1, "name": "Cement", "qty": 40, "brand": 2}),
            json!({"id": 2, "name": "Brick", "qty": 5, "brand": 1}),
            json!({"id": 3, "name": "Cement board", "qty": 12, "brand": 2}),
            json!({"id": 4, "name": "Sand", "qty": null, "brand": 3}),
        ]
        .into_iter()
        .map(|value| Row::from_json(value, "id").unwrap())
        .collect()
    }

    fn keys(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|row| row.key().to_string()).collect()
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut query = QueryState::new(None, 10);
        query.set_search(Some("CEMENT"));
        assert_eq!(keys(&matching_rows(&inventory(), &query)), ["1", "3"]);
    }

    #[test]
    fn test_filters_and_sort() {
        let mut query = QueryState::new(None, 10);
        query.set_filter("brand", Filter::one_of([2, 3]));
        query.sort_field = Some("qty".into());
        query.sort_order = SortOrder::Ascending;
        assert_eq!(keys(&matching_rows(&inventory(), &query)), ["3", "1", "4"]);

        query.set_filter("qty", Filter::new(FilterOperator::Gte, "12"));
        assert_eq!(keys(&matching_rows(&inventory(), &query)), ["3", "1"]);
    }

    #[test]
    fn test_page_slice_and_total() {
        let mut query = QueryState::new(None, 3);
        query.page = 2;
        let (page, total) = local_page(&inventory(), &query);
        assert_eq!(total, 4);
        assert_eq!(keys(&page), ["4"]);

        query.page = 5;
        let (page, total) = local_page(&inventory(), &query);
        assert!(page.is_empty());
        assert_eq!(total, 4);
    }
}
