//! Grid configuration.

use std::path::PathBuf;

use serde_json::Value;

use super::query::QueryParams;
use crate::model::{Column, SelectionMode};

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// What happens to the selection when filters or search change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Clear the selection and announce it once the filtered rows arrive.
    #[default]
    ClearOnFilter,
    /// Keep selected keys across filter changes.
    Preserve,
}

/// Configuration for a [`GridController`](super::GridController).
///
/// # Example
///
/// ```
/// use stockgrid::grid::GridConfig;
/// use stockgrid::model::Column;
///
/// let config = GridConfig::new()
///     .with_table_name("products")
///     .with_page_size(20)
///     .with_disable_key("locked")
///     .with_column(Column::new("Name", "name").sortable());
///
/// assert_eq!(config.data_key, "id");
/// ```
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Table name used to scope hub events and sent as `tableName`.
    pub table_name: Option<String>,
    /// Field holding each row's identity.
    pub data_key: String,
    /// Field that marks a row as not selectable when truthy.
    pub disable_key: Option<String>,
    /// Rows the server reports as disabled; subtracted from the selectable
    /// total.
    pub total_disabled_rows: u64,
    /// Initial rows per page.
    pub page_size: u32,
    /// Server-side paging, sorting and filtering. When `false` the full data
    /// set is loaded once and viewed locally.
    pub lazy: bool,
    /// Append the next page to the loaded rows instead of replacing them.
    pub lazy_append: bool,
    /// How rows are selected.
    pub selection_mode: SelectionMode,
    /// Selection behavior on filter changes.
    pub selection_policy: SelectionPolicy,
    /// Parameters sent with every fetch, beneath the query state.
    pub default_query_params: QueryParams,
    /// Column descriptors.
    pub columns: Vec<Column>,
    /// Directory that downloads are written to.
    pub export_dir: PathBuf,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            table_name: None,
            data_key: "id".to_string(),
            disable_key: None,
            total_disabled_rows: 0,
            page_size: DEFAULT_PAGE_SIZE,
            lazy: true,
            lazy_append: false,
            selection_mode: SelectionMode::default(),
            selection_policy: SelectionPolicy::default(),
            default_query_params: QueryParams::new(),
            columns: Vec::new(),
            export_dir: std::env::temp_dir(),
        }
    }
}

impl GridConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the grid to a table name.
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Read row identities from `data_key`.
    pub fn with_data_key(mut self, data_key: impl Into<String>) -> Self {
        self.data_key = data_key.into();
        self
    }

    /// Treat rows whose `disable_key` field is truthy as not selectable.
    pub fn with_disable_key(mut self, disable_key: impl Into<String>) -> Self {
        self.disable_key = Some(disable_key.into());
        self
    }

    /// Number of rows the server reports as disabled.
    pub fn with_total_disabled_rows(mut self, total: u64) -> Self {
        self.total_disabled_rows = total;
        self
    }

    /// Set the initial page size (at least 1).
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Toggle server-side paging.
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Toggle infinite-scroll style appending.
    pub fn with_lazy_append(mut self, lazy_append: bool) -> Self {
        self.lazy_append = lazy_append;
        self
    }

    /// Set the selection mode.
    pub fn with_selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }

    /// Set the selection policy.
    pub fn with_selection_policy(mut self, policy: SelectionPolicy) -> Self {
        self.selection_policy = policy;
        self
    }

    /// Add a parameter sent with every fetch.
    pub fn with_default_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_query_params.insert(key.into(), value.into());
        self
    }

    /// Add a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the download directory.
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    /// Find a column by field.
    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.field == field)
    }
}
