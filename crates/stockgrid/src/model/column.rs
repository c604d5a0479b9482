//! Column descriptors.
//!
//! Columns are consumed, not produced, by the grid core. The controller only
//! reads [`Column::field`] (as the sort key) and [`Column::sortable`]; the
//! templates and presets feed textual exports.

use std::fmt;
use std::sync::Arc;

use super::row::{Row, display_value};

/// Custom cell renderer: `(row, row_index) -> text`.
///
/// Returning `None` falls back to the preset or the raw field value.
pub type BodyTemplate = Arc<dyn Fn(&Row, usize) -> Option<String> + Send + Sync>;

/// Computes the attribute sub-rows of a multi-row cell.
pub type MultiRowFn = Arc<dyn Fn(&Row) -> Vec<MultiRowAttribute> + Send + Sync>;

/// One labelled line of a multi-row cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiRowAttribute {
    /// Attribute caption.
    pub label: String,
    /// Attribute text.
    pub value: String,
}

impl MultiRowAttribute {
    /// Create an attribute line.
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Built-in cell layouts.
#[derive(Clone)]
pub enum ColumnPreset {
    /// Stack several labelled attributes of the record in one cell.
    MultiRow(MultiRowFn),
}

impl fmt::Debug for ColumnPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultiRow(_) => f.write_str("MultiRow(..)"),
        }
    }
}

/// A grid column.
#[derive(Clone)]
pub struct Column {
    /// Header caption.
    pub header: String,
    /// Field path the column displays and sorts by.
    pub field: String,
    /// Whether sorting by this column is allowed.
    pub sortable: bool,
    /// CSS-style class hint for the cell body, passed through untouched.
    pub body_class: Option<String>,
    body_template: Option<BodyTemplate>,
    preset: Option<ColumnPreset>,
}

impl Column {
    /// Create a plain, unsortable column.
    pub fn new(header: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            field: field.into(),
            sortable: false,
            body_class: None,
            body_template: None,
            preset: None,
        }
    }

    /// Allow sorting by this column.
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Set the body class hint.
    pub fn with_body_class(mut self, class: impl Into<String>) -> Self {
        self.body_class = Some(class.into());
        self
    }

    /// Render cells through `template`.
    pub fn with_template<F>(mut self, template: F) -> Self
    where
        F: Fn(&Row, usize) -> Option<String> + Send + Sync + 'static,
    {
        self.body_template = Some(Arc::new(template));
        self
    }

    /// Use the multi-row preset with `attributes` computing the sub-rows.
    pub fn with_multirow<F>(mut self, attributes: F) -> Self
    where
        F: Fn(&Row) -> Vec<MultiRowAttribute> + Send + Sync + 'static,
    {
        self.preset = Some(ColumnPreset::MultiRow(Arc::new(attributes)));
        self
    }

    /// The preset, if any.
    pub fn preset(&self) -> Option<&ColumnPreset> {
        self.preset.as_ref()
    }

    /// Sub-rows of a multi-row cell; empty for other columns.
    pub fn sub_rows(&self, row: &Row) -> Vec<MultiRowAttribute> {
        match &self.preset {
            Some(ColumnPreset::MultiRow(attributes)) => attributes(row),
            None => Vec::new(),
        }
    }

    /// Text of this column's cell for `row` at position `index`.
    pub fn cell_text(&self, row: &Row, index: usize) -> String {
        if let Some(template) = &self.body_template
            && let Some(text) = template(row, index)
        {
            return text;
        }
        if let Some(ColumnPreset::MultiRow(attributes)) = &self.preset {
            return attributes(row)
                .into_iter()
                .map(|attr| format!("{}: {}", attr.label, attr.value))
                .collect::<Vec<_>>()
                .join("; ");
        }
        row.lookup(&self.field)
            .map(display_value)
            .unwrap_or_default()
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("header", &self.header)
            .field("field", &self.field)
            .field("sortable", &self.sortable)
            .field("has_template", &self.body_template.is_some())
            .field("preset", &self.preset)
            .finish()
    }
}
