//! Grid data model.
//!
//! Rows, column descriptors and the cross-page selection tracker. These types
//! carry no behavior tied to fetching; the controller in [`crate::grid`]
//! drives them.

mod column;
mod row;
mod selection;

pub use column::{BodyTemplate, Column, ColumnPreset, MultiRowAttribute, MultiRowFn};
pub use row::{ChildGroup, Row, RowKey, display_value};
pub use selection::{SelectionMode, SelectionTracker};
