//! The grid event catalog.
//!
//! Every event the grid widgets exchange is one variant of [`GridEvent`].
//! Table-level variants carry an optional `table_name`; a controller bound to
//! one table ignores events addressed to another, so several grids can share
//! one hub.
//!
//! Applications that need events of their own plug them in through the
//! `X` parameter and [`GridEvent::Extension`]; they still share the single
//! registry with the built-in catalog.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use stockgrid_core::{EventHub, HubEvent};

use super::query::QueryParams;
use crate::model::Row;

/// Placeholder extension type for hubs without application events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoExtension {}

/// The signed-in user, as broadcast after a profile update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Account id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Display name.
    pub name: String,
    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,
    /// Avatar file URL.
    #[serde(default)]
    pub photo: Option<String>,
    /// Role name.
    #[serde(default)]
    pub role: Option<String>,
}

/// Events exchanged between grid widgets.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent<X = NoExtension> {
    /// Replace the table's structured filters.
    ApplyFilters {
        /// Target table.
        table_name: Option<String>,
        /// Filter parameters, one key per field.
        filter: QueryParams,
    },
    /// Commit a free-text search.
    Search {
        /// Target table.
        table_name: Option<String>,
        /// Search text; `None` clears the search.
        search: Option<String>,
    },
    /// Show or hide the filter panel.
    ShowFilter {
        /// Target table.
        table_name: Option<String>,
        /// Whether the panel is visible.
        show: bool,
    },
    /// Refetch with the current query state.
    Update {
        /// Target table.
        table_name: Option<String>,
    },
    /// Export rows to a file.
    Download {
        /// Target table.
        table_name: Option<String>,
        /// Name of the file to write.
        file_name: String,
    },
    /// Select every record matching the current filters.
    SelectAllRecord {
        /// Target table.
        table_name: Option<String>,
    },
    /// The table's total record count changed.
    UpdateTotalRecord {
        /// Source table.
        table_name: Option<String>,
        /// Total records matching the current filters.
        total: u64,
    },
    /// The table's selection changed.
    UpdateSelectedData {
        /// Source table.
        table_name: Option<String>,
        /// Selected rows with known data, or `None` when nothing is selected.
        data: Option<Vec<Row>>,
    },
    /// Clear the table's selection.
    ClearSelectedData {
        /// Target table.
        table_name: Option<String>,
    },
    /// Replace the table's rows with records parsed from an imported file.
    ImportToRecords {
        /// Target table.
        table_name: Option<String>,
        /// Imported records.
        data: Vec<Row>,
    },
    /// The signed-in user's profile changed.
    UserUpdated(UserProfile),
    /// Application-defined event.
    Extension(X),
}

/// The kind of a [`GridEvent`], used as the hub topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GridEventKind {
    ApplyFilters,
    Search,
    ShowFilter,
    Update,
    Download,
    SelectAllRecord,
    UpdateTotalRecord,
    UpdateSelectedData,
    ClearSelectedData,
    ImportToRecords,
    UserUpdated,
    Extension,
}

impl GridEventKind {
    /// Every kind, in catalog order.
    pub const ALL: [GridEventKind; 12] = [
        Self::ApplyFilters,
        Self::Search,
        Self::ShowFilter,
        Self::Update,
        Self::Download,
        Self::SelectAllRecord,
        Self::UpdateTotalRecord,
        Self::UpdateSelectedData,
        Self::ClearSelectedData,
        Self::ImportToRecords,
        Self::UserUpdated,
        Self::Extension,
    ];

    /// The event's wire name, as used by the web front end.
    pub fn name(self) -> &'static str {
        match self {
            Self::ApplyFilters => "data-table:apply-filters",
            Self::Search => "search-table",
            Self::ShowFilter => "show-filter",
            Self::Update => "data-table:update",
            Self::Download => "data-table:download",
            Self::SelectAllRecord => "data-table:select-all-record",
            Self::UpdateTotalRecord => "data-table:update-total-record",
            Self::UpdateSelectedData => "data-table:update-selected-data",
            Self::ClearSelectedData => "data-table:clear-selected-data",
            Self::ImportToRecords => "data-table:import-excel-to-json",
            Self::UserUpdated => "data-user:update",
            Self::Extension => "extension",
        }
    }

    /// Look a kind up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl<X> GridEvent<X> {
    /// The table this event is addressed to or comes from.
    ///
    /// `None` for unscoped events and for variants without a table.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Self::ApplyFilters { table_name, .. }
            | Self::Search { table_name, .. }
            | Self::ShowFilter { table_name, .. }
            | Self::Update { table_name }
            | Self::Download { table_name, .. }
            | Self::SelectAllRecord { table_name }
            | Self::UpdateTotalRecord { table_name, .. }
            | Self::UpdateSelectedData { table_name, .. }
            | Self::ClearSelectedData { table_name }
            | Self::ImportToRecords { table_name, .. } => table_name.as_deref(),
            Self::UserUpdated(_) | Self::Extension(_) => None,
        }
    }

    /// Whether a grid bound to `table` should act on this event.
    ///
    /// Scopes must match exactly: an unnamed grid only hears unscoped events
    /// and a named grid only hears events carrying its name.
    pub fn is_for_table(&self, table: Option<&str>) -> bool {
        self.table_name() == table
    }
}

impl<X> HubEvent for GridEvent<X>
where
    X: Send + Sync + 'static,
{
    type Kind = GridEventKind;

    fn kind(&self) -> GridEventKind {
        match self {
            Self::ApplyFilters { .. } => GridEventKind::ApplyFilters,
            Self::Search { .. } => GridEventKind::Search,
            Self::ShowFilter { .. } => GridEventKind::ShowFilter,
            Self::Update { .. } => GridEventKind::Update,
            Self::Download { .. } => GridEventKind::Download,
            Self::SelectAllRecord { .. } => GridEventKind::SelectAllRecord,
            Self::UpdateTotalRecord { .. } => GridEventKind::UpdateTotalRecord,
            Self::UpdateSelectedData { .. } => GridEventKind::UpdateSelectedData,
            Self::ClearSelectedData { .. } => GridEventKind::ClearSelectedData,
            Self::ImportToRecords { .. } => GridEventKind::ImportToRecords,
            Self::UserUpdated(_) => GridEventKind::UserUpdated,
            Self::Extension(_) => GridEventKind::Extension,
        }
    }
}

/// A hub carrying grid events.
pub type GridHub<X = NoExtension> = EventHub<GridEvent<X>>;

static GLOBAL_HUB: OnceLock<GridHub> = OnceLock::new();

/// The application-wide default hub.
///
/// Created on first use. Components still take the hub as an explicit
/// constructor argument; this only provides the shared instance to pass.
pub fn global_hub() -> &'static GridHub {
    GLOBAL_HUB.get_or_init(GridHub::new)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for kind in GridEventKind::ALL {
            assert_eq!(GridEventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(GridEventKind::from_name("data-table:unknown"), None);
        assert_eq!(GridEventKind::ImportToRecords.name(), "data-table:import-excel-to-json");
    }

    #[test]
    fn test_table_scope() {
        let event: GridEvent = GridEvent::Search {
            table_name: Some("orders".into()),
            search: Some("bolt".into()),
        };
        assert!(event.is_for_table(Some("orders")));
        assert!(!event.is_for_table(Some("products")));
        assert!(!event.is_for_table(None));

        let unscoped: GridEvent = GridEvent::Update { table_name: None };
        assert!(unscoped.is_for_table(None));
        assert!(!unscoped.is_for_table(Some("products")));
    }

    #[test]
    fn test_extension_events_share_registry() {
        #[derive(Debug, Clone, PartialEq)]
        enum StockEvent {
            Recount,
        }

        let hub: GridHub<StockEvent> = GridHub::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        hub.on(GridEventKind::Extension, move |event| {
            if matches!(event, GridEvent::Extension(StockEvent::Recount)) {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        hub.emit(GridEvent::Extension(StockEvent::Recount));
        hub.emit(GridEvent::Update { table_name: None });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(hub.emission_count(), 2);
    }

    #[test]
    fn test_global_hub_is_shared() {
        assert!(std::ptr::eq(global_hub(), global_hub()));
    }

    #[test]
    fn test_user_profile_deserializes() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"id": 1, "username": "admin", "name": "Admin"}"#).unwrap();
        assert_eq!(profile.email, None);
    }
}
