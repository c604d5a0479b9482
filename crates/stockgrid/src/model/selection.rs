//! Selection tracking across pages.
//!
//! [`SelectionTracker`] remembers which rows are selected by key, so a
//! selection survives page turns even though only one page of rows is loaded
//! at a time. Rows flagged as disabled can never be selected.
//!
//! # Example
//!
//! ```
//! use stockgrid::model::{Row, RowKey, SelectionTracker};
//!
//! let mut selection = SelectionTracker::new();
//! let row = Row::new("id", 7);
//!
//! selection.select(&row);
//! assert!(selection.is_selected(&RowKey::Int(7)));
//!
//! selection.mark_disabled(RowKey::Int(7));
//! assert_eq!(selection.count(), 0);
//! ```

use std::collections::{HashMap, HashSet};

use stockgrid_core::logging::targets;

use super::row::{Row, RowKey};
use crate::error::{GridError, Result};

/// How clicking rows selects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Rows cannot be selected.
    NoSelection,
    /// Selecting a row replaces the previous selection.
    Single,
    /// Every row has its own checkbox (default).
    #[default]
    Checkbox,
}

/// Tracks selected and disabled row keys.
#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
    mode: SelectionMode,
    /// Set of selected keys for O(1) lookup.
    selected_ids: HashSet<RowKey>,
    /// Selected keys in selection order.
    selected_order: Vec<RowKey>,
    /// Row data last seen for selected keys.
    row_data: HashMap<RowKey, Row>,
    disabled: HashSet<RowKey>,
    total_selectable: u64,
}

impl SelectionTracker {
    /// Creates an empty checkbox-mode tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty tracker with the given mode.
    pub fn with_mode(mode: SelectionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// The selection mode.
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Change the selection mode. Switching to [`SelectionMode::NoSelection`]
    /// clears the selection; switching to [`SelectionMode::Single`] keeps only
    /// the most recently selected key.
    pub fn set_mode(&mut self, mode: SelectionMode) {
        self.mode = mode;
        match mode {
            SelectionMode::NoSelection => self.clear(),
            SelectionMode::Single => {
                let keep = self.selected_order.last().cloned();
                let rest: Vec<RowKey> = self
                    .selected_order
                    .iter()
                    .filter(|key| Some(*key) != keep.as_ref())
                    .cloned()
                    .collect();
                self.prune(rest);
            }
            SelectionMode::Checkbox => {}
        }
    }

    /// Checks if a key is selected.
    pub fn is_selected(&self, key: &RowKey) -> bool {
        self.selected_ids.contains(key)
    }

    /// Checks if a key is disabled.
    pub fn is_disabled(&self, key: &RowKey) -> bool {
        self.disabled.contains(key)
    }

    /// Returns the number of selected keys.
    pub fn count(&self) -> usize {
        self.selected_ids.len()
    }

    /// Returns true if any key is selected.
    pub fn has_selection(&self) -> bool {
        !self.selected_ids.is_empty()
    }

    /// Returns the selected keys in selection order.
    pub fn selected_keys(&self) -> &[RowKey] {
        &self.selected_order
    }

    /// Returns the row data of selected keys in selection order.
    ///
    /// Keys selected without row data (see [`toggle`](Self::toggle)) are
    /// skipped until a page containing them is loaded.
    pub fn selected_rows(&self) -> Vec<Row> {
        self.selected_order
            .iter()
            .filter_map(|key| self.row_data.get(key).cloned())
            .collect()
    }

    /// Returns one row per selected key in selection order.
    ///
    /// Keys without row data yield a row holding only the key under
    /// `data_key`, so the result always has [`count`](Self::count) entries.
    pub fn selected_entries(&self, data_key: &str) -> Vec<Row> {
        self.selected_order
            .iter()
            .map(|key| match self.row_data.get(key) {
                Some(row) => row.clone(),
                None => Row::new(data_key, key.clone()),
            })
            .collect()
    }

    /// Toggle `key`. Returns the new membership.
    ///
    /// Disabled keys are never selected.
    pub fn toggle(&mut self, key: &RowKey) -> bool {
        if self.is_selected(key) {
            self.deselect(key);
            false
        } else {
            self.insert(key.clone(), None)
        }
    }

    /// Toggle `row`, recording its data when it becomes selected.
    pub fn toggle_row(&mut self, row: &Row) -> bool {
        if self.is_selected(row.key()) {
            self.deselect(row.key());
            false
        } else {
            self.insert(row.key().clone(), Some(row.clone()))
        }
    }

    /// Select `row`. Returns `false` if it is disabled or selection is off.
    pub fn select(&mut self, row: &Row) -> bool {
        self.insert(row.key().clone(), Some(row.clone()))
    }

    /// Deselect `key`. Returns `true` if it was selected.
    pub fn deselect(&mut self, key: &RowKey) -> bool {
        if !self.selected_ids.remove(key) {
            return false;
        }
        self.selected_order.retain(|k| k != key);
        self.row_data.remove(key);
        true
    }

    /// Select every given row except disabled ones, replacing the current
    /// selection.
    pub fn select_all<'a, I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = &'a Row>,
    {
        self.clear();
        if self.mode != SelectionMode::Checkbox {
            return;
        }
        for row in rows {
            self.insert(row.key().clone(), Some(row.clone()));
        }
        tracing::debug!(target: targets::SELECTION, selected = self.count(), "select all");
    }

    /// Deselect everything.
    pub fn clear(&mut self) {
        self.selected_ids.clear();
        self.selected_order.clear();
        self.row_data.clear();
    }

    /// Replace the disabled set, evicting newly disabled keys from the
    /// selection.
    pub fn set_disabled<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = RowKey>,
    {
        self.disabled = keys.into_iter().collect();
        let evicted: Vec<RowKey> = self
            .selected_order
            .iter()
            .filter(|key| self.disabled.contains(*key))
            .cloned()
            .collect();
        self.prune(evicted);
    }

    /// Disable one key, evicting it from the selection.
    pub fn mark_disabled(&mut self, key: RowKey) {
        self.deselect(&key);
        self.disabled.insert(key);
    }

    /// Re-enable one key.
    pub fn mark_enabled(&mut self, key: &RowKey) {
        self.disabled.remove(key);
    }

    /// Number of disabled keys.
    pub fn disabled_count(&self) -> usize {
        self.disabled.len()
    }

    /// Drop the given keys from the selection. Returns how many were removed.
    pub fn prune<I>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = RowKey>,
    {
        let removed = keys.into_iter().filter(|key| self.deselect(key)).count();
        if removed > 0 {
            tracing::debug!(target: targets::SELECTION, removed, "pruned selection");
        }
        removed
    }

    /// Refresh the stored data of selected keys from freshly loaded rows.
    pub fn remember<'a, I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = &'a Row>,
    {
        for row in rows {
            if self.selected_ids.contains(row.key()) {
                self.row_data.insert(row.key().clone(), row.clone());
            }
        }
    }

    /// Number of rows the server reports as selectable.
    pub fn total_selectable(&self) -> u64 {
        self.total_selectable
    }

    /// Set the number of selectable rows.
    pub fn set_total_selectable(&mut self, total: u64) {
        self.total_selectable = total;
    }

    /// Whether every selectable row is selected.
    pub fn is_all_selected(&self) -> bool {
        self.total_selectable > 0 && self.count() as u64 >= self.total_selectable
    }

    /// Verify the selected and disabled sets are disjoint and the internal
    /// indexes agree.
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(key) = self.selected_ids.iter().find(|key| self.disabled.contains(*key)) {
            return Err(GridError::InvariantViolation(format!(
                "disabled row {key} is selected"
            )));
        }
        if self.selected_order.len() != self.selected_ids.len() {
            return Err(GridError::InvariantViolation(format!(
                "selection order holds {} keys but the set holds {}",
                self.selected_order.len(),
                self.selected_ids.len()
            )));
        }
        Ok(())
    }

    fn insert(&mut self, key: RowKey, row: Option<Row>) -> bool {
        if self.mode == SelectionMode::NoSelection || self.disabled.contains(&key) {
            return false;
        }
        if self.mode == SelectionMode::Single {
            self.clear();
        }
        if let Some(row) = row {
            self.row_data.insert(key.clone(), row);
        }
        if self.selected_ids.insert(key.clone()) {
            self.selected_order.push(key);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(keys: impl IntoIterator<Item = i64>) -> Vec<Row> {
        keys.into_iter().map(|key| Row::new("id", key)).collect()
    }

    #[test]
    fn test_toggle_twice_restores_membership() {
        let mut selection = SelectionTracker::new();
        let key = RowKey::Int(3);
        assert!(selection.toggle(&key));
        assert!(!selection.toggle(&key));
        assert!(!selection.is_selected(&key));
        assert_eq!(selection.count(), 0);
    }

    #[test]
    fn test_toggle_disabled_never_changes_count() {
        let mut selection = SelectionTracker::new();
        selection.mark_disabled(RowKey::Int(1));
        assert!(!selection.toggle(&RowKey::Int(1)));
        assert!(!selection.toggle(&RowKey::Int(1)));
        assert_eq!(selection.count(), 0);
    }

    #[test]
    fn test_select_all_skips_disabled_and_clear_empties() {
        let mut selection = SelectionTracker::new();
        selection.set_disabled([RowKey::Int(2), RowKey::Int(4)]);
        let all = rows(1..=5);
        selection.select_all(&all);
        assert_eq!(selection.count(), 3);
        assert!(!selection.is_selected(&RowKey::Int(2)));
        assert!(selection.check_invariants().is_ok());

        selection.clear();
        assert_eq!(selection.count(), 0);
    }

    #[test]
    fn test_disabling_evicts_selected_key() {
        let mut selection = SelectionTracker::new();
        selection.select_all(&rows(1..=3));
        selection.set_disabled([RowKey::Int(3)]);
        assert_eq!(selection.selected_keys(), &[RowKey::Int(1), RowKey::Int(2)]);

        selection.mark_disabled(RowKey::Int(1));
        assert_eq!(selection.selected_keys(), &[RowKey::Int(2)]);
        assert!(selection.check_invariants().is_ok());
    }

    #[test]
    fn test_selected_rows_follow_remembered_data() {
        let mut selection = SelectionTracker::new();
        selection.toggle(&RowKey::Int(9));
        assert!(selection.selected_rows().is_empty());

        let loaded = vec![Row::new("id", 9).with_field("name", "Bolt")];
        selection.remember(&loaded);
        assert_eq!(selection.selected_rows(), loaded);
    }

    #[test]
    fn test_selected_entries_cover_key_only_selections() {
        let mut selection = SelectionTracker::new();
        selection.select(&Row::new("code", "A1").with_field("name", "Nut"));
        selection.toggle(&RowKey::from("B2"));

        let entries = selection.selected_entries("code");
        assert_eq!(entries.len(), selection.count());
        assert_eq!(entries[0].get("name"), Some(&serde_json::json!("Nut")));
        assert_eq!(entries[1], Row::new("code", "B2"));
        assert_eq!(selection.selected_rows().len(), 1);
    }

    #[test]
    fn test_prune_counts_removed() {
        let mut selection = SelectionTracker::new();
        selection.select_all(&rows(1..=4));
        assert_eq!(selection.prune([RowKey::Int(2), RowKey::Int(8)]), 1);
        assert_eq!(selection.count(), 3);
    }

    #[test]
    fn test_single_mode_replaces() {
        let mut selection = SelectionTracker::with_mode(SelectionMode::Single);
        selection.select(&Row::new("id", 1));
        selection.select(&Row::new("id", 2));
        assert_eq!(selection.selected_keys(), &[RowKey::Int(2)]);

        selection.select_all(&rows(1..=3));
        assert_eq!(selection.count(), 0);
    }

    #[test]
    fn test_no_selection_mode() {
        let mut selection = SelectionTracker::new();
        selection.select(&Row::new("id", 1));
        selection.set_mode(SelectionMode::NoSelection);
        assert_eq!(selection.count(), 0);
        assert!(!selection.toggle(&RowKey::Int(1)));
    }

    #[test]
    fn test_all_selected_against_total() {
        let mut selection = SelectionTracker::new();
        selection.set_total_selectable(2);
        selection.select_all(&rows(1..=2));
        assert!(selection.is_all_selected());
        selection.deselect(&RowKey::Int(1));
        assert!(!selection.is_all_selected());
    }
}
