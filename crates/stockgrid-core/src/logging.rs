//! Logging and debugging facilities for stockgrid.
//!
//! This module provides:
//! - Target names for filtering the `tracing` output of each subsystem
//! - [`HubDebug`], a human-readable dump of an [`EventHub`] registry
//!
//! # Tracing Integration
//!
//! stockgrid only emits `tracing` events; it never installs a subscriber.
//! Applications choose their own:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("stockgrid=debug,stockgrid_core::hub=trace")
//!     .init();
//! ```

use std::fmt::{self, Write as FmtWrite};

use crate::hub::{EventHub, HubEvent, Topic};

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Event hub registrations and emissions.
    pub const HUB: &str = "stockgrid_core::hub";
    /// Grid controller fetch lifecycle.
    pub const GRID: &str = "stockgrid::grid";
    /// Selection tracking.
    pub const SELECTION: &str = "stockgrid::selection";
    /// CSV export and record import.
    pub const TRANSFER: &str = "stockgrid::transfer";
    /// REST client requests.
    pub const REST: &str = "stockgrid_net::rest";
}

/// Debug utility for inspecting a hub registry.
///
/// Topics are listed in a stable order (wildcard last, event kinds sorted by
/// their `Debug` rendering).
pub struct HubDebug<'a, E: HubEvent> {
    hub: &'a EventHub<E>,
}

impl<'a, E: HubEvent> HubDebug<'a, E> {
    /// Create a debug view of `hub`.
    pub fn new(hub: &'a EventHub<E>) -> Self {
        Self { hub }
    }

    /// Render the registry as text.
    pub fn format(&self) -> String {
        let mut topics: Vec<(String, usize)> = self
            .hub
            .topics()
            .into_iter()
            .map(|(topic, count)| {
                let label = match topic {
                    Topic::Event(kind) => format!("{kind:?}"),
                    Topic::Wildcard => "*".to_string(),
                };
                (label, count)
            })
            .collect();
        topics.sort_by(|a, b| match (a.0.as_str(), b.0.as_str()) {
            ("*", "*") => std::cmp::Ordering::Equal,
            ("*", _) => std::cmp::Ordering::Greater,
            (_, "*") => std::cmp::Ordering::Less,
            (left, right) => left.cmp(right),
        });

        let mut output = String::new();
        let _ = writeln!(
            output,
            "EventHub ({} subscriptions{}):",
            self.hub.subscription_count(),
            if self.hub.is_blocked() { ", blocked" } else { "" }
        );
        if topics.is_empty() {
            let _ = writeln!(output, "  (empty)");
        }
        for (label, count) in topics {
            let _ = writeln!(output, "  {label}: {count}");
        }
        output
    }
}

impl<E: HubEvent> fmt::Display for HubDebug<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}
